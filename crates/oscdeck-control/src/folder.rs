//! Dynamic folder engine
//!
//! Presents a large item catalogue (e.g. an effect browser) as a paginated,
//! filterable, favorites-aware surface driven by a fixed set of rotary
//! slots. The visible list is always recomputed in full from the item set,
//! the filter values, and the page; never patched incrementally.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use oscdeck_core::OscArg;

use crate::error::Result;
use crate::registry::ActionRegistry;
use crate::transport::OscSender;

/// Items shown per page
pub const PAGE_SIZE: usize = 12;
/// Physical rotary slots on the surface
pub const ROTARY_SLOTS: usize = 6;
/// First option of every filter
pub const OPTION_ALL: &str = "All";
/// Pseudo-category gated by the bus filter
pub const OPTION_FAVORITE: &str = "Favorite";

/// One catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Top-level category, e.g. the vendor
    #[serde(default)]
    pub group: String,
    /// Filterable properties keyed by filter name
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Action address fired when the item is activated
    pub action_address: String,
}

/// Declared rotary control of a folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FolderControl {
    /// Filter dial over the option list for `key`
    FilterDial {
        key: String,
        /// Marks the primary (bus) filter
        #[serde(default)]
        bus: bool,
    },
    /// Page turner
    PageDial,
    /// Back dial; turning it closes the folder
    NavigationDial,
    /// Inert filler
    PlaceholderDial,
}

/// A per-folder catalogue document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// Items keyed by display name, in document order
    pub items: IndexMap<String, CatalogItem>,
    /// Display names of favorite items
    #[serde(default)]
    pub favorites: Vec<String>,
    /// Option values per filter key
    #[serde(default)]
    pub filter_options: HashMap<String, Vec<String>>,
    /// Declared rotary controls
    #[serde(default)]
    pub layout: Vec<FolderControl>,
}

impl CatalogDocument {
    /// Parse a catalogue document from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Ok(doc)
    }

    /// Load a catalogue document from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// What a physical slot is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotarySlot {
    /// Reserved back control
    Navigation,
    /// Index into the folder's filter list
    Filter(usize),
    /// Page turner
    Page,
    /// Inert
    Placeholder,
    /// Renders nothing, accepts no input
    Unassigned,
}

/// Outcome of a dial interaction, for the embedding device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderResponse {
    /// The folder contents changed; redraw
    Redraw,
    /// The user asked to leave the folder
    CloseRequested,
    /// Nothing happened
    Ignored,
}

#[derive(Debug, Clone)]
struct FolderFilter {
    key: String,
    options: Vec<String>,
    selected: usize,
    is_bus: bool,
}

impl FolderFilter {
    fn value(&self) -> &str {
        self.options
            .get(self.selected)
            .map(String::as_str)
            .unwrap_or(OPTION_ALL)
    }
}

/// A live folder instance
pub struct DynamicFolder {
    doc: CatalogDocument,
    filters: Vec<FolderFilter>,
    slots: [RotarySlot; ROTARY_SLOTS],
    filtered: Vec<String>,
    page: usize,
    sender: Arc<dyn OscSender>,
}

impl DynamicFolder {
    /// Open a folder over a catalogue document.
    ///
    /// Item action addresses are registered with the registry's relevant
    /// set; registration is idempotent, so re-opening is harmless.
    pub fn open(doc: CatalogDocument, registry: &ActionRegistry) -> Self {
        registry
            .add_relevant_addresses(doc.items.values().map(|item| item.action_address.clone()));

        let bus_key = designate_bus(&doc.layout);
        let filters = build_filters(&doc, bus_key.as_deref());
        let slots = assign_slots(&doc.layout);

        let mut folder = Self {
            doc,
            filters,
            slots,
            filtered: Vec::new(),
            page: 0,
            sender: registry.sender(),
        };
        folder.recompute();
        debug!(
            "folder opened: {} items, {} filters, {} pages",
            folder.doc.items.len(),
            folder.filters.len(),
            folder.total_pages()
        );
        folder
    }

    /// Rotate the dial in `slot` by `ticks` (positive is clockwise)
    pub fn turn_dial(&mut self, slot: usize, ticks: i32) -> FolderResponse {
        if ticks == 0 {
            return FolderResponse::Ignored;
        }
        match self.slot(slot) {
            RotarySlot::Navigation => {
                debug!("back dial turned, closing folder");
                FolderResponse::CloseRequested
            }
            RotarySlot::Filter(index) => self.cycle_filter(index, ticks),
            RotarySlot::Page => {
                let previous = self.page;
                if ticks > 0 {
                    self.page = (self.page + 1).min(self.total_pages() - 1);
                } else {
                    self.page = self.page.saturating_sub(1);
                }
                if self.page == previous {
                    FolderResponse::Ignored
                } else {
                    debug!("page {} of {}", self.page + 1, self.total_pages());
                    FolderResponse::Redraw
                }
            }
            RotarySlot::Placeholder | RotarySlot::Unassigned => FolderResponse::Ignored,
        }
    }

    /// Press the dial in `slot`
    pub fn press_dial(&mut self, slot: usize) -> FolderResponse {
        match self.slot(slot) {
            RotarySlot::Navigation => {
                debug!("back dial pressed, closing folder");
                FolderResponse::CloseRequested
            }
            RotarySlot::Filter(index) => self.reset_filter(index),
            RotarySlot::Page => {
                if self.page == 0 {
                    FolderResponse::Ignored
                } else {
                    self.page = 0;
                    FolderResponse::Redraw
                }
            }
            RotarySlot::Placeholder | RotarySlot::Unassigned => FolderResponse::Ignored,
        }
    }

    /// Activate the item at `index` on the current page
    pub fn activate(&self, index: usize) -> bool {
        let visible = self.visible_items();
        let Some(name) = visible.get(index) else {
            warn!("no item at position {} on page {}", index, self.page);
            return false;
        };
        let Some(item) = self.doc.items.get(name) else {
            return false;
        };
        debug!("activating \"{}\" via {}", name, item.action_address);
        self.sender.send(&item.action_address, OscArg::Float(1.0));
        true
    }

    /// Set the filter for `key` to `value`; unknown keys or values are
    /// logged no-ops
    pub fn set_filter(&mut self, key: &str, value: &str) -> FolderResponse {
        let Some(index) = self.filters.iter().position(|f| f.key == key) else {
            warn!("no filter named {}", key);
            return FolderResponse::Ignored;
        };
        let Some(option) = self.filters[index].options.iter().position(|o| o == value) else {
            warn!("filter {} has no option \"{}\"", key, value);
            return FolderResponse::Ignored;
        };
        if self.filters[index].selected == option {
            return FolderResponse::Ignored;
        }
        self.filters[index].selected = option;
        self.on_filter_changed(index);
        FolderResponse::Redraw
    }

    /// Names visible on the current page, in document order
    pub fn visible_items(&self) -> &[String] {
        let start = self.page * PAGE_SIZE;
        let end = ((self.page + 1) * PAGE_SIZE).min(self.filtered.len());
        if start >= end {
            &[]
        } else {
            &self.filtered[start..end]
        }
    }

    /// Look up an item by display name
    pub fn item(&self, name: &str) -> Option<&CatalogItem> {
        self.doc.items.get(name)
    }

    /// Size of the whole filtered set
    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// Total pages; never less than 1
    pub fn total_pages(&self) -> usize {
        self.filtered.len().div_ceil(PAGE_SIZE).max(1)
    }

    /// Current page index
    pub fn page(&self) -> usize {
        self.page
    }

    /// Jump to a page; clamped, filters untouched
    pub fn set_page(&mut self, page: usize) {
        self.page = page.min(self.total_pages() - 1);
    }

    /// What the slot at `index` is bound to
    pub fn slot(&self, index: usize) -> RotarySlot {
        self.slots
            .get(index)
            .copied()
            .unwrap_or(RotarySlot::Unassigned)
    }

    /// Current value of the filter for `key`
    pub fn filter_value(&self, key: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.key == key)
            .map(FolderFilter::value)
    }

    /// Option list of the filter for `key`
    pub fn filter_options(&self, key: &str) -> Option<&[String]> {
        self.filters
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.options.as_slice())
    }

    fn cycle_filter(&mut self, index: usize, ticks: i32) -> FolderResponse {
        let Some(filter) = self.filters.get_mut(index) else {
            return FolderResponse::Ignored;
        };
        let len = filter.options.len() as i64;
        if len < 2 {
            return FolderResponse::Ignored;
        }
        let step: i64 = if ticks > 0 { 1 } else { -1 };
        filter.selected = ((filter.selected as i64 + step).rem_euclid(len)) as usize;
        self.on_filter_changed(index);
        FolderResponse::Redraw
    }

    fn reset_filter(&mut self, index: usize) -> FolderResponse {
        let Some(filter) = self.filters.get_mut(index) else {
            return FolderResponse::Ignored;
        };
        if filter.selected == 0 {
            return FolderResponse::Ignored;
        }
        filter.selected = 0;
        self.on_filter_changed(index);
        FolderResponse::Redraw
    }

    fn on_filter_changed(&mut self, index: usize) {
        debug!(
            "filter {} = \"{}\"",
            self.filters[index].key,
            self.filters[index].value()
        );
        self.page = 0;
        self.recompute();
    }

    /// Rebuild the filtered list from scratch; result order is document order
    fn recompute(&mut self) {
        let mut names = Vec::new();
        'items: for (name, item) in &self.doc.items {
            for filter in &self.filters {
                let value = filter.value();
                if value == OPTION_ALL {
                    continue;
                }
                if filter.is_bus {
                    if value == OPTION_FAVORITE {
                        if !self.doc.favorites.iter().any(|favorite| favorite == name) {
                            continue 'items;
                        }
                    } else if item.group != value {
                        continue 'items;
                    }
                } else {
                    let matches = item
                        .properties
                        .get(&filter.key)
                        .map(|property| property.eq_ignore_ascii_case(value))
                        .unwrap_or(false);
                    if !matches {
                        continue 'items;
                    }
                }
            }
            names.push(name.clone());
        }
        self.filtered = names;
        self.page = self.page.min(self.total_pages() - 1);
    }
}

/// Pick the bus filter key: the first explicitly marked FilterDial, or the
/// first FilterDial when none is marked. Extra markings lose and are logged.
fn designate_bus(layout: &[FolderControl]) -> Option<String> {
    let mut bus: Option<&str> = None;
    let mut first: Option<&str> = None;
    for control in layout {
        if let FolderControl::FilterDial { key, bus: marked } = control {
            if first.is_none() {
                first = Some(key);
            }
            if *marked {
                match bus {
                    None => bus = Some(key),
                    Some(existing) => warn!(
                        "filter {} also marked as bus, keeping {}",
                        key, existing
                    ),
                }
            }
        }
    }
    bus.or(first).map(String::from)
}

fn build_filters(doc: &CatalogDocument, bus_key: Option<&str>) -> Vec<FolderFilter> {
    let mut filters = Vec::new();
    for control in &doc.layout {
        let FolderControl::FilterDial { key, .. } = control else {
            continue;
        };
        let is_bus = bus_key == Some(key.as_str());
        let mut options = vec![OPTION_ALL.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([OPTION_ALL]);
        if is_bus && !doc.favorites.is_empty() {
            options.push(OPTION_FAVORITE.to_string());
            seen.insert(OPTION_FAVORITE);
        }
        match doc.filter_options.get(key) {
            Some(values) => {
                for value in values {
                    if seen.insert(value) {
                        options.push(value.clone());
                    }
                }
            }
            None => warn!("no option list for filter {}", key),
        }
        filters.push(FolderFilter {
            key: key.clone(),
            options,
            selected: 0,
            is_bus,
        });
    }
    filters
}

/// Slot 0 is always the back control; the rest fill with filter and page
/// dials first, then placeholders, in declaration order.
fn assign_slots(layout: &[FolderControl]) -> [RotarySlot; ROTARY_SLOTS] {
    let mut slots = [RotarySlot::Unassigned; ROTARY_SLOTS];
    slots[0] = RotarySlot::Navigation;
    let mut next = 1;
    let mut filter_index = 0;

    for control in layout {
        let assignment = match control {
            FolderControl::FilterDial { .. } => {
                let slot = RotarySlot::Filter(filter_index);
                filter_index += 1;
                slot
            }
            FolderControl::PageDial => RotarySlot::Page,
            FolderControl::NavigationDial | FolderControl::PlaceholderDial => continue,
        };
        if next >= ROTARY_SLOTS {
            warn!("more controls than rotary slots, ignoring {:?}", control);
            continue;
        }
        slots[next] = assignment;
        next += 1;
    }
    for control in layout {
        if !matches!(control, FolderControl::PlaceholderDial) {
            continue;
        }
        if next >= ROTARY_SLOTS {
            break;
        }
        slots[next] = RotarySlot::Placeholder;
        next += 1;
    }
    slots
}
