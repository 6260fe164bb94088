//! Declarative button/dial descriptors
//!
//! Descriptors are loaded from JSON configuration documents, grouped by
//! category, and are immutable after load. Each one owns exactly one
//! canonical OSC address used as its registry key.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The closed set of action kinds a descriptor can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Momentary button: sends a fixed 1 and flashes briefly
    TriggerButton,
    /// Button that sends the opposite of the cached state
    ToggleButton,
    /// Dial whose turn/press behaves like a toggle button
    ToggleDial,
    /// Relative dial sending increment/decrement bursts
    TickDial,
    /// Tick dial with two address pairs selected by a local mode flag
    #[serde(rename = "2ModeTickDial")]
    TwoModeTickDial,
    /// Dial cycling a local list of string options, no device address
    ParameterDial,
    /// Button firing the option currently selected on a companion dial
    ParameterButton,
    /// Folder furniture: selects a filter value
    FilterDial,
    /// Folder furniture: turns pages
    PageDial,
    /// Folder furniture: closes the folder
    NavigationDial,
    /// Flips the registry-wide select mode flag, purely client-side
    SelectModeButton,
    /// Folder furniture: inert filler
    PlaceholderDial,
}

impl ActionKind {
    /// Kinds that only act inside a dynamic folder
    pub fn is_folder_control(&self) -> bool {
        matches!(
            self,
            ActionKind::FilterDial
                | ActionKind::PageDial
                | ActionKind::NavigationDial
                | ActionKind::PlaceholderDial
        )
    }
}

/// One selectable option of a parameter dial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterOption {
    /// Label shown on the companion button
    pub label: String,
    /// Action address fired when the companion button is pressed
    pub address: String,
}

/// Display hints consumed by the drawing layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStyle {
    /// Background color, e.g. "#202020"
    #[serde(default)]
    pub background: Option<String>,
    /// Text color
    #[serde(default)]
    pub text_color: Option<String>,
    /// Font size hint
    #[serde(default)]
    pub font_size: Option<u8>,
}

/// A declarative button/dial definition, immutable after load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Name shown on the surface
    pub display_name: String,
    /// Category the descriptor was loaded under
    #[serde(default)]
    pub group_name: String,
    /// Action kind, matched exhaustively by the registry
    #[serde(rename = "actionType")]
    pub kind: ActionKind,
    /// Canonical OSC address, the registry key
    pub address: String,
    /// Increment address override for tick dials
    #[serde(default)]
    pub increase_address: Option<String>,
    /// Decrement address override for tick dials
    #[serde(default)]
    pub decrease_address: Option<String>,
    /// Reset address override for dial presses
    #[serde(default)]
    pub reset_address: Option<String>,
    /// Mode-2 increment address for two-mode dials
    #[serde(default)]
    pub mode2_increase_address: Option<String>,
    /// Mode-2 decrement address for two-mode dials
    #[serde(default)]
    pub mode2_decrease_address: Option<String>,
    /// Label shown while mode 2 is active
    #[serde(default)]
    pub mode2_label: Option<String>,
    /// Options of a parameter dial
    #[serde(default)]
    pub options: Vec<ParameterOption>,
    /// Canonical address of the companion parameter dial
    #[serde(default)]
    pub companion_address: Option<String>,
    /// Display hints
    #[serde(default)]
    pub style: DisplayStyle,
}

impl ActionDescriptor {
    pub fn new(
        display_name: impl Into<String>,
        group_name: impl Into<String>,
        kind: ActionKind,
        address: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            group_name: group_name.into(),
            kind,
            address: address.into(),
            increase_address: None,
            decrease_address: None,
            reset_address: None,
            mode2_increase_address: None,
            mode2_decrease_address: None,
            mode2_label: None,
            options: Vec::new(),
            companion_address: None,
            style: DisplayStyle::default(),
        }
    }

    pub fn with_increase_address(mut self, address: impl Into<String>) -> Self {
        self.increase_address = Some(address.into());
        self
    }

    pub fn with_decrease_address(mut self, address: impl Into<String>) -> Self {
        self.decrease_address = Some(address.into());
        self
    }

    pub fn with_reset_address(mut self, address: impl Into<String>) -> Self {
        self.reset_address = Some(address.into());
        self
    }

    pub fn with_mode2_addresses(
        mut self,
        increase: impl Into<String>,
        decrease: impl Into<String>,
    ) -> Self {
        self.mode2_increase_address = Some(increase.into());
        self.mode2_decrease_address = Some(decrease.into());
        self
    }

    pub fn with_mode2_label(mut self, label: impl Into<String>) -> Self {
        self.mode2_label = Some(label.into());
        self
    }

    pub fn with_options(mut self, options: Vec<ParameterOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_companion_address(mut self, address: impl Into<String>) -> Self {
        self.companion_address = Some(address.into());
        self
    }

    /// Reset address: the override, or `{canonical}/Reset`
    pub fn effective_reset(&self) -> String {
        self.reset_address
            .clone()
            .unwrap_or_else(|| format!("{}/Reset", self.address))
    }

    /// Increment address for the active mode
    pub fn effective_increase(&self, mode2: bool) -> String {
        if mode2 {
            if let Some(addr) = &self.mode2_increase_address {
                return addr.clone();
            }
        }
        self.increase_address
            .clone()
            .unwrap_or_else(|| format!("{}/Increase", self.address))
    }

    /// Decrement address for the active mode
    pub fn effective_decrease(&self, mode2: bool) -> String {
        if mode2 {
            if let Some(addr) = &self.mode2_decrease_address {
                return addr.clone();
            }
        }
        self.decrease_address
            .clone()
            .unwrap_or_else(|| format!("{}/Decrease", self.address))
    }
}

/// A full descriptor document: categories in document order, each holding
/// its descriptors in document order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(flatten)]
    pub groups: IndexMap<String, Vec<ActionDescriptor>>,
}

impl ActionConfig {
    /// Parse a descriptor document from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: ActionConfig = serde_json::from_str(json)?;
        for (group, descriptors) in config.groups.iter_mut() {
            for descriptor in descriptors.iter_mut() {
                if descriptor.group_name.is_empty() {
                    descriptor.group_name = group.clone();
                }
            }
        }
        Ok(config)
    }

    /// Load a descriptor document from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// All descriptors in document order
    pub fn descriptors(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.groups.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_addresses_default_to_suffixes() {
        let descriptor =
            ActionDescriptor::new("Volume", "Track", ActionKind::TickDial, "/Track/1/Volume");
        assert_eq!(descriptor.effective_reset(), "/Track/1/Volume/Reset");
        assert_eq!(descriptor.effective_increase(false), "/Track/1/Volume/Increase");
        assert_eq!(descriptor.effective_decrease(false), "/Track/1/Volume/Decrease");
    }

    #[test]
    fn test_mode2_addresses_fall_back_to_mode1() {
        let descriptor =
            ActionDescriptor::new("Pan", "Track", ActionKind::TwoModeTickDial, "/Track/1/Pan")
                .with_increase_address("/Track/1/Pan/Right")
                .with_decrease_address("/Track/1/Pan/Left")
                .with_mode2_addresses("/Track/1/Width/Plus", "/Track/1/Width/Minus");

        assert_eq!(descriptor.effective_increase(false), "/Track/1/Pan/Right");
        assert_eq!(descriptor.effective_increase(true), "/Track/1/Width/Plus");
        assert_eq!(descriptor.effective_decrease(true), "/Track/1/Width/Minus");

        let no_mode2 =
            ActionDescriptor::new("Send", "Track", ActionKind::TwoModeTickDial, "/Track/1/Send");
        assert_eq!(no_mode2.effective_increase(true), "/Track/1/Send/Increase");
    }

    #[test]
    fn test_config_from_json_fills_group_names() {
        let json = r##"{
            "Track": [
                {
                    "displayName": "Mute",
                    "actionType": "ToggleButton",
                    "address": "/Track/1/Mute"
                },
                {
                    "displayName": "Volume",
                    "actionType": "TickDial",
                    "address": "/Track/1/Volume",
                    "increaseAddress": "/Track/1/Volume/Up",
                    "decreaseAddress": "/Track/1/Volume/Down"
                }
            ],
            "Transport": [
                {
                    "displayName": "Play",
                    "actionType": "TriggerButton",
                    "address": "/Play",
                    "style": { "background": "#104010" }
                }
            ]
        }"##;

        let config = ActionConfig::from_json(json).unwrap();
        assert_eq!(config.len(), 3);

        let descriptors: Vec<_> = config.descriptors().collect();
        assert_eq!(descriptors[0].group_name, "Track");
        assert_eq!(descriptors[0].kind, ActionKind::ToggleButton);
        assert_eq!(descriptors[1].increase_address.as_deref(), Some("/Track/1/Volume/Up"));
        assert_eq!(descriptors[2].group_name, "Transport");
        assert_eq!(descriptors[2].style.background.as_deref(), Some("#104010"));
    }

    #[test]
    fn test_two_mode_kind_tag() {
        let json = r#"{
            "Fx": [
                {
                    "displayName": "Freq",
                    "actionType": "2ModeTickDial",
                    "address": "/Fx/Freq",
                    "mode2Label": "Fine"
                }
            ]
        }"#;
        let config = ActionConfig::from_json(json).unwrap();
        let descriptor = config.descriptors().next().unwrap();
        assert_eq!(descriptor.kind, ActionKind::TwoModeTickDial);
        assert_eq!(descriptor.mode2_label.as_deref(), Some("Fine"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(ActionConfig::from_json("{ not json").is_err());
        assert!(ActionConfig::from_json(r#"{"Track": [{"displayName": "X"}]}"#).is_err());
    }

    #[test]
    fn test_folder_control_kinds() {
        assert!(ActionKind::FilterDial.is_folder_control());
        assert!(ActionKind::PlaceholderDial.is_folder_control());
        assert!(!ActionKind::TickDial.is_folder_control());
        assert!(!ActionKind::SelectModeButton.is_folder_control());
    }
}
