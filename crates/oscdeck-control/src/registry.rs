//! Action registry: descriptors to live OSC behavior
//!
//! The registry is the sole point where presses and turns become outbound
//! messages. Visible toggle state follows device feedback through the state
//! cache; nothing here flips optimistically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use oscdeck_core::{OscArg, StateCache, StateChange, Subscription};

use crate::descriptor::{ActionConfig, ActionDescriptor, ActionKind, ParameterOption};
use crate::transport::{OscSender, RelevanceFilter};

/// Tunables for the tick-dial acceleration model.
///
/// The bounds are heuristic; treat them as configuration, not as something
/// to re-derive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickAcceleration {
    /// Scale applied to the inverse-elapsed speed factor
    pub factor: f32,
    /// Lower burst clamp
    pub min_burst: u32,
    /// Upper burst clamp
    pub max_burst: u32,
    /// Floor for the elapsed time entering the speed factor
    pub min_interval: Duration,
}

impl Default for TickAcceleration {
    fn default() -> Self {
        Self {
            factor: 0.05,
            min_burst: 1,
            max_burst: 10,
            min_interval: Duration::from_millis(1),
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long a trigger button stays highlighted after a press
    pub flash_duration: Duration,
    /// Tick-dial acceleration tunables
    pub acceleration: TickAcceleration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            flash_duration: Duration::from_millis(200),
            acceleration: TickAcceleration::default(),
        }
    }
}

impl RegistryConfig {
    pub fn with_flash_duration(mut self, duration: Duration) -> Self {
        self.flash_duration = duration;
        self
    }

    pub fn with_acceleration(mut self, acceleration: TickAcceleration) -> Self {
        self.acceleration = acceleration;
        self
    }
}

/// Notifications for the embedding device layer
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// Feedback for a registered address arrived
    StateChanged(String),
    /// A trigger highlight started
    FlashStarted(String),
    /// A trigger highlight ended
    FlashEnded(String),
}

/// Burst size for one rotation event.
///
/// `speed = 1 / max(elapsed, min_interval)`, then
/// `clamp(|ticks| * factor * speed, min_burst, max_burst)`. Faster spins
/// produce more messages per tick.
pub fn burst_for(ticks: i32, elapsed: Duration, accel: &TickAcceleration) -> u32 {
    let elapsed = elapsed.max(accel.min_interval);
    let speed = 1.0 / elapsed.as_secs_f32();
    let raw = ticks.unsigned_abs() as f32 * accel.factor * speed;
    (raw as u32).clamp(accel.min_burst, accel.max_burst)
}

/// The canonical mapping from descriptors to live behavior
pub struct ActionRegistry {
    inner: Arc<RegistryInner>,
    _cache_sub: Subscription,
}

struct RegistryInner {
    config: RegistryConfig,
    sender: Arc<dyn OscSender>,
    cache: Arc<StateCache>,
    descriptors: RwLock<HashMap<String, ActionDescriptor>>,
    toggle_states: RwLock<HashMap<String, bool>>,
    dial_modes: RwLock<HashMap<String, bool>>,
    param_indices: RwLock<HashMap<String, usize>>,
    select_mode: AtomicBool,
    flashing: RwLock<HashSet<String>>,
    flash_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    last_ticks: Mutex<HashMap<String, Instant>>,
    relevant: Arc<RwLock<HashSet<String>>>,
    events: mpsc::UnboundedSender<RegistryEvent>,
}

impl ActionRegistry {
    /// Build a registry wired to the cache and the outbound sender.
    ///
    /// The returned receiver carries [`RegistryEvent`]s for the device layer.
    pub fn new(
        cache: Arc<StateCache>,
        sender: Arc<dyn OscSender>,
        config: RegistryConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(RegistryInner {
            config,
            sender,
            cache: cache.clone(),
            descriptors: RwLock::new(HashMap::new()),
            toggle_states: RwLock::new(HashMap::new()),
            dial_modes: RwLock::new(HashMap::new()),
            param_indices: RwLock::new(HashMap::new()),
            select_mode: AtomicBool::new(false),
            flashing: RwLock::new(HashSet::new()),
            flash_timers: Mutex::new(HashMap::new()),
            last_ticks: Mutex::new(HashMap::new()),
            relevant: Arc::new(RwLock::new(HashSet::new())),
            events: events_tx,
        });

        let weak = Arc::downgrade(&inner);
        let cache_sub = cache.subscribe(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_feedback(change);
            }
        });

        (
            Self {
                inner,
                _cache_sub: cache_sub,
            },
            events_rx,
        )
    }

    /// Register one descriptor under its canonical address.
    ///
    /// Address collisions keep the first registration and drop the second,
    /// with a diagnostic naming both descriptors.
    pub fn register(&self, descriptor: ActionDescriptor) -> bool {
        let mut descriptors = self.inner.descriptors.write();
        if let Some(existing) = descriptors.get(&descriptor.address) {
            warn!(
                "address {} already registered to \"{}\", dropping \"{}\"",
                descriptor.address, existing.display_name, descriptor.display_name
            );
            return false;
        }
        debug!(
            "registered {:?} \"{}\" at {}",
            descriptor.kind, descriptor.display_name, descriptor.address
        );
        self.inner.relevant.write().insert(descriptor.address.clone());
        descriptors.insert(descriptor.address.clone(), descriptor);
        true
    }

    /// Register every descriptor of a loaded document; returns how many stuck
    pub fn register_config(&self, config: &ActionConfig) -> usize {
        let mut registered = 0;
        for descriptor in config.descriptors() {
            if self.register(descriptor.clone()) {
                registered += 1;
            }
        }
        registered
    }

    /// Predicate handed to the transport: is this address worth caching?
    pub fn relevance_filter(&self) -> RelevanceFilter {
        let relevant = self.inner.relevant.clone();
        Arc::new(move |address: &str| relevant.read().contains(address))
    }

    /// Extend the relevant-address set, e.g. with folder item addresses
    pub fn add_relevant_addresses<I>(&self, addresses: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.inner.relevant.write().extend(addresses);
    }

    /// Handle a press on the element at `address`.
    ///
    /// Returns whether the element needs an immediate redraw. Unknown
    /// addresses are logged no-ops.
    pub fn press(&self, address: &str) -> bool {
        let Some(descriptor) = self.descriptor(address) else {
            warn!("press on unknown address {}", address);
            return false;
        };
        match descriptor.kind {
            ActionKind::TriggerButton => {
                self.inner.start_flash(&descriptor.address);
                self.inner.sender.send(&descriptor.address, OscArg::Float(1.0));
                true
            }
            ActionKind::ToggleButton | ActionKind::ToggleDial => {
                self.inner.send_toggle(&descriptor.address);
                false
            }
            ActionKind::TickDial => {
                let reset = descriptor.effective_reset();
                debug!("reset {} via {}", descriptor.address, reset);
                self.inner.sender.send(&reset, OscArg::Float(1.0));
                false
            }
            ActionKind::TwoModeTickDial => {
                let mode2 = !self.dial_mode(&descriptor.address);
                self.inner
                    .dial_modes
                    .write()
                    .insert(descriptor.address.clone(), mode2);
                debug!("dial {} mode2 = {}", descriptor.address, mode2);
                true
            }
            ActionKind::ParameterDial => {
                debug!("parameter dial {} press has no action", descriptor.address);
                false
            }
            ActionKind::ParameterButton => {
                self.inner.send_selected_option(&descriptor);
                false
            }
            ActionKind::SelectModeButton => {
                let mode = !self.inner.select_mode.load(Ordering::SeqCst);
                self.inner.select_mode.store(mode, Ordering::SeqCst);
                debug!("select mode = {}", mode);
                true
            }
            ActionKind::FilterDial
            | ActionKind::PageDial
            | ActionKind::NavigationDial
            | ActionKind::PlaceholderDial => {
                warn!(
                    "{:?} at {} pressed outside a folder",
                    descriptor.kind, descriptor.address
                );
                false
            }
        }
    }

    /// Handle a rotation of `ticks` on the element at `address`.
    ///
    /// Positive ticks are clockwise. Returns whether the element needs an
    /// immediate redraw.
    pub fn turn(&self, address: &str, ticks: i32) -> bool {
        if ticks == 0 {
            return false;
        }
        let Some(descriptor) = self.descriptor(address) else {
            warn!("turn on unknown address {}", address);
            return false;
        };
        match descriptor.kind {
            ActionKind::TickDial => {
                self.inner.send_burst(&descriptor, ticks, false);
                false
            }
            ActionKind::TwoModeTickDial => {
                let mode2 = self.dial_mode(&descriptor.address);
                self.inner.send_burst(&descriptor, ticks, mode2);
                false
            }
            ActionKind::ToggleDial => {
                self.inner.send_toggle(&descriptor.address);
                false
            }
            ActionKind::ParameterDial => {
                self.inner.cycle_option(&descriptor, ticks);
                true
            }
            ActionKind::FilterDial
            | ActionKind::PageDial
            | ActionKind::NavigationDial
            | ActionKind::PlaceholderDial => {
                warn!(
                    "{:?} at {} turned outside a folder",
                    descriptor.kind, descriptor.address
                );
                false
            }
            ActionKind::TriggerButton
            | ActionKind::ToggleButton
            | ActionKind::ParameterButton
            | ActionKind::SelectModeButton => {
                warn!(
                    "turn is not meaningful for {:?} at {}",
                    descriptor.kind, descriptor.address
                );
                false
            }
        }
    }

    /// Authoritative toggle state, fed only by device feedback
    pub fn toggle_state(&self, address: &str) -> bool {
        match self.inner.toggle_states.read().get(address) {
            Some(state) => *state,
            None => self.inner.cache.get(address) > 0.5,
        }
    }

    /// Whether mode 2 is active on a two-mode dial
    pub fn dial_mode(&self, address: &str) -> bool {
        self.inner
            .dial_modes
            .read()
            .get(address)
            .copied()
            .unwrap_or(false)
    }

    /// Whether a trigger is currently in its flash window
    pub fn is_flashing(&self, address: &str) -> bool {
        self.inner.flashing.read().contains(address)
    }

    /// Registry-wide select mode flag
    pub fn select_mode(&self) -> bool {
        self.inner.select_mode.load(Ordering::SeqCst)
    }

    /// The option currently selected on a parameter dial
    pub fn selected_option(&self, address: &str) -> Option<ParameterOption> {
        let descriptors = self.inner.descriptors.read();
        let descriptor = descriptors.get(address)?;
        let index = self
            .inner
            .param_indices
            .read()
            .get(address)
            .copied()
            .unwrap_or(0);
        descriptor.options.get(index).cloned()
    }

    /// Look up a descriptor by canonical address
    pub fn descriptor(&self, address: &str) -> Option<ActionDescriptor> {
        self.inner.descriptors.read().get(address).cloned()
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.inner.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.descriptors.read().is_empty()
    }

    /// The outbound sender, shared with higher layers such as folders
    pub fn sender(&self) -> Arc<dyn OscSender> {
        self.inner.sender.clone()
    }

    /// Abort pending flash timers; dropping the registry also unsubscribes
    /// from the cache
    pub fn shutdown(&self) {
        let mut timers = self.inner.flash_timers.lock();
        for (_, timer) in timers.drain() {
            timer.abort();
        }
        self.inner.flashing.write().clear();
        debug!("registry shut down");
    }
}

impl Drop for ActionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RegistryInner {
    fn on_feedback(&self, change: &StateChange) {
        let kind = match self.descriptors.read().get(&change.address) {
            Some(descriptor) => descriptor.kind,
            None => return,
        };
        if matches!(kind, ActionKind::ToggleButton | ActionKind::ToggleDial) && !change.is_string {
            let on = change.value > 0.5;
            self.toggle_states
                .write()
                .insert(change.address.clone(), on);
            debug!("toggle {} -> {}", change.address, on);
        }
        let _ = self
            .events
            .send(RegistryEvent::StateChanged(change.address.clone()));
    }

    fn send_toggle(&self, address: &str) {
        let current = match self.toggle_states.read().get(address) {
            Some(state) => *state,
            None => self.cache.get(address) > 0.5,
        };
        // Send the opposite and wait: the visible state only flips when
        // feedback for this address comes back through the cache.
        let value = if current { 0.0 } else { 1.0 };
        debug!("toggle {} requests {}", address, value);
        self.sender.send(address, OscArg::Float(value));
    }

    fn start_flash(self: &Arc<Self>, address: &str) {
        // A repeat press restarts the flash: retire the pending timer
        // before the new mark goes in
        if let Some(previous) = self.flash_timers.lock().remove(address) {
            previous.abort();
        }
        self.flashing.write().insert(address.to_string());
        let _ = self
            .events
            .send(RegistryEvent::FlashStarted(address.to_string()));

        let weak = Arc::downgrade(self);
        let addr = address.to_string();
        let duration = self.config.flash_duration;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(inner) = weak.upgrade() {
                inner.flashing.write().remove(&addr);
                inner.flash_timers.lock().remove(&addr);
                let _ = inner.events.send(RegistryEvent::FlashEnded(addr));
            }
        });
        self.flash_timers.lock().insert(address.to_string(), timer);
    }

    fn send_burst(&self, descriptor: &ActionDescriptor, ticks: i32, mode2: bool) {
        let count = self.burst_count(&descriptor.address, ticks);
        let address = if ticks > 0 {
            descriptor.effective_increase(mode2)
        } else {
            descriptor.effective_decrease(mode2)
        };
        debug!("burst of {} to {}", count, address);
        // Sequential on purpose: increments must leave in generation order
        for _ in 0..count {
            self.sender.send(&address, OscArg::Float(1.0));
        }
    }

    fn burst_count(&self, address: &str, ticks: i32) -> u32 {
        let now = Instant::now();
        let elapsed = {
            let mut last_ticks = self.last_ticks.lock();
            let elapsed = last_ticks
                .get(address)
                .map(|last| now.duration_since(*last))
                .unwrap_or(Duration::from_secs(1));
            last_ticks.insert(address.to_string(), now);
            elapsed
        };
        burst_for(ticks, elapsed, &self.config.acceleration)
    }

    fn cycle_option(&self, descriptor: &ActionDescriptor, ticks: i32) {
        let len = descriptor.options.len();
        if len == 0 {
            warn!("parameter dial {} has no options", descriptor.address);
            return;
        }
        let mut indices = self.param_indices.write();
        let current = indices.entry(descriptor.address.clone()).or_insert(0);
        let step: i64 = if ticks > 0 { 1 } else { -1 };
        *current = ((*current as i64 + step).rem_euclid(len as i64)) as usize;
        debug!(
            "parameter dial {} -> \"{}\"",
            descriptor.address, descriptor.options[*current].label
        );
    }

    fn send_selected_option(&self, button: &ActionDescriptor) {
        let Some(dial_address) = button.companion_address.as_deref() else {
            warn!("parameter button {} has no companion dial", button.address);
            return;
        };
        let option = {
            let descriptors = self.descriptors.read();
            let Some(dial) = descriptors.get(dial_address) else {
                warn!(
                    "companion dial {} for {} is not registered",
                    dial_address, button.address
                );
                return;
            };
            let index = self
                .param_indices
                .read()
                .get(dial_address)
                .copied()
                .unwrap_or(0);
            match dial.options.get(index) {
                Some(option) => option.clone(),
                None => {
                    warn!("parameter dial {} has no option {}", dial_address, index);
                    return;
                }
            }
        };
        debug!("parameter button {} fires \"{}\"", button.address, option.label);
        self.sender.send(&option.address, OscArg::Float(1.0));
    }
}
