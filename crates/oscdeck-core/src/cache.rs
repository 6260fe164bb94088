//! Last-write-wins state cache with change notification
//!
//! One explicitly constructed instance per process, shared by `Arc`. Writes
//! come from the transport's decode loop; reads come from every UI element.
//! Subscribers are notified synchronously on the writing task, so a slow
//! subscriber delays the next inbound message. Acceptable at control-surface
//! message rates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::value::OscArg;

/// Last-known value for one OSC address
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Numeric state
    Numeric(f32),
    /// Textual state
    Text(String),
}

impl From<&OscArg> for CachedValue {
    fn from(arg: &OscArg) -> Self {
        match arg {
            OscArg::Text(s) => CachedValue::Text(s.clone()),
            other => CachedValue::Numeric(other.as_float().unwrap_or(0.0)),
        }
    }
}

impl From<OscArg> for CachedValue {
    fn from(arg: OscArg) -> Self {
        CachedValue::from(&arg)
    }
}

/// Change event delivered to cache subscribers
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Address that changed
    pub address: String,
    /// Numeric value; NaN when the payload is textual
    pub value: f32,
    /// Textual value, when present
    pub text: Option<String>,
    /// Whether the stored value is textual
    pub is_string: bool,
}

impl StateChange {
    fn new(address: &str, value: &CachedValue) -> Self {
        match value {
            CachedValue::Numeric(v) => StateChange {
                address: address.to_string(),
                value: *v,
                text: None,
                is_string: false,
            },
            CachedValue::Text(s) => StateChange {
                address: address.to_string(),
                value: f32::NAN,
                text: Some(s.clone()),
                is_string: true,
            },
        }
    }
}

type Callback = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Process-wide map from OSC address to last-known value
#[derive(Default)]
pub struct StateCache {
    values: RwLock<HashMap<String, CachedValue>>,
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

impl StateCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a value, overwriting any prior one, and notify all subscribers
    pub fn update(&self, address: &str, value: CachedValue) {
        trace!("cache update {} = {:?}", address, value);
        let change = StateChange::new(address, &value);
        self.values.write().insert(address.to_string(), value);

        // Snapshot under the lock, invoke outside it, so a callback may
        // subscribe, unsubscribe, or read the cache without deadlocking.
        let snapshot: Vec<Callback> = {
            let subs = self.subscribers.lock();
            subs.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in snapshot {
            cb(&change);
        }
    }

    /// Numeric read; 0.0 when absent or textual
    pub fn get(&self, address: &str) -> f32 {
        match self.values.read().get(address) {
            Some(CachedValue::Numeric(v)) => *v,
            _ => 0.0,
        }
    }

    /// Typed read of whatever is stored
    pub fn get_raw(&self, address: &str) -> Option<CachedValue> {
        self.values.read().get(address).cloned()
    }

    /// Textual read; None when absent or numeric
    pub fn get_string(&self, address: &str) -> Option<String> {
        match self.values.read().get(address) {
            Some(CachedValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Number of addresses currently cached
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Register a change callback; the subscription ends when the returned
    /// guard is dropped
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            cache: Arc::downgrade(self),
            id,
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
    }
}

/// RAII guard for a cache subscription; dropping it unsubscribes
pub struct Subscription {
    cache: Weak<StateCache>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_defaults_to_zero() {
        let cache = StateCache::new();
        assert_eq!(cache.get("/Track/1/Mute"), 0.0);
        assert_eq!(cache.get_raw("/Track/1/Mute"), None);
    }

    #[test]
    fn test_last_write_wins_across_types() {
        let cache = StateCache::new();
        cache.update("/Fx/Name", CachedValue::Numeric(1.0));
        assert_eq!(cache.get("/Fx/Name"), 1.0);

        cache.update("/Fx/Name", CachedValue::Text("Pro-Q 3".to_string()));
        assert_eq!(cache.get("/Fx/Name"), 0.0);
        assert_eq!(cache.get_string("/Fx/Name"), Some("Pro-Q 3".to_string()));

        cache.update("/Fx/Name", CachedValue::Numeric(0.5));
        assert_eq!(cache.get("/Fx/Name"), 0.5);
        assert_eq!(cache.get_string("/Fx/Name"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_numeric_change_event() {
        let cache = StateCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = cache.subscribe(move |change| {
            seen_clone.lock().push(change.clone());
        });

        cache.update("/Master/Volume", CachedValue::Numeric(0.8));

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].address, "/Master/Volume");
        assert_eq!(events[0].value, 0.8);
        assert!(!events[0].is_string);
        assert_eq!(events[0].text, None);
    }

    #[test]
    fn test_text_change_event_has_nan_value() {
        let cache = StateCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = cache.subscribe(move |change| {
            seen_clone.lock().push(change.clone());
        });

        cache.update("/Fx/Preset", CachedValue::Text("Warm".to_string()));

        let events = seen.lock();
        assert!(events[0].value.is_nan());
        assert!(events[0].is_string);
        assert_eq!(events[0].text, Some("Warm".to_string()));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let cache = StateCache::new();
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = count.clone();
        let sub = cache.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(cache.subscriber_count(), 1);

        cache.update("/A", CachedValue::Numeric(1.0));
        assert_eq!(count.load(Ordering::Relaxed), 1);

        drop(sub);
        assert_eq!(cache.subscriber_count(), 0);
        cache.update("/A", CachedValue::Numeric(2.0));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_multiple_subscribers_all_notified() {
        let cache = StateCache::new();
        let count = Arc::new(AtomicU64::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        let _s1 = cache.subscribe(move |_| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let _s2 = cache.subscribe(move |_| {
            c2.fetch_add(1, Ordering::Relaxed);
        });

        cache.update("/B", CachedValue::Numeric(1.0));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_subscriber_may_read_cache() {
        let cache = StateCache::new();
        let observed = Arc::new(Mutex::new(0.0f32));
        let cache_clone = cache.clone();
        let observed_clone = observed.clone();
        let _sub = cache.subscribe(move |change| {
            // Reads during notification must not deadlock
            *observed_clone.lock() = cache_clone.get(&change.address);
        });

        cache.update("/C", CachedValue::Numeric(0.25));
        assert_eq!(*observed.lock(), 0.25);
    }

    #[test]
    fn test_cached_value_from_arg() {
        assert_eq!(
            CachedValue::from(&OscArg::Float(0.5)),
            CachedValue::Numeric(0.5)
        );
        assert_eq!(CachedValue::from(&OscArg::Int(3)), CachedValue::Numeric(3.0));
        assert_eq!(
            CachedValue::from(&OscArg::Bool(true)),
            CachedValue::Numeric(1.0)
        );
        assert_eq!(
            CachedValue::from(&OscArg::Text("x".to_string())),
            CachedValue::Text("x".to_string())
        );
    }
}
