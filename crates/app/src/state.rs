//! Application state store: one JSON tree addressed by dotted paths.
//!
//! Every mutation goes through the store so it can record a diagnostic
//! history entry, persist allow-listed top-level branches and announce the
//! change on the event bus. Reads hand out copies; callers never hold a
//! reference into the tree.

pub mod persistence;
pub mod selectors;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};

use homedash_domain::error::StateError;
use homedash_domain::event::Event;
use homedash_domain::path::{self, StatePath};
use homedash_domain::state_change::StateChange;
use homedash_domain::time::now;
use homedash_domain::topic;

use crate::event_bus::{EventBus, Subscription};
use crate::ports::SnapshotStore;

use self::persistence::{PersistCommand, storage_key};
use self::selectors::Selector;

/// Top-level keys persisted when no configuration says otherwise.
pub const DEFAULT_PERSISTED_KEYS: &[&str] = &["temperatureHistory", "motionHistory", "uiPositions"];

/// Default number of changes kept for [`StateStore::get_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Top-level branch the store maintains itself from lifecycle events.
const APP_KEY: &str = "app";

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub history_limit: usize,
    /// Top-level keys written through to durable storage.
    pub persisted_keys: Vec<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            persisted_keys: DEFAULT_PERSISTED_KEYS
                .iter()
                .map(|key| (*key).to_string())
                .collect(),
        }
    }
}

/// Per-write flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Skip change notifications.
    pub silent: bool,
    /// Persist the top-level key even if it is not allow-listed.
    pub persist: bool,
}

impl SetOptions {
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            silent: true,
            persist: false,
        }
    }

    #[must_use]
    pub const fn persisted() -> Self {
        Self {
            silent: false,
            persist: true,
        }
    }
}

/// Result of one write, captured while the tree lock was held.
struct Written {
    old_value: Option<Value>,
    new_value: Value,
    top_value: Option<Value>,
}

pub struct StateStore {
    bus: Arc<EventBus>,
    tree: Mutex<Value>,
    history: Mutex<VecDeque<StateChange>>,
    history_limit: usize,
    persisted_keys: Vec<String>,
    selectors: Mutex<HashMap<String, Selector>>,
    persister: mpsc::UnboundedSender<PersistCommand>,
    /// Receiving end of the persist queue until [`StateStore::init`] hands
    /// it to the persister task.
    pending: Mutex<Option<mpsc::UnboundedReceiver<PersistCommand>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl StateStore {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, config: StateConfig) -> Self {
        let (persister, pending) = mpsc::unbounded_channel();
        let selectors = selectors::defaults()
            .into_iter()
            .map(|(name, selector)| (name.to_string(), selector))
            .collect();
        Self {
            bus,
            tree: Mutex::new(Value::Object(Map::new())),
            history: Mutex::new(VecDeque::with_capacity(config.history_limit)),
            history_limit: config.history_limit,
            persisted_keys: config.persisted_keys,
            selectors: Mutex::new(selectors),
            persister,
            pending: Mutex::new(Some(pending)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Copy of the value at `path`; absent (or an invalid path) reads as `None`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = StatePath::parse(path).ok()?;
        path::lookup(&self.lock_tree(), &path).cloned()
    }

    /// Copy of the whole tree.
    #[must_use]
    pub fn get_all(&self) -> Value {
        self.lock_tree().clone()
    }

    /// Write `value` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] if `path` is not a valid dotted path.
    pub fn set(&self, path: &str, value: Value, options: SetOptions) -> Result<(), StateError> {
        let path = StatePath::parse(path)?;
        let written = self.write(&path, options, |_| value);
        if !options.silent {
            self.notify_changed(&path, &written);
        }
        Ok(())
    }

    /// Shallow-merge `partial` onto the object at `path`.
    ///
    /// If either side is not an object, `partial` replaces the current value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] if `path` is not a valid dotted path.
    pub fn update(&self, path: &str, partial: Value, options: SetOptions) -> Result<(), StateError> {
        let path = StatePath::parse(path)?;
        let written = self.write(&path, options, |current| merge(current, partial));
        if !options.silent {
            self.notify_changed(&path, &written);
        }
        Ok(())
    }

    /// Append `value` to the array at `path`, dropping the oldest entries
    /// beyond `max_length`.
    ///
    /// A missing or non-array value starts a fresh array.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] if `path` is not a valid dotted path.
    pub fn push(&self, path: &str, value: Value, max_length: Option<usize>) -> Result<(), StateError> {
        let path = StatePath::parse(path)?;
        let options = SetOptions::default();
        let written = self.write(&path, options, |current| {
            let mut items: VecDeque<Value> = match current {
                Some(Value::Array(items)) => items.iter().cloned().collect(),
                _ => VecDeque::new(),
            };
            items.push_back(value);
            if let Some(max) = max_length {
                while items.len() > max {
                    items.pop_front();
                }
            }
            Value::Array(items.into())
        });
        self.notify_changed(&path, &written);
        Ok(())
    }

    /// Delete the leaf at `path`, returning what was there.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] if `path` is not a valid dotted path.
    pub fn remove(&self, path: &str) -> Result<Option<Value>, StateError> {
        let path = StatePath::parse(path)?;
        let (removed, top_value) = {
            let mut tree = self.lock_tree();
            let removed = path::detach(&mut tree, &path);
            let top_value = tree.get(path.top_level()).cloned();
            (removed, top_value)
        };
        let Some(removed) = removed else {
            return Ok(None);
        };

        self.record(StateChange::new(path.as_str(), Some(removed.clone()), Value::Null));
        if self.is_persisted(path.top_level()) {
            self.queue_snapshot(path.top_level(), top_value);
        }
        self.bus.emit(
            &topic::state_removed(path.as_str()),
            json!({ "path": path.as_str(), "oldValue": removed }),
        );
        Ok(Some(removed))
    }

    /// Apply several writes, announcing them with a single
    /// `state:batch:changed` event instead of one event per path.
    ///
    /// Every path is validated before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] for the first invalid path; the
    /// tree is then left untouched.
    pub fn set_many<I, K>(&self, updates: I, options: SetOptions) -> Result<(), StateError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let updates = updates
            .into_iter()
            .map(|(path, value)| Ok((StatePath::parse(path.as_ref())?, value)))
            .collect::<Result<Vec<_>, StateError>>()?;

        let mut keys = Vec::with_capacity(updates.len());
        for (path, value) in updates {
            self.write(&path, options, |_| value);
            keys.push(path.as_str().to_string());
        }
        if !options.silent {
            self.bus
                .emit(topic::STATE_BATCH_CHANGED, json!({ "keys": keys }));
        }
        Ok(())
    }

    /// Queue a snapshot of an allow-listed top-level key.
    ///
    /// Returns `false` if the key is not in the persisted set.
    pub fn persist(&self, key: &str) -> bool {
        if !self.is_persisted(key) {
            tracing::warn!(key, "refusing to persist key outside the persisted set");
            return false;
        }
        let value = self.lock_tree().get(key).cloned();
        self.queue_snapshot(key, value);
        true
    }

    /// Restore every allow-listed key found in `storage`, without
    /// notifications. Returns the keys that were restored.
    pub async fn load_persisted<S: SnapshotStore>(&self, storage: &S) -> Vec<String> {
        let mut restored = Vec::new();
        for key in &self.persisted_keys {
            match storage.load(&storage_key(key)).await {
                Ok(Some(value)) => {
                    if let Value::Object(tree) = &mut *self.lock_tree() {
                        tree.insert(key.clone(), value);
                    }
                    restored.push(key.clone());
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "failed to load state snapshot");
                }
            }
        }
        tracing::debug!(keys = ?restored, "restored persisted state");
        restored
    }

    /// Delete every snapshot the store has written.
    pub fn clear_persisted(&self) {
        self.send(PersistCommand::Clear);
    }

    /// Wait until every queued snapshot write has reached storage.
    ///
    /// Returns immediately when the store was never initialised with storage.
    pub async fn flush_persisted(&self) {
        if self.lock_pending().is_some() {
            return;
        }
        let (done, flushed) = oneshot::channel();
        self.send(PersistCommand::Flush(done));
        let _ = flushed.await;
    }

    /// Compute the named selector over the current tree.
    #[must_use]
    pub fn select(&self, name: &str) -> Option<Value> {
        let selector = self
            .selectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let Some(selector) = selector else {
            tracing::warn!(selector = name, "unknown selector");
            return None;
        };
        let tree = self.get_all();
        Some(selector(&tree))
    }

    /// Register (or replace) a named selector.
    pub fn register_selector<F>(&self, name: impl Into<String>, selector: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.selectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(selector));
    }

    /// Names of all registered selectors, sorted.
    #[must_use]
    pub fn selector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .selectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// The most recent `limit` changes, oldest first, optionally restricted
    /// to paths starting with `prefix`.
    #[must_use]
    pub fn get_history(&self, limit: usize, prefix: Option<&str>) -> Vec<StateChange> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<&StateChange> = history
            .iter()
            .filter(|change| prefix.is_none_or(|prefix| change.path.starts_with(prefix)))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Connect the store to durable storage and to lifecycle events.
    ///
    /// Migrates legacy snapshots, restores persisted keys, starts the
    /// background persister and subscribes to `app:ready`,
    /// `app:visibility` and `connection:*`. Calling it twice is a no-op.
    pub async fn init<S>(self: &Arc<Self>, storage: S)
    where
        S: SnapshotStore + Send + Sync + 'static,
    {
        let Some(mut commands) = self.lock_pending().take() else {
            tracing::warn!("state store already initialised");
            return;
        };
        let mut backlog = Vec::new();
        while let Ok(command) = commands.try_recv() {
            backlog.push(command);
        }

        let migrated = persistence::migrate_legacy(&storage, &self.persisted_keys).await;
        if !migrated.is_empty() {
            tracing::info!(keys = ?migrated, "migrated legacy state snapshots");
        }
        let restored = self.load_persisted(&storage).await;

        // Restored snapshots win over writes made before storage was attached.
        let mut superseded = 0;
        for command in backlog {
            if command
                .key()
                .is_some_and(|key| restored.iter().any(|name| name == key))
            {
                superseded += 1;
                continue;
            }
            persistence::apply(&storage, command).await;
        }
        if superseded > 0 {
            tracing::debug!(superseded, "dropped pre-init writes to restored keys");
        }
        tokio::spawn(persistence::run(storage, commands));

        let subscriptions = vec![
            self.subscribe(topic::APP_READY, |store, _| {
                store.update_app(json!({ "ready": true, "readyAt": now() }));
            }),
            self.subscribe(topic::APP_VISIBILITY, |store, event| {
                let visible = event
                    .payload
                    .as_bool()
                    .or_else(|| event.payload.get("visible").and_then(Value::as_bool));
                if let Some(visible) = visible {
                    store.update_app(json!({ "visible": visible }));
                }
            }),
            self.subscribe(&format!("{}:*", topic::CONNECTION_NAMESPACE), |store, event| {
                if let Some((service, online)) = topic::parse_connection_transition(&event.topic) {
                    store.track_offline(service, online);
                }
            }),
        ];
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(subscriptions);
        tracing::info!("state store initialised");
    }

    fn subscribe<F>(self: &Arc<Self>, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&Self, &Event) + Send + Sync + 'static,
    {
        let store: Weak<Self> = Arc::downgrade(self);
        self.bus.on(topic, move |event| {
            if let Some(store) = store.upgrade() {
                handler(&store, event);
            }
        })
    }

    fn update_app(&self, partial: Value) {
        if let Err(err) = self.update(APP_KEY, partial, SetOptions::default()) {
            tracing::warn!(error = %err, "failed to update app state");
        }
    }

    fn track_offline(&self, service: &str, online: bool) {
        let Ok(path) = StatePath::parse("app.offline") else {
            return;
        };
        let written = self.write(&path, SetOptions::default(), |current| {
            let mut offline: Vec<String> = current
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|name| *name != service)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if !online {
                offline.push(service.to_string());
            }
            offline.sort();
            json!(offline)
        });
        self.notify_changed(&path, &written);
    }

    /// Apply one write under the tree lock, then record and persist it.
    fn write<F>(&self, path: &StatePath, options: SetOptions, compute: F) -> Written
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let persist = options.persist || self.is_persisted(path.top_level());
        let written = {
            let mut tree = self.lock_tree();
            let new_value = compute(path::lookup(&tree, path));
            let old_value = path::assign(&mut tree, path, new_value.clone());
            let top_value = (path.is_nested() || persist)
                .then(|| tree.get(path.top_level()).cloned())
                .flatten();
            Written {
                old_value,
                new_value,
                top_value,
            }
        };

        self.record(StateChange::new(
            path.as_str(),
            written.old_value.clone(),
            written.new_value.clone(),
        ));
        if persist {
            self.queue_snapshot(path.top_level(), written.top_value.clone());
        }
        written
    }

    fn notify_changed(&self, path: &StatePath, written: &Written) {
        self.bus.emit(
            &topic::state_changed(path.as_str()),
            json!({
                "path": path.as_str(),
                "value": written.new_value,
                "oldValue": written.old_value,
            }),
        );
        if path.is_nested() {
            self.bus.emit(
                &topic::state_changed(path.top_level()),
                json!({
                    "path": path.top_level(),
                    "value": written.top_value,
                    "changedPath": path.as_str(),
                }),
            );
        }
    }

    fn record(&self, change: StateChange) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(change);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    fn is_persisted(&self, key: &str) -> bool {
        self.persisted_keys.iter().any(|persisted| persisted == key)
    }

    fn queue_snapshot(&self, key: &str, value: Option<Value>) {
        let key = key.to_string();
        self.send(match value {
            Some(value) => PersistCommand::Save { key, value },
            None => PersistCommand::Remove { key },
        });
    }

    fn send(&self, command: PersistCommand) {
        if self.persister.send(command).is_err() {
            tracing::warn!("state persister is gone, dropping snapshot command");
        }
    }

    fn lock_tree(&self) -> MutexGuard<'_, Value> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<PersistCommand>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merge(current: Option<&Value>, partial: Value) -> Value {
    match (current, partial) {
        (Some(Value::Object(current)), Value::Object(partial)) => {
            let mut merged = current.clone();
            merged.extend(partial);
            Value::Object(merged)
        }
        (_, partial) => partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySnapshots;

    fn store() -> (Arc<EventBus>, Arc<StateStore>) {
        let bus = Arc::new(EventBus::default());
        let store = Arc::new(StateStore::new(Arc::clone(&bus), StateConfig::default()));
        (bus, store)
    }

    fn capture(bus: &EventBus, topic: &str) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = bus.on(topic, move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[test]
    fn should_read_back_nested_value_when_set() {
        let (_, store) = store();
        store.set("a.b.c", json!(1), SetOptions::default()).unwrap();
        assert_eq!(store.get("a.b.c"), Some(json!(1)));
        assert_eq!(store.get("a"), Some(json!({"b": {"c": 1}})));
    }

    #[test]
    fn should_isolate_returned_copies_from_the_tree() {
        let (_, store) = store();
        store.set("a.b.c", json!(1), SetOptions::default()).unwrap();
        let mut copy = store.get("a.b").unwrap();
        copy["c"] = json!(42);
        let mut all = store.get_all();
        all["a"] = json!(null);
        assert_eq!(store.get("a.b.c"), Some(json!(1)));
    }

    #[test]
    fn should_read_invalid_path_as_absent() {
        let (_, store) = store();
        assert_eq!(store.get("a..b"), None);
        assert_eq!(store.get(""), None);
    }

    #[test]
    fn should_reject_invalid_path_on_write() {
        let (_, store) = store();
        let err = store.set(".a", json!(1), SetOptions::default()).unwrap_err();
        assert_eq!(err, StateError::InvalidPath(".a".to_string()));
    }

    #[test]
    fn should_emit_leaf_and_top_level_events_when_nested_path_set() {
        let (bus, store) = store();
        let leaf = capture(&bus, "state:lights.kitchen:changed");
        let top = capture(&bus, "state:lights:changed");

        store
            .set("lights.kitchen", json!({"on": true}), SetOptions::default())
            .unwrap();

        let leaf = leaf.lock().unwrap();
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf[0].payload["value"], json!({"on": true}));
        assert_eq!(leaf[0].payload["oldValue"], Value::Null);
        let top = top.lock().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].payload["changedPath"], "lights.kitchen");
        assert_eq!(top[0].payload["value"], json!({"kitchen": {"on": true}}));
    }

    #[test]
    fn should_carry_old_value_in_change_event() {
        let (bus, store) = store();
        store.set("mode", json!("day"), SetOptions::default()).unwrap();
        let seen = capture(&bus, "state:mode:changed");
        store.set("mode", json!("night"), SetOptions::default()).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].payload["oldValue"], "day");
        assert_eq!(seen[0].payload["value"], "night");
    }

    #[test]
    fn should_not_emit_when_silent() {
        let (bus, store) = store();
        let seen = capture(&bus, "state:*");
        store.set("mode", json!("day"), SetOptions::silent()).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.get("mode"), Some(json!("day")));
    }

    #[test]
    fn should_shallow_merge_on_update() {
        let (_, store) = store();
        store
            .set("lights.desk", json!({"on": false, "bri": 100}), SetOptions::default())
            .unwrap();
        store
            .update("lights.desk", json!({"on": true}), SetOptions::default())
            .unwrap();
        assert_eq!(store.get("lights.desk"), Some(json!({"on": true, "bri": 100})));
    }

    #[test]
    fn should_replace_on_update_when_current_value_is_not_an_object() {
        let (_, store) = store();
        store.set("mode", json!("day"), SetOptions::default()).unwrap();
        store
            .update("mode", json!({"name": "night"}), SetOptions::default())
            .unwrap();
        assert_eq!(store.get("mode"), Some(json!({"name": "night"})));
    }

    #[test]
    fn should_evict_oldest_when_push_exceeds_max_length() {
        let (_, store) = store();
        for value in 1..=4 {
            store.push("list", json!(value), Some(3)).unwrap();
        }
        assert_eq!(store.get("list"), Some(json!([2, 3, 4])));
    }

    #[test]
    fn should_start_fresh_array_when_pushing_onto_scalar() {
        let (_, store) = store();
        store.set("list", json!("oops"), SetOptions::default()).unwrap();
        store.push("list", json!(1), None).unwrap();
        assert_eq!(store.get("list"), Some(json!([1])));
    }

    #[test]
    fn should_emit_removed_event_and_record_null_when_removing() {
        let (bus, store) = store();
        store.set("a.b", json!(5), SetOptions::default()).unwrap();
        let seen = capture(&bus, "state:a.b:removed");

        assert_eq!(store.remove("a.b").unwrap(), Some(json!(5)));

        assert_eq!(store.get("a.b"), None);
        assert_eq!(seen.lock().unwrap()[0].payload["oldValue"], 5);
        let last = store.get_history(1, None).pop().unwrap();
        assert_eq!(last.new_value, Value::Null);
        assert_eq!(last.old_value, Some(json!(5)));
    }

    #[test]
    fn should_ignore_removal_of_missing_path() {
        let (bus, store) = store();
        let seen = capture(&bus, "state:nothing:removed");
        assert_eq!(store.remove("nothing").unwrap(), None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn should_emit_single_batch_event_when_setting_many() {
        let (bus, store) = store();
        let state_events = capture(&bus, "state:*");

        store
            .set_many([("a", json!(1)), ("b", json!(2))], SetOptions::default())
            .unwrap();

        let events = state_events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "state:batch:changed");
        assert_eq!(events[0].payload["keys"], json!(["a", "b"]));
        assert_eq!(store.get("b"), Some(json!(2)));
    }

    #[test]
    fn should_write_nothing_when_batch_contains_invalid_path() {
        let (_, store) = store();
        let result = store.set_many([("a", json!(1)), ("b..c", json!(2))], SetOptions::default());
        assert!(result.is_err());
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn should_keep_bounded_history_filtered_by_prefix() {
        let bus = Arc::new(EventBus::default());
        let config = StateConfig {
            history_limit: 3,
            ..StateConfig::default()
        };
        let store = StateStore::new(bus, config);
        for idx in 0..5 {
            store
                .set(&format!("t.{idx}"), json!(idx), SetOptions::silent())
                .unwrap();
        }
        store.set("other", json!(1), SetOptions::silent()).unwrap();

        let all = store.get_history(10, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].path, "other");
        let filtered = store.get_history(10, Some("t."));
        let paths: Vec<&str> = filtered.iter().map(|change| change.path.as_str()).collect();
        assert_eq!(paths, vec!["t.3", "t.4"]);
    }

    #[test]
    fn should_compute_builtin_and_custom_selectors() {
        let (_, store) = store();
        store
            .set("lights.desk", json!({"on": true}), SetOptions::default())
            .unwrap();
        assert_eq!(store.select(selectors::LIGHTS_ON), Some(json!(["desk"])));

        store.register_selector("lightCount", |tree| {
            json!(tree["lights"].as_object().map_or(0, Map::len))
        });
        assert_eq!(store.select("lightCount"), Some(json!(1)));
        assert_eq!(store.select("missing"), None);
    }

    #[tokio::test]
    async fn should_persist_allow_listed_keys_on_write() {
        let (_, store) = store();
        let storage = MemorySnapshots::default();
        store.init(storage.clone()).await;

        store.push("temperatureHistory", json!(21.5), Some(288)).unwrap();
        store.set("lights.desk", json!({"on": true}), SetOptions::default()).unwrap();
        store.flush_persisted().await;

        assert_eq!(storage.get("homedash:temperatureHistory"), Some(json!([21.5])));
        assert_eq!(storage.get("homedash:lights"), None);
    }

    #[tokio::test]
    async fn should_persist_any_key_when_override_is_set() {
        let (_, store) = store();
        let storage = MemorySnapshots::default();
        store.init(storage.clone()).await;

        store.set("scenes.evening", json!(["desk"]), SetOptions::persisted()).unwrap();
        store.flush_persisted().await;

        assert_eq!(storage.get("homedash:scenes"), Some(json!({"evening": ["desk"]})));
    }

    #[tokio::test]
    async fn should_refuse_explicit_persist_outside_allow_list() {
        let (_, store) = store();
        let storage = MemorySnapshots::default();
        store.init(storage.clone()).await;
        store.set("uiPositions", json!({"clock": [0, 0]}), SetOptions::silent()).unwrap();

        assert!(!store.persist("lights"));
        assert!(store.persist("uiPositions"));
        store.flush_persisted().await;

        assert_eq!(storage.get("homedash:uiPositions"), Some(json!({"clock": [0, 0]})));
    }

    #[tokio::test]
    async fn should_restore_persisted_keys_silently_on_init() {
        let (bus, store) = store();
        let seen = capture(&bus, "state:*");
        let storage = MemorySnapshots::with(&[
            ("homedash:motionHistory", json!([{"room": "hall"}])),
            ("homedash:lights", json!({"desk": {"on": true}})),
        ]);

        store.init(storage).await;

        assert_eq!(store.get("motionHistory"), Some(json!([{"room": "hall"}])));
        assert_eq!(store.get("lights"), None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_keep_restored_snapshot_when_key_was_written_before_init() {
        let (_, store) = store();
        let storage = MemorySnapshots::with(&[("homedash:uiPositions", json!({"clock": [5, 5]}))]);
        store.set("uiPositions", json!({"clock": [0, 0]}), SetOptions::default()).unwrap();
        store.push("temperatureHistory", json!(21.5), Some(288)).unwrap();

        store.init(storage.clone()).await;
        store.flush_persisted().await;

        assert_eq!(store.get("uiPositions"), Some(json!({"clock": [5, 5]})));
        assert_eq!(storage.get("homedash:uiPositions"), Some(json!({"clock": [5, 5]})));
        assert_eq!(storage.get("homedash:temperatureHistory"), Some(json!([21.5])));
    }

    #[tokio::test]
    async fn should_migrate_legacy_keys_on_init() {
        let (_, store) = store();
        let storage = MemorySnapshots::with(&[
            ("tempHistory", json!([19.0, 20.0])),
            ("widgetPositions", json!({"clock": [1, 1]})),
            ("homedash:uiPositions", json!({"clock": [2, 2]})),
        ]);

        store.init(storage.clone()).await;

        assert_eq!(store.get("temperatureHistory"), Some(json!([19.0, 20.0])));
        assert_eq!(store.get("uiPositions"), Some(json!({"clock": [2, 2]})));
        assert_eq!(storage.get("tempHistory"), None);
        assert_eq!(storage.get("widgetPositions"), None);
    }

    #[tokio::test]
    async fn should_remove_snapshot_when_persisted_key_is_removed() {
        let (_, store) = store();
        let storage = MemorySnapshots::with(&[("homedash:motionHistory", json!([1]))]);
        store.init(storage.clone()).await;

        store.remove("motionHistory").unwrap();
        store.flush_persisted().await;

        assert_eq!(storage.get("homedash:motionHistory"), None);
    }

    #[tokio::test]
    async fn should_clear_only_namespaced_snapshots() {
        let (_, store) = store();
        let storage = MemorySnapshots::with(&[
            ("homedash:uiPositions", json!({})),
            ("unrelated", json!(1)),
        ]);
        store.init(storage.clone()).await;

        store.clear_persisted();
        store.flush_persisted().await;

        assert_eq!(storage.get("homedash:uiPositions"), None);
        assert_eq!(storage.get("unrelated"), Some(json!(1)));
    }

    #[tokio::test]
    async fn should_return_immediately_when_flushing_without_storage() {
        let (_, store) = store();
        store.set("uiPositions", json!({}), SetOptions::default()).unwrap();
        store.flush_persisted().await;
    }

    #[tokio::test]
    async fn should_reflect_lifecycle_events_into_app_state() {
        let (bus, store) = store();
        store.init(MemorySnapshots::default()).await;

        bus.emit(topic::APP_READY, Value::Null);
        bus.emit(topic::APP_VISIBILITY, json!({"visible": false}));
        bus.emit(&topic::connection_offline("sonos"), json!({"service": "sonos"}));
        bus.emit(&topic::connection_offline("hue"), json!({"service": "hue"}));
        bus.emit(&topic::connection_online("sonos"), json!({"service": "sonos"}));

        let app = store.get("app").unwrap();
        assert_eq!(app["ready"], true);
        assert!(app["readyAt"].is_string());
        assert_eq!(app["visible"], false);
        assert_eq!(app["offline"], json!(["hue"]));
    }

    #[tokio::test]
    async fn should_ignore_second_init() {
        let (bus, store) = store();
        store.init(MemorySnapshots::default()).await;
        store.init(MemorySnapshots::default()).await;
        assert_eq!(bus.listener_count(topic::APP_READY), 1);
    }
}
