//! In-process publish/subscribe event bus.
//!
//! Listeners subscribe to an exact topic, a namespace wildcard (`"ns:*"`)
//! or the global wildcard (`"*"`). One `emit` delivers synchronously, in
//! this order, and in registration order within each class:
//!
//! 1. exact-topic listeners
//! 2. exact-topic one-shot listeners (removed before they run)
//! 3. namespace-wildcard listeners, then their one-shot listeners
//! 4. global-wildcard listeners, then their one-shot listeners
//!
//! A panicking listener is logged and does not stop the others. No lock is
//! held while listeners run, so a listener may emit or subscribe itself.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use homedash_domain::error::BusError;
use homedash_domain::event::Event;
use homedash_domain::id::ListenerId;
use homedash_domain::topic;

use crate::keys;
use crate::registry::Registry;

/// Default number of events kept for [`EventBus::get_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const TAP_CAPACITY: usize = 256;

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    callback: Callback,
}

#[derive(Default)]
struct Listeners {
    persistent: HashMap<String, Vec<Listener>>,
    once: HashMap<String, Vec<Listener>>,
}

impl Listeners {
    fn remove(&mut self, topic: &str, id: ListenerId) -> bool {
        let removed_persistent = remove_from(&mut self.persistent, topic, id);
        let removed_once = remove_from(&mut self.once, topic, id);
        removed_persistent || removed_once
    }

    /// Listeners for one delivery class; one-shot entries are taken out.
    fn drain_class(&mut self, key: &str, batch: &mut Vec<Listener>) {
        if let Some(listeners) = self.persistent.get(key) {
            batch.extend(listeners.iter().cloned());
        }
        if let Some(listeners) = self.once.remove(key) {
            batch.extend(listeners);
        }
    }
}

fn remove_from(index: &mut HashMap<String, Vec<Listener>>, topic: &str, id: ListenerId) -> bool {
    let Some(listeners) = index.get_mut(topic) else {
        return false;
    };
    let before = listeners.len();
    listeners.retain(|listener| listener.id != id);
    let removed = listeners.len() != before;
    if listeners.is_empty() {
        index.remove(topic);
    }
    removed
}

/// Handle returned by [`EventBus::on`] / [`EventBus::once`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    id: ListenerId,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    fn inert(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            id: ListenerId::new(),
            listeners: Weak::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.listeners.upgrade().is_some_and(|listeners| {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.topic, self.id)
        })
    }
}

/// Topic-based publish/subscribe bus with bounded replay history.
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
    history: Mutex<VecDeque<Event>>,
    history_limit: usize,
    tap: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl EventBus {
    /// Create a bus keeping at most `history_limit` past events.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            listeners: Arc::new(Mutex::new(Listeners::default())),
            history: Mutex::new(VecDeque::with_capacity(history_limit)),
            history_limit,
            tap,
        }
    }

    /// Create a bus and register it under [`keys::EVENT_BUS`].
    ///
    /// If a bus is already registered, that one is returned instead.
    #[must_use]
    pub fn install(registry: &Registry, history_limit: usize) -> Arc<Self> {
        registry.register_instance(keys::EVENT_BUS, Arc::new(Self::new(history_limit)));
        match registry.get(keys::EVENT_BUS) {
            Ok(bus) => bus,
            Err(err) => {
                tracing::error!(error = %err, "event bus registration replaced by incompatible entry");
                let bus = Arc::new(Self::new(history_limit));
                registry.replace(keys::EVENT_BUS, Arc::clone(&bus));
                bus
            }
        }
    }

    /// Subscribe `callback` to `topic` until unsubscribed.
    pub fn on<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(topic, Arc::new(callback), false)
    }

    /// Subscribe `callback` to the next event on `topic` only.
    pub fn once<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(topic, Arc::new(callback), true)
    }

    /// Remove a listener from both the persistent and one-shot indices.
    pub fn off(&self, topic: &str, id: ListenerId) -> bool {
        self.lock_listeners().remove(topic, id)
    }

    /// Publish `payload` on `topic`; returns how many listeners ran.
    pub fn emit(&self, topic: &str, payload: serde_json::Value) -> usize {
        let event = Event::new(topic, payload);
        self.record(&event);
        // no receivers is fine
        let _ = self.tap.send(event.clone());

        let batch = self.collect(&event.topic);
        for listener in &batch {
            let outcome = catch_unwind(AssertUnwindSafe(|| (listener.callback)(&event)));
            if let Err(panic) = outcome {
                tracing::warn!(
                    topic = %event.topic,
                    listener = %listener.id,
                    reason = panic_message(panic.as_ref()),
                    "event listener panicked"
                );
            }
        }
        tracing::trace!(topic = %event.topic, listeners = batch.len(), "event emitted");
        batch.len()
    }

    /// Drop all listeners of `topic`, or of every topic when `None`.
    pub fn clear(&self, topic: Option<&str>) {
        let mut listeners = self.lock_listeners();
        match topic {
            Some(topic) => {
                listeners.persistent.remove(topic);
                listeners.once.remove(topic);
            }
            None => {
                listeners.persistent.clear();
                listeners.once.clear();
            }
        }
    }

    /// The most recent `limit` events, oldest first, optionally restricted
    /// to topics starting with `prefix`.
    #[must_use]
    pub fn get_history(&self, limit: usize, prefix: Option<&str>) -> Vec<Event> {
        let history = self.lock_history();
        let matching: Vec<&Event> = history
            .iter()
            .filter(|event| prefix.is_none_or(|prefix| event.topic_starts_with(prefix)))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Resolve with the payload of the next event on `topic`.
    ///
    /// The listener is registered before this returns, so an event emitted
    /// right after the call is not missed. A zero `timeout` waits forever.
    ///
    /// # Errors
    ///
    /// The returned future fails with [`BusError::Timeout`] when the deadline
    /// elapses, or when the listener is cleared before anything arrives.
    pub fn wait_for(
        &self,
        topic: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, BusError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let subscription = self.once(topic, move |event| {
            let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(event.payload.clone());
            }
        });
        let topic = topic.to_string();

        async move {
            let received = if timeout.is_zero() {
                rx.await.ok()
            } else {
                tokio::time::timeout(timeout, rx)
                    .await
                    .ok()
                    .and_then(Result::ok)
            };
            received.ok_or_else(|| {
                subscription.unsubscribe();
                BusError::Timeout { topic, timeout }
            })
        }
    }

    /// Emit `payload` on `request_topic` and wait for the first event on
    /// `response_topic`.
    ///
    /// # Errors
    ///
    /// Fails with [`BusError::Timeout`] if nobody answers in time.
    pub fn request(
        &self,
        request_topic: &str,
        payload: serde_json::Value,
        response_topic: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, BusError>> + Send + 'static {
        let response = self.wait_for(response_topic, timeout);
        self.emit(request_topic, payload);
        response
    }

    /// Receive a copy of every emitted event, e.g. to stream it elsewhere.
    ///
    /// Slow receivers lag and lose events; the bus never waits for them.
    #[must_use]
    pub fn tap(&self) -> broadcast::Receiver<Event> {
        self.tap.subscribe()
    }

    /// Number of listeners (persistent and one-shot) registered on `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        let listeners = self.lock_listeners();
        listeners.persistent.get(topic).map_or(0, Vec::len)
            + listeners.once.get(topic).map_or(0, Vec::len)
    }

    /// Topics that currently have at least one listener, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let listeners = self.lock_listeners();
        let mut topics: Vec<String> = listeners
            .persistent
            .keys()
            .chain(listeners.once.keys())
            .cloned()
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    fn subscribe(&self, topic: &str, callback: Callback, once: bool) -> Subscription {
        if !topic::is_valid_subscription(topic) {
            let err = BusError::InvalidListener {
                topic: topic.to_string(),
            };
            tracing::warn!(error = %err, "listener rejected");
            return Subscription::inert(topic);
        }

        let listener = Listener {
            id: ListenerId::new(),
            callback,
        };
        let id = listener.id;
        {
            let mut listeners = self.lock_listeners();
            let index = if once {
                &mut listeners.once
            } else {
                &mut listeners.persistent
            };
            index.entry(topic.to_string()).or_default().push(listener);
        }
        Subscription {
            topic: topic.to_string(),
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn collect(&self, topic: &str) -> Vec<Listener> {
        let mut batch = Vec::new();
        let mut listeners = self.lock_listeners();
        listeners.drain_class(topic, &mut batch);
        if let Some(wildcard) = topic::namespace_wildcard(topic) {
            if wildcard != topic {
                listeners.drain_class(&wildcard, &mut batch);
            }
        }
        if topic != topic::GLOBAL_WILDCARD {
            listeners.drain_class(topic::GLOBAL_WILDCARD, &mut batch);
        }
        batch
    }

    fn record(&self, event: &Event) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.lock_history();
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
