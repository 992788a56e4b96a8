//! Topic vocabulary for the event bus.
//!
//! Topics are `:`-separated strings. The segment before the first separator
//! is the *namespace*; `"<namespace>:*"` subscribes to every topic in it and
//! `"*"` subscribes to everything.

/// Separator between topic segments.
pub const SEPARATOR: char = ':';

/// Subscription topic matching every emitted topic.
pub const GLOBAL_WILDCARD: &str = "*";

/// Emitted once after startup completes.
pub const APP_READY: &str = "app:ready";

/// Emitted when the dashboard becomes visible or hidden (`{visible}`).
pub const APP_VISIBILITY: &str = "app:visibility";

/// Emitted after a `set_many` batch with `{keys}`.
pub const STATE_BATCH_CHANGED: &str = "state:batch:changed";

/// Namespace of connection transition events.
pub const CONNECTION_NAMESPACE: &str = "connection";

/// Emitted by light integrations when a light's state changes.
pub const LIGHT_CHANGED: &str = "light:changed";

/// Request topic asking a light integration to change a light.
pub const LIGHT_SET: &str = "light:set";

/// Emitted by motion sensor integrations.
pub const MOTION_DETECTED: &str = "motion:detected";

/// `state:<path>:changed`
#[must_use]
pub fn state_changed(path: &str) -> String {
    format!("state:{path}:changed")
}

/// `state:<path>:removed`
#[must_use]
pub fn state_removed(path: &str) -> String {
    format!("state:{path}:removed")
}

/// `connection:<service>:online`
#[must_use]
pub fn connection_online(service: &str) -> String {
    format!("{CONNECTION_NAMESPACE}:{service}:online")
}

/// `connection:<service>:offline`
#[must_use]
pub fn connection_offline(service: &str) -> String {
    format!("{CONNECTION_NAMESPACE}:{service}:offline")
}

/// Split a `connection:<service>:<online|offline>` topic.
///
/// Returns the service name and whether it went online.
#[must_use]
pub fn parse_connection_transition(topic: &str) -> Option<(&str, bool)> {
    let rest = topic
        .strip_prefix(CONNECTION_NAMESPACE)?
        .strip_prefix(SEPARATOR)?;
    let (service, state) = rest.rsplit_once(SEPARATOR)?;
    if service.is_empty() {
        return None;
    }
    match state {
        "online" => Some((service, true)),
        "offline" => Some((service, false)),
        _ => None,
    }
}

/// The namespace of a topic, if it has one.
///
/// `"ns:event"` → `Some("ns")`; `"plain"` → `None`.
#[must_use]
pub fn namespace(topic: &str) -> Option<&str> {
    topic
        .split_once(SEPARATOR)
        .map(|(ns, _)| ns)
        .filter(|ns| !ns.is_empty())
}

/// The wildcard subscription covering the namespace of `topic`.
#[must_use]
pub fn namespace_wildcard(topic: &str) -> Option<String> {
    namespace(topic).map(|ns| format!("{ns}{SEPARATOR}{GLOBAL_WILDCARD}"))
}

/// Whether a topic can be subscribed to.
///
/// Rejects empty topics, whitespace, and `*` anywhere other than as the
/// whole topic or a trailing `:*` namespace wildcard.
#[must_use]
pub fn is_valid_subscription(topic: &str) -> bool {
    if topic.is_empty() || topic.chars().any(char::is_whitespace) {
        return false;
    }
    if topic == GLOBAL_WILDCARD {
        return true;
    }
    match topic.strip_suffix(":*") {
        Some(ns) => !ns.is_empty() && !ns.contains('*') && !ns.contains(SEPARATOR),
        None => !topic.contains('*'),
    }
}
