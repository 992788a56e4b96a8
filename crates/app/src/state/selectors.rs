//! Built-in selectors — read-only views computed over the whole state tree.

use std::sync::Arc;

use serde_json::{Value, json};

/// A named pure function over the state tree.
pub type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

pub const LIGHTS_ON: &str = "lightsOn";
pub const AVERAGE_INDOOR_TEMPERATURE: &str = "averageIndoorTemperature";
pub const OFFLINE_SERVICES: &str = "offlineServices";

/// The selectors every store starts with.
#[must_use]
pub fn defaults() -> Vec<(&'static str, Selector)> {
    vec![
        (LIGHTS_ON, Arc::new(lights_on)),
        (AVERAGE_INDOOR_TEMPERATURE, Arc::new(average_indoor_temperature)),
        (OFFLINE_SERVICES, Arc::new(offline_services)),
    ]
}

/// Ids under `lights` whose `on` flag is set, sorted.
#[must_use]
pub fn lights_on(tree: &Value) -> Value {
    let mut ids: Vec<&String> = children(tree, "lights")
        .filter(|(_, light)| light.get("on").and_then(Value::as_bool) == Some(true))
        .map(|(id, _)| id)
        .collect();
    ids.sort();
    json!(ids)
}

/// Mean of the numeric `value` of every entry under `temperatures`;
/// `null` when there is none.
#[must_use]
pub fn average_indoor_temperature(tree: &Value) -> Value {
    let readings: Vec<f64> = children(tree, "temperatures")
        .filter_map(|(_, room)| room.get("value").and_then(Value::as_f64))
        .collect();
    if readings.is_empty() {
        return Value::Null;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = readings.iter().sum::<f64>() / readings.len() as f64;
    json!(mean)
}

/// Services under `connections` whose `online` flag is false, sorted.
#[must_use]
pub fn offline_services(tree: &Value) -> Value {
    let mut names: Vec<&String> = children(tree, "connections")
        .filter(|(_, status)| status.get("online").and_then(Value::as_bool) == Some(false))
        .map(|(name, _)| name)
        .collect();
    names.sort();
    json!(names)
}

fn children<'a>(tree: &'a Value, key: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    tree.get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
}
