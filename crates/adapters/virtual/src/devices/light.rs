//! Virtual dimmable light.

use serde::{Deserialize, Serialize};

/// Highest brightness level, matching the Hue scale.
pub const MAX_BRIGHTNESS: u8 = 254;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualLight {
    pub name: String,
    pub on: bool,
    #[serde(rename = "bri")]
    pub brightness: u8,
}

impl VirtualLight {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: false,
            brightness: MAX_BRIGHTNESS,
        }
    }

    /// Apply a command; returns whether anything changed.
    pub fn apply(&mut self, command: &LightCommand) -> bool {
        let before = self.clone();
        if command.toggle {
            self.on = !self.on;
        }
        if let Some(on) = command.on {
            self.on = on;
        }
        if let Some(brightness) = command.brightness {
            self.brightness = brightness.min(MAX_BRIGHTNESS);
            // dimming a light that is off turns it on
            if brightness > 0 && command.on.is_none() {
                self.on = true;
            }
        }
        *self != before
    }
}

/// Payload of a `light:set` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightCommand {
    pub id: String,
    #[serde(default)]
    pub on: Option<bool>,
    #[serde(default, rename = "bri")]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub toggle: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(json: serde_json::Value) -> LightCommand {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn should_start_off_at_full_brightness() {
        let light = VirtualLight::new("Desk");
        assert!(!light.on);
        assert_eq!(light.brightness, MAX_BRIGHTNESS);
    }

    #[test]
    fn should_turn_on_and_report_change() {
        let mut light = VirtualLight::new("Desk");
        assert!(light.apply(&command(serde_json::json!({"id": "desk", "on": true}))));
        assert!(light.on);
        assert!(!light.apply(&command(serde_json::json!({"id": "desk", "on": true}))));
    }

    #[test]
    fn should_toggle() {
        let mut light = VirtualLight::new("Desk");
        light.apply(&command(serde_json::json!({"id": "desk", "toggle": true})));
        assert!(light.on);
        light.apply(&command(serde_json::json!({"id": "desk", "toggle": true})));
        assert!(!light.on);
    }

    #[test]
    fn should_turn_on_when_dimmed_without_explicit_state() {
        let mut light = VirtualLight::new("Desk");
        light.apply(&command(serde_json::json!({"id": "desk", "bri": 80})));
        assert!(light.on);
        assert_eq!(light.brightness, 80);
    }

    #[test]
    fn should_serialize_brightness_as_bri() {
        let json = serde_json::to_value(VirtualLight::new("Hall")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Hall", "on": false, "bri": 254}));
    }
}
