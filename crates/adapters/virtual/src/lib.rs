//! # homedash-adapter-virtual
//!
//! Virtual/demo integration that drives the dashboard core with simulated
//! devices, for development and demonstration without real hardware.
//!
//! ## Provided devices
//!
//! | Device | State path | Behaviour |
//! |--------|------------|-----------|
//! | Lights | `lights.<id>` | Answer `light:set` on the bus, announce `light:changed` |
//! | Thermometers | `temperatures.<room>` | New reading every tick, appended to `temperatureHistory` |
//! | Motion sensor | `motion.<room>` | Periodic detections, appended to `motionHistory`, announced as `motion:detected` |
//!
//! ## Dependency rule
//!
//! Depends on `homedash-app` (ports, core services) and `homedash-domain` only.

mod devices;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;

use homedash_app::context::AppContext;
use homedash_app::event_bus::{EventBus, Subscription};
use homedash_app::keys;
use homedash_app::poller::TaskOptions;
use homedash_app::ports::Integration;
use homedash_app::registry::ServiceKey;
use homedash_app::state::{SetOptions, StateStore};
use homedash_domain::error::HomeDashError;
use homedash_domain::event::Event;
use homedash_domain::time::now;
use homedash_domain::topic;

pub use devices::{LightCommand, VirtualLight, VirtualMotionSensor, VirtualThermometer};

pub const NAME: &str = "virtual";

/// Registry key of the shared simulated devices.
pub const DEVICES: ServiceKey<VirtualDevices> = keys::integration(NAME);

/// Poller task refreshing the sensors.
pub const SENSOR_TASK: &str = "virtual-sensors";

/// Readings kept in `temperatureHistory` (one day at five-minute ticks).
pub const TEMPERATURE_HISTORY_LENGTH: usize = 288;

pub const MOTION_HISTORY_LENGTH: usize = 100;

#[derive(Debug, Clone)]
pub struct VirtualConfig {
    pub interval: Duration,
    pub lights: Vec<String>,
    pub rooms: Vec<String>,
    /// Motion is detected every this many ticks.
    pub motion_every: u64,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            lights: ["lounge", "kitchen", "desk"].map(String::from).to_vec(),
            rooms: ["lounge", "office", "bedroom"].map(String::from).to_vec(),
            motion_every: 4,
        }
    }
}

/// The simulated devices, shared between the bus handler and the poller task.
pub struct VirtualDevices {
    lights: Mutex<BTreeMap<String, VirtualLight>>,
    thermometers: Vec<VirtualThermometer>,
    motion: VirtualMotionSensor,
    tick: AtomicU64,
}

impl VirtualDevices {
    #[must_use]
    pub fn new(config: &VirtualConfig) -> Self {
        let lights = config
            .lights
            .iter()
            .map(|id| (id.clone(), VirtualLight::new(title_case(id))))
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let thermometers = config
            .rooms
            .iter()
            .enumerate()
            .map(|(idx, room)| VirtualThermometer::new(room.clone(), 19.0 + idx as f64, idx as f64))
            .collect();
        Self {
            lights: Mutex::new(lights),
            thermometers,
            motion: VirtualMotionSensor::new(config.rooms.clone(), config.motion_every),
            tick: AtomicU64::new(0),
        }
    }

    /// Current state of one light.
    #[must_use]
    pub fn light(&self, id: &str) -> Option<VirtualLight> {
        self.lock_lights().get(id).cloned()
    }

    #[must_use]
    pub fn light_ids(&self) -> Vec<String> {
        self.lock_lights().keys().cloned().collect()
    }

    /// Write every light into the state store.
    fn publish_lights(&self, store: &StateStore) -> anyhow::Result<()> {
        let lights = serde_json::to_value(&*self.lock_lights())?;
        store.set("lights", lights, SetOptions::default())?;
        Ok(())
    }

    /// Apply a `light:set` command, then mirror and announce the new state.
    fn handle_light_set(&self, event: &Event, store: &StateStore, bus: &EventBus) {
        let command: LightCommand = match serde_json::from_value(event.payload.clone()) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed light command");
                return;
            }
        };
        let updated = {
            let mut lights = self.lock_lights();
            let Some(light) = lights.get_mut(&command.id) else {
                tracing::warn!(light = %command.id, "unknown virtual light");
                return;
            };
            light.apply(&command);
            light.clone()
        };
        let state = match serde_json::to_value(&updated) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode light state");
                return;
            }
        };
        if let Err(err) = store.set(&format!("lights.{}", command.id), state.clone(), SetOptions::default()) {
            tracing::warn!(light = %command.id, error = %err, "failed to store light state");
        }
        bus.emit(topic::LIGHT_CHANGED, json!({ "id": command.id, "state": state }));
    }

    /// Advance the simulation by one tick.
    fn tick(&self, store: &StateStore, bus: &EventBus) -> anyhow::Result<()> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        let at = now();

        let mut readings = serde_json::Map::new();
        for thermometer in &self.thermometers {
            let value = thermometer.reading(tick);
            store.set(
                &format!("temperatures.{}", thermometer.room),
                json!({ "value": value, "unit": "°C", "updatedAt": at }),
                SetOptions::default(),
            )?;
            readings.insert(thermometer.room.clone(), json!(value));
        }
        if !readings.is_empty() {
            store.push(
                "temperatureHistory",
                json!({ "timestamp": at, "readings": readings }),
                Some(TEMPERATURE_HISTORY_LENGTH),
            )?;
        }

        if let Some(room) = self.motion.detect(tick) {
            let detection = json!({ "room": room, "timestamp": at });
            store.set(
                &format!("motion.{room}"),
                json!({ "detected": true, "lastSeen": at }),
                SetOptions::default(),
            )?;
            store.push("motionHistory", detection.clone(), Some(MOTION_HISTORY_LENGTH))?;
            bus.emit(topic::MOTION_DETECTED, detection);
            tracing::debug!(room, tick, "simulated motion");
        }
        Ok(())
    }

    fn lock_lights(&self) -> MutexGuard<'_, BTreeMap<String, VirtualLight>> {
        self.lights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn title_case(id: &str) -> String {
    let mut chars = id.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Virtual integration wiring [`VirtualDevices`] into the core.
pub struct VirtualIntegration {
    config: VirtualConfig,
    subscriptions: Vec<Subscription>,
}

impl Default for VirtualIntegration {
    fn default() -> Self {
        Self::new(VirtualConfig::default())
    }
}

impl VirtualIntegration {
    #[must_use]
    pub fn new(config: VirtualConfig) -> Self {
        Self {
            config,
            subscriptions: Vec::new(),
        }
    }
}

impl Integration for VirtualIntegration {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn setup(&mut self, ctx: &AppContext) -> Result<(), HomeDashError> {
        let registry = ctx.registry();
        registry.register_instance(DEVICES, Arc::new(VirtualDevices::new(&self.config)));
        let devices = registry.get(DEVICES)?;
        let store = ctx.store();
        let bus = ctx.bus();

        if let Err(err) = devices.publish_lights(&store) {
            tracing::warn!(error = %err, "failed to publish virtual lights");
        }

        // the bus owns this listener, so it must not keep the bus alive
        let handler = Arc::clone(&devices);
        let handler_store = Arc::downgrade(&store);
        let handler_bus = Arc::downgrade(&bus);
        self.subscriptions.push(bus.on(topic::LIGHT_SET, move |event| {
            if let (Some(store), Some(bus)) = (handler_store.upgrade(), handler_bus.upgrade()) {
                handler.handle_light_set(event, &store, &bus);
            }
        }));

        ctx.poller().register(
            SENSOR_TASK,
            self.config.interval,
            TaskOptions::default().immediately(),
            move || {
                let devices = Arc::clone(&devices);
                let store = Arc::clone(&store);
                let bus = Arc::clone(&bus);
                async move { devices.tick(&store, &bus) }
            },
        )?;

        tracing::info!(
            lights = self.config.lights.len(),
            rooms = self.config.rooms.len(),
            "virtual integration ready"
        );
        Ok(())
    }

    async fn teardown(&mut self, ctx: &AppContext) -> Result<(), HomeDashError> {
        ctx.poller().unregister(SENSOR_TASK);
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homedash_app::context::CoreConfig;
    use homedash_app::poller::RunOutcome;

    async fn setup(config: VirtualConfig) -> (AppContext, VirtualIntegration) {
        let ctx = AppContext::bootstrap(CoreConfig::default()).unwrap();
        let mut integration = VirtualIntegration::new(config);
        integration.setup(&ctx).await.unwrap();
        (ctx, integration)
    }

    #[tokio::test]
    async fn should_return_virtual_as_name() {
        assert_eq!(VirtualIntegration::default().name(), "virtual");
    }

    #[tokio::test]
    async fn should_register_devices_and_seed_lights() {
        let (ctx, _integration) = setup(VirtualConfig::default()).await;

        let devices = ctx.registry().get(DEVICES).unwrap();
        assert_eq!(devices.light_ids(), vec!["desk", "kitchen", "lounge"]);
        assert_eq!(
            ctx.store().get("lights.desk"),
            Some(json!({"name": "Desk", "on": false, "bri": 254}))
        );
        assert_eq!(ctx.poller().get_task_names(), vec![SENSOR_TASK.to_string()]);
    }

    #[tokio::test]
    async fn should_answer_light_set_with_light_changed() {
        let (ctx, _integration) = setup(VirtualConfig::default()).await;

        let response = ctx
            .bus()
            .request(
                topic::LIGHT_SET,
                json!({"id": "kitchen", "on": true}),
                topic::LIGHT_CHANGED,
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(response["id"], "kitchen");
        assert_eq!(response["state"]["on"], true);
        assert_eq!(ctx.store().get("lights.kitchen.on"), Some(json!(true)));
        assert_eq!(ctx.store().select("lightsOn"), Some(json!(["kitchen"])));
    }

    #[tokio::test]
    async fn should_ignore_unknown_light() {
        let (ctx, _integration) = setup(VirtualConfig::default()).await;

        let listeners = ctx
            .bus()
            .emit(topic::LIGHT_SET, json!({"id": "garage", "on": true}));

        assert_eq!(listeners, 1);
        assert_eq!(ctx.store().get("lights.garage"), None);
    }

    #[tokio::test]
    async fn should_record_temperatures_on_each_tick() {
        let (ctx, _integration) = setup(VirtualConfig::default()).await;
        let poller = ctx.poller();

        assert_eq!(poller.run_now(SENSOR_TASK).await.unwrap(), RunOutcome::Completed);
        assert_eq!(poller.run_now(SENSOR_TASK).await.unwrap(), RunOutcome::Completed);

        let store = ctx.store();
        assert!(store.get("temperatures.lounge.value").is_some());
        assert_eq!(store.get("temperatures.office.unit"), Some(json!("°C")));
        let history = store.get("temperatureHistory").unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert!(store.select("averageIndoorTemperature").unwrap().is_f64());
    }

    #[tokio::test]
    async fn should_emit_motion_detected_periodically() {
        let config = VirtualConfig {
            motion_every: 2,
            ..VirtualConfig::default()
        };
        let (ctx, _integration) = setup(config).await;
        let detections = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&detections);
        let _ = ctx.bus().on(topic::MOTION_DETECTED, move |event| {
            sink.lock().unwrap().push(event.payload["room"].clone());
        });

        for _ in 0..4 {
            ctx.poller().run_now(SENSOR_TASK).await.unwrap();
        }

        assert_eq!(*detections.lock().unwrap(), vec![json!("lounge"), json!("office")]);
        let history = ctx.store().get("motionHistory").unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(ctx.store().get("motion.office.detected"), Some(json!(true)));
    }

    #[tokio::test]
    async fn should_unregister_task_and_listener_on_teardown() {
        let (ctx, mut integration) = setup(VirtualConfig::default()).await;

        integration.teardown(&ctx).await.unwrap();

        assert!(ctx.poller().get_task_names().is_empty());
        assert_eq!(ctx.bus().listener_count(topic::LIGHT_SET), 0);
    }

    #[test]
    fn should_title_case_light_names() {
        assert_eq!(title_case("kitchen"), "Kitchen");
        assert_eq!(title_case(""), "");
    }
}
