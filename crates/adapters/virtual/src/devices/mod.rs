//! Simulated devices — light, thermometer, motion sensor.
//!
//! Readings are a deterministic function of the simulation tick so a
//! dashboard running against them behaves the same on every start.

mod light;
mod motion;
mod thermometer;

pub use light::{LightCommand, VirtualLight};
pub use motion::VirtualMotionSensor;
pub use thermometer::VirtualThermometer;
