//! Software stand-ins for the radio, microphone and motion sensor.
//!
//! Used by the command line demo and by the tests throughout the crate.

mod radio;
mod sensors;

pub use radio::{SimPeripheral, SimulatedRadio};
pub use sensors::{ScriptedAudio, ScriptedMotion, SyntheticAudio, SyntheticMotion};
