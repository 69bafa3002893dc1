//! Core library for the Poi Stream controller.
//!
//! The controller keeps two wireless LED strips ("POIs") connected and feeds
//! them a fresh colour frame every period. Each module owns one subsystem:
//! the session manager tracks the peripheral slots, the frame pipeline
//! renders and delivers packets, and the audio pipeline maintains the shared
//! spectrum that audio-reactive effects read. [`runtime::Runtime`] wires them
//! together on their own threads.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod frame;
pub mod manager;
pub mod motion;
pub mod pipeline;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod sim;
pub mod spectrum;
pub mod state;
pub mod status;
pub mod transport;

pub use analysis::SpectrumAnalyzer;
pub use audio::{AudioCycle, AudioPipeline, AudioSource};
pub use config::{AppConfig, AudioConfig, DeviceConfig, LinkConfig, MicSensitivity, StreamConfig};
pub use effects::{Effect, EffectRegistry};
pub use error::{PoiError, Result};
pub use frame::PixelFrame;
pub use manager::SessionManager;
pub use motion::{MotionSample, MotionSource};
pub use pipeline::{CycleReport, FramePipeline, PipelineHandle, PipelineStats};
pub use runtime::Runtime;
pub use session::{Session, SessionId, SessionTable, SlotState};
pub use spectrum::{SpectrumBuffer, SpectrumReader, SpectrumSnapshot};
pub use state::AppState;
pub use status::StatusReport;
pub use transport::{Transport, TransportError, TransportEvent};
