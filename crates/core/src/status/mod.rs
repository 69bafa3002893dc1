use serde::Serialize;

use crate::{
    pipeline::PipelineStats,
    session::{PoiMetadata, SlotState},
    AppState, MicSensitivity, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub slot: usize,
    pub state: SlotState,
    pub discovered: bool,
    pub stream_started: bool,
    pub address: Option<String>,
    pub metadata: Option<PoiMetadata>,
}

/// Point-in-time view of the controller for a display or log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Sessions with resolved characteristics.
    pub connected: usize,
    pub fully_connected: bool,
    pub streaming: bool,
    pub effect_index: usize,
    pub effect: Option<&'static str>,
    pub sensitivity: MicSensitivity,
    pub slots: Vec<SlotStatus>,
    pub stats: PipelineStats,
}

impl StatusReport {
    /// `effect_names` is the registry listing, used to name the selection.
    pub fn capture(state: &AppState, effect_names: &[&'static str], stats: PipelineStats) -> Self {
        let slots: Vec<SlotStatus> = state
            .sessions
            .sessions()
            .into_iter()
            .enumerate()
            .map(|(slot, session)| match session {
                Some(s) => SlotStatus {
                    slot,
                    state: s.state,
                    discovered: s.discovered(),
                    stream_started: s.stream_started,
                    address: Some(s.addr.to_string()),
                    metadata: s.metadata,
                },
                None => SlotStatus {
                    slot,
                    state: SlotState::Empty,
                    discovered: false,
                    stream_started: false,
                    address: None,
                    metadata: None,
                },
            })
            .collect();

        let effect_index = state.effect_index();
        let effect = (!effect_names.is_empty()).then(|| effect_names[effect_index % effect_names.len()]);

        Self {
            connected: slots.iter().filter(|s| s.discovered).count(),
            fully_connected: slots.iter().all(|s| s.discovered),
            streaming: state.streaming_enabled(),
            effect_index,
            effect,
            sensitivity: state.sensitivity(),
            slots,
            stats,
        }
    }

    /// Text for the connection panel, one line per connected peripheral.
    pub fn connection_text(&self) -> String {
        if self.fully_connected && self.streaming {
            return "All Connected. Streaming!".to_string();
        }
        if self.connected == 0 {
            return "Connecting...".to_string();
        }
        self.slots
            .iter()
            .filter(|s| s.discovered)
            .map(|s| format!("POI {}: Connected", s.slot + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
