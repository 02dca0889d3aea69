//! Wire schemas for the progress channel and the job API.
//!
//! Channel frames are JSON with the shape `{"type": "<kind>", "data": {...}}`.
//! Inbound frames are deserialized into the strongly-typed
//! [`ChannelFrame`] enum; outbound control frames are built with
//! [`ControlFrame::encode`].
//!
//! Wire contract note: the keys of a job's result tally are the
//! original catalog option ids (string-encoded by the server), not the
//! rank positions that were submitted.

use serde::Deserialize;

/// Control frames sent upstream on the progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    SubscribeToJob { job_id: String },
    UnsubscribeFromJob { job_id: String },
}

impl ControlFrame {
    /// Encode the frame as its wire JSON text.
    pub fn encode(&self) -> String {
        let (kind, job_id) = match self {
            ControlFrame::SubscribeToJob { job_id } => ("subscribeToJob", job_id),
            ControlFrame::UnsubscribeFromJob { job_id } => ("unsubscribeFromJob", job_id),
        };
        serde_json::json!({
            "type": kind,
            "data": { "job_id": job_id },
        })
        .to_string()
    }
}

/// Frames received from the progress channel.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelFrame {
    /// Progress update for a subscribed job.
    #[serde(rename = "jobUpdate")]
    JobUpdate(JobUpdate),
}

/// Payload of `jobUpdate` frames.
///
/// Delivery is best-effort: updates may arrive out of order, duplicated,
/// or after a job has already completed. Consumers must tolerate all
/// three.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobUpdate {
    pub job_id: String,
    /// Completion percentage in `0..=100` (the channel may overshoot).
    pub progress: f64,
}

/// Response body of `POST /api/job`.
#[derive(Debug, Deserialize)]
pub struct CreateJobResponse {
    /// Server-assigned identifier for the queued job.
    pub job_id: String,
}

/// Parse a progress-channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown frames and continue.
pub fn parse_frame(text: &str) -> Result<ChannelFrame, serde_json::Error> {
    serde_json::from_str(text)
}
