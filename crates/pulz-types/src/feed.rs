use serde::Serialize;
use serde_json::Value;

/// An event published on the broadcaster and rendered on the `/feed` SSE stream as
/// `event: <kind>\ndata: <json>\n\n`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEvent {
    pub kind: String,
    pub payload: Value,
}

impl FeedEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn heartbeat(running: bool, time_left: f64, queue_size: u64) -> Self {
        Self::new(
            "heartbeat",
            serde_json::json!({
                "running": running,
                "time_left": time_left,
                "queue_size": queue_size,
            }),
        )
    }
}
