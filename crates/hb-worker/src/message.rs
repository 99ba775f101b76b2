//! Control channel between pages and the worker.

use hb_core::WorkerError;
use hb_core::WorkerResult;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::warn;

/// Message posted by a page. Variants that answer carry their reply port.
#[derive(Debug)]
pub enum ControlMessage {
    SkipWaiting,
    GetCacheSize {
        reply: oneshot::Sender<ControlReply>,
    },
    ClearCache {
        reply: oneshot::Sender<ControlReply>,
    },
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SkipWaiting => "SKIP_WAITING",
            Self::GetCacheSize { .. } => "GET_CACHE_SIZE",
            Self::ClearCache { .. } => "CLEAR_CACHE",
        }
    }
}

/// Worker answer, serialised as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    /// Entry count across every generation.
    CacheSize(usize),
    CacheCleared,
}

impl ControlReply {
    pub fn to_json(&self) -> WorkerResult<String> {
        serde_json::to_string(self).map_err(|error| {
            WorkerError::new(
                "worker.message.encode_failed",
                format!("failed to encode reply: {error}"),
            )
        })
    }
}

/// None of the handled types read `payload`, so it is not decoded.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decodes a `{type, payload}` message.
///
/// Unknown types are logged and yield `Ok(None)`. Types that answer need
/// `reply`; without one the message is rejected.
pub fn parse_control_message(
    raw: &str,
    reply: Option<oneshot::Sender<ControlReply>>,
) -> WorkerResult<Option<ControlMessage>> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|error| {
        WorkerError::new(
            "worker.message.malformed",
            format!("failed to decode control message: {error}"),
        )
    })?;

    let message = match envelope.kind.as_str() {
        "SKIP_WAITING" => ControlMessage::SkipWaiting,
        "GET_CACHE_SIZE" => ControlMessage::GetCacheSize {
            reply: require_reply(&envelope.kind, reply)?,
        },
        "CLEAR_CACHE" => ControlMessage::ClearCache {
            reply: require_reply(&envelope.kind, reply)?,
        },
        other => {
            warn!(kind = other, "unknown control message type");
            return Ok(None);
        }
    };
    Ok(Some(message))
}

fn require_reply(
    kind: &str,
    reply: Option<oneshot::Sender<ControlReply>>,
) -> WorkerResult<oneshot::Sender<ControlReply>> {
    reply.ok_or_else(|| {
        WorkerError::new(
            "worker.message.reply_missing",
            format!("`{kind}` needs a reply port"),
        )
    })
}

/// Sends `reply`; a page that stopped listening is only logged.
pub fn send_reply(port: oneshot::Sender<ControlReply>, reply: ControlReply) {
    if let Err(unsent) = port.send(reply) {
        warn!(reply = ?unsent, "control reply receiver dropped");
    }
}
