//! Push payloads turned into notifications, and notification clicks.

use crate::config::NotificationConfig;
use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestUrl;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Decoded push message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
}

/// Notification ready to be shown by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
}

/// Host surface for showing notifications and opening windows.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: &Notification) -> WorkerResult<()>;

    async fn open_window(&self, url: &RequestUrl) -> WorkerResult<()>;
}

/// Empty pushes carry nothing to show and decode to `None`.
pub fn parse_push(data: Option<&[u8]>) -> WorkerResult<Option<PushPayload>> {
    let Some(bytes) = data else {
        return Ok(None);
    };

    serde_json::from_slice(bytes).map(Some).map_err(|error| {
        WorkerError::new(
            "worker.push.malformed",
            format!("failed to decode push payload: {error}"),
        )
    })
}

pub fn build_notification(payload: PushPayload, config: &NotificationConfig) -> Notification {
    Notification {
        title: payload.title,
        body: payload.body,
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        vibrate: config.vibrate.clone(),
        data: payload.data,
        actions: payload.actions,
    }
}

/// Window a click opens: `data.url` when it is a string, else the site root.
pub fn click_target(data: &Value, origin: &RequestUrl) -> WorkerResult<RequestUrl> {
    let target = data
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .unwrap_or("/");
    RequestUrl::resolve(origin, target)
}
