use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestUrl;
use hb_worker::Notification;
use hb_worker::NotificationSink;
use serde_json::json;

/// Prints notifications and window requests as JSON lines on stdout.
pub struct StdoutNotifications;

#[async_trait]
impl NotificationSink for StdoutNotifications {
    async fn show(&self, notification: &Notification) -> WorkerResult<()> {
        print_json(&json!({ "show_notification": notification }))
    }

    async fn open_window(&self, url: &RequestUrl) -> WorkerResult<()> {
        print_json(&json!({ "open_window": url.as_str() }))
    }
}

fn print_json(value: &serde_json::Value) -> WorkerResult<()> {
    let line = serde_json::to_string(value).map_err(|error| {
        WorkerError::new(
            "app.output.encode_failed",
            format!("failed to encode output: {error}"),
        )
    })?;
    println!("{line}");
    Ok(())
}
