//! Broadcast hook: notify the query layer when an event publishes.
//!
//! Fire-and-forget: failures are logged, never retried.

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Posts `{type: "new_event", eventId}` to the configured endpoint.
pub struct BroadcastClient {
    client: Client,
    url: String,
}

impl BroadcastClient {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn notify_new_event(&self, event_id: i64) {
        let body = json!({ "type": "new_event", "eventId": event_id });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(event_id, "broadcast delivered");
            }
            Ok(response) => {
                warn!(event_id, status = %response.status(), "broadcast rejected");
            }
            Err(e) => {
                warn!(event_id, error = %e, "broadcast failed");
            }
        }
    }
}
