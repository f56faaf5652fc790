use crate::error::{Result, StrataError};
use crate::group::GroupConfig;
use crate::storage::MetadataStore;
use reqwest::{Client, header};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct GroupDeliveryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub timeout: Duration,
}

impl Default for GroupDeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            retry_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct CallbackPayload<'a> {
    name: &'a str,
    id: String,
    uris: Vec<String>,
}

/// Posts new item URIs to group callbacks. Transactional groups get a
/// dedicated worker so callbacks arrive one at a time in sequence order.
pub struct GroupCaller {
    client: Client,
    metadata: Arc<MetadataStore>,
    config: GroupDeliveryConfig,
    ordered: Mutex<HashMap<String, mpsc::UnboundedSender<i64>>>,
}

impl GroupCaller {
    pub fn new(metadata: Arc<MetadataStore>, config: GroupDeliveryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            metadata,
            config,
            ordered: Mutex::new(HashMap::new()),
        })
    }

    /// Called in sequence order for each channel.
    pub async fn notify(self: &Arc<Self>, channel_name: &str, sequence: i64) {
        if !self.config.enabled {
            return;
        }

        let groups = match self.metadata.list_groups() {
            Ok(groups) => groups,
            Err(error) => {
                tracing::warn!("failed to list groups for callbacks: {}", error);
                return;
            }
        };

        for record in groups {
            let group = record.config;
            match group.channel_name() {
                Ok(name) if name == channel_name => {}
                _ => continue,
            }

            if group.transactional {
                self.enqueue_ordered(&group.name, sequence).await;
            } else {
                let caller = self.clone();
                tokio::spawn(async move {
                    caller.deliver_with_retry(&group, sequence).await;
                });
            }
        }
    }

    /// Stops the ordered worker of a deleted or replaced group.
    pub async fn forget(&self, group_name: &str) {
        self.ordered.lock().await.remove(group_name);
    }

    async fn enqueue_ordered(self: &Arc<Self>, group_name: &str, sequence: i64) {
        let mut ordered = self.ordered.lock().await;
        if let Some(sender) = ordered.get(group_name) {
            if sender.send(sequence).is_ok() {
                return;
            }
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(sequence);
        ordered.insert(group_name.to_string(), sender);

        let caller = self.clone();
        let group_name = group_name.to_string();
        tokio::spawn(async move {
            caller.run_ordered(group_name, receiver).await;
        });
    }

    async fn run_ordered(&self, group_name: String, mut receiver: mpsc::UnboundedReceiver<i64>) {
        while let Some(sequence) = receiver.recv().await {
            let group = match self.metadata.get_group(&group_name) {
                Ok(Some(record)) => record.config,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!("failed to load group {}: {}", group_name, error);
                    continue;
                }
            };
            self.deliver_with_retry(&group, sequence).await;
        }
        tracing::debug!("ordered delivery for group {} stopped", group_name);
    }

    async fn deliver_with_retry(&self, group: &GroupConfig, sequence: i64) -> bool {
        let mut backoff = self.config.retry_backoff;
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.post_once(group, sequence).await {
                Ok(()) => {
                    if let Err(error) = self.metadata.record_group_delivery(&group.name, sequence) {
                        tracing::warn!(
                            "failed to record delivery group={} sequence={}: {}",
                            group.name,
                            sequence,
                            error
                        );
                    }
                    return true;
                }
                Err(error) if attempt < max_attempts => {
                    tracing::debug!(
                        "callback attempt {} failed group={} sequence={} error={}",
                        attempt,
                        group.name,
                        sequence,
                        error
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(error) => {
                    tracing::warn!(
                        "callback gave up group={} sequence={} error={}",
                        group.name,
                        sequence,
                        error
                    );
                }
            }
        }

        false
    }

    pub async fn post_once(&self, group: &GroupConfig, sequence: i64) -> Result<()> {
        let payload = CallbackPayload {
            name: &group.name,
            id: ulid::Ulid::new().to_string(),
            uris: vec![item_uri(&group.channel_url, sequence)],
        };

        let response = self
            .client
            .post(&group.callback_url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StrataError::Http(format!(
                "callback {} returned {}",
                group.callback_url,
                response.status()
            )));
        }

        Ok(())
    }
}

pub fn item_uri(channel_url: &str, sequence: i64) -> String {
    format!("{}/{}", channel_url.trim_end_matches('/'), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::Value;
    use tokio::net::TcpListener;

    async fn record_callback(
        State(sender): State<mpsc::UnboundedSender<Value>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let _ = sender.send(body);
        StatusCode::OK
    }

    /// Serves `POST /hook` and forwards each JSON body it receives.
    async fn callback_server() -> (String, mpsc::UnboundedReceiver<Value>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/hook", post(record_callback))
            .with_state(sender);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        (format!("http://{}/hook", addr), receiver)
    }

    #[tokio::test]
    async fn transactional_groups_are_delivered_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        let (callback_url, mut received) = callback_server().await;

        metadata
            .put_group(&GroupConfig {
                name: "ordered".to_string(),
                callback_url,
                channel_url: "http://hub/channel/orders".to_string(),
                transactional: true,
            })
            .expect("group");

        let caller = Arc::new(
            GroupCaller::new(metadata.clone(), GroupDeliveryConfig::default()).expect("caller"),
        );
        for sequence in 1000..1006 {
            caller.notify("orders", sequence).await;
        }
        caller.notify("other-channel", 5000).await;

        for sequence in 1000..1006 {
            let body = received.recv().await.expect("callback");
            assert_eq!(body["name"], "ordered");
            assert_eq!(
                body["uris"][0],
                format!("http://hub/channel/orders/{}", sequence)
            );
        }

        for _ in 0..100 {
            let group = metadata.get_group("ordered").expect("get").expect("group");
            if group.last_completed == Some(1005) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("last_completed never reached 1005");
    }

    #[test]
    fn item_uri_joins_channel_url() {
        assert_eq!(
            item_uri("http://hub/channel/orders/", 1000),
            "http://hub/channel/orders/1000"
        );
        assert_eq!(
            item_uri("http://hub/channel/orders", 1001),
            "http://hub/channel/orders/1001"
        );
    }

    #[tokio::test]
    async fn unreachable_callback_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        let caller = GroupCaller::new(
            metadata,
            GroupDeliveryConfig {
                timeout: Duration::from_millis(500),
                ..GroupDeliveryConfig::default()
            },
        )
        .expect("caller");

        let group = GroupConfig {
            name: "watchers".to_string(),
            callback_url: "http://127.0.0.1:1/hook".to_string(),
            channel_url: "http://hub/channel/orders".to_string(),
            transactional: false,
        };
        assert!(caller.post_once(&group, 1000).await.is_err());
    }
}
