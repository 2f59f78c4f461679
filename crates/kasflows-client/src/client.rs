//! The relay client.
//!
//! `RelayClient` announces a name, keeps it alive with a background
//! heartbeat, sends events and polls its mailbox.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::{ClientError, ClientResult};

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between re-announces. Must be shorter than the relay's idle timeout.
    pub heartbeat_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// A `{status, ...}` body returned by the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    clients: Vec<String>,
}

/// Client for one named relay participant.
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
    config: ClientConfig,
    /// Announced name, set while connected.
    name: Option<String>,
    /// Latest token, shared with the heartbeat so renewals land here.
    token: Arc<Mutex<Option<String>>>,
    heartbeat_handle: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Create a client with the default configuration.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            config,
            name: None,
            token: Arc::new(Mutex::new(None)),
            heartbeat_handle: None,
        })
    }

    /// Whether the last connect succeeded and no disconnect followed.
    pub fn is_connected(&self) -> bool {
        self.name.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    /// Announce `name` and start the heartbeat.
    ///
    /// Re-connecting under the current name presents the held token. On
    /// failure the client is left disconnected.
    pub async fn connect(&mut self, name: &str) -> ClientResult<StatusResponse> {
        self.stop_heartbeat();
        let presented = if self.name.as_deref() == Some(name) {
            self.token()
        } else {
            None
        };

        let body = json!({ "name": name, "token": presented });
        let resp = match post(&self.http, &self.base_url, "/statusws", body).await {
            Ok(resp) => resp,
            Err(e) => {
                self.clear_session();
                return Err(e);
            }
        };

        match resp.status.as_str() {
            "connected" | "already connected" => {
                tracing::info!("connected to relay as '{}'", name);
                self.name = Some(name.to_string());
                *self.token.lock() = resp.token.clone().or(presented);
                self.start_heartbeat(name.to_string());
                Ok(resp)
            }
            other => {
                self.clear_session();
                Err(ClientError::UnexpectedStatus(other.to_string()))
            }
        }
    }

    /// Stop the heartbeat and end the session on the relay.
    ///
    /// If the relay does not confirm, the session is still considered live
    /// and the heartbeat resumes.
    pub async fn disconnect(&mut self) -> ClientResult<StatusResponse> {
        let name = self.name.clone().ok_or(ClientError::NotConnected)?;
        self.stop_heartbeat();

        let result = post(
            &self.http,
            &self.base_url,
            "/disconnect",
            json!({ "name": name, "token": self.token() }),
        )
        .await;

        match result {
            Ok(resp) if resp.status == "disconnected" || resp.status == "not connected" => {
                self.clear_session();
                Ok(resp)
            }
            other => {
                self.start_heartbeat(name);
                other
            }
        }
    }

    /// Send `event` to the relay.
    ///
    /// `data` must be a JSON object; `sender` is filled in with this client's
    /// name unless already present, and the token is attached.
    pub async fn emit(&self, event: &str, data: Value) -> ClientResult<()> {
        let name = self.name.as_deref().ok_or(ClientError::NotConnected)?;
        let Value::Object(mut fields) = data else {
            return Err(ClientError::InvalidPayload("event data must be an object".into()));
        };

        fields
            .entry("sender")
            .or_insert_with(|| Value::String(name.to_string()));
        if let Some(token) = self.token() {
            fields.insert("token".into(), Value::String(token));
        }

        post(
            &self.http,
            &self.base_url,
            "/sendmessage",
            json!({ "event": event, "data": fields }),
        )
        .await?;
        Ok(())
    }

    /// Take the pending message for this client, if any.
    pub async fn check_messages(&self) -> ClientResult<Option<Value>> {
        let name = self.name.as_deref().ok_or(ClientError::NotConnected)?;
        let resp = post(
            &self.http,
            &self.base_url,
            "/getmessage",
            json!({ "name": name, "token": self.token() }),
        )
        .await?;

        match resp.status.as_str() {
            "success" => Ok(Some(resp.message.unwrap_or(Value::Null))),
            "no message" => Ok(None),
            other => Err(ClientError::UnexpectedStatus(other.to_string())),
        }
    }

    /// Queue `message` directly into another client's mailbox.
    pub async fn send_to_client(&self, name: &str, message: Value) -> ClientResult<()> {
        post(
            &self.http,
            &self.base_url,
            "/sendmessagetoclient",
            json!({ "name": name, "message": message }),
        )
        .await?;
        Ok(())
    }

    /// Names currently connected to the relay.
    pub async fn clients(&self) -> ClientResult<Vec<String>> {
        let resp = self
            .http
            .get(format!("{}/getclients", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<ClientsResponse>().await?.clients)
    }

    fn clear_session(&mut self) {
        self.name = None;
        *self.token.lock() = None;
    }

    fn start_heartbeat(&mut self, name: String) {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let token = self.token.clone();
        let interval = self.config.heartbeat_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick

            loop {
                ticker.tick().await;
                let presented = token.lock().clone();
                let body = json!({ "name": name, "token": presented });
                match post(&http, &base_url, "/statusws", body).await {
                    Ok(resp) => {
                        if let Some(renewed) = resp.token {
                            *token.lock() = Some(renewed);
                        }
                    }
                    Err(e) => tracing::error!("heartbeat failed: {}", e),
                }
            }
        });
        self.heartbeat_handle = Some(handle);
    }

    fn stop_heartbeat(&mut self) {
        if let Some(h) = self.heartbeat_handle.take() {
            h.abort();
            tracing::debug!("heartbeat stopped");
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

/// POST a JSON body and decode the relay's status response.
async fn post(
    http: &reqwest::Client,
    base_url: &str,
    path: &str,
    body: Value,
) -> ClientResult<StatusResponse> {
    let resp = http
        .post(format!("{base_url}{path}"))
        .json(&body)
        .send()
        .await?;

    let code = resp.status();
    let parsed: StatusResponse = match resp.json().await {
        Ok(parsed) => parsed,
        Err(e) if code.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(ClientError::Server {
                status: code.as_u16(),
                message: code.canonical_reason().unwrap_or("unknown").to_string(),
            })
        }
    };

    if parsed.status == "error" || !code.is_success() {
        let message = match parsed.message {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => parsed.status,
        };
        return Err(ClientError::Server {
            status: code.as_u16(),
            message,
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_connect(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/statusws"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "connected", "token": "tok"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn connect_stores_name_and_token() {
        let server = MockServer::start().await;
        mock_connect(&server).await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        let resp = client.connect("alice").await.unwrap();
        assert_eq!(resp.status, "connected");
        assert!(client.is_connected());
        assert_eq!(client.name(), Some("alice"));
        assert_eq!(client.token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn calls_require_connection() {
        let mut client = RelayClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(client.disconnect().await, Err(ClientError::NotConnected)));
        assert!(matches!(
            client.emit("ping", json!({})).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.check_messages().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn emit_fills_sender_and_token() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/sendmessage"))
            .and(body_partial_json(json!({
                "event": "ping",
                "data": {"sender": "alice", "token": "tok", "text": "hi"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        client.connect("alice").await.unwrap();
        client.emit("ping", json!({"text": "hi"})).await.unwrap();
    }

    #[tokio::test]
    async fn emit_surfaces_client_not_found() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/sendmessage"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"status": "error", "message": "Client not found"})),
            )
            .mount(&server)
            .await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        client.connect("alice").await.unwrap();
        match client.emit("ping", json!({})).await {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Client not found");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emit_rejects_non_object_data() {
        let server = MockServer::start().await;
        mock_connect(&server).await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        client.connect("alice").await.unwrap();
        assert!(matches!(
            client.emit("ping", json!([1, 2])).await,
            Err(ClientError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn check_messages_maps_statuses() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/getmessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "message": {"reply": "pong"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/getmessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "no message"})))
            .mount(&server)
            .await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        client.connect("alice").await.unwrap();
        assert_eq!(
            client.check_messages().await.unwrap(),
            Some(json!({"reply": "pong"}))
        );
        assert_eq!(client.check_messages().await.unwrap(), None);
    }

    #[tokio::test]
    async fn heartbeat_reannounces_until_disconnect() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/disconnect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "disconnected"})))
            .mount(&server)
            .await;

        let mut client = RelayClient::with_config(
            &server.uri(),
            ClientConfig {
                heartbeat_interval: Duration::from_millis(50),
                ..ClientConfig::default()
            },
        )
        .unwrap();
        client.connect("alice").await.unwrap();
        time::sleep(Duration::from_millis(220)).await;

        let resp = client.disconnect().await.unwrap();
        assert_eq!(resp.status, "disconnected");
        assert!(!client.is_connected());
        // Let an announce already on the wire land before counting.
        time::sleep(Duration::from_millis(30)).await;

        let before = announces(&server.received_requests().await.unwrap());
        assert!(before >= 3, "expected heartbeats, saw {before} announces");

        time::sleep(Duration::from_millis(150)).await;
        let after = announces(&server.received_requests().await.unwrap());
        assert_eq!(before, after);
    }

    fn announces(reqs: &[wiremock::Request]) -> usize {
        reqs.iter().filter(|r| r.url.path() == "/statusws").count()
    }

    #[tokio::test]
    async fn heartbeat_presents_and_renews_token() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/statusws"))
            .and(body_partial_json(json!({"name": "alice", "token": "tok"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "already connected", "token": "tok2"})),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/statusws"))
            .and(body_partial_json(json!({"name": "alice", "token": "tok2"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "already connected"})),
            )
            .with_priority(1)
            .mount(&server)
            .await;

        let mut client = RelayClient::with_config(
            &server.uri(),
            ClientConfig {
                heartbeat_interval: Duration::from_millis(50),
                ..ClientConfig::default()
            },
        )
        .unwrap();
        client.connect("alice").await.unwrap();
        assert_eq!(client.token().as_deref(), Some("tok"));

        time::sleep(Duration::from_millis(180)).await;
        assert_eq!(client.token().as_deref(), Some("tok2"));

        let reqs = server.received_requests().await.unwrap();
        let presented_renewed = reqs
            .iter()
            .filter(|r| r.url.path() == "/statusws")
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .any(|body| body["token"] == "tok2");
        assert!(presented_renewed);
    }

    #[tokio::test]
    async fn failed_disconnect_keeps_session_alive() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/disconnect"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"status": "error", "message": "boom"})),
            )
            .mount(&server)
            .await;

        let mut client = RelayClient::with_config(
            &server.uri(),
            ClientConfig {
                heartbeat_interval: Duration::from_millis(50),
                ..ClientConfig::default()
            },
        )
        .unwrap();
        client.connect("alice").await.unwrap();

        match client.disconnect().await {
            Err(ClientError::Server { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected server error, got {other:?}"),
        }
        assert!(client.is_connected());
        assert_eq!(client.token().as_deref(), Some("tok"));

        let before = announces(&server.received_requests().await.unwrap());
        time::sleep(Duration::from_millis(160)).await;
        let after = announces(&server.received_requests().await.unwrap());
        assert!(after > before, "heartbeat did not resume");
    }

    #[tokio::test]
    async fn failed_connect_leaves_client_disconnected() {
        let server = MockServer::start().await;
        mock_connect(&server).await;
        Mock::given(method("POST"))
            .and(path("/statusws"))
            .and(body_partial_json(json!({"name": "bob"})))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(json!({"status": "error", "message": "down"})),
            )
            .with_priority(1)
            .mount(&server)
            .await;

        let mut client = RelayClient::new(&server.uri()).unwrap();
        client.connect("alice").await.unwrap();
        assert!(client.connect("bob").await.is_err());
        assert!(!client.is_connected());
        assert_eq!(client.token(), None);
        assert!(matches!(
            client.check_messages().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn clients_lists_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getclients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"clients": ["a", "b"]})))
            .mount(&server)
            .await;

        let client = RelayClient::new(&server.uri()).unwrap();
        assert_eq!(client.clients().await.unwrap(), vec!["a", "b"]);
    }
}
