use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use scriptdeck_core::api::{
    self, Endpoint, HealthPayload, InventoryPayload, LogsPayload, Method, StatusPayload,
};
use scriptdeck_core::backend::Backend;
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::error::ClientError;
use scriptdeck_core::log_view::LogTarget;
use scriptdeck_core::model::{
    ControlAction, NewScript, ScriptConfig, ScriptId, ScriptStatus, ScriptUpdate,
};

fn classify_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::network(format!("request timed out: {}", e))
    } else if e.is_connect() {
        ClientError::network(format!("connection failed: {}", e))
    } else if e.is_decode() {
        ClientError::decode(e.to_string())
    } else {
        ClientError::network(e.to_string())
    }
}

/// `Backend` over the process manager's JSON HTTP API
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    origin: Url,
    token: Option<String>,
    manager_log_path: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(classify_reqwest_error)?;
        let origin = Url::parse(config.origin())
            .map_err(|e| ClientError::network(format!("bad base_url: {}", e)))?;
        Ok(Self {
            client,
            origin,
            token: config.auth_token.clone(),
            manager_log_path: config.manager_log_path.clone(),
        })
    }

    /// Route under the origin; each segment is percent-encoded on its own
    pub fn url(&self, endpoint: &Endpoint) -> Result<Url, ClientError> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::network(format!("base_url cannot carry a path: {}", self.origin)))?
            .pop_if_empty()
            .extend(endpoint.segments());
        url.set_query(endpoint.query().as_deref());
        Ok(url)
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        body: Option<Value>,
    ) -> Result<(StatusCode, String), ClientError> {
        let url = self.url(endpoint)?;
        let mut request = match endpoint.method() {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
            Method::Put => self.client.put(url.clone()),
            Method::Delete => self.client.delete(url.clone()),
        };
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        debug!(url = %url, status = %status, "response");
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        let text = response.text().await.map_err(classify_reqwest_error)?;
        Ok((status, text))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, ClientError> {
        let (status, body) = self.send(&endpoint, None).await?;
        non_envelope(status, api::decode_data(&body, endpoint.script_id()))
    }

    async fn call(&self, endpoint: Endpoint, body: Option<Value>) -> Result<(), ClientError> {
        let (status, text) = self.send(&endpoint, body).await?;
        non_envelope(status, api::decode_ack(&text, endpoint.script_id()))
    }
}

/// A body that is not an envelope on an error status (proxy pages and the
/// like) is a transport failure, not a malformed response
fn non_envelope<T>(status: StatusCode, result: Result<T, ClientError>) -> Result<T, ClientError> {
    match result {
        Err(ClientError::Decode { .. }) if !status.is_success() => {
            Err(ClientError::network(format!("HTTP {}", status)))
        }
        other => other,
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::decode(e.to_string()))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<HealthPayload, ClientError> {
        self.get(Endpoint::Health).await
    }

    async fn fetch_inventory(&self) -> Result<Vec<ScriptConfig>, ClientError> {
        let payload: InventoryPayload = self.get(Endpoint::Inventory).await?;
        Ok(payload.scripts)
    }

    async fn fetch_status(&self) -> Result<Vec<ScriptStatus>, ClientError> {
        let payload: StatusPayload = self.get(Endpoint::Status).await?;
        Ok(payload.status)
    }

    async fn fetch_logs(&self, target: &LogTarget, lines: usize) -> Result<Vec<String>, ClientError> {
        let endpoint = match target {
            LogTarget::Manager => Endpoint::ManagerLogs {
                path: self.manager_log_path.clone(),
                lines,
            },
            LogTarget::Script(id) => Endpoint::ScriptLogs {
                id: id.clone(),
                lines,
            },
        };
        let payload: LogsPayload = self.get(endpoint).await?;
        Ok(payload.logs)
    }

    async fn control(&self, id: &ScriptId, action: ControlAction) -> Result<(), ClientError> {
        self.call(
            Endpoint::Control {
                id: id.clone(),
                action,
            },
            None,
        )
        .await
    }

    async fn start_all(&self) -> Result<(), ClientError> {
        self.call(Endpoint::StartAll, None).await
    }

    async fn stop_all(&self) -> Result<(), ClientError> {
        self.call(Endpoint::StopAll, None).await
    }

    async fn add(&self, script: &NewScript) -> Result<(), ClientError> {
        self.call(Endpoint::Add, Some(to_body(script)?)).await
    }

    async fn remove(&self, id: &ScriptId) -> Result<(), ClientError> {
        self.call(Endpoint::Remove { id: id.clone() }, None).await
    }

    async fn update(&self, id: &ScriptId, update: &ScriptUpdate) -> Result<(), ClientError> {
        self.call(Endpoint::Update { id: id.clone() }, Some(to_body(update)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_origin_and_route() {
        let mut config = ClientConfig::default();
        config.base_url = "http://deck.local:5000/".into();
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(
            backend
                .url(&Endpoint::Control {
                    id: "etl".into(),
                    action: ControlAction::Restart
                })
                .unwrap()
                .as_str(),
            "http://deck.local:5000/api/scripts/etl/restart"
        );
        assert_eq!(
            backend
                .url(&Endpoint::ManagerLogs {
                    path: config.manager_log_path.clone(),
                    lines: 50
                })
                .unwrap()
                .as_str(),
            "http://deck.local:5000/api/manager/logs?lines=50"
        );
    }

    #[test]
    fn test_url_encodes_script_id() {
        let mut config = ClientConfig::default();
        config.base_url = "http://deck.local:5000".into();
        let backend = HttpBackend::new(&config).unwrap();
        let url = backend
            .url(&Endpoint::Control {
                id: "a b/c?".into(),
                action: ControlAction::Restart,
            })
            .unwrap();
        assert_eq!(url.as_str(), "http://deck.local:5000/api/scripts/a%20b%2Fc%3F/restart");
        assert_eq!(url.path_segments().unwrap().count(), 4);

        let logs = backend
            .url(&Endpoint::ScriptLogs { id: "x#1".into(), lines: 10 })
            .unwrap();
        assert_eq!(logs.as_str(), "http://deck.local:5000/api/scripts/x%231/logs?lines=10");
    }

    #[test]
    fn test_error_status_without_envelope_is_network() {
        let result: Result<(), ClientError> = non_envelope(
            StatusCode::BAD_GATEWAY,
            api::decode_ack("<html>bad gateway</html>", None),
        );
        assert_eq!(result.unwrap_err().kind(), scriptdeck_core::error::ErrorKind::Network);
    }

    #[test]
    fn test_error_status_with_envelope_keeps_message() {
        let result = non_envelope(
            StatusCode::NOT_FOUND,
            api::decode_ack(r#"{"success":false,"error":"Script not found"}"#, Some("ghost")),
        );
        assert_eq!(result, Err(ClientError::NotFound { id: "ghost".into() }));
    }
}
