//! Remote browser sessions from the Browserbase session broker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ProvisionError;
use crate::model::Session;

pub const DEFAULT_BROKER_URL: &str = "https://api.browserbase.com/v1/sessions";

#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    async fn provision(&self) -> Result<Session, ProvisionError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSession<'a> {
    project_id: &'a str,
    proxies: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreated {
    #[serde(default)]
    id: String,
    connect_url: String,
}

/// Requests one proxied session per call.
pub struct BrowserbaseProvisioner {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    project_id: String,
}

impl BrowserbaseProvisioner {
    /// Credentials are checked on each request, so a provisioner without them
    /// can still be wired into a resolver that rarely scrapes.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            project_id: project_id.into(),
        })
    }

    pub async fn create_session(&self) -> Result<Session, ProvisionError> {
        if self.api_key.trim().is_empty() {
            return Err(ProvisionError::MissingCredential("api key"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ProvisionError::MissingCredential("project id"));
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-bb-api-key", &self.api_key)
            .json(&CreateSession {
                project_id: &self.project_id,
                proxies: true,
            })
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if status != 200 && status != 201 {
            warn!(status, body = %body, "session broker rejected request");
            return Err(ProvisionError::Rejected { status, body });
        }

        let created: SessionCreated = match serde_json::from_str(&body) {
            Ok(c) => c,
            Err(e) => {
                warn!(status, error = %e, "session broker body missing connectUrl");
                return Err(ProvisionError::MalformedBody { status, body });
            }
        };
        if created.connect_url.is_empty() {
            return Err(ProvisionError::MalformedBody { status, body });
        }

        info!(session_id = %created.id, "browser session created");
        Ok(Session {
            id: created.id,
            connect_url: created.connect_url,
            proxies: true,
        })
    }
}

#[async_trait]
impl SessionProvisioner for BrowserbaseProvisioner {
    async fn provision(&self) -> Result<Session, ProvisionError> {
        self.create_session().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_credentials_fail_before_any_request() {
        // Unroutable endpoint: reaching the network would surface as Network.
        let endpoint = "http://127.0.0.1:9/v1/sessions";
        let provisioner = BrowserbaseProvisioner::new(endpoint, " ", "proj").unwrap();
        let err = provisioner.create_session().await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingCredential("api key")));

        let provisioner = BrowserbaseProvisioner::new(endpoint, "key", "").unwrap();
        let err = provisioner.create_session().await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingCredential("project id")));
    }

    #[test]
    fn request_body_uses_broker_field_names() {
        let body = serde_json::to_value(CreateSession {
            project_id: "proj",
            proxies: true,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"projectId": "proj", "proxies": true}));
    }
}
