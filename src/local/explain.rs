use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::store::ParcelRecord;
use crate::error::ExplainError;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-pro";

const SYSTEM_PROMPT: &str = "\
You write zoning breakdowns for licensed real estate appraisers. For the given \
property, name the zoning code it falls under and list, as bullet points, every \
use that code permits along with the regulations that apply. Do the same for the \
earthquake and flood zones. If a historic preservation overlay or hillside \
ordinance applies, link to its page. Only cite codes that exist.";

#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, parcel: &ParcelRecord, context: &str) -> Result<String, ExplainError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions against an OpenAI-compatible endpoint (OpenRouter by default).
pub struct OpenRouterExplainer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterExplainer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ExplainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

fn user_prompt(parcel: &ParcelRecord, context: &str) -> String {
    let details = serde_json::to_string_pretty(parcel).unwrap_or_else(|_| format!("{parcel:?}"));
    format!(
        "Property Details:\n{details}\n\nRelevant Documents:\n{context}\n\n\
         Explain the zoning details, flood risk, tax rate area, and any relevant \
         regulations based on the retrieved information."
    )
}

#[async_trait]
impl Explainer for OpenRouterExplainer {
    async fn explain(&self, parcel: &ParcelRecord, context: &str) -> Result<String, ExplainError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(parcel, context),
                },
            ],
        };

        let start = std::time::Instant::now();
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "generation API error");
            return Err(ExplainError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "explanation generated"
        );
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ExplainError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    fn parcel() -> ParcelRecord {
        ParcelRecord {
            ain: "5555-010-020".into(),
            situs_address: Some("100 N SPRING ST".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sends_bearer_and_both_prompts() {
        let router = Router::new().route(
            "/api/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "test/model");
                assert_eq!(body["messages"][0]["role"], "system");
                let user = body["messages"][1]["content"].as_str().unwrap().to_string();
                assert!(user.contains("100 N SPRING ST"));
                assert!(user.contains("R1 passage"));
                Json(json!({"choices": [{"message": {"content": "R1 allows one-family dwellings."}}]}))
            }),
        );
        let base = serve(router).await;

        let explainer = OpenRouterExplainer::new(base, "sk-test", "test/model").unwrap();
        let text = explainer.explain(&parcel(), "R1 passage").await.unwrap();
        assert_eq!(text, "R1 allows one-family dwellings.");
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let router = Router::new().route(
            "/api/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(router).await;

        let explainer = OpenRouterExplainer::new(base, "sk-test", "test/model").unwrap();
        let err = explainer.explain(&parcel(), "").await.unwrap_err();
        assert!(matches!(err, ExplainError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let router = Router::new().route(
            "/api/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = serve(router).await;

        let explainer = OpenRouterExplainer::new(base, "sk-test", "test/model").unwrap();
        let err = explainer.explain(&parcel(), "").await.unwrap_err();
        assert!(matches!(err, ExplainError::Empty));
    }
}
