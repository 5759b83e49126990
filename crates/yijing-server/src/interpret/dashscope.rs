//! DashScope text-generation client.

use super::{
    InterpretationService,
    retry::{RetryConfig, RetryOutcome, send_with_retry},
};
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
pub const DEFAULT_MODEL: &str = "qwen-max";
const GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";

#[derive(Clone)]
pub struct DashScopeConfig {
    /// `None` disables the client: every call fails fast with
    /// [`Error::Configuration`].
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub retry: RetryConfig,
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 800,
            top_p: 0.8,
            retry: RetryConfig::default(),
        }
    }
}

// Hand-written so the credential never reaches a log line.
impl core::fmt::Debug for DashScopeConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DashScopeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationInput<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct GenerationParameters {
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
}

#[derive(Deserialize)]
struct GenerationOutput {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`InterpretationService`] backed by the DashScope REST API.
#[derive(Debug, Clone)]
pub struct DashScopeClient {
    http: reqwest::Client,
    config: DashScopeConfig,
    endpoint: String,
}

impl DashScopeClient {
    pub fn new(config: DashScopeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("yijing-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_http(http, config))
    }

    pub fn with_http(http: reqwest::Client, config: DashScopeConfig) -> Self {
        let endpoint = format!(
            "{}{GENERATION_PATH}",
            config.base_url.trim_end_matches('/')
        );
        Self {
            http,
            config,
            endpoint,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    #[tracing::instrument(skip_all, fields(model = %self.config.model))]
    async fn call(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(Error::Configuration {
                reason: "DASHSCOPE_API_KEY is not set".to_string(),
            });
        };

        let body = GenerationRequest {
            model: &self.config.model,
            input: GenerationInput { prompt },
            parameters: GenerationParameters {
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                top_p: self.config.top_p,
            },
        };

        let outcome = send_with_retry(
            || {
                self.http
                    .post(&self.endpoint)
                    .bearer_auth(api_key)
                    .json(&body)
            },
            &self.config.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let detail: ApiErrorBody = response.json().await.unwrap_or_default();
                return Err(Error::ServiceUnavailable {
                    reason: format!(
                        "HTTP {status}: {} {}",
                        detail.code.as_deref().unwrap_or("-"),
                        detail.message.as_deref().unwrap_or("")
                    )
                    .trim_end()
                    .to_string(),
                });
            }
            RetryOutcome::Transport { attempts, source } => {
                return Err(Error::ServiceUnavailable {
                    reason: format!("request failed after {attempts} attempt(s): {source}"),
                });
            }
        };

        let parsed: GenerationResponse =
            response
                .json()
                .await
                .map_err(|e| Error::ServiceUnavailable {
                    reason: format!("malformed response: {e}"),
                })?;

        parsed
            .output
            .and_then(|output| output.text)
            .ok_or_else(|| Error::ServiceUnavailable {
                reason: "malformed response: missing output.text".to_string(),
            })
    }
}

impl InterpretationService for DashScopeClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.call(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn config(server: &MockServer) -> DashScopeConfig {
        DashScopeConfig {
            api_key: Some("sk-test".into()),
            base_url: server.uri(),
            retry: RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter_factor: 0.0,
            },
            ..DashScopeConfig::default()
        }
    }

    #[tokio::test]
    async fn returns_output_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "qwen-max",
                "input": { "prompt": "hello" },
                "parameters": { "max_tokens": 800 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": { "text": "乾卦大吉。建议：自强不息。" },
                "request_id": "abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DashScopeClient::new(config(&server)).unwrap();
        let text = client.generate("hello").await.unwrap();
        assert_eq!(text, "乾卦大吉。建议：自强不息。");
    }

    #[tokio::test]
    async fn missing_key_fails_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = DashScopeClient::new(DashScopeConfig {
            api_key: None,
            ..config(&server)
        })
        .unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.generate("hello").await,
            Err(Error::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn error_status_carries_code_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "InvalidApiKey",
                "message": "Invalid API-key provided."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DashScopeClient::new(config(&server)).unwrap();
        match client.generate("hello").await {
            Err(Error::ServiceUnavailable { reason }) => {
                assert!(reason.contains("401"), "{reason}");
                assert!(reason.contains("InvalidApiKey"), "{reason}");
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": {} })))
            .mount(&server)
            .await;

        let client = DashScopeClient::new(config(&server)).unwrap();
        match client.generate("hello").await {
            Err(Error::ServiceUnavailable { reason }) => assert!(reason.contains("malformed")),
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_transient_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "output": { "text": "ok" } })),
            )
            .mount(&server)
            .await;

        let client = DashScopeClient::new(config(&server)).unwrap();
        assert_eq!(client.generate("hello").await.unwrap(), "ok");
    }
}
