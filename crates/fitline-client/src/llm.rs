use std::collections::HashMap;
use std::sync::Arc;

use fitline_core::config::FitlineConfig;
use fitline_core::error::AppError;
use fitline_core::pool::EgressRoute;
use fitline_core::traits::{CompletionClient, CompletionRequest};
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use url::Url;

/// OpenAI-compatible chat-completions client.
///
/// One `reqwest::Client` is built per egress route at startup, so a request
/// goes out through whichever route the dispatcher drew for it. Works with
/// OpenRouter and any other endpoint that speaks the chat-completions format.
#[derive(Clone)]
pub struct OpenAiCompletionClient {
    clients: Arc<HashMap<String, Client>>,
    api_url: Url,
    model: String,
}

impl OpenAiCompletionClient {
    pub fn new(
        api_url: Url,
        model: impl Into<String>,
        routes: &[EgressRoute],
    ) -> Result<Self, AppError> {
        let mut clients = HashMap::with_capacity(routes.len());
        for route in routes {
            clients.insert(route.key().to_string(), build_client(route)?);
        }

        tracing::debug!(routes = clients.len(), %api_url, "Built completion HTTP clients");
        Ok(Self {
            clients: Arc::new(clients),
            api_url,
            model: model.into(),
        })
    }

    pub fn from_config(config: &FitlineConfig) -> Result<Self, AppError> {
        Self::new(
            config.api_url.clone(),
            config.model.clone(),
            config.egress.entries(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client_for(&self, route: &EgressRoute) -> Result<&Client, AppError> {
        self.clients
            .get(route.key())
            .ok_or_else(|| AppError::ConfigError(format!("No HTTP client for egress route {route}")))
    }
}

fn build_client(route: &EgressRoute) -> Result<Client, AppError> {
    let builder = match route {
        EgressRoute::Direct => Client::builder().no_proxy(),
        EgressRoute::Proxy(url) => {
            let proxy = Proxy::all(url.as_str()).map_err(|e| {
                AppError::ConfigError(format!("Invalid proxy {route}: {e}"))
            })?;
            Client::builder().proxy(proxy)
        }
    };
    builder
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-success HTTP status to the error the dispatcher branches on.
fn status_error(status_code: u16, body: &str) -> AppError {
    if status_code == 429 {
        return AppError::RateLimitExceeded;
    }

    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {}: {}", status_code, body));

    AppError::LlmError {
        message,
        status_code,
        retryable: status_code >= 500,
    }
}

impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let client = self.client_for(&request.egress)?;
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };
        let timeout_secs = request.timeout.as_secs();

        let response = client
            .post(self.api_url.clone())
            .header(
                "Authorization",
                format!("Bearer {}", request.credential.expose()),
            )
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {}", e))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout_secs)
            } else {
                AppError::MalformedResponse(format!("Failed to parse completion response: {}", e))
            }
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".into(),
                status_code: 200,
                retryable: false,
            })
    }
}
