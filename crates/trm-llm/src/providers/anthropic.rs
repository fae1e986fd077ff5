//! Anthropic Provider - Claude via API para deployments web/api
//!
//! Requer internet e API key; rastreia custo estimado por geração.
//! Usado quando o usuário não tem recursos locais ou quer a melhor
//! qualidade de transformação.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use trm_common::{Result, TrmError};

use super::{classify_generation_error, LlmProvider, ProviderHealth};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Custo por 1M de tokens (input, output) por modelo
const COST_TABLE: [(&str, f64, f64); 3] = [
    ("claude-haiku-4-5-20251001", 0.25, 1.25),
    ("claude-sonnet-4-5-20251001", 3.00, 15.00),
    ("claude-opus-4-5-20251001", 15.00, 75.00),
];

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Cliente para a API Messages da Anthropic
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Falha com `ProviderUnavailable` se a key estiver vazia.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(TrmError::ProviderUnavailable(
                "API key da Anthropic ausente; exporte ANTHROPIC_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            max_tokens: 2048,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn cost_per_1m(&self) -> (f64, f64) {
        COST_TABLE
            .iter()
            .find(|(m, _, _)| *m == self.model)
            .map(|(_, i, o)| (*i, *o))
            .unwrap_or((1.0, 5.0))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(TrmError::InvalidInput("prompt vazio".to_string()));
        }

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TrmError::ProviderUnavailable(format!(
                    "API Anthropic inalcançável: {e}; verifique a conexão"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_generation_error(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            TrmError::GenerationRetryable(format!("resposta Anthropic inválida: {e}"))
        })?;

        let text = parsed
            .content
            .first()
            .map(|c| c.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(TrmError::Generation(
                "API Anthropic retornou conteúdo vazio".to_string(),
            ));
        }

        debug!(
            "Anthropic gerou {} chars em {:.0}ms (modelo {})",
            text.len(),
            start.elapsed().as_millis(),
            self.model
        );
        Ok(text)
    }

    async fn check_health(&self) -> ProviderHealth {
        let start = Instant::now();
        let result = self.generate("ping", 0.0).await;

        ProviderHealth {
            available: result.is_ok(),
            latency_ms: start.elapsed().as_millis() as f64,
            model: self.model.clone(),
            error: result.err().map(|e| e.to_string()),
        }
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        // Estimativa grosseira: 1 token ≈ 4 chars, output assume 50% do máximo
        let input_tokens = prompt.len() as f64 / 4.0;
        let output_tokens = self.max_tokens as f64 / 2.0;

        let (input_per_1m, output_per_1m) = self.cost_per_1m();
        (input_tokens / 1_000_000.0) * input_per_1m
            + (output_tokens / 1_000_000.0) * output_per_1m
    }

    fn estimate_latency(&self, _prompt: &str) -> f64 {
        // Baseline de API + ~7ms por 100 tokens de output
        let output_tokens = self.max_tokens as f64 / 2.0;
        200.0 + (output_tokens / 100.0) * 7.0
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn requires_internet(&self) -> bool {
        true
    }
}
