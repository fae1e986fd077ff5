//! Ollama Provider - LLM local via servidor Ollama
//!
//! Preferido no deployment LOCAL: sem API key, sem custo, roda offline
//! na máquina. Usa o endpoint `/api/generate` sem streaming.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use trm_common::{Result, TrmError};

use super::{classify_generation_error, LlmProvider, ProviderHealth};

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Cliente para um servidor Ollama local
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: 4096,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(TrmError::InvalidInput("prompt vazio".to_string()));
        }

        let url = format!("{}/api/generate", self.base_url);
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature,
                num_predict: self.max_tokens,
            },
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TrmError::ProviderUnavailable(format!(
                    "Ollama fora do ar em {url}: {e}; rode `ollama serve` ou mude TRM_LLM_PROVIDER"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_generation_error(status.as_u16(), &body));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TrmError::GenerationRetryable(format!("resposta Ollama inválida: {e}")))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(TrmError::GenerationRetryable(
                "Ollama retornou completion vazia".to_string(),
            ));
        }

        debug!(
            "Ollama gerou {} chars em {:.0}ms",
            text.len(),
            start.elapsed().as_millis()
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

    fn estimate_cost(&self, _prompt: &str) -> f64 {
        // Modelo local: custo zero
        0.0
    }

    fn estimate_latency(&self, prompt: &str) -> f64 {
        // Heurística para inferência local: ~40ms por 100 chars de prompt
        200.0 + (prompt.len() as f64 / 100.0) * 40.0
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn requires_internet(&self) -> bool {
        false
    }
}
