//! Provedores LLM para a estratégia guiada por geração
//!
//! Todo provedor implementa o mesmo contrato: (prompt, temperature) →
//! texto gerado, mais metadados de custo e disponibilidade. Falhas de
//! autenticação viram `ProviderUnavailable`, rate limits viram
//! `GenerationRetryable` (retentadas internamente), o resto vira
//! `Generation`.

pub mod anthropic;
pub mod mock;
pub mod ollama;

pub use anthropic::AnthropicProvider;
pub use mock::MockLlmProvider;
pub use ollama::OllamaProvider;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use trm_common::{Result, TrmError};

/// Status de saúde de um provedor
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub latency_ms: f64,
    pub model: String,
    pub error: Option<String>,
}

/// Contrato de qualquer provedor de geração de texto
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Gera uma completion para o prompt na temperatura dada
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String>;

    /// Verifica se o provedor está disponível
    async fn check_health(&self) -> ProviderHealth;

    /// Custo estimado em USD para esta geração
    fn estimate_cost(&self, prompt: &str) -> f64;

    /// Latência estimada em milissegundos
    fn estimate_latency(&self, prompt: &str) -> f64;

    fn name(&self) -> &'static str;

    fn requires_internet(&self) -> bool;
}

/// Gera com retry interno para falhas retryable (rate limit, parse
/// transitório). Backoff linear simples entre tentativas.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    prompt: &str,
    temperature: f64,
    max_retries: u32,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        match provider.generate(prompt, temperature).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    "geração retryable falhou (tentativa {}/{}): {}",
                    attempt, max_retries, e
                );
                tokio::time::sleep(std::time::Duration::from_millis(250 * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classifica um erro de backend textual nos kinds da taxonomia
pub(crate) fn classify_generation_error(status: u16, body: &str) -> TrmError {
    let lower = body.to_lowercase();

    if status == 401 || status == 403 || lower.contains("authentication") || lower.contains("api key")
    {
        TrmError::ProviderUnavailable(format!(
            "autenticação falhou ({status}): verifique a API key"
        ))
    } else if status == 429 || lower.contains("rate limit") || lower.contains("overloaded") {
        TrmError::GenerationRetryable(format!("rate limit ({status}): aguarde e tente de novo"))
    } else {
        TrmError::Generation(format!("backend retornou {status}: {body}"))
    }
}
