//! Mock LLM Provider para testes
//!
//! Retorna respostas roteirizadas sem chamar APIs reais. Usado pelos
//! testes do motor de transformação e pelo modo offline.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use trm_common::{Result, TrmError};

use super::{LlmProvider, ProviderHealth};

#[derive(Debug, Clone)]
enum FailSpec {
    Retryable(String),
    Unavailable(String),
    Fatal(String),
}

impl FailSpec {
    fn to_error(&self) -> TrmError {
        match self {
            FailSpec::Retryable(m) => TrmError::GenerationRetryable(m.clone()),
            FailSpec::Unavailable(m) => TrmError::ProviderUnavailable(m.clone()),
            FailSpec::Fatal(m) => TrmError::Generation(m.clone()),
        }
    }
}

/// Mock provider: fila de respostas roteirizadas, com fallback de eco
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<String>>,
    fail: Option<FailSpec>,
    calls: AtomicU32,
}

impl MockLlmProvider {
    /// Sem roteiro: toda geração ecoa um marcador com o prompt
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Respostas roteirizadas, consumidas em ordem; depois cai no eco
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fail: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Sempre falha com o mesmo kind de erro
    pub fn failing_with(err: TrmError) -> Self {
        let fail = match err {
            TrmError::GenerationRetryable(m) => FailSpec::Retryable(m),
            TrmError::ProviderUnavailable(m) => FailSpec::Unavailable(m),
            other => FailSpec::Fatal(other.to_string()),
        };
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail: Some(fail),
            calls: AtomicU32::new(0),
        }
    }

    /// Quantas gerações foram pedidas
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, prompt: &str, _temperature: f64) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(fail) = &self.fail {
            return Err(fail.to_error());
        }

        let scripted = self.responses.lock().expect("mock lock").pop_front();
        Ok(scripted.unwrap_or_else(|| format!("MOCK_ANSWER for: {prompt}")))
    }

    async fn check_health(&self) -> ProviderHealth {
        ProviderHealth {
            available: self.fail.is_none(),
            latency_ms: 0.0,
            model: "mock".to_string(),
            error: self.fail.as_ref().map(|f| f.to_error().to_string()),
        }
    }

    fn estimate_cost(&self, _prompt: &str) -> f64 {
        0.0
    }

    fn estimate_latency(&self, _prompt: &str) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn requires_internet(&self) -> bool {
        false
    }
}
