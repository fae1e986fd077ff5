//! Camada de adaptadores do TRM: embeddings e provedores LLM
//!
//! O núcleo numérico é síncrono e puro; este crate concentra os únicos
//! pontos de suspensão do sistema: chamadas ao adaptador de embedding e
//! ao gerador de texto. Cada provedor declara seus requisitos (internet,
//! API key) e seus custos estimados.

pub mod embedding;
pub mod providers;

pub use embedding::{cosine_similarity, EmbeddingProvider, HttpEmbeddingClient, MockEmbeddingProvider};
pub use providers::{
    generate_with_retry, AnthropicProvider, LlmProvider, MockLlmProvider, OllamaProvider,
    ProviderHealth,
};

/// Alias canônico para resultados com a taxonomia do TRM.
pub type Result<T> = trm_common::Result<T>;
