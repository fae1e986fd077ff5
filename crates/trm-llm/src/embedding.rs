//! Adaptador de embeddings - integração com servidor de embeddings
//!
//! O contrato: texto não-vazio → vetor de dimensão fixa, normalizado
//! para comprimento unitário. O provedor declara a própria dimensão e
//! se precisa de rede.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trm_common::{Result, TrmError};

/// Tipo para representar um vetor de embedding
pub type Embedding = Vec<f64>;

/// Contrato de qualquer provedor de embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embedda um texto (vazio → `InvalidInput`; backend fora →
    /// `ProviderUnavailable`). O vetor retornado é unitário.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embedda um batch de textos na mesma ordem
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimensão declarada do vetor
    fn dim(&self) -> usize;

    fn model(&self) -> &str;

    fn requires_internet(&self) -> bool;
}

/// Normaliza um vetor para comprimento unitário
fn unit_normalize(mut v: Vec<f64>) -> Result<Vec<f64>> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= 1e-10 {
        return Err(TrmError::NumericalFailure(
            "embedding com norma zero retornado pelo backend".to_string(),
        ));
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(v)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
    #[allow(dead_code)]
    index: usize,
}

/// Cliente HTTP para servidor de embeddings OpenAI-style (`/embeddings`)
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dim: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dim,
        }
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TrmError::ProviderUnavailable(format!(
                    "servidor de embedding fora do ar em {url}: {e}; suba o serviço ou use TRM_OFFLINE=1"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrmError::ProviderUnavailable(format!(
                "servidor de embedding retornou {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            TrmError::Generation(format!("resposta de embedding não decodificável: {e}"))
        })?;

        if parsed.data.is_empty() {
            return Err(TrmError::Generation("resposta de embedding vazia".to_string()));
        }

        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dim {
                    return Err(TrmError::InvalidInput(format!(
                        "backend retornou dimensão {}, adaptador declara {}",
                        d.embedding.len(),
                        self.dim
                    )));
                }
                unit_normalize(d.embedding)
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(TrmError::InvalidInput(
                "não é possível embeddar texto vazio".to_string(),
            ));
        }

        debug!(
            "embeddando texto: {}...",
            &text[..text.len().min(50)]
        );

        let mut result = self.request(vec![text.to_string()]).await?;
        Ok(result.remove(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(TrmError::InvalidInput(
                "batch contém texto vazio".to_string(),
            ));
        }

        debug!("embeddando {} textos em batch", texts.len());
        self.request(texts.iter().map(|s| s.to_string()).collect())
            .await
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn requires_internet(&self) -> bool {
        true
    }
}

/// Provedor determinístico para testes e modo offline.
///
/// Bag-of-words com hash: cada palavra vira um vetor unitário seedado
/// pelo próprio hash, e o embedding do texto é a soma normalizada.
/// O mesmo texto sempre produz o mesmo vetor; textos parecidos ficam
/// próximos, textos disjuntos ficam quase ortogonais. Não captura
/// semântica real - serve para exercitar o pipeline sem rede.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dim: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn seed_for(token: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(TrmError::InvalidInput(
                "não é possível embeddar texto vazio".to_string(),
            ));
        }

        let mut acc = vec![0.0f64; self.dim];
        for word in text.split_whitespace() {
            let mut rng = StdRng::seed_from_u64(Self::seed_for(&word.to_lowercase()));
            for x in acc.iter_mut() {
                let sample: f64 = StandardNormal.sample(&mut rng);
                *x += sample;
            }
        }
        unit_normalize(acc)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model(&self) -> &str {
        "mock-hash-embedder"
    }

    fn requires_internet(&self) -> bool {
        false
    }
}

/// Cosine similarity entre dois embeddings
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_deterministic() {
        let provider = MockEmbeddingProvider::new(384);
        let a = provider.embed("the same text").await.unwrap();
        let b = provider.embed("the same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);

        let norm: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mock_disjoint_texts_near_orthogonal() {
        let provider = MockEmbeddingProvider::new(384);
        let a = provider.embed("alpha beta gamma").await.unwrap();
        let b = provider.embed("delta epsilon zeta").await.unwrap();
        assert!(cosine_similarity(&a, &b).abs() < 0.3);
    }

    #[tokio::test]
    async fn test_mock_similar_texts_stay_close() {
        let provider = MockEmbeddingProvider::new(384);
        let a = provider
            .embed("I think the main issue is the goal definition")
            .await
            .unwrap();
        let b = provider
            .embed("the main issue is the goal definition")
            .await
            .unwrap();
        // Remover duas palavras preserva a maior parte da direção
        assert!(cosine_similarity(&a, &b) > 0.8);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let provider = MockEmbeddingProvider::new(384);
        let err = provider.embed("   ").await.unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_batch_order_preserved() {
        let provider = MockEmbeddingProvider::new(64);
        let batch = provider.embed_batch(&["one", "two"]).await.unwrap();
        let one = provider.embed("one").await.unwrap();
        let two = provider.embed("two").await.unwrap();
        assert_eq!(batch[0], one);
        assert_eq!(batch[1], two);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &a), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }
}
