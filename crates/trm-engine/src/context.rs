//! Contexto, candidatos e resultado de uma transformação
//!
//! O `MeasurementScope` captura a identidade da projeção usada numa
//! comparação antes/depois: ela é um valor explícito do escopo e nunca
//! é regenerada no meio de uma verificação.

use nalgebra::DMatrix;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use trm_common::{Readings, Result};
use trm_core::{construct_density_matrix, DensityMatrix, PovmPack};

/// Escopo de medição de uma transformação: pack + projeção fixa.
///
/// Compartilhado entre as medições before/after da mesma transformação;
/// transformações diferentes podem usar escopos diferentes.
#[derive(Debug, Clone)]
pub struct MeasurementScope {
    pub pack: Arc<PovmPack>,
    projection: Arc<DMatrix<f64>>,
    pub shrinkage: f64,
}

impl MeasurementScope {
    pub fn new(pack: Arc<PovmPack>, projection: Arc<DMatrix<f64>>, shrinkage: f64) -> Self {
        Self {
            pack,
            projection,
            shrinkage,
        }
    }

    pub fn projection(&self) -> &DMatrix<f64> {
        &self.projection
    }

    /// ρ de um embedding sob a projeção compartilhada do escopo
    pub fn rho(&self, embedding: &[f64]) -> Result<DensityMatrix> {
        construct_density_matrix(
            embedding,
            self.pack.rank,
            self.shrinkage,
            Some(&self.projection),
        )
    }

    /// embedding → ρ → leituras, tudo sob o escopo
    pub fn readings(&self, embedding: &[f64]) -> Result<Readings> {
        self.pack.measure(&self.rho(embedding)?)
    }
}

/// Proveniência de um candidato: qual regra ou qual decodificação
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    Rule {
        description: String,
        confidence: crate::rules::Confidence,
    },
    Llm {
        temperature: f64,
        model: String,
    },
}

/// Uma reescrita proposta, ainda não verificada
#[derive(Debug, Clone, Serialize)]
pub struct TransformationCandidate {
    pub text: String,
    pub source: CandidateSource,
    /// Prior de confiança em [0, 1], antes de qualquer medição
    pub confidence: f64,
}

/// Bundle de entrada para qualquer estratégia
#[derive(Debug, Clone)]
pub struct TransformationContext {
    pub text: String,
    pub pack_name: String,
    pub target_axis: String,
    pub current_readings: Readings,
    /// Melhora mínima no eixo alvo para reportar sucesso (típico 0.01–0.10)
    pub target_threshold: f64,
    /// Razão máxima de mudança de texto permitida (típico 0.3–0.4)
    pub max_change_ratio: f64,
    /// Candidatos por batch (default 8 para regras, 5–10 para LLM)
    pub num_candidates: usize,
    /// Retries do loop GFS depois do primeiro batch
    pub max_retries: u32,
    /// Temperatura base de decodificação
    pub temperature: f64,
}

impl TransformationContext {
    pub fn new(
        text: impl Into<String>,
        pack_name: impl Into<String>,
        target_axis: impl Into<String>,
        current_readings: Readings,
    ) -> Self {
        Self {
            text: text.into(),
            pack_name: pack_name.into(),
            target_axis: target_axis.into(),
            current_readings,
            target_threshold: 0.05,
            max_change_ratio: 0.4,
            num_candidates: 8,
            max_retries: 2,
            temperature: 0.7,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.target_threshold = threshold;
        self
    }

    pub fn with_max_change_ratio(mut self, ratio: f64) -> Self {
        self.max_change_ratio = ratio;
        self
    }

    pub fn with_num_candidates(mut self, n: usize) -> Self {
        self.num_candidates = n;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Resultado completo de uma transformação. Imutável.
///
/// Quando `success` é false, `transformed_text` é o texto original e as
/// leituras before/after são iguais; a razão está em `error`.
#[derive(Debug, Clone, Serialize)]
pub struct TransformationResult {
    pub original_text: String,
    pub transformed_text: String,
    pub readings_before: Readings,
    pub readings_after: Readings,
    pub delta: BTreeMap<String, f64>,
    pub target_improvement: f64,
    pub rho_distance: f64,
    pub text_change_ratio: f64,
    /// 1 − D(ρ_before, ρ_after), clipado em [0, 1]
    pub semantic_coherence: f64,
    pub success: bool,
    /// Qual (sub-)estratégia produziu o candidato vencedor
    pub strategy: String,
    /// Regras aplicadas ou prompts usados
    pub rules_applied: Vec<String>,
    pub execution_time_ms: u64,
    pub estimated_cost_usd: f64,
    pub error: Option<String>,
}

impl TransformationResult {
    /// Resultado de falha: texto original, leituras inalteradas
    pub fn failed(
        ctx: &TransformationContext,
        readings_before: Readings,
        strategy: &str,
        reason: impl Into<String>,
        execution_time_ms: u64,
        estimated_cost_usd: f64,
    ) -> Self {
        let delta = readings_before
            .delta(&readings_before)
            .into_iter()
            .collect();
        Self {
            original_text: ctx.text.clone(),
            transformed_text: ctx.text.clone(),
            readings_before: readings_before.clone(),
            readings_after: readings_before,
            delta,
            target_improvement: 0.0,
            rho_distance: 0.0,
            text_change_ratio: 0.0,
            semantic_coherence: 1.0,
            success: false,
            strategy: strategy.to_string(),
            rules_applied: Vec::new(),
            execution_time_ms,
            estimated_cost_usd,
            error: Some(reason.into()),
        }
    }
}

/// Razão de mudança de texto: 1 − Jaccard sobre conjuntos de palavras
/// minúsculas. 0 = idêntico, 1 = nenhuma palavra em comum.
pub fn text_change_ratio(original: &str, transformed: &str) -> f64 {
    let orig: HashSet<String> = original
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let trans: HashSet<String> = transformed
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    if orig.is_empty() && trans.is_empty() {
        return 0.0;
    }

    let intersection = orig.intersection(&trans).count();
    let union = orig.union(&trans).count();

    1.0 - intersection as f64 / union as f64
}
