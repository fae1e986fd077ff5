//! Loop GFS (Generate-Filter-Select)
//!
//! O protocolo de busca compartilhado por todas as estratégias:
//! 1. GENERATE: N candidatos da estratégia ativa
//! 2. Mede cada candidato sob a projeção compartilhada do escopo
//! 3. FILTER: razão de mudança acima do máximo, coerência < 0.5
//! 4. SELECT: maior melhora no alvo; desempate por coerência e menor
//!    mudança de texto
//! 5. RETRY: até R vezes, aumentando N e empurrando a temperatura;
//!    dedupe entre batches
//! 6. Esgotado: devolve o texto ORIGINAL com success=false e razão de
//!    erro não-vazia. Nunca fabrica sucesso.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

use trm_common::{Result, TrmError};
use trm_core::rho_distance;
use trm_llm::EmbeddingProvider;

use crate::context::{
    text_change_ratio, MeasurementScope, TransformationCandidate, TransformationContext,
    TransformationResult,
};

/// Coerência mínima para um candidato sobreviver ao filtro
const MIN_COHERENCE: f64 = 0.5;

/// Contrato de geração de candidatos de qualquer estratégia
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Gera até `n` candidatos para o contexto na temperatura dada
    async fn generate(
        &self,
        ctx: &TransformationContext,
        n: usize,
        temperature: f64,
    ) -> Result<Vec<TransformationCandidate>>;

    /// Tag da estratégia no resultado final
    fn strategy_tag(&self) -> &'static str;

    /// Custo estimado em USD de um batch
    fn estimated_cost(&self, ctx: &TransformationContext) -> f64;
}

/// Um candidato já medido sob o escopo da transformação
struct ScoredCandidate {
    candidate: TransformationCandidate,
    readings_after: trm_common::Readings,
    improvement: f64,
    change_ratio: f64,
    rho_distance: f64,
    coherence: f64,
}

/// Roda o loop GFS completo para uma estratégia.
///
/// `NoCandidate` é um valor: o esgotamento dos retries devolve um
/// `TransformationResult` com success=false, nunca um `Err`.
pub async fn run_gfs(
    scope: &MeasurementScope,
    ctx: &TransformationContext,
    embedder: &dyn EmbeddingProvider,
    generator: &dyn CandidateGenerator,
) -> Result<TransformationResult> {
    let start = Instant::now();

    if ctx.text.trim().is_empty() {
        return Err(TrmError::InvalidInput(
            "texto de entrada vazio".to_string(),
        ));
    }
    if !scope.pack.has_axis(&ctx.target_axis) {
        return Err(TrmError::InvalidInput(format!(
            "eixo desconhecido '{}' no pack '{}'",
            ctx.target_axis, scope.pack.name
        )));
    }

    // Estado de referência, medido uma vez sob o escopo compartilhado
    let embedding_before = embedder.embed(&ctx.text).await?;
    let rho_before = scope.rho(&embedding_before)?;
    let readings_before = scope.pack.measure(&rho_before)?;
    let target_before = readings_before.get(&ctx.target_axis).unwrap_or(0.0);

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(ctx.text.clone());

    let mut estimated_cost = 0.0;
    let mut best_below_threshold: Option<f64> = None;
    let mut evaluated_total = 0usize;

    for attempt in 0..=ctx.max_retries {
        // Backoff de busca: mais candidatos, temperatura empurrada
        let n = ctx.num_candidates + (attempt as usize) * 2;
        let temperature = ctx.temperature + 0.1 * attempt as f64;

        let candidates = generator.generate(ctx, n, temperature).await?;
        estimated_cost += generator.estimated_cost(ctx);
        debug!(
            "GFS tentativa {}/{}: {} candidatos gerados",
            attempt + 1,
            ctx.max_retries + 1,
            candidates.len()
        );

        let mut survivors: Vec<ScoredCandidate> = Vec::new();
        for candidate in candidates {
            // Dedupe entre batches; idêntico ao original não conta
            if !seen.insert(candidate.text.clone()) {
                continue;
            }
            evaluated_total += 1;

            let embedding_after = embedder.embed(&candidate.text).await?;
            let rho_after = scope.rho(&embedding_after)?;
            let readings_after = scope.pack.measure(&rho_after)?;

            let improvement =
                readings_after.get(&ctx.target_axis).unwrap_or(0.0) - target_before;
            let change_ratio = text_change_ratio(&ctx.text, &candidate.text);
            let distance = rho_distance(&rho_before, &rho_after)?;
            let coherence = (1.0 - distance).clamp(0.0, 1.0);

            // FILTER
            if change_ratio > ctx.max_change_ratio {
                debug!(
                    "candidato filtrado: mudança {:.2} > {:.2}",
                    change_ratio, ctx.max_change_ratio
                );
                continue;
            }
            if coherence < MIN_COHERENCE {
                debug!("candidato filtrado: coerência {:.2}", coherence);
                continue;
            }

            survivors.push(ScoredCandidate {
                candidate,
                readings_after,
                improvement,
                change_ratio,
                rho_distance: distance,
                coherence,
            });
        }

        // SELECT: maior melhora; coerência e menor mudança como desempate
        survivors.sort_by(|a, b| {
            b.improvement
                .partial_cmp(&a.improvement)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.coherence
                        .partial_cmp(&a.coherence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(
                    a.change_ratio
                        .partial_cmp(&b.change_ratio)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        if let Some(best) = survivors.first() {
            if best.improvement >= ctx.target_threshold {
                let delta = best.readings_after.delta(&readings_before);
                let rules_applied = vec![describe_source(&best.candidate)];

                info!(
                    "GFS sucesso na tentativa {}: melhora {:+.3}, mudança {:.2}",
                    attempt + 1,
                    best.improvement,
                    best.change_ratio
                );

                return Ok(TransformationResult {
                    original_text: ctx.text.clone(),
                    transformed_text: best.candidate.text.clone(),
                    readings_before,
                    readings_after: best.readings_after.clone(),
                    delta: delta.into_iter().collect(),
                    target_improvement: best.improvement,
                    rho_distance: best.rho_distance,
                    text_change_ratio: best.change_ratio,
                    semantic_coherence: best.coherence,
                    success: true,
                    strategy: generator.strategy_tag().to_string(),
                    rules_applied,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    estimated_cost_usd: estimated_cost,
                    error: None,
                });
            }

            best_below_threshold = Some(
                best_below_threshold
                    .map_or(best.improvement, |prev: f64| prev.max(best.improvement)),
            );
        }
    }

    // Retries esgotados: falha como valor, texto original preservado
    let reason = match best_below_threshold {
        Some(best) => format!(
            "nenhum candidato melhorou o alvo acima do threshold {:.3} (melhor visto: {:+.3}, {} avaliados)",
            ctx.target_threshold, best, evaluated_total
        ),
        None => format!(
            "nenhum candidato sobreviveu ao filtro ({} avaliados)",
            evaluated_total
        ),
    };
    info!("GFS sem candidato: {}", reason);

    Ok(TransformationResult::failed(
        ctx,
        readings_before,
        generator.strategy_tag(),
        reason,
        start.elapsed().as_millis() as u64,
        estimated_cost,
    ))
}

fn describe_source(candidate: &TransformationCandidate) -> String {
    match &candidate.source {
        crate::context::CandidateSource::Rule { description, .. } => description.clone(),
        crate::context::CandidateSource::Llm { temperature, model } => {
            format!("llm: {model} @ temp {temperature:.2}")
        }
    }
}
