//! Loop iterativo de transformação - embed → ρ → measure → propose →
//! verify → iterate
//!
//! O orquestrador externo: repete a estratégia ativa até o score de
//! convergência com a postura alvo atingir o threshold ou esgotar as
//! iterações. Cada passo intermediário fica visível no resultado - o
//! processo é revelado, não só o produto final.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use trm_common::{Readings, Result, TargetStance};
use trm_llm::EmbeddingProvider;

use crate::context::{MeasurementScope, TransformationContext, TransformationResult};
use crate::strategy::Strategy;

/// Um passo do loop iterativo
#[derive(Debug, Clone, Serialize)]
pub struct TransformStep {
    pub iteration: u32,
    pub text: String,
    pub readings: Readings,
    /// Score de convergência com a postura alvo em [0, 1]
    pub convergence: f64,
}

/// Resultado do loop completo, com a trajetória inteira visível
#[derive(Debug, Clone, Serialize)]
pub struct TransformOutcome {
    pub original_text: String,
    pub final_text: String,
    pub steps: Vec<TransformStep>,
    pub converged: bool,
    pub total_iterations: u32,
    pub target: TargetStance,
    /// Resultado da última tentativa de estratégia (se houve alguma)
    pub last_result: Option<TransformationResult>,
}

/// Orquestrador do loop iterativo sobre uma estratégia
pub struct IterativeTransformer {
    strategy: Strategy,
    max_iterations: u32,
    convergence_threshold: f64,
}

impl IterativeTransformer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            max_iterations: 5,
            convergence_threshold: 0.85,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Roda o loop: mede, propõe, verifica, repete.
    ///
    /// O alvo é o eixo do contexto; a convergência é avaliada contra a
    /// `TargetStance` derivada dele. Uma iteração sem sucesso encerra o
    /// loop (a estratégia já esgotou os próprios retries).
    pub async fn run(
        &self,
        scope: &MeasurementScope,
        base_ctx: &TransformationContext,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<TransformOutcome> {
        let target = TargetStance::single_axis(&base_ctx.pack_name, &base_ctx.target_axis);

        let mut current_text = base_ctx.text.clone();
        let embedding = embedder.embed(&current_text).await?;
        let mut current_readings = scope.readings(&embedding)?;

        let mut steps = vec![TransformStep {
            iteration: 0,
            text: current_text.clone(),
            readings: current_readings.clone(),
            convergence: self.convergence(&target, &base_ctx.pack_name, &current_readings),
        }];

        let mut converged = false;
        let mut last_result = None;

        for iteration in 1..=self.max_iterations {
            let ctx = TransformationContext {
                text: current_text.clone(),
                current_readings: current_readings.clone(),
                ..base_ctx.clone()
            };

            let result = self.strategy.transform(scope, &ctx, embedder).await?;
            debug!(
                "iteração {}: success={} melhora={:+.3}",
                iteration, result.success, result.target_improvement
            );

            if !result.success {
                // Estratégia esgotada nesta forma do texto; parar aqui
                last_result = Some(result);
                break;
            }

            current_text = result.transformed_text.clone();
            current_readings = result.readings_after.clone();
            let convergence = self.convergence(&target, &base_ctx.pack_name, &current_readings);

            steps.push(TransformStep {
                iteration,
                text: current_text.clone(),
                readings: current_readings.clone(),
                convergence,
            });
            last_result = Some(result);

            if convergence >= self.convergence_threshold {
                info!(
                    "convergiu na iteração {} (score {:.3})",
                    iteration, convergence
                );
                converged = true;
                break;
            }
        }

        let total_iterations = steps.len() as u32 - 1;
        Ok(TransformOutcome {
            original_text: base_ctx.text.clone(),
            final_text: current_text,
            steps,
            converged,
            total_iterations,
            target,
            last_result,
        })
    }

    fn convergence(&self, target: &TargetStance, pack_name: &str, readings: &Readings) -> f64 {
        let mut by_pack = BTreeMap::new();
        by_pack.insert(pack_name.to_string(), readings.clone());
        target.convergence_score(&by_pack)
    }
}

/// Trajetória de leituras ao longo de uma sequência de embeddings, com
/// as distâncias de traço entre passos consecutivos. Útil para
/// visualizar como as leituras evoluem.
pub fn readings_trajectory(
    scope: &MeasurementScope,
    embeddings: &[Vec<f64>],
) -> Result<(Vec<Readings>, Vec<f64>)> {
    let mut trajectory = Vec::with_capacity(embeddings.len());
    let mut distances = Vec::new();
    let mut previous = None;

    for embedding in embeddings {
        let rho = scope.rho(embedding)?;
        trajectory.push(scope.pack.measure(&rho)?);

        if let Some(prev) = &previous {
            distances.push(trm_core::rho_distance(prev, &rho)?);
        }
        previous = Some(rho);
    }

    Ok((trajectory, distances))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleBasedStrategy, RuleSet};
    use std::sync::Arc;
    use trm_core::{random_projection, tetralemma_pack};
    use trm_llm::MockEmbeddingProvider;

    fn scope() -> MeasurementScope {
        MeasurementScope::new(
            Arc::new(tetralemma_pack(64, 42).unwrap()),
            Arc::new(random_projection(384, 64, 42)),
            0.01,
        )
    }

    #[tokio::test]
    async fn test_iterative_records_steps() {
        let strategy =
            Strategy::RuleBased(RuleBasedStrategy::new(Arc::new(RuleSet::builtin())));
        let transformer = IterativeTransformer::new(strategy)
            .with_max_iterations(2)
            .with_convergence_threshold(2.0); // inatingível: roda até parar

        let embedder = MockEmbeddingProvider::new(384);
        let ctx = TransformationContext::new(
            "I think maybe the main issue is that we're not clearly defining our goals.",
            "tetralemma",
            "A",
            Readings::from_pairs(vec![("A".to_string(), 0.25)]),
        )
        .with_threshold(-1.0)
        .with_max_retries(0);

        let outcome = transformer.run(&scope(), &ctx, &embedder).await.unwrap();

        // Passo 0 sempre presente, com o texto original
        assert_eq!(outcome.steps[0].iteration, 0);
        assert_eq!(outcome.steps[0].text, ctx.text);
        assert!(!outcome.converged);
        assert_eq!(outcome.original_text, ctx.text);

        // Convergência monotônica não é garantida, mas o score é válido
        for step in &outcome.steps {
            assert!((0.0..=1.0).contains(&step.convergence));
        }
    }

    #[tokio::test]
    async fn test_trajectory_lengths() {
        let scope = scope();
        let embedder = MockEmbeddingProvider::new(384);

        let mut embeddings = Vec::new();
        for text in ["first sentence here", "second sentence here", "third one now"] {
            embeddings.push(embedder.embed(text).await.unwrap());
        }

        let (readings, distances) = readings_trajectory(&scope, &embeddings).unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(distances.len(), 2);
        for d in distances {
            assert!((0.0..=1.0).contains(&d));
        }
    }
}
