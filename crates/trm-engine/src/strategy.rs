//! Estratégias de transformação com contrato comum
//!
//! Dispatch por variante taggeada, não por trait object: o orquestrador
//! é dono da variante e cada estratégia é stateless dada sua config.
//!
//! Hybrid roda as regras primeiro (baratas, determinísticas); se nenhum
//! candidato de regra atinge o threshold, cai para o LLM e devolve o
//! melhor das duas tentativas, anotando qual sub-estratégia venceu.
//! Custo e latência são agregados entre as tentativas.

use tracing::{debug, info};

use trm_common::Result;
use trm_llm::EmbeddingProvider;

use crate::context::{MeasurementScope, TransformationContext, TransformationResult};
use crate::gfs::run_gfs;
use crate::llm_guided::LlmGuidedStrategy;
use crate::rules::RuleBasedStrategy;

/// Estratégia ativa de uma transformação
pub enum Strategy {
    RuleBased(RuleBasedStrategy),
    LlmGuided(LlmGuidedStrategy),
    Hybrid {
        rules: RuleBasedStrategy,
        llm: LlmGuidedStrategy,
    },
}

impl Strategy {
    /// Transforma o texto do contexto em direção ao eixo alvo.
    ///
    /// Contrato idêntico para todas as variantes; `success=false` com
    /// razão preenchida quando nenhum candidato atinge o threshold.
    pub async fn transform(
        &self,
        scope: &MeasurementScope,
        ctx: &TransformationContext,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<TransformationResult> {
        match self {
            Strategy::RuleBased(rules) => run_gfs(scope, ctx, embedder, rules).await,
            Strategy::LlmGuided(llm) => run_gfs(scope, ctx, embedder, llm).await,
            Strategy::Hybrid { rules, llm } => {
                let rule_result = run_gfs(scope, ctx, embedder, rules).await?;
                if rule_result.success {
                    info!(
                        "hybrid: regras resolveram com melhora {:+.3}",
                        rule_result.target_improvement
                    );
                    return Ok(tag_hybrid(rule_result, "rules"));
                }

                debug!("hybrid: regras não atingiram o threshold, caindo para LLM");
                let llm_result = run_gfs(scope, ctx, embedder, llm).await?;

                // O melhor das duas tentativas vence; custo/latência agregados
                let carried_ms = rule_result.execution_time_ms;
                let carried_cost = rule_result.estimated_cost_usd;

                let mut winner = if llm_result.target_improvement >= rule_result.target_improvement
                {
                    tag_hybrid(llm_result, "llm")
                } else {
                    tag_hybrid(rule_result, "rules")
                };
                winner.execution_time_ms += carried_ms;
                winner.estimated_cost_usd += carried_cost;

                Ok(winner)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RuleBased(_) => "rules",
            Strategy::LlmGuided(_) => "llm",
            Strategy::Hybrid { .. } => "hybrid",
        }
    }
}

fn tag_hybrid(mut result: TransformationResult, winner: &str) -> TransformationResult {
    result.strategy = format!("hybrid:{winner}");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;
    use std::sync::Arc;
    use trm_common::Readings;
    use trm_core::{random_projection, tetralemma_pack};
    use trm_llm::{MockEmbeddingProvider, MockLlmProvider};

    fn scope() -> MeasurementScope {
        MeasurementScope::new(
            Arc::new(tetralemma_pack(64, 42).unwrap()),
            Arc::new(random_projection(384, 64, 42)),
            0.01,
        )
    }

    fn ctx() -> TransformationContext {
        TransformationContext::new(
            "I think maybe the main issue is that we're not clearly defining our goals.",
            "tetralemma",
            "A",
            Readings::from_pairs(vec![("A".to_string(), 0.25)]),
        )
        .with_max_retries(0)
    }

    #[tokio::test]
    async fn test_hybrid_rules_first() {
        // Threshold impossível de falhar: regras devem vencer sem LLM
        let llm_provider = Arc::new(MockLlmProvider::new());
        let strategy = Strategy::Hybrid {
            rules: RuleBasedStrategy::new(Arc::new(RuleSet::builtin())),
            llm: LlmGuidedStrategy::new(llm_provider.clone()),
        };

        let embedder = MockEmbeddingProvider::new(384);
        let result = strategy
            .transform(&scope(), &ctx().with_threshold(-1.0), &embedder)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.strategy, "hybrid:rules");
        // LLM nunca foi chamado
        assert_eq!(llm_provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_llm() {
        // Threshold inatingível: regras falham, LLM é tentado
        let llm_provider = Arc::new(MockLlmProvider::with_responses(vec![
            "The main issue is that we're defining our goals.".to_string(),
        ]));
        let strategy = Strategy::Hybrid {
            rules: RuleBasedStrategy::new(Arc::new(RuleSet::builtin())),
            llm: LlmGuidedStrategy::new(llm_provider.clone()),
        };

        let embedder = MockEmbeddingProvider::new(384);
        let result = strategy
            .transform(&scope(), &ctx().with_threshold(10.0), &embedder)
            .await
            .unwrap();

        // Threshold 10.0 é inatingível: ambos falham, mas o LLM rodou
        assert!(!result.success);
        assert!(llm_provider.calls() > 0);
        assert!(result.strategy.starts_with("hybrid:"));
        assert!(result.error.is_some());
        assert_eq!(result.transformed_text, result.original_text);
    }

    #[tokio::test]
    async fn test_strategy_names() {
        let rules = Strategy::RuleBased(RuleBasedStrategy::new(Arc::new(RuleSet::builtin())));
        assert_eq!(rules.name(), "rules");

        let llm = Strategy::LlmGuided(LlmGuidedStrategy::new(Arc::new(MockLlmProvider::new())));
        assert_eq!(llm.name(), "llm");
    }
}
