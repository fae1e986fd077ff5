//! Testes end-to-end do motor de transformação
//!
//! Exercitam o pipeline completo com adaptadores mock: catálogo →
//! escopo → estratégia → GFS → resultado. Nenhum backend de rede.

use std::sync::Arc;

use trm_common::{Readings, TrmError};
use trm_config::{CoreConfig, DeploymentMode, EmbeddingConfig, LlmConfig, StorageConfig, TrmConfig};
use trm_engine::{
    run_gfs, Catalog, LlmGuidedStrategy, RuleBasedStrategy, RuleSet, Strategy,
    TransformationContext,
};
use trm_llm::{EmbeddingProvider, MockEmbeddingProvider, MockLlmProvider};

fn test_config(data_dir: &str) -> TrmConfig {
    TrmConfig {
        profile: "dev".to_string(),
        deployment: DeploymentMode::Local,
        core: CoreConfig::default(),
        embedding: EmbeddingConfig {
            provider: "mock".to_string(),
            url: "http://localhost:8001/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dim: 384,
        },
        llm: LlmConfig {
            provider: "mock".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "mistral:7b".to_string(),
            anthropic_api_key: None,
            anthropic_model: "claude-haiku-4-5-20251001".to_string(),
        },
        storage: StorageConfig {
            data_dir: data_dir.to_string(),
        },
    }
}

async fn initial_readings(
    catalog: &Catalog,
    embedder: &MockEmbeddingProvider,
    text: &str,
    pack: &str,
) -> Readings {
    let scope = catalog.scope(pack, 384).unwrap();
    let embedding = embedder.embed(text).await.unwrap();
    scope.readings(&embedding).unwrap()
}

/// S4 - o motor de regras remove hedging: o candidato esperado aparece
/// e respeita os limites de mudança de texto
#[tokio::test]
async fn s4_rule_engine_removes_hedging() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Catalog::load(&test_config(tmp.path().to_str().unwrap())).unwrap();
    let embedder = MockEmbeddingProvider::new(384);

    let text = "I think the main issue is that we're not clearly defining our goals.";
    let readings = initial_readings(&catalog, &embedder, text, "tetralemma").await;

    // Threshold negativo: qualquer candidato sobrevivente é selecionável,
    // o que interessa aqui é o texto produzido pela regra
    let ctx = TransformationContext::new(text, "tetralemma", "A", readings)
        .with_threshold(-1.0)
        .with_max_retries(0);

    let scope = catalog.scope("tetralemma", 384).unwrap();
    let strategy = RuleBasedStrategy::new(catalog.rules());
    let result = run_gfs(&scope, &ctx, &embedder, &strategy).await.unwrap();

    assert!(result.success);
    assert_eq!(
        result.transformed_text,
        "The main issue is that we're not clearly defining our goals."
    );
    assert!(result.text_change_ratio > 0.0);
    assert!(result.text_change_ratio <= 0.4);
    assert!(result.rules_applied[0].contains("I think"));
}

/// S5 - estratégia que só emite cópias do input: o resultado preserva o
/// original com success=false e razão de erro não-vazia
#[tokio::test]
async fn s5_no_candidate_returns_original() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Catalog::load(&test_config(tmp.path().to_str().unwrap())).unwrap();
    let embedder = MockEmbeddingProvider::new(384);

    // Texto sem nenhum padrão de regra: todas as regras declinam
    let text = "Seventeen owls landed quietly.";
    let readings = initial_readings(&catalog, &embedder, text, "tetralemma").await;

    let ctx = TransformationContext::new(text, "tetralemma", "A", readings)
        .with_threshold(0.05)
        .with_max_retries(1);

    let scope = catalog.scope("tetralemma", 384).unwrap();
    let strategy = RuleBasedStrategy::new(catalog.rules());
    let result = run_gfs(&scope, &ctx, &embedder, &strategy).await.unwrap();

    assert_eq!(result.transformed_text, text);
    assert!(!result.success);
    assert!(!result.error.as_ref().unwrap().is_empty());
    assert_eq!(result.readings_before, result.readings_after);
}

/// Estratégia LLM fim-a-fim com provedor roteirizado
#[tokio::test]
async fn llm_strategy_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Catalog::load(&test_config(tmp.path().to_str().unwrap())).unwrap();
    let embedder = MockEmbeddingProvider::new(384);

    let text = "I think the main issue is that we're not clearly defining our goals.";
    let readings = initial_readings(&catalog, &embedder, text, "tone").await;

    let provider = Arc::new(MockLlmProvider::with_responses(vec![
        "Here is the transformed text: The main issue is that we're not defining our goals."
            .to_string(),
        "\"I think the issue is that we're not clearly defining our goals.\"".to_string(),
    ]));

    let ctx = TransformationContext::new(text, "tone", "analytical", readings)
        .with_threshold(-1.0)
        .with_num_candidates(2)
        .with_max_retries(0);

    let scope = catalog.scope("tone", 384).unwrap();
    let strategy = Strategy::LlmGuided(LlmGuidedStrategy::new(provider));
    let result = strategy.transform(&scope, &ctx, &embedder).await.unwrap();

    assert!(result.success);
    assert_eq!(result.strategy, "llm");
    // O parse limpou prefixo meta e aspas
    assert!(!result.transformed_text.to_lowercase().contains("here is"));
    assert!(!result.transformed_text.starts_with('"'));
    assert!(result.rules_applied[0].starts_with("llm:"));
}

/// Provedor indisponível sobe como ProviderUnavailable, sem resultado
#[tokio::test]
async fn llm_unavailable_surfaces() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Catalog::load(&test_config(tmp.path().to_str().unwrap())).unwrap();
    let embedder = MockEmbeddingProvider::new(384);

    let text = "Some text to transform.";
    let readings = initial_readings(&catalog, &embedder, text, "tone").await;

    let provider = Arc::new(MockLlmProvider::failing_with(TrmError::ProviderUnavailable(
        "backend fora do ar".to_string(),
    )));

    let ctx = TransformationContext::new(text, "tone", "analytical", readings);
    let scope = catalog.scope("tone", 384).unwrap();
    let strategy = Strategy::LlmGuided(LlmGuidedStrategy::new(provider));

    let err = strategy.transform(&scope, &ctx, &embedder).await.unwrap_err();
    assert!(matches!(err, TrmError::ProviderUnavailable(_)));
}

/// Hybrid com regras vencedoras nunca toca o LLM; cost/latência agregados
#[tokio::test]
async fn hybrid_aggregates_and_tags() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = Catalog::load(&test_config(tmp.path().to_str().unwrap())).unwrap();
    let embedder = MockEmbeddingProvider::new(384);

    let text = "I think maybe the data shows something interesting.";
    let readings = initial_readings(&catalog, &embedder, text, "tetralemma").await;

    let llm_provider = Arc::new(MockLlmProvider::new());
    let strategy = Strategy::Hybrid {
        rules: RuleBasedStrategy::new(catalog.rules()),
        llm: LlmGuidedStrategy::new(llm_provider.clone()),
    };

    let ctx = TransformationContext::new(text, "tetralemma", "A", readings)
        .with_threshold(-1.0)
        .with_max_retries(0);

    let scope = catalog.scope("tetralemma", 384).unwrap();
    let result = strategy.transform(&scope, &ctx, &embedder).await.unwrap();

    assert!(result.success);
    assert_eq!(result.strategy, "hybrid:rules");
    assert_eq!(llm_provider.calls(), 0);
}

/// Determinismo fim-a-fim: mesma entrada, mesmo catálogo, mesmo mock →
/// resultados idênticos
#[tokio::test]
async fn deterministic_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path().to_str().unwrap());
    let embedder = MockEmbeddingProvider::new(384);

    let text = "I think the main issue is that we're not clearly defining our goals.";

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let catalog = Catalog::load(&config).unwrap();
        let readings = initial_readings(&catalog, &embedder, text, "tetralemma").await;
        let ctx = TransformationContext::new(text, "tetralemma", "A", readings)
            .with_threshold(-1.0)
            .with_max_retries(0);
        let scope = catalog.scope("tetralemma", 384).unwrap();
        let strategy = RuleBasedStrategy::new(catalog.rules());
        let result = run_gfs(&scope, &ctx, &embedder, &strategy).await.unwrap();
        outcomes.push((
            result.transformed_text.clone(),
            result.target_improvement,
            result.rho_distance,
        ));
    }

    assert_eq!(outcomes[0].0, outcomes[1].0);
    assert_eq!(outcomes[0].1, outcomes[1].1);
    assert_eq!(outcomes[0].2, outcomes[1].2);
}
