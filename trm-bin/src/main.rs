//! TRM CLI - superfície de linha de comando do núcleo de transformação
//!
//! Rode com: cargo run --release --bin trm -- <comando>
//!
//! Exit codes: 0 sucesso; 2 argumentos/entrada inválidos; 3 adaptador
//! indisponível; 4 falha numérica em ρ ou POVM; 5 nenhum candidato
//! sobreviveu ao GFS.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use trm_common::{error::EXIT_NO_CANDIDATE, exit_code, TrmError};
use trm_config::{DeploymentMode, TrmConfig};
use trm_core::{
    learn_pack_from_embeddings, random_projection, save_pack, validate_pack, load_pack_corpus,
};
use trm_engine::{
    Catalog, LlmGuidedStrategy, RuleBasedStrategy, Strategy, TransformationContext,
};
use trm_llm::{
    AnthropicProvider, EmbeddingProvider, HttpEmbeddingClient, LlmProvider, MockEmbeddingProvider,
    MockLlmProvider, OllamaProvider,
};

#[derive(Parser)]
#[command(name = "trm", about = "TRM: transformação de texto por medição recursiva")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mede um texto contra um pack POVM e imprime as leituras
    Measure {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "tetralemma")]
        pack: String,
    },
    /// Transforma um texto em direção a um eixo alvo
    Transform {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "tetralemma")]
        pack: String,
        #[arg(long)]
        axis: String,
        /// rules | llm | hybrid
        #[arg(long, default_value = "hybrid")]
        strategy: String,
        #[arg(long, default_value_t = 0.05)]
        threshold: f64,
        #[arg(long, default_value_t = 0.4)]
        max_change: f64,
    },
    /// Aprende operadores semânticos do corpus e persiste no cache
    Learn {
        #[arg(long)]
        pack: String,
        /// Tag do archive de origem do corpus
        #[arg(long, default_value = "local")]
        archive: String,
    },
    /// Lista os packs disponíveis no catálogo
    Packs,
}

fn build_embedder(config: &TrmConfig) -> Arc<dyn EmbeddingProvider> {
    if trm_config::offline() || config.embedding.provider == "mock" {
        return Arc::new(MockEmbeddingProvider::new(config.embedding.dim));
    }
    Arc::new(HttpEmbeddingClient::new(
        config.embedding.url.clone(),
        config.embedding.model.clone(),
        config.embedding.dim,
    ))
}

fn build_llm(config: &TrmConfig) -> Result<Arc<dyn LlmProvider>, TrmError> {
    if trm_config::offline() || config.llm.provider == "mock" {
        return Ok(Arc::new(MockLlmProvider::new()));
    }

    match (config.llm.provider.as_str(), config.deployment) {
        ("anthropic", _) | (_, DeploymentMode::Api) => {
            let key = config.llm.anthropic_api_key.clone().unwrap_or_default();
            Ok(Arc::new(AnthropicProvider::new(
                key,
                config.llm.anthropic_model.clone(),
            )?))
        }
        _ => Ok(Arc::new(OllamaProvider::new(
            config.llm.ollama_url.clone(),
            config.llm.ollama_model.clone(),
        ))),
    }
}

fn build_strategy(
    name: &str,
    catalog: &Catalog,
    config: &TrmConfig,
) -> Result<Strategy, TrmError> {
    let llm_strategy = || -> Result<LlmGuidedStrategy, TrmError> {
        Ok(LlmGuidedStrategy::new(build_llm(config)?)
            .with_corpus_dir(config.corpus_dir()))
    };

    match name {
        "rules" => Ok(Strategy::RuleBased(RuleBasedStrategy::new(catalog.rules()))),
        "llm" => Ok(Strategy::LlmGuided(llm_strategy()?)),
        "hybrid" => Ok(Strategy::Hybrid {
            rules: RuleBasedStrategy::new(catalog.rules()),
            llm: llm_strategy()?,
        }),
        other => Err(TrmError::InvalidInput(format!(
            "estratégia desconhecida '{other}'; use rules, llm ou hybrid"
        ))),
    }
}

async fn run(cli: Cli) -> Result<i32, TrmError> {
    let config = trm_config::load();
    let catalog = Catalog::load(&config)?;
    let embedder = build_embedder(&config);

    match cli.command {
        Command::Measure { text, pack } => {
            let scope = catalog.scope(&pack, embedder.dim())?;
            let embedding = embedder.embed(&text).await?;
            let readings = scope.readings(&embedding)?;

            println!("{}", serde_json::to_string_pretty(&readings).expect("readings são serializáveis"));
            Ok(0)
        }

        Command::Transform {
            text,
            pack,
            axis,
            strategy,
            threshold,
            max_change,
        } => {
            let scope = catalog.scope(&pack, embedder.dim())?;
            let embedding = embedder.embed(&text).await?;
            let readings = scope.readings(&embedding)?;

            let ctx = TransformationContext::new(text, pack, axis, readings)
                .with_threshold(threshold)
                .with_max_change_ratio(max_change);

            let strategy = build_strategy(&strategy, &catalog, &config)?;
            let result = strategy.transform(&scope, &ctx, embedder.as_ref()).await?;

            println!("{}", serde_json::to_string_pretty(&result).expect("resultado é serializável"));
            Ok(if result.success { 0 } else { EXIT_NO_CANDIDATE })
        }

        Command::Learn { pack, archive } => {
            let corpus = load_pack_corpus(&config.corpus_dir(), &pack)?;
            info!(
                "corpus de '{}': {} eixos",
                pack,
                corpus.len()
            );

            // Resolve todos os embeddings antes do estágio numérico
            let mut train: BTreeMap<String, Vec<Vec<f64>>> = BTreeMap::new();
            let mut holdout: BTreeMap<String, Vec<Vec<f64>>> = BTreeMap::new();
            for (axis, texts) in &corpus {
                let mut embeddings = Vec::with_capacity(texts.len());
                for text in texts {
                    embeddings.push(embedder.embed(text).await?);
                }

                // Split 80/20 para validação quando há exemplares de sobra
                let split = if embeddings.len() >= 5 {
                    embeddings.len() * 4 / 5
                } else {
                    embeddings.len()
                };
                let held: Vec<Vec<f64>> = embeddings.split_off(split);
                train.insert(axis.clone(), embeddings);
                if !held.is_empty() {
                    holdout.insert(axis.clone(), held);
                }
            }

            let projection = random_projection(embedder.dim(), config.core.rank, config.core.seed);
            let learned = learn_pack_from_embeddings(&pack, &train, projection, &archive)?;

            if holdout.len() == corpus.len() {
                let report = validate_pack(&learned, &holdout, config.core.shrinkage)?;
                println!("{}", serde_json::to_string_pretty(&report).expect("report é serializável"));
            }

            save_pack(&learned, &config.operators_dir())?;
            info!(
                "pack '{}' salvo em {}",
                pack,
                config.operators_dir().display()
            );
            Ok(0)
        }

        Command::Packs => {
            for name in catalog.pack_names() {
                println!("{name}");
            }
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("erro: {e}");
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}
