//! TRM Configuration - Centralized configuration management
//!
//! Todos os paths e parâmetros do núcleo TRM são gerenciados aqui.
//! Usa ~/trm-data/ por padrão, mas pode ser configurado via TRM_DATA_DIR.
//!
//! Ordem de precedência: variáveis de ambiente (namespace `TRM_`) sempre
//! ganham; um arquivo opcional `{data_dir}/config/trm.toml` pode sobrepor
//! os defaults restantes.

mod model;
pub use model::*;

use std::env;
use std::path::PathBuf;

/// Helper para ler variáveis de ambiente booleanas
fn bool_env(var: &str, default: bool) -> bool {
    env::var(var)
        .ok()
        .map(|v| v.to_lowercase().trim().to_string())
        .map(|v| matches!(v.as_str(), "1" | "true" | "t" | "yes" | "y"))
        .unwrap_or(default)
}

/// Modo offline: força adaptadores determinísticos (mock) no lugar de
/// backends de rede. Útil em testes e no deployment LOCAL sem serviços.
pub fn offline() -> bool {
    bool_env("TRM_OFFLINE", false)
}

/// Obtém o diretório base de dados do TRM
///
/// Ordem de prioridade:
/// 1. Variável de ambiente TRM_DATA_DIR
/// 2. ~/trm-data (padrão)
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var("TRM_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join("trm-data"))
        .unwrap_or_else(|| PathBuf::from("trm-data"))
}

/// Corpus de exemplares por eixo: `{corpus_dir}/{pack}/{axis}.json`
pub fn corpus_dir() -> PathBuf {
    data_dir().join("povm_corpus")
}

/// Operadores semânticos aprendidos: `{operators_dir}/{pack}/{axis}.bin`
pub fn operators_dir() -> PathBuf {
    data_dir().join("semantic_operators")
}

/// Regras léxicas extraídas de transformações bem-sucedidas
pub fn rules_path() -> PathBuf {
    data_dir()
        .join("transformation_rules")
        .join("extracted_rules.json")
}

/// Path para logs
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Garante que todos os diretórios necessários existem
pub fn ensure_dirs() -> std::io::Result<()> {
    let dirs = vec![
        corpus_dir(),
        operators_dir(),
        logs_dir(),
        data_dir().join("transformation_rules"),
        data_dir().join("config"),
    ];

    for dir in dirs {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(())
}

// ============================================================================
// ENDPOINTS EXTERNOS
// ============================================================================

/// URL do servidor Ollama (default: http://localhost:11434)
pub fn ollama_url() -> String {
    env::var("TRM_OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// URL do servidor de embeddings (OpenAI-style, default: http://localhost:8001/v1)
pub fn embedding_url() -> String {
    env::var("TRM_EMBEDDING_URL").unwrap_or_else(|_| "http://localhost:8001/v1".to_string())
}

/// API key da Anthropic (opcional)
pub fn anthropic_api_key() -> Option<String> {
    env::var("ANTHROPIC_API_KEY").ok()
}

// ============================================================================
// CONFIGURAÇÃO TIPADA - TrmConfig
// ============================================================================

/// Carrega configuração completa do TRM a partir de variáveis de ambiente
/// e opcionalmente de arquivo de configuração.
///
/// Ordem de prioridade:
/// 1. Variáveis de ambiente (sempre aplicadas)
/// 2. Arquivo `trm.toml` em `{data_dir}/config/` (se existir)
pub fn load() -> TrmConfig {
    let mut cfg = TrmConfig {
        profile: env::var("TRM_PROFILE")
            .unwrap_or_else(|_| "dev".to_string())
            .to_lowercase(),
        deployment: DeploymentMode::from_env(),
        core: CoreConfig {
            rank: parse_env("TRM_RANK", 64),
            shrinkage: parse_env("TRM_SHRINKAGE", 0.01),
            seed: parse_env("TRM_SEED", 42),
            default_packs: env::var("TRM_DEFAULT_PACKS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| CoreConfig::default().default_packs),
        },
        embedding: EmbeddingConfig {
            provider: env::var("TRM_EMBEDDING_PROVIDER").unwrap_or_else(|_| "http".to_string()),
            url: embedding_url(),
            model: env::var("TRM_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
            dim: parse_env("TRM_EMBEDDING_DIM", 384),
        },
        llm: LlmConfig {
            provider: env::var("TRM_LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            ollama_url: ollama_url(),
            ollama_model: env::var("TRM_OLLAMA_MODEL").unwrap_or_else(|_| "mistral:7b".to_string()),
            anthropic_api_key: anthropic_api_key(),
            anthropic_model: env::var("TRM_ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
        },
        storage: StorageConfig {
            data_dir: data_dir().to_string_lossy().to_string(),
        },
    };

    // Tenta carregar arquivo de configuração (opcional)
    let config_file = PathBuf::from(&cfg.storage.data_dir)
        .join("config")
        .join("trm.toml");

    if config_file.exists() {
        if let Ok(text) = std::fs::read_to_string(&config_file) {
            match toml::from_str::<TrmConfig>(&text) {
                Ok(file_cfg) => {
                    // Merge simples: arquivo sobrepõe defaults, env mantém precedência
                    cfg = merge_config(cfg, file_cfg);
                }
                Err(e) => {
                    tracing::warn!("trm.toml inválido, ignorando: {}", e);
                }
            }
        }
    }

    cfg
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Merge de configurações: env (em `base`) mantém precedência, o arquivo
/// sobrepõe apenas campos que o env não fixou explicitamente
fn merge_config(base: TrmConfig, override_cfg: TrmConfig) -> TrmConfig {
    let env_has = |key: &str| env::var(key).is_ok();

    TrmConfig {
        profile: if env_has("TRM_PROFILE") {
            base.profile
        } else {
            override_cfg.profile
        },
        deployment: if env_has("TRM_DEPLOYMENT_MODE") {
            base.deployment
        } else {
            override_cfg.deployment
        },
        core: CoreConfig {
            rank: if env_has("TRM_RANK") {
                base.core.rank
            } else {
                override_cfg.core.rank
            },
            shrinkage: if env_has("TRM_SHRINKAGE") {
                base.core.shrinkage
            } else {
                override_cfg.core.shrinkage
            },
            seed: if env_has("TRM_SEED") {
                base.core.seed
            } else {
                override_cfg.core.seed
            },
            default_packs: if env_has("TRM_DEFAULT_PACKS") {
                base.core.default_packs
            } else {
                override_cfg.core.default_packs
            },
        },
        embedding: if env_has("TRM_EMBEDDING_PROVIDER") || env_has("TRM_EMBEDDING_URL") {
            base.embedding
        } else {
            override_cfg.embedding
        },
        llm: if env_has("TRM_LLM_PROVIDER") {
            base.llm
        } else {
            override_cfg.llm
        },
        storage: base.storage,
    }
}
