//! Modelo tipado de configuração do TRM
//!
//! Estruturas centralizadas para as configurações do núcleo,
//! substituindo acesso direto a variáveis de ambiente espalhadas.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Modo de deployment do núcleo TRM
///
/// Governa a seleção default de adaptadores: LOCAL prefere Ollama e
/// embeddings locais; API prefere provedores de nuvem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Local,
    Web,
    Api,
}

impl DeploymentMode {
    pub fn from_env() -> Self {
        match std::env::var("TRM_DEPLOYMENT_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "api" => DeploymentMode::Api,
            "web" => DeploymentMode::Web,
            _ => DeploymentMode::Local,
        }
    }
}

impl Default for DeploymentMode {
    fn default() -> Self {
        DeploymentMode::Local
    }
}

/// Parâmetros do núcleo numérico
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Rank das matrizes de densidade (default: 64)
    #[serde(default = "default_rank")]
    pub rank: usize,
    /// Regularização ridge para PSD estrita (default: 0.01)
    #[serde(default = "default_shrinkage")]
    pub shrinkage: f64,
    /// Seed para construção aleatória de projeções e POVMs (default: 42)
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Packs POVM instanciados no startup
    #[serde(default = "default_packs")]
    pub default_packs: Vec<String>,
}

fn default_rank() -> usize {
    64
}

fn default_shrinkage() -> f64 {
    0.01
}

fn default_seed() -> u64 {
    42
}

fn default_packs() -> Vec<String> {
    vec![
        "tetralemma".to_string(),
        "tone".to_string(),
        "ontology".to_string(),
        "pragmatics".to_string(),
        "audience".to_string(),
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rank: default_rank(),
            shrinkage: default_shrinkage(),
            seed: default_seed(),
            default_packs: default_packs(),
        }
    }
}

/// Seleção do adaptador de embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "http" (servidor OpenAI-style) ou "mock" (determinístico, offline)
    pub provider: String,
    pub url: String,
    pub model: String,
    /// Dimensão declarada pelo adaptador (default: 384)
    #[serde(default = "default_dim")]
    pub dim: usize,
}

fn default_dim() -> usize {
    384
}

/// Seleção do adaptador LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama", "anthropic" ou "mock"
    pub provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
}

/// Configuração de armazenamento
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl StorageConfig {
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

/// Configuração completa do núcleo TRM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrmConfig {
    pub profile: String, // "dev" | "lab" | "prod"
    #[serde(default)]
    pub deployment: DeploymentMode,
    #[serde(default)]
    pub core: CoreConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

impl TrmConfig {
    /// Path do rule set do motor de regras
    pub fn rules_path(&self) -> PathBuf {
        self.storage
            .data_dir_path()
            .join("transformation_rules")
            .join("extracted_rules.json")
    }

    /// Diretório do cache de operadores aprendidos
    pub fn operators_dir(&self) -> PathBuf {
        self.storage.data_dir_path().join("semantic_operators")
    }

    /// Diretório do corpus por pack/eixo
    pub fn corpus_dir(&self) -> PathBuf {
        self.storage.data_dir_path().join("povm_corpus")
    }

    /// Verifica se há backend LLM de rede configurado
    pub fn has_llm_backend(&self) -> bool {
        self.llm.provider == "ollama" || self.llm.anthropic_api_key.is_some()
    }
}
