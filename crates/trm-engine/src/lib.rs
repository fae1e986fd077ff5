//! trm-engine – Motor de busca de candidatos do TRM
//!
//! Implementa as estratégias de transformação sobre o núcleo numérico:
//! • Rules: padrões léxicos ranqueados por confiança
//! • LlmGuided: geração externa com prompt de mudança mínima
//! • Hybrid: regras primeiro, LLM como fallback
//!
//! Todas compartilham o protocolo GFS (Generate-Filter-Select): gerar N
//! candidatos, filtrar por verificação, selecionar o melhor, com retry e
//! backoff. O loop nunca fabrica sucesso: sem candidato acima do
//! threshold, devolve o texto original com `success=false`.

pub mod context;
pub mod gfs;
pub mod llm_guided;
pub mod registry;
pub mod rules;
pub mod strategy;
pub mod transformer;

pub use context::{
    text_change_ratio, CandidateSource, MeasurementScope, TransformationCandidate,
    TransformationContext, TransformationResult,
};
pub use gfs::{run_gfs, CandidateGenerator};
pub use llm_guided::{axis_meaning, parse_llm_response, LlmGuidedStrategy};
pub use registry::Catalog;
pub use rules::{Confidence, Rule, RuleBasedStrategy, RuleKind, RuleSet};
pub use strategy::Strategy;
pub use transformer::{readings_trajectory, IterativeTransformer, TransformOutcome, TransformStep};
