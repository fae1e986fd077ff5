//! trm-core – Núcleo numérico do TRM
//!
//! Implementa o formalismo de medição do sistema:
//! • Density: matrizes de densidade ρ (PSD, Tr(ρ)=1) via eigendecomposição
//! • POVM: famílias de operadores {Eᵢ} com Σ Eᵢ = I e regra de Born
//! • Verification: o texto transformado moveu na direção pretendida?
//! • Learning: operadores semânticos aprendidos de corpus, com persistência
//!
//! A interpretação é subjetiva (estados de leitura de um texto), mas a
//! matemática é rigorosa. Tudo aqui é síncrono e puro: adaptadores de
//! embedding/LLM ficam fora deste crate.

pub mod density;
pub mod learning;
pub mod povm;
pub mod semantic;
pub mod verification;

pub use density::{
    construct_density_matrix, principal_directions, random_projection, rho_distance,
    DensityMatrix, PrincipalDirection,
};
pub use learning::{
    cohens_d, learn_pack_from_embeddings, load_axis_examples, load_pack_corpus, validate_pack,
    OperatorValidation, Recommendation, ValidationReport,
};
pub use povm::{
    audience_pack, builtin_packs, create_random_pack, ontology_pack, pragmatics_pack,
    tetralemma_pack, tone_pack, PovmOperator, PovmPack,
};
pub use semantic::{load_all_packs, load_pack, save_pack, SemanticOperator, SemanticPack};
pub use verification::{diagnose_failure, verify_transformation, FailureKind, VerificationResult};
