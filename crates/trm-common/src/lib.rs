//! Tipos e erros compartilhados entre os crates do TRM
//!
//! O TRM (Transformation-via-Recursive-Measurement) move um texto em
//! direção a uma "postura semântica" alvo medindo matrizes de densidade
//! contra operadores POVM. Este crate define a taxonomia de erros e os
//! tipos de valor que circulam entre o núcleo numérico, os adaptadores
//! e o motor de busca.

pub mod error;
pub mod types;

pub use error::{TrmError, exit_code};
pub use types::{Readings, StanceTarget, TargetStance};

/// Alias canônico para resultados do TRM.
pub type Result<T> = std::result::Result<T, TrmError>;
