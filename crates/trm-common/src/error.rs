//! Taxonomia de erros do TRM
//!
//! Os kinds seguem a separação do sistema: falhas numéricas indicam bug
//! de programação e sobem imediatamente; falhas de provedor carregam uma
//! dica de remediação de uma linha; "nenhum candidato" NÃO é erro — o
//! loop GFS devolve um `TransformationResult` com `success=false`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrmError {
    /// Texto vazio, dimensão incompatível, pack ou eixo desconhecido
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invariante PSD/traço violada após tentativa de reparo, ou
    /// eigendecomposição que não convergiu
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// Σ Eᵢ ≠ I mesmo depois do rescale
    #[error("POVM construction failed: {0}")]
    PovmConstruction(String),

    /// Backend de embedding ou LLM inalcançável
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limit ou falha transitória de parse — o caller pode tentar de novo
    #[error("generation retryable: {0}")]
    GenerationRetryable(String),

    /// Qualquer outra falha na geração de texto
    #[error("generation failed: {0}")]
    Generation(String),

    /// Diretório de corpus malformado ou arquivo de operador truncado
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrmError {
    /// Erros retryable são tratados internamente antes de subir
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrmError::GenerationRetryable(_))
    }
}

/// Mapeia um erro para o exit code de qualquer superfície CLI.
///
/// Convenção: 0 sucesso, 2 argumentos inválidos, 3 adaptador
/// indisponível, 4 falha numérica na construção de ρ ou POVM,
/// 5 nenhum candidato sobreviveu ao GFS (reportado pelo caller,
/// não por esta função).
pub fn exit_code(err: &TrmError) -> i32 {
    match err {
        TrmError::InvalidInput(_) => 2,
        TrmError::ProviderUnavailable(_) => 3,
        TrmError::NumericalFailure(_) | TrmError::PovmConstruction(_) => 4,
        TrmError::GenerationRetryable(_)
        | TrmError::Generation(_)
        | TrmError::Config(_)
        | TrmError::Io(_) => 1,
    }
}

/// Exit code para o caso "nenhum candidato sobreviveu ao GFS"
pub const EXIT_NO_CANDIDATE: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&TrmError::InvalidInput("x".into())), 2);
        assert_eq!(exit_code(&TrmError::ProviderUnavailable("x".into())), 3);
        assert_eq!(exit_code(&TrmError::NumericalFailure("x".into())), 4);
        assert_eq!(exit_code(&TrmError::PovmConstruction("x".into())), 4);
        assert_eq!(EXIT_NO_CANDIDATE, 5);
    }

    #[test]
    fn test_retryable() {
        assert!(TrmError::GenerationRetryable("rate limit".into()).is_retryable());
        assert!(!TrmError::Generation("boom".into()).is_retryable());
    }
}
