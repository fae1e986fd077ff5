//! Loop de verificação - a transformação moveu na direção pretendida?
//!
//! Fecha o loop do modelo de dois espaços: o espaço de estados (ρ, POVMs)
//! navega INTENÇÕES, o espaço lexical aplica TRANSFORMAÇÕES, e a
//! verificação mede se o movimento foi em direção ao eixo alvo.
//!
//! Crítico: ρ_before e ρ_after são construídos com a MESMA matriz de
//! projeção. Uma projeção fresca invalidaria a comparação, então ela é
//! um parâmetro explícito e nunca é gerada aqui dentro.

use nalgebra::DMatrix;
use serde::Serialize;
use std::collections::BTreeMap;

use trm_common::{Readings, Result, TrmError};

use crate::density::{construct_density_matrix, rho_distance};
use crate::povm::PovmPack;

/// Resultado da verificação de uma transformação
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    /// target_achieved && alignment > 0
    pub success: bool,
    /// +1.0 maior delta positivo no eixo alvo; +0.5 delta positivo mas
    /// não o maior; 0.0 sem movimento; −1.0 eixo alvo caiu
    pub alignment: f64,
    /// ‖embedding_after − embedding_before‖
    pub magnitude: f64,
    pub readings_before: Readings,
    pub readings_after: Readings,
    /// Delta por eixo (after − before)
    pub delta: BTreeMap<String, f64>,
    /// delta[eixo alvo] ≥ threshold?
    pub target_achieved: bool,
    /// Distância de traço D(ρ_before, ρ_after) ∈ [0, 1]
    pub rho_distance: f64,
}

/// Verifica se uma transformação moveu o texto na direção pretendida.
///
/// Processo:
/// 1. Constrói ρ_before e ρ_after sob a projeção compartilhada
/// 2. Mede ambos com o pack
/// 3. Delta por eixo, melhora no alvo, magnitude do movimento
/// 4. Score de alinhamento e distância de traço
pub fn verify_transformation(
    embedding_before: &[f64],
    embedding_after: &[f64],
    pack: &PovmPack,
    target_axis: &str,
    target_threshold: f64,
    projection: &DMatrix<f64>,
    shrinkage: f64,
) -> Result<VerificationResult> {
    if embedding_before.len() != embedding_after.len() {
        return Err(TrmError::InvalidInput(format!(
            "dimensões incompatíveis: {} vs {}",
            embedding_before.len(),
            embedding_after.len()
        )));
    }
    if !pack.has_axis(target_axis) {
        return Err(TrmError::InvalidInput(format!(
            "eixo desconhecido '{target_axis}' no pack '{}'; disponíveis: {:?}",
            pack.name,
            pack.axes()
        )));
    }

    let rho_before =
        construct_density_matrix(embedding_before, pack.rank, shrinkage, Some(projection))?;
    let rho_after =
        construct_density_matrix(embedding_after, pack.rank, shrinkage, Some(projection))?;

    let readings_before = pack.measure(&rho_before)?;
    let readings_after = pack.measure(&rho_after)?;

    let delta: BTreeMap<String, f64> = readings_after
        .delta(&readings_before)
        .into_iter()
        .collect();

    let target_improvement = delta[target_axis];
    let target_achieved = target_improvement >= target_threshold;

    // Magnitude do movimento no espaço de embeddings
    let magnitude = embedding_before
        .iter()
        .zip(embedding_after.iter())
        .map(|(b, a)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();

    // Alinhamento: o alvo deveria ter a maior melhora
    let alignment = if magnitude <= 1e-6 {
        0.0
    } else {
        let max_delta = delta
            .values()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        if target_improvement > 0.0 && target_improvement >= max_delta {
            1.0
        } else if target_improvement > 0.0 {
            0.5
        } else {
            -1.0
        }
    };

    let distance = rho_distance(&rho_before, &rho_after)?;
    let success = target_achieved && alignment > 0.0;

    Ok(VerificationResult {
        success,
        alignment,
        magnitude,
        readings_before,
        readings_after,
        delta,
        target_achieved,
        rho_distance: distance,
    })
}

/// Modo de falha identificado pela diagnose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NoMovement,
    WrongDirection,
    InsufficientImprovement,
    Unknown,
}

/// Diagnóstico de uma verificação que falhou, com dica de remediação
#[derive(Debug, Clone, Serialize)]
pub struct FailureDiagnosis {
    pub kind: FailureKind,
    pub hint: String,
}

/// Diagnostica por que uma transformação falhou.
///
/// Retorna `None` para resultados bem-sucedidos.
pub fn diagnose_failure(verification: &VerificationResult) -> Option<FailureDiagnosis> {
    if verification.success {
        return None;
    }

    let diagnosis = if verification.magnitude < 1e-4 {
        FailureDiagnosis {
            kind: FailureKind::NoMovement,
            hint: "a transformação não mudou o texto de forma mensurável; revise a lógica lexical"
                .to_string(),
        }
    } else if verification.alignment < 0.0 {
        FailureDiagnosis {
            kind: FailureKind::WrongDirection,
            hint: "o eixo alvo diminuiu; inverta a transformação ou ajuste o alvo".to_string(),
        }
    } else if !verification.target_achieved {
        FailureDiagnosis {
            kind: FailureKind::InsufficientImprovement,
            hint: "melhora abaixo do threshold; tente uma transformação mais agressiva".to_string(),
        }
    } else {
        FailureDiagnosis {
            kind: FailureKind::Unknown,
            hint: "modo de falha desconhecido; verifique a calibração dos POVMs".to_string(),
        }
    };

    Some(diagnosis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::random_projection;
    use crate::povm::tone_pack;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn unit_vec(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let v: Vec<f64> = (0..384).map(|_| StandardNormal.sample(&mut rng)).collect();
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_verify_basic() {
        let before = unit_vec(42);
        let perturb = unit_vec(7);
        let after: Vec<f64> = before
            .iter()
            .zip(perturb.iter())
            .map(|(b, p)| b + 0.1 * p)
            .collect();

        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let result =
            verify_transformation(&before, &after, &pack, "analytical", 0.05, &proj, 0.01)
                .unwrap();

        assert!((-1.0..=1.0).contains(&result.alignment));
        assert!(result.magnitude > 0.0);
        assert!((0.0..=1.0).contains(&result.rho_distance));
        assert_eq!(result.delta.len(), 5);
    }

    #[test]
    fn test_verify_identity() {
        // verify(x, x): magnitude 0, distância 0, deltas 0, sem sucesso
        let x = unit_vec(42);
        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let result =
            verify_transformation(&x, &x, &pack, "analytical", 0.05, &proj, 0.01).unwrap();

        assert!(result.magnitude < 1e-12);
        assert!(result.rho_distance < 1e-9);
        assert!(result.delta.values().all(|&d| d.abs() < 1e-12));
        assert_eq!(result.alignment, 0.0);
        assert!(!result.target_achieved);
        assert!(!result.success);
        assert_eq!(result.readings_before, result.readings_after);
    }

    #[test]
    fn test_unknown_axis_rejected() {
        let x = unit_vec(42);
        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let err = verify_transformation(&x, &x, &pack, "nonexistent", 0.05, &proj, 0.01)
            .unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let x = unit_vec(42);
        let y = vec![0.5; 128];
        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let err =
            verify_transformation(&x, &y, &pack, "analytical", 0.05, &proj, 0.01).unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[test]
    fn test_diagnose_no_movement() {
        let x = unit_vec(42);
        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let result =
            verify_transformation(&x, &x, &pack, "analytical", 0.05, &proj, 0.01).unwrap();
        let diagnosis = diagnose_failure(&result).unwrap();
        assert_eq!(diagnosis.kind, FailureKind::NoMovement);
        assert!(!diagnosis.hint.is_empty());
    }

    #[test]
    fn test_serializable() {
        let x = unit_vec(42);
        let pack = tone_pack(64, 42).unwrap();
        let proj = random_projection(384, 64, 42);

        let result =
            verify_transformation(&x, &x, &pack, "analytical", 0.05, &proj, 0.01).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("success").is_some());
        assert!(json.get("readings_before").is_some());
        assert!(json.get("rho_distance").is_some());
    }
}
