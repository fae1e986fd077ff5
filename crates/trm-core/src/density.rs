//! Construção de matrizes de densidade (ρ via eigendecomposição)
//!
//! ρ é uma matriz real simétrica positiva semi-definida com Tr(ρ) = 1,
//! decomposta como ρ = Σ λᵢ |ψᵢ⟩⟨ψᵢ|. O embedding é projetado para um
//! subespaço de dimensão `rank`, vira um produto externo regularizado e
//! é renormalizado pelo traço.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::Serialize;
use tracing::debug;

use trm_common::{Result, TrmError};

/// Tolerância de simetria: acima disso ρ é simetrizada por ½(ρ + ρᵀ)
const SYMMETRY_TOL: f64 = 1e-8;

/// Matriz de densidade com sua eigendecomposição.
///
/// Invariantes (verificadas na construção):
/// - todos os autovalores ≥ 0 (clampados contra ruído de float)
/// - |Tr(ρ) − 1| ≤ 1e-6
/// - ρ = ρᵀ dentro de 1e-8
///
/// Imutável depois de construída.
#[derive(Debug, Clone)]
pub struct DensityMatrix {
    /// A matriz completa (rank × rank)
    pub rho: DMatrix<f64>,
    /// Autovalores λᵢ em ordem decrescente, normalizados pelo traço
    pub eigenvalues: DVector<f64>,
    /// Autovetores |ψᵢ⟩ como colunas, na mesma ordem dos autovalores
    pub eigenvectors: DMatrix<f64>,
    pub rank: usize,
}

impl DensityMatrix {
    /// Pureza Tr(ρ²) ∈ [1/rank, 1]. 1 = estado puro, 1/rank = máxima mistura.
    pub fn purity(&self) -> f64 {
        (&self.rho * &self.rho).trace()
    }

    /// Entropia de von Neumann S(ρ) = −Σ λᵢ ln λᵢ
    pub fn entropy(&self) -> f64 {
        -self
            .eigenvalues
            .iter()
            .filter(|&&l| l > 1e-10)
            .map(|&l| l * l.ln())
            .sum::<f64>()
    }

    /// Forma serializada: eigensistema truncado, não a matriz inteira
    pub fn summary(&self) -> DensitySummary {
        let k = 5.min(self.rank);
        let top_eigenvectors = (0..k)
            .map(|j| self.eigenvectors.column(j).iter().copied().collect())
            .collect();

        DensitySummary {
            eigenvalues: self.eigenvalues.iter().copied().collect(),
            top_eigenvectors,
            rank: self.rank,
            purity: self.purity(),
            entropy: self.entropy(),
        }
    }
}

/// Forma persistível de um ρ: autovalores + top-k autovetores + escalares
#[derive(Debug, Clone, Serialize)]
pub struct DensitySummary {
    pub eigenvalues: Vec<f64>,
    pub top_eigenvectors: Vec<Vec<f64>>,
    pub rank: usize,
    pub purity: f64,
    pub entropy: f64,
}

/// Projeção aleatória gaussiana d × rank com colunas unitárias.
///
/// Determinística dado o seed. Um sistema em produção pode injetar uma
/// base PCA aprendida no lugar; o builder trata a projeção como opaca.
pub fn random_projection(dim: usize, rank: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut p = DMatrix::from_fn(dim, rank, |_, _| StandardNormal.sample(&mut rng));

    for j in 0..rank {
        let norm = p.column(j).norm();
        if norm > 0.0 {
            let col = p.column(j) / norm;
            p.set_column(j, &col);
        }
    }

    p
}

/// Constrói ρ a partir de um embedding.
///
/// Processo:
/// 1. Normaliza o embedding (entrada vazia/nula → `InvalidInput`)
/// 2. Projeta para o subespaço de dimensão `rank` (colapso no kernel da
///    projeção → `NumericalFailure`)
/// 3. Produto externo S = v·vᵀ + shrinkage·I
/// 4. Eigendecomposição simétrica, clamp de autovalores negativos,
///    ordenação decrescente
/// 5. Reconstrução e renormalização pelo traço
pub fn construct_density_matrix(
    embedding: &[f64],
    rank: usize,
    shrinkage: f64,
    projection: Option<&DMatrix<f64>>,
) -> Result<DensityMatrix> {
    if embedding.is_empty() {
        return Err(TrmError::InvalidInput("embedding vazio".to_string()));
    }
    if rank == 0 {
        return Err(TrmError::InvalidInput("rank deve ser ≥ 1".to_string()));
    }

    let d = embedding.len();
    let mut e = DVector::from_column_slice(embedding);
    let e_norm = e.norm();
    if e_norm <= 1e-10 {
        return Err(TrmError::InvalidInput(
            "embedding com norma zero".to_string(),
        ));
    }
    e.unscale_mut(e_norm);

    // Projeção fornecida ou sintetizada na hora (seed efêmero)
    let synthesized;
    let p = match projection {
        Some(p) => {
            if p.nrows() != d || p.ncols() != rank {
                return Err(TrmError::InvalidInput(format!(
                    "projeção deve ser {d}×{rank}, recebida {}×{}",
                    p.nrows(),
                    p.ncols()
                )));
            }
            p
        }
        None => {
            synthesized = random_projection(d, rank, rand::random::<u64>());
            &synthesized
        }
    };

    // v = Pᵀ·e, renormalizado
    let mut v = p.transpose() * &e;
    let v_norm = v.norm();
    if v_norm <= 1e-10 {
        return Err(TrmError::NumericalFailure(
            "embedding colapsou no kernel da projeção".to_string(),
        ));
    }
    v.unscale_mut(v_norm);

    // S = v·vᵀ (rank-1, PSD) + shrinkage para PSD estrita
    let mut s = &v * v.transpose();
    for i in 0..rank {
        s[(i, i)] += shrinkage;
    }

    let eigen = nalgebra::SymmetricEigen::new(s);

    // Ordena decrescente e clampa ruído negativo
    let mut order: Vec<usize> = (0..rank).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut eigenvalues = DVector::from_fn(rank, |i, _| eigen.eigenvalues[order[i]].max(0.0));
    let eigenvectors = DMatrix::from_fn(rank, rank, |i, j| eigen.eigenvectors[(i, order[j])]);

    // ρ = Q·diag(λ)·Qᵀ
    let lambda = DMatrix::from_diagonal(&eigenvalues);
    let mut rho = &eigenvectors * lambda * eigenvectors.transpose();

    // Simetriza se o drift de float passou da tolerância
    let drift = (&rho - rho.transpose()).amax();
    if drift > SYMMETRY_TOL {
        debug!("simetrizando ρ (drift {:.2e})", drift);
        rho = (&rho + rho.transpose()).scale(0.5);
    }

    let trace = rho.trace();
    if trace <= 1e-10 {
        return Err(TrmError::NumericalFailure(
            "traço de ρ é zero, impossível normalizar".to_string(),
        ));
    }
    rho.unscale_mut(trace);
    eigenvalues.unscale_mut(trace);

    Ok(DensityMatrix {
        rho,
        eigenvalues,
        eigenvectors,
        rank,
    })
}

/// Distância de traço D(ρ₁, ρ₂) = ½·Σ|λᵢ(ρ₁ − ρ₂)|, em [0, 1].
///
/// 0 = estados idênticos, 1 = perfeitamente distinguíveis.
pub fn rho_distance(rho1: &DensityMatrix, rho2: &DensityMatrix) -> Result<f64> {
    if rho1.rank != rho2.rank {
        return Err(TrmError::InvalidInput(format!(
            "ranks incompatíveis: {} vs {}",
            rho1.rank, rho2.rank
        )));
    }

    let diff = &rho1.rho - &rho2.rho;
    let eigen = nalgebra::SymmetricEigen::new(diff);
    let distance = 0.5 * eigen.eigenvalues.iter().map(|l| l.abs()).sum::<f64>();

    Ok(distance.clamp(0.0, 1.0))
}

/// Uma direção principal de mudança entre dois estados
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalDirection {
    pub magnitude: f64,
    pub direction: Vec<f64>,
    /// Fração |λᵢ| / Σⱼ|λⱼ| da mudança total explicada por esta direção
    pub explained_variance: f64,
}

/// Top-k direções de mudança entre ρ₁ e ρ₂ (eigendecomposição de ρ₂ − ρ₁,
/// ordenada por |λ|). Responde: "quais direções semânticas mais mudaram?"
pub fn principal_directions(
    rho1: &DensityMatrix,
    rho2: &DensityMatrix,
    k: usize,
) -> Result<Vec<PrincipalDirection>> {
    if rho1.rank != rho2.rank {
        return Err(TrmError::InvalidInput(format!(
            "ranks incompatíveis: {} vs {}",
            rho1.rank, rho2.rank
        )));
    }

    let delta = &rho2.rho - &rho1.rho;
    let eigen = nalgebra::SymmetricEigen::new(delta);

    let rank = rho1.rank;
    let mut order: Vec<usize> = (0..rank).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .abs()
            .partial_cmp(&eigen.eigenvalues[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total_change: f64 = eigen.eigenvalues.iter().map(|l| l.abs()).sum();

    Ok(order
        .into_iter()
        .take(k)
        .map(|idx| PrincipalDirection {
            magnitude: eigen.eigenvalues[idx],
            direction: eigen.eigenvectors.column(idx).iter().copied().collect(),
            explained_variance: eigen.eigenvalues[idx].abs() / (total_change + 1e-10),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embedding sintético determinístico de 384 dimensões
    fn test_embedding(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let v: Vec<f64> = (0..384).map(|_| StandardNormal.sample(&mut rng)).collect();
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_construct_density_matrix() {
        let embedding = test_embedding(42);
        let proj = random_projection(384, 64, 42);
        let rho = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();

        assert_eq!(rho.rho.shape(), (64, 64));
        assert_eq!(rho.eigenvalues.len(), 64);

        // PSD: todos os autovalores não-negativos
        assert!(rho.eigenvalues.iter().all(|&l| l >= -1e-10));

        // Normalização do traço
        assert!((rho.rho.trace() - 1.0).abs() < 1e-6);

        // Simetria
        assert!((&rho.rho - rho.rho.transpose()).amax() < 1e-8);
    }

    #[test]
    fn test_purity_bounds() {
        let embedding = test_embedding(42);
        let proj = random_projection(384, 64, 42);
        let rho = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();

        assert!(rho.purity() > 0.0);
        assert!(rho.purity() <= 1.0 + 1e-12);
        assert!(rho.purity() >= 1.0 / 64.0);
    }

    #[test]
    fn test_entropy_non_negative() {
        let embedding = test_embedding(42);
        let proj = random_projection(384, 64, 42);
        let rho = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();
        assert!(rho.entropy() >= 0.0);
    }

    #[test]
    fn test_empty_embedding_rejected() {
        let err = construct_density_matrix(&[], 64, 0.01, None).unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[test]
    fn test_zero_embedding_rejected() {
        let err = construct_density_matrix(&[0.0; 384], 64, 0.01, None).unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[test]
    fn test_projection_dimension_mismatch() {
        let embedding = test_embedding(42);
        let proj = random_projection(128, 64, 42);
        let err = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap_err();
        assert!(matches!(err, TrmError::InvalidInput(_)));
    }

    #[test]
    fn test_reproducible_given_projection() {
        let embedding = test_embedding(42);
        let proj = random_projection(384, 64, 42);
        let a = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();
        let b = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();
        // Bitwise idêntico: mesma entrada, mesma projeção
        assert_eq!(a.rho, b.rho);
        assert_eq!(a.eigenvalues, b.eigenvalues);
    }

    #[test]
    fn test_rho_distance_bounds() {
        let proj = random_projection(384, 64, 42);
        let e1 = test_embedding(42);
        let e2 = test_embedding(7);

        let rho1 = construct_density_matrix(&e1, 64, 0.01, Some(&proj)).unwrap();
        let rho2 = construct_density_matrix(&e2, 64, 0.01, Some(&proj)).unwrap();

        let d = rho_distance(&rho1, &rho2).unwrap();
        assert!((0.0..=1.0).contains(&d));

        let d_self = rho_distance(&rho1, &rho1).unwrap();
        assert!(d_self < 1e-9, "D(ρ, ρ) deve ser 0, obtido {d_self}");
    }

    #[test]
    fn test_rho_distance_rank_mismatch() {
        let e = test_embedding(42);
        let p64 = random_projection(384, 64, 42);
        let p32 = random_projection(384, 32, 42);
        let a = construct_density_matrix(&e, 64, 0.01, Some(&p64)).unwrap();
        let b = construct_density_matrix(&e, 32, 0.01, Some(&p32)).unwrap();
        assert!(matches!(
            rho_distance(&a, &b),
            Err(TrmError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_principal_directions() {
        let proj = random_projection(384, 64, 42);
        let e1 = test_embedding(42);
        let e2 = test_embedding(7);

        let rho1 = construct_density_matrix(&e1, 64, 0.01, Some(&proj)).unwrap();
        let rho2 = construct_density_matrix(&e2, 64, 0.01, Some(&proj)).unwrap();

        let dirs = principal_directions(&rho1, &rho2, 3).unwrap();
        assert_eq!(dirs.len(), 3);

        // Ordenadas por |magnitude| decrescente
        assert!(dirs[0].magnitude.abs() >= dirs[1].magnitude.abs());
        assert!(dirs[1].magnitude.abs() >= dirs[2].magnitude.abs());

        for d in &dirs {
            assert!((0.0..=1.0).contains(&d.explained_variance));
            assert_eq!(d.direction.len(), 64);
        }
    }

    #[test]
    fn test_summary_shape() {
        let embedding = test_embedding(42);
        let proj = random_projection(384, 64, 42);
        let rho = construct_density_matrix(&embedding, 64, 0.01, Some(&proj)).unwrap();

        let summary = rho.summary();
        assert_eq!(summary.eigenvalues.len(), 64);
        assert_eq!(summary.top_eigenvectors.len(), 5);
        assert_eq!(summary.rank, 64);
        assert!(summary.entropy >= 0.0);
    }
}
