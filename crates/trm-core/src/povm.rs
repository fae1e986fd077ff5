//! Operadores POVM - a bússola semântica da medição
//!
//! POVMs (Positive Operator-Valued Measures) são o jeito quântico de
//! medir observáveis:
//! - cada operador Eᵢ é PSD por construção: Eᵢ = Bᵢ·Bᵢᵀ
//! - os operadores somam a identidade: Σ Eᵢ = I
//! - a regra de Born dá as probabilidades: pᵢ = Tr(ρ·Eᵢ)
//!
//! Packs por convenção, um por família semântica:
//! - tetralemma (catuṣkoṭi): A, ¬A, both, neither
//! - tone: analytical, critical, empathic, playful, neutral
//! - ontology: corporeal, subjective, objective, mixed_frame
//! - pragmatics: clarity, coherence, evidence, charity
//! - audience: expert, general, student, policy, editorial

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use trm_common::{Readings, Result, TrmError};

use crate::density::DensityMatrix;

/// Tolerância Frobenius para ‖Σ Eᵢ − I‖
const SUM_TO_IDENTITY_TOL: f64 = 0.01;

/// Um operador POVM Eᵢ, parametrizado como Eᵢ = Bᵢ·Bᵢᵀ (PSD garantido)
#[derive(Debug, Clone)]
pub struct PovmOperator {
    pub name: String,
    b: DMatrix<f64>,
}

impl PovmOperator {
    pub fn new(name: impl Into<String>, b: DMatrix<f64>) -> Self {
        Self {
            name: name.into(),
            b,
        }
    }

    /// O fator Bᵢ (rank × rank)
    pub fn factor(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Eᵢ = Bᵢ·Bᵢᵀ
    pub fn effect(&self) -> DMatrix<f64> {
        &self.b * self.b.transpose()
    }

    /// Regra de Born: pᵢ = Tr(ρ·Eᵢ), clipado em [0, 1]
    pub fn measure(&self, rho: &DensityMatrix) -> Result<f64> {
        if self.b.nrows() != rho.rank {
            return Err(TrmError::InvalidInput(format!(
                "operador '{}' tem rank {}, ρ tem rank {}",
                self.name,
                self.b.nrows(),
                rho.rank
            )));
        }

        let prob = (&rho.rho * self.effect()).trace();
        Ok(prob.clamp(0.0, 1.0))
    }
}

/// Coleção ordenada de operadores POVM para uma dimensão semântica.
///
/// Invariante: Σ Eᵢ = I dentro de 0.01 Frobenius, imposta na construção.
/// Imutável depois de construída; compartilhada via `Arc` entre threads.
#[derive(Debug, Clone)]
pub struct PovmPack {
    pub name: String,
    pub description: String,
    operators: Vec<PovmOperator>,
    pub rank: usize,
}

impl PovmPack {
    /// Constrói um pack validando e normalizando Σ Eᵢ = I.
    ///
    /// Sequência de reparo: rescale escalar Frobenius, rescale escalar
    /// por traço, e por fim correção simétrica T^{-1/2}·Eᵢ·T^{-1/2}
    /// (que preserva PSD e zera o resíduo). Falha com `PovmConstruction`
    /// se o total for singular ou o resíduo persistir.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        operators: Vec<PovmOperator>,
        rank: usize,
    ) -> Result<Self> {
        let name = name.into();

        if operators.is_empty() {
            return Err(TrmError::PovmConstruction(format!(
                "pack '{name}' sem operadores"
            )));
        }
        for op in &operators {
            if op.b.nrows() != rank || op.b.ncols() != rank {
                return Err(TrmError::InvalidInput(format!(
                    "operador '{}' não tem rank {rank}",
                    op.name
                )));
            }
        }

        let mut factors: Vec<DMatrix<f64>> = operators.iter().map(|op| op.b.clone()).collect();
        let residual = normalize_to_identity(&mut factors, rank, &name)?;
        debug!("pack '{}' normalizado, resíduo {:.2e}", name, residual);

        let operators = operators
            .into_iter()
            .zip(factors)
            .map(|(op, b)| PovmOperator { name: op.name, b })
            .collect();

        Ok(Self {
            name,
            description: description.into(),
            operators,
            rank,
        })
    }

    /// Operadores na ordem estável do pack
    pub fn operators(&self) -> &[PovmOperator] {
        &self.operators
    }

    /// Nomes dos eixos na ordem estável do pack
    pub fn axes(&self) -> Vec<&str> {
        self.operators.iter().map(|op| op.name.as_str()).collect()
    }

    pub fn has_axis(&self, axis: &str) -> bool {
        self.operators.iter().any(|op| op.name == axis)
    }

    /// Mede todos os operadores do pack contra ρ.
    ///
    /// Clipa cada pᵢ em [0, 1] e renormaliza para Σ pᵢ = 1, corrigindo
    /// drift numérico pequeno.
    pub fn measure(&self, rho: &DensityMatrix) -> Result<Readings> {
        if rho.rank != self.rank {
            return Err(TrmError::InvalidInput(format!(
                "rank de ρ ({}) difere do rank do pack '{}' ({})",
                rho.rank, self.name, self.rank
            )));
        }

        let mut pairs = Vec::with_capacity(self.operators.len());
        for op in &self.operators {
            pairs.push((op.name.clone(), op.measure(rho)?));
        }

        let total: f64 = pairs.iter().map(|(_, p)| p).sum();
        if total <= 1e-10 {
            return Err(TrmError::NumericalFailure(format!(
                "medição do pack '{}' somou zero",
                self.name
            )));
        }
        if (total - 1.0).abs() > 1e-6 {
            for (_, p) in pairs.iter_mut() {
                *p /= total;
            }
        }

        Ok(Readings::from_pairs(pairs))
    }
}

/// Normaliza fatores in-place até Σ BᵢBᵢᵀ = I dentro da tolerância.
/// Retorna o resíduo Frobenius final.
fn normalize_to_identity(
    factors: &mut [DMatrix<f64>],
    rank: usize,
    pack_name: &str,
) -> Result<f64> {
    let identity = DMatrix::<f64>::identity(rank, rank);

    let total_of = |fs: &[DMatrix<f64>]| {
        fs.iter().fold(DMatrix::<f64>::zeros(rank, rank), |acc, b| {
            acc + b * b.transpose()
        })
    };

    let mut total = total_of(factors);
    let mut residual = (&total - &identity).norm();
    if residual <= SUM_TO_IDENTITY_TOL {
        return Ok(residual);
    }

    // 1º reparo: rescale escalar por norma Frobenius
    let total_norm = total.norm();
    if total_norm > 0.0 {
        let scale = (identity.norm() / total_norm).sqrt();
        for b in factors.iter_mut() {
            b.scale_mut(scale);
        }
        total = total_of(factors);
        residual = (&total - &identity).norm();
        if residual <= SUM_TO_IDENTITY_TOL {
            return Ok(residual);
        }
    }

    // 2º reparo: rescale escalar por traço (Tr(I) = rank)
    let total_trace = total.trace();
    if total_trace > 0.0 {
        let scale = (rank as f64 / total_trace).sqrt();
        for b in factors.iter_mut() {
            b.scale_mut(scale);
        }
        total = total_of(factors);
        residual = (&total - &identity).norm();
        if residual <= SUM_TO_IDENTITY_TOL {
            return Ok(residual);
        }
    }

    // Reparo final: branqueamento simétrico Eᵢ ← T^{-1/2}·Eᵢ·T^{-1/2}.
    // Equivale a Bᵢ ← T^{-1/2}·Bᵢ e torna Σ Eᵢ = I exato.
    let eigen = nalgebra::SymmetricEigen::new(total);
    if eigen.eigenvalues.iter().any(|&l| l <= 1e-12) {
        return Err(TrmError::PovmConstruction(format!(
            "pack '{pack_name}': total Σ Eᵢ singular, impossível normalizar"
        )));
    }
    let inv_sqrt = DMatrix::from_diagonal(&eigen.eigenvalues.map(|l| 1.0 / l.sqrt()));
    let whitener = &eigen.eigenvectors * inv_sqrt * eigen.eigenvectors.transpose();
    for b in factors.iter_mut() {
        *b = &whitener * &*b;
    }

    let total = total_of(factors);
    let residual = (&total - &identity).norm();
    if residual > SUM_TO_IDENTITY_TOL {
        return Err(TrmError::PovmConstruction(format!(
            "pack '{pack_name}': Σ Eᵢ ≠ I depois do reparo (resíduo {residual:.4})"
        )));
    }

    Ok(residual)
}

/// Cria um pack aleatório (inicialização, antes de qualquer treino).
///
/// Para cada eixo, Bᵢ ∼ N(0, 1/√(rank·n)); o construtor do pack aplica
/// a normalização para Σ Eᵢ = I. Determinístico dado o seed.
pub fn create_random_pack(
    name: impl Into<String>,
    description: impl Into<String>,
    axes: &[&str],
    rank: usize,
    seed: u64,
) -> Result<PovmPack> {
    let name = name.into();
    if axes.is_empty() {
        return Err(TrmError::InvalidInput(format!(
            "pack '{name}' precisa de pelo menos um eixo"
        )));
    }

    let n = axes.len();
    let sigma = 1.0 / ((rank * n) as f64).sqrt();
    let normal = Normal::new(0.0, sigma).map_err(|e| {
        TrmError::NumericalFailure(format!("distribuição normal inválida: {e}"))
    })?;

    let mut rng = StdRng::seed_from_u64(seed);
    let operators = axes
        .iter()
        .map(|axis| {
            let b = DMatrix::from_fn(rank, rank, |_, _| normal.sample(&mut rng));
            PovmOperator::new(*axis, b)
        })
        .collect();

    PovmPack::new(name, description, operators, rank)
}

/// Pack tetralemma (catuṣkoṭi): afirmação, negação, ambos, nenhum
pub fn tetralemma_pack(rank: usize, seed: u64) -> Result<PovmPack> {
    create_random_pack(
        "tetralemma",
        "Tetralemma (catuṣkoṭi): A, ¬A, both, neither",
        &["A", "¬A", "both", "neither"],
        rank,
        seed,
    )
}

/// Pack de tom emocional/estilístico
pub fn tone_pack(rank: usize, seed: u64) -> Result<PovmPack> {
    create_random_pack(
        "tone",
        "Tom do texto: analítico, crítico, empático, lúdico, neutro",
        &["analytical", "critical", "empathic", "playful", "neutral"],
        rank,
        seed,
    )
}

/// Pack de enquadramento ontológico
pub fn ontology_pack(rank: usize, seed: u64) -> Result<PovmPack> {
    create_random_pack(
        "ontology",
        "Enquadramento ontológico: corpóreo, subjetivo, objetivo, misto",
        &["corporeal", "subjective", "objective", "mixed_frame"],
        rank,
        seed,
    )
}

/// Pack de qualidade pragmática
pub fn pragmatics_pack(rank: usize, seed: u64) -> Result<PovmPack> {
    create_random_pack(
        "pragmatics",
        "Pragmática: clareza, coerência, evidência, caridade",
        &["clarity", "coherence", "evidence", "charity"],
        rank,
        seed,
    )
}

/// Pack de audiência alvo
pub fn audience_pack(rank: usize, seed: u64) -> Result<PovmPack> {
    create_random_pack(
        "audience",
        "Audiência: especialista, geral, estudante, política, editorial",
        &["expert", "general", "student", "policy", "editorial"],
        rank,
        seed,
    )
}

/// Todos os packs builtin, chaveados por nome, com seeds estáveis
/// derivados do seed base (reprodutível entre execuções).
pub fn builtin_packs(rank: usize, base_seed: u64) -> Result<BTreeMap<String, Arc<PovmPack>>> {
    let mut packs = BTreeMap::new();
    let builders: [(&str, fn(usize, u64) -> Result<PovmPack>); 5] = [
        ("tetralemma", tetralemma_pack),
        ("tone", tone_pack),
        ("ontology", ontology_pack),
        ("pragmatics", pragmatics_pack),
        ("audience", audience_pack),
    ];

    for (offset, (name, build)) in builders.iter().enumerate() {
        let pack = build(rank, base_seed + offset as u64)?;
        packs.insert(name.to_string(), Arc::new(pack));
    }

    Ok(packs)
}
