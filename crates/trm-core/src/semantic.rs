//! Operadores POVM semânticos - aprendidos de corpus
//!
//! Substituem operadores aleatórios por operadores determinísticos que
//! capturam propriedades semânticas reais:
//! - variância zero de medição (mesmo embedding → mesma leitura)
//! - discriminação semântica (texto analítico pontua alto em "analytical")
//! - projeção FIXA, armazenada junto com os operadores e nunca regenerada
//!
//! Persistência: um arquivo bincode por operador em
//! `{root}/{pack}/{axis}.bin`, mais `projection.bin` com a projeção fixa
//! do pack. O load reconstrói o pack e re-verifica Σ Eᵢ = I.

use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use trm_common::{Readings, Result, TrmError};

use crate::density::construct_density_matrix;
use crate::povm::{PovmOperator, PovmPack};

/// Nome reservado do arquivo da projeção dentro do diretório do pack
const PROJECTION_FILE: &str = "projection.bin";

/// Operador aprendido: fator B mais proveniência do treino
#[derive(Debug, Clone)]
pub struct SemanticOperator {
    pub name: String,
    pub rank: usize,
    b: DMatrix<f64>,
    /// Quantos exemplares treinaram este operador
    pub corpus_size: usize,
    /// Tag do archive de onde o corpus veio
    pub archive: String,
    pub learned_at: DateTime<Utc>,
    /// Média das projeções escalares dos exemplares na direção do eixo
    pub projection_mean: f64,
    /// Desvio padrão das projeções escalares
    pub projection_std: f64,
}

impl SemanticOperator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        b: DMatrix<f64>,
        corpus_size: usize,
        archive: impl Into<String>,
        learned_at: DateTime<Utc>,
        projection_mean: f64,
        projection_std: f64,
    ) -> Self {
        let rank = b.nrows();
        Self {
            name: name.into(),
            rank,
            b,
            corpus_size,
            archive: archive.into(),
            learned_at,
            projection_mean,
            projection_std,
        }
    }

    pub fn factor(&self) -> &DMatrix<f64> {
        &self.b
    }
}

/// Pack de operadores aprendidos com sua projeção fixa.
///
/// A projeção fixa é o que torna as leituras determinísticas: o mesmo
/// embedding sempre produz o mesmo ρ e a mesma leitura.
#[derive(Debug, Clone)]
pub struct SemanticPack {
    pub name: String,
    pub description: String,
    operators: Vec<SemanticOperator>,
    povm: PovmPack,
    pub rank: usize,
    projection: DMatrix<f64>,
}

impl SemanticPack {
    /// Constrói o pack, normalizando Σ Eᵢ = I e gravando os fatores
    /// normalizados de volta nos operadores (persistência estável).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        mut operators: Vec<SemanticOperator>,
        projection: DMatrix<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let description = description.into();
        let rank = projection.ncols();

        let povm_operators = operators
            .iter()
            .map(|op| PovmOperator::new(op.name.clone(), op.factor().clone()))
            .collect();
        let povm = PovmPack::new(name.clone(), description.clone(), povm_operators, rank)?;

        // Fatores pós-normalização viram os fatores canônicos
        for (op, normalized) in operators.iter_mut().zip(povm.operators()) {
            op.b = normalized.factor().clone();
        }

        Ok(Self {
            name,
            description,
            operators,
            povm,
            rank,
            projection,
        })
    }

    pub fn operators(&self) -> &[SemanticOperator] {
        &self.operators
    }

    pub fn projection(&self) -> &DMatrix<f64> {
        &self.projection
    }

    /// Visão POVM do pack (para medição contra um ρ já construído)
    pub fn povm(&self) -> &PovmPack {
        &self.povm
    }

    /// Caminho determinístico completo: embedding → ρ (projeção fixa) →
    /// leituras. É este caminho que tem variância zero.
    pub fn measure_embedding(&self, embedding: &[f64], shrinkage: f64) -> Result<Readings> {
        let rho =
            construct_density_matrix(embedding, self.rank, shrinkage, Some(&self.projection))?;
        self.povm.measure(&rho)
    }
}

/// Registro persistido de um operador (formato bincode)
#[derive(Debug, Serialize, Deserialize)]
struct OperatorRecord {
    axis: String,
    rank: u32,
    /// Posição no pack, para reconstruir a ordem estável dos eixos
    position: u32,
    /// Fator B em row-major, rank × rank floats de 64 bits
    b_row_major: Vec<f64>,
    corpus_size: u64,
    archive: String,
    learned_at: DateTime<Utc>,
    projection_mean: f64,
    projection_std: f64,
}

/// Registro persistido da projeção fixa do pack
#[derive(Debug, Serialize, Deserialize)]
struct ProjectionRecord {
    dim: u32,
    rank: u32,
    p_row_major: Vec<f64>,
}

fn matrix_to_row_major(m: &DMatrix<f64>) -> Vec<f64> {
    let (rows, cols) = m.shape();
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push(m[(i, j)]);
        }
    }
    out
}

/// Salva um pack aprendido: um arquivo por operador + a projeção fixa
pub fn save_pack(pack: &SemanticPack, root: &Path) -> Result<()> {
    let dir = root.join(&pack.name);
    fs::create_dir_all(&dir)?;

    for (position, op) in pack.operators().iter().enumerate() {
        let record = OperatorRecord {
            axis: op.name.clone(),
            rank: op.rank as u32,
            position: position as u32,
            b_row_major: matrix_to_row_major(op.factor()),
            corpus_size: op.corpus_size as u64,
            archive: op.archive.clone(),
            learned_at: op.learned_at,
            projection_mean: op.projection_mean,
            projection_std: op.projection_std,
        };

        let bytes = bincode::serialize(&record)
            .map_err(|e| TrmError::Config(format!("falha serializando operador: {e}")))?;
        fs::write(dir.join(format!("{}.bin", op.name)), bytes)?;
    }

    let projection = ProjectionRecord {
        dim: pack.projection().nrows() as u32,
        rank: pack.projection().ncols() as u32,
        p_row_major: matrix_to_row_major(pack.projection()),
    };
    let bytes = bincode::serialize(&projection)
        .map_err(|e| TrmError::Config(format!("falha serializando projeção: {e}")))?;
    fs::write(dir.join(PROJECTION_FILE), bytes)?;

    debug!(
        "pack '{}' salvo em {} ({} operadores)",
        pack.name,
        dir.display(),
        pack.operators().len()
    );
    Ok(())
}

/// Carrega um pack aprendido do disco.
///
/// Reconstrói operadores na ordem original e re-verifica Σ Eᵢ = I,
/// renormalizando se truncamento introduziu drift. Arquivos com extensão
/// desconhecida são ignorados; registros truncados viram `Config`.
pub fn load_pack(root: &Path, name: &str) -> Result<SemanticPack> {
    let dir = root.join(name);
    if !dir.is_dir() {
        return Err(TrmError::Config(format!(
            "diretório de pack não existe: {}",
            dir.display()
        )));
    }

    let projection_bytes = fs::read(dir.join(PROJECTION_FILE)).map_err(|_| {
        TrmError::Config(format!(
            "pack '{name}' sem {PROJECTION_FILE}; re-treine os operadores"
        ))
    })?;
    let projection_record: ProjectionRecord = bincode::deserialize(&projection_bytes)
        .map_err(|e| TrmError::Config(format!("{PROJECTION_FILE} truncado ou corrompido: {e}")))?;

    let dim = projection_record.dim as usize;
    let rank = projection_record.rank as usize;
    if projection_record.p_row_major.len() != dim * rank {
        return Err(TrmError::Config(format!(
            "{PROJECTION_FILE} com tamanho inconsistente ({} floats para {dim}×{rank})",
            projection_record.p_row_major.len()
        )));
    }
    let projection = DMatrix::from_row_slice(dim, rank, &projection_record.p_row_major);

    let mut records: Vec<OperatorRecord> = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();

        if file_name == PROJECTION_FILE {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            // Arquivos desconhecidos são ignorados
            continue;
        }

        let bytes = fs::read(&path)?;
        let record: OperatorRecord = bincode::deserialize(&bytes).map_err(|e| {
            TrmError::Config(format!("operador truncado em {}: {e}", path.display()))
        })?;

        let op_rank = record.rank as usize;
        if op_rank != rank {
            return Err(TrmError::Config(format!(
                "operador '{}' tem rank {op_rank}, projeção tem rank {rank}",
                record.axis
            )));
        }
        if record.b_row_major.len() != op_rank * op_rank {
            return Err(TrmError::Config(format!(
                "operador '{}' truncado ({} floats para rank {op_rank})",
                record.axis,
                record.b_row_major.len()
            )));
        }

        records.push(record);
    }

    if records.is_empty() {
        return Err(TrmError::Config(format!(
            "pack '{name}' sem operadores em {}",
            dir.display()
        )));
    }

    records.sort_by_key(|r| r.position);

    let operators = records
        .into_iter()
        .map(|r| {
            let rank = r.rank as usize;
            SemanticOperator::new(
                r.axis,
                DMatrix::from_row_slice(rank, rank, &r.b_row_major),
                r.corpus_size as usize,
                r.archive,
                r.learned_at,
                r.projection_mean,
                r.projection_std,
            )
        })
        .collect();

    // SemanticPack::new re-verifica Σ Eᵢ = I e renormaliza drift
    SemanticPack::new(
        name,
        format!("Operadores semânticos aprendidos para '{name}'"),
        operators,
        projection,
    )
}

/// Carrega todos os packs presentes sob o diretório raiz de operadores
pub fn load_all_packs(root: &Path) -> Result<Vec<SemanticPack>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut packs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match load_pack(root, &name) {
            Ok(pack) => packs.push(pack),
            Err(e) => {
                warn!("pack '{}' ignorado no load: {}", name, e);
            }
        }
    }

    Ok(packs)
}
