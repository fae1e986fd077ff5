//! Pipeline de aprendizado de operadores semânticos
//!
//! Processo:
//! 1. Carrega corpus JSON (`{corpus_dir}/{pack}/{axis}.json`)
//! 2. Para cada eixo, embedda os exemplares (fora deste crate) e aprende
//!    um fator B a partir do vetor projetado médio
//! 3. Monta o `SemanticPack` (normalização Σ Eᵢ = I inclusa)
//! 4. Valida: discriminação (Cohen's d), cobertura, variância
//!
//! O fator B tem a primeira coluna proporcional a v̄ (direção do eixo) e
//! as colunas restantes numa base ortonormal do complemento, escaladas
//! para soma-de-quadrados por coluna ≈ 1/n. A alternativa top-r SVD dos
//! exemplares fica como caminho de re-treino, não implementada.

use chrono::Utc;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use trm_common::{Result, TrmError};

use crate::semantic::{SemanticOperator, SemanticPack};

/// Um exemplar do corpus; chaves extras no JSON são ignoradas
#[derive(Debug, Deserialize)]
struct CorpusExample {
    text: String,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    examples: Vec<CorpusExample>,
}

/// Carrega os exemplares de um eixo: `{"examples": [{"text": "..."}]}`
pub fn load_axis_examples(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| TrmError::Config(format!("falha lendo {}: {e}", path.display())))?;
    let file: CorpusFile = serde_json::from_str(&raw)
        .map_err(|e| TrmError::Config(format!("corpus malformado em {}: {e}", path.display())))?;

    Ok(file.examples.into_iter().map(|e| e.text).collect())
}

/// Carrega o corpus completo de um pack: eixo → exemplares.
///
/// Arquivos que não terminam em `.json` são pulados.
pub fn load_pack_corpus(corpus_root: &Path, pack: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let dir = corpus_root.join(pack);
    if !dir.is_dir() {
        return Err(TrmError::Config(format!(
            "diretório de corpus não existe: {}",
            dir.display()
        )));
    }

    let mut corpus = BTreeMap::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let axis = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };

        let examples = load_axis_examples(&path)?;
        if examples.is_empty() {
            warn!("eixo '{}' sem exemplares, pulando", axis);
            continue;
        }
        corpus.insert(axis, examples);
    }

    if corpus.is_empty() {
        return Err(TrmError::Config(format!(
            "nenhum eixo com exemplares em {}",
            dir.display()
        )));
    }

    Ok(corpus)
}

/// Aprende um pack a partir de embeddings já resolvidos (eixo → vetores).
///
/// O chamador resolve os embeddings pelos adaptadores antes de entrar
/// aqui; o aprendizado em si é síncrono e puro. A projeção fornecida
/// vira a projeção FIXA do pack.
pub fn learn_pack_from_embeddings(
    name: &str,
    axis_to_embeddings: &BTreeMap<String, Vec<Vec<f64>>>,
    projection: DMatrix<f64>,
    archive: &str,
) -> Result<SemanticPack> {
    if axis_to_embeddings.is_empty() {
        return Err(TrmError::InvalidInput(format!(
            "pack '{name}' sem eixos para aprender"
        )));
    }

    let rank = projection.ncols();
    let dim = projection.nrows();
    let n = axis_to_embeddings.len();
    let learned_at = Utc::now();

    let mut operators = Vec::with_capacity(n);
    for (axis, embeddings) in axis_to_embeddings {
        if embeddings.is_empty() {
            return Err(TrmError::InvalidInput(format!(
                "eixo '{axis}' sem exemplares"
            )));
        }

        // Projeta cada exemplar para o subespaço de rank
        let mut projected = Vec::with_capacity(embeddings.len());
        for e in embeddings {
            if e.len() != dim {
                return Err(TrmError::InvalidInput(format!(
                    "exemplar do eixo '{axis}' tem dimensão {}, projeção espera {dim}",
                    e.len()
                )));
            }
            let v = projection.transpose() * DVector::from_column_slice(e);
            let norm = v.norm();
            if norm <= 1e-10 {
                return Err(TrmError::NumericalFailure(format!(
                    "exemplar do eixo '{axis}' colapsou no kernel da projeção"
                )));
            }
            projected.push(v.unscale(norm));
        }

        // Vetor médio normalizado = direção do eixo
        let mut mean = DVector::<f64>::zeros(rank);
        for v in &projected {
            mean += v;
        }
        mean.unscale_mut(projected.len() as f64);
        let mean_norm = mean.norm();
        if mean_norm <= 1e-10 {
            return Err(TrmError::NumericalFailure(format!(
                "exemplares do eixo '{axis}' se cancelam, direção média nula"
            )));
        }
        let axis_dir = mean.unscale(mean_norm);

        // Estatísticas das projeções escalares dos exemplares na direção
        let scalars: Vec<f64> = projected.iter().map(|v| v.dot(&axis_dir)).collect();
        let (proj_mean, proj_std) = mean_std(&scalars);

        let b = axis_factor(&axis_dir, rank, n);
        operators.push(SemanticOperator::new(
            axis.clone(),
            b,
            embeddings.len(),
            archive,
            learned_at,
            proj_mean,
            proj_std,
        ));
    }

    info!(
        "pack '{}' aprendido: {} eixos, rank {}, archive '{}'",
        name, n, rank, archive
    );

    SemanticPack::new(
        name,
        format!("Operadores semânticos aprendidos para '{name}'"),
        operators,
        projection,
    )
}

/// Fator B do eixo: primeira coluna = direção v̄, demais colunas numa
/// base ortonormal do complemento com norma² = 1/n.
///
/// Usa o refletor de Householder H que leva e₀ em v̄: as colunas de H
/// são ortonormais e a primeira é exatamente v̄.
fn axis_factor(axis_dir: &DVector<f64>, rank: usize, n_axes: usize) -> DMatrix<f64> {
    let mut e0 = DVector::<f64>::zeros(rank);
    e0[0] = 1.0;

    let w = axis_dir - &e0;
    let w_norm_sq = w.norm_squared();

    let h = if w_norm_sq <= 1e-14 {
        DMatrix::<f64>::identity(rank, rank)
    } else {
        DMatrix::<f64>::identity(rank, rank) - (&w * w.transpose()).scale(2.0 / w_norm_sq)
    };

    let complement_scale = 1.0 / (n_axes as f64).sqrt();
    let mut b = h;
    for j in 1..rank {
        let col = b.column(j) * complement_scale;
        b.set_column(j, &col);
    }

    b
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

/// Cohen's d entre duas amostras (effect size padronizado)
pub fn cohens_d(sample_a: &[f64], sample_b: &[f64]) -> f64 {
    if sample_a.is_empty() || sample_b.is_empty() {
        return 0.0;
    }

    let (mean_a, std_a) = mean_std(sample_a);
    let (mean_b, std_b) = mean_std(sample_b);

    let na = sample_a.len() as f64;
    let nb = sample_b.len() as f64;
    let pooled_var =
        ((na - 1.0) * std_a * std_a + (nb - 1.0) * std_b * std_b) / (na + nb - 2.0).max(1.0);
    // Piso no desvio pooled mantém d finito para amostras degeneradas
    let pooled_std = pooled_var.sqrt().max(1e-9);

    (mean_a - mean_b) / pooled_std
}

/// Validação de um operador aprendido
#[derive(Debug, Clone, Serialize)]
pub struct OperatorValidation {
    pub axis: String,
    /// Cohen's d entre leituras in-axis e background
    pub cohens_d: f64,
    /// Fração do background dentro da própria faixa normal (±2σ)
    pub coverage: f64,
    /// Variância de medições repetidas do mesmo input (esperado: 0)
    pub variance: f64,
    pub in_axis_mean: f64,
    pub background_mean: f64,
}

/// Recomendação final da validação
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "axes")]
pub enum Recommendation {
    /// Todos os operadores com d ≥ 0.5 e cobertura ≥ 0.7
    Keep,
    /// Alguns operadores fracos; re-treinar só os listados
    RetrainWeak(Vec<String>),
    /// Nenhum operador discrimina; re-treinar tudo
    RetrainAll,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub pack: String,
    pub operators: Vec<OperatorValidation>,
    pub recommendation: Recommendation,
}

/// Limiares da recomendação
const MIN_COHENS_D: f64 = 0.5;
const MIN_COVERAGE: f64 = 0.7;

/// Valida um pack aprendido contra um conjunto held-out.
///
/// Para cada operador: mede exemplares held-out do próprio eixo versus
/// um background (exemplares dos outros eixos), computa Cohen's d,
/// cobertura do background e a variância de medições repetidas sob a
/// projeção fixa.
pub fn validate_pack(
    pack: &SemanticPack,
    holdout: &BTreeMap<String, Vec<Vec<f64>>>,
    shrinkage: f64,
) -> Result<ValidationReport> {
    let mut validations = Vec::new();
    let mut weak = Vec::new();

    for op in pack.operators() {
        let axis = &op.name;
        let in_axis = holdout.get(axis).ok_or_else(|| {
            TrmError::InvalidInput(format!("held-out sem exemplares do eixo '{axis}'"))
        })?;
        if in_axis.is_empty() {
            return Err(TrmError::InvalidInput(format!(
                "held-out vazio para o eixo '{axis}'"
            )));
        }

        let mut in_readings = Vec::with_capacity(in_axis.len());
        for e in in_axis {
            let r = pack.measure_embedding(e, shrinkage)?;
            in_readings.push(r.get(axis).unwrap_or(0.0));
        }

        let mut background = Vec::new();
        for (other_axis, embeddings) in holdout {
            if other_axis == axis {
                continue;
            }
            for e in embeddings {
                let r = pack.measure_embedding(e, shrinkage)?;
                background.push(r.get(axis).unwrap_or(0.0));
            }
        }

        let d = cohens_d(&in_readings, &background);

        // Cobertura: background dentro da própria faixa mean ± 2σ
        let (bg_mean, bg_std) = mean_std(&background);
        let coverage = if background.is_empty() {
            0.0
        } else {
            let lo = bg_mean - 2.0 * bg_std;
            let hi = bg_mean + 2.0 * bg_std;
            background.iter().filter(|&&p| p >= lo && p <= hi).count() as f64
                / background.len() as f64
        };

        // Variância de baseline: medir o mesmo input repetidas vezes
        let probe = &in_axis[0];
        let repeated: Vec<f64> = (0..5)
            .map(|_| {
                pack.measure_embedding(probe, shrinkage)
                    .map(|r| r.get(axis).unwrap_or(0.0))
            })
            .collect::<Result<_>>()?;
        let (_, rep_std) = mean_std(&repeated);
        let variance = rep_std * rep_std;

        let (in_mean, _) = mean_std(&in_readings);
        debug!(
            "validação '{}': d={:.3} coverage={:.2} var={:.2e}",
            axis, d, coverage, variance
        );

        if d < MIN_COHENS_D || coverage < MIN_COVERAGE {
            weak.push(axis.clone());
        }

        validations.push(OperatorValidation {
            axis: axis.clone(),
            cohens_d: d,
            coverage,
            variance,
            in_axis_mean: in_mean,
            background_mean: bg_mean,
        });
    }

    let recommendation = if weak.is_empty() {
        Recommendation::Keep
    } else if weak.len() == validations.len() {
        Recommendation::RetrainAll
    } else {
        Recommendation::RetrainWeak(weak)
    };

    Ok(ValidationReport {
        pack: pack.name.clone(),
        operators: validations,
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::random_projection;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn clustered_corpus(
        axes: &[&str],
        per_axis: usize,
        seed: u64,
    ) -> BTreeMap<String, Vec<Vec<f64>>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut corpus = BTreeMap::new();

        for (k, axis) in axes.iter().enumerate() {
            let mut examples = Vec::with_capacity(per_axis);
            for _ in 0..per_axis {
                let mut v = vec![0.0f64; 384];
                v[k * 11] = 1.0;
                for x in v.iter_mut() {
                    let noise: f64 = StandardNormal.sample(&mut rng);
                    *x += 0.01 * noise;
                }
                let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
                examples.push(v.into_iter().map(|x| x / norm).collect());
            }
            corpus.insert(axis.to_string(), examples);
        }

        corpus
    }

    #[test]
    fn test_cohens_d_separated_samples() {
        let a = vec![1.0, 1.1, 0.9, 1.05, 0.95];
        let b = vec![0.0, 0.1, -0.1, 0.05, -0.05];
        assert!(cohens_d(&a, &b) > 2.0);
    }

    #[test]
    fn test_cohens_d_identical_samples() {
        let a = vec![0.5, 0.6, 0.4];
        assert!(cohens_d(&a, &a).abs() < 1e-12);
    }

    #[test]
    fn test_axis_factor_first_column_is_direction() {
        let mut dir = DVector::<f64>::zeros(16);
        dir[3] = 1.0;
        let b = axis_factor(&dir, 16, 4);

        let col0 = b.column(0).into_owned();
        assert!((col0 - &dir).norm() < 1e-10);

        // Colunas do complemento com norma² = 1/n e ortogonais à direção
        for j in 1..16 {
            let col = b.column(j).into_owned();
            assert!((col.norm_squared() - 0.25).abs() < 1e-10);
            assert!(col.dot(&dir).abs() < 1e-10);
        }
    }

    #[test]
    fn test_learned_discrimination() {
        // 30 exemplares/eixo de treino, 10/eixo held-out
        let axes = ["analytical", "critical", "empathic"];
        let train = clustered_corpus(&axes, 30, 42);
        let holdout = clustered_corpus(&axes, 10, 99);

        let projection = random_projection(384, 64, 42);
        let pack = learn_pack_from_embeddings("tone", &train, projection, "t").unwrap();

        let report = validate_pack(&pack, &holdout, 0.01).unwrap();
        for v in &report.operators {
            assert!(
                v.cohens_d >= 0.5,
                "{}: d = {} abaixo do limiar",
                v.axis,
                v.cohens_d
            );
            assert!(
                v.variance <= 1e-8,
                "{}: variância {} sob projeção fixa",
                v.axis,
                v.variance
            );
        }
        assert_eq!(report.recommendation, Recommendation::Keep);
    }

    #[test]
    fn test_corpus_loading() {
        let tmp = tempfile::tempdir().unwrap();
        let pack_dir = tmp.path().join("tone");
        fs::create_dir_all(&pack_dir).unwrap();

        fs::write(
            pack_dir.join("analytical.json"),
            r#"{"examples": [{"text": "The data shows a clear pattern.", "extra": 1}], "meta": "x"}"#,
        )
        .unwrap();
        fs::write(pack_dir.join("notes.txt"), "ignored").unwrap();

        let corpus = load_pack_corpus(tmp.path(), "tone").unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus["analytical"].len(), 1);
    }

    #[test]
    fn test_corpus_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let pack_dir = tmp.path().join("tone");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join("analytical.json"), "{not json").unwrap();

        assert!(matches!(
            load_pack_corpus(tmp.path(), "tone"),
            Err(TrmError::Config(_))
        ));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let corpus = BTreeMap::new();
        let projection = random_projection(384, 16, 42);
        assert!(matches!(
            learn_pack_from_embeddings("x", &corpus, projection, "a"),
            Err(TrmError::InvalidInput(_))
        ));
    }
}
