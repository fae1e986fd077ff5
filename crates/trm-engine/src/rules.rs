//! Motor de regras - padrões léxicos aprendidos de transformações
//!
//! Aplica substituições, remoções e inserções ranqueadas por confiança.
//! A aplicação é case-insensitive com respeito a fronteiras de palavra;
//! substituição e remoção atuam na primeira ocorrência; inserção de
//! negação entra logo depois do primeiro verbo modal, ou declina.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use trm_common::{Result, TrmError};

use crate::context::{
    text_change_ratio, CandidateSource, TransformationCandidate, TransformationContext,
};
use crate::gfs::CandidateGenerator;

/// Verbos modais que ancoram a inserção de negação
const MODAL_ANCHORS: [&str; 8] = [
    "should", "could", "would", "will", "can", "may", "might", "must",
];

static MODAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"\b({})\b", MODAL_ANCHORS.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .expect("regex de modais é estática")
});

static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("regex de whitespace é estática"));

/// Tier de confiança de uma regra
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Prior numérico usado na ordenação de candidatos
    pub fn prior(self) -> f64 {
        match self {
            Confidence::High => 0.9,
            Confidence::Medium => 0.6,
            Confidence::Low => 0.3,
        }
    }
}

/// Tipo de transformação léxica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    Substitution { from: String, to: String },
    Removal { word: String },
    Insertion { word: String },
}

/// Uma regra anotada com o delta esperado (aprendido do corpus)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default)]
    pub expected_delta: f64,
    pub confidence: Confidence,
}

impl Rule {
    /// Descrição curta para proveniência do candidato
    fn describe(&self) -> String {
        match &self.kind {
            RuleKind::Substitution { from, to } => format!("substitute: '{from}' → '{to}'"),
            RuleKind::Removal { word } => format!("remove: '{word}'"),
            RuleKind::Insertion { word } => format!("insert negation: '{word}'"),
        }
    }

    /// Aplica a regra ao texto; `None` se a regra declinar (sem match)
    fn apply(&self, text: &str) -> Option<String> {
        match &self.kind {
            RuleKind::Substitution { from, to } => apply_substitution(text, from, to),
            RuleKind::Removal { word } => apply_removal(text, word),
            RuleKind::Insertion { word } => apply_insertion(text, word),
        }
    }
}

fn word_boundary_regex(phrase: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(phrase)))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Substitui a primeira ocorrência, case-insensitive, fronteira de palavra
fn apply_substitution(text: &str, from: &str, to: &str) -> Option<String> {
    let re = word_boundary_regex(from)?;
    if !re.is_match(text) {
        return None;
    }
    Some(re.replace(text, to).into_owned())
}

/// Remove a primeira ocorrência e colapsa whitespace adjacente.
///
/// Se a remoção derrubou a primeira palavra, restaura a maiúscula inicial
/// quando o original começava maiúsculo.
fn apply_removal(text: &str, word: &str) -> Option<String> {
    let re = word_boundary_regex(word)?;
    if !re.is_match(text) {
        return None;
    }

    let removed = re.replace(text, "").into_owned();
    let collapsed = WHITESPACE_REGEX
        .replace_all(removed.trim(), " ")
        .into_owned();
    if collapsed.is_empty() {
        return None;
    }

    let original_starts_upper = text.chars().next().is_some_and(|c| c.is_uppercase());
    let result = if original_starts_upper {
        let mut chars = collapsed.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => collapsed,
        }
    } else {
        collapsed
    };

    Some(result)
}

/// Insere a palavra logo depois do primeiro modal; declina sem âncora
fn apply_insertion(text: &str, word: &str) -> Option<String> {
    let m = MODAL_REGEX.find(text)?;
    let mut result = String::with_capacity(text.len() + word.len() + 1);
    result.push_str(&text[..m.end()]);
    result.push(' ');
    result.push_str(word);
    result.push_str(&text[m.end()..]);
    Some(result)
}

/// Regras de um par pack/eixo, agrupadas por tipo (formato do arquivo)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AxisRules {
    #[serde(default)]
    substitutions: Vec<Rule>,
    #[serde(default)]
    removals: Vec<Rule>,
    #[serde(default)]
    insertions: Vec<Rule>,
}

impl AxisRules {
    fn all(&self) -> impl Iterator<Item = &Rule> {
        self.substitutions
            .iter()
            .chain(self.removals.iter())
            .chain(self.insertions.iter())
    }
}

/// Rule set completo: "pack/eixo" → regras ranqueadas.
///
/// Carregado do disco uma vez e compartilhado read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: BTreeMap<String, AxisRules>,
}

impl RuleSet {
    /// Carrega de JSON; malformado → `Config`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TrmError::Config(format!("falha lendo {}: {e}", path.display())))?;
        let rules: BTreeMap<String, AxisRules> = serde_json::from_str(&raw)
            .map_err(|e| TrmError::Config(format!("rule set malformado em {}: {e}", path.display())))?;

        debug!("rule set carregado: {} combinações pack/eixo", rules.len());
        Ok(Self { rules })
    }

    /// Combinações pack/eixo com regras disponíveis
    pub fn supported_axes(&self) -> Vec<&str> {
        self.rules.keys().map(|k| k.as_str()).collect()
    }

    /// Rule set default embutido: padrões de alta confiabilidade
    /// extraídos de transformações GFS bem-sucedidas (remoção de hedge,
    /// fortalecimento de verbo, negação modal).
    pub fn builtin() -> Self {
        let mut rules = BTreeMap::new();

        let sub = |from: &str, to: &str, delta: f64, confidence: Confidence| Rule {
            kind: RuleKind::Substitution {
                from: from.to_string(),
                to: to.to_string(),
            },
            expected_delta: delta,
            confidence,
        };
        let rem = |word: &str, delta: f64, confidence: Confidence| Rule {
            kind: RuleKind::Removal {
                word: word.to_string(),
            },
            expected_delta: delta,
            confidence,
        };
        let ins = |word: &str, delta: f64, confidence: Confidence| Rule {
            kind: RuleKind::Insertion {
                word: word.to_string(),
            },
            expected_delta: delta,
            confidence,
        };

        // Afirmação: derruba hedging, fortalece verbos
        rules.insert(
            "tetralemma/A".to_string(),
            AxisRules {
                substitutions: vec![
                    sub("might be", "is", 0.04, Confidence::High),
                    sub("could be", "is", 0.04, Confidence::High),
                    sub("seems to be", "is", 0.03, Confidence::Medium),
                    sub("suggests", "shows", 0.02, Confidence::Medium),
                ],
                removals: vec![
                    rem("I think", 0.05, Confidence::High),
                    rem("maybe", 0.04, Confidence::High),
                    rem("perhaps", 0.04, Confidence::High),
                    rem("possibly", 0.03, Confidence::Medium),
                ],
                insertions: vec![],
            },
        );

        // Negação: insere "not" depois de modal, negações diretas
        rules.insert(
            "tetralemma/¬A".to_string(),
            AxisRules {
                substitutions: vec![
                    sub("is a", "isn't a", 0.04, Confidence::Medium),
                    sub("does", "doesn't", 0.03, Confidence::Low),
                ],
                removals: vec![],
                insertions: vec![ins("not", 0.05, Confidence::High)],
            },
        );

        // Tom analítico: vocabulário sistemático
        rules.insert(
            "tone/analytical".to_string(),
            AxisRules {
                substitutions: vec![
                    sub("shows", "demonstrates", 0.03, Confidence::High),
                    sub("look at", "analyze", 0.03, Confidence::High),
                    sub("think about", "investigate", 0.02, Confidence::Medium),
                    sub("big", "significant", 0.02, Confidence::Low),
                ],
                removals: vec![
                    rem("really", 0.02, Confidence::High),
                    rem("very", 0.02, Confidence::Medium),
                ],
                insertions: vec![],
            },
        );

        // Clareza: remove qualificadores vazios
        rules.insert(
            "pragmatics/clarity".to_string(),
            AxisRules {
                substitutions: vec![sub(
                    "one might consider that",
                    "note that",
                    0.03,
                    Confidence::Medium,
                )],
                removals: vec![
                    rem("basically", 0.03, Confidence::High),
                    rem("sort of", 0.03, Confidence::High),
                    rem("kind of", 0.03, Confidence::High),
                ],
                insertions: vec![],
            },
        );

        Self { rules }
    }

    /// Gera candidatos para um pack/eixo.
    ///
    /// Garantias: candidatos dedupe-ados, razão de mudança filtrada
    /// contra o máximo, ordenados por confiança decrescente. Regras de
    /// alta confiança de remoção também são combinadas num único passe.
    pub fn candidates(
        &self,
        text: &str,
        pack: &str,
        axis: &str,
        min_confidence: Confidence,
        max_change_ratio: f64,
    ) -> Vec<TransformationCandidate> {
        let key = format!("{pack}/{axis}");
        let axis_rules = match self.rules.get(&key) {
            Some(r) => r,
            None => {
                warn!("sem regras para {key}");
                return Vec::new();
            }
        };

        let mut candidates: Vec<(TransformationCandidate, f64)> = Vec::new();
        let mut push = |cand_text: String, rule_desc: String, confidence: Confidence, delta: f64| {
            if cand_text == text {
                return;
            }
            candidates.push((
                TransformationCandidate {
                    text: cand_text,
                    source: CandidateSource::Rule {
                        description: rule_desc,
                        confidence,
                    },
                    confidence: confidence.prior(),
                },
                delta,
            ));
        };

        // Regras individuais
        for rule in axis_rules.all() {
            if rule.confidence < min_confidence {
                continue;
            }
            if let Some(transformed) = rule.apply(text) {
                push(
                    transformed,
                    rule.describe(),
                    rule.confidence,
                    rule.expected_delta,
                );
            }
        }

        // Remoções de alta confiança combinadas num passe só
        let high_removals: Vec<&Rule> = axis_rules
            .removals
            .iter()
            .filter(|r| r.confidence == Confidence::High)
            .collect();
        if high_removals.len() > 1 {
            let mut combined = text.to_string();
            let mut applied = Vec::new();
            let mut delta_sum = 0.0;
            for rule in &high_removals {
                if let Some(next) = rule.apply(&combined) {
                    if next != combined {
                        if let RuleKind::Removal { word } = &rule.kind {
                            applied.push(word.clone());
                        }
                        delta_sum += rule.expected_delta;
                        combined = next;
                    }
                }
            }
            if applied.len() > 1 {
                push(
                    combined,
                    format!("remove: {}", applied.join(", ")),
                    Confidence::High,
                    delta_sum,
                );
            }
        }

        drop(push);

        // Dedupe por texto, filtro de razão de mudança
        let mut seen = std::collections::HashSet::new();
        let mut filtered: Vec<(TransformationCandidate, f64)> = candidates
            .into_iter()
            .filter(|(c, _)| seen.insert(c.text.clone()))
            .filter(|(c, _)| text_change_ratio(text, &c.text) <= max_change_ratio)
            .collect();

        // Confiança decrescente, delta esperado como desempate
        filtered.sort_by(|(a, da), (b, db)| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(db.partial_cmp(da).unwrap_or(std::cmp::Ordering::Equal))
        });

        filtered.into_iter().map(|(c, _)| c).collect()
    }
}

/// Estratégia rule-based: gera candidatos do rule set compartilhado
#[derive(Debug, Clone)]
pub struct RuleBasedStrategy {
    rules: Arc<RuleSet>,
}

impl RuleBasedStrategy {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl CandidateGenerator for RuleBasedStrategy {
    async fn generate(
        &self,
        ctx: &TransformationContext,
        n: usize,
        _temperature: f64,
    ) -> Result<Vec<TransformationCandidate>> {
        // Primeiro batch só alta confiança; retries abrem para medium
        let min_confidence = if n <= ctx.num_candidates {
            Confidence::High
        } else {
            Confidence::Medium
        };

        let mut candidates = self.rules.candidates(
            &ctx.text,
            &ctx.pack_name,
            &ctx.target_axis,
            min_confidence,
            ctx.max_change_ratio,
        );
        candidates.truncate(n);
        Ok(candidates)
    }

    fn strategy_tag(&self) -> &'static str {
        "rules"
    }

    fn estimated_cost(&self, _ctx: &TransformationContext) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trm_common::Readings;

    fn dummy_readings() -> Readings {
        Readings::from_pairs(vec![
            ("A".to_string(), 0.25),
            ("¬A".to_string(), 0.25),
            ("both".to_string(), 0.25),
            ("neither".to_string(), 0.25),
        ])
    }

    #[test]
    fn test_removal_hedging() {
        // Cenário canônico: remover "I think" preserva o resto
        let text = "I think the main issue is that we're not clearly defining our goals.";
        let result = apply_removal(text, "I think").unwrap();
        assert_eq!(
            result,
            "The main issue is that we're not clearly defining our goals."
        );
    }

    #[test]
    fn test_removal_case_insensitive() {
        let result = apply_removal("Maybe we should go.", "maybe").unwrap();
        assert_eq!(result, "We should go.");
    }

    #[test]
    fn test_removal_declines_without_match() {
        assert!(apply_removal("No hedging here.", "maybe").is_none());
    }

    #[test]
    fn test_substitution_first_occurrence_only() {
        let result = apply_substitution("It might be X and might be Y.", "might be", "is").unwrap();
        assert_eq!(result, "It is X and might be Y.");
    }

    #[test]
    fn test_substitution_word_boundary() {
        // "can" não deve casar dentro de "cannot"
        assert!(apply_substitution("We cannot do this.", "can", "may").is_none());
    }

    #[test]
    fn test_insertion_after_modal() {
        let result = apply_insertion("We should consider this.", "not").unwrap();
        assert_eq!(result, "We should not consider this.");
    }

    #[test]
    fn test_insertion_declines_without_modal() {
        assert!(apply_insertion("There is no modal here.", "not").is_none());
    }

    #[test]
    fn test_candidates_ranked_and_deduped() {
        let rules = RuleSet::builtin();
        let text = "I think maybe the data shows something.";
        let candidates = rules.candidates(text, "tetralemma", "A", Confidence::Medium, 0.4);

        assert!(!candidates.is_empty());

        // Dedupe
        let mut seen = std::collections::HashSet::new();
        for c in &candidates {
            assert!(seen.insert(c.text.clone()), "candidato duplicado: {}", c.text);
        }

        // Ordenação por confiança decrescente
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }

        // Razão de mudança respeitada
        for c in &candidates {
            assert!(text_change_ratio(text, &c.text) <= 0.4);
        }
    }

    #[test]
    fn test_combined_removals() {
        let rules = RuleSet::builtin();
        let text = "I think maybe perhaps this is fine.";
        let candidates = rules.candidates(text, "tetralemma", "A", Confidence::High, 0.5);

        // Deve existir um candidato com múltiplas remoções combinadas
        let combined = candidates.iter().find(|c| match &c.source {
            CandidateSource::Rule { description, .. } => description.contains(", "),
            _ => false,
        });
        assert!(combined.is_some(), "esperava candidato de remoções combinadas");
        let combined = combined.unwrap();
        assert!(!combined.text.to_lowercase().contains("i think"));
        assert!(!combined.text.to_lowercase().contains("maybe"));
        assert!(!combined.text.to_lowercase().contains("perhaps"));
    }

    #[test]
    fn test_unknown_axis_empty() {
        let rules = RuleSet::builtin();
        assert!(rules
            .candidates("text", "tetralemma", "unknown", Confidence::Low, 0.4)
            .is_empty());
    }

    #[tokio::test]
    async fn test_strategy_respects_n() {
        let strategy = RuleBasedStrategy::new(Arc::new(RuleSet::builtin()));
        let ctx = TransformationContext::new(
            "I think maybe perhaps this possibly shows something.",
            "tetralemma",
            "A",
            dummy_readings(),
        );
        let candidates = strategy.generate(&ctx, 2, 0.7).await.unwrap();
        assert!(candidates.len() <= 2);
    }

    #[test]
    fn test_ruleset_load_roundtrip() {
        let rules = RuleSet::builtin();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rules.json");
        std::fs::write(&path, serde_json::to_string_pretty(&rules.rules).unwrap()).unwrap();

        let loaded = RuleSet::load(&path).unwrap();
        assert_eq!(loaded.supported_axes(), rules.supported_axes());
    }

    #[test]
    fn test_ruleset_load_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rules.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(matches!(RuleSet::load(&path), Err(TrmError::Config(_))));
    }
}
