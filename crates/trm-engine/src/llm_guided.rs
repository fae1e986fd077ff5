//! Estratégia guiada por LLM - transformações de mudança mínima
//!
//! Monta um prompt com: o texto original e seus limites de tamanho
//! (±20% em caracteres), a descrição do eixo alvo em linguagem neutra
//! de domínio, até 2 exemplares do corpus, as leituras atuais com o
//! eixo dominante destacado, e instruções explícitas proibindo rewrite
//! total e meta-comentário na saída.
//!
//! O parse da resposta remove prefixos meta ("Here is…"), aspas
//! envolventes e qualquer parágrafo de comentário depois de linha em
//! branco.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use trm_common::{Result, TrmError};
use trm_core::load_axis_examples;
use trm_llm::{generate_with_retry, LlmProvider};

use crate::context::{CandidateSource, TransformationCandidate, TransformationContext};
use crate::gfs::CandidateGenerator;

/// Retries internos por geração retryable
const GENERATION_RETRIES: u32 = 2;

/// Quantos exemplares do corpus entram no prompt
const NUM_EXEMPLARS: usize = 2;

/// Descrição de um eixo em instruções linguísticas concretas
pub fn axis_meaning(pack: &str, axis: &str) -> String {
    let meaning = match (pack, axis) {
        ("tetralemma", "A") => {
            "Be definite - remove hedging ('could be argued', 'might'). Use direct statements with strong verbs"
        }
        ("tetralemma", "¬A") => {
            "Be critical - use direct negations: 'isn't', 'not really', 'doesn't'. Question claims, be skeptical"
        }
        ("tetralemma", "both") => {
            "Embrace paradox - use 'both...and', show contradictions existing together"
        }
        ("tetralemma", "neither") => {
            "Be transcendent - avoid binaries, use abstract language and philosophical framing"
        }
        ("tone", "analytical") => {
            "Be analytical - use words like 'systematic', 'investigate', 'structures', 'analyze'. Logical and precise"
        }
        ("tone", "critical") => {
            "Be critical - question assumptions, point out problems, skeptical stance"
        }
        ("tone", "empathic") => {
            "Be empathic - use 'we', 'you', 'understand'. Make it personal and relational"
        }
        ("tone", "playful") => {
            "Be playful - use 'imagine', 'think of it as'. Use metaphors and analogies"
        }
        ("tone", "neutral") => "Be neutral - third-person, balanced, objective presentation",
        ("ontology", "corporeal") => {
            "Focus on the physical - sensory language, bodily descriptions, material details"
        }
        ("ontology", "subjective") => {
            "Be subjective - first-person, personal experience, 'I feel/think'"
        }
        ("ontology", "objective") => {
            "Be objective - third-person, measurable facts, observer-independent language"
        }
        ("ontology", "mixed_frame") => {
            "Use multiple perspectives - switch viewpoints, acknowledge different frames"
        }
        ("pragmatics", "clarity") => {
            "Be clear - remove ALL hedging ('could', 'might', 'possibly'). Short, simple, direct statements"
        }
        ("pragmatics", "coherence") => {
            "Improve flow - smooth transitions, logical connections, consistent reasoning"
        }
        ("pragmatics", "evidence") => {
            "Add evidence - use 'studies', 'research', 'evidence'. Cite data, give examples"
        }
        ("pragmatics", "charity") => {
            "Be charitable - 'to be fair...', steelman arguments, acknowledge strengths"
        }
        ("audience", "expert") => {
            "Write for experts - precise technical terminology, dense, assumes knowledge"
        }
        ("audience", "general") => {
            "Write for general readers - replace jargon with everyday words, use 'how', 'what', 'why'"
        }
        ("audience", "student") => {
            "Write for students - step-by-step, clear definitions, pedagogical approach"
        }
        ("audience", "policy") => {
            "Write for policymakers - action-oriented, implications, concrete recommendations"
        }
        ("audience", "editorial") => {
            "Write as editorial - strong voice, persuasive arguments, call to action"
        }
        _ => return format!("Shift the text toward the '{axis}' stance"),
    };
    meaning.to_string()
}

/// Monta o prompt de transformação de mudança mínima
pub fn build_prompt(ctx: &TransformationContext, exemplars: &[String]) -> String {
    let original_length = ctx.text.len();
    let min_length = (original_length as f64 * 0.8) as usize;
    let max_length = (original_length as f64 * 1.2) as usize;

    let dominant = ctx
        .current_readings
        .dominant()
        .map(|(axis, p)| format!("{axis} ({p:.2})"))
        .unwrap_or_else(|| "unknown".to_string());

    let readings_desc = ctx
        .current_readings
        .pairs()
        .iter()
        .map(|(axis, p)| format!("{axis}: {p:.2}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut examples_section = String::new();
    if !exemplars.is_empty() {
        examples_section.push_str("\nEXAMPLES OF TARGET STYLE:\n");
        for (i, example) in exemplars.iter().enumerate() {
            examples_section.push_str(&format!("{}. \"{}\"\n", i + 1, example));
        }
    }

    let focus = axis_meaning(&ctx.pack_name, &ctx.target_axis);

    format!(
        r#"Transform the text below using MINIMAL changes - preserve most words and structure.

=== ORIGINAL TEXT (DO NOT COMPLETELY REWRITE!) ===
{text}

Length: {original_length} characters
Current readings: {readings_desc} (dominant: {dominant})

=== TARGET ===
Shift toward: "{axis}"
Focus: {focus}
{examples_section}
=== TRANSFORMATION RULES ===

**CRITICAL**: Make MINIMAL changes only! You are NOT rewriting - you are making subtle shifts.

ALLOWED CHANGES (in order of preference):
1. Replace 1-3 key words with "{axis}" equivalents
2. Adjust hedging phrases ("I think" → remove, or "perhaps" → "evidence shows")
3. Change 1-2 verbs to stronger/weaker forms
4. Adjust tone markers without changing facts

FORBIDDEN:
- Complete rewrites or paraphrases
- Adding or removing entire clauses
- Changing length beyond {min_length}-{max_length} characters
- Changing the core facts or meaning
- Annotations, labels, or meta-commentary in the output

NOW TRANSFORM THIS TEXT BY CHANGING ONLY 1-3 WORDS:
"{text}"

OUTPUT:
Return ONLY the transformed text. No quotes, no explanations, no meta-commentary."#,
        text = ctx.text,
        axis = ctx.target_axis,
    )
}

/// Prefixos meta comuns que alguns modelos insistem em colocar
const META_PREFIXES: [&str; 5] = [
    "here is the transformed text:",
    "here's the transformation:",
    "transformed text:",
    "the transformed text is:",
    "the revised text:",
];

/// Marcadores de linha de meta-comentário
const META_MARKERS: [&str; 6] = [
    "note:",
    "explanation:",
    "reasoning:",
    "iteration:",
    "analysis:",
    "i have",
];

/// Limpa a resposta do LLM, extraindo só o texto transformado.
///
/// Retorna `None` se depois da limpeza não sobrar nada utilizável.
pub fn parse_llm_response(response: &str) -> Option<String> {
    let mut text = response.trim().to_string();

    // Remove prefixo meta, se houver
    for prefix in META_PREFIXES {
        if text.to_lowercase().starts_with(prefix) {
            text = text[prefix.len()..].trim_start_matches(':').trim().to_string();
            break;
        }
    }

    // Aspas envolventes
    text = text
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();

    // Comentário final separado por linha em branco
    if let Some(idx) = text.find("\n\n") {
        text = text[..idx].trim().to_string();
    }

    // Linhas de meta-comentário: corta na primeira
    let mut kept = Vec::new();
    for line in text.lines() {
        let lower = line.to_lowercase();
        if META_MARKERS.iter().any(|m| lower.trim_start().starts_with(m)) {
            break;
        }
        kept.push(line);
    }
    text = kept.join("\n").trim().to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Estratégia guiada por LLM: batch de decodificações independentes
/// variando a temperatura, respostas parseadas em candidatos.
pub struct LlmGuidedStrategy {
    provider: Arc<dyn LlmProvider>,
    corpus_dir: Option<PathBuf>,
}

impl LlmGuidedStrategy {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            corpus_dir: None,
        }
    }

    /// Habilita few-shot com exemplares de `{corpus_dir}/{pack}/{axis}.json`
    pub fn with_corpus_dir(mut self, corpus_dir: PathBuf) -> Self {
        self.corpus_dir = Some(corpus_dir);
        self
    }

    /// Amostra exemplares do corpus do eixo; falha silenciosa, few-shot
    /// é um enriquecimento opcional
    fn load_exemplars(&self, pack: &str, axis: &str) -> Vec<String> {
        let Some(dir) = &self.corpus_dir else {
            return Vec::new();
        };
        let path = dir.join(pack).join(format!("{axis}.json"));
        if !path.exists() {
            return Vec::new();
        }

        match load_axis_examples(&path) {
            Ok(examples) => {
                let mut rng = rand::thread_rng();
                examples
                    .choose_multiple(&mut rng, NUM_EXEMPLARS)
                    .cloned()
                    .collect()
            }
            Err(e) => {
                debug!("exemplares indisponíveis para {pack}/{axis}: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl CandidateGenerator for LlmGuidedStrategy {
    async fn generate(
        &self,
        ctx: &TransformationContext,
        n: usize,
        temperature: f64,
    ) -> Result<Vec<TransformationCandidate>> {
        let exemplars = self.load_exemplars(&ctx.pack_name, &ctx.target_axis);
        let prompt = build_prompt(ctx, &exemplars);

        let mut candidates = Vec::with_capacity(n);
        let mut last_err: Option<TrmError> = None;

        for i in 0..n {
            // Escada de temperatura: decodificações independentes e diversas
            let temp = (temperature + 0.15 * i as f64).min(1.2);

            match generate_with_retry(self.provider.as_ref(), &prompt, temp, GENERATION_RETRIES)
                .await
            {
                Ok(response) => {
                    if let Some(text) = parse_llm_response(&response) {
                        candidates.push(TransformationCandidate {
                            text,
                            source: CandidateSource::Llm {
                                temperature: temp,
                                model: self.provider.name().to_string(),
                            },
                            confidence: 0.5,
                        });
                    } else {
                        debug!("resposta do LLM sem texto utilizável (temp {temp:.2})");
                    }
                }
                Err(e @ TrmError::ProviderUnavailable(_)) => {
                    // Backend fora: não adianta insistir no batch
                    return Err(e);
                }
                Err(e) => {
                    warn!("geração falhou (temp {temp:.2}): {e}");
                    last_err = Some(e);
                }
            }
        }

        if candidates.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        Ok(candidates)
    }

    fn strategy_tag(&self) -> &'static str {
        "llm"
    }

    fn estimated_cost(&self, ctx: &TransformationContext) -> f64 {
        let prompt = build_prompt(ctx, &[]);
        self.provider.estimate_cost(&prompt) * ctx.num_candidates as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trm_common::Readings;
    use trm_llm::MockLlmProvider;

    fn ctx() -> TransformationContext {
        TransformationContext::new(
            "I think the main issue is that we're not clearly defining our goals.",
            "tetralemma",
            "A",
            Readings::from_pairs(vec![
                ("A".to_string(), 0.3),
                ("¬A".to_string(), 0.3),
                ("both".to_string(), 0.2),
                ("neither".to_string(), 0.2),
            ]),
        )
    }

    #[test]
    fn test_parse_strips_meta_prefix() {
        let parsed =
            parse_llm_response("Here is the transformed text: The issue is clear.").unwrap();
        assert_eq!(parsed, "The issue is clear.");
    }

    #[test]
    fn test_parse_strips_quotes() {
        assert_eq!(
            parse_llm_response("\"The issue is clear.\"").unwrap(),
            "The issue is clear."
        );
    }

    #[test]
    fn test_parse_drops_trailing_commentary() {
        let raw = "The issue is clear.\n\nThis transformation removes hedging and...";
        assert_eq!(parse_llm_response(raw).unwrap(), "The issue is clear.");
    }

    #[test]
    fn test_parse_drops_meta_lines() {
        let raw = "The issue is clear.\nNote: I removed the hedge.";
        assert_eq!(parse_llm_response(raw).unwrap(), "The issue is clear.");
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(parse_llm_response("   ").is_none());
        assert!(parse_llm_response("\"\"").is_none());
    }

    #[test]
    fn test_prompt_contains_constraints() {
        let ctx = ctx();
        let prompt = build_prompt(&ctx, &["Example sentence.".to_string()]);

        assert!(prompt.contains(&ctx.text));
        assert!(prompt.contains("MINIMAL"));
        assert!(prompt.contains("\"A\""));
        assert!(prompt.contains("Example sentence."));
        // Limites de tamanho ±20%
        let min = (ctx.text.len() as f64 * 0.8) as usize;
        assert!(prompt.contains(&min.to_string()));
    }

    #[test]
    fn test_axis_meaning_known_and_fallback() {
        assert!(axis_meaning("tone", "analytical").contains("systematic"));
        assert!(axis_meaning("custom", "mystery").contains("mystery"));
    }

    #[tokio::test]
    async fn test_generate_parses_candidates() {
        let provider = Arc::new(MockLlmProvider::with_responses(vec![
            "Here is the transformed text: The main issue is clear.".to_string(),
            "\"The main issue stands.\"".to_string(),
        ]));
        let strategy = LlmGuidedStrategy::new(provider);

        let candidates = strategy.generate(&ctx(), 2, 0.7).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "The main issue is clear.");
        assert_eq!(candidates[1].text, "The main issue stands.");

        // Cada candidato carrega sua temperatura
        match &candidates[1].source {
            CandidateSource::Llm { temperature, model } => {
                assert!(*temperature > 0.7);
                assert_eq!(model, "mock");
            }
            _ => panic!("esperava proveniência Llm"),
        }
    }

    #[tokio::test]
    async fn test_generate_surfaces_unavailable() {
        let provider = Arc::new(MockLlmProvider::failing_with(
            TrmError::ProviderUnavailable("backend fora".to_string()),
        ));
        let strategy = LlmGuidedStrategy::new(provider);

        let err = strategy.generate(&ctx(), 3, 0.7).await.unwrap_err();
        assert!(matches!(err, TrmError::ProviderUnavailable(_)));
    }
}
