//! Prompt classifier — pure scoring of a prompt into a recommended
//! backend.
//!
//! No side effects, no I/O: given the same prompt and configuration the
//! result is identical, down to the tie break. Signals come from two
//! places:
//!
//! 1. weighted keyword membership across fixed category word lists
//!    (technical, analytical, complex, simple/conversational), and
//! 2. structural heuristics (length, word count, sentence count).
//!
//! Indicators feed a fixed weight matrix (one weight per indicator per
//! backend) on top of per-backend base scores; scores are normalized to
//! sum to one. The recommendation is the argmax, with ties broken by
//! the configured priority list — never by map iteration order. When no
//! indicator fires at all, the configured default backend is returned
//! instead of an arbitrary argmax over the flat base scores.

use std::collections::BTreeMap;

use serde::Serialize;

use switchboard_llm::BackendId;

/// Boolean signals derived from the prompt text.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Indicators {
    /// Long, multi-sentence, or carrying depth-of-analysis keywords.
    pub complex: bool,
    /// Mentions programming, science, medicine, finance, engineering.
    pub technical: bool,
    /// Asks for comparison, evaluation, causes, or justification.
    pub analytical: bool,
    /// Short conversational prompt with none of the heavier signals.
    pub simple: bool,
}

impl Indicators {
    fn any(self) -> bool {
        self.complex || self.technical || self.analytical || self.simple
    }
}

/// Result of one `classify` call. Created fresh per call, not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    /// The backend the router should try first.
    pub recommended: BackendId,
    /// Normalized gap between the top two scores, in `[0, 1]`.
    pub confidence: f32,
    /// Normalized per-backend scores (sum to one).
    pub model_scores: BTreeMap<BackendId, f32>,
    /// The boolean signals that produced the scores.
    pub indicators: Indicators,
}

// ---------------------------------------------------------------------------
// Category word lists
// ---------------------------------------------------------------------------

const COMPLEX_TERMS: &[&str] = &[
    "explique",
    "detalhe",
    "análise",
    "compare",
    "contraste",
    "discuta",
    "avalie",
    "critique",
    "sintetize",
    "filosófico",
    "profund",
    "complex",
    "abrangente",
];

const TECHNICAL_TERMS: &[&str] = &[
    // Programming / technology
    "código",
    "programa",
    "função",
    "api",
    "algoritmo",
    "cloud",
    "aws",
    "azure",
    "docker",
    "kubernetes",
    "linux",
    "servidor",
    "frontend",
    "backend",
    "devops",
    "javascript",
    "python",
    "java",
    "c++",
    "sql",
    "banco de dados",
    "framework",
    // Science
    "física",
    "química",
    "biologia",
    "matemática",
    "equação",
    "fórmula",
    "científic",
    "quantum",
    "átomo",
    "molecular",
    "genética",
    "célula",
    // Medicine
    "médic",
    "clínic",
    "doença",
    "patologia",
    "diagnóstico",
    "tratamento",
    "anatomia",
    "fisiologia",
    "cirurgia",
    "farmacologia",
    "terapia",
    // Finance / economics
    "finanças",
    "economi",
    "contabilidade",
    "mercado",
    "ações",
    "investimento",
    "bolsa",
    "juros",
    "fiscal",
    "tributári",
    "imposto",
    "lucro",
    // Engineering
    "engenhari",
    "estrutura",
    "mecânica",
    "elétrica",
    "construção",
    "torque",
];

const ANALYTICAL_TERMS: &[&str] = &[
    "analis",
    "compar",
    "contrast",
    "avali",
    "critic",
    "pros e contras",
    "vantagens",
    "desvantagens",
    "melhor",
    "pior",
    "recomend",
    "aconselharia",
    "por que",
    "razão",
    "causa",
    "efeito",
    "impacto",
    "consequência",
    "evidência",
    "argumento",
    "justific",
    "demonstr",
];

/// Per-backend base scores. GPT starts deliberately low — it is the
/// expensive last resort in the canonical ordering.
const BASE_SCORES: &[(&str, f32)] = &[
    ("gemini", 0.3),
    ("mistral", 0.3),
    ("deepseek", 0.3),
    ("gpt", 0.1),
];

/// The weight matrix: indicator → per-backend weight additions.
const WEIGHTS: &[(IndicatorKind, &[(&str, f32)])] = &[
    (IndicatorKind::Complex, &[("deepseek", 0.3), ("gpt", 0.2)]),
    (IndicatorKind::Technical, &[("mistral", 0.3), ("deepseek", 0.2)]),
    (IndicatorKind::Analytical, &[("gpt", 0.1), ("deepseek", 0.2)]),
    (IndicatorKind::Simple, &[("gemini", 0.3), ("mistral", 0.2)]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndicatorKind {
    Complex,
    Technical,
    Analytical,
    Simple,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// The prompt classifier component.
pub struct Classifier {
    candidates: Vec<BackendId>,
    priority: Vec<BackendId>,
    default_backend: BackendId,
}

impl Classifier {
    /// Build a classifier over the available backends.
    ///
    /// `candidates` are the backends that participate in scoring (only
    /// configured ones belong here), `priority` breaks score ties, and
    /// `default_backend` is returned when no indicator fires.
    #[must_use]
    pub fn new(
        candidates: Vec<BackendId>,
        priority: Vec<BackendId>,
        default_backend: BackendId,
    ) -> Self {
        Self {
            candidates,
            priority,
            default_backend,
        }
    }

    /// Classify a prompt. Deterministic, side-effect free.
    #[must_use]
    pub fn classify(&self, prompt: &str) -> ClassificationResult {
        let indicators = derive_indicators(prompt);

        let mut scores: BTreeMap<BackendId, f32> = BTreeMap::new();
        for (name, base) in BASE_SCORES {
            let id = BackendId::new(*name);
            if self.candidates.contains(&id) {
                scores.insert(id, *base);
            }
        }
        if scores.is_empty() {
            // Nothing configured at all: recommend the default so the
            // executor can report a coherent trace.
            return ClassificationResult {
                recommended: self.default_backend.clone(),
                confidence: 1.0,
                model_scores: scores,
                indicators,
            };
        }

        for (kind, additions) in WEIGHTS {
            let fired = match kind {
                IndicatorKind::Complex => indicators.complex,
                IndicatorKind::Technical => indicators.technical,
                IndicatorKind::Analytical => indicators.analytical,
                IndicatorKind::Simple => indicators.simple,
            };
            if fired {
                for (name, weight) in *additions {
                    if let Some(score) = scores.get_mut(&BackendId::new(*name)) {
                        *score += weight;
                    }
                }
            }
        }

        let total: f32 = scores.values().sum();
        for score in scores.values_mut() {
            *score /= total;
        }

        let recommended = if indicators.any() {
            self.argmax(&scores)
        } else {
            self.default_backend.clone()
        };
        let confidence = self.confidence(&scores);

        ClassificationResult {
            recommended,
            confidence,
            model_scores: scores,
            indicators,
        }
    }

    /// Argmax with ties broken by the fixed priority list.
    fn argmax(&self, scores: &BTreeMap<BackendId, f32>) -> BackendId {
        let top = scores
            .values()
            .fold(f32::NEG_INFINITY, |acc, s| acc.max(*s));
        for id in &self.priority {
            if let Some(score) = scores.get(id) {
                if (*score - top).abs() < f32::EPSILON {
                    return id.clone();
                }
            }
        }
        // A tied winner outside the priority list: BTreeMap order keeps
        // this branch deterministic too.
        scores
            .iter()
            .find(|(_, s)| (**s - top).abs() < f32::EPSILON)
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| self.default_backend.clone())
    }

    /// Normalized gap between the top two scores; 1.0 with one candidate.
    fn confidence(&self, scores: &BTreeMap<BackendId, f32>) -> f32 {
        if scores.len() <= 1 {
            return 1.0;
        }
        let mut sorted: Vec<f32> = scores.values().copied().collect();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let top = sorted[0];
        if top <= 0.0 {
            return 0.0;
        }
        ((top - sorted[1]) / top).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Indicator derivation
// ---------------------------------------------------------------------------

fn derive_indicators(prompt: &str) -> Indicators {
    let lower = prompt.to_lowercase();
    let char_count = lower.chars().count();
    let word_count = lower.split_whitespace().count();
    let sentence_count = lower.matches(['.', '!', '?']).count();

    let has_complex_term = COMPLEX_TERMS.iter().any(|t| lower.contains(t));
    let complex_signals = usize::from(char_count > 300)
        + usize::from(word_count > 50)
        + usize::from(sentence_count > 3)
        + usize::from(has_complex_term);
    let complex = complex_signals >= 2;

    let technical = TECHNICAL_TERMS.iter().any(|t| lower.contains(t));
    let analytical = ANALYTICAL_TERMS.iter().any(|t| lower.contains(t));

    // Simple needs a real brevity signal, not just the absence of the
    // heavier categories; otherwise every uncategorized prompt would
    // count as simple and the all-zero vector could never occur.
    let brevity_signals = usize::from(char_count < 100)
        + usize::from(word_count < 20)
        + usize::from(sentence_count <= 1);
    let simple_signals = brevity_signals
        + usize::from(!complex)
        + usize::from(!technical)
        + usize::from(!analytical);
    let simple = brevity_signals >= 1 && simple_signals >= 3;

    Indicators {
        complex,
        technical,
        analytical,
        simple,
    }
}
