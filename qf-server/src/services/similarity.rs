//! Duplicate-question detection and topic extraction
//!
//! The matcher compares an incoming question against the canonical doubts of
//! one session and returns those judged similar, most relevant first. Scoring
//! is delegated to a [`MatchPolicy`] so the comparison strategy can be swapped
//! without touching the ledger.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use qf_common::config::MatchPolicyKind;
use qf_common::models::Doubt;
use qf_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db;

/// Topic recorded when no keyword can be extracted
pub const FALLBACK_TOPIC: &str = "General";

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "an", "and", "any", "are", "as", "at", "be", "between", "but", "by", "can",
        "could", "difference", "do", "does", "doubt", "explain", "for", "from", "get", "have",
        "how", "i", "if", "in", "into", "is", "it", "its", "me", "mean", "means", "my", "not",
        "of", "on", "or", "please", "question", "so", "some", "than", "that", "the", "then",
        "there", "these", "this", "to", "understand", "use", "used", "using", "we", "what",
        "when", "where", "which", "why", "will", "with", "work", "works", "would", "you",
    ]
    .into_iter()
    .collect()
});

/// Lower-case, replace punctuation with spaces, collapse whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content words of a question: normalized tokens minus stopwords
pub fn content_tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Best-effort keyword for a question
///
/// The most frequent content word of at least three characters; ties go to
/// the word that appears first. Title-cased.
pub fn extract_topic(question: &str) -> String {
    let tokens: Vec<String> = content_tokens(question)
        .into_iter()
        .filter(|t| t.chars().count() >= 3)
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for token in &tokens {
        let count = counts[token.as_str()];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((token.as_str(), count));
        }
    }

    match best {
        Some((word, _)) => title_case(word),
        None => FALLBACK_TOPIC.to_string(),
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Scores how strongly a question duplicates an existing doubt (0.0-1.0)
///
/// Implementations must be deterministic and side-effect free.
pub trait MatchPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, question: &str, candidate: &Doubt) -> f64;
}

/// Lexical overlap of content words blended with Jaro-Winkler over them
///
/// Identical normalized text always scores 1.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalOverlap;

impl LexicalOverlap {
    /// Weighted combination: 50% token-set Jaccard + 50% Jaro-Winkler
    fn combine(jaccard: f64, fuzzy: f64) -> f64 {
        (jaccard * 0.5) + (fuzzy * 0.5)
    }
}

impl MatchPolicy for LexicalOverlap {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn score(&self, question: &str, candidate: &Doubt) -> f64 {
        if normalize(question) == normalize(&candidate.question) {
            return 1.0;
        }

        let a = content_tokens(question);
        let b = content_tokens(&candidate.question);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
        let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
        let shared = set_a.intersection(&set_b).count() as f64;
        let union = set_a.union(&set_b).count() as f64;
        let jaccard = shared / union;

        let fuzzy = strsim::jaro_winkler(&a.join(" "), &b.join(" "));
        Self::combine(jaccard, fuzzy)
    }
}

/// Topic-tag equality as a cheap proxy for intent
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicTag;

impl MatchPolicy for TopicTag {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn score(&self, question: &str, candidate: &Doubt) -> f64 {
        let topic = extract_topic(question);
        if topic != FALLBACK_TOPIC && topic.eq_ignore_ascii_case(&candidate.topic) {
            1.0
        } else {
            0.0
        }
    }
}

/// Finds existing canonical doubts that duplicate a new question
pub struct SimilarityMatcher {
    policy: Box<dyn MatchPolicy>,
    threshold: f64,
}

impl SimilarityMatcher {
    pub fn new(policy: Box<dyn MatchPolicy>, threshold: f64) -> Self {
        Self { policy, threshold }
    }

    pub fn from_config(kind: MatchPolicyKind, threshold: f64) -> Self {
        let policy: Box<dyn MatchPolicy> = match kind {
            MatchPolicyKind::Lexical => Box::new(LexicalOverlap),
            MatchPolicyKind::Topic => Box::new(TopicTag),
        };
        Self::new(policy, threshold)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Rank candidates against a question
    ///
    /// Merged (non-canonical) candidates are ignored. Result is ordered by
    /// score descending; equal scores go to the earliest-created doubt, then
    /// to the lowest identity, so the order never depends on input order.
    pub fn rank(&self, question: &str, candidates: Vec<Doubt>) -> Vec<Doubt> {
        let mut scored: Vec<(f64, Doubt)> = candidates
            .into_iter()
            .filter(Doubt::is_canonical)
            .map(|doubt| (self.policy.score(question, &doubt), doubt))
            .filter(|(score, _)| *score >= self.threshold)
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        scored.into_iter().map(|(_, doubt)| doubt).collect()
    }

    /// Canonical doubts in `session_id` similar to `question`, best first
    pub async fn find_similar(&self, db: &SqlitePool, session_id: &str, question: &str) -> Result<Vec<Doubt>> {
        let candidates = db::doubts::merge_candidates(db, session_id).await?;
        let considered = candidates.len();
        let matches = self.rank(question, candidates);
        debug!(
            session_id,
            policy = self.policy.name(),
            considered,
            matched = matches.len(),
            "similarity search"
        );
        Ok(matches)
    }
}
