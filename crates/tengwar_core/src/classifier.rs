//! Keyword-driven content classification.
//!
//! Maps generated thoughts and inbound user messages to emotion events and
//! assigns thoughts an importance score. All word lists and weights live in
//! configuration; the defaults below are only a starting point.

use crate::emotion::EmotionEvent;
use serde::{Deserialize, Serialize};

/// If any keyword appears (case-insensitive substring), `event` fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub event: EmotionEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceBoost {
    pub keywords: Vec<String>,
    pub boost: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Checked in order against daemon output; first match wins.
    pub thought_rules: Vec<KeywordRule>,
    /// Event applied when no thought rule matches.
    pub thought_default: Option<EmotionEvent>,
    /// Checked in order against user messages; first match wins.
    pub message_rules: Vec<KeywordRule>,
    pub importance_base: f32,
    pub importance_boosts: Vec<ImportanceBoost>,
    /// Extra importance for thoughts containing a parenthesized expression.
    pub code_boost: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            thought_rules: vec![
                rule(&["discover", "realize", "insight", "idea"], EmotionEvent::NewDiscovery),
                rule(
                    &["improve", "better", "optimize", "fix", "edit", "update"],
                    EmotionEvent::SelfImprovement,
                ),
            ],
            thought_default: Some(EmotionEvent::DeepThought),
            message_rules: vec![
                rule(
                    &["thanks", "great", "awesome", "perfect", "love"],
                    EmotionEvent::UserPraise,
                ),
                rule(
                    &["frustrated", "annoyed", "broken", "wrong", "hate"],
                    EmotionEvent::UserFrustration,
                ),
            ],
            importance_base: 0.4,
            importance_boosts: vec![
                boost(&["important", "key", "critical", "breakthrough"], 0.2),
                boost(&["tengwar", "code", "build", "create"], 0.1),
                boost(&["user", "help"], 0.1),
            ],
            code_boost: 0.1,
        }
    }
}

fn rule(words: &[&str], event: EmotionEvent) -> KeywordRule {
    KeywordRule {
        keywords: words.iter().map(|w| w.to_string()).collect(),
        event,
    }
}

fn boost(words: &[&str], boost: f32) -> ImportanceBoost {
    ImportanceBoost {
        keywords: words.iter().map(|w| w.to_string()).collect(),
        boost,
    }
}

fn mentions_any(lower: &str, words: &[String]) -> bool {
    words
        .iter()
        .any(|w| !w.is_empty() && lower.contains(&w.to_lowercase()))
}

pub struct ContentClassifier {
    config: ClassifierConfig,
}

impl ContentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    fn first_match(rules: &[KeywordRule], text: &str) -> Option<EmotionEvent> {
        let lower = text.to_lowercase();
        rules
            .iter()
            .find(|r| mentions_any(&lower, &r.keywords))
            .map(|r| r.event)
    }

    pub fn classify_thought(&self, text: &str) -> Option<EmotionEvent> {
        Self::first_match(&self.config.thought_rules, text).or(self.config.thought_default)
    }

    pub fn classify_message(&self, text: &str) -> Option<EmotionEvent> {
        Self::first_match(&self.config.message_rules, text)
    }

    /// Importance in `[0, 1]`.
    pub fn importance(&self, text: &str) -> f32 {
        let lower = text.to_lowercase();
        let mut score = self.config.importance_base;
        for b in &self.config.importance_boosts {
            if mentions_any(&lower, &b.keywords) {
                score += b.boost;
            }
        }
        if text.contains('(') && text.contains(')') {
            score += self.config.code_boost;
        }
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
