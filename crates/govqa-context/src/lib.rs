//! govqa-context
//!
//! Decides whether a user turn is smalltalk (no retrieval needed) and whether
//! it depends on earlier turns (history should be sent to the model).

pub mod rules;

use std::collections::HashSet;

use govqa_core::{preview, ChatMessage, Role};

use crate::rules::{Verdict, CLARIFICATION, DOMAIN_KEYWORDS, GREETINGS, STOPWORDS, TRAILING_PUNCT, WORD};

pub const DEFAULT_WINDOW: usize = 2;

const SHORT_SMALLTALK_CHARS: usize = 5;
const SHORT_FOLLOWUP_CHARS: usize = 10;
const MIN_SHARED_KEYWORDS: usize = 2;

/// Why [`ContextClassifier::classify`] reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NoHistory,
    Smalltalk,
    ShortQuery,
    Rule(&'static str),
    Clarification(&'static str),
    TopicContinuity,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub followup: bool,
    pub reason: Reason,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextClassifier {
    window: usize,
}

impl Default for ContextClassifier {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

impl ContextClassifier {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn is_smalltalk(&self, query: &str) -> bool {
        is_smalltalk(query)
    }

    pub fn is_followup(&self, query: &str, history: &[ChatMessage]) -> bool {
        self.classify(query, history).followup
    }

    pub fn classify(&self, query: &str, history: &[ChatMessage]) -> Classification {
        let verdict = |followup, reason| Classification { followup, reason };

        if history.is_empty() {
            return verdict(false, Reason::NoHistory);
        }
        if is_smalltalk(query) {
            return verdict(false, Reason::Smalltalk);
        }

        let lowered = query.trim().to_lowercase();
        if lowered.chars().count() < SHORT_FOLLOWUP_CHARS {
            return verdict(true, Reason::ShortQuery);
        }

        if let Some(rule) = rules::first_match(&lowered) {
            tracing::debug!(rule = rule.tag, "matched context rule");
            return match rule.verdict {
                Verdict::FollowUp => verdict(true, Reason::Rule(rule.tag)),
                Verdict::Standalone if CLARIFICATION.is_match(&lowered) => {
                    verdict(true, Reason::Clarification(rule.tag))
                }
                Verdict::Standalone => verdict(false, Reason::Rule(rule.tag)),
            };
        }

        if self.has_topic_continuity(&lowered, history) {
            return verdict(true, Reason::TopicContinuity);
        }
        verdict(false, Reason::Default)
    }

    /// Logs the decision; used by the orchestrator to gate history.
    pub fn should_use_history(&self, query: &str, history: &[ChatMessage]) -> bool {
        let c = self.classify(query, history);
        tracing::info!(
            query = %preview(query, 50),
            history = history.len(),
            use_history = c.followup,
            reason = ?c.reason,
            "context analysis"
        );
        c.followup
    }

    /// True when the query shares at least two keywords with one of the last
    /// `window` user turns.
    fn has_topic_continuity(&self, lowered: &str, history: &[ChatMessage]) -> bool {
        let query_keywords = extract_keywords(lowered);
        if query_keywords.len() < MIN_SHARED_KEYWORDS {
            return false;
        }
        history
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .take(self.window)
            .any(|m| {
                let shared = extract_keywords(&m.content).intersection(&query_keywords).count();
                if shared >= MIN_SHARED_KEYWORDS {
                    tracing::debug!(shared, "topic continuity");
                }
                shared >= MIN_SHARED_KEYWORDS
            })
    }
}

/// Greeting, thanks, farewell or acknowledgement; or a query under five
/// characters with no domain keyword.
pub fn is_smalltalk(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    let normalized = TRAILING_PUNCT.replace(&lowered, "");
    let normalized = normalized.trim();

    if GREETINGS.iter().any(|p| p.is_match(normalized)) {
        tracing::debug!(query = %preview(query, 30), "greeting or smalltalk");
        return true;
    }
    if normalized.chars().count() < SHORT_SMALLTALK_CHARS
        && !DOMAIN_KEYWORDS.iter().any(|kw| normalized.contains(kw))
    {
        tracing::debug!(query = %preview(query, 30), "very short query without domain keywords");
        return true;
    }
    false
}

pub fn is_followup(query: &str, history: &[ChatMessage]) -> bool {
    ContextClassifier::default().is_followup(query, history)
}

/// Lowercase word tokens of at least three characters, minus stopwords.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}
