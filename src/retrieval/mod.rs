use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::DocChatError;
use crate::index::MAX_TOP_K;
use crate::store::DocumentData;
use crate::types::{ConversationTurn, Passage, PassageRef, RetrievalResult, TurnRole};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Decides what to retrieve and whether a question is answerable from the document
///
/// The planner only ever sees one document's data; cross-document leakage is
/// impossible by construction because each document owns its own index.
pub struct RetrievalPlanner {
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalPlanner {
    pub fn new(embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self { embedder, config }
    }

    /// Select context passages for a question
    ///
    /// Embeds the question (rewritten against recent turns when it looks
    /// like a follow-up), queries the document index, and applies the
    /// minimum-similarity threshold. Previously cited passages that still
    /// score above the carry threshold stay in context so follow-up
    /// questions remain grounded in earlier answers.
    pub fn plan(
        &self,
        question: &str,
        history: &[ConversationTurn],
        data: &DocumentData,
    ) -> Result<RetrievalResult, DocChatError> {
        let query_text = rewrite_question(question, history);
        if query_text != question {
            tracing::debug!(original = question, rewritten = %query_text, "rewrote follow-up question");
        }

        let query_vector = self.embedder.embed(&query_text)?;
        let hits = data.index.query(&query_vector, self.config.top_k)?;

        let mut selected: Vec<PassageRef> = hits
            .into_iter()
            .filter(|(_, score)| *score >= self.config.min_score)
            .map(|(passage, _)| passage)
            .collect();

        if selected.is_empty() {
            tracing::debug!(question, "no passage cleared the similarity threshold");
            return Ok(RetrievalResult::out_of_scope());
        }

        // Keep earlier citations that are still relevant to this question
        for cited in previous_citations(history) {
            if selected.len() >= MAX_TOP_K {
                break;
            }
            if selected.contains(&cited) {
                continue;
            }
            match data.index.similarity(&query_vector, &cited) {
                Some(score) if score >= self.config.carry_score => selected.push(cited),
                _ => {}
            }
        }

        let passages: Vec<Passage> = selected
            .iter()
            .filter_map(|r| resolve_passage(data, r))
            .collect();

        Ok(RetrievalResult {
            passages,
            in_scope: true,
        })
    }
}

fn resolve_passage(data: &DocumentData, passage_ref: &PassageRef) -> Option<Passage> {
    data.passages
        .iter()
        .find(|p| p.passage_index == passage_ref.passage_index)
        .cloned()
}

/// Citations from the most recent assistant turn, in cited order
fn previous_citations(history: &[ConversationTurn]) -> Vec<PassageRef> {
    history
        .iter()
        .rev()
        .find(|turn| turn.role == TurnRole::Assistant)
        .map(|turn| turn.cited_passages.clone())
        .unwrap_or_default()
}

/// Resolve pronouns and elliptical follow-ups against the previous question
///
/// "what about chapter 2?" on its own embeds poorly; prefixing the previous
/// user question recovers the referent. This is a heuristic, not NLU: short
/// questions and questions with anaphoric pronouns get the previous user
/// turn prepended.
fn rewrite_question(question: &str, history: &[ConversationTurn]) -> String {
    let Some(previous) = history
        .iter()
        .rev()
        .find(|turn| turn.role == TurnRole::User)
    else {
        return question.to_string();
    };

    static PRONOUNS: OnceLock<Regex> = OnceLock::new();
    let pronouns = PRONOUNS.get_or_init(|| {
        Regex::new(r"(?i)\b(it|this|that|these|those|they|them|its|their|he|she)\b")
            .expect("pronoun regex is valid")
    });

    let word_count = question.split_whitespace().count();
    if pronouns.is_match(question) || word_count < 4 {
        format!("{}\n{}", previous.text, question)
    } else {
        question.to_string()
    }
}
