use super::{emit_in_fragments, AnswerGenerator, FragmentSink, FALLBACK_ANSWER};
use crate::error::GenerationError;
use crate::types::{ConversationTurn, Passage, PassageRef, TurnRole};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Answer generator backed by an OpenAI-compatible chat completions API
///
/// The retrieved passages are injected as system context with an explicit
/// instruction to answer only from them. The completed answer is streamed
/// to the consumer in fragments; citations are the passages that were
/// offered as context.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    fn build_messages(
        question: &str,
        history: &[ConversationTurn],
        passages: &[Passage],
    ) -> Vec<ApiMessage> {
        let mut context = String::from(
            "Answer strictly from the document excerpts below. \
             If they do not contain the answer, reply exactly: \"",
        );
        context.push_str(FALLBACK_ANSWER);
        context.push_str("\"\n\nExcerpts:\n");
        for passage in passages {
            context.push_str(&format!("[page {}] {}\n", passage.page_number, passage.text));
        }

        let mut messages = vec![ApiMessage {
            role: "system".to_string(),
            content: context,
        }];

        // Recent turns keep follow-up questions coherent; cap to bound the prompt
        for turn in history.iter().rev().take(6).rev() {
            messages.push(ApiMessage {
                role: match turn.role {
                    TurnRole::User => "user".to_string(),
                    TurnRole::Assistant => "assistant".to_string(),
                },
                content: turn.text.clone(),
            });
        }

        messages.push(ApiMessage {
            role: "user".to_string(),
            content: question.to_string(),
        });

        messages
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        question: &str,
        history: &[ConversationTurn],
        passages: &[Passage],
        sink: &FragmentSink,
    ) -> Result<Vec<PassageRef>, GenerationError> {
        if passages.is_empty() {
            emit_in_fragments(sink, FALLBACK_ANSWER).await?;
            return Ok(Vec::new());
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::build_messages(question, history, passages),
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Unavailable(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Interrupted(e.to_string()))?;

        let choice = chat_response
            .choices
            .first()
            .ok_or_else(|| GenerationError::Unavailable("no choices returned".to_string()))?;

        // The model declined per the system instruction: no citations
        if choice.message.content.trim() == FALLBACK_ANSWER {
            emit_in_fragments(sink, FALLBACK_ANSWER).await?;
            return Ok(Vec::new());
        }

        emit_in_fragments(sink, &choice.message.content).await?;
        Ok(passages.iter().map(|p| p.passage_ref()).collect())
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn make_passage(idx: usize, page: usize, text: &str) -> Passage {
        Passage {
            document_id: DocumentId::from("doc-1"),
            passage_index: idx,
            page_number: page,
            text: text.to_string(),
            char_start: 0,
            char_end: text.chars().count(),
            embedding: vec![0.0; 4],
        }
    }

    #[test]
    fn test_prompt_contains_passages_and_instruction() {
        let passages = vec![make_passage(0, 2, "Refunds are accepted within 30 days.")];
        let messages = OpenAiGenerator::build_messages("what is the refund policy?", &[], &passages);

        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("[page 2]"));
        assert!(messages[0].content.contains(FALLBACK_ANSWER));
        assert_eq!(messages.last().unwrap().role, "user");
    }

    #[test]
    fn test_history_is_capped() {
        let history: Vec<ConversationTurn> = (0..20)
            .map(|i| ConversationTurn::user(format!("question {}", i), i))
            .collect();
        let passages = vec![make_passage(0, 1, "text")];
        let messages = OpenAiGenerator::build_messages("next?", &history, &passages);

        // system + 6 history turns + current question
        assert_eq!(messages.len(), 8);
        assert!(messages[1].content.contains("question 14"));
    }
}
