/// End-to-end tests for the ingest-then-chat flow, using a deterministic
/// keyword embedder so no model download or network is involved.
use anyhow::Result;
use async_trait::async_trait;
use docchat::config::{ChunkingConfig, EmbeddingConfig, RetrievalConfig};
use docchat::embedding::Embedder;
use docchat::error::{EmbeddingError, GenerationError, SessionError};
use docchat::generation::{AnswerGenerator, ExtractiveGenerator, FragmentSink, FALLBACK_ANSWER};
use docchat::ingest::IngestPipeline;
use docchat::retrieval::RetrievalPlanner;
use docchat::session::{AnswerEvent, AnswerStream, SessionRegistry};
use docchat::store::DocumentStore;
use docchat::types::{
    ConversationTurn, Document, DocumentId, DocumentStatus, PageText, Passage, PassageRef,
    TurnRole,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let count = |word: &str| lower.matches(word).count() as f32;
                vec![
                    count("refund"),
                    count("shipping"),
                    count("warranty"),
                    0.1,
                ]
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "keyword-test"
    }
}

/// Generator that streams slowly so tests can interleave cancel and busy checks
struct SlowGenerator;

#[async_trait]
impl AnswerGenerator for SlowGenerator {
    async fn generate(
        &self,
        _question: &str,
        _history: &[ConversationTurn],
        passages: &[Passage],
        sink: &FragmentSink,
    ) -> Result<Vec<PassageRef>, GenerationError> {
        if passages.is_empty() {
            sink.emit(FALLBACK_ANSWER).await?;
            return Ok(Vec::new());
        }
        for i in 0..40 {
            sink.emit(format!("word-{} ", i)).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(passages.iter().map(|p| p.passage_ref()).collect())
    }
}

struct Harness {
    store: Arc<DocumentStore>,
    pipeline: Arc<IngestPipeline>,
    sessions: Arc<SessionRegistry>,
}

fn harness(generator: Arc<dyn AnswerGenerator>) -> Harness {
    let store = Arc::new(DocumentStore::in_memory());
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&embedder),
        Arc::clone(&store),
        ChunkingConfig {
            target_size: 96,
            overlap: 16,
        },
        EmbeddingConfig {
            model_name: "keyword-test".to_string(),
            batch_size: 4,
            max_retries: 2,
            retry_base_ms: 1,
        },
    ));

    let planner = Arc::new(RetrievalPlanner::new(
        embedder,
        RetrievalConfig {
            min_score: 0.5,
            top_k: 4,
            carry_score: 0.3,
        },
    ));
    let sessions = Arc::new(SessionRegistry::new(
        Arc::clone(&store),
        planner,
        generator,
    ));

    Harness {
        store,
        pipeline,
        sessions,
    }
}

async fn ingest_pages(h: &Harness, id: &str, owner: &str, pages: Vec<PageText>) -> Result<()> {
    h.store.register_ingesting(Document {
        id: DocumentId::from(id),
        owner: owner.to_string(),
        page_count: 0,
        status: DocumentStatus::Ingesting,
        content_hash: "test".to_string(),
        created_at: Utc::now(),
    })?;
    h.pipeline
        .index_pages(&DocumentId::from(id), pages)
        .await?;
    Ok(())
}

fn store_policy_pages() -> Vec<PageText> {
    vec![
        PageText {
            page_number: 1,
            text: "Welcome to our store. These are the general terms of service."
                .to_string(),
        },
        PageText {
            page_number: 2,
            text: "The refund policy allows returns within 30 days of a refund request."
                .to_string(),
        },
        PageText {
            page_number: 3,
            text: "Shipping is free for orders above fifty dollars.".to_string(),
        },
    ]
}

async fn drain(mut stream: AnswerStream) -> (String, Option<AnswerEvent>) {
    let mut text = String::new();
    while let Some(event) = stream.next_event().await {
        match event {
            AnswerEvent::Fragment(f) => text.push_str(&f),
            terminal => return (text, Some(terminal)),
        }
    }
    (text, None)
}

#[tokio::test]
async fn test_upload_then_ask_cites_the_right_page() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let doc = h.store.document(&DocumentId::from("d1")).unwrap();
    assert!(doc.status.is_ready());
    assert_eq!(doc.page_count, 3);

    let session = h.sessions.create(DocumentId::from("d1"))?;
    let stream = session.ask("what is the refund policy?").unwrap();
    let (answer, terminal) = drain(stream).await;

    assert!(answer.contains("refund policy"));
    assert!(answer.contains("(page 2)"));
    match terminal {
        Some(AnswerEvent::Completed { cited_passages }) => {
            assert!(!cited_passages.is_empty());
            assert!(cited_passages.iter().all(|c| c.page_number == 2));
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_out_of_scope_question_gets_fallback() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    let stream = session.ask("how do I bake sourdough bread?").unwrap();
    let (answer, terminal) = drain(stream).await;

    assert_eq!(answer, FALLBACK_ANSWER);
    match terminal {
        Some(AnswerEvent::Completed { cited_passages }) => assert!(cited_passages.is_empty()),
        other => panic!("expected Completed, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_no_cross_document_leakage() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;
    ingest_pages(
        &h,
        "d2",
        "bob",
        vec![PageText {
            page_number: 1,
            text: "The warranty covers manufacturing defects for two years.".to_string(),
        }],
    )
    .await?;

    // d1 has no warranty content; the answer must not borrow from d2
    let session = h.sessions.create(DocumentId::from("d1"))?;
    let stream = session.ask("what does the warranty cover?").unwrap();
    let (answer, _) = drain(stream).await;

    assert_eq!(answer, FALLBACK_ANSWER);
    assert!(!answer.contains("manufacturing defects"));
    Ok(())
}

#[tokio::test]
async fn test_second_question_while_busy_is_rejected() -> Result<()> {
    let h = harness(Arc::new(SlowGenerator));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    let mut stream = session.ask("what is the refund policy?").unwrap();
    let first = stream.next_event().await;
    assert!(matches!(first, Some(AnswerEvent::Fragment(_))));

    let err = session.ask("what about shipping?").unwrap_err();
    assert!(matches!(err, SessionError::Busy));

    session.cancel();
    drain(stream).await;
    Ok(())
}

#[tokio::test]
async fn test_cancel_keeps_question_discards_answer() -> Result<()> {
    let h = harness(Arc::new(SlowGenerator));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    let mut stream = session.ask("what is the refund policy?").unwrap();
    let first = stream.next_event().await;
    assert!(matches!(first, Some(AnswerEvent::Fragment(_))));

    assert!(session.cancel());
    let (_, terminal) = drain(stream).await;
    assert!(terminal.is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let history = session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, TurnRole::User);

    // The session accepts the next question after a cancel
    let stream = session.ask("what about shipping costs?").unwrap();
    drain(stream).await;
    Ok(())
}

#[tokio::test]
async fn test_history_ordering_is_monotonic_across_turns() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    for question in [
        "what is the refund policy?",
        "what are the shipping costs?",
        "is there a warranty?",
    ] {
        let stream = session.ask(question).unwrap();
        drain(stream).await;
    }

    let history = session.history();
    assert!(history.len() >= 4);
    for pair in history.windows(2) {
        assert!(pair[1].seq > pair[0].seq, "turn order must be monotonic");
    }

    // User and assistant turns alternate for completed questions
    assert_eq!(history[0].role, TurnRole::User);
    assert_eq!(history[1].role, TurnRole::Assistant);
    Ok(())
}

#[tokio::test]
async fn test_follow_up_question_stays_on_topic() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    let stream = session.ask("what is the refund policy?").unwrap();
    drain(stream).await;

    // "it" refers to the refund policy; rewriting recovers the topic
    let stream = session.ask("how long does it allow?").unwrap();
    let (answer, terminal) = drain(stream).await;

    assert!(answer.contains("(page 2)"), "follow-up resolved to the refund page: {}", answer);
    assert!(matches!(terminal, Some(AnswerEvent::Completed { .. })));
    Ok(())
}

#[tokio::test]
async fn test_deleted_document_rejects_new_questions() -> Result<()> {
    let h = harness(Arc::new(ExtractiveGenerator::new()));
    ingest_pages(&h, "d1", "alice", store_policy_pages()).await?;

    let session = h.sessions.create(DocumentId::from("d1"))?;
    h.store.delete_document(&DocumentId::from("d1"))?;

    let err = session.ask("what is the refund policy?").unwrap_err();
    assert!(matches!(err, SessionError::DocumentUnavailable));
    Ok(())
}

#[tokio::test]
async fn test_persisted_history_survives_restart() -> Result<()> {
    let dir = tempfile::TempDir::new()?;

    let session_id;
    {
        let store = Arc::new(DocumentStore::open(dir.path().to_path_buf())?);
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            ChunkingConfig {
                target_size: 96,
                overlap: 16,
            },
            EmbeddingConfig {
                model_name: "keyword-test".to_string(),
                batch_size: 4,
                max_retries: 2,
                retry_base_ms: 1,
            },
        ));
        store.register_ingesting(Document {
            id: DocumentId::from("d1"),
            owner: "alice".to_string(),
            page_count: 0,
            status: DocumentStatus::Ingesting,
            content_hash: "test".to_string(),
            created_at: Utc::now(),
        })?;
        pipeline
            .index_pages(&DocumentId::from("d1"), store_policy_pages())
            .await?;

        let planner = Arc::new(RetrievalPlanner::new(
            embedder,
            RetrievalConfig {
                min_score: 0.5,
                top_k: 4,
                carry_score: 0.3,
            },
        ));
        let sessions = SessionRegistry::new(store, planner, Arc::new(ExtractiveGenerator::new()));
        let session = sessions.create(DocumentId::from("d1"))?;
        session_id = session.id().clone();

        let stream = session.ask("what is the refund policy?").unwrap();
        drain(stream).await;
        assert_eq!(session.history().len(), 2);
    }

    // Fresh process: the document index and the session history come back
    let store = Arc::new(DocumentStore::open(dir.path().to_path_buf())?);
    assert!(store.document(&DocumentId::from("d1")).unwrap().status.is_ready());

    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder);
    let planner = Arc::new(RetrievalPlanner::new(
        embedder,
        RetrievalConfig {
            min_score: 0.5,
            top_k: 4,
            carry_score: 0.3,
        },
    ));
    let sessions = SessionRegistry::new(store, planner, Arc::new(ExtractiveGenerator::new()));
    let session = sessions.get(&session_id).expect("session recovered");

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "what is the refund policy?");
    assert_eq!(history[1].role, TurnRole::Assistant);

    // And the recovered session keeps working
    let stream = session.ask("what are the shipping costs?").unwrap();
    let (answer, _) = drain(stream).await;
    assert!(answer.contains("(page 3)"), "answer: {}", answer);
    Ok(())
}
