use crate::error::{DocChatError, GenerationError, SessionError};
use crate::generation::{AnswerGenerator, FragmentSink};
use crate::retrieval::RetrievalPlanner;
use crate::store::DocumentStore;
use crate::types::{ConversationTurn, DocumentId, PassageRef, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Processing state of a session
///
/// A new question is accepted only in Idle or Error; Retrieving and
/// Generating reject with Busy, which is what serializes turns without a
/// lock around the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Retrieving,
    Generating,
    Error,
}

/// One record in the streamed answer
#[derive(Debug)]
pub enum AnswerEvent {
    Fragment(String),
    Completed { cited_passages: Vec<PassageRef> },
    Failed { error: DocChatError },
}

/// Consumer side of a streamed answer
///
/// Finite: ends with Completed or Failed, or closes without either when
/// the question was cancelled.
#[derive(Debug)]
pub struct AnswerStream {
    rx: mpsc::Receiver<AnswerEvent>,
}

impl AnswerStream {
    /// Next event, or None once the stream is exhausted
    pub async fn next_event(&mut self) -> Option<AnswerEvent> {
        self.rx.recv().await
    }
}

enum PipelineEnd {
    Completed(Vec<PassageRef>),
    Cancelled,
    Failed(DocChatError),
}

struct SessionInner {
    state: SessionState,
    turns: Vec<ConversationTurn>,
    next_seq: u64,
    cancel: Option<CancellationToken>,
}

/// Stateful per-document chat session
///
/// Owns the ordered turn history and orchestrates retrieval and
/// generation for one question at a time. The document is re-resolved at
/// each pipeline stage so a concurrent deletion fails fast instead of
/// answering from stale data. Cloning yields a handle to the same
/// session; the turn history and state are shared.
#[derive(Clone)]
pub struct ChatSession {
    id: SessionId,
    document_id: DocumentId,
    store: Arc<DocumentStore>,
    planner: Arc<RetrievalPlanner>,
    generator: Arc<dyn AnswerGenerator>,
    inner: Arc<Mutex<SessionInner>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("document_id", &self.document_id)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(
        id: SessionId,
        document_id: DocumentId,
        store: Arc<DocumentStore>,
        planner: Arc<RetrievalPlanner>,
        generator: Arc<dyn AnswerGenerator>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        let next_seq = turns.last().map(|t| t.seq + 1).unwrap_or(0);
        Self {
            id,
            document_id,
            store,
            planner,
            generator,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                turns,
                next_seq,
                cancel: None,
            })),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session lock poisoned").state
    }

    /// Snapshot of the turn history
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.inner
            .lock()
            .expect("session lock poisoned")
            .turns
            .clone()
    }

    /// Submit a question, returning the streamed answer
    ///
    /// Rejected with Busy while a previous question is in flight. A
    /// session parked in Error by a failed generation is reset here; the
    /// new question proceeds normally. The user turn is appended before
    /// retrieval starts, so it survives cancellation.
    pub fn ask(&self, question: &str) -> Result<AnswerStream, SessionError> {
        match self.store.document(&self.document_id) {
            Some(doc) if doc.status.is_ready() => {}
            _ => return Err(SessionError::DocumentUnavailable),
        }

        let question = question.trim().to_string();
        let (history, cancel) = {
            let mut inner = self.inner.lock().expect("session lock poisoned");
            match inner.state {
                SessionState::Retrieving | SessionState::Generating => {
                    return Err(SessionError::Busy);
                }
                SessionState::Error => {
                    tracing::debug!(session = %self.id, "resetting errored session");
                    inner.state = SessionState::Idle;
                }
                SessionState::Idle => {}
            }

            // History as the planner sees it: everything before this question
            let history = inner.turns.clone();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.turns.push(ConversationTurn::user(question.clone(), seq));
            inner.state = SessionState::Retrieving;

            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            (history, cancel)
        };
        self.persist_turns();

        let (tx, rx) = mpsc::channel(32);
        let session = self.clone();
        tokio::spawn(async move {
            let end = session
                .run_pipeline(question, history, cancel, tx.clone())
                .await;
            match end {
                PipelineEnd::Completed(cited_passages) => {
                    let _ = tx.send(AnswerEvent::Completed { cited_passages }).await;
                }
                PipelineEnd::Cancelled => {}
                PipelineEnd::Failed(error) => {
                    let _ = tx.send(AnswerEvent::Failed { error }).await;
                }
            }
        });

        Ok(AnswerStream { rx })
    }

    /// Cancel the in-flight question, if any
    ///
    /// No-op unless the session is Retrieving or Generating. Cancellation
    /// is cooperative: the pipeline stops between fragments, discards the
    /// in-flight assistant turn, and returns the session to Idle.
    pub fn cancel(&self) -> bool {
        let inner = self.inner.lock().expect("session lock poisoned");
        match inner.state {
            SessionState::Retrieving | SessionState::Generating => {
                if let Some(cancel) = &inner.cancel {
                    tracing::info!(session = %self.id, "cancelling in-flight question");
                    cancel.cancel();
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    async fn run_pipeline(
        &self,
        question: String,
        history: Vec<ConversationTurn>,
        cancel: CancellationToken,
        tx: mpsc::Sender<AnswerEvent>,
    ) -> PipelineEnd {
        // Retrieval
        let Some(data) = self.store.document_data(&self.document_id) else {
            return self.fail(SessionError::DocumentUnavailable.into());
        };

        let planner = Arc::clone(&self.planner);
        let plan_question = question.clone();
        let plan_history = history.clone();
        let retrieval = tokio::task::spawn_blocking(move || {
            planner.plan(&plan_question, &plan_history, &data)
        })
        .await;

        let retrieval = match retrieval {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => return self.fail(err),
            Err(join_err) => return self.fail(DocChatError::other(join_err.to_string())),
        };

        if cancel.is_cancelled() {
            self.set_state(SessionState::Idle);
            return PipelineEnd::Cancelled;
        }

        // The document may have been deleted while we were retrieving
        if self.store.document(&self.document_id).is_none() {
            return self.fail(SessionError::DocumentUnavailable.into());
        }

        self.set_state(SessionState::Generating);
        tracing::debug!(
            session = %self.id,
            passages = retrieval.passages.len(),
            in_scope = retrieval.in_scope,
            "starting generation"
        );

        // Generation: forward fragments to the consumer while accumulating
        // the partial answer for the Error path
        let (gen_tx, mut gen_rx) = mpsc::channel::<String>(32);
        let sink = FragmentSink::new(gen_tx, cancel.clone());
        let generator = Arc::clone(&self.generator);
        let gen_question = question.clone();
        let gen_history = history;
        let passages = retrieval.passages;
        let gen_task = tokio::spawn(async move {
            generator
                .generate(&gen_question, &gen_history, &passages, &sink)
                .await
        });

        let mut partial = String::new();
        while let Some(fragment) = gen_rx.recv().await {
            partial.push_str(&fragment);
            if tx.send(AnswerEvent::Fragment(fragment)).await.is_err() {
                // Consumer went away; treat as cancellation
                cancel.cancel();
            }
        }

        let outcome = gen_task
            .await
            .unwrap_or_else(|e| Err(GenerationError::Interrupted(e.to_string())));

        match outcome {
            Ok(cited) => {
                {
                    let mut inner = self.inner.lock().expect("session lock poisoned");
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner
                        .turns
                        .push(ConversationTurn::assistant(partial, cited.clone(), seq));
                    inner.state = SessionState::Idle;
                    inner.cancel = None;
                }
                self.persist_turns();
                PipelineEnd::Completed(cited)
            }
            Err(_) if cancel.is_cancelled() => {
                // Discard the in-flight assistant turn entirely
                self.set_state(SessionState::Idle);
                PipelineEnd::Cancelled
            }
            Err(err) => {
                // Preserve whatever was produced before the failure
                {
                    let mut inner = self.inner.lock().expect("session lock poisoned");
                    if !partial.is_empty() {
                        let seq = inner.next_seq;
                        inner.next_seq += 1;
                        inner
                            .turns
                            .push(ConversationTurn::assistant(partial, Vec::new(), seq));
                    }
                    inner.state = SessionState::Error;
                    inner.cancel = None;
                }
                self.persist_turns();
                tracing::warn!(session = %self.id, error = %err, "generation failed");
                PipelineEnd::Failed(err.into())
            }
        }
    }

    fn fail(&self, error: DocChatError) -> PipelineEnd {
        tracing::warn!(session = %self.id, error = %error, "pipeline failed");
        self.set_state(SessionState::Error);
        PipelineEnd::Failed(error)
    }

    fn set_state(&self, state: SessionState) {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        inner.state = state;
        if matches!(state, SessionState::Idle | SessionState::Error) {
            inner.cancel = None;
        }
    }

    fn persist_turns(&self) {
        let turns = self.history();
        if let Err(err) = self.store.save_turns(&self.id, &self.document_id, turns) {
            tracing::warn!(session = %self.id, error = %err, "failed to persist turns");
        }
    }
}

/// Registry of live sessions over a shared store and pipeline
pub struct SessionRegistry {
    store: Arc<DocumentStore>,
    planner: Arc<RetrievalPlanner>,
    generator: Arc<dyn AnswerGenerator>,
    sessions: RwLock<HashMap<SessionId, Arc<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<DocumentStore>,
        planner: Arc<RetrievalPlanner>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            store,
            planner,
            generator,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session bound to one document
    pub fn create(&self, document_id: DocumentId) -> Result<Arc<ChatSession>, SessionError> {
        if self.store.document(&document_id).is_none() {
            return Err(SessionError::DocumentUnavailable);
        }

        let session = Arc::new(ChatSession::new(
            SessionId::generate(),
            document_id,
            Arc::clone(&self.store),
            Arc::clone(&self.planner),
            Arc::clone(&self.generator),
            Vec::new(),
        ));

        let mut sessions = self.sessions.write().expect("registry lock poisoned");
        sessions.insert(session.id().clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Look up a live session, reviving a persisted history if needed
    pub fn get(&self, id: &SessionId) -> Option<Arc<ChatSession>> {
        {
            let sessions = self.sessions.read().expect("registry lock poisoned");
            if let Some(session) = sessions.get(id) {
                return Some(Arc::clone(session));
            }
        }

        // Recovered from a previous run: rebuild the session around its
        // persisted history
        let document_id = self.store.session_document(id)?;
        let turns = self.store.load_turns(id).unwrap_or_default();
        let session = Arc::new(ChatSession::new(
            id.clone(),
            document_id,
            Arc::clone(&self.store),
            Arc::clone(&self.planner),
            Arc::clone(&self.generator),
            turns,
        ));

        let mut sessions = self.sessions.write().expect("registry lock poisoned");
        let entry = sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::clone(&session));
        Some(Arc::clone(entry))
    }
}
