//! The operations behind Astra's buttons.
//!
//! Scaffolding, chat turns, and the file assistant all follow the same
//! shape: claim a flight slot, talk to the gateway, and apply the result
//! through the store only if nothing cancelled the flight in the meantime.
//! The store lock is never held across an await.

pub mod flight;
pub mod prompts;

pub use flight::{FlightKey, FlightTable, Ticket};
pub use prompts::RefactorKind;

use providers::gateway::{Gateway, FALLBACK_REPLY};
use shared::chat_api::ChatMessage as WireMessage;
use shared::model::{Project, Role};
use std::sync::Arc;
use store::{SharedStore, StoreError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("a project scaffold is already in progress")]
    ScaffoldInFlight,
    #[error("an AI edit is already running for this file")]
    FileInFlight,
    #[error("a reply is already streaming in this session")]
    SessionInFlight,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the file assistant reports after a refactor attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistFeedback {
    pub applied: bool,
    pub message: String,
}

pub struct Workflows {
    store: SharedStore,
    gateway: Arc<Gateway>,
    flights: FlightTable,
}

impl Workflows {
    pub fn new(store: SharedStore, gateway: Arc<Gateway>) -> Self {
        Self {
            store,
            gateway,
            flights: FlightTable::new(),
        }
    }

    /// Whether a scaffold is currently in flight.
    pub fn is_generating(&self) -> bool {
        self.flights.is_busy(FlightKey::Scaffold)
    }

    /// Create a project. With a prompt the scaffold model designs the
    /// files; without one a handcrafted starter is used. `Ok(None)` means
    /// the scaffold failed and nothing was created.
    pub async fn create_project(
        &self,
        name: &str,
        prompt: Option<&str>,
    ) -> Result<Option<Project>, WorkflowError> {
        match prompt {
            Some(prompt) if !prompt.trim().is_empty() => self.scaffold_project(name, prompt).await,
            _ => Ok(Some(self.store.lock().create_project(name))),
        }
    }

    async fn scaffold_project(
        &self,
        name: &str,
        prompt: &str,
    ) -> Result<Option<Project>, WorkflowError> {
        let ticket = self
            .flights
            .begin(FlightKey::Scaffold)
            .ok_or(WorkflowError::ScaffoldInFlight)?;

        let spec = match self.gateway.scaffold(prompt).await {
            Some(spec) => spec,
            None => return Ok(None),
        };
        if !ticket.is_current() {
            return Ok(None);
        }

        let project = self.store.lock().create_scaffolded_project(name, spec);
        info!(
            "scaffolded \"{}\" with {} files",
            project.name,
            project.files.len()
        );
        Ok(Some(project))
    }

    /// One turn of conversation. The user message is committed before the
    /// model runs, so it survives any failure; the assistant message is
    /// exactly what the stream resolved to, with the canned fallback
    /// standing in when the stream broke. A cancelled turn appends no
    /// assistant message and resolves empty.
    pub async fn chat_turn(
        &self,
        session_id: Uuid,
        content: &str,
        on_chunk: impl FnMut(&str),
    ) -> Result<String, WorkflowError> {
        let ticket = self
            .flights
            .begin(FlightKey::Session(session_id))
            .ok_or(WorkflowError::SessionInFlight)?;

        // One lock for the pre-turn history and the user append, so no
        // other mutation can slip between them.
        let history: Vec<WireMessage> = {
            let mut store = self.store.lock();
            let session = store
                .session(session_id)
                .ok_or(StoreError::SessionNotFound(session_id))?;
            let history = session
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect();
            store.add_message(session_id, Role::User, content)?;
            history
        };

        let reply = self.gateway.generate_stream(content, &history, on_chunk).await;

        if !ticket.is_current() {
            return Ok(String::new());
        }
        let reply = if reply.is_empty() {
            FALLBACK_REPLY.to_string()
        } else {
            reply
        };
        self.store
            .lock()
            .add_message(session_id, Role::Assistant, &reply)?;
        Ok(reply)
    }

    /// Run one of the canned refactor actions against a file. The new code
    /// is written back only when the call succeeds and nobody cancelled
    /// the flight while it ran.
    pub async fn refactor_file(
        &self,
        project_id: Uuid,
        file_id: Uuid,
        kind: RefactorKind,
    ) -> Result<AssistFeedback, WorkflowError> {
        let (_, code) = self.file_content(project_id, file_id)?;
        let ticket = self
            .flights
            .begin(FlightKey::File(file_id))
            .ok_or(WorkflowError::FileInFlight)?;

        let new_code = self.gateway.refactor_code(&code, kind.instruction()).await;

        match new_code {
            Some(new_code) if ticket.is_current() => {
                self.store
                    .lock()
                    .update_file_content(project_id, file_id, &new_code)?;
                Ok(AssistFeedback {
                    applied: true,
                    message: format!(
                        "Task complete: {} applied successfully.",
                        kind.display_name()
                    ),
                })
            }
            _ => Ok(AssistFeedback {
                applied: false,
                message: "AI failed to process. Try again.".to_string(),
            }),
        }
    }

    /// Ask the model what a file does. Read-only feedback; shares the
    /// per-file flight slot with the refactor actions.
    pub async fn explain_file(
        &self,
        project_id: Uuid,
        file_id: Uuid,
    ) -> Result<String, WorkflowError> {
        let (name, code) = self.file_content(project_id, file_id)?;
        let _ticket = self
            .flights
            .begin(FlightKey::File(file_id))
            .ok_or(WorkflowError::FileInFlight)?;

        let reply = self
            .gateway
            .generate(&prompts::explain_prompt(&name, &code), &[], None)
            .await;
        if reply.is_empty() {
            return Ok("Failed to explain.".to_string());
        }
        Ok(reply)
    }

    pub fn cancel_scaffold(&self) {
        self.flights.cancel(FlightKey::Scaffold);
    }

    pub fn cancel_file(&self, file_id: Uuid) {
        self.flights.cancel(FlightKey::File(file_id));
    }

    pub fn cancel_chat(&self, session_id: Uuid) {
        self.flights.cancel(FlightKey::Session(session_id));
    }

    fn file_content(
        &self,
        project_id: Uuid,
        file_id: Uuid,
    ) -> Result<(String, String), WorkflowError> {
        let store = self.store.lock();
        let project = store
            .project(project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        let file = project
            .file(file_id)
            .ok_or(StoreError::FileNotFound(file_id))?;
        Ok((file.name.clone(), file.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use providers::gateway::STREAM_ERROR_REPLY;
    use providers::gemini::{RequestConfig, TextModel};
    use shared::chat_api::{ChatMessage, StreamChunk};
    use store::persist::SnapshotFile;
    use store::Store;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::sync::Notify;

    const SCAFFOLD_REPLY: &str = r#"{"description":"A weather app","files":[{"name":"index.html","content":"<p>w</p>","language":"html"}]}"#;

    /// Replies immediately with a fixed script.
    struct ScriptedModel {
        reply: &'static str,
        chunks: &'static [&'static str],
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
        ) -> anyhow::Result<String> {
            Ok(self.reply.to_string())
        }

        async fn generate_stream(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
            tx: UnboundedSender<StreamChunk>,
        ) -> anyhow::Result<()> {
            for chunk in self.chunks {
                let _ = tx.send(StreamChunk::Text(chunk.to_string()));
            }
            let _ = tx.send(StreamChunk::Done);
            Ok(())
        }
    }

    /// Fails every call.
    struct FailingModel;

    #[async_trait]
    impl TextModel for FailingModel {
        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
        ) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("no backend"))
        }

        async fn generate_stream(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
            _tx: UnboundedSender<StreamChunk>,
        ) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("no backend"))
        }
    }

    /// Stalls until released, so a test can hold an operation in flight.
    struct GatedModel {
        started: Arc<Notify>,
        release: Arc<Notify>,
        reply: &'static str,
    }

    #[async_trait]
    impl TextModel for GatedModel {
        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
        ) -> anyhow::Result<String> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(self.reply.to_string())
        }

        async fn generate_stream(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &RequestConfig,
            tx: UnboundedSender<StreamChunk>,
        ) -> anyhow::Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            let _ = tx.send(StreamChunk::Text(self.reply.to_string()));
            let _ = tx.send(StreamChunk::Done);
            Ok(())
        }
    }

    /// Records the conversation it was asked to continue.
    struct RecordingModel {
        seen: parking_lot::Mutex<Vec<ChatMessage>>,
        chunks: &'static [&'static str],
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        async fn generate(
            &self,
            messages: Vec<ChatMessage>,
            _config: &RequestConfig,
        ) -> anyhow::Result<String> {
            *self.seen.lock() = messages;
            Ok(String::new())
        }

        async fn generate_stream(
            &self,
            messages: Vec<ChatMessage>,
            _config: &RequestConfig,
            tx: UnboundedSender<StreamChunk>,
        ) -> anyhow::Result<()> {
            *self.seen.lock() = messages;
            for chunk in self.chunks {
                let _ = tx.send(StreamChunk::Text(chunk.to_string()));
            }
            let _ = tx.send(StreamChunk::Done);
            Ok(())
        }
    }

    fn shared_store(dir: &tempfile::TempDir) -> SharedStore {
        Store::load(SnapshotFile::at(dir.path().join("data.json"))).into_shared()
    }

    fn workflows(
        store: &SharedStore,
        chat: Arc<dyn TextModel>,
        scaffold: Arc<dyn TextModel>,
    ) -> Workflows {
        Workflows::new(
            Arc::clone(store),
            Arc::new(Gateway::with_models(chat, scaffold)),
        )
    }

    #[tokio::test]
    async fn test_create_project_without_prompt_is_handcrafted() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));

        let project = wf.create_project("Demo", None).await.unwrap().unwrap();
        assert_eq!(project.files.len(), 3);
        assert_eq!(store.lock().projects().len(), 1);
    }

    #[tokio::test]
    async fn test_scaffold_success_inserts_the_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(
            &store,
            Arc::new(FailingModel),
            Arc::new(ScriptedModel {
                reply: SCAFFOLD_REPLY,
                chunks: &[],
            }),
        );

        let project = wf
            .create_project("AI Project", Some("a weather app"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.description, "A weather app");
        let store = store.lock();
        assert_eq!(store.projects().len(), 1);
        assert_eq!(store.projects()[0].id, project.id);
    }

    #[tokio::test]
    async fn test_scaffold_failure_leaves_the_collection_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));

        let outcome = wf
            .create_project("AI Project", Some("a weather app"))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.lock().projects().is_empty());
        assert!(!wf.is_generating());
    }

    #[tokio::test]
    async fn test_concurrent_scaffolds_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let wf = workflows(
            &store,
            Arc::new(FailingModel),
            Arc::new(GatedModel {
                started: started.clone(),
                release: release.clone(),
                reply: SCAFFOLD_REPLY,
            }),
        );

        let first = wf.create_project("One", Some("an app"));
        let second = async {
            started.notified().await;
            assert!(wf.is_generating());
            let refused = wf.create_project("Two", Some("another app")).await;
            release.notify_one();
            refused
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.unwrap().is_some());
        assert!(matches!(second, Err(WorkflowError::ScaffoldInFlight)));
        assert_eq!(store.lock().projects().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_turn_appends_user_and_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(
            &store,
            Arc::new(ScriptedModel {
                reply: "",
                chunks: &["Hi", " there"],
            }),
            Arc::new(FailingModel),
        );
        let session = store.lock().create_session("New Discussion");

        let mut seen = Vec::new();
        let reply = wf
            .chat_turn(session.id, "Hello", |text| seen.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Hi there");
        assert_eq!(seen, ["Hi", "Hi there"]);
        let store = store.lock();
        let messages = &store.session(session.id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hi there");
    }

    #[tokio::test]
    async fn test_chat_turn_streams_over_the_pre_turn_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let model = Arc::new(RecordingModel {
            seen: parking_lot::Mutex::new(Vec::new()),
            chunks: &["ok"],
        });
        let wf = workflows(&store, model.clone(), Arc::new(FailingModel));
        let session = store.lock().create_session("New Discussion");
        store
            .lock()
            .add_message(session.id, Role::User, "One")
            .unwrap();
        store
            .lock()
            .add_message(session.id, Role::Assistant, "Two")
            .unwrap();

        wf.chat_turn(session.id, "Three", |_| {}).await.unwrap();

        let seen = model.seen.lock();
        let turns: Vec<(&str, &str)> = seen
            .iter()
            .map(|m| (m.role.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            [("user", "One"), ("assistant", "Two"), ("user", "Three")]
        );
    }

    #[tokio::test]
    async fn test_chat_turn_failure_records_the_fallback_reply() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));
        let session = store.lock().create_session("New Discussion");

        let mut seen = Vec::new();
        let reply = wf
            .chat_turn(session.id, "Hello", |text| seen.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(seen, [STREAM_ERROR_REPLY]);
        let store = store.lock();
        let messages = &store.session(session.id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_chat_turn_unknown_session_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));

        let missing = Uuid::new_v4();
        let result = wf.chat_turn(missing, "Hello", |_| {}).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Store(StoreError::SessionNotFound(_)))
        ));
        assert!(store.lock().sessions().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_chat_keeps_user_drops_assistant() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let wf = workflows(
            &store,
            Arc::new(GatedModel {
                started: started.clone(),
                release: release.clone(),
                reply: "late",
            }),
            Arc::new(FailingModel),
        );
        let session = store.lock().create_session("New Discussion");

        let turn = wf.chat_turn(session.id, "Hello", |_| {});
        let canceller = async {
            started.notified().await;
            wf.cancel_chat(session.id);
            release.notify_one();
        };
        let (reply, ()) = tokio::join!(turn, canceller);

        assert_eq!(reply.unwrap(), "");
        let store = store.lock();
        let messages = &store.session(session.id).unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello");
    }

    #[tokio::test]
    async fn test_second_chat_turn_in_a_session_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let wf = workflows(
            &store,
            Arc::new(GatedModel {
                started: started.clone(),
                release: release.clone(),
                reply: "First reply",
            }),
            Arc::new(FailingModel),
        );
        let session = store.lock().create_session("New Discussion");

        let first = wf.chat_turn(session.id, "Hello", |_| {});
        let second = async {
            started.notified().await;
            let refused = wf.chat_turn(session.id, "Interrupt", |_| {}).await;
            release.notify_one();
            refused
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), "First reply");
        assert!(matches!(second, Err(WorkflowError::SessionInFlight)));
        let store = store.lock();
        let messages = &store.session(session.id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].content, "First reply");
    }

    #[tokio::test]
    async fn test_refactor_success_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(
            &store,
            Arc::new(ScriptedModel {
                reply: "console.log(2);",
                chunks: &[],
            }),
            Arc::new(FailingModel),
        );
        let project = store.lock().create_project("Demo");
        let file = project.file_by_name("main.js").unwrap().id;

        let feedback = wf
            .refactor_file(project.id, file, RefactorKind::Optimize)
            .await
            .unwrap();

        assert!(feedback.applied);
        assert_eq!(
            feedback.message,
            "Task complete: Optimize applied successfully."
        );
        let store = store.lock();
        assert_eq!(
            store.project(project.id).unwrap().file(file).unwrap().content,
            "console.log(2);"
        );
    }

    #[tokio::test]
    async fn test_refactor_failure_leaves_the_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));
        let project = store.lock().create_project("Demo");
        let file = project.file_by_name("main.js").unwrap();

        let feedback = wf
            .refactor_file(project.id, file.id, RefactorKind::FindBugs)
            .await
            .unwrap();

        assert!(!feedback.applied);
        assert_eq!(feedback.message, "AI failed to process. Try again.");
        let store = store.lock();
        assert_eq!(
            store
                .project(project.id)
                .unwrap()
                .file(file.id)
                .unwrap()
                .content,
            file.content
        );
    }

    #[tokio::test]
    async fn test_cancelled_refactor_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let wf = workflows(
            &store,
            Arc::new(GatedModel {
                started: started.clone(),
                release: release.clone(),
                reply: "sabotaged();",
            }),
            Arc::new(FailingModel),
        );
        let project = store.lock().create_project("Demo");
        let file = project.file_by_name("main.js").unwrap();

        let refactor = wf.refactor_file(project.id, file.id, RefactorKind::Optimize);
        let canceller = async {
            started.notified().await;
            wf.cancel_file(file.id);
            release.notify_one();
        };
        let (feedback, ()) = tokio::join!(refactor, canceller);

        assert!(!feedback.unwrap().applied);
        let store = store.lock();
        assert_eq!(
            store
                .project(project.id)
                .unwrap()
                .file(file.id)
                .unwrap()
                .content,
            file.content
        );
    }

    #[tokio::test]
    async fn test_explain_shares_the_file_flight_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let wf = workflows(
            &store,
            Arc::new(GatedModel {
                started: started.clone(),
                release: release.clone(),
                reply: "done();",
            }),
            Arc::new(FailingModel),
        );
        let project = store.lock().create_project("Demo");
        let file = project.file_by_name("main.js").unwrap().id;

        let refactor = wf.refactor_file(project.id, file, RefactorKind::Optimize);
        let explain = async {
            started.notified().await;
            let refused = wf.explain_file(project.id, file).await;
            release.notify_one();
            refused
        };
        let (refactor, explain) = tokio::join!(refactor, explain);

        assert!(refactor.unwrap().applied);
        assert!(matches!(explain, Err(WorkflowError::FileInFlight)));
    }

    #[tokio::test]
    async fn test_explain_returns_text_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(
            &store,
            Arc::new(ScriptedModel {
                reply: "It logs a line.",
                chunks: &[],
            }),
            Arc::new(FailingModel),
        );
        let project = store.lock().create_project("Demo");
        let file = project.file_by_name("main.js").unwrap();

        let text = wf.explain_file(project.id, file.id).await.unwrap();

        assert_eq!(text, "It logs a line.");
        let store = store.lock();
        assert_eq!(
            store
                .project(project.id)
                .unwrap()
                .file(file.id)
                .unwrap()
                .content,
            file.content
        );
    }

    #[tokio::test]
    async fn test_refactor_unknown_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared_store(&dir);
        let wf = workflows(&store, Arc::new(FailingModel), Arc::new(FailingModel));
        let project = store.lock().create_project("Demo");

        let result = wf
            .refactor_file(project.id, Uuid::new_v4(), RefactorKind::Optimize)
            .await;
        assert!(matches!(
            result,
            Err(WorkflowError::Store(StoreError::FileNotFound(_)))
        ));
    }
}
