//! In-memory entity store with write-through persistence
//!
//! Projects and sessions live most-recently-created-first. Every entity
//! mutation stamps the touched entity and rewrites the whole snapshot;
//! selection pointers are runtime-only and never persisted.

pub mod persist;

use chrono::Utc;
use parking_lot::Mutex;
use shared::model::{ChatMessage, ChatSession, FileNode, Project, Role, ViewMode};
use shared::scaffold::ScaffoldSpec;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use persist::{Snapshot, SnapshotFile, SCHEMA_VERSION};

/// Store handle shared between the command loop and the async workflows.
/// Every mutation happens under this one lock; nothing holds it across an
/// await.
pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no project with id {0}")]
    ProjectNotFound(Uuid),
    #[error("no file with id {0} in that project")]
    FileNotFound(Uuid),
    #[error("no session with id {0}")]
    SessionNotFound(Uuid),
}

pub struct Store {
    projects: Vec<Project>,
    sessions: Vec<ChatSession>,
    active_project_id: Option<Uuid>,
    active_session_id: Option<Uuid>,
    active_file_id: Option<Uuid>,
    view_mode: ViewMode,
    slot: SnapshotFile,
}

impl Store {
    /// Read the persisted snapshot. Called once, before anything else.
    pub fn load(slot: SnapshotFile) -> Self {
        let snapshot = slot.load();
        Self {
            projects: snapshot.projects,
            sessions: snapshot.sessions,
            active_project_id: None,
            active_session_id: None,
            active_file_id: None,
            view_mode: ViewMode::default(),
            slot,
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // --- creation ---------------------------------------------------------

    /// New handcrafted project, inserted newest-first.
    pub fn create_project(&mut self, name: &str) -> Project {
        let project = Project::handcrafted(name);
        self.projects.insert(0, project.clone());
        self.persist();
        project
    }

    /// Insert a project built from a validated scaffold reply. This is the
    /// only way AI-generated projects enter the store.
    pub fn create_scaffolded_project(&mut self, name: &str, spec: ScaffoldSpec) -> Project {
        let project = Project::from_scaffold(name, spec);
        self.projects.insert(0, project.clone());
        self.persist();
        project
    }

    pub fn create_session(&mut self, title: &str) -> ChatSession {
        let session = ChatSession::new(title);
        self.sessions.insert(0, session.clone());
        self.persist();
        session
    }

    // --- mutation ---------------------------------------------------------

    /// Replace one file's content. Every other file and project is left
    /// untouched.
    pub fn update_file_content(
        &mut self,
        project_id: Uuid,
        file_id: Uuid,
        content: &str,
    ) -> Result<(), StoreError> {
        let project = self
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        let file = project
            .file_mut(file_id)
            .ok_or(StoreError::FileNotFound(file_id))?;
        file.content = content.to_string();
        project.last_modified = Utc::now();
        self.persist();
        Ok(())
    }

    /// Append to a session transcript; returns the stored message.
    pub fn add_message(
        &mut self,
        session_id: Uuid,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let message = ChatMessage::new(role, content);
        session.push_message(message.clone());
        self.persist();
        Ok(message)
    }

    // --- selection --------------------------------------------------------
    // Pointer updates only. Ids are not checked here: a dangling pointer
    // resolves to None later, and none of this is persisted.

    pub fn set_active_project(&mut self, id: Option<Uuid>) {
        self.active_project_id = id;
    }

    pub fn set_active_session(&mut self, id: Option<Uuid>) {
        self.active_session_id = id;
    }

    pub fn set_active_file(&mut self, id: Option<Uuid>) {
        self.active_file_id = id;
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    // --- reads ------------------------------------------------------------

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn project(&self, id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn session(&self, id: Uuid) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// The selected project, or None when the pointer is unset or dangling.
    pub fn active_project(&self) -> Option<&Project> {
        self.project(self.active_project_id?)
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.session(self.active_session_id?)
    }

    /// The explicitly selected file when it still exists in the active
    /// project, else that project's first file.
    pub fn active_file(&self) -> Option<&FileNode> {
        let project = self.active_project()?;
        self.active_file_id
            .and_then(|id| project.file(id))
            .or_else(|| project.files.first())
    }

    // --- search -----------------------------------------------------------

    /// Case-insensitive containment match on project names.
    pub fn find_projects(&self, query: &str) -> Vec<&Project> {
        let needle = query.to_lowercase();
        self.projects
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Case-insensitive containment match on session titles.
    pub fn find_sessions(&self, query: &str) -> Vec<&ChatSession> {
        let needle = query.to_lowercase();
        self.sessions
            .iter()
            .filter(|s| s.title.to_lowercase().contains(&needle))
            .collect()
    }

    // --- persistence ------------------------------------------------------

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SCHEMA_VERSION,
            projects: self.projects.clone(),
            sessions: self.sessions.clone(),
        }
    }

    /// Write-through save. Failures are logged and absorbed; the next
    /// mutation rewrites the whole snapshot anyway.
    fn persist(&self) {
        if let Err(e) = self.slot.save(&self.snapshot()) {
            warn!("snapshot save failed: {e:#}");
        }
    }

    /// Explicit save for shutdown, where a swallowed error would be the
    /// last chance to notice.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.slot.save(&self.snapshot())
    }
}
