//! Core entities for the Astra workspace
//!
//! Projects hold generated web files; sessions hold chat transcripts.
//! Everything is created through the store so ids and timestamps stay
//! consistent across the app.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scaffold::ScaffoldSpec;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single source file inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    /// Display hint ("html", "css", "javascript"); not validated.
    pub language: String,
}

impl FileNode {
    pub fn new(name: &str, content: &str, language: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            content: content.to_string(),
            language: language.to_string(),
        }
    }
}

/// A workspace project and its files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub files: Vec<FileNode>,
    pub last_modified: DateTime<Utc>,
}

impl Project {
    /// The three-file starter every non-AI project begins with.
    pub fn handcrafted(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: "Handcrafted project".to_string(),
            files: vec![
                FileNode::new(
                    "index.html",
                    "<!-- Build something amazing -->\n<div id=\"root\">Hello Astra!</div>",
                    "html",
                ),
                FileNode::new(
                    "styles.css",
                    "body { font-family: sans-serif; background: #0f172a; color: white; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; }",
                    "css",
                ),
                FileNode::new("main.js", "console.log(\"Astra Agent ready.\");", "javascript"),
            ],
            last_modified: Utc::now(),
        }
    }

    /// Build a project from a validated scaffold reply. Every file
    /// descriptor gets a fresh id; the model never controls identity.
    pub fn from_scaffold(name: &str, spec: ScaffoldSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: spec.description,
            files: spec
                .files
                .into_iter()
                .map(|f| FileNode::new(&f.name, &f.content, &f.language))
                .collect(),
            last_modified: Utc::now(),
        }
    }

    pub fn file(&self, id: Uuid) -> Option<&FileNode> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn file_mut(&mut self, id: Uuid) -> Option<&mut FileNode> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub fn file_by_name(&self, name: &str) -> Option<&FileNode> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// A chat message within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A saved conversation with the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub last_modified: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            messages: Vec::new(),
            last_modified: Utc::now(),
        }
    }

    /// Append to the transcript. Messages are never edited or removed.
    pub fn push_message(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
        self.last_modified = Utc::now();
    }
}

/// Top-level screen the client is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Landing,
    Dashboard,
    Chat,
    Ide,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Landing => "landing",
            ViewMode::Dashboard => "dashboard",
            ViewMode::Chat => "chat",
            ViewMode::Ide => "ide",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "landing" => Some(ViewMode::Landing),
            "dashboard" => Some(ViewMode::Dashboard),
            "chat" => Some(ViewMode::Chat),
            "ide" => Some(ViewMode::Ide),
            _ => None,
        }
    }
}
