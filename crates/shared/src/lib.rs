pub mod model;
pub mod preview;
pub mod scaffold;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Which Gemini model handles which workload.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelSettings {
        pub chat_model: String,     // chat, refactor, explain
        pub scaffold_model: String, // structured project generation
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default)]
        pub model: ModelSettings,
        /// Override for the snapshot file location (mainly for tests and
        /// portable setups).
        #[serde(default)]
        pub data_file: Option<PathBuf>,
    }

    impl Default for ModelSettings {
        fn default() -> Self {
            Self {
                chat_model: "gemini-3-pro-preview".to_string(),
                scaffold_model: "gemini-3-flash-preview".to_string(),
            }
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                model: ModelSettings::default(),
                data_file: None,
            }
        }
    }
}

pub mod chat_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    /// One increment of a streamed generation.
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        /// New reply text (a delta, not the accumulated reply).
        Text(String),
        /// The stream finished normally.
        Done,
        /// The stream broke after it had started.
        Error(String),
    }
}
