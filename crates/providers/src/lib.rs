//! Gemini access for Astra: a low-level REST client plus the fail-soft
//! gateway the rest of the app talks to.

pub mod gateway;
pub mod gemini;
pub mod sse;

pub use gateway::Gateway;
pub use gemini::{GeminiClient, TextModel};
