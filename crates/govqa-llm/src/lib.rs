//! govqa-llm
//!
//! OpenAI-compatible chat client and the prompt layout used for grounded
//! answers.

pub mod client;
pub mod prompt;
pub mod sse;

pub use client::OpenAiCompatClient;
pub use prompt::{build_messages, build_user_prompt, APOLOGY, SYSTEM_PROMPT};
