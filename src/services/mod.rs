//! Application services.
//!
//! ```text
//! CLI (app)
//!     |
//!     v
//! Services  <-- assistant, extraction
//!     |
//!     v
//! Memory engine, providers, storage
//! ```

mod assistant;
mod extract;

pub use assistant::{
    build_context, build_prompt, Answer, AnswerOptions, AssistantError, AssistantResult,
    AssistantService, AssistantStatus, ServiceStatus, VoiceNoteReport,
};
pub use extract::{extract_text, DocumentKind, ExtractError};
