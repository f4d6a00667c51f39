pub mod api_types;
pub mod daemon;
pub mod dialogue;
pub mod directive;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod scheduler;

pub use daemon::{CycleError, DaemonPhase, ThoughtDaemon};
pub use dialogue::{DialogueError, DialogueHandler, DialogueReply, DirectiveOutcome};
pub use directive::{ParsedDirective, ToolDirective};
pub use llm::{BackendError, CompletionBackend, CompletionParams};
pub use providers::build_backend;
