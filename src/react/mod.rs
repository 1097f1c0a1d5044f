//! ReAct reasoning engine: drives Thought/Action/Observation
//! iterations over a provider and tool registry until a `Final` answer or
//! iteration exhaustion, with a tiered parser tolerant of malformed output.

mod driver;
mod parser;
mod step;
mod template;

pub use driver::{run_react, NoopCallbacks, ReActCallbacks, ReActConfig, ReActEvent};
pub use parser::ParseTier;
pub use step::{ReActMetrics, ReActResult, ReActStep};
pub use template::{PromptBuilder, ReActExample};
