//! The analysis loop: the heart of scanpilot.
//!
//! Each analysis follows a **Decide → Dispatch → Append** cycle:
//!
//! 1. **Seed** the conversation with the flavor's prompt for the target
//! 2. **Decide**: send the conversation and the flavor's capabilities to the backend
//! 3. **If tool calls**: run them all concurrently, append one result per
//!    request in request order, loop back to step 2
//! 4. **If no tool calls**: the decision's text is the final report
//!
//! The loop stops at the first decision without tool calls, or when the
//! round limit is reached.

pub mod decision;
pub mod dispatcher;
pub mod flavor;
pub mod loop_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decision::DecisionClient;
pub use dispatcher::ToolDispatcher;
pub use flavor::AnalysisFlavor;
pub use loop_runner::AnalysisLoop;
