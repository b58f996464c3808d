pub mod artifact;
pub mod document_ctx;
pub mod outline;
pub mod step;
pub mod summary_flow;

pub use artifact::StepArtifact;
pub use document_ctx::DocumentCtx;
pub use step::{PlannedStep, StepPhase, StepSource};
pub use summary_flow::{FlowOutput, SummaryFlow};
