use crate::chat::{ChatMessage, StudyPlanItem};
use async_trait::async_trait;

pub mod gemini;

pub use gemini::GeminiClient;

/// The seam between the mentor controller and the generative model. Both
/// operations are infallible by contract: implementations mask any request,
/// network, or parse failure into a safe default so the controller only ever
/// sees "text in, text out" and "params in, typed list out".
#[async_trait]
pub trait MentorBackend: Send + Sync {
    /// Freeform reply over the full ordered conversation.
    async fn reply(&self, history: &[ChatMessage]) -> String;

    /// Schema-constrained study plan. Empty on any failure.
    async fn study_plan(&self, subjects: &[String], exam_dates: &[String]) -> Vec<StudyPlanItem>;
}
