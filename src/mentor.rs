use crate::ai::MentorBackend;
use crate::chat::{ChatMessage, StudyPlanItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const GREETING: &str =
    "Hi! I am Mentor. Send me your exam dates and I will build your roadmap. Ready to start?";
const PLAN_CONFIRMED: &str = "Done! I have synced the plan to your Roadmap tab. Anything else?";
const PLAN_PROPOSED: &str =
    "I have drafted a plan for Economics and History. Should I add this to your calendar?";
const EMPTY_REPLY_FALLBACK: &str = "I could not think of anything. Try again?";

// The drafting flow always asks for this fixed subject/date set; the chat
// text itself is not parsed for subjects.
const PLAN_SUBJECTS: [&str; 2] = ["Economics", "History"];
const PLAN_EXAM_DATES: [&str; 1] = ["Nov 20"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The user message was appended and exactly one assistant message
    /// followed it.
    Replied,
    /// Blank input; nothing happened.
    Ignored,
    /// A previous submit is still awaiting the model.
    Busy,
}

struct MentorState {
    messages: Vec<ChatMessage>,
    pending_plan: Option<Vec<StudyPlanItem>>,
    active_plan: Vec<StudyPlanItem>,
}

enum Branch {
    DraftPlan,
    Freeform(Vec<ChatMessage>),
}

/// Drives the mentor conversation. Holds the ordered message log, the
/// pending-plan confirm gate, and an explicit in-flight guard so at most one
/// submit talks to the model at a time regardless of how many triggers exist.
pub struct MentorController {
    backend: Arc<dyn MentorBackend>,
    state: Mutex<MentorState>,
    in_flight: AtomicBool,
}

impl MentorController {
    pub fn new(backend: Arc<dyn MentorBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(MentorState {
                messages: vec![ChatMessage::assistant(GREETING)],
                pending_plan: None,
                active_plan: Vec::new(),
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Append a user message and produce exactly one assistant message.
    ///
    /// Branches, in order: a pending plan plus an affirmative answer promotes
    /// the plan with no model call; "plan"/"exam" in the input requests a
    /// fresh draft; anything else is a freeform reply over the full history.
    /// The in-flight flag is cleared on every path.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return SubmitOutcome::Busy;
        }

        let lower = text.to_lowercase();
        let branch = {
            let mut state = self.state.lock().unwrap();
            state.messages.push(ChatMessage::user(text));

            if state.pending_plan.is_some() && is_affirmative(&lower) {
                let plan = state.pending_plan.take().unwrap();
                state.active_plan = plan;
                state.messages.push(ChatMessage::assistant(PLAN_CONFIRMED));
                self.in_flight.store(false, Ordering::SeqCst);
                return SubmitOutcome::Replied;
            }

            if lower.contains("plan") || lower.contains("exam") {
                Branch::DraftPlan
            } else {
                Branch::Freeform(state.messages.clone())
            }
        };

        match branch {
            Branch::DraftPlan => {
                let subjects: Vec<String> =
                    PLAN_SUBJECTS.iter().map(|s| s.to_string()).collect();
                let dates: Vec<String> =
                    PLAN_EXAM_DATES.iter().map(|s| s.to_string()).collect();
                let plan = self.backend.study_plan(&subjects, &dates).await;

                let mut state = self.state.lock().unwrap();
                state.pending_plan = Some(plan);
                state
                    .messages
                    .push(ChatMessage::assistant(PLAN_PROPOSED).plan_prompt());
            }
            Branch::Freeform(history) => {
                let reply = self.backend.reply(&history).await;
                let content = if reply.trim().is_empty() {
                    EMPTY_REPLY_FALLBACK.to_string()
                } else {
                    reply
                };

                let mut state = self.state.lock().unwrap();
                state.messages.push(ChatMessage::assistant(content));
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
        SubmitOutcome::Replied
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn active_plan(&self) -> Vec<StudyPlanItem> {
        self.state.lock().unwrap().active_plan.clone()
    }

    pub fn has_pending_plan(&self) -> bool {
        self.state.lock().unwrap().pending_plan.is_some()
    }

    pub fn is_typing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

fn is_affirmative(lower: &str) -> bool {
    lower.contains("yes") || lower.contains("add it") || lower.contains("sure")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeBackend {
        reply_text: String,
        plan: Vec<StudyPlanItem>,
        reply_calls: AtomicUsize,
        plan_calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeBackend {
        fn new(reply_text: &str) -> Self {
            Self {
                reply_text: reply_text.to_string(),
                plan: vec![StudyPlanItem {
                    id: "1".into(),
                    subject: "Economics".into(),
                    time: "Morning".into(),
                    tasks: vec!["Read chapter 4".into()],
                    difficulty: 3.0,
                }],
                reply_calls: AtomicUsize::new(0),
                plan_calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl MentorBackend for FakeBackend {
        async fn reply(&self, _history: &[ChatMessage]) -> String {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply_text.clone()
        }

        async fn study_plan(
            &self,
            _subjects: &[String],
            _exam_dates: &[String],
        ) -> Vec<StudyPlanItem> {
            self.plan_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.plan.clone()
        }
    }

    fn controller(backend: FakeBackend) -> (Arc<FakeBackend>, MentorController) {
        let backend = Arc::new(backend);
        (backend.clone(), MentorController::new(backend))
    }

    #[tokio::test]
    async fn exam_then_yes_activates_exactly_one_plan() {
        let (backend, mentor) = controller(FakeBackend::new("hello"));

        assert_eq!(mentor.submit("my exam is coming up").await, SubmitOutcome::Replied);
        assert!(mentor.has_pending_plan());
        assert!(mentor.active_plan().is_empty());

        assert_eq!(mentor.submit("yes").await, SubmitOutcome::Replied);
        assert!(!mentor.has_pending_plan());
        assert_eq!(mentor.active_plan().len(), 1);

        // Neither message triggered a freeform call, and the plan was
        // generated exactly once.
        assert_eq!(backend.reply_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.plan_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn freeform_reply_is_appended_verbatim() {
        let (backend, mentor) = controller(FakeBackend::new("Study early and often."));

        mentor.submit("how do I focus?").await;

        let messages = mentor.messages();
        let last = messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Study early and often.");
        assert_eq!(backend.reply_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_fixed_line() {
        let (_backend, mentor) = controller(FakeBackend::new("  "));

        mentor.submit("hello there").await;

        assert_eq!(mentor.messages().last().unwrap().content, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let (backend, mentor) = controller(FakeBackend::new("hello"));

        assert_eq!(mentor.submit("   ").await, SubmitOutcome::Ignored);
        assert_eq!(mentor.messages().len(), 1); // just the greeting
        assert_eq!(backend.reply_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_submit_yields_exactly_one_assistant_message() {
        let (_backend, mentor) = controller(FakeBackend::new("ok"));

        for (i, text) in ["hi", "plan please", "yes", "thanks"].iter().enumerate() {
            mentor.submit(text).await;
            // greeting + (user + assistant) per submit
            assert_eq!(mentor.messages().len(), 1 + (i + 1) * 2);
            assert!(!mentor.is_typing());
        }
    }

    #[tokio::test]
    async fn affirmative_without_pending_plan_goes_freeform() {
        let (backend, mentor) = controller(FakeBackend::new("ok"));

        mentor.submit("yes totally").await;

        assert_eq!(backend.reply_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.plan_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_affirmative_answer_with_keyword_redrafts_the_plan() {
        let (backend, mentor) = controller(FakeBackend::new("ok"));

        mentor.submit("build me a plan").await;
        mentor.submit("no, another plan please").await;

        assert!(mentor.has_pending_plan());
        assert!(mentor.active_plan().is_empty());
        assert_eq!(backend.plan_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_while_in_flight_is_rejected() {
        let backend = Arc::new(FakeBackend::new("slow").with_delay(Duration::from_secs(5)));
        let mentor = Arc::new(MentorController::new(backend.clone()));

        let first = {
            let mentor = mentor.clone();
            tokio::spawn(async move { mentor.submit("hello").await })
        };
        tokio::task::yield_now().await;
        assert!(mentor.is_typing());

        assert_eq!(mentor.submit("impatient").await, SubmitOutcome::Busy);

        assert_eq!(first.await.unwrap(), SubmitOutcome::Replied);
        assert!(!mentor.is_typing());
        assert_eq!(backend.reply_calls.load(Ordering::SeqCst), 1);
    }
}
