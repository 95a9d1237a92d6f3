use crate::ai::MentorBackend;
use crate::chat::{ChatMessage, ChatRole, StudyPlanItem};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

const SYSTEM_INSTRUCTION: &str = "You are 'Mentor', a friendly student AI assistant for CampusFlow. You help students with study planning and academic advice. RULES: 1. Keep responses very clean and concise. 2. NEVER use double quotes or special markdown characters like backticks unless essential for code. 3. Do not use bold/italic formatting. 4. If suggesting a study plan, always end by asking: Should I add this plan to your calendar?";

/// Shown in place of a reply when the model call fails for any reason.
pub const REPLY_FALLBACK: &str = "Something went wrong with my brain. Try again soon.";

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build from `GEMINI_API_KEY` / `GEMINI_MODEL`. A missing key is not
    /// fatal here: requests will fail and surface as the fallback strings,
    /// which is the same behavior as an invalid key.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .unwrap_or_default();
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_key, model)
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(&self, request: &GenerateContentRequest) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Gemini returned status {}", response.status());
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        parsed
            .candidates
            .and_then(|mut candidates| candidates.pop())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
            .context("Gemini response had no text candidates")
    }
}

#[async_trait]
impl MentorBackend for GeminiClient {
    async fn reply(&self, history: &[ChatMessage]) -> String {
        let request = reply_request(history);
        match self.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Mentor reply failed: {:#}", e);
                REPLY_FALLBACK.to_string()
            }
        }
    }

    async fn study_plan(&self, subjects: &[String], exam_dates: &[String]) -> Vec<StudyPlanItem> {
        let request = plan_request(subjects, exam_dates);
        match self.generate(&request).await {
            Ok(text) => parse_plan(&text),
            Err(e) => {
                warn!("Study plan generation failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

fn reply_request(history: &[ChatMessage]) -> GenerateContentRequest {
    let contents = history
        .iter()
        .map(|m| Content {
            // The external vocabulary is user/model, not user/assistant.
            role: match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            }
            .to_string(),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction: Some(Content {
            role: "system".to_string(),
            parts: vec![Part {
                text: SYSTEM_INSTRUCTION.to_string(),
            }],
        }),
        generation_config: None,
    }
}

fn plan_request(subjects: &[String], exam_dates: &[String]) -> GenerateContentRequest {
    let prompt = format!(
        "Generate a daily study plan for: {} with exams on {}. Format: JSON array of objects with id, subject, time, tasks, difficulty.",
        subjects.join(", "),
        exam_dates.join(", ")
    );

    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts: vec![Part { text: prompt }],
        }],
        system_instruction: None,
        generation_config: Some(GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: plan_schema(),
        }),
    }
}

/// Output schema for plan generation: every field required, tasks is a
/// string array, difficulty numeric.
fn plan_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": { "type": "STRING" },
                "subject": { "type": "STRING" },
                "time": { "type": "STRING" },
                "tasks": { "type": "ARRAY", "items": { "type": "STRING" } },
                "difficulty": { "type": "NUMBER" }
            },
            "required": ["id", "subject", "time", "tasks", "difficulty"]
        }
    })
}

fn parse_plan(text: &str) -> Vec<StudyPlanItem> {
    match serde_json::from_str(text) {
        Ok(items) => items,
        Err(e) => {
            warn!("Study plan response was not valid JSON: {}", e);
            Vec::new()
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> GeminiClient {
        // Nothing listens on this port; every request fails fast.
        GeminiClient::new("test-key", "test-model").with_base_url("http://127.0.0.1:9/models")
    }

    #[test]
    fn history_roles_map_to_external_vocabulary() {
        let history = vec![
            ChatMessage::assistant("Hi!"),
            ChatMessage::user("Hello"),
        ];
        let request = reply_request(&history);

        let roles: Vec<&str> = request.contents.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["model", "user"]);
        assert!(request.system_instruction.is_some());
    }

    #[test]
    fn plan_request_carries_schema_and_prompt() {
        let request = plan_request(
            &["Economics".to_string(), "History".to_string()],
            &["Nov 20".to_string()],
        );

        let config = request.generation_config.unwrap();
        assert_eq!(config.response_mime_type, "application/json");
        assert_eq!(config.response_schema["type"], "ARRAY");

        let prompt = &request.contents[0].parts[0].text;
        assert!(prompt.contains("Economics, History"));
        assert!(prompt.contains("Nov 20"));
    }

    #[test]
    fn parse_plan_accepts_conforming_json() {
        let text = r#"[{"id":"1","subject":"Economics","time":"9 AM","tasks":["Read ch. 4"],"difficulty":3}]"#;
        let plan = parse_plan(text);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].subject, "Economics");
    }

    #[test]
    fn parse_plan_masks_garbage_as_empty() {
        assert!(parse_plan("not json").is_empty());
        assert!(parse_plan(r#"{"wrong":"shape"}"#).is_empty());
    }

    #[tokio::test]
    async fn reply_failure_yields_fallback_string() {
        let client = unreachable_client();
        let reply = client.reply(&[ChatMessage::user("hi")]).await;
        assert_eq!(reply, REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn plan_failure_yields_empty_list() {
        let client = unreachable_client();
        let plan = client
            .study_plan(&["Economics".to_string()], &["Nov 20".to_string()])
            .await;
        assert!(plan.is_empty());
    }
}
