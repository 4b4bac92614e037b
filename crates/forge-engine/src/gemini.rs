use std::env;

use forge_contracts::character::{Character, CharacterDraft, CharacterId};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::error::GenerationError;
use crate::prompts::{
    backstory_prompt, draft_response_schema, portrait_prompt, DRAFT_INSTRUCTION,
    PORTRAIT_ASPECT_RATIO,
};
use crate::{CardGenerator, GenerationSettings};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const ERROR_BODY_MAX_CHARS: usize = 512;

/// Gemini `generateContent` transport for all three card generation calls.
pub struct GeminiGenerator {
    api_base: String,
    http: HttpClient,
    key_source: fn() -> Option<String>,
}

impl Default for GeminiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiGenerator {
    pub fn new() -> Self {
        Self::with_api_base(
            env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            http: HttpClient::new(),
            key_source: env_api_key,
        }
    }

    /// Replaces the environment lookup of the API key.
    pub fn with_key_source(mut self, key_source: fn() -> Option<String>) -> Self {
        self.key_source = key_source;
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn generate_content(
        &self,
        model: &str,
        payload: &Value,
        settings: &GenerationSettings,
    ) -> Result<Value, GenerationError> {
        // Read on every call so that a missing key surfaces on first use.
        let api_key = (self.key_source)().ok_or(GenerationError::MissingCredential)?;
        let endpoint = self.endpoint_for_model(model);
        tracing::debug!(%endpoint, "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(settings.request_timeout)
            .json(payload)
            .send()
            .map_err(|err| GenerationError::Transport(err.without_url().to_string()))?;
        response_json_or_error(response)
    }

    pub(crate) fn draft_payload(settings: &GenerationSettings) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": DRAFT_INSTRUCTION }],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": draft_response_schema(),
                "temperature": settings.temperature,
            },
        })
    }

    pub(crate) fn portrait_payload(character: &Character) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": portrait_prompt(character) }],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": PORTRAIT_ASPECT_RATIO },
            },
        })
    }

    pub(crate) fn backstory_payload(character: &Character) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": backstory_prompt(character) }],
            }],
        })
    }

    /// Concatenated text parts of the first candidate, skipping thought parts.
    pub(crate) fn extract_text(response_payload: &Value) -> Option<String> {
        let parts = first_candidate_parts(response_payload);
        let text: String = parts
            .iter()
            .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    }

    /// First inline image part of the first candidate as a `data:` URI.
    pub(crate) fn extract_inline_image(response_payload: &Value) -> Option<String> {
        first_candidate_parts(response_payload)
            .iter()
            .find_map(|part| {
                let inline = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)?;
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .filter(|data| !data.is_empty())?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .filter(|mime| mime.starts_with("image/"))
                    .unwrap_or("image/png");
                Some(format!("data:{mime_type};base64,{data}"))
            })
    }
}

impl CardGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn draft_character(
        &self,
        settings: &GenerationSettings,
    ) -> Result<Character, GenerationError> {
        let payload = Self::draft_payload(settings);
        let response = self.generate_content(&settings.text_model, &payload, settings)?;
        let text = Self::extract_text(&response).ok_or(GenerationError::EmptyResponse)?;
        let draft = CharacterDraft::from_json_text(&text)?;
        Ok(draft.into_character(CharacterId::new()))
    }

    fn generate_portrait(
        &self,
        settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError> {
        let payload = Self::portrait_payload(character);
        let response = self.generate_content(&settings.image_model, &payload, settings)?;
        Self::extract_inline_image(&response).ok_or(GenerationError::NoImage)
    }

    fn rewrite_backstory(
        &self,
        settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError> {
        let payload = Self::backstory_payload(character);
        let response = self.generate_content(&settings.text_model, &payload, settings)?;
        Self::extract_text(&response).ok_or(GenerationError::EmptyResponse)
    }
}

fn first_candidate_parts(response_payload: &Value) -> Vec<Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, GenerationError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| GenerationError::Transport(err.without_url().to_string()))?;
    classify_response(status, &body)
}

fn classify_response(status: u16, body: &str) -> Result<Value, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(GenerationError::Status {
            code: status,
            body: truncate_text(body, ERROR_BODY_MAX_CHARS),
        });
    }
    if body.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    serde_json::from_str(body)
        .map_err(|err| GenerationError::MalformedPayload(format!("invalid JSON body: {err}")))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"]
        .into_iter()
        .find_map(lookup)
}

fn env_api_key() -> Option<String> {
    api_key_from(non_empty_env)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
