//! Chat-completions wire types and prompt construction.

use lingopipe_core::error::TranslateError;
use lingopipe_core::language::normalize_target_language_label;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Extract the first choice's trimmed content from a chat-completions
/// response body.
pub fn parse_content(body: &str) -> Result<String, TranslateError> {
    let out: ChatCompletionsResponse =
        serde_json::from_str(body).map_err(|e| TranslateError::Response(e.to_string()))?;
    let Some(choice) = out.choices.first() else {
        return Err(TranslateError::Response("no choices in response".into()));
    };
    let content = choice.message.content.trim();
    if content.is_empty() {
        return Err(TranslateError::Response("empty content in response".into()));
    }
    Ok(content.to_string())
}

/// Build the two-message prompt for one batch payload.
///
/// The format contract (NDJSON in, NDJSON out, idx preserved) is restated
/// with a worked example; models follow examples much more reliably than
/// prose.
pub fn build_prompt(source_lang: &str, target_lang: &str, payload: &str) -> Vec<ChatMessage> {
    let source_label = normalize_target_language_label(source_lang);
    let target_label = normalize_target_language_label(target_lang);

    let system = ChatMessage::new(
        "system",
        "You are a translation engine. Output must follow the requested format exactly. \
         Do not add commentary.",
    );

    let mut user_content = String::from("Translate the following text segments");
    if !source_label.is_empty() {
        user_content.push_str(&format!(" from `{source_label}`"));
    }
    user_content.push_str(&format!(" to: `{target_label}`\n"));
    user_content.push_str(
        "\n\
         Rules:\n\
         - Output MUST contain the same number of items as the input.\n\
         - Preserve idx values exactly and do not reorder.\n\
         - Output MUST be NDJSON: one JSON object per line (no surrounding array).\n\
         - Each output line MUST be valid JSON with exactly two keys: idx (number) and text (string).\n\
         - Do not output markdown, code fences, headers, or explanations.\n\
         \n\
         Example:\n\
         Input:\n\
         {\"idx\":1,\"text\":\"Hello\\nworld\"}\n\
         {\"idx\":2,\"text\":\"How are you?\"}\n\
         Output:\n\
         {\"idx\":1,\"text\":\"Hola\\nmundo\"}\n\
         {\"idx\":2,\"text\":\"¿Cómo estás?\"}\n\
         \n\
         Input:\n\n",
    );
    user_content.push_str(payload);
    user_content.push('\n');

    vec![system, ChatMessage::new("user", user_content)]
}
