//! Prompt templates for each completion task

use super::TaskKind;
use serde_json::Value;

const UNDERSTANDING_SYSTEM: &str = "You analyse user queries for a conversational assistant. \
Reply with a single JSON object and nothing else.";

const SUMMARIZATION_SYSTEM: &str = "You compress conversation segments into structured memory. \
Reply with a single JSON object and nothing else.";

const RESPONSE_SYSTEM: &str = "You are a helpful chat assistant. Answer in the same language as \
the user and never mix languages within one reply.";

/// Render `(system, user)` prompts for a task payload
pub fn render(task: TaskKind, payload: &Value) -> (String, String) {
    match task {
        TaskKind::QueryUnderstanding => (UNDERSTANDING_SYSTEM.to_string(), understanding_prompt(payload)),
        TaskKind::Summarization => (SUMMARIZATION_SYSTEM.to_string(), summarization_prompt(payload)),
        TaskKind::ResponseGeneration => (RESPONSE_SYSTEM.to_string(), response_prompt(payload)),
    }
}

fn field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or("")
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

fn understanding_prompt(payload: &Value) -> String {
    let language = field(payload, "language");
    format!(
        "The user wrote in {language}. Every text field you return (rewritten_query, \
clarifying_questions, needed_context_from_memory) MUST be written in {language} only.\n\n\
User query: \"{query}\"\n\n\
Recent conversation:\n{context}\n\n\
Session memory:\n{memory}\n\n\
Decide:\n\
1. is_ambiguous: does the query allow several readings, or omit details needed to act \
(for example budget or purpose)?\n\
2. rewritten_query: a clearer version, or null.\n\
3. needed_context_from_memory: memory items that help answer it.\n\
4. clarifying_questions: 1 to 3 short questions when ambiguous, otherwise [].\n\
5. confidence_score: 0.0 to 1.0.\n\n\
Return JSON with exactly these keys:\n\
{{\"is_ambiguous\": bool, \"rewritten_query\": string|null, \
\"needed_context_from_memory\": [string], \"clarifying_questions\": [string], \
\"confidence_score\": number}}",
        language = or_placeholder(language, "English"),
        query = field(payload, "query"),
        context = or_placeholder(field(payload, "recent_context"), "(no recent messages)"),
        memory = or_placeholder(field(payload, "memory"), "No session memory yet."),
    )
}

fn summarization_prompt(payload: &Value) -> String {
    format!(
        "Extract structured memory from this conversation segment.\n\n\
Conversation:\n{conversation}\n\n\
Return JSON with exactly these keys:\n\
{{\"user_profile\": {{\"preferences\": [string], \"constraints\": [string], \
\"interests\": [string]}}, \"key_facts\": [string], \"decisions\": [string], \
\"open_questions\": [string], \"todos\": [string]}}",
        conversation = field(payload, "conversation"),
    )
}

fn response_prompt(payload: &Value) -> String {
    let recent = payload
        .get("recent_messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .map(|m| format!("{}: {}", field(m, "role"), field(m, "content")))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    format!(
        "Session memory:\n{summary}\n\n\
Relevant context:\n{context}\n\n\
Recent conversation:\n{recent}\n\n\
Reply in {language}.\n\
User: {query}\n\
Assistant:",
        summary = or_placeholder(field(payload, "summary"), "No session memory yet."),
        context = or_placeholder(field(payload, "augmented_context"), "(none)"),
        recent = or_placeholder(&recent, "(no recent messages)"),
        language = or_placeholder(field(payload, "language"), "English"),
        query = field(payload, "query"),
    )
}
