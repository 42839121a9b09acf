//! User-facing rendering of clarifying questions

use super::language::Language;

/// Numbered questions wrapped in a short intro and outro in `language`
pub fn render_clarification_prompt(questions: &[String], language: Language) -> String {
    let (intro, outro) = match language {
        Language::Vietnamese => (
            "Để hiểu rõ hơn yêu cầu của bạn, mình cần hỏi thêm:",
            "Bạn trả lời giúp mình nhé, mình sẽ tư vấn chính xác hơn.",
        ),
        Language::Chinese => (
            "为了更好地理解您的需求，我想先确认几点：",
            "请回答以上问题，我会给出更准确的建议。",
        ),
        Language::English => (
            "To better understand what you need, could you tell me:",
            "Once you answer, I can give you a more precise recommendation.",
        ),
    };

    let numbered = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\n{}\n\n{}", intro, numbered, outro)
}
