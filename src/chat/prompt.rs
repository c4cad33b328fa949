//! Prompt assembly for generation requests
//!
//! Pure functions: a language-matching instruction, the conversation context
//! window, and the user turn.

use crate::database::{ChatMessage, ChatMessageStatus};

/// Messages of history included in a text prompt
pub const CONTEXT_WINDOW: usize = 10;

/// Reply language picked from the user's script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLanguage {
    Chinese,
    Japanese,
    Korean,
    Russian,
    Arabic,
    English,
}

impl ReplyLanguage {
    /// Fixed instruction asking the model to answer in this language
    pub fn instruction(&self) -> &'static str {
        match self {
            ReplyLanguage::Chinese => "请使用中文回答用户的问题。",
            ReplyLanguage::Japanese => "ユーザーと同じ言語（日本語）で回答してください。",
            ReplyLanguage::Korean => "사용자와 같은 언어(한국어)로 답변해 주세요.",
            ReplyLanguage::Russian => {
                "Пожалуйста, отвечайте на том же языке, что и пользователь (на русском)."
            }
            ReplyLanguage::Arabic => "يرجى الرد بنفس لغة المستخدم (العربية).",
            ReplyLanguage::English => {
                "Please respond in the same language as the user's message (English)."
            }
        }
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}')
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

fn is_arabic(c: char) -> bool {
    matches!(c, '\u{0600}'..='\u{06FF}')
}

/// Pick the reply language. Scripts are checked in a fixed priority order and
/// the first one present anywhere in the text wins.
pub fn detect_language(text: &str) -> ReplyLanguage {
    const PRIORITY: [(fn(char) -> bool, ReplyLanguage); 5] = [
        (is_cjk, ReplyLanguage::Chinese),
        (is_kana, ReplyLanguage::Japanese),
        (is_hangul, ReplyLanguage::Korean),
        (is_cyrillic, ReplyLanguage::Russian),
        (is_arabic, ReplyLanguage::Arabic),
    ];

    PRIORITY
        .iter()
        .find(|(matches, _)| text.chars().any(matches))
        .map(|(_, language)| *language)
        .unwrap_or(ReplyLanguage::English)
}

/// Render history as `"{User|Assistant}: {content}\n"` lines
pub fn render_context(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.status == ChatMessageStatus::Complete && !m.content.is_empty())
        .map(|m| format!("{}: {}\n", m.role.label(), m.content))
        .collect()
}

/// Prompt for a text-only turn
pub fn build_text_prompt(user_message: &str, context: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(detect_language(user_message).instruction());
    prompt.push_str("\n\n");

    if !context.is_empty() {
        prompt.push_str("Previous conversation context:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str("User: ");
    prompt.push_str(user_message);
    prompt.push_str("\n\nAssistant: ");
    prompt
}

/// Prompt for a turn that carries an image
pub fn build_multimodal_prompt(user_message: &str, image_note: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(detect_language(user_message).instruction());
    prompt.push_str("\n\n");

    if !image_note.is_empty() {
        prompt.push_str("Image description: ");
        prompt.push_str(image_note);
        prompt.push_str("\n\n");
    }

    prompt.push_str("User message: ");
    prompt.push_str(user_message);
    prompt.push_str("\n\nPlease analyze the image and respond to the user's message. Assistant: ");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChatMessage;

    #[test]
    fn test_language_priority() {
        assert_eq!(detect_language("Hello there"), ReplyLanguage::English);
        assert_eq!(detect_language(""), ReplyLanguage::English);
        assert_eq!(detect_language("你好"), ReplyLanguage::Chinese);
        assert_eq!(detect_language("hello 你好 world"), ReplyLanguage::Chinese);
        assert_eq!(detect_language("こんにちは"), ReplyLanguage::Japanese);
        // Kanji plus kana: CJK ideographs are checked first
        assert_eq!(detect_language("日本語です"), ReplyLanguage::Chinese);
        assert_eq!(detect_language("안녕하세요"), ReplyLanguage::Korean);
        assert_eq!(detect_language("Привет"), ReplyLanguage::Russian);
        assert_eq!(detect_language("مرحبا"), ReplyLanguage::Arabic);
        assert_eq!(detect_language("Привет مرحبا"), ReplyLanguage::Russian);
    }

    #[test]
    fn test_text_prompt_without_context() {
        let prompt = build_text_prompt("What is Rust?", "");
        assert_eq!(
            prompt,
            "Please respond in the same language as the user's message (English).\n\n\
             User: What is Rust?\n\nAssistant: "
        );
    }

    #[test]
    fn test_text_prompt_with_context() {
        let prompt = build_text_prompt("你好", "User: hi\nAssistant: hello\n");
        assert!(prompt.starts_with("请使用中文回答用户的问题。\n\n"));
        assert!(prompt.contains("Previous conversation context:\nUser: hi\nAssistant: hello\n\n\n"));
        assert!(prompt.ends_with("User: 你好\n\nAssistant: "));
    }

    #[test]
    fn test_multimodal_prompt() {
        let prompt = build_multimodal_prompt("What is this?", "User uploaded an image");
        assert!(prompt.contains("Image description: User uploaded an image\n\n"));
        assert!(prompt.contains("User message: What is this?"));
        assert!(prompt.ends_with("Please analyze the image and respond to the user's message. Assistant: "));

        let bare = build_multimodal_prompt("What is this?", "");
        assert!(!bare.contains("Image description"));
    }

    #[test]
    fn test_render_context_skips_unfinished() {
        let user = ChatMessage::user("s", "hi", 1);
        let mut reply = ChatMessage::assistant_pending("s", 2, None);
        reply.content = "hello".to_string();
        reply.status = ChatMessageStatus::Complete;
        let failed = ChatMessage::assistant_pending("s", 3, None);

        assert_eq!(render_context(&[user, reply, failed]), "User: hi\nAssistant: hello\n");
    }
}
