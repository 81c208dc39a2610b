//! 프롬프트 구성

/// 기본 시스템 지시문
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "Answer the question using only the context below. \
If the context does not contain the answer, say that you don't know. \
Mention the document name when you use information from it.";

/// seq2seq 모델용 단일 입력 프롬프트
pub fn seq2seq_prompt(system_instructions: &str, context: &str, question: &str) -> String {
    format!(
        "{}\n\nContext: {}\n\nQuestion: {}\n\nAnswer:",
        system_instructions.trim(),
        context.trim(),
        question.trim()
    )
}

/// chat 모델용 사용자 메시지
pub fn chat_user_message(context: &str, question: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}",
        context.trim(),
        question.trim()
    )
}

/// 문맥을 앞에서부터 `max_words` 단어로 자르기
///
/// 입력 길이 제한이 있는 모델에서 질문이 잘려 나가지 않도록
/// 프롬프트 조립 전에 문맥 쪽을 먼저 줄입니다.
pub fn fit_context_to_words(context: &str, max_words: usize) -> String {
    let words: Vec<&str> = context.split_whitespace().collect();
    if words.len() <= max_words {
        return context.to_string();
    }
    words[..max_words].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq2seq_prompt_layout() {
        let prompt = seq2seq_prompt("Be brief.", " some context ", "What? ");
        assert_eq!(
            prompt,
            "Be brief.\n\nContext: some context\n\nQuestion: What?\n\nAnswer:"
        );
    }

    #[test]
    fn test_chat_user_message() {
        let msg = chat_user_message("ctx", "q?");
        assert_eq!(msg, "Context:\nctx\n\nQuestion: q?");
    }

    #[test]
    fn test_fit_context_to_words() {
        assert_eq!(fit_context_to_words("a b c", 5), "a b c");
        assert_eq!(fit_context_to_words("a b c d e f", 3), "a b c");
        assert_eq!(fit_context_to_words("a b", 0), "");
    }
}
