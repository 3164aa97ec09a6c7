//! Mirror-mode text conversion
//!
//! Wraps a generated answer in a fixed contrastive frame keyed by the
//! subject of the prompt. The table is static and read-only.

/// Subject used for every soliloquy turn
pub const SOLILOQUY_SUBJECT: &str = "혼잣말";

/// Subject → conclusion
const MIRROR_TABLE: &[(&str, &str)] = &[
    ("물", "평화와 생명의 문"),
    ("불", "빛과 평화의 안내자"),
    ("바람", "자유와 흐름의 숨결"),
    ("흙", "품음과 뿌리의 안식"),
    (SOLILOQUY_SUBJECT, "내면을 비추는 거울 같은 속삭임"),
];

/// Look up the conclusion for a subject
pub fn conclusion(subject: &str) -> Option<&'static str> {
    MIRROR_TABLE
        .iter()
        .find(|(key, _)| *key == subject)
        .map(|(_, conclusion)| *conclusion)
}

/// First whitespace-delimited token of the trimmed input.
///
/// Blank input yields an empty subject, which is never in the table.
pub fn subject_of(input: &str) -> &str {
    input.split_whitespace().next().unwrap_or("")
}

/// Compose the mirrored display text for `original`.
///
/// Total: unknown subjects get a fallback frame with the original text
/// left untouched.
pub fn transform(subject: &str, original: &str) -> String {
    match conclusion(subject) {
        Some(conclusion) => format!(
            "거울상 ({subject}):\n- 원문: {}\n- 대조: {subject}은/는 스스로 주장하지 않지만 모든 것을 담아낸다.\n- 종합: {conclusion}",
            original.trim()
        ),
        None => format!("거울상: (주제 '{subject}' 정의 없음)\n\n{original}"),
    }
}
