use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Lowercases, replaces punctuation with spaces, splits on whitespace and
/// drops single-character tokens. Unicode aware, so Vietnamese diacritics
/// stay inside their words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_WORD
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_short_tokens() {
        assert_eq!(
            tokenize("Thủ tục đăng ký, tài khoản: A-b?"),
            vec!["thủ", "tục", "đăng", "ký", "tài", "khoản"]
        );
    }

    #[test]
    fn keeps_digits_and_underscores() {
        assert_eq!(tokenize("CCCD_2024 số 12"), vec!["cccd_2024", "số", "12"]);
    }

    #[test]
    fn empty_and_punctuation_only_yield_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("?! ... -").is_empty());
    }
}
