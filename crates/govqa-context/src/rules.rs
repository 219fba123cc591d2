//! Pattern tables for the conversational context classifier.
//!
//! Follow-up rules are evaluated in table order and the first match decides.
//! All patterns run against lowercased, trimmed text.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    FollowUp,
    Standalone,
}

#[derive(Debug)]
pub struct Rule {
    pub tag: &'static str,
    pub pattern: Regex,
    pub verdict: Verdict,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

pub static GREETINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(xin )?chào( bạn| anh| chị| em)?[!.?]*$",
        r"^(hi|hello|hey)( bạn| anh| chị| em)?[!.?]*$",
        r"^(chào|hi|hello|hey)$",
        r"^good (morning|afternoon|evening)$",
        r"^(tạm biệt|bye|goodbye)( bạn| anh| chị)?[!.?]*$",
        r"^(cảm ơn|thanks|thank you)( bạn| nhiều)?[!.?]*$",
        r"^ok+[!.?]*$",
        r"^(oke|okay|oki)$",
        r"^(ừ|uh|uhm|à)$",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Keywords that keep a very short query informational.
pub const DOMAIN_KEYWORDS: &[&str] = &["thủ tục", "hồ sơ", "đăng ký", "tra cứu", "dịch vụ"];

pub static TRAILING_PUNCT: LazyLock<Regex> = LazyLock::new(|| compile(r"[!?.]+$"));

pub static CLARIFICATION: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(cụ thể|chi tiết|rõ hơn)\b"));

pub static WORD: LazyLock<Regex> = LazyLock::new(|| compile(r"\b\w+\b"));

pub static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use Verdict::{FollowUp, Standalone};
    [
        ("deictic_reference", r"\b(cái|việc|điều|thủ tục|hồ sơ|dịch vụ|tài khoản|giấy tờ)\s+(đó|này|ấy|kia)\b", FollowUp),
        ("pronoun", r"\b(nó|họ|anh|chị|bạn|mình)\b", FollowUp),
        ("continuation", r"\b(còn|thêm|nữa|sau đó|kế tiếp)\b", FollowUp),
        ("next_step", r"\b(tiếp)\s+(theo)?\b", FollowUp),
        ("demonstrative", r"\b(vậy|thế|như vậy|như thế)\b", FollowUp),
        ("leading_question", r"^(có|được|phải|cần|bao lâu|mất bao lâu|như thế nào|ra sao|thế nào)", FollowUp),
        ("leading_connector", r"^(và|hoặc|hay)", FollowUp),
        ("earlier_mention", r"\b(như trên|như đã|như vừa|ở trên|phía trên|bên trên)\b", FollowUp),
        ("previous_turn", r"\b(câu hỏi trước|vừa rồi|lúc nãy|ban nãy)\b", FollowUp),
        ("comparison", r"\b(so với|khác với|giống|tương tự)\b", FollowUp),
        ("detail_request", r"\b(chi tiết|cụ thể|rõ hơn|thêm về)\b", FollowUp),
        ("this_issue", r"\b(vấn đề (này|đó|ấy))\b", FollowUp),
        ("how_to", r"\b(làm thế nào|làm sao|cách thức|quy trình|hướng dẫn)\s+(để|cho|khi)", Standalone),
        ("action_verb", r"\b(đăng ký|tra cứu|thanh toán|nộp|đăng nhập|sử dụng|tạo|xoá|cập nhật)\b", Standalone),
        ("definition", r"\b(là gì|nghĩa là|có nghĩa|được hiểu)\b", Standalone),
        ("information_request", r"\b(giới thiệu|thông tin về|cho biết về|cho tôi biết)\b", Standalone),
        ("location", r"\b(ở đâu|tại đâu|đâu là|nơi nào)\b", Standalone),
        ("time", r"\b(khi nào|lúc nào|thời gian|thời hạn)\b", Standalone),
        ("agency", r"\b(ai|tổ chức nào|cơ quan nào|bộ phận nào)\b", Standalone),
    ]
    .into_iter()
    .map(|(tag, pattern, verdict)| Rule { tag, pattern: compile(pattern), verdict })
    .collect()
});

pub static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "tôi", "bạn", "anh", "chị", "em", "mình", "là", "của", "và", "có", "được",
        "để", "cho", "khi", "nào", "đó", "này", "thế", "vậy", "như", "với", "từ",
        "về", "trong", "ngoài", "trên", "dưới", "một", "hai", "ba", "các", "những",
        "thì", "hay", "hoặc", "nhưng", "mà", "không", "bị", "đang", "sẽ", "đã",
        "cần", "phải", "muốn", "nên", "làm", "gì", "sao", "đâu", "ai", "ở",
    ]
    .into_iter()
    .collect()
});

/// First rule whose pattern matches `text`.
pub fn first_match(text: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.pattern.is_match(text))
}
