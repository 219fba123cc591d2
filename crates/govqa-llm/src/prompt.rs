//! Message assembly for grounded answers.

use govqa_core::{ChatMessage, DocKind, Document};

/// Fixed user-facing reply when generation fails.
pub const APOLOGY: &str = "Xin lỗi, tôi không thể tìm thấy thông tin phù hợp để trả lời câu hỏi của bạn. \
Vui lòng thử lại với câu hỏi khác hoặc liên hệ với bộ phận hỗ trợ.";

pub const SYSTEM_PROMPT: &str = "Bạn là trợ lý AI chuyên về Dịch vụ công Quốc gia của Việt Nam.

Nhiệm vụ của bạn:
- Hỗ trợ người dân về các thủ tục hành chính và dịch vụ công
- Hướng dẫn sử dụng dịch vụ công trực tuyến
- Trả lời các câu hỏi về quy trình, giấy tờ cần thiết
- Cung cấp thông tin chính xác dựa trên dữ liệu được cung cấp

Nguyên tắc trả lời:
1. Lời chào hoặc trò chuyện xã giao: trả lời ngắn gọn, thân thiện, giới thiệu vai trò và mời đặt câu hỏi cụ thể.
   Câu hỏi mơ hồ: hỏi lại để làm rõ nhu cầu. Câu hỏi theo ngữ cảnh: dùng lịch sử trò chuyện để trả lời chính xác.
2. CHỈ dựa trên dữ liệu được cung cấp, KHÔNG tự suy đoán hoặc tự tạo thông tin.
   Thiếu thông tin: nói rõ phần nào thiếu và hướng dẫn liên hệ cơ quan có thẩm quyền (Cổng DVC Quốc gia, UBND, Bộ ngành).
3. Câu hỏi ngoài phạm vi dịch vụ công: lịch sự từ chối. Câu hỏi pháp lý chuyên sâu: khuyên tham khảo luật sư hoặc chuyên gia.
   Không đưa ra quan điểm cá nhân.
4. Trình bày rõ ràng, dùng danh sách khi câu trả lời dài, đề xuất đường dẫn liên quan khi có.
5. Ưu tiên chính xác hơn đầy đủ; nếu nghi ngờ thông tin cũ, khuyên người dùng kiểm tra nguồn chính thức mới nhất.";

/// User turn listing up to `max_contexts` passages followed by the question.
/// Links come from the rendered passage text.
pub fn build_user_prompt(query: &str, contexts: &[&Document], max_contexts: usize) -> String {
    if contexts.is_empty() {
        return format!("Câu hỏi của người dùng: {}", query);
    }

    let mut prompt = String::from("Dưới đây là các thông tin liên quan đến câu hỏi của người dùng:\n\n");
    for (i, doc) in contexts.iter().take(max_contexts).enumerate() {
        let n = i + 1;
        match (doc.metadata.kind, doc.metadata.category.as_deref()) {
            (DocKind::Faq, _) => prompt.push_str(&format!("[FAQ] Nguồn {}:\n{}\n", n, doc.text)),
            (_, Some(category)) if !category.is_empty() => {
                prompt.push_str(&format!("[{}] Nguồn {}:\n{}\n", category, n, doc.text))
            }
            _ => prompt.push_str(&format!("Nguồn {}:\n{}\n", n, doc.text)),
        }
        prompt.push_str("---\n");
    }
    prompt.push_str(&format!("\nCâu hỏi của người dùng: {}\n\n", query));
    prompt.push_str(
        "Hãy trả lời câu hỏi dựa trên các thông tin được cung cấp ở trên. \
         Trả lời đầy đủ, rõ ràng, dễ hiểu bằng tiếng Việt. \
         Nếu có đường dẫn liên quan, hãy đề xuất người dùng truy cập để biết thêm chi tiết.",
    );
    prompt
}

/// System prompt, then the last `window` history turns when `use_history`,
/// then the grounded user prompt.
pub fn build_messages(
    query: &str,
    contexts: &[&Document],
    history: &[ChatMessage],
    use_history: bool,
    window: usize,
    max_contexts: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    if use_history && !history.is_empty() {
        let start = history.len().saturating_sub(window);
        tracing::debug!(turns = history.len() - start, "including chat history");
        messages.extend(history[start..].iter().cloned());
    }
    messages.push(ChatMessage::user(build_user_prompt(query, contexts, max_contexts)));
    messages
}
