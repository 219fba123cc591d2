//! Server-sent events decoding for streamed chat completions.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

use govqa_core::{Error, Result, TextStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Text(String),
    Done,
    Skip,
}

/// Decodes one SSE line. Comments, blank lines, non-data fields, empty
/// deltas and unparseable payloads are skipped; an `error` object fails.
pub fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(SseLine::Skip),
    };
    if let Some(err) = event.get("error") {
        return Err(Error::Generation(format!("stream error: {}", err)));
    }
    match event["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(SseLine::Text(text.to_string())),
        _ => Ok(SseLine::Skip),
    }
}

struct Decoder<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    failed: Option<Error>,
    finished: bool,
}

impl<S> Decoder<S> {
    /// Parses every complete line in the buffer, stopping at the first
    /// failing line. Text decoded before it stays queued.
    fn drain_lines(&mut self, flush: bool) -> Result<()> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.handle_line(&line)? {
                return Ok(());
            }
        }
        if flush && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &[u8]) -> Result<bool> {
        match parse_sse_line(&String::from_utf8_lossy(line))? {
            SseLine::Text(text) => self.pending.push_back(text),
            SseLine::Done => {
                self.finished = true;
                self.buffer.clear();
                return Ok(true);
            }
            SseLine::Skip => {}
        }
        Ok(false)
    }
}

/// Turns a raw byte stream of SSE frames into a stream of text deltas.
///
/// Lines are split on raw bytes before UTF-8 decoding, so multi-byte
/// characters cut across network chunks survive intact. A transport error
/// or an `error` event ends the stream after yielding that error.
pub fn text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = Decoder {
        bytes: bytes.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        failed: None,
        finished: false,
    };

    stream::unfold(decoder, |mut d| async move {
        loop {
            if let Some(text) = d.pending.pop_front() {
                return Some((Ok(text), d));
            }
            if let Some(e) = d.failed.take() {
                d.finished = true;
                return Some((Err(e), d));
            }
            if d.finished {
                return None;
            }
            match d.bytes.next().await {
                Some(Ok(chunk)) => {
                    d.buffer.extend_from_slice(chunk.as_ref());
                    if let Err(e) = d.drain_lines(false) {
                        d.failed = Some(e);
                    }
                }
                Some(Err(e)) => {
                    d.failed = Some(Error::Generation(format!("stream read error: {}", e)));
                }
                None => {
                    d.finished = true;
                    if let Err(e) = d.drain_lines(true) {
                        d.failed = Some(e);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Xin chào"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Text("Xin chào".to_string()));
    }

    #[test]
    fn done_marker_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("event: ping").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json").unwrap(), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
    }

    #[test]
    fn error_event_fails() {
        let line = r#"data: {"error":{"message":"rate limited"}}"#;
        assert!(matches!(parse_sse_line(line), Err(Error::Generation(_))));
    }

    fn frame(text: &str) -> String {
        format!("data: {}\n\n", serde_json::json!({"choices": [{"delta": {"content": text}}]}))
    }

    #[tokio::test]
    async fn reassembles_text_split_inside_multibyte_chars() {
        let body = format!("{}{}data: [DONE]\n\n", frame("Thủ tục "), frame("đăng ký"));
        let bytes = body.into_bytes();
        // Split every 3 bytes so Vietnamese characters straddle chunks.
        let chunks: Vec<std::result::Result<Vec<u8>, String>> =
            bytes.chunks(3).map(|c| Ok(c.to_vec())).collect();

        let out: Vec<String> = text_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out.concat(), "Thủ tục đăng ký");
    }

    #[tokio::test]
    async fn stops_at_done_and_ignores_trailing_frames() {
        let body = format!("{}data: [DONE]\n{}", frame("một"), frame("hai"));
        let chunks = vec![Ok::<_, String>(body.into_bytes())];
        let out: Vec<String> = text_stream(stream::iter(chunks)).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["một"]);
    }

    #[tokio::test]
    async fn transport_error_is_last_item() {
        let chunks = vec![Ok(frame("một").into_bytes()), Err("connection reset".to_string())];
        let items: Vec<Result<String>> = text_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "một");
        assert!(matches!(items[1], Err(Error::Generation(_))));
    }

    #[tokio::test]
    async fn unterminated_last_line_is_flushed() {
        let body = r#"data: {"choices":[{"delta":{"content":"cuối"}}]}"#;
        let chunks = vec![Ok::<_, String>(body.as_bytes().to_vec())];
        let out: Vec<String> = text_stream(stream::iter(chunks)).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["cuối"]);
    }
}
