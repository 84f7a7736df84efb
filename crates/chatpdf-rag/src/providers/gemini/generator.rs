//! Gemini generation provider with server-sent-event streaming

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use super::client::GeminiClient;
use crate::error::{Error, Result};
use crate::providers::llm::{GenerationParams, LlmProvider, TokenStream};

/// Gemini LLM provider
pub struct GeminiLlm {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiLlm {
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn request(prompt: &str, params: &GenerationParams) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                max_output_tokens: params.max_output_tokens,
            },
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Result<String> {
        if let Some(error) = self.error {
            let raw = error.to_string();
            if raw.contains("RESOURCE_EXHAUSTED") || raw.contains("429") {
                return Err(Error::Transient(raw));
            }
            return Err(Error::upstream(raw));
        }

        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default())
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes arrive in arbitrary pieces; only complete lines are interpreted.
/// Returns the payload of every `data:` line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning payloads of the lines completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Interpret whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload.to_string())
}

fn parse_fragment(payload: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(payload)?;
    response.text()
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl SseState {
    fn enqueue(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            match parse_fragment(&payload) {
                Ok(text) if text.is_empty() => {}
                Ok(text) => self.pending.push_back(Ok(text)),
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<TokenStream> {
        let url = format!(
            "{}?alt=sse",
            self.client.endpoint(&self.model, "streamGenerateContent")
        );
        let response = self
            .client
            .post_json(&url, &Self::request(prompt, params))
            .await?;

        let state = SseState {
            body: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let tokens = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        let payloads = state.decoder.push(&bytes);
                        state.enqueue(payloads);
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        state
                            .pending
                            .push_back(Err(Error::upstream(format!("stream interrupted: {}", e))));
                    }
                    None => {
                        let payloads = state.decoder.finish();
                        state.enqueue(payloads);
                        state.finished = true;
                    }
                }
            }
        });

        Ok(tokens.boxed())
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = self.client.endpoint(&self.model, "generateContent");
        let response = self
            .client
            .post_json(&url, &Self::request(prompt, params))
            .await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse Gemini response: {}", e)))?;

        parsed.text()
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let payloads = decoder.push(b":1}\r\n\r\ndata: {\"b\":2}\n");
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\nevent: x\ndata: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail".to_string()]);
    }

    #[test]
    fn test_parse_fragment_text() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(parse_fragment(payload).unwrap(), "Hello");

        let finish_only = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(parse_fragment(finish_only).unwrap(), "");
    }

    #[test]
    fn test_inline_quota_error_is_transient() {
        let payload = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(parse_fragment(payload).unwrap_err().is_transient());
    }
}
