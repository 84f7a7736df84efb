//! Scripted LLM used by unit tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::llm::{GenerationParams, LlmProvider, TokenStream};
use crate::error::{Error, Result};

/// One scripted reply, consumed per call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these fragments
    Tokens(Vec<String>),
    /// Fail before streaming with a rate-limit payload
    RateLimited(String),
    /// Fail before streaming with a permanent error
    Fails(String),
    /// Stream the fragments, then fail
    Interrupted(Vec<String>, String),
    /// Open the stream, then report a rate limit before any fragment
    RateLimitedInStream(String),
}

impl Reply {
    pub fn tokens(fragments: &[&str]) -> Self {
        Self::Tokens(fragments.iter().map(|s| s.to_string()).collect())
    }
}

/// LLM that plays back a fixed list of replies and records prompts
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Number of generation calls made so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next(&self, prompt: &str) -> Reply {
        self.prompts.lock().push(prompt.to_string());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Fails("script exhausted".to_string()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate_stream(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<TokenStream> {
        match self.next(prompt) {
            Reply::Tokens(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Reply::RateLimited(payload) => Err(Error::Transient(payload)),
            Reply::Fails(message) => Err(Error::upstream(message)),
            Reply::Interrupted(fragments, message) => {
                let items: Vec<Result<String>> = fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(Error::upstream(message))))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            Reply::RateLimitedInStream(payload) => {
                Ok(stream::iter(vec![Err(Error::Transient(payload))]).boxed())
            }
        }
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        match self.next(prompt) {
            Reply::Tokens(fragments) => Ok(fragments.concat()),
            Reply::RateLimited(payload) | Reply::RateLimitedInStream(payload) => {
                Err(Error::Transient(payload))
            }
            Reply::Fails(message) | Reply::Interrupted(_, message) => Err(Error::upstream(message)),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
