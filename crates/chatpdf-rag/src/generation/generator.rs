//! Streaming answer generation with bounded rate-limit backoff

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::{GenerationParams, LlmProvider, TokenStream};
use crate::retry::{tokio_sleeper, Sleeper};

/// Title returned when the model produces nothing usable
pub const FALLBACK_TITLE: &str = "New Conversation";

static RETRY_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*s").expect("valid retry pattern")
});

static RETRY_DELAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).expect("valid retryDelay pattern")
});

/// Lifecycle of one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Requesting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Streaming,
    Completed,
    Failed,
}

/// Delay schedule for rate-limited requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial request
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Added on top of a provider-supplied hint
    pub hint_buffer: Duration,
    /// Upper bound of the uniform jitter
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            hint_buffer: Duration::from_millis(config.retry_hint_buffer_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Delay before retry number `attempt + 1`. A hint in the provider
    /// payload wins over the exponential schedule.
    pub fn delay(&self, attempt: u32, payload: &str, jitter: Duration) -> Duration {
        match parse_retry_hint(payload) {
            Some(hint) => hint.saturating_add(self.hint_buffer),
            None => self
                .base_delay
                .checked_mul(2u32.saturating_pow(attempt))
                .unwrap_or(Duration::MAX)
                .saturating_add(jitter),
        }
    }

    /// Uniform random jitter in `[0, max_jitter]`
    pub fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Parse a retry hint such as `retry in 12s`, `retry after 30 seconds` or
/// `"retryDelay": "7s"` out of a provider error payload. Values too large
/// for a [`Duration`] are ignored.
pub fn parse_retry_hint(payload: &str) -> Option<Duration> {
    let captures = RETRY_DELAY
        .captures(payload)
        .or_else(|| RETRY_IN.captures(payload))?;
    let seconds: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Answer and title generation on top of an [`LlmProvider`]
pub struct Generator {
    llm: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    answer_params: GenerationParams,
    title_params: GenerationParams,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            llm,
            policy: RetryPolicy::from_config(config),
            sleeper: tokio_sleeper(),
            answer_params: GenerationParams::answer(config),
            title_params: GenerationParams::title(config),
        }
    }

    /// Replace the sleeper used for backoff
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Open a token stream for `prompt`.
    ///
    /// Rate-limit signals before the first fragment are retried with backoff,
    /// whether the provider refuses the request or reports them inside the
    /// stream. When retries run out the error is [`Error::RateLimited`]. Any
    /// other failure is returned immediately. The returned stream yields
    /// non-empty fragments and ends after its first error.
    pub async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let mut state = GenerationState::Idle;
        let mut attempt = 0u32;

        loop {
            state = transition(state, GenerationState::Requesting { attempt });

            let opened = match self.llm.generate_stream(prompt, &self.answer_params).await {
                Ok(tokens) => first_fragment(tokens).await,
                Err(e) => Err(e),
            };

            match opened {
                Ok(tokens) => {
                    transition(state, GenerationState::Streaming);
                    return Ok(track(tokens));
                }
                Err(Error::Transient(payload)) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt, &payload, self.policy.jitter());
                    warn!(
                        "{} rate limited, retry {}/{} in {:?}",
                        self.llm.name(),
                        attempt + 1,
                        self.policy.max_retries,
                        delay
                    );
                    state = transition(state, GenerationState::Backoff { attempt, delay });
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(Error::Transient(payload)) => {
                    transition(state, GenerationState::Failed);
                    return Err(Error::RateLimited(format!(
                        "the model is still rate limited after {} retries, please try again later ({})",
                        self.policy.max_retries, payload
                    )));
                }
                Err(e) => {
                    transition(state, GenerationState::Failed);
                    return Err(e);
                }
            }
        }
    }

    /// Single short completion (e.g. a title). Never fails: errors and empty
    /// output yield [`FALLBACK_TITLE`].
    pub async fn generate_short(&self, prompt: &str) -> String {
        match self.llm.generate(prompt, &self.title_params).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => FALLBACK_TITLE.to_string(),
            Err(e) => {
                warn!("Short generation failed, using fallback: {}", e);
                FALLBACK_TITLE.to_string()
            }
        }
    }
}

fn transition(from: GenerationState, to: GenerationState) -> GenerationState {
    debug!(?from, ?to, "generation state");
    to
}

/// Wait for the first non-empty fragment and put it back in front, so an
/// error reported before any text surfaces as a failed request
async fn first_fragment(mut tokens: TokenStream) -> Result<TokenStream> {
    loop {
        match tokens.next().await {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => {
                return Ok(stream::once(async move { Ok(text) }).chain(tokens).boxed())
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(stream::empty().boxed()),
        }
    }
}

/// Drop empty fragments, stop after the first error and log the final state
fn track(tokens: TokenStream) -> TokenStream {
    stream::unfold(Some(tokens), |tokens| async move {
        let mut tokens = tokens?;
        loop {
            match tokens.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => return Some((Ok(text), Some(tokens))),
                Some(Err(e)) => {
                    transition(GenerationState::Streaming, GenerationState::Failed);
                    return Some((Err(e), None));
                }
                None => {
                    transition(GenerationState::Streaming, GenerationState::Completed);
                    return None;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{Reply, ScriptedLlm};
    use crate::retry::RecordingSleeper;

    fn config(max_jitter_ms: u64) -> LlmConfig {
        LlmConfig {
            max_jitter_ms,
            ..Default::default()
        }
    }

    fn generator(replies: Vec<Reply>, jitter_ms: u64) -> (Generator, Arc<ScriptedLlm>, RecordingSleeper) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let sleeper = RecordingSleeper::new();
        let generator = Generator::new(llm.clone(), &config(jitter_ms))
            .with_sleeper(Arc::new(sleeper.clone()));
        (generator, llm, sleeper)
    }

    async fn collect(tokens: TokenStream) -> Vec<Result<String>> {
        tokens.collect().await
    }

    #[test]
    fn test_parse_retry_hint() {
        assert_eq!(
            parse_retry_hint("Quota exceeded. Please retry in 37.5s."),
            Some(Duration::from_millis(37_500))
        );
        assert_eq!(
            parse_retry_hint("try again: retry after 30 seconds"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_hint(r#"{"details":[{"retryDelay": "7s"}]}"#),
            Some(Duration::from_secs(7))
        );
        assert_eq!(parse_retry_hint("429 Too Many Requests"), None);
    }

    #[test]
    fn test_oversized_hint_is_ignored() {
        let payload = "Quota exceeded. Please retry in 99999999999999999999s.";
        assert_eq!(parse_retry_hint(payload), None);

        let policy = RetryPolicy::from_config(&config(0));
        assert_eq!(policy.delay(1, payload, Duration::ZERO), Duration::from_secs(4));

        let saturating = RetryPolicy {
            hint_buffer: Duration::MAX,
            ..policy
        };
        assert_eq!(saturating.delay(0, "retry in 5s", Duration::ZERO), Duration::MAX);
    }

    #[tokio::test]
    async fn test_oversized_hint_falls_back_to_schedule() {
        let (generator, llm, sleeper) = generator(
            vec![
                Reply::RateLimited("Please retry in 99999999999999999999s.".to_string()),
                Reply::tokens(&["ok"]),
            ],
            0,
        );

        let tokens = collect(generator.stream("prompt").await.unwrap()).await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(llm.calls(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_exponential_schedule() {
        let policy = RetryPolicy::from_config(&config(1000));
        assert_eq!(policy.delay(0, "429", Duration::ZERO), Duration::from_secs(2));
        assert_eq!(policy.delay(2, "429", Duration::from_millis(300)), Duration::from_millis(8_300));
        assert_eq!(policy.delay(2, "retry in 5s", Duration::from_millis(300)), Duration::from_secs(6));

        for _ in 0..50 {
            assert!(policy.jitter() <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_two_rate_limits() {
        let (generator, llm, sleeper) = generator(
            vec![
                Reply::RateLimited("429".to_string()),
                Reply::RateLimited("RESOURCE_EXHAUSTED".to_string()),
                Reply::tokens(&["Hel", "", "lo"]),
            ],
            0,
        );

        let tokens = generator.stream("prompt").await.unwrap();
        let tokens: Vec<String> = collect(tokens).await.into_iter().map(|t| t.unwrap()).collect();

        assert_eq!(tokens, vec!["Hel", "lo"]);
        assert_eq!(llm.calls(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_provider_hint_overrides_schedule() {
        let (generator, _llm, sleeper) = generator(
            vec![
                Reply::RateLimited("Please retry in 7s.".to_string()),
                Reply::tokens(&["ok"]),
            ],
            1000,
        );

        generator.stream("prompt").await.unwrap();
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(8)]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_rate_limited() {
        let (generator, llm, sleeper) =
            generator(vec![Reply::RateLimited("429".to_string()); 4], 0);

        let err = generator.stream("prompt").await.err().unwrap();
        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(llm.calls(), 4);
        assert_eq!(sleeper.delays().len(), 3);
    }

    #[tokio::test]
    async fn test_in_stream_rate_limit_is_retried() {
        let (generator, llm, sleeper) = generator(
            vec![
                Reply::RateLimitedInStream("RESOURCE_EXHAUSTED: retry in 3s".to_string()),
                Reply::tokens(&["", "ok"]),
            ],
            0,
        );

        let tokens: Vec<String> = collect(generator.stream("prompt").await.unwrap())
            .await
            .into_iter()
            .map(|t| t.unwrap())
            .collect();

        assert_eq!(tokens, vec!["ok"]);
        assert_eq!(llm.calls(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(4)]);
    }

    #[tokio::test]
    async fn test_in_stream_rate_limits_exhaust_retries() {
        let (generator, llm, _sleeper) =
            generator(vec![Reply::RateLimitedInStream("429".to_string()); 4], 0);

        let err = generator.stream("prompt").await.err().unwrap();
        assert!(matches!(err, Error::RateLimited(_)), "got {:?}", err);
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let (generator, llm, sleeper) = generator(vec![Reply::Fails("bad key".to_string())], 0);

        let err = generator.stream("prompt").await.err().unwrap();
        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(llm.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_stream_stops_after_error() {
        let (generator, _llm, _sleeper) = generator(
            vec![Reply::Interrupted(vec!["partial".to_string()], "reset".to_string())],
            0,
        );

        let items = collect(generator.stream("prompt").await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_generate_short_falls_back() {
        let (generator, _llm, _sleeper) = generator(
            vec![
                Reply::tokens(&["Refund ", "Policy"]),
                Reply::tokens(&["   "]),
                Reply::RateLimited("429".to_string()),
            ],
            0,
        );

        assert_eq!(generator.generate_short("p").await, "Refund Policy");
        assert_eq!(generator.generate_short("p").await, FALLBACK_TITLE);
        assert_eq!(generator.generate_short("p").await, FALLBACK_TITLE);
    }
}
