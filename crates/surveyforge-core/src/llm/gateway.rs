//! Safety-aware LLM gateway: prompt shaping, retries, cooldown, fallback.
//!
//! All generation in the workflow goes through one gateway instance. The
//! gateway serializes provider calls behind a single mutex (the provider is
//! inherently single-concurrent to respect remote limits), paces calls to a
//! minimum interval, arms a process-wide cooldown on quota/rate errors, and
//! walks a three-attempt prompt ladder before substituting fallback prose.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::safety::{self, Domain, SectionKind};
use super::{FinishReason, GenerationParams, LlmProvider, LlmResponse, TokenUsage};
use crate::config::Config;
use crate::error::LlmError;

/// Generation attempts per `generate` call.
const MAX_ATTEMPTS: u32 = 3;

/// Minimum trimmed response length for a response to count as valid.
const MIN_VALID_CHARS: usize = 20;

/// Temperature floor for the retry ladder.
const MIN_TEMPERATURE: f32 = 0.05;

/// Gateway tuning knobs, usually built from [`Config`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base sampling temperature for the first attempt.
    pub base_temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Minimum interval between provider calls.
    pub min_request_interval: Duration,
    /// Process-wide pause armed by quota/rate errors.
    pub cooldown: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_temperature: 0.1,
            max_tokens: 4096,
            min_request_interval: Duration::from_millis(500),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Derive gateway settings from the workflow configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            min_request_interval: Duration::from_millis(config.llm.min_request_interval_ms),
            cooldown: Duration::from_secs(config.research.api_cooldown_secs),
        }
    }
}

/// Result of a gateway generation, successful or substituted.
#[derive(Debug, Clone)]
pub struct GatewayOutput {
    /// The generated (or fallback) text, trimmed.
    pub text: String,
    /// Whether `text` is templated fallback prose rather than model output.
    ///
    /// Callers must propagate this so draft metadata can report which
    /// sections are model-generated.
    pub fallback: bool,
    /// How many provider attempts were made.
    pub attempts: u32,
    /// Token usage accumulated across all attempts.
    pub usage: TokenUsage,
}

struct PacerState {
    next_allowed: Instant,
}

/// The workflow's single entry point for language-model generation.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    config: GatewayConfig,
    state: Mutex<PacerState>,
}

impl LlmGateway {
    /// Wrap a provider with the given gateway settings.
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        Self {
            provider,
            config,
            state: Mutex::new(PacerState {
                next_allowed: Instant::now(),
            }),
        }
    }

    /// Generate text for a prompt within a research domain.
    ///
    /// Walks the prompt ladder (shaped, ultra-safe, minimal) with falling
    /// temperature. Never returns an error: after all attempts are
    /// exhausted the output carries domain fallback prose with
    /// `fallback = true`.
    pub async fn generate(&self, prompt: &str, system: &str, domain: Domain) -> GatewayOutput {
        let shaped_system = safety::sanitize_for_domain(system, domain);
        let mut usage = TokenUsage::default();

        for attempt in 1..=MAX_ATTEMPTS {
            let user_prompt = match attempt {
                1 => safety::shape_prompt(prompt, domain),
                2 => safety::ultra_safe_prompt(prompt, domain),
                _ => safety::minimal_safe_prompt(domain),
            };
            let params = GenerationParams {
                max_tokens: self.config.max_tokens,
                temperature: self.attempt_temperature(attempt),
            };

            match self.paced_complete(&shaped_system, &user_prompt, &params).await {
                Ok(response) => {
                    usage.accumulate(&response.usage);
                    if let Some(text) = valid_text(&response) {
                        tracing::debug!(attempt, domain = %domain, "generation succeeded");
                        return GatewayOutput {
                            text,
                            fallback: false,
                            attempts: attempt,
                            usage,
                        };
                    }
                    tracing::warn!(attempt, domain = %domain, "response blocked or too short");
                }
                Err(e) => {
                    tracing::warn!(attempt, domain = %domain, error = %e, "generation attempt failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(inter_attempt_delay(attempt)).await;
            }
        }

        tracing::warn!(domain = %domain, "all generation attempts exhausted, using fallback");
        GatewayOutput {
            text: safety::fallback_content(domain, SectionKind::infer(prompt)),
            fallback: true,
            attempts: MAX_ATTEMPTS,
            usage,
        }
    }

    /// Arm the process-wide cooldown without a provider call.
    ///
    /// Used by the orchestrator when a stage fails with an API-class error
    /// so the next stage attempt does not immediately hammer the provider.
    pub async fn trigger_cooldown(&self) {
        let mut state = self.state.lock().await;
        let target = Instant::now() + self.config.cooldown;
        if target > state.next_allowed {
            tracing::info!(
                cooldown_secs = self.config.cooldown.as_secs(),
                "LLM cooldown armed"
            );
            state.next_allowed = target;
        }
    }

    fn attempt_temperature(&self, attempt: u32) -> f32 {
        let reduction = 0.05 * (attempt.saturating_sub(1)) as f32;
        (self.config.base_temperature - reduction).max(MIN_TEMPERATURE)
    }

    /// Single provider call, serialized and paced.
    ///
    /// The mutex is held across the call so callers from every stage are
    /// strictly single-concurrent; quota/rate errors arm the cooldown
    /// before the lock is released.
    async fn paced_complete(
        &self,
        system: &str,
        user: &str,
        params: &GenerationParams,
    ) -> Result<LlmResponse, LlmError> {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if state.next_allowed > now {
            tokio::time::sleep_until(state.next_allowed).await;
        }

        let result = self.provider.complete(system, user, params).await;

        state.next_allowed = Instant::now() + self.config.min_request_interval;
        if let Err(e) = &result {
            if e.triggers_cooldown() {
                state.next_allowed = Instant::now() + self.config.cooldown;
                tracing::info!(
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "LLM cooldown armed after provider error"
                );
            }
        }

        result
    }
}

fn valid_text(response: &LlmResponse) -> Option<String> {
    if response.finish_reason == FinishReason::Safety {
        return None;
    }
    let trimmed = response.text.trim();
    if trimmed.chars().count() < MIN_VALID_CHARS {
        return None;
    }
    Some(trimmed.to_string())
}

fn inter_attempt_delay(attempt: u32) -> Duration {
    Duration::from_secs((u64::from(attempt) * 2).min(5))
}
