use super::{
    BackendError, ChatMessage, ClientError, CompletionBackend, CompletionRequest,
    KeywordSafetyCheck, Metadata, ModelResponse, OpenAiBackend, Prompt, RawCompletion,
    ResponseCache, SafetyCheck, SafetyPolicy, UsageLedger, UsageStats,
};
use super::scripted::ScriptedBackend;
use crate::config::{LlmConfig, Provider};
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call overrides for [`CompletionClient::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Memoize under this key. A key that is already cached wins over every
    /// other argument, including a different prompt.
    pub cache_key: Option<String>,
    pub metadata: Metadata,
}

impl GenerateOptions {
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Options shared by every prompt of a [`CompletionClient::batch_generate`] run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub system_prompt: Option<String>,
    pub batch_size: usize,
    /// Cache each slot under `batch_{group_start}_{index_in_group}`.
    pub use_cache: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub metadata: Metadata,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            batch_size: 5,
            use_cache: false,
            temperature: None,
            max_tokens: None,
            metadata: Metadata::new(),
        }
    }
}

/// Result of a single attempt against the backend.
enum AttemptOutcome {
    Success(RawCompletion),
    Retryable(BackendError),
    Fatal(BackendError),
}

/// Completion client with bounded retries, a response cache and a usage ledger.
///
/// Calls are strictly sequential: every operation that touches the cache or
/// the ledger takes `&mut self`, so sharing a client between tasks requires
/// wrapping it in a mutex.
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    safety: Box<dyn SafetyCheck>,
    config: LlmConfig,
    cache: ResponseCache,
    ledger: UsageLedger,
}

impl CompletionClient {
    /// Build a client for `config.provider`.
    ///
    /// The OpenAI-compatible provider requires a credential; the echo
    /// provider runs offline.
    pub fn new(config: LlmConfig) -> Result<Self, ClientError> {
        let backend: Arc<dyn CompletionBackend> = match config.provider {
            Provider::OpenAi => {
                let api_key = config.resolve_api_key().ok_or_else(|| {
                    ClientError::Configuration(format!(
                        "API key required: set {} or llm.api_key",
                        config.api_key_env
                    ))
                })?;
                Arc::new(OpenAiBackend::new(&api_key, &config.base_url))
            }
            Provider::Echo => {
                tracing::info!("Using offline echo provider");
                Arc::new(ScriptedBackend::echo())
            }
        };

        Ok(Self::with_backend(config, backend))
    }

    /// Build a client around any backend. No credential is required here.
    pub fn with_backend(config: LlmConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        tracing::info!("Completion client initialized with model: {}", config.model);

        Self {
            backend,
            safety: Box::new(KeywordSafetyCheck::new()),
            config,
            cache: ResponseCache::new(),
            ledger: UsageLedger::new(),
        }
    }

    pub fn with_safety_check(mut self, safety: Box<dyn SafetyCheck>) -> Self {
        self.safety = safety;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Run one logical completion call.
    pub async fn generate(
        &mut self,
        prompt: impl Into<Prompt>,
        options: GenerateOptions,
    ) -> Result<Arc<ModelResponse>, ClientError> {
        if let Some(key) = &options.cache_key {
            if let Some(cached) = self.cache.get(key) {
                tracing::info!(cache_key = %key, "Returning cached response");
                return Ok(cached);
            }
        }

        let messages = build_messages(prompt.into(), options.system_prompt.as_deref())?;

        if self.config.safe_mode {
            self.run_safety_check(&messages)?;
        }

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };

        let started = Instant::now();
        let (raw, attempt) = match self.call_with_retries(&request).await {
            Ok(result) => result,
            Err(err) => {
                self.ledger.record_failure();
                tracing::error!(error = %err, "Completion call failed");
                return Err(err);
            }
        };

        let response = Arc::new(ModelResponse {
            content: raw.content,
            model: self.config.model.clone(),
            usage: raw.usage,
            finish_reason: raw.finish_reason,
            timestamp: Utc::now(),
            metadata: options.metadata,
        });

        self.ledger.record_success(&response.usage);

        if let Some(key) = options.cache_key {
            self.cache.insert(key, response.clone());
        }

        if self.config.enable_logging {
            log_interaction(&request.messages, &response, attempt);
        }

        tracing::info!(
            "Generated response in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(response)
    }

    /// Run every prompt in order, one at a time, with pacing between calls.
    ///
    /// Always returns one response per prompt. A prompt whose call fails is
    /// represented by an error-flagged response (see [`ModelResponse::is_error`])
    /// instead of aborting the batch.
    pub async fn batch_generate<P>(
        &mut self,
        prompts: Vec<P>,
        options: &BatchOptions,
    ) -> Vec<Arc<ModelResponse>>
    where
        P: Into<Prompt>,
    {
        let total = prompts.len();
        let batch_size = options.batch_size.max(1);
        let pacing = self.base_delay();
        let mut responses = Vec::with_capacity(total);
        let mut remaining = prompts.into_iter().peekable();
        let mut group_start = 0;

        while remaining.peek().is_some() {
            let group: Vec<Prompt> = remaining.by_ref().take(batch_size).map(Into::into).collect();
            let group_len = group.len();

            tracing::debug!(group_start, group_len, total, "Processing batch group");

            for (index, prompt) in group.into_iter().enumerate() {
                let call_options = GenerateOptions {
                    system_prompt: options.system_prompt.clone(),
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                    cache_key: options
                        .use_cache
                        .then(|| format!("batch_{}_{}", group_start, index)),
                    metadata: options.metadata.clone(),
                };

                match self.generate(prompt, call_options).await {
                    Ok(response) => responses.push(response),
                    Err(err) => {
                        tracing::error!(
                            "Failed to process prompt {}: {}",
                            group_start + index,
                            err
                        );
                        responses.push(Arc::new(ModelResponse::error(
                            &self.config.model,
                            &err.to_string(),
                        )));
                    }
                }

                if index + 1 < group_len {
                    tokio::time::sleep(pacing).await;
                }
            }

            group_start += group_len;
            if group_start < total {
                tokio::time::sleep(pacing.saturating_mul(2)).await;
            }
        }

        responses
    }

    pub fn get_usage_stats(&self) -> UsageStats {
        self.ledger.snapshot()
    }

    pub fn reset_usage_stats(&mut self) {
        self.ledger.reset();
        tracing::info!("Usage statistics reset");
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        tracing::info!("Response cache cleared");
    }

    pub fn export_cache(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        self.cache.export(path.as_ref())
    }

    pub fn import_cache(&mut self, path: impl AsRef<Path>) -> Result<usize, ClientError> {
        self.cache.import(path.as_ref())
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(self.config.rate_limit_delay_ms)
    }

    fn run_safety_check(&self, messages: &[ChatMessage]) -> Result<(), ClientError> {
        let combined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let verdict = self.safety.check(&combined);
        if verdict.safe {
            return Ok(());
        }

        tracing::warn!(
            confidence = verdict.confidence,
            "Safety check failed: {}",
            verdict.reason
        );

        match self.config.safety_policy {
            SafetyPolicy::Advisory => Ok(()),
            SafetyPolicy::Enforce => Err(ClientError::SafetyBlocked(verdict.reason)),
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> AttemptOutcome {
        match self.backend.complete(request).await {
            Ok(raw) => AttemptOutcome::Success(raw),
            Err(err) if err.is_retryable() => AttemptOutcome::Retryable(err),
            Err(err) => AttemptOutcome::Fatal(err),
        }
    }

    /// Linear backoff: the wait before retry `n` is `base_delay * n`.
    async fn call_with_retries(
        &self,
        request: &CompletionRequest,
    ) -> Result<(RawCompletion, u32), ClientError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(request).await {
                AttemptOutcome::Success(raw) => return Ok((raw, attempt)),
                AttemptOutcome::Fatal(err) => {
                    tracing::error!(attempt, max_attempts, "Attempt {} failed: {}", attempt, err);
                    return Err(ClientError::RemoteCallFailed {
                        attempts: attempt,
                        source: err,
                    });
                }
                AttemptOutcome::Retryable(err) => {
                    tracing::warn!(attempt, max_attempts, "Attempt {} failed: {}", attempt, err);
                    if attempt >= max_attempts {
                        return Err(ClientError::RemoteCallFailed {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tokio::time::sleep(retry_delay(self.base_delay(), attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Wait before retry `attempt + 1`: `base * attempt`, saturating instead of overflowing.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Resolve a prompt into the message sequence sent to the backend.
fn build_messages(
    prompt: Prompt,
    system_prompt: Option<&str>,
) -> Result<Vec<ChatMessage>, ClientError> {
    let mut messages = Vec::new();

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }

    match prompt {
        Prompt::Text(text) => messages.push(ChatMessage::user(text)),
        Prompt::Messages(sequence) => {
            if sequence.is_empty() {
                return Err(ClientError::InvalidInput(
                    "message sequence is empty".to_string(),
                ));
            }
            messages.extend(sequence);
        }
    }

    Ok(messages)
}

fn log_interaction(messages: &[ChatMessage], response: &ModelResponse, attempt: u32) {
    let entry = json!({
        "timestamp": response.timestamp,
        "model": response.model,
        "messages": messages,
        "response": {
            "content": response.content,
            "finish_reason": response.finish_reason,
            "usage": response.usage,
        },
        "attempt": attempt,
        "metadata": response.metadata,
    });

    tracing::info!(
        target: "redteam_kit::interactions",
        model = %response.model,
        attempt,
        total_tokens = response.usage.total_tokens,
        "Model interaction logged: {}",
        entry
    );
}
