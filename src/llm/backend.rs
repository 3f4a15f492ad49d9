use super::{BackendError, ChatMessage, FinishReason, Role, Usage};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, FinishReason as OpenAiFinishReason,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;

/// One outbound completion request, fully resolved against client defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// What the backend returned before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub content: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

/// A remote text-generation endpoint.
///
/// Implementations perform exactly one attempt per call; retrying is the
/// caller's job.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion, BackendError>;
}

/// Backend for any OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: OpenAIClient<OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);

        // One HTTP request per call: retries and their schedule belong to the client.
        let single_attempt = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: OpenAIClient::with_config(openai_config).with_backoff(single_attempt),
        }
    }

    fn convert_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage, BackendError> {
        let built = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map(Into::into),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map(Into::into),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map(Into::into),
        };

        built.map_err(|e| BackendError::InvalidRequest(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion, BackendError> {
        let messages = request
            .messages
            .iter()
            .map(Self::convert_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut req_builder = CreateChatCompletionRequestArgs::default();
        req_builder.model(&request.model);
        req_builder.messages(messages);
        req_builder.temperature(request.temperature);
        req_builder.max_tokens(request.max_tokens.min(u16::MAX as u32) as u16);

        let req = req_builder.build().map_err(|e| {
            BackendError::InvalidRequest(format!("Failed to build chat completion request: {}", e))
        })?;

        let response = self
            .client
            .chat()
            .create(req)
            .await
            .map_err(classify_error)?;

        let choice = response.choices.first().ok_or_else(|| {
            BackendError::MalformedResponse("No choices in chat completion response".to_string())
        })?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(RawCompletion {
            content: choice.message.content.clone().unwrap_or_default(),
            usage,
            finish_reason: choice
                .finish_reason
                .as_ref()
                .map(convert_finish_reason)
                .unwrap_or(FinishReason::Unknown),
        })
    }
}

fn convert_finish_reason(reason: &OpenAiFinishReason) -> FinishReason {
    #[allow(unreachable_patterns)]
    match reason {
        OpenAiFinishReason::Stop => FinishReason::Stop,
        OpenAiFinishReason::Length => FinishReason::Length,
        OpenAiFinishReason::ToolCalls => FinishReason::ToolCalls,
        OpenAiFinishReason::ContentFilter => FinishReason::ContentFilter,
        OpenAiFinishReason::FunctionCall => FinishReason::FunctionCall,
        _ => FinishReason::Unknown,
    }
}

/// Map an async-openai failure onto the retry classification.
fn classify_error(err: OpenAIError) -> BackendError {
    match err {
        OpenAIError::Reqwest(e) => BackendError::Transport(e.to_string()),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let message_lower = api.message.to_lowercase();

            if kind.contains("rate_limit") || message_lower.contains("rate limit") {
                BackendError::RateLimited(api.message)
            } else if kind == "authentication_error" || message_lower.contains("api key") {
                BackendError::Authentication(api.message)
            } else if kind == "invalid_request_error" || kind == "insufficient_quota" {
                BackendError::InvalidRequest(api.message)
            } else {
                BackendError::Server(api.message)
            }
        }
        OpenAIError::JSONDeserialize(e) => BackendError::MalformedResponse(e.to_string()),
        OpenAIError::InvalidArgument(msg) => BackendError::InvalidRequest(msg),
        other => BackendError::Transport(other.to_string()),
    }
}
