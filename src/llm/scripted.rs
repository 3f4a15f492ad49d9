//! Scripted completion backend. `ScriptedBackend::echo()` serves the offline
//! `echo` provider; scripted replies drive the retry and batch tests.
//!
//! Replies are consumed from a queue in order; once the queue is empty the
//! fallback reply is used. Every request is recorded so callers can assert on
//! what was sent.

use super::{BackendError, CompletionBackend, CompletionRequest, FinishReason, RawCompletion, Role, Usage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Ok(RawCompletion),
    Err(BackendError),
    /// Answer with the last user message.
    Echo,
}

#[derive(Debug)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    /// Echoes the last user message once the script runs out.
    pub fn echo() -> Self {
        Self::with_fallback(Reply::Echo)
    }

    pub fn always_ok(content: &str) -> Self {
        Self::with_fallback(Reply::Ok(completion(content)))
    }

    pub fn always_fail(error: BackendError) -> Self {
        Self::with_fallback(Reply::Err(error))
    }

    fn with_fallback(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_ok(self, content: &str) -> Self {
        self.push(Reply::Ok(completion(content)))
    }

    pub fn then_err(self, error: BackendError) -> Self {
        self.push(Reply::Err(error))
    }

    fn push(self, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// A completed reply with a fixed 10/20 token split.
pub fn completion(content: &str) -> RawCompletion {
    RawCompletion {
        content: content.to_string(),
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        },
        finish_reason: FinishReason::Stop,
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion, BackendError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Ok(raw) => Ok(raw),
            Reply::Err(err) => Err(err),
            Reply::Echo => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                Ok(completion(&format!("echo: {}", last_user)))
            }
        }
    }
}
