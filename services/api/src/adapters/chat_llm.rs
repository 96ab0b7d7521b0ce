//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the conversational LLM.
//! It implements the `CompletionService` port from the `core` crate on top of the
//! streaming chat-completions API of any OpenAI-compatible provider.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use marginalia_core::domain::{Message, MessageRole};
use marginalia_core::ports::{CompletionService, FragmentStream, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCompletionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompletionAdapter {
    /// Creates a new `OpenAiCompletionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    /// The system prompt followed by the stored history, oldest first.
    fn build_messages(
        system_prompt: &str,
        history: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        );
        for message in history {
            let converted: ChatCompletionRequestMessage = match message.role {
                MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
                MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()?
                    .into(),
            };
            messages.push(converted);
        }
        Ok(messages)
    }
}

fn upstream(e: OpenAIError) -> PortError {
    PortError::Upstream(e.to_string())
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiCompletionAdapter {
    #[allow(deprecated)]
    async fn stream_completion(
        &self,
        system_prompt: &str,
        history: &[Message],
    ) -> PortResult<FragmentStream> {
        let messages = Self::build_messages(system_prompt, history)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .stream(true)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(
            "Opening completion stream with {} history messages on model {}",
            history.len(),
            self.model
        );
        let mut chunks = self.client.chat().create_stream(request).await.map_err(upstream)?;

        // The request is only sent once the stream is polled. Waiting for the first
        // chunk lets a refused request fail before anything is relayed.
        let first = match chunks.next().await {
            Some(Err(e)) => return Err(upstream(e)),
            other => other,
        };

        let fragments = futures::stream::iter(first)
            .chain(chunks)
            .filter_map(|item| async move {
                match item {
                    Ok(chunk) => {
                        let text: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        (!text.is_empty()).then_some(Ok(text))
                    }
                    Err(e) => Some(Err(upstream(e))),
                }
            });

        Ok(Box::pin(fragments))
    }
}
