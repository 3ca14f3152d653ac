use crate::client_wrapper::{ClientError, ClientWrapper, Message, TokenUsage};
use crate::clients::openai_compatible::OpenAICompatibleClient;
use crate::config::{AgoraConfig, DEFAULT_BASE_URL};
use crate::error::ChatError;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// DeepSeek speaks the OpenAI protocol; this wrapper only pins the base URL and model names.
pub struct DeepSeekClient {
    client: OpenAICompatibleClient,
}

// Models served by api.deepseek.com
pub enum Model {
    DeepSeekChat,
    DeepSeekReasoner,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::DeepSeekChat => "deepseek-chat".to_string(),
        Model::DeepSeekReasoner => "deepseek-reasoner".to_string(),
    }
}

impl DeepSeekClient {
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Result<Self, ChatError> {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }

    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Result<Self, ChatError> {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(
        secret_key: &str,
        model_name: &str,
        base_url: &str,
    ) -> Result<Self, ChatError> {
        if secret_key.trim().is_empty() {
            return Err(ChatError::Configuration(
                "DEEPSEEK_API_KEY not found".to_string(),
            ));
        }
        Ok(DeepSeekClient {
            client: OpenAICompatibleClient::new(secret_key, model_name, base_url)?,
        })
    }

    /// Build from the key, model and base URL in `config`.
    pub fn from_config(config: &AgoraConfig) -> Result<Self, ChatError> {
        Self::new_with_base_url(&config.api_key, &config.model, &config.base_url)
    }
}

#[async_trait]
impl ClientWrapper for DeepSeekClient {
    fn model_name(&self) -> &str {
        self.client.model_name()
    }

    async fn send_message(
        &self,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<Message, ClientError> {
        self.client.send_message(messages, temperature).await
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        self.client.usage_slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_rejected() {
        let err = DeepSeekClient::new_with_model_enum("", Model::DeepSeekChat).err().unwrap();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[test]
    fn model_names() {
        let client =
            DeepSeekClient::new_with_model_enum("sk-test", Model::DeepSeekReasoner).unwrap();
        assert_eq!(client.model_name(), "deepseek-reasoner");
    }
}
