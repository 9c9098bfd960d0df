use super::anthropic::AnthropicProvider;
use super::base::{Provider, ProviderError};
use super::configs::ProviderConfig;
use super::openai::OpenAiProvider;

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
    }
}
