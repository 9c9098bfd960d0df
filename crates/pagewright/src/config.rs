//! Runtime configuration, resolved from environment variables. A
//! `.env` file is honored when the binary loads one before calling
//! `Config::from_env`.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::errors::SetupError;
use crate::providers::configs::{
    AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert web page author. Fulfil the user's request by \
producing a single self-contained HTML document. Page images of any \
attached documents are included in the conversation; read them \
carefully. Use the available tools when you need external information \
or computation. When you are done, reply with the complete HTML \
document and nothing else.";

const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_HOST: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub system_prompt: String,
    pub mcp_config_path: Option<PathBuf>,
    /// Rendering resolution for document pages
    pub dpi: u32,
    /// Pixel cap on a rendered page's longest edge
    pub max_page_edge: u32,
    pub agent: AgentConfig,
}

impl Config {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, SetupError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup; lets tests avoid touching
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider_name = lookup("PAGEWRIGHT_PROVIDER").unwrap_or_else(|| "anthropic".into());

        let provider = match provider_name.as_str() {
            "openai" => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: lookup("OPENAI_HOST").unwrap_or_else(|| DEFAULT_OPENAI_HOST.into()),
                api_key: require(&lookup, "OPENAI_API_KEY")?,
                model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
                temperature: parse_optional(&lookup, "PAGEWRIGHT_TEMPERATURE")?,
                max_tokens: parse_optional(&lookup, "PAGEWRIGHT_MAX_TOKENS")?,
            }),
            "anthropic" => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host: lookup("ANTHROPIC_HOST").unwrap_or_else(|| DEFAULT_ANTHROPIC_HOST.into()),
                api_key: require(&lookup, "ANTHROPIC_API_KEY")?,
                model: lookup("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.into()),
                temperature: parse_optional(&lookup, "PAGEWRIGHT_TEMPERATURE")?,
                max_tokens: parse_optional(&lookup, "PAGEWRIGHT_MAX_TOKENS")?,
            }),
            other => {
                return Err(SetupError::Environment(format!(
                    "unknown provider '{other}', expected 'openai' or 'anthropic'"
                )))
            }
        };

        let mut agent = AgentConfig::default();
        if let Some(limit) = parse_optional::<usize, _>(&lookup, "PAGEWRIGHT_MAX_ITERATIONS")? {
            agent.max_iterations = limit;
        }
        if let Some(seconds) = parse_optional::<u64, _>(&lookup, "PAGEWRIGHT_TOOL_TIMEOUT")? {
            agent.tool_timeout = Duration::from_secs(seconds);
        }

        Ok(Config {
            provider,
            system_prompt: lookup("PAGEWRIGHT_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()),
            mcp_config_path: lookup("PAGEWRIGHT_MCP_CONFIG").map(PathBuf::from),
            dpi: parse_optional(&lookup, "PAGEWRIGHT_DPI")?.unwrap_or(150),
            max_page_edge: parse_optional(&lookup, "PAGEWRIGHT_MAX_PAGE_EDGE")?.unwrap_or(2048),
            agent,
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, SetupError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| SetupError::Environment(format!("{key} is not set")))
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, SetupError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| SetupError::Environment(format!("cannot parse {key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_anthropic() {
        let config =
            Config::from_lookup(lookup_from(&[("ANTHROPIC_API_KEY", "secret")])).unwrap();
        let ProviderConfig::Anthropic(anthropic) = config.provider else {
            panic!("expected anthropic provider");
        };
        assert_eq!(anthropic.api_key, "secret");
        assert_eq!(anthropic.model, DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(config.dpi, 150);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_openai_selection_with_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PAGEWRIGHT_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("PAGEWRIGHT_MAX_ITERATIONS", "7"),
            ("PAGEWRIGHT_DPI", "200"),
        ]))
        .unwrap();

        let ProviderConfig::OpenAi(openai) = config.provider else {
            panic!("expected openai provider");
        };
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.dpi, 200);
        assert_eq!(config.max_page_edge, 2048);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, SetupError::Environment(_)));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PAGEWRIGHT_PROVIDER", "bedrock")]))
            .unwrap_err();
        assert!(err.to_string().contains("bedrock"));
    }

    #[test]
    fn test_unparseable_number_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("ANTHROPIC_API_KEY", "secret"),
            ("PAGEWRIGHT_DPI", "high"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PAGEWRIGHT_DPI"));
    }
}
