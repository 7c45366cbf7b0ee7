//! Configuration for the orchestration engine: provider defaults for the LLM
//! endpoint, environment variable overrides, and an `EngineConfig` loaded
//! from an optional TOML file describing the workspace, loop limits, and
//! external tool sources.
//!
//! ## Environment Variables
//!
//! - `AGENT_ORCHESTRATOR_BASE_URL`: override the LLM base URL
//! - `AGENT_ORCHESTRATOR_MODEL`: override the model name
//! - `AGENT_ORCHESTRATOR_API_KEY`: override the API key

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// PROVIDER ENUM (LLM endpoint defaults)
// ============================================================================

/// Well-known local LLM server providers, all OpenAI-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

/// Resolve the LLM base URL: `AGENT_ORCHESTRATOR_BASE_URL` env var, then the
/// provider's default, then `fallback`, then LM Studio's default.
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("AGENT_ORCHESTRATOR_BASE_URL") {
        return url;
    }
    if let Some(p) = provider {
        return p.default_url().to_string();
    }
    fallback.unwrap_or(Provider::LMStudio.default_url()).to_string()
}

/// Resolve the model name: `AGENT_ORCHESTRATOR_MODEL` env var when
/// `prefer_env` is set, else `fallback`.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("AGENT_ORCHESTRATOR_MODEL") {
            return Some(model);
        }
    }
    fallback.map(|s| s.to_string())
}

fn get_api_key(fallback: Option<&str>) -> String {
    env::var("AGENT_ORCHESTRATOR_API_KEY")
        .ok()
        .or_else(|| fallback.map(|s| s.to_string()))
        .unwrap_or_default()
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

fn default_max_loop_count() -> u32 {
    10
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_context_token_budget() -> usize {
    8192
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpSourceConfig {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Engine-level configuration, loaded from an optional TOML file and
/// overridden by environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_loop_count")]
    pub max_loop_count: u32,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
    #[serde(default)]
    pub mcp_sources: Vec<McpSourceConfig>,
    #[serde(default)]
    pub remote_sources: Vec<RemoteSourceConfig>,
}

impl EngineConfig {
    /// A minimal config with just a workspace root; everything else takes
    /// its default.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            base_url: None,
            model: None,
            api_key: None,
            max_loop_count: default_max_loop_count(),
            tool_timeout_secs: default_tool_timeout_secs(),
            context_token_budget: default_context_token_budget(),
            mcp_sources: Vec::new(),
            remote_sources: Vec::new(),
        }
    }

    /// Load from a TOML file, then clamp/validate. Does not itself apply
    /// environment variable overrides — see [`EngineConfig::resolved_base_url`]
    /// and friends, which are checked at the point of use.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(Error::Io)?;
        let mut config: EngineConfig = toml::from_str(&text).map_err(|e| Error::config(e.to_string()))?;
        config.max_loop_count = config.max_loop_count.clamp(1, 50);
        Ok(config)
    }

    pub fn resolved_base_url(&self) -> String {
        get_base_url(None, self.base_url.as_deref())
    }

    pub fn resolved_model(&self) -> Option<String> {
        get_model(self.model.as_deref(), true)
    }

    pub fn resolved_api_key(&self) -> String {
        get_api_key(self.api_key.as_deref())
    }

    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_default_urls() {
        assert_eq!(Provider::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("lmstudio".parse::<Provider>(), Ok(Provider::LMStudio));
        assert_eq!("LM-Studio".parse::<Provider>(), Ok(Provider::LMStudio));
        assert_eq!("llama.cpp".parse::<Provider>(), Ok(Provider::LlamaCpp));
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_get_base_url_with_provider() {
        unsafe {
            env::remove_var("AGENT_ORCHESTRATOR_BASE_URL");
        }
        let url = get_base_url(Some(Provider::Ollama), None);
        assert_eq!(url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::new("/tmp/workspace");
        assert_eq!(config.max_loop_count, 10);
        assert_eq!(config.tool_timeout_secs, 120);
        assert!(config.mcp_sources.is_empty());
    }

    #[test]
    fn test_engine_config_clamp_applies_only_on_load() {
        let mut config = EngineConfig::new("/tmp/workspace");
        config.max_loop_count = 999;
        assert_eq!(config.max_loop_count, 999);
        config.max_loop_count = config.max_loop_count.clamp(1, 50);
        assert_eq!(config.max_loop_count, 50);
    }

    #[tokio::test]
    async fn test_engine_config_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("engine-config-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("config.toml");
        tokio::fs::write(
            &path,
            r#"
            workspace_root = "/tmp/ws"
            max_loop_count = 999
            [[mcp_sources]]
            label = "fs"
            command = "mcp-fs-server"
            args = ["--root", "/tmp"]
            "#,
        )
        .await
        .unwrap();

        let config = EngineConfig::load(&path).await.unwrap();
        assert_eq!(config.max_loop_count, 50);
        assert_eq!(config.mcp_sources.len(), 1);
        assert_eq!(config.mcp_sources[0].label, "fs");
    }
}
