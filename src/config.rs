use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ProbeError, ProbeResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProbeConfig {
    #[serde(default)]
    pub structural: StructuralConfig,
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub resolution_mode: ResolutionMode,
    #[serde(default)]
    pub debug: bool,
    /// Explicit agent-in-the-loop environment; see [`AgentEnvironment::detect`].
    #[serde(default)]
    pub agent: AgentEnvironment,
}

/// Structural automation CLI: command invoked per operation with `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Endpoint the CLI should target (e.g. devtools port of the app under test).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            command: "app-driver".to_string(),
            args: Vec::new(),
            endpoint: None,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

/// Long-lived helper subprocess spoken to over stdio lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_bridge_timeout_ms")]
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisionConfig {
    /// Must match a key under [vision.providers.*]; empty disables the tier.
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub api_base: String,
    pub model: String,
    /// "anthropic" for Claude, "agent" for the in-the-loop bridge,
    /// None for OpenAI-compatible endpoints.
    #[serde(default)]
    pub adapter: Option<String>,
    /// Optional key stored in uiprobe.toml (falls back to UIPROBE_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub pricing: Option<PricingEntry>,
}

/// Per-provider pricing override, per 1,000 tokens / per image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingEntry {
    pub input_token_price: f64,
    pub output_token_price: f64,
    #[serde(default)]
    pub image_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub vision_http_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            wait_interval_ms: default_wait_interval_ms(),
            vision_http_ms: default_http_timeout_ms(),
        }
    }
}

/// Which resolution tiers `find` may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Ref cache → structural query → visual fallback.
    #[default]
    Hybrid,
    /// Never pay for a vision call.
    DeterministicOnly,
    /// Skip deterministic tiers entirely.
    VisualOnly,
}

impl ResolutionMode {
    pub fn allows_deterministic(&self) -> bool {
        !matches!(self, ResolutionMode::VisualOnly)
    }

    pub fn allows_visual(&self) -> bool {
        !matches!(self, ResolutionMode::DeterministicOnly)
    }
}

/// Where agent-in-the-loop answers come from. Threaded through configuration
/// at construction; nothing sniffs the ambient environment afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AgentEnvironment {
    #[default]
    Disabled,
    /// Request files written to `dir`, answers polled from `<request>.answer`.
    FileBridge { dir: PathBuf },
    /// Answer provided up front through an environment variable.
    EnvAnswer { answer: String },
}

impl AgentEnvironment {
    /// Pure classification over an explicit env snapshot.
    pub fn detect(env: &HashMap<String, String>) -> Self {
        if let Some(dir) = env.get("UIPROBE_AGENT_DIR") {
            if !dir.is_empty() {
                return AgentEnvironment::FileBridge {
                    dir: PathBuf::from(dir),
                };
            }
        }
        if let Some(answer) = env.get("UIPROBE_AGENT_ANSWER") {
            if !answer.is_empty() {
                return AgentEnvironment::EnvAnswer {
                    answer: answer.clone(),
                };
            }
        }
        AgentEnvironment::Disabled
    }

    /// Snapshot the real process environment and classify it.
    pub fn from_process_env() -> Self {
        Self::detect(&std::env::vars().collect())
    }
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

fn default_bridge_timeout_ms() -> u64 {
    15_000
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}

fn default_wait_interval_ms() -> u64 {
    100
}

fn default_http_timeout_ms() -> u64 {
    60_000
}

fn default_max_tokens() -> u32 {
    1024
}

fn resolve_config_path() -> ProbeResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("uiprobe.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("uiprobe.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ProbeError::Config(
        "uiprobe.toml not found next to executable or in working directory".into(),
    ))
}

/// Loads uiprobe.toml, after sourcing `.env` if present. Read once at
/// construction; the engine never re-reads configuration.
pub fn load_config() -> ProbeResult<ProbeConfig> {
    let _ = dotenvy::dotenv();
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: ProbeConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        provider = %config.vision.active_provider,
        "config loaded"
    );
    Ok(config)
}

/// API key lookup order: uiprobe.toml entry, then UIPROBE_<ID>_API_KEY.
pub fn resolve_api_key(id: &str, entry: &ProviderEntry) -> String {
    std::env::var(format!("UIPROBE_{}_API_KEY", id.to_uppercase()))
        .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_detection_is_pure_over_snapshot() {
        let mut env = HashMap::new();
        assert_eq!(AgentEnvironment::detect(&env), AgentEnvironment::Disabled);

        env.insert("UIPROBE_AGENT_ANSWER".to_string(), "{\"found\":false}".to_string());
        assert!(matches!(
            AgentEnvironment::detect(&env),
            AgentEnvironment::EnvAnswer { .. }
        ));

        // The file bridge wins over an env answer when both are present.
        env.insert("UIPROBE_AGENT_DIR".to_string(), "/tmp/agent".to_string());
        assert_eq!(
            AgentEnvironment::detect(&env),
            AgentEnvironment::FileBridge {
                dir: PathBuf::from("/tmp/agent")
            }
        );
    }

    #[test]
    fn mode_gates() {
        assert!(ResolutionMode::Hybrid.allows_deterministic());
        assert!(ResolutionMode::Hybrid.allows_visual());
        assert!(!ResolutionMode::DeterministicOnly.allows_visual());
        assert!(!ResolutionMode::VisualOnly.allows_deterministic());
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg: ProbeConfig = toml::from_str(
            r#"
            [structural]
            command = "tauri-driver"
            args = ["--port", "4444"]

            [vision]
            active_provider = "anthropic"

            [vision.providers.anthropic]
            api_base = "https://api.anthropic.com/v1"
            model = "claude-sonnet-4-20250514"
            adapter = "anthropic"
            "#,
        )
        .expect("toml");
        assert_eq!(cfg.structural.command, "tauri-driver");
        assert_eq!(cfg.vision.active_provider, "anthropic");
        assert_eq!(cfg.timeouts.wait_interval_ms, 100);
        assert_eq!(cfg.resolution_mode, ResolutionMode::Hybrid);
    }
}
