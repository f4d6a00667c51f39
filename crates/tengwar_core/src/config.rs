use crate::classifier::ClassifierConfig;
use crate::emotion::EmotionConfig;
use crate::time::{TimeBucket, TimeBuckets};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TengwarConfig {
    /// Fast, local backend used by the thought daemon.
    pub thought_backend: BackendConfig,
    /// Higher-capability backend used for dialogue.
    pub dialogue_backend: BackendConfig,
    pub daemon: DaemonConfig,
    pub dialogue: DialogueConfig,
    pub emotion: EmotionConfig,
    pub time: TimeBuckets,
    pub classifier: ClassifierConfig,
    pub editor: EditorConfig,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for TengwarConfig {
    fn default() -> Self {
        Self {
            thought_backend: BackendConfig::default(),
            dialogue_backend: BackendConfig::dialogue_default(),
            daemon: DaemonConfig::default(),
            dialogue: DialogueConfig::default(),
            emotion: EmotionConfig::default(),
            time: TimeBuckets::default(),
            classifier: ClassifierConfig::default(),
            editor: EditorConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TengwarConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: TengwarConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            for backend in [&mut self.thought_backend, &mut self.dialogue_backend] {
                backend.for_each_mut(&mut |b| {
                    if b.provider == "anthropic" && b.api_key.is_none() {
                        b.api_key = Some(key.clone());
                    }
                });
            }
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            for backend in [&mut self.thought_backend, &mut self.dialogue_backend] {
                backend.for_each_mut(&mut |b| {
                    if b.provider == "ollama" {
                        b.base_url = Some(url.clone());
                    }
                });
            }
        }
        if let Ok(v) = std::env::var("TENGWAR_THOUGHT_MODEL") {
            self.thought_backend.model = v;
        }
        if let Ok(v) = std::env::var("TENGWAR_DIALOGUE_MODEL") {
            self.dialogue_backend.model = v;
        }
        if let Ok(v) = std::env::var("TENGWAR_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("TENGWAR_GATEWAY_PORT") {
            if let Ok(n) = v.parse() {
                self.gateway.port = n;
            }
        }
        if let Ok(v) = std::env::var("TENGWAR_SELF_ROOT") {
            self.editor.self_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TENGWAR_LANGUAGE_ROOT") {
            self.editor.language_root = PathBuf::from(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// "ollama", "anthropic" or "mock".
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard bound on one completion call, after which the result is discarded.
    pub timeout_secs: u64,
    /// Tried when this backend fails.
    pub fallback: Option<Box<BackendConfig>>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5:3b".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.8,
            max_tokens: 256,
            timeout_secs: 60,
            fallback: None,
        }
    }
}

impl BackendConfig {
    pub fn dialogue_default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 120,
            fallback: Some(Box::new(Self {
                model: "qwen2.5:7b".to_string(),
                temperature: 0.7,
                max_tokens: 2048,
                timeout_secs: 120,
                ..Self::default()
            })),
        }
    }

    fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut BackendConfig)) {
        f(self);
        if let Some(fb) = self.fallback.as_mut() {
            fb.for_each_mut(f);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub enabled: bool,
    /// Pause between thoughts when excitement and curiosity are maxed.
    pub min_interval_secs: f64,
    /// Pause between thoughts when excitement and curiosity are zero.
    pub max_interval_secs: f64,
    pub jitter_secs: f64,
    pub context_thoughts: usize,
    pub context_messages: usize,
    /// First retry delay after a failed backend call; doubles per consecutive failure.
    pub backoff_base_secs: f64,
    pub max_backoff_secs: f64,
    /// Silence of at least this size triggers a one-off `long_silence` event.
    pub long_silence_after: TimeBucket,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 8.0,
            max_interval_secs: 30.0,
            jitter_secs: 3.0,
            context_thoughts: 5,
            context_messages: 3,
            backoff_base_secs: 10.0,
            max_backoff_secs: 300.0,
            long_silence_after: TimeBucket::Hours,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub context_thoughts: usize,
    pub history_turns: usize,
    pub relevant_memories: usize,
    /// Characters of a read file shown inline before truncation.
    pub read_preview_chars: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            context_thoughts: 5,
            history_turns: 20,
            relevant_memories: 3,
            read_preview_chars: 1500,
        }
    }
}

/// Which allow-listed root is the version-controlled one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsRoot {
    SelfRoot,
    #[default]
    LanguageRoot,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// The agent's own source tree.
    pub self_root: PathBuf,
    /// The embedded language's source tree.
    pub language_root: PathBuf,
    pub vcs_root: VcsRoot,
    pub commit_prefix: String,
    pub git_timeout_secs: u64,
    pub push_timeout_secs: u64,
    pub interpreter: InterpreterConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            self_root: PathBuf::from("."),
            language_root: PathBuf::from("../tengwar-lang"),
            vcs_root: VcsRoot::LanguageRoot,
            commit_prefix: "[Tengwar AI] ".to_string(),
            git_timeout_secs: 10,
            push_timeout_secs: 30,
            interpreter: InterpreterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// External runtime; receives the code on stdin.
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: "tengwar".to_string(),
            args: vec![],
            timeout_secs: 10,
            max_output_bytes: 16 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "tengwar.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Directory for daily-rolling log files; stdout only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
