use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load `config.toml` + `config.<env>.toml` + `APP_*` from the working directory.
    pub fn load() -> Result<Self> {
        Self::load_in(Path::new("."))
    }

    pub fn load_in(base: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Build from an inline TOML document, without files or environment.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract the full typed settings tree. Missing keys take their defaults.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("Failed to read settings: {}", e)))?;
        if settings.llm.api_key.as_deref().map_or(true, str::is_empty) {
            settings.llm.api_key = env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppConfig,
    pub paths: PathsConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub hybrid: HybridConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { env: "development".to_string(), debug: false }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env == "production" || self.env == "prod"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub vector_index: PathBuf,
    pub sparse_index: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            vector_index: PathBuf::from("embeddings/vector_index.json"),
            sparse_index: PathBuf::from("embeddings/bm25_index.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dim: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dim: 384, batch_size: 32 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub fallback_k: usize,
    /// Maximum vector distance for a candidate to count as relevant.
    pub similarity_threshold: f32,
    pub max_contexts_in_prompt: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 10, fallback_k: 3, similarity_threshold: 1.2, max_contexts_in_prompt: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub retrieval_multiplier: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 5, retrieval_multiplier: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    Rrf,
    Weighted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub enabled: bool,
    /// `rrf` or `weighted`; anything else falls back to `rrf`.
    pub fusion: String,
    pub bm25_weight: f32,
    pub vector_weight: f32,
    pub bm25_retrieval_multiplier: usize,
    pub rrf_k: f32,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fusion: "rrf".to_string(),
            bm25_weight: 0.5,
            vector_weight: 0.5,
            bm25_retrieval_multiplier: 2,
            rrf_k: 60.0,
        }
    }
}

impl HybridConfig {
    pub fn fusion_method(&self) -> FusionMethod {
        match self.fusion.trim().to_ascii_lowercase().as_str() {
            "rrf" => FusionMethod::Rrf,
            "weighted" => FusionMethod::Weighted,
            other => {
                tracing::warn!(fusion = other, "unknown fusion method, using rrf");
                FusionMethod::Rrf
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, max_size: 1000, ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub stream: bool,
    pub reasoning_effort: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai".to_string(),
            model: "openai/gpt-oss-120b".to_string(),
            temperature: 1.0,
            max_tokens: 8192,
            timeout_secs: 60,
            stream: true,
            reasoning_effort: Some("medium".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub context_window_messages: usize,
    pub max_history: usize,
    pub max_query_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { context_window_messages: 5, max_history: 10, max_query_length: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl Settings {
    /// Expand and resolve every configured path against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let paths = &mut self.paths;
        paths.data_dir = resolve_with_base(base, paths.data_dir.to_string_lossy());
        paths.vector_index = resolve_with_base(base, paths.vector_index.to_string_lossy());
        paths.sparse_index = resolve_with_base(base, paths.sparse_index.to_string_lossy());
    }

    /// Startup gate: every problem is reported at once and serving must not
    /// start while any remains.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            errors.push("llm.api_key (or GROQ_API_KEY) is required".to_string());
        }
        if !self.paths.data_dir.exists() {
            errors.push(format!("Data directory not found: {}", self.paths.data_dir.display()));
        }
        if self.app.is_production() && self.app.debug {
            errors.push("app.debug must be false in production".to_string());
        }
        if self.retrieval.top_k == 0 {
            errors.push("retrieval.top_k must be greater than zero".to_string());
        }
        if self.rerank.retrieval_multiplier == 0 || self.hybrid.bm25_retrieval_multiplier == 0 {
            errors.push("retrieval multipliers must be at least 1".to_string());
        }
        if errors.is_empty() {
            return Ok(());
        }
        let listing: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        Err(Error::InvalidConfig(format!("Configuration validation failed:\n{}", listing.join("\n"))))
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
