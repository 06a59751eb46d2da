//! Configuration parsing and validation.
//!
//! docchat is configured via a TOML file (default: `config/docchat.toml`).
//! Every section is optional; missing values fall back to the defaults
//! below. Secrets are never read from the file: the config names the
//! environment variables that hold them.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/docchat.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:5000"
//! cors_origin = "http://localhost:5173"
//!
//! [chunking]
//! chunk_size = 20
//! overlap = 10
//!
//! [embedding]
//! provider = "openai"
//! base_url = "https://api.cohere.ai/compatibility/v1"
//! model = "embed-v4.0"
//! dims = 1536
//! api_key_env = "COHERE_API_KEY"
//!
//! [chat]
//! provider = "cohere"
//! model = "command-a-03-2025"
//!
//! [vector]
//! url = "http://localhost:6333"
//! collection = "documents"
//! point_id_scope = "file"
//!
//! [retrieval]
//! limit = 20
//!
//! [upload]
//! max_files = 3
//! ```
//!
//! # Validation
//!
//! [`load_config`] rejects:
//! - `chunking.chunk_size == 0` or `chunking.overlap >= chunking.chunk_size`
//! - `embedding.dims == 0`, `embedding.batch_size == 0`
//! - `retrieval.limit == 0`, `upload.max_files == 0`
//! - unknown embedding or chat provider names
//! - a `session.cookie_name` that is not an RFC 6265 cookie-name token

use anyhow::{bail, Context, Result};
use docchat_core::store::PointIdScope;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/docchat.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// The single browser origin allowed to send credentialed requests.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

/// Session cookie attributes.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub max_age_secs: u64,
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sessionId".to_string(),
            max_age_secs: 3600,
            secure: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between neighbouring chunks.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            overlap: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"openai"` (any OpenAI-compatible endpoint) or `"disabled"`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub dims: usize,
    /// Name of the environment variable holding the bearer key.
    pub api_key_env: String,
    /// Maximum number of texts per embeddings request. Larger inputs are
    /// split; the default is Cohere's per-request input cap.
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.cohere.ai/compatibility/v1".to_string(),
            model: "embed-v4.0".to_string(),
            dims: 1536,
            api_key_env: "COHERE_API_KEY".to_string(),
            batch_size: 96,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// `"cohere"`, `"openai"` or `"disabled"`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "cohere".to_string(),
            base_url: "https://api.cohere.com".to_string(),
            model: "command-a-03-2025".to_string(),
            api_key_env: "COHERE_API_KEY".to_string(),
            max_retries: 3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    pub url: String,
    /// Environment variable holding the Qdrant API key. Unset or empty
    /// variable means no key is sent.
    pub api_key_env: String,
    pub collection: String,
    pub point_id_scope: PointIdScope,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key_env: "QDRANT_API_KEY".to_string(),
            collection: "documents".to_string(),
            point_id_scope: PointIdScope::File,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved per grounded answer.
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_files: usize,
    pub max_file_bytes: usize,
    /// Limit on the whole multipart request body.
    pub max_request_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: 3,
            max_file_bytes: 20 * 1024 * 1024,
            max_request_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Read a secret from the environment variable `name`. Empty values count
/// as unset.
pub fn secret_from_env(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.limit == 0 {
        bail!("retrieval.limit must be >= 1");
    }
    if config.upload.max_files == 0 {
        bail!("upload.max_files must be >= 1");
    }
    if config.upload.max_file_bytes == 0 {
        bail!("upload.max_file_bytes must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.trim().is_empty() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.chat.provider.as_str() {
        "disabled" | "cohere" | "openai" => {}
        other => bail!(
            "Unknown chat provider: '{}'. Must be disabled, cohere, or openai.",
            other
        ),
    }

    if config.vector.collection.trim().is_empty() {
        bail!("vector.collection must not be empty");
    }

    if !is_cookie_token(&config.session.cookie_name) {
        bail!(
            "session.cookie_name '{}' is not a valid cookie name",
            config.session.cookie_name
        );
    }

    Ok(())
}

/// RFC 6265 `token`: visible ASCII without separators.
fn is_cookie_token(name: &str) -> bool {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !SEPARATORS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 20);
        assert_eq!(config.chunking.overlap, 10);
        assert_eq!(config.retrieval.limit, 20);
        assert_eq!(config.upload.max_files, 3);
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.model, "embed-v4.0");
        assert_eq!(config.chat.model, "command-a-03-2025");
        assert_eq!(config.vector.collection, "documents");
        assert_eq!(config.vector.point_id_scope, PointIdScope::File);
        assert_eq!(config.session.cookie_name, "sessionId");
        assert_eq!(config.session.max_age_secs, 3600);
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../../../config/docchat.example.toml")).unwrap();
        assert_eq!(config.embedding.base_url, EmbeddingConfig::default().base_url);
        assert_eq!(config.upload.max_file_bytes, 20 * 1024 * 1024);
        assert!(config.session.secure);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [vector]
            point_id_scope = "global"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.cors_origin, "http://localhost:5173");
        assert_eq!(config.vector.point_id_scope, PointIdScope::Global);
        assert_eq!(config.vector.url, "http://localhost:6333");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = parse_config("[chunking]\nchunk_size = 10\noverlap = 10\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
        assert!(parse_config("[chunking]\nchunk_size = 0\noverlap = 0\n").is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[chat]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[chat]\nprovider = \"openai\"\n").is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(parse_config("[retrieval]\nlimit = 0\n").is_err());
        assert!(parse_config("[upload]\nmax_files = 0\n").is_err());
        assert!(parse_config("[embedding]\ndims = 0\n").is_err());
        assert!(parse_config("[embedding]\nprovider = \"disabled\"\ndims = 0\n").is_ok());
    }

    #[test]
    fn test_cookie_name_must_be_a_token() {
        assert!(parse_config("[session]\ncookie_name = \"sid_v2\"\n").is_ok());
        for bad in ["", "session id", "sid;x", "sid=1", "s\u{00e9}ssion"] {
            let text = format!("[session]\ncookie_name = \"{}\"\n", bad);
            let err = parse_config(&text).unwrap_err();
            assert!(err.to_string().contains("cookie_name"), "{:?}", bad);
        }
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
