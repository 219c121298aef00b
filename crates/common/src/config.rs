use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

/// Which provider `WebSearcher` dials out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    Tavily,
    Google,
}

/// Which chunking strategy the Chunker stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Simple,
    Contextual,
}

/// All configuration recognised by the pipeline.
///
/// Loaded via [`SystemConfig::load`] (TOML file) and layered with the
/// environment-variable overrides `MAX_CONCURRENT_CHUNKS`, `TAVILY_API_KEY`,
/// `QDRANT_HOST`, `QDRANT_PORT` in [`SystemConfig::apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub llm_model: String,
    pub embedding_model: String,
    pub vllm_base_url: String,
    pub embedding_base_url: String,

    pub search_provider: SearchProvider,
    #[serde(default)]
    pub tavily_api_key: String,
    #[serde(default)]
    pub google_api_key: String,
    #[serde(default)]
    pub google_cx: String,

    pub vector_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunking_strategy: ChunkingStrategy,

    pub max_processing_time_secs: f64,

    pub qdrant_host: String,
    pub qdrant_port: u16,

    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,
}

fn default_max_concurrent_chunks() -> usize {
    2
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            llm_model: "Qwen/Qwen3-4B-Instruct-2507-FP8".to_string(),
            embedding_model: "bge-large:335m".to_string(),
            vllm_base_url: "http://localhost:8000/v1".to_string(),
            embedding_base_url: "http://localhost:11434/v1".to_string(),
            search_provider: SearchProvider::Tavily,
            tavily_api_key: String::new(),
            google_api_key: String::new(),
            google_cx: String::new(),
            vector_dimension: 1024,
            chunk_size: 1000,
            chunk_overlap: 200,
            chunking_strategy: ChunkingStrategy::Contextual,
            max_processing_time_secs: 10.0,
            qdrant_host: "localhost".to_string(),
            qdrant_port: 6333,
            max_concurrent_chunks: 2,
        }
    }
}

impl SystemConfig {
    /// Loads configuration from a TOML file and validates it.
    ///
    /// Invalid configuration (zero dimension, missing API key for the
    /// configured search provider) fails here, at system construction, not
    /// at query time.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SystemConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-variable overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MAX_CONCURRENT_CHUNKS") {
            if let Ok(parsed) = v.parse() {
                self.max_concurrent_chunks = parsed;
            }
        }
        if let Ok(v) = std::env::var("TAVILY_API_KEY") {
            self.tavily_api_key = v;
        }
        if let Ok(v) = std::env::var("QDRANT_HOST") {
            self.qdrant_host = v;
        }
        if let Ok(v) = std::env::var("QDRANT_PORT") {
            if let Ok(parsed) = v.parse() {
                self.qdrant_port = parsed;
            }
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.vector_dimension == 0 {
            return Err(PipelineError::Config(
                "vector_dimension must be non-zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::Config(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_chunks must be non-zero".to_string(),
            ));
        }
        match self.search_provider {
            SearchProvider::Tavily if self.tavily_api_key.is_empty() => Err(PipelineError::Config(
                "tavily_api_key is required when search_provider = tavily".to_string(),
            )),
            SearchProvider::Google if self.google_api_key.is_empty() || self.google_cx.is_empty() => {
                Err(PipelineError::Config(
                    "google_api_key and google_cx are required when search_provider = google"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn max_processing_time(&self) -> Duration {
        Duration::from_secs_f64(self.max_processing_time_secs)
    }

    pub fn session_collection_name(session_id: &str) -> String {
        format!("session_{session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.tavily_api_key = "test-key".to_string();
        config
    }

    #[test]
    fn default_config_with_api_key_validates() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut config = valid_config();
        config.vector_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_rejected() {
        let mut config = valid_config();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_tavily_key_rejected() {
        let mut config = SystemConfig::default();
        config.tavily_api_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn session_collection_name_matches_convention() {
        assert_eq!(SystemConfig::session_collection_name("abc"), "session_abc");
    }

    #[test]
    fn load_parses_toml_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            llm_model = "test-model"
            embedding_model = "test-embed"
            vllm_base_url = "http://localhost:8000/v1"
            embedding_base_url = "http://localhost:11434/v1"
            search_provider = "tavily"
            tavily_api_key = "key"
            vector_dimension = 1024
            chunk_size = 1000
            chunk_overlap = 200
            chunking_strategy = "simple"
            max_processing_time_secs = 10.0
            qdrant_host = "localhost"
            qdrant_port = 6333
            "#,
        )
        .unwrap();

        let config = SystemConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.max_concurrent_chunks, 2);
        assert_eq!(config.chunking_strategy, ChunkingStrategy::Simple);
    }
}
