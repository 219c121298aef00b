use websearch_qa_common::{ChunkingStrategy, SearchProvider, SystemConfig};

#[test]
fn env_override_changes_max_concurrent_chunks() {
    std::env::set_var("MAX_CONCURRENT_CHUNKS", "5");
    let mut config = SystemConfig::default();
    config.tavily_api_key = "key".to_string();
    config.apply_env_overrides();
    assert_eq!(config.max_concurrent_chunks, 5);
    std::env::remove_var("MAX_CONCURRENT_CHUNKS");
}

#[test]
fn default_search_provider_is_tavily() {
    let config = SystemConfig::default();
    assert_eq!(config.search_provider, SearchProvider::Tavily);
    assert_eq!(config.chunking_strategy, ChunkingStrategy::Contextual);
}

#[test]
fn google_provider_requires_key_and_cx() {
    let mut config = SystemConfig::default();
    config.search_provider = SearchProvider::Google;
    config.google_api_key = "key".to_string();
    assert!(config.validate().is_err(), "missing cx should fail validation");
    config.google_cx = "cx".to_string();
    assert!(config.validate().is_ok());
}
