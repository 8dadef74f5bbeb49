use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
    pub recommendation: RecommendationConfig,
    pub explanation: ExplanationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Tokio worker threads for the HTTP server. Defaults to the CPU count.
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Populate the sample catalog and users on startup when the store is empty.
    pub seed_sample_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Users with fewer interactions than this only receive popularity candidates.
    pub min_interactions: usize,
    pub default_count: usize,
    pub max_count: usize,
    pub refresh_queue_capacity: usize,
    pub collaborative: CollaborativeConfig,
    pub content: ContentConfig,
    pub popularity: PopularityConfig,
    pub hybrid: HybridConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeConfig {
    pub min_ratings: usize,
    pub neighbors: usize,
    pub similarity_floor: f64,
    pub like_threshold: f64,
    pub score_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub max_features: usize,
    pub similarity_floor: f64,
    pub like_threshold: u8,
    pub score_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularityConfig {
    pub score_cap: f64,
    /// Interaction count at which the uncapped score would reach 1.0.
    pub saturation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub collaborative_weight: f64,
    pub content_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationBackend {
    Template,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationConfig {
    pub backend: ExplanationBackend,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                workers: num_cpus::get(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                seed_sample_data: true,
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/shoprec".to_string(),
                max_connections: 10,
            },
            recommendation: RecommendationConfig::default(),
            explanation: ExplanationConfig {
                backend: ExplanationBackend::Template,
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                timeout_secs: 10,
                max_tokens: 150,
            },
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_interactions: 3,
            default_count: 5,
            max_count: 100,
            refresh_queue_capacity: 1024,
            collaborative: CollaborativeConfig {
                min_ratings: 10,
                neighbors: 5,
                similarity_floor: 0.1,
                like_threshold: 4.0,
                score_weight: 0.8,
            },
            content: ContentConfig {
                max_features: 100,
                similarity_floor: 0.1,
                like_threshold: 4,
                score_weight: 0.7,
            },
            popularity: PopularityConfig {
                score_cap: 0.8,
                saturation: 10.0,
            },
            hybrid: HybridConfig {
                collaborative_weight: 0.6,
                content_weight: 0.4,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SHOPREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Loads `path` when it exists, otherwise the defaults layered with environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(path).exists() {
            return Self::from_file(path);
        }

        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::Environment::with_prefix("SHOPREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.recommendation.min_interactions, 3);
        assert_eq!(config.recommendation.collaborative.min_ratings, 10);
        assert_eq!(config.recommendation.content.max_features, 100);
        assert_eq!(config.explanation.backend, ExplanationBackend::Template);
    }

    #[test]
    fn test_socket_addr_falls_back_to_unspecified() {
        let server = ServerConfig {
            host: "not-an-ip".to_string(),
            port: 8080,
            workers: 1,
        };
        assert_eq!(server.socket_addr().port(), 8080);
        assert!(server.socket_addr().ip().is_unspecified());
    }

    #[test]
    fn test_worker_threads_is_at_least_one() {
        let mut server = Config::default().server;
        assert_eq!(server.worker_threads(), num_cpus::get().max(1));

        server.workers = 0;
        assert_eq!(server.worker_threads(), 1);
        server.workers = 3;
        assert_eq!(server.worker_threads(), 3);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load("does/not/exist.toml").unwrap();
        assert_eq!(config.recommendation.default_count, 5);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }
}
