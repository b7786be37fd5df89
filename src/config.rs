use crate::clients::{ClientType, OpenAIModel};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

/// Trait for types that can retrieve their configuration key from environment variables
pub trait KeyFromEnv {
    /// The environment variable name for this client's API key
    const KEY_NAME: &'static str;

    /// Find the API key by checking environment variables, after loading `.env`
    fn find_key() -> Option<String> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        env::var(Self::KEY_NAME).ok().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Server configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub static_dir: PathBuf,
    pub client: ClientType,
    pub model: OpenAIModel,
    pub transcript_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            static_dir: PathBuf::from("public"),
            client: ClientType::default(),
            model: OpenAIModel::default(),
            transcript_dir: None,
        }
    }
}

impl AppConfig {
    /// Variables: `QUIZ_HOST`, `PORT`, `QUIZ_STATIC_DIR`, `QUIZ_CLIENT`,
    /// `OPENAI_MODEL`, `QUIZ_TRANSCRIPT_DIR`. Unset ones keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(host) = env::var("QUIZ_HOST") {
            config.host = host.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "QUIZ_HOST",
                reason: e.to_string(),
            })?;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?;
        }
        if let Ok(dir) = env::var("QUIZ_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Ok(client) = env::var("QUIZ_CLIENT") {
            config.client = client
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "QUIZ_CLIENT", reason })?;
        }
        if let Ok(model) = env::var("OPENAI_MODEL") {
            config.model = OpenAIModel::from_id(model.trim());
        }
        config.transcript_dir = env::var("QUIZ_TRANSCRIPT_DIR").ok().map(PathBuf::from);

        Ok(config)
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
