use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ANSWER_TEMPERATURE: f64 = 0.3;
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 1500;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the consultant service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend answering chat requests.
    pub chat_backend: ChatBackend,
    /// API key for the embedding and chat completion services.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat completion model used for every generation stage.
    pub chat_model: String,
    /// API key for the Pinecone index.
    pub pinecone_api_key: Option<String>,
    /// Host URL of the Pinecone index (`https://<index>-<project>.svc.<region>.pinecone.io`).
    pub pinecone_index_host: Option<String>,
    /// Number of passages requested from the index.
    pub top_k: usize,
    /// Wall-clock budget applied to every outbound call.
    pub upstream_timeout_secs: u64,
    /// Optional deadline bounding one whole pipeline run.
    pub pipeline_deadline_secs: Option<u64>,
    /// Sampling temperature for answer synthesis.
    pub answer_temperature: f64,
    /// Output ceiling for answer synthesis.
    pub answer_max_tokens: u32,
    /// Notebook identifier used by the legacy notebook backends.
    pub notebook_id: Option<String>,
    /// Executable launching the notebook MCP server.
    pub notebook_mcp_command: String,
    /// Executable of the notebook query CLI.
    pub notebook_cli_command: String,
    /// Optional command run before each CLI query to refresh credentials.
    pub notebook_auth_command: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported answer backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChatBackend {
    /// Retrieval-augmented pipeline over the vector index.
    Rag,
    /// Notebook MCP server spawned as a child process.
    NotebookMcp,
    /// Notebook query CLI.
    NotebookCli,
}

impl ChatBackend {
    /// Stable identifier reported by health checks.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::NotebookMcp => "notebook-mcp",
            Self::NotebookCli => "notebook-cli",
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chat_backend = match load_env_optional("CHAT_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("CHAT_BACKEND".to_string()))?,
            None => ChatBackend::Rag,
        };

        let config = Self {
            chat_backend,
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            embedding_model: load_env_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            chat_model: load_env_or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            pinecone_api_key: load_env_optional("PINECONE_API_KEY"),
            pinecone_index_host: load_env_optional("PINECONE_INDEX_HOST"),
            top_k: parse_env("RAG_TOP_K")?.unwrap_or(DEFAULT_TOP_K),
            upstream_timeout_secs: parse_env("UPSTREAM_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            pipeline_deadline_secs: parse_env("PIPELINE_DEADLINE_SECS")?,
            answer_temperature: parse_env("ANSWER_TEMPERATURE")?
                .unwrap_or(DEFAULT_ANSWER_TEMPERATURE),
            answer_max_tokens: parse_env("ANSWER_MAX_TOKENS")?
                .unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            notebook_id: load_env_optional("NOTEBOOK_ID"),
            notebook_mcp_command: load_env_or("NOTEBOOK_MCP_COMMAND", "notebooklm-mcp"),
            notebook_cli_command: load_env_or("NOTEBOOK_CLI_COMMAND", "nlm"),
            notebook_auth_command: load_env_optional("NOTEBOOK_AUTH_COMMAND"),
            server_port: parse_env("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Per-call timeout as a [`Duration`].
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue("RAG_TOP_K".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("UPSTREAM_TIMEOUT_SECS".into()));
        }

        match self.chat_backend {
            ChatBackend::Rag => {
                require(&self.openai_api_key, "OPENAI_API_KEY")?;
                require(&self.pinecone_api_key, "PINECONE_API_KEY")?;
                require(&self.pinecone_index_host, "PINECONE_INDEX_HOST")?;
            }
            ChatBackend::NotebookMcp | ChatBackend::NotebookCli => {
                require(&self.notebook_id, "NOTEBOOK_ID")?;
            }
        }
        Ok(())
    }
}

fn require(value: &Option<String>, key: &str) -> Result<(), ConfigError> {
    if value.is_none() {
        return Err(ConfigError::MissingVariable(key.to_string()));
    }
    Ok(())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for ChatBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rag" => Ok(Self::Rag),
            "notebook-mcp" | "mcp" => Ok(Self::NotebookMcp),
            "notebook-cli" | "cli" | "nlm" => Ok(Self::NotebookCli),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        backend = config.chat_backend.as_str(),
        embedding_model = %config.embedding_model,
        chat_model = %config.chat_model,
        top_k = config.top_k,
        upstream_timeout_secs = config.upstream_timeout_secs,
        pipeline_deadline_secs = ?config.pipeline_deadline_secs,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("RAG".parse::<ChatBackend>(), Ok(ChatBackend::Rag));
        assert_eq!(
            "notebook-mcp".parse::<ChatBackend>(),
            Ok(ChatBackend::NotebookMcp)
        );
        assert_eq!(" nlm ".parse::<ChatBackend>(), Ok(ChatBackend::NotebookCli));
        assert!("pinecone".parse::<ChatBackend>().is_err());
    }

    #[test]
    fn backend_identifiers_round_trip() {
        for backend in [
            ChatBackend::Rag,
            ChatBackend::NotebookMcp,
            ChatBackend::NotebookCli,
        ] {
            assert_eq!(backend.as_str().parse::<ChatBackend>(), Ok(backend));
        }
    }
}
