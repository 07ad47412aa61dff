use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Storefront API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the storefront API
    #[arg(
        long,
        env = "STOREFRONT_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub api_url: String,

    /// Base URL of the identity server (defaults to the API URL)
    #[arg(long, env = "STOREFRONT_IDENTITY_URL")]
    pub identity_url: Option<String>,

    /// Path to the persisted session file
    #[arg(long, env = "STOREFRONT_SESSION_FILE")]
    pub session_file: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "5")]
    pub request_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and persist the session
    Login {
        /// Username (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Clear the session locally and server-side
    Logout,
    /// Show the current session
    Whoami,
    /// GET an API resource and print the JSON response
    Get {
        /// Resource path relative to the API base URL, e.g. /orders
        path: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL for business API resources
    pub api_url: String,

    /// Base URL for the identity server endpoints
    pub identity_url: String,

    /// Persisted session location; `None` keeps the session in memory only
    pub session_file: Option<PathBuf>,

    /// Fixed per-request timeout in seconds
    pub request_timeout: u64,

    // HTTP client
    pub connect_timeout: u64,
    pub max_connections: usize,

    pub log_level: String,
}

impl Config {
    /// Build configuration from parsed CLI arguments with priority:
    /// CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let api_url = args.api_url.trim_end_matches('/').to_string();

        let identity_url = args
            .identity_url
            .clone()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| api_url.clone());

        let session_file = args
            .session_file
            .as_deref()
            .map(expand_tilde)
            .or_else(default_session_file);

        Ok(Config {
            api_url,
            identity_url,
            session_file,
            request_timeout: args.request_timeout,

            connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),

            log_level: args.log_level.clone(),
        })
    }
}

/// Default persisted session location under the platform data directory
fn default_session_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("storefront").join("session.db"))
}

/// Expand tilde (~) in file paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with('~'));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_relative_path() {
        let path = expand_tilde("relative/path");
        assert_eq!(path, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_identity_url_defaults_to_api_url() {
        let args = CliArgs {
            api_url: "https://shop.example/api/".to_string(),
            identity_url: None,
            session_file: Some("/tmp/session.db".to_string()),
            request_timeout: 5,
            log_level: "info".to_string(),
            command: Command::Whoami,
        };

        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.api_url, "https://shop.example/api");
        assert_eq!(config.identity_url, "https://shop.example/api");
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.db")));
    }

    #[test]
    fn test_separate_identity_url() {
        let args = CliArgs {
            api_url: "https://shop.example/api".to_string(),
            identity_url: Some("https://id.example/".to_string()),
            session_file: None,
            request_timeout: 5,
            log_level: "info".to_string(),
            command: Command::Whoami,
        };

        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.identity_url, "https://id.example");
    }
}
