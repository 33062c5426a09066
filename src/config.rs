use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// elearn-client - session-layer CLI for the elearn backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL, e.g. https://elearn.example.com/api/users/v1
    #[arg(short = 'u', long, env = "ELEARN_BASE_URL")]
    pub base_url: Option<String>,

    /// Path to the session storage database
    #[arg(short = 's', long, env = "ELEARN_SESSION_FILE")]
    pub session_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Credential renewal timeout in seconds
    #[arg(long, env = "REFRESH_TIMEOUT", default_value = "15")]
    pub refresh_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and persist the session
    Login {
        /// Email to sign in with (prompted when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Role to sign in as: admin, teacher or student
        #[arg(long, default_value = "student")]
        role: String,
    },

    /// Show the cached signed-in user
    Whoami,

    /// Fetch the profile from the backend
    Profile,

    /// Update profile fields
    UpdateProfile {
        /// New display name
        #[arg(long)]
        fullname: Option<String>,

        /// Phone country code
        #[arg(long)]
        phone_code: Option<String>,

        /// Contact number
        #[arg(long)]
        contact: Option<String>,
    },

    /// Reset a forgotten password via emailed OTP
    ForgotPassword {
        /// Account email (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
    },

    /// Clear the stored session (local only, no server call)
    Logout,
}

/// Runtime configuration for the client
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub storage_path: PathBuf,
    pub log_level: String,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub refresh_timeout: u64,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Config, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    fn from_args(args: CliArgs) -> Result<(Config, Command)> {
        let base_url = args
            .base_url
            .context("ELEARN_BASE_URL is required (use -u or set ELEARN_BASE_URL env var)")?
            .trim_end_matches('/')
            .to_string();

        let storage_path = match args.session_file {
            Some(path) => expand_tilde(&path),
            None => default_storage_path()
                .context("could not determine a session storage directory")?,
        };

        let config = Config {
            base_url,
            storage_path,
            log_level: args.log_level,
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.request_timeout,
            refresh_timeout: args.refresh_timeout,
        };
        Ok((config, args.command))
    }
}

/// Default session database under the platform data directory
fn default_storage_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("elearn-client").join("session.sqlite3"))
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
        let path = expand_tilde("~/sessions/elearn.sqlite3");
        assert!(path.to_string_lossy().contains("sessions/elearn.sqlite3"));
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
    fn test_base_url_trailing_slash_trimmed() {
        let args = CliArgs::parse_from([
            "elearn-client",
            "-u",
            "http://backend/api/users/v1/",
            "whoami",
        ]);
        let (config, _) = Config::from_args(args).unwrap();
        assert_eq!(config.base_url, "http://backend/api/users/v1");
    }

    #[test]
    fn test_base_url_is_required() {
        let mut args = CliArgs::parse_from([
            "elearn-client",
            "-u",
            "http://backend",
            "whoami",
        ]);
        args.base_url = None;
        let err = Config::from_args(args).unwrap_err();
        assert!(err.to_string().contains("ELEARN_BASE_URL"));
    }

    #[test]
    fn test_session_file_overrides_default() {
        let args = CliArgs::parse_from([
            "elearn-client",
            "-u",
            "http://backend",
            "-s",
            "/tmp/custom.sqlite3",
            "whoami",
        ]);
        let (config, _) = Config::from_args(args).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/tmp/custom.sqlite3"));
    }

    #[test]
    fn test_default_storage_path_shape() {
        if let Some(path) = default_storage_path() {
            assert!(path.ends_with("elearn-client/session.sqlite3"));
        }
    }
}
