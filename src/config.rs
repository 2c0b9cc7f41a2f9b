use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_APIFY_BASE_URL: &str = "https://api.apify.com";
pub const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_GOOGLE_DOCS_BASE_URL: &str = "https://docs.googleapis.com";
pub const DEFAULT_GOOGLE_SLIDES_BASE_URL: &str = "https://slides.googleapis.com";

/// Connection details for the OpenRouter chat-completion endpoint.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sent as `HTTP-Referer` for OpenRouter app attribution.
    pub site_url: Option<String>,
    /// Sent as `X-Title`.
    pub site_name: Option<String>,
}

/// Base URLs for the Google REST APIs.
#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub api_base_url: String,
    pub docs_base_url: String,
    pub slides_base_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_GOOGLE_API_BASE_URL.to_string(),
            docs_base_url: DEFAULT_GOOGLE_DOCS_BASE_URL.to_string(),
            slides_base_url: DEFAULT_GOOGLE_SLIDES_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApifyConfig {
    pub token: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
}

impl Default for ApifyConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: DEFAULT_APIFY_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub llm: LlmConfig,
    pub apify: ApifyConfig,
    pub google: GoogleConfig,
    /// Root that local file paths in analysis requests must resolve under.
    /// Local files are refused when unset.
    pub local_files_dir: Option<PathBuf>,
    pub max_prompt_chars: Option<usize>,
    pub analysis_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let openrouter_api_key = env::var("OPENROUTER_API_KEY")?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_var("PORT", 3000)?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let server_addr = SocketAddr::new(ip, port);

        let data_dir = match env::var("DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .ok_or_else(|| AppError::ConfigError("No data directory available; set DATA_DIR".to_string()))?
                .join("drive-analyzer"),
        };

        let llm = LlmConfig {
            api_key: openrouter_api_key,
            endpoint: var_or("OPENROUTER_URL", DEFAULT_OPENROUTER_URL),
            model: var_or("OPENROUTER_MODEL", DEFAULT_MODEL),
            temperature: parse_var("OPENROUTER_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            max_tokens: parse_var("OPENROUTER_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            site_url: optional_var("OPENROUTER_SITE_URL"),
            site_name: optional_var("OPENROUTER_SITE_NAME"),
        };

        let apify = ApifyConfig {
            token: optional_var("APIFY_TOKEN"),
            base_url: var_or("APIFY_BASE_URL", DEFAULT_APIFY_BASE_URL),
            ..ApifyConfig::default()
        };

        let google = GoogleConfig {
            api_base_url: var_or("GOOGLE_API_BASE_URL", DEFAULT_GOOGLE_API_BASE_URL),
            docs_base_url: var_or("GOOGLE_DOCS_BASE_URL", DEFAULT_GOOGLE_DOCS_BASE_URL),
            slides_base_url: var_or("GOOGLE_SLIDES_BASE_URL", DEFAULT_GOOGLE_SLIDES_BASE_URL),
        };

        let local_files_dir = optional_var("LOCAL_FILES_DIR").map(PathBuf::from);

        let max_prompt_chars = match env::var("MAX_PROMPT_CHARS") {
            Ok(raw) => Some(raw.parse::<usize>().map_err(|e| {
                AppError::ConfigError(format!("Invalid MAX_PROMPT_CHARS: {}", e))
            })?),
            Err(_) => None,
        };

        let timeout_secs: u64 = parse_var("ANALYSIS_TIMEOUT_SECS", 300)?;

        Ok(Config {
            server_addr,
            data_dir,
            llm,
            apify,
            google,
            local_files_dir,
            max_prompt_chars,
            analysis_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
