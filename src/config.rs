use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ai: AiConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cms: CmsConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub rest_api: RestApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Model selection for the text and image collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub text_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on blog tokens (default: 4096)
    #[serde(default = "default_blog_max_tokens")]
    pub blog_max_tokens: u32,
    /// OpenAI-compatible base URL override (e.g. a local gateway)
    #[serde(default)]
    pub text_base_url: Option<String>,
    pub image_model: String,
    #[serde(default = "default_aspect_ratio")]
    pub image_aspect_ratio: String,
    #[serde(default = "default_image_count")]
    pub image_count: u8,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_blog_max_tokens() -> u32 {
    4096
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_image_count() -> u8 {
    1
}

/// Limits applied by the stage executors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum characters kept from the SEO response (default: 500)
    #[serde(default = "default_seo_max_chars")]
    pub seo_max_chars: usize,
    /// Maximum number of SEO keywords (default: 20)
    #[serde(default = "default_seo_max_keywords")]
    pub seo_max_keywords: usize,
    /// Characters of blog text sent to the social stage (default: 2000)
    #[serde(default = "default_social_input_chars")]
    pub social_input_chars: usize,
    /// Per-call timeout in seconds, 0 disables (default: 120)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// How many topic ideas to request when amplifying a keyword (default: 5)
    #[serde(default = "default_amplify_count")]
    pub amplify_count: usize,
}

fn default_seo_max_chars() -> usize {
    500
}

fn default_seo_max_keywords() -> usize {
    20
}

fn default_social_input_chars() -> usize {
    2000
}

fn default_call_timeout() -> u64 {
    120 // 2 minutes
}

fn default_amplify_count() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seo_max_chars: default_seo_max_chars(),
            seo_max_keywords: default_seo_max_keywords(),
            social_input_chars: default_social_input_chars(),
            call_timeout_secs: default_call_timeout(),
            amplify_count: default_amplify_count(),
        }
    }
}

/// Sanity project settings (token comes from MARKETFLOW_SANITY_TOKEN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

fn default_dataset() -> String {
    "production".to_string()
}

fn default_document_type() -> String {
    "post".to_string()
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset: default_dataset(),
            document_type: default_document_type(),
        }
    }
}

/// Google Sheets settings (token comes from MARKETFLOW_SHEETS_TOKEN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Range that exported topics are appended to
    #[serde(default = "default_topics_range")]
    pub topics_range: String,
    /// Range that publication records are appended to
    #[serde(default = "default_calendar_range")]
    pub calendar_range: String,
}

fn default_topics_range() -> String {
    "Topics!A1".to_string()
}

fn default_calendar_range() -> String {
    "Calendar!A1".to_string()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            topics_range: default_topics_range(),
            calendar_range: default_calendar_range(),
        }
    }
}

/// Where prompt overrides are read from at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Directory containing `<stage>.hbs` overrides; built-in prompts otherwise
    #[serde(default)]
    pub dir: Option<String>,
}

/// Inbound request limiting for the REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests allowed per client per window (default: 30)
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u32,
    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    /// Key clients by the first `X-Forwarded-For` address. Only enable
    /// behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_rate_limit_requests() -> u32 {
    30
}

fn default_rate_limit_window_ms() -> u64 {
    60_000 // 1 minute
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            requests: default_rate_limit_requests(),
            window_ms: default_rate_limit_window_ms(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestApiConfig {
    #[serde(default = "default_rest_port")]
    pub port: u16,
}

fn default_rest_port() -> u16 {
    7010
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            port: default_rest_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether the API server also writes logs to a file
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub state: String,
}

impl Config {
    /// Project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("marketflow.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so marketflow works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/marketflow/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("marketflow").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. MARKETFLOW__PIPELINE__SEO_MAX_CHARS=400
        builder = builder.add_source(
            config::Environment::with_prefix("MARKETFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config as TOML
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Prompt override directory, if configured
    pub fn prompts_path(&self) -> Option<PathBuf> {
        self.prompts.dir.as_ref().map(PathBuf::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai: AiConfig {
                text_model: "gpt-4o-mini".to_string(),
                temperature: default_temperature(),
                blog_max_tokens: default_blog_max_tokens(),
                text_base_url: None,
                image_model: "imagen-3.0-generate-002".to_string(),
                image_aspect_ratio: default_aspect_ratio(),
                image_count: default_image_count(),
            },
            pipeline: PipelineConfig::default(),
            cms: CmsConfig::default(),
            sheets: SheetsConfig::default(),
            prompts: PromptsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            rest_api: RestApiConfig::default(),
            logging: LoggingConfig::default(),
            paths: PathsConfig {
                state: ".marketflow".to_string(), // Relative to cwd
            },
        }
    }
}
