//! Application configuration for CourtScout.
//!
//! User config lives at `~/.courtscout/courtscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CourtScoutError, Result};
use crate::types::Location;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "courtscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".courtscout";

// ---------------------------------------------------------------------------
// Config structs (matching courtscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target location and output paths.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Conversational model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Search source settings.
    #[serde(default)]
    pub search: SearchSourceConfig,

    /// Content fetch settings.
    #[serde(default)]
    pub fetch: FetchSourceConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default province stamped onto every record.
    #[serde(default = "default_province")]
    pub province: String,

    /// Default city (may be empty for county-level cities).
    #[serde(default = "default_city")]
    pub city: String,

    /// Default district or county.
    #[serde(default = "default_district")]
    pub district: String,

    /// Path of the libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory that receives CSV exports.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            province: default_province(),
            city: default_city(),
            district: default_district(),
            db_path: default_db_path(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_province() -> String {
    "浙江省".into()
}
fn default_city() -> String {
    "杭州市".into()
}
fn default_district() -> String {
    "临平区".into()
}
fn default_db_path() -> String {
    "var/courtscout.db".into()
}
fn default_export_dir() -> String {
    "var/exports".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible endpoint root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ask the service to augment conversational rounds with web search.
    #[serde(default = "default_true")]
    pub enable_search: bool,

    /// Safety bound on conversational rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Literal marker the model emits when it has nothing more to report.
    #[serde(default = "default_termination_phrase")]
    pub termination_phrase: String,

    /// Per-call timeout covering request and full stream.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page text is truncated to this many characters before extraction.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Maximum records requested per conversational round.
    #[serde(default = "default_batch_hint")]
    pub batch_hint: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            enable_search: true,
            max_rounds: default_max_rounds(),
            termination_phrase: default_termination_phrase(),
            request_timeout_secs: default_request_timeout(),
            max_content_chars: default_max_content_chars(),
            batch_hint: default_batch_hint(),
        }
    }
}

fn default_api_key_env() -> String {
    "DASHSCOPE_API_KEY".into()
}
fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".into()
}
fn default_model() -> String {
    "qwen-plus".into()
}
fn default_true() -> bool {
    true
}
fn default_max_rounds() -> u32 {
    20
}
fn default_termination_phrase() -> String {
    "没有了".into()
}
fn default_request_timeout() -> u64 {
    180
}
fn default_max_content_chars() -> usize {
    4000
}
fn default_batch_hint() -> u32 {
    5
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSourceConfig {
    /// Search endpoint (query and page offset are appended).
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Results per page served by the source.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between consecutive page requests.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Number of hits collected in web mode.
    #[serde(default = "default_result_count")]
    pub result_count: usize,

    /// Query template; `{province}`, `{city}` and `{district}` are substituted.
    #[serde(default = "default_query_template")]
    pub query_template: String,

    /// Per-page request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay(),
            result_count: default_result_count(),
            query_template: default_query_template(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "https://www.baidu.com/s".into()
}
fn default_page_size() -> u32 {
    10
}
fn default_page_delay() -> u64 {
    2000
}
fn default_result_count() -> usize {
    10
}
fn default_query_template() -> String {
    "{province}{city}{district}免费篮球场".into()
}
fn default_timeout() -> u64 {
    30
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSourceConfig {
    /// Per-page request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pause between consecutive item fetches.
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,

    /// Collect image URLs alongside page text.
    #[serde(default)]
    pub extract_images: bool,

    /// User-Agent header for search and content requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSourceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            item_delay_ms: default_item_delay(),
            extract_images: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_item_delay() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub page_size: u32,
    pub page_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&AppConfig> for SearchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.search.base_url.clone(),
            page_size: config.search.page_size.max(1),
            page_delay: Duration::from_millis(config.search.page_delay_ms),
            timeout: Duration::from_secs(config.search.timeout_secs),
            user_agent: config.fetch.user_agent.clone(),
        }
    }
}

/// Runtime content-fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub item_delay: Duration,
    pub extract_images: bool,
    pub user_agent: String,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            item_delay: Duration::from_millis(config.fetch.item_delay_ms),
            extract_images: config.fetch.extract_images,
            user_agent: config.fetch.user_agent.clone(),
        }
    }
}

/// Runtime extraction configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub model: String,
    pub enable_search: bool,
    pub max_rounds: u32,
    pub termination_phrase: String,
    pub request_timeout: Duration,
    pub max_content_chars: usize,
    pub batch_hint: u32,
}

impl From<&AppConfig> for ExtractConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            enable_search: config.llm.enable_search,
            max_rounds: config.llm.max_rounds.max(1),
            termination_phrase: config.llm.termination_phrase.clone(),
            request_timeout: Duration::from_secs(config.llm.request_timeout_secs),
            max_content_chars: config.llm.max_content_chars,
            batch_hint: config.llm.batch_hint.max(1),
        }
    }
}

impl AppConfig {
    /// The configured default target location.
    pub fn default_location(&self) -> Location {
        Location::new(
            &self.defaults.province,
            &self.defaults.city,
            &self.defaults.district,
        )
    }

    /// Build the search query for a location from the configured template.
    pub fn search_query(&self, location: &Location) -> String {
        self.search
            .query_template
            .replace("{province}", &location.province)
            .replace("{city}", &location.city)
            .replace("{district}", &location.district)
    }

    /// Reject settings that parse but cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.llm.termination_phrase.trim().is_empty() {
            return Err(CourtScoutError::config(
                "llm.termination_phrase must not be empty",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.courtscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourtScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.courtscout/courtscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CourtScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CourtScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourtScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourtScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourtScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the model API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(CourtScoutError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("DASHSCOPE_API_KEY"));
        assert!(toml_str.contains("termination_phrase"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let toml_str = r#"
[defaults]
province = "江苏省"
city = "南京市"
district = "玄武区"

[llm]
max_rounds = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.province, "江苏省");
        assert_eq!(config.llm.max_rounds, 3);
        assert_eq!(config.llm.model, "qwen-plus");
        assert_eq!(config.search.page_size, 10);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let search = SearchConfig::from(&app);
        assert_eq!(search.page_delay, Duration::from_millis(2000));
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.item_delay, Duration::from_millis(1000));
        let extract = ExtractConfig::from(&app);
        assert_eq!(extract.max_rounds, 20);
        assert_eq!(extract.termination_phrase, "没有了");
    }

    #[test]
    fn zero_rounds_clamped_to_one() {
        let mut app = AppConfig::default();
        app.llm.max_rounds = 0;
        assert_eq!(ExtractConfig::from(&app).max_rounds, 1);
    }

    #[test]
    fn blank_termination_phrase_is_rejected() {
        assert!(AppConfig::default().validate().is_ok());

        let path = std::env::temp_dir().join(format!(
            "cs_config_{}_{}.toml",
            std::process::id(),
            line!()
        ));
        std::fs::write(&path, "[llm]\ntermination_phrase = \"  \"\n").unwrap();
        let result = load_config_from(&path);
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(matches!(err, CourtScoutError::Config { .. }));
        assert!(err.to_string().contains("termination_phrase"));
    }

    #[test]
    fn query_template_substitution() {
        let app = AppConfig::default();
        let location = Location::new("浙江省", "杭州市", "拱墅区");
        assert_eq!(app.search_query(&location), "浙江省杭州市拱墅区免费篮球场");
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "CS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
