use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Error;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
}

#[derive(Debug, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. Usually supplied through `DISCORD_TOKEN` instead.
    pub token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelsConfig {
    /// Channel that receives the scheduled post.
    pub target: Option<String>,
    /// Channel whose recent messages are scanned for images.
    pub source: Option<String>,
    /// Literal image URLs, used when no source channel is configured.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default = "default_fallback_suffix")]
    pub fallback_suffix: String,
    #[serde(default = "default_timezone")]
    pub display_timezone: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            text: default_text(),
            fallback_suffix: default_fallback_suffix(),
            display_timezone: default_timezone(),
        }
    }
}

fn default_text() -> String {
    "kidsly出した？".to_string()
}

fn default_fallback_suffix() -> String {
    " (画像が見つかりませんでした)".to_string()
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_window_size")]
    pub window_size: u8,
    #[serde(default)]
    pub include_inline_links: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            include_inline_links: false,
        }
    }
}

fn default_window_size() -> u8 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_refresh_cron")]
    pub refresh: String,
    #[serde(default = "default_post_cron")]
    pub post: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            refresh: default_refresh_cron(),
            post: default_post_cron(),
        }
    }
}

fn default_refresh_cron() -> String {
    "0 8 * * *".to_string()
}

fn default_post_cron() -> String {
    "45 8 * * 1-5".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectorConfig {
    /// Fixed seed for reproducible picks. Seeded from the OS when unset.
    pub seed: Option<u64>,
}

/// Where image candidates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Channel(String),
    Urls(Vec<String>),
}

impl Config {
    /// Override file values with `DISCORD_TOKEN`, `CHANNEL_ID`,
    /// `IMAGE_CHANNEL_ID` and `IMAGE_URL` when `lookup` yields them.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.discord.token = Some(token.trim().to_string());
        }
        if let Some(id) = lookup("CHANNEL_ID") {
            self.channels.target = Some(id.trim().to_string());
        }
        if let Some(id) = lookup("IMAGE_CHANNEL_ID") {
            self.channels.source = Some(id.trim().to_string());
        }
        if let Some(list) = lookup("IMAGE_URL") {
            self.channels.image_urls = parse_url_list(&list);
        }
    }

    pub fn token(&self) -> Result<&str, Error> {
        non_empty(self.discord.token.as_deref()).ok_or(Error::ConfigMissing {
            name: "DISCORD_TOKEN",
        })
    }

    pub fn target_channel(&self) -> Result<&str, Error> {
        non_empty(self.channels.target.as_deref()).ok_or(Error::ConfigMissing {
            name: "CHANNEL_ID",
        })
    }

    pub fn source_channel(&self) -> Result<&str, Error> {
        non_empty(self.channels.source.as_deref()).ok_or(Error::ConfigMissing {
            name: "IMAGE_CHANNEL_ID",
        })
    }

    /// The source channel wins over a literal URL list when both are set.
    pub fn image_source(&self) -> Result<ImageSource, Error> {
        if let Ok(id) = self.source_channel() {
            return Ok(ImageSource::Channel(id.to_string()));
        }
        if !self.channels.image_urls.is_empty() {
            return Ok(ImageSource::Urls(self.channels.image_urls.clone()));
        }
        Err(Error::ConfigMissing {
            name: "IMAGE_CHANNEL_ID",
        })
    }

    /// Check everything the scheduled pipeline needs.
    pub fn validate(&self) -> Result<(), Error> {
        self.token()?;
        self.target_channel()?;
        self.image_source()?;
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn parse_url_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect()
}

/// Load `.env`, then the TOML file if it exists, then environment overrides.
pub fn load(path: &str) -> Result<Config> {
    dotenvy::dotenv().ok();
    let mut config = load_file(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn load_file(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    if !path.exists() {
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kidsly-bot")
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = default_base_dir();
    tokio::fs::create_dir_all(&base).await?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"# Environment variables DISCORD_TOKEN, CHANNEL_ID, IMAGE_CHANNEL_ID and
# IMAGE_URL (comma-separated) override the values below.

[discord]
# token = "YOUR_BOT_TOKEN"
api_base = "https://discord.com/api/v10"
timeout_secs = 30

[channels]
# target = "123456789012345678"   # where the reminder is posted
# source = "234567890123456789"   # where images are collected from
# image_urls = ["https://example.com/a.png"]

[message]
text = "kidsly出した？"
fallback_suffix = " (画像が見つかりませんでした)"
display_timezone = "Asia/Tokyo"

[reader]
window_size = 100
include_inline_links = false

[schedule]
timezone = "Asia/Tokyo"
refresh = "0 8 * * *"
post = "45 8 * * 1-5"

[selector]
# seed = 42
"#,
        )
        .await?;
    }

    Ok(config_path)
}

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
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.message.text, "kidsly出した？");
        assert_eq!(cfg.schedule.refresh, "0 8 * * *");
        assert_eq!(cfg.schedule.post, "45 8 * * 1-5");
        assert_eq!(cfg.schedule.timezone, "Asia/Tokyo");
        assert_eq!(cfg.reader.window_size, 100);
        assert!(!cfg.reader.include_inline_links);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut cfg: Config = toml::from_str(
            r#"
            [discord]
            token = "from-file"
            [channels]
            target = "1"
            "#,
        )
        .unwrap();
        cfg.apply_env(env(&[
            ("DISCORD_TOKEN", "from-env"),
            ("IMAGE_CHANNEL_ID", " 2 "),
        ]));
        assert_eq!(cfg.token().unwrap(), "from-env");
        assert_eq!(cfg.target_channel().unwrap(), "1");
        assert_eq!(cfg.image_source().unwrap(), ImageSource::Channel("2".into()));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_token_reported_by_name() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("CHANNEL_ID", "1"), ("IMAGE_CHANNEL_ID", "2")]));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { name: "DISCORD_TOKEN" }));
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("DISCORD_TOKEN", "   "), ("CHANNEL_ID", "")]));
        assert!(cfg.token().is_err());
        assert!(cfg.target_channel().is_err());
    }

    #[test]
    fn test_image_url_list() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[(
            "IMAGE_URL",
            "https://a.example/1.png, https://a.example/2.jpg,,",
        )]));
        assert_eq!(
            cfg.image_source().unwrap(),
            ImageSource::Urls(vec![
                "https://a.example/1.png".into(),
                "https://a.example/2.jpg".into()
            ])
        );
    }

    #[test]
    fn test_no_image_source() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.image_source(),
            Err(Error::ConfigMissing {
                name: "IMAGE_CHANNEL_ID"
            })
        ));
    }

    #[test]
    fn test_load_file_parses_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [message]
            text = "hello"
            [reader]
            window_size = 20
            include_inline_links = true
            [selector]
            seed = 7
            "#,
        )
        .unwrap();
        let cfg = load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.message.text, "hello");
        assert_eq!(cfg.message.fallback_suffix, " (画像が見つかりませんでした)");
        assert_eq!(cfg.reader.window_size, 20);
        assert!(cfg.reader.include_inline_links);
        assert_eq!(cfg.selector.seed, Some(7));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.discord.api_base, "https://discord.com/api/v10");
    }
}
