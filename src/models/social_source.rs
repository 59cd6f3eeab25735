//! Social source model
//!
//! A social source is one account or page on a social platform that the
//! scheduler polls. Besides its configuration the row carries the sync state
//! of the most recent run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Social platform a source lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Weibo,
    Wechat,
    Linkedin,
    Twitter,
    Facebook,
    Instagram,
    Youtube,
    /// Company blog or any other plain website
    Website,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weibo => "weibo",
            Self::Wechat => "wechat",
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Website => "website",
        }
    }

    /// Human readable platform name used in generated news content
    pub fn label(&self) -> &'static str {
        match self {
            Self::Weibo => "Weibo",
            Self::Wechat => "WeChat",
            Self::Linkedin => "LinkedIn",
            Self::Twitter => "X",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::Youtube => "YouTube",
            Self::Website => "Website",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SocialPlatform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weibo" => Ok(Self::Weibo),
            "wechat" => Ok(Self::Wechat),
            "linkedin" => Ok(Self::Linkedin),
            "twitter" | "x" => Ok(Self::Twitter),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "youtube" => Ok(Self::Youtube),
            "website" => Ok(Self::Website),
            _ => Err(anyhow::anyhow!("Invalid social platform: {}", s)),
        }
    }
}

/// How posts are fetched from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStrategy {
    /// JSON Feed document (jsonfeed.org), as emitted by RSS bridges
    JsonFeed,
    /// HTML page parsed with CSS selectors
    Html,
}

impl ScrapeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonFeed => "json_feed",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for ScrapeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScrapeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json_feed" | "jsonfeed" => Ok(Self::JsonFeed),
            "html" => Ok(Self::Html),
            _ => Err(anyhow::anyhow!("Invalid scrape strategy: {}", s)),
        }
    }
}

/// Outcome of the last sync run of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Never,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid sync status: {}", s)),
        }
    }
}

/// CSS selectors used by the HTML strategy.
///
/// `item` selects one element per post; the other selectors are evaluated
/// relative to that element. When `content` is omitted the whole item text
/// is used.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HtmlSelectors {
    pub item: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Attribute on the item element holding a stable post id
    #[serde(default)]
    pub id_attr: Option<String>,
}

/// Social source entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSource {
    pub id: i64,
    /// Stable key used to match configuration seeds
    pub key: String,
    pub name: String,
    pub platform: SocialPlatform,
    pub strategy: ScrapeStrategy,
    pub url: String,
    /// Locale of the generated news (e.g. `zh`, `en`, `ja`)
    pub locale: String,
    pub interval_minutes: i64,
    pub enabled: bool,
    /// Promote new posts to news automatically after each run
    pub auto_convert: bool,
    /// Converted news is published immediately instead of kept as draft
    pub auto_publish: bool,
    pub selectors: Option<HtmlSelectors>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_status: SyncStatus,
    pub last_error: Option<String>,
    pub last_found: i64,
    pub last_created: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialSource {
    pub fn new(
        key: String,
        name: String,
        platform: SocialPlatform,
        strategy: ScrapeStrategy,
        url: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            key,
            name,
            platform,
            strategy,
            url,
            locale: "zh".to_string(),
            interval_minutes: 60,
            enabled: true,
            auto_convert: true,
            auto_publish: false,
            selectors: None,
            last_synced_at: None,
            last_status: SyncStatus::Never,
            last_error: None,
            last_found: 0,
            last_created: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Polling period, between one minute and [`MAX_INTERVAL_MINUTES`]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(clamp_interval(self.interval_minutes) as u64 * 60)
    }
}

/// Longest polling interval: one week
pub const MAX_INTERVAL_MINUTES: i64 = 7 * 24 * 60;

pub fn clamp_interval(minutes: i64) -> i64 {
    minutes.clamp(1, MAX_INTERVAL_MINUTES)
}

/// Source declaration read from the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSourceSeed {
    pub key: String,
    pub name: String,
    pub platform: SocialPlatform,
    #[serde(default = "default_strategy")]
    pub strategy: ScrapeStrategy,
    pub url: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub interval_minutes: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub auto_convert: bool,
    #[serde(default)]
    pub auto_publish: bool,
    #[serde(default)]
    pub selectors: Option<HtmlSelectors>,
}

fn default_strategy() -> ScrapeStrategy {
    ScrapeStrategy::JsonFeed
}

fn default_locale() -> String {
    "zh".to_string()
}

fn default_true() -> bool {
    true
}

impl SocialSourceSeed {
    /// Build a source entity from the seed, using `default_interval` when the
    /// seed does not set one.
    pub fn into_source(self, default_interval: i64) -> SocialSource {
        let mut source = SocialSource::new(self.key, self.name, self.platform, self.strategy, self.url);
        source.locale = self.locale;
        source.interval_minutes = clamp_interval(self.interval_minutes.unwrap_or(default_interval));
        source.enabled = self.enabled;
        source.auto_convert = self.auto_convert;
        source.auto_publish = self.auto_publish;
        source.selectors = self.selectors;
        source
    }
}

/// Sync state written back to a source after a run
#[derive(Debug, Clone)]
pub struct SyncState {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub found: i64,
    pub created: i64,
    pub synced_at: DateTime<Utc>,
}
