//! Run configuration read from the process environment.
//!
//! Every variable is optional except `VK_TOKEN`, plus `VK_COMMUNITY_ID` when
//! posts are dumped. An empty value counts as unset.

use std::path::PathBuf;

use archive_core::{DumpMode, ExportFormat};
use archive_engine::{
    ClientSettings, GatewaySettings, HarvestSettings, OutputLayout, RunConfig, MAX_THREAD_COUNT,
};
use archive_logging::LogDestination;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key}: invalid value {value:?}, expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("THREAD_COUNT must be between 1 and 20, got {0}")]
    ThreadCount(usize),
    #[error("VK_COMMUNITY_ID: {0:?} is neither a numeric id nor a screen name")]
    CommunityId(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    pub token: String,
    pub api_version: String,
    pub mode: DumpMode,
    pub formats: Vec<ExportFormat>,
    pub thread_count: usize,
    pub output_directory: PathBuf,
    pub dialogs_directory: String,
    pub posts_directory: String,
    pub max_dialogs: usize,
    pub max_messages: Option<usize>,
    pub community_ids: Vec<String>,
    pub posts_count: usize,
    pub include_comments: bool,
    pub include_reactions: bool,
    pub requests_per_second: u32,
    pub daily_request_limit: u64,
    pub log_destination: LogDestination,
}

impl ArchiveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        let token = env.get("VK_TOKEN").ok_or(ConfigError::Missing("VK_TOKEN"))?;
        let mode = match env.get("DUMP_MODE") {
            Some(raw) => DumpMode::parse(&raw).ok_or(ConfigError::Invalid {
                key: "DUMP_MODE",
                value: raw,
                expected: "dialogs, posts or both",
            })?,
            None => DumpMode::default(),
        };
        let formats = match env.get("EXPORT_FORMAT") {
            Some(raw) => ExportFormat::parse_list(&raw).map_err(|value| ConfigError::Invalid {
                key: "EXPORT_FORMAT",
                value,
                expected: "a comma list of json and html",
            })?,
            None => vec![ExportFormat::Json],
        };

        let thread_count = env.number("THREAD_COUNT", 4usize)?;
        if !(1..=MAX_THREAD_COUNT).contains(&thread_count) {
            return Err(ConfigError::ThreadCount(thread_count));
        }

        let community_ids = match env.get("VK_COMMUNITY_ID") {
            Some(raw) => parse_community_ids(&raw)?,
            None => Vec::new(),
        };
        if mode.includes_posts() && community_ids.is_empty() {
            return Err(ConfigError::Missing("VK_COMMUNITY_ID"));
        }

        let requests_per_second = env.number("REQUESTS_PER_SECOND", 3u32)?;
        if requests_per_second == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUESTS_PER_SECOND",
                value: "0".to_string(),
                expected: "a positive number",
            });
        }

        let log_destination = match env.get("LOG_DESTINATION") {
            Some(raw) => LogDestination::parse(&raw).ok_or(ConfigError::Invalid {
                key: "LOG_DESTINATION",
                value: raw,
                expected: "terminal, file or both",
            })?,
            None => LogDestination::Terminal,
        };

        Ok(Self {
            token,
            api_version: env.get("VK_API_VERSION").unwrap_or_else(|| "5.199".to_string()),
            mode,
            formats,
            thread_count,
            output_directory: PathBuf::from(env.get("OUTPUT_DIRECTORY").unwrap_or_else(|| "output".to_string())),
            dialogs_directory: env.get("DIALOGS_DIRECTORY").unwrap_or_else(|| "dialogs".to_string()),
            posts_directory: env.get("POSTS_DIRECTORY").unwrap_or_else(|| "posts".to_string()),
            max_dialogs: env.number("MAX_DIALOGS", 200usize)?,
            max_messages: env.optional_number("MAX_MESSAGES")?,
            community_ids,
            posts_count: env.number("POSTS_COUNT", 100usize)?,
            include_comments: env.flag("INCLUDE_COMMENTS", true)?,
            include_reactions: env.flag("INCLUDE_REACTIONS", true)?,
            requests_per_second,
            daily_request_limit: env.number("DAILY_REQUEST_LIMIT", 10_000u64)?,
            log_destination,
        })
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            mode: self.mode,
            formats: self.formats.clone(),
            thread_count: self.thread_count,
            layout: OutputLayout {
                root: self.output_directory.clone(),
                dialogs_dir: self.dialogs_directory.clone(),
                posts_dir: self.posts_directory.clone(),
            },
            community_ids: self.community_ids.clone(),
            harvest: HarvestSettings {
                max_dialogs: self.max_dialogs,
                max_messages: self.max_messages,
                posts_count: self.posts_count,
                include_comments: self.include_comments,
                include_reactions: self.include_reactions,
            },
            gateway: GatewaySettings {
                requests_per_second: self.requests_per_second,
                daily_limit: self.daily_request_limit,
                ..GatewaySettings::default()
            },
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            api_version: self.api_version.clone(),
            ..ClientSettings::default()
        }
    }

    /// One line per setting, the token excluded.
    pub fn describe(&self) -> Vec<String> {
        let formats: Vec<String> = self.formats.iter().map(ToString::to_string).collect();
        let mut lines = vec![
            format!("mode: {}", self.mode),
            format!("formats: {}", formats.join(",")),
            format!("workers: {}", self.thread_count),
            format!("output: {}", self.output_directory.display()),
        ];
        if self.mode.includes_dialogs() {
            let messages = self
                .max_messages
                .map_or_else(|| "all".to_string(), |cap| cap.to_string());
            lines.push(format!("max dialogs: {}, messages per dialog: {messages}", self.max_dialogs));
        }
        if self.mode.includes_posts() {
            lines.push(format!(
                "communities: {}, posts each: {}, comments: {}, reactions: {}",
                self.community_ids.join(","),
                self.posts_count,
                self.include_comments,
                self.include_reactions
            ));
        }
        lines
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn number<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        Ok(self.optional_number(key)?.unwrap_or(default))
    }

    fn optional_number<T: std::str::FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|_| ConfigError::Invalid {
                    key,
                    value: raw,
                    expected: "a non-negative whole number",
                })
            })
            .transpose()
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                expected: "true or false",
            }),
        }
    }
}

fn parse_community_ids(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !is_community_id(id) {
            return Err(ConfigError::CommunityId(id.to_string()));
        }
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// A numeric id, optionally negative, or a screen name of letters, digits, `_` and `.`.
fn is_community_id(id: &str) -> bool {
    let digits = id.strip_prefix('-').unwrap_or(id);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    id.chars().any(char::is_alphanumeric)
        && id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}
