use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Raw value of a single extension setting.
///
/// Settings usually arrive as strings (`"1000"`, `"0"`), but hand written
/// files and callers may also provide native numbers or booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Empty,
}

impl SettingValue {
    /// Boolean-like reading: `"1"`/`"0"`, `1`/`0` or a native boolean.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Int(1) => Some(true),
            Self::Int(0) => Some(false),
            Self::Text(s) if s == "1" => Some(true),
            Self::Text(s) if s == "0" => Some(false),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().ok()
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Empty => Ok(()),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

/// Flat key/value settings a [`CrawlConfig`] is built from.
///
/// Unknown keys are kept but never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionSettings(BTreeMap<String, SettingValue>);

impl ExtensionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_reader<R: io::Read>(rdr: R) -> anyhow::Result<Self> {
        let settings = serde_yaml::from_reader::<_, Option<Self>>(rdr)
            .context("Couldn't parse extension settings")?;
        Ok(settings.unwrap_or_default())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(value) => value.as_flag().unwrap_or_else(|| {
                log::warn!("Setting `{key}` has unrecognised value \"{value}\", treating it as disabled");
                false
            }),
        }
    }

    fn uint(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            None => default,
            Some(value) => value.as_uint().unwrap_or_else(|| {
                log::warn!("Setting `{key}` is not an unsigned integer (\"{value}\"), using {default}");
                default
            }),
        }
    }

    fn text(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|value| value.to_string())
            .unwrap_or_else(|| default.to_string())
    }
}

impl<K, V> FromIterator<(K, V)> for ExtensionSettings
where
    K: Into<String>,
    V: Into<SettingValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

pub mod keys {
    pub const SLEEP_TIME: &str = "sleepTime";
    pub const SLEEP_AFTER_FINISH: &str = "sleepAfterFinish";
    pub const COUNT_IN_A_RUN: &str = "countInARun";
    pub const PURGE_QUEUE_DAYS: &str = "purgeQueueDays";
    pub const PROCESS_LIMIT: &str = "processLimit";
    pub const PROCESS_MAX_RUN_TIME: &str = "processMaxRunTime";
    pub const MAX_COMPILE_URLS: &str = "maxCompileUrls";
    pub const PROCESS_DEBUG: &str = "processDebug";
    pub const PROCESS_VERBOSE: &str = "processVerbose";
    pub const CRAWL_HIDDEN_PAGES: &str = "crawlHiddenPages";
    pub const PHP_PATH: &str = "phpPath";
    pub const ENABLE_TIMESLOT: &str = "enableTimeslot";
    pub const MAKE_DIRECT_REQUESTS: &str = "makeDirectRequests";
    pub const FRONTEND_BASE_PATH: &str = "frontendBasePath";
    pub const CLEAN_UP_OLD_QUEUE_ENTRIES: &str = "cleanUpOldQueueEntries";
    pub const CLEAN_UP_PROCESSED_AGE: &str = "cleanUpProcessedAge";
    pub const CLEAN_UP_SCHEDULED_AGE: &str = "cleanUpScheduledAge";
}

/// Immutable snapshot of the crawl tunables for one run.
///
/// Built once from [`ExtensionSettings`] and shared read-only by every
/// evaluation. Boolean-like settings fail closed: anything but a recognised
/// "1" reads as disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlConfig {
    /// Pause between two requests of a worker
    pub sleep_time: Duration,
    /// Pause after a run has been processed
    pub sleep_after_finish: Duration,
    /// Maximum number of queue entries processed in one run
    pub count_in_a_run: usize,
    pub purge_queue_days: u32,
    /// Maximum number of concurrent workers, at least 1
    pub process_limit: usize,
    pub process_max_run_time: Duration,
    /// Upper bound of URL variants compiled for a single page
    pub max_compile_urls: usize,
    pub process_debug: bool,
    pub process_verbose: bool,
    pub crawl_hidden_pages: bool,
    pub php_path: PathBuf,
    pub enable_timeslot: bool,
    pub make_direct_requests: bool,
    pub frontend_base_path: String,
    pub clean_up_old_queue_entries: bool,
    /// Age in days after which processed entries are stale
    pub clean_up_processed_age: u32,
    /// Age in days after which never processed entries are stale
    pub clean_up_scheduled_age: u32,
    settings: ExtensionSettings,
}

impl CrawlConfig {
    pub fn from_settings(settings: ExtensionSettings) -> Self {
        use keys::*;

        let process_limit = match settings.uint(PROCESS_LIMIT, 1) {
            0 => {
                log::warn!("Setting `{PROCESS_LIMIT}` must be at least 1, using 1");
                1
            }
            n => n as usize,
        };

        Self {
            sleep_time: Duration::from_millis(settings.uint(SLEEP_TIME, 1000)),
            sleep_after_finish: Duration::from_millis(settings.uint(SLEEP_AFTER_FINISH, 10)),
            count_in_a_run: settings.uint(COUNT_IN_A_RUN, 100) as usize,
            purge_queue_days: days(settings.uint(PURGE_QUEUE_DAYS, 14)),
            process_limit,
            process_max_run_time: Duration::from_secs(settings.uint(PROCESS_MAX_RUN_TIME, 300)),
            max_compile_urls: settings.uint(MAX_COMPILE_URLS, 10_000) as usize,
            process_debug: settings.flag(PROCESS_DEBUG),
            process_verbose: settings.flag(PROCESS_VERBOSE),
            crawl_hidden_pages: settings.flag(CRAWL_HIDDEN_PAGES),
            php_path: PathBuf::from(settings.text(PHP_PATH, "/usr/bin/php")),
            enable_timeslot: settings.flag(ENABLE_TIMESLOT),
            make_direct_requests: settings.flag(MAKE_DIRECT_REQUESTS),
            frontend_base_path: settings.text(FRONTEND_BASE_PATH, "/"),
            clean_up_old_queue_entries: settings.flag(CLEAN_UP_OLD_QUEUE_ENTRIES),
            clean_up_processed_age: days(settings.uint(CLEAN_UP_PROCESSED_AGE, 2)),
            clean_up_scheduled_age: days(settings.uint(CLEAN_UP_SCHEDULED_AGE, 7)),
            settings,
        }
    }

    /// Builds a new snapshot from `settings` alone, nothing of `self` is kept.
    pub fn with_extension_settings(&self, settings: ExtensionSettings) -> Self {
        Self::from_settings(settings)
    }

    pub fn extension_settings(&self) -> &ExtensionSettings {
        &self.settings
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from_settings(ExtensionSettings::default())
    }
}

fn days(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

impl Default for OnError {
    fn default() -> Self {
        Self::SkipAndLog
    }
}
