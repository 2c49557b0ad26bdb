use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::CrawlConfig;
use crate::instruction::parse_instruction_list;
use crate::variants::UrlVariant;

/// Seconds around the scheduled time in which an identical entry counts as a
/// duplicate when timeslots are enabled.
pub const TIMESLOT_TOLERANCE_SECS: i64 = 100;

/// A URL waiting in, or processed from, the crawl queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub page_uid: u64,
    pub profile: String,
    pub url: UrlVariant,
    #[serde(serialize_with = "join_list", deserialize_with = "split_list")]
    pub proc_instructions: Vec<String>,
    pub scheduled: DateTime<Utc>,
    #[serde(default)]
    pub exec_time: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn is_processed(&self) -> bool {
        self.exec_time.is_some()
    }

    /// Whether `candidate` would repeat this still pending entry.
    ///
    /// Any pending entry scheduled no later than the candidate is a duplicate.
    /// With timeslots an entry scheduled up to [`TIMESLOT_TOLERANCE_SECS`]
    /// after the candidate counts as well.
    pub fn duplicates(&self, candidate: &QueueEntry, timeslot: bool) -> bool {
        if self.is_processed()
            || self.page_uid != candidate.page_uid
            || self.url != candidate.url
            || self.proc_instructions != candidate.proc_instructions
        {
            return false;
        }

        let within_timeslot = timeslot
            && (self.scheduled - candidate.scheduled).num_seconds().abs()
                <= TIMESLOT_TOLERANCE_SECS;
        within_timeslot || self.scheduled <= candidate.scheduled
    }
}

fn join_list<S: Serializer>(list: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&list.join(","))
}

fn split_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let list = String::deserialize(deserializer)?;
    Ok(parse_instruction_list(&list))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Processed longer ago than `cleanUpProcessedAge`
    Processed,
    /// Never processed and scheduled longer ago than `cleanUpScheduledAge`
    Scheduled,
    /// Older than `purgeQueueDays`
    Purged,
}

/// Decides which queue entries are old enough to be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub clean_up_old_entries: bool,
    pub processed_age: Duration,
    pub scheduled_age: Duration,
    /// `None` keeps entries forever
    pub purge_age: Option<Duration>,
}

impl From<&CrawlConfig> for CleanupPolicy {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            clean_up_old_entries: config.clean_up_old_queue_entries,
            processed_age: days(config.clean_up_processed_age),
            scheduled_age: days(config.clean_up_scheduled_age),
            purge_age: (config.purge_queue_days > 0).then(|| days(config.purge_queue_days)),
        }
    }
}

impl CleanupPolicy {
    pub fn staleness(&self, entry: &QueueEntry, now: DateTime<Utc>) -> Option<Staleness> {
        let older_than = |time: DateTime<Utc>, age: Duration| match chrono::Duration::from_std(age)
        {
            Ok(age) => now.signed_duration_since(time) > age,
            Err(_) => false,
        };

        if let Some(age) = self.purge_age {
            if older_than(entry.exec_time.unwrap_or(entry.scheduled), age) {
                return Some(Staleness::Purged);
            }
        }

        if !self.clean_up_old_entries {
            return None;
        }
        match entry.exec_time {
            Some(exec_time) if older_than(exec_time, self.processed_age) => {
                Some(Staleness::Processed)
            }
            None if older_than(entry.scheduled, self.scheduled_age) => Some(Staleness::Scheduled),
            _ => None,
        }
    }

    /// Keeps the fresh entries, in order, and returns how many were dropped.
    pub fn retain_fresh(&self, entries: &mut Vec<QueueEntry>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|entry| match self.staleness(entry, now) {
            Some(staleness) => {
                log::debug!("Dropping {staleness:?} queue entry {}", entry.url);
                false
            }
            None => true,
        });
        before - entries.len()
    }
}

fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 60 * 60)
}
