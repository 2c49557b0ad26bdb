use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::builder::{CrawlRequestBuilder, Outcome};
use crate::config::{CrawlConfig, OnError};
use crate::eligibility::PageSkipRules;
use crate::page::{hidden_subtrees, PageRecord, UidParse};
use crate::profile::CrawlProfile;
use crate::queue::QueueEntry;
use crate::variants::{ParameterExpansion, UrlVariant};

type ProfileBuilder = CrawlRequestBuilder<PageSkipRules, ParameterExpansion>;

/// Everything a queue compilation works on.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub profiles: &'a [CrawlProfile],
    pub pages: &'a [PageRecord],
    /// Instructions requested for this run
    pub proc_instructions: &'a [String],
    /// Entries already queued, used for duplicate detection
    pub existing: &'a [QueueEntry],
    pub on_profile_error: OnError,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPage {
    pub uid: String,
    pub profile: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub entries: Vec<QueueEntry>,
    pub skipped: Vec<SkippedPage>,
}

/// A batch of at most `countInARun` entries.
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    pub number: usize,
    pub entries: &'a [QueueEntry],
    /// Pause before the next run starts, zero for the last one
    pub pause_after: Duration,
}

impl Run<'_> {
    /// Time spent sleeping between requests when the entries are spread over
    /// `processLimit` workers.
    pub fn estimated_duration(&self, config: &CrawlConfig) -> Duration {
        let rounds = self.entries.len().div_ceil(config.process_limit.max(1));
        config
            .sleep_time
            .saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
    }
}

impl Plan {
    pub fn runs(&self, config: &CrawlConfig) -> Vec<Run<'_>> {
        let chunks = self.entries.chunks(config.count_in_a_run.max(1));
        let last = chunks.len().saturating_sub(1);
        chunks
            .enumerate()
            .map(|(i, entries)| Run {
                number: i + 1,
                entries,
                pause_after: if i == last {
                    Duration::ZERO
                } else {
                    config.sleep_after_finish
                },
            })
            .collect()
    }
}

/// Compiles the queue entries of `request.pages` for every profile that
/// responds to the requested instructions.
///
/// Pages are evaluated on up to `processLimit` threads, the resulting entries
/// follow page order then profile order. A URL queued twice with the same
/// instructions is kept once, at its first position.
pub fn compile_queue(config: Arc<CrawlConfig>, request: &PlanRequest) -> Result<Plan> {
    let hidden_rootline = hidden_subtrees(request.pages);
    let mut builders = vec![];
    for profile in request.profiles {
        if !profile.applies_to(request.proc_instructions) {
            log::debug!(
                "Profile \"{}\" does not respond to {:?}",
                profile.name,
                request.proc_instructions
            );
            continue;
        }
        match ParameterExpansion::from_profile(profile, &config) {
            Ok(generator) => {
                let rules = profile
                    .skip_rules()
                    .hidden_in_rootline(hidden_rootline.iter().copied());
                let builder = CrawlRequestBuilder::new(config.clone(), rules, generator);
                builders.push((profile, builder));
            }
            Err(e) => match request.on_profile_error {
                OnError::SkipAndLog => log::warn!("Skipping profile: {e:#}"),
                OnError::Fail => return Err(e),
            },
        }
    }

    let outcomes = evaluate_pages(config.process_limit, &builders, request.pages)?;

    let mut plan = Plan::default();
    let mut seen = HashSet::<(UrlVariant, Vec<String>)>::new();
    for (page, outcomes) in request.pages.iter().zip(outcomes) {
        for ((profile, _), outcome) in builders.iter().zip(outcomes) {
            let urls = match outcome {
                Outcome::Produced(urls) => urls,
                Outcome::Skipped(reason) => {
                    plan.skipped.push(SkippedPage {
                        uid: page.uid().to_string(),
                        profile: profile.name.clone(),
                        reason,
                    });
                    continue;
                }
            };
            let UidParse::Valid(page_uid) = page.uid() else {
                continue;
            };

            for url in urls {
                if !seen.insert((url.clone(), profile.proc_instructions.clone())) {
                    log::debug!("Already planned {url}");
                    continue;
                }
                let entry = QueueEntry {
                    page_uid,
                    profile: profile.name.clone(),
                    url,
                    proc_instructions: profile.proc_instructions.clone(),
                    scheduled: request.now,
                    exec_time: None,
                };
                if request
                    .existing
                    .iter()
                    .any(|queued| queued.duplicates(&entry, config.enable_timeslot))
                {
                    log::debug!("Already queued {}", entry.url);
                    continue;
                }
                plan.entries.push(entry);
            }
        }
    }

    log::info!(
        "Planned {} URL(s), skipped {} page evaluation(s)",
        plan.entries.len(),
        plan.skipped.len()
    );
    Ok(plan)
}

fn evaluate_pages(
    process_limit: usize,
    builders: &[(&CrawlProfile, ProfileBuilder)],
    pages: &[PageRecord],
) -> Result<Vec<Vec<Outcome>>> {
    let (tx_page, rx_page) = crossbeam_channel::unbounded::<(usize, &PageRecord)>();
    let (tx_outcome, rx_outcome) = crossbeam_channel::unbounded::<(usize, Vec<Outcome>)>();

    for page in pages.iter().enumerate() {
        tx_page.send(page).ok();
    }
    drop(tx_page);

    let num_workers = process_limit.min(pages.len()).max(1);

    thread::scope(|scope| -> Result<_> {
        let mut workers = vec![];
        for id in 0..num_workers {
            let rx_page = rx_page.clone();
            let tx_outcome = tx_outcome.clone();
            let worker = thread::Builder::new()
                .name(format!("planner-{id}"))
                .spawn_scoped(scope, move || {
                    for (i, page) in rx_page {
                        let outcomes = builders
                            .iter()
                            .map(|(_, builder)| builder.build_urls(page))
                            .collect();
                        if tx_outcome.send((i, outcomes)).is_err() {
                            break;
                        }
                    }
                })?;
            workers.push(worker);
        }
        drop(tx_outcome);

        let mut outcomes = vec![Vec::new(); pages.len()];
        for (i, page_outcomes) in rx_outcome {
            outcomes[i] = page_outcomes;
        }
        for w in workers {
            w.join().map_err(|_| anyhow!("Planner worker panicked"))?;
        }
        Ok(outcomes)
    })
}
