use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::config::CrawlConfig;
use crate::page::{PageRecord, UidParse};

/// Doktypes that never render a crawlable page: external link, shortcut,
/// spacer, folder and recycler.
pub const DISALLOWED_DOKTYPES: [u64; 5] = [3, 4, 199, 254, 255];

/// A rule that may exclude a page from crawling.
///
/// Returns the human readable reason when the page must be skipped.
pub trait SkipCheck: Send + Sync {
    fn skip_reason(&self, page: &PageRecord, config: &CrawlConfig) -> Option<String>;
}

impl<F> SkipCheck for F
where
    F: Fn(&PageRecord, &CrawlConfig) -> Option<String> + Send + Sync,
{
    fn skip_reason(&self, page: &PageRecord, config: &CrawlConfig) -> Option<String> {
        self(page, config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipVerdict {
    NotSkipped { uid: u64 },
    Skipped { reason: String },
}

impl SkipVerdict {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Skipped { reason } => Some(reason),
            Self::NotSkipped { .. } => None,
        }
    }
}

/// Decides whether a page is crawled at all.
///
/// The page uid is validated before the delegated check runs.
#[derive(Debug, Clone)]
pub struct PageEligibility<C> {
    check: C,
}

impl<C: SkipCheck> PageEligibility<C> {
    pub fn new(check: C) -> Self {
        Self { check }
    }

    pub fn evaluate(&self, page: &PageRecord, config: &CrawlConfig) -> SkipVerdict {
        let uid = match page.uid() {
            UidParse::Valid(uid) => uid,
            UidParse::Invalid(text) => {
                return SkipVerdict::Skipped {
                    reason: format!("PageUid \"{text}\" was not an integer"),
                }
            }
        };

        match self.check.skip_reason(page, config) {
            Some(reason) if !reason.is_empty() => SkipVerdict::Skipped { reason },
            _ => SkipVerdict::NotSkipped { uid },
        }
    }
}

/// The standard page rules, checked in declaration order.
#[derive(Clone, Default)]
pub struct PageSkipRules {
    excluded_doktypes: BTreeMap<String, BTreeSet<u64>>,
    excluded_uids: BTreeSet<u64>,
    pids_only: BTreeSet<u64>,
    hidden_rootline: BTreeSet<u64>,
    vetoes: Vec<Arc<dyn SkipCheck>>,
}

impl PageSkipRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes every doktype of `doktypes`, reported under `group`.
    pub fn exclude_doktypes(
        mut self,
        group: impl Into<String>,
        doktypes: impl IntoIterator<Item = u64>,
    ) -> Self {
        self.excluded_doktypes
            .entry(group.into())
            .or_default()
            .extend(doktypes);
        self
    }

    pub fn exclude_pages(mut self, uids: impl IntoIterator<Item = u64>) -> Self {
        self.excluded_uids.extend(uids);
        self
    }

    /// Restricts crawling to `uids` when non-empty.
    pub fn pids_only(mut self, uids: impl IntoIterator<Item = u64>) -> Self {
        self.pids_only.extend(uids);
        self
    }

    /// Marks `uids` as lying below a hidden page that extends to subpages.
    pub fn hidden_in_rootline(mut self, uids: impl IntoIterator<Item = u64>) -> Self {
        self.hidden_rootline.extend(uids);
        self
    }

    pub fn veto(mut self, check: impl SkipCheck + 'static) -> Self {
        self.vetoes.push(Arc::new(check));
        self
    }
}

impl fmt::Debug for PageSkipRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSkipRules")
            .field("excluded_doktypes", &self.excluded_doktypes)
            .field("excluded_uids", &self.excluded_uids)
            .field("pids_only", &self.pids_only)
            .field("hidden_rootline", &self.hidden_rootline)
            .field("vetoes", &self.vetoes.len())
            .finish()
    }
}

impl SkipCheck for PageSkipRules {
    fn skip_reason(&self, page: &PageRecord, config: &CrawlConfig) -> Option<String> {
        if !config.crawl_hidden_pages {
            if page.is_hidden() {
                return Some("Because page is hidden".into());
            }
            if let Some(uid) = page.uid().valid() {
                if self.hidden_rootline.contains(&uid) {
                    return Some("Because a parent page is hidden for its subpages".into());
                }
            }
        }

        if let Some(doktype) = page.doktype() {
            if DISALLOWED_DOKTYPES.contains(&doktype) {
                return Some("Because doktype is not allowed".into());
            }
            for (group, doktypes) in &self.excluded_doktypes {
                if doktypes.contains(&doktype) {
                    return Some(format!("Doktype was excluded by \"{group}\""));
                }
            }
        }

        if let Some(uid) = page.uid().valid() {
            if self.excluded_uids.contains(&uid) {
                return Some(format!("Page {uid} was excluded by configuration"));
            }
            if !self.pids_only.is_empty() && !self.pids_only.contains(&uid) {
                return Some(format!("Page {uid} is not in the pidsOnly list"));
            }
        }

        self.vetoes
            .iter()
            .find_map(|veto| veto.skip_reason(page, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, ExtensionSettings};

    fn never(_: &PageRecord, _: &CrawlConfig) -> Option<String> {
        None
    }

    #[test]
    fn invalid_uid_short_circuits() {
        let eligibility = PageEligibility::new(|_: &PageRecord, _: &CrawlConfig| {
            Some("delegated".to_string())
        });
        let verdict = eligibility.evaluate(
            &PageRecord::new().with("uid", "string"),
            &CrawlConfig::default(),
        );
        assert_eq!(Some("PageUid \"string\" was not an integer"), verdict.reason());
    }

    #[test]
    fn empty_reason_does_not_skip() {
        let eligibility = PageEligibility::new(|_: &PageRecord, _: &CrawlConfig| Some(String::new()));
        let verdict = eligibility.evaluate(&PageRecord::new().with("uid", 1), &CrawlConfig::default());
        assert_eq!(SkipVerdict::NotSkipped { uid: 1 }, verdict);
    }

    #[test]
    fn passes_with_no_rule_triggered() {
        let eligibility = PageEligibility::new(never);
        let verdict =
            eligibility.evaluate(&PageRecord::new().with("uid", "2001"), &CrawlConfig::default());
        assert_eq!(SkipVerdict::NotSkipped { uid: 2001 }, verdict);
    }

    #[test]
    fn hidden_pages_follow_config() {
        let rules = PageSkipRules::new();
        let page = PageRecord::new().with("uid", 5).with("hidden", "1");

        let config = CrawlConfig::default();
        assert_eq!(
            Some("Because page is hidden".to_string()),
            rules.skip_reason(&page, &config)
        );

        let config = CrawlConfig::from_settings(
            ExtensionSettings::new().with(keys::CRAWL_HIDDEN_PAGES, "1"),
        );
        assert_eq!(None, rules.skip_reason(&page, &config));

        let config = CrawlConfig::from_settings(
            ExtensionSettings::new().with(keys::CRAWL_HIDDEN_PAGES, "yes"),
        );
        assert!(rules.skip_reason(&page, &config).is_some());
    }

    #[test]
    fn hidden_rootline_follows_config() {
        let rules = PageSkipRules::new().hidden_in_rootline([5]);
        let page = PageRecord::new().with("uid", 5).with("doktype", 254);

        assert_eq!(
            Some("Because a parent page is hidden for its subpages".to_string()),
            rules.skip_reason(&page, &CrawlConfig::default())
        );

        let config = CrawlConfig::from_settings(
            ExtensionSettings::new().with(keys::CRAWL_HIDDEN_PAGES, "1"),
        );
        assert_eq!(
            Some("Because doktype is not allowed".to_string()),
            rules.skip_reason(&page, &config)
        );
    }

    #[test]
    fn doktype_rules() {
        let rules = PageSkipRules::new().exclude_doktypes("news", [7, 8]);
        let config = CrawlConfig::default();

        let spacer = PageRecord::new().with("uid", 1).with("doktype", 199);
        assert_eq!(
            Some("Because doktype is not allowed".to_string()),
            rules.skip_reason(&spacer, &config)
        );

        let news = PageRecord::new().with("uid", 1).with("doktype", "8");
        assert_eq!(
            Some("Doktype was excluded by \"news\"".to_string()),
            rules.skip_reason(&news, &config)
        );

        let standard = PageRecord::new().with("uid", 1).with("doktype", 1);
        assert_eq!(None, rules.skip_reason(&standard, &config));
    }

    #[test]
    fn page_lists() {
        let config = CrawlConfig::default();
        let rules = PageSkipRules::new().exclude_pages([3]).pids_only([1, 3]);

        assert_eq!(None, rules.skip_reason(&PageRecord::new().with("uid", 1), &config));
        assert_eq!(
            Some("Page 3 was excluded by configuration".to_string()),
            rules.skip_reason(&PageRecord::new().with("uid", 3), &config)
        );
        assert_eq!(
            Some("Page 4 is not in the pidsOnly list".to_string()),
            rules.skip_reason(&PageRecord::new().with("uid", 4), &config)
        );
    }

    #[test]
    fn vetoes_run_in_order() {
        let rules = PageSkipRules::new()
            .veto(never)
            .veto(|_: &PageRecord, _: &CrawlConfig| Some("first".to_string()))
            .veto(|_: &PageRecord, _: &CrawlConfig| Some("second".to_string()));
        assert_eq!(
            Some("first".to_string()),
            rules.skip_reason(&PageRecord::new().with("uid", 1), &CrawlConfig::default())
        );
    }
}
