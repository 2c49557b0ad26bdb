use std::sync::Arc;

use crate::config::CrawlConfig;
use crate::eligibility::{PageEligibility, SkipCheck, SkipVerdict};
use crate::page::PageRecord;
use crate::variants::{UrlVariant, UrlVariantGenerator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(String),
    Produced(Vec<UrlVariant>),
}

impl Outcome {
    pub fn urls(&self) -> &[UrlVariant] {
        match self {
            Self::Produced(urls) => urls,
            Self::Skipped(_) => &[],
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skipped(reason) => Some(reason),
            Self::Produced(_) => None,
        }
    }
}

/// Turns page records into the URLs to crawl.
///
/// The generator only runs for pages that passed eligibility.
#[derive(Debug, Clone)]
pub struct CrawlRequestBuilder<C, G> {
    config: Arc<CrawlConfig>,
    eligibility: PageEligibility<C>,
    generator: G,
}

impl<C, G> CrawlRequestBuilder<C, G>
where
    C: SkipCheck,
    G: UrlVariantGenerator,
{
    pub fn new(config: Arc<CrawlConfig>, check: C, generator: G) -> Self {
        Self {
            config,
            eligibility: PageEligibility::new(check),
            generator,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn build_urls(&self, page: &PageRecord) -> Outcome {
        match self.eligibility.evaluate(page, &self.config) {
            SkipVerdict::Skipped { reason } => {
                log::debug!("Skipping page: {reason}");
                Outcome::Skipped(reason)
            }
            SkipVerdict::NotSkipped { uid } => Outcome::Produced(self.generator.generate(uid)),
        }
    }
}
