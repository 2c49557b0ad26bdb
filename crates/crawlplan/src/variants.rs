use std::fmt;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::config::CrawlConfig;
use crate::profile::CrawlProfile;

/// One concrete, crawlable URL of a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlVariant(String);

impl UrlVariant {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UrlVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UrlVariant {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UrlVariant {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for UrlVariant {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl PartialEq<&str> for UrlVariant {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Produces the URL variants of a page, in a stable order.
///
/// Duplicates are allowed and an empty result is legitimate.
pub trait UrlVariantGenerator: Send + Sync {
    fn generate(&self, page_id: u64) -> Vec<UrlVariant>;
}

impl<F> UrlVariantGenerator for F
where
    F: Fn(u64) -> Vec<UrlVariant> + Send + Sync,
{
    fn generate(&self, page_id: u64) -> Vec<UrlVariant> {
        self(page_id)
    }
}

/// Expands a parameter template into every combination of its values.
///
/// `&L=[0-2]&type=[|98]` yields `L=0&type=`, `L=0&type=98`, `L=1&type=` ...
/// The first parameter varies slowest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterExpansion {
    script: String,
    parameters: Vec<Vec<String>>,
    limit: usize,
}

impl ParameterExpansion {
    pub fn new(template: &str, base_path: &str, config: &CrawlConfig) -> anyhow::Result<Self> {
        let script = format!(
            "{}/{}",
            config.frontend_base_path.trim_end_matches('/'),
            base_path.trim_start_matches('/')
        );

        let mut parameters = vec![];
        for segment in template.split('&').filter(|s| !s.is_empty()) {
            let expanded = match segment.split_once('=') {
                Some((key, value)) => expand_value(value, config.max_compile_urls)
                    .with_context(|| format!("Invalid parameter `{segment}`"))?
                    .into_iter()
                    .map(|v| format!("{key}={v}"))
                    .collect(),
                None => vec![segment.to_string()],
            };
            parameters.push(expanded);
        }

        Ok(Self {
            script,
            parameters,
            limit: config.max_compile_urls,
        })
    }

    pub fn from_profile(profile: &CrawlProfile, config: &CrawlConfig) -> anyhow::Result<Self> {
        Self::new(&profile.configuration, &profile.base_path, config)
            .with_context(|| format!("Couldn't compile crawl profile \"{}\"", profile.name))
    }

    /// Number of variants the template describes, before the limit applies.
    pub fn combinations(&self) -> usize {
        self.parameters
            .iter()
            .fold(1usize, |acc, values| acc.saturating_mul(values.len()))
    }
}

impl UrlVariantGenerator for ParameterExpansion {
    fn generate(&self, page_id: u64) -> Vec<UrlVariant> {
        let total = self.combinations();
        if total > self.limit {
            log::warn!(
                "Page {page_id}: {total} URL combinations, only the first {} are compiled",
                self.limit
            );
        }

        let count = total.min(self.limit);
        let mut urls = Vec::with_capacity(count);
        let mut cursor = vec![0; self.parameters.len()];

        for _ in 0..count {
            let mut url = format!("{}?id={page_id}", self.script);
            for (values, &i) in self.parameters.iter().zip(&cursor) {
                url.push('&');
                url.push_str(&values[i]);
            }
            urls.push(UrlVariant(url));

            for (values, i) in self.parameters.iter().zip(cursor.iter_mut()).rev() {
                *i += 1;
                if *i < values.len() {
                    break;
                }
                *i = 0;
            }
        }

        urls
    }
}

fn expand_value(value: &str, limit: usize) -> anyhow::Result<Vec<String>> {
    let inner = match value.strip_prefix('[') {
        None => return Ok(vec![value.to_string()]),
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| anyhow!("Unterminated `[` in `{value}`"))?,
    };

    let mut values = vec![];
    for part in inner.split('|') {
        match parse_range(part)? {
            Some((from, to)) => values.extend((from..=to).take(limit).map(|n| n.to_string())),
            None => values.push(part.to_string()),
        }
    }
    Ok(values)
}

fn parse_range(part: &str) -> anyhow::Result<Option<(u64, u64)>> {
    let Some((from, to)) = part.split_once('-') else {
        return Ok(None);
    };
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(from) || !is_number(to) {
        return Ok(None);
    }

    let from: u64 = from.parse()?;
    let to: u64 = to.parse()?;
    if from > to {
        bail!("Reversed range `{part}`");
    }
    Ok(Some((from, to)))
}
