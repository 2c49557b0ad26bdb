use std::collections::{BTreeMap, HashSet};
use std::io;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::OnError;
use crate::eligibility::PageSkipRules;
use crate::instruction::{self, parse_instruction_list};

/// A named crawl configuration, selected on the command line by its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProfile {
    pub name: String,

    /// URL parameter template, e.g. `&L=[0-2]&type=[|98]`
    #[serde(default)]
    pub configuration: String,

    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Instructions attached to every URL queued by this profile
    #[serde(default, deserialize_with = "instruction_list")]
    pub proc_instructions: Vec<String>,

    /// Instructions this profile responds to, empty for all
    #[serde(default, deserialize_with = "instruction_list")]
    pub proc_instr_filter: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<u64>,

    #[serde(default)]
    pub pids_only: Vec<u64>,

    #[serde(default)]
    pub exclude_doktypes: BTreeMap<String, Vec<u64>>,
}

fn default_base_path() -> String {
    String::from("index.php")
}

impl CrawlProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration: String::new(),
            base_path: default_base_path(),
            proc_instructions: Vec::new(),
            proc_instr_filter: Vec::new(),
            exclude: Vec::new(),
            pids_only: Vec::new(),
            exclude_doktypes: BTreeMap::new(),
        }
    }

    /// Whether the profile is relevant for the instructions requested by the run.
    pub fn applies_to<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        instruction::matches(&self.proc_instr_filter, requested)
    }

    pub fn skip_rules(&self) -> PageSkipRules {
        let rules = self
            .exclude_doktypes
            .iter()
            .fold(PageSkipRules::new(), |rules, (group, doktypes)| {
                rules.exclude_doktypes(group.as_str(), doktypes.iter().copied())
            });
        rules
            .exclude_pages(self.exclude.iter().copied())
            .pids_only(self.pids_only.iter().copied())
    }
}

fn instruction_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
        Empty,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Text(text) => parse_instruction_list(&text),
        Raw::Empty => Vec::new(),
    })
}

/// Reads a YAML list of profiles, names must be unique and non-empty.
pub fn load_profiles<R: io::Read>(rdr: R) -> anyhow::Result<Vec<CrawlProfile>> {
    let profiles = serde_yaml::from_reader::<_, Option<Vec<CrawlProfile>>>(rdr)
        .context("Couldn't parse crawl profiles")?
        .unwrap_or_default();

    let mut names = HashSet::new();
    for profile in &profiles {
        if profile.name.is_empty() {
            bail!("Crawl profile without a name");
        }
        if !names.insert(profile.name.as_str()) {
            bail!("Duplicate crawl profile \"{}\"", profile.name);
        }
    }

    Ok(profiles)
}

/// Profile names given with `-conf`, split on `,` without trimming.
pub fn configuration_keys(conf: Option<&str>) -> Vec<String> {
    match conf {
        Some(conf) => conf.split(',').map(String::from).collect(),
        None => Vec::new(),
    }
}

/// Picks the profiles named by `keys` in key order, or all of them when no
/// key is given.
pub fn select_profiles<'a>(
    profiles: &'a [CrawlProfile],
    keys: &[String],
    on_error: OnError,
) -> anyhow::Result<Vec<&'a CrawlProfile>> {
    if keys.is_empty() {
        return Ok(profiles.iter().collect());
    }

    let mut selected = Vec::with_capacity(keys.len());
    for key in keys {
        match profiles.iter().find(|p| &p.name == key) {
            Some(profile) if !selected.contains(&profile) => selected.push(profile),
            Some(_) => (),
            None => match on_error {
                OnError::SkipAndLog => log::warn!("Skipping unknown crawl profile \"{key}\""),
                OnError::Fail => return Err(anyhow!("Unknown crawl profile \"{key}\"")),
            },
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_conf_given() {
        assert!(configuration_keys(None).is_empty());
    }

    #[test]
    fn one_conf_given() {
        assert_eq!(vec!["default"], configuration_keys(Some("default")));
    }

    #[test]
    fn two_conf_given() {
        assert_eq!(vec!["default", "news"], configuration_keys(Some("default,news")));
        assert_eq!(vec!["default", " news"], configuration_keys(Some("default, news")));
    }

    #[test]
    fn instruction_lists_as_text_or_sequence() {
        let yaml = r#"
- name: default
  procInstrFilter: tx_indexedsearch_reindex,tx_esetcache_clean_main
- name: news
  procInstructions: [tx_indexedsearch_reindex]
  excludeDoktypes:
    sysfolders: [254]
"#;
        let profiles = load_profiles(yaml.as_bytes()).unwrap();
        assert_eq!(
            vec!["tx_indexedsearch_reindex", "tx_esetcache_clean_main"],
            profiles[0].proc_instr_filter
        );
        assert_eq!("index.php", profiles[0].base_path);
        assert_eq!(vec!["tx_indexedsearch_reindex"], profiles[1].proc_instructions);
        assert!(profiles[1].proc_instr_filter.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = "- name: a\n- name: a\n";
        assert!(load_profiles(yaml.as_bytes()).is_err());
    }

    #[test]
    fn selection_follows_keys() {
        let profiles = vec![CrawlProfile::new("default"), CrawlProfile::new("news")];

        let all = select_profiles(&profiles, &[], OnError::Fail).unwrap();
        assert_eq!(2, all.len());

        let keys = configuration_keys(Some("news,default,news"));
        let picked = select_profiles(&profiles, &keys, OnError::Fail).unwrap();
        assert_eq!(
            vec!["news", "default"],
            picked.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );

        let keys = configuration_keys(Some("news,blog"));
        assert!(select_profiles(&profiles, &keys, OnError::Fail).is_err());
        let picked = select_profiles(&profiles, &keys, OnError::SkipAndLog).unwrap();
        assert_eq!(1, picked.len());
    }

    #[test]
    fn filter_decides_relevance() {
        let mut profile = CrawlProfile::new("default");
        assert!(profile.applies_to::<String>(&[]));

        profile.proc_instr_filter = vec!["tx_indexedsearch_reindex".into()];
        assert!(!profile.applies_to::<String>(&[]));
        assert!(profile.applies_to(&["tx_indexedsearch_reindex"]));
    }
}
