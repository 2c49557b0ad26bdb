use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page of the site tree as delivered by the page-tree collaborator.
///
/// Field values are untyped, readers coerce what they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageRecord(Map<String, Value>);

impl PageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn uid(&self) -> UidParse {
        UidParse::from_field(self.field("uid"))
    }

    pub fn pid(&self) -> Option<u64> {
        self.field("pid").and_then(as_uint)
    }

    pub fn doktype(&self) -> Option<u64> {
        self.field("doktype").and_then(as_uint)
    }

    pub fn is_hidden(&self) -> bool {
        self.field("hidden").map(is_truthy).unwrap_or(false)
    }

    pub fn extends_to_subpages(&self) -> bool {
        self.field("extendToSubpages").map(is_truthy).unwrap_or(false)
    }
}

impl From<Map<String, Value>> for PageRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Uids of the pages lying below a hidden page that extends to its subpages.
///
/// Parents are followed through `pid` among `pages` only, so a rootline
/// leaving the given records ends there.
pub fn hidden_subtrees(pages: &[PageRecord]) -> BTreeSet<u64> {
    let parents: HashMap<u64, &PageRecord> = pages
        .iter()
        .filter_map(|page| page.uid().valid().map(|uid| (uid, page)))
        .collect();

    let mut hidden = BTreeSet::new();
    for (&uid, page) in &parents {
        let mut seen = BTreeSet::from([uid]);
        let mut pid = page.pid();
        while let Some(parent) = pid.filter(|pid| seen.insert(*pid)) {
            let Some(record) = parents.get(&parent) else {
                break;
            };
            if record.is_hidden() && record.extends_to_subpages() {
                hidden.insert(uid);
                break;
            }
            pid = record.pid();
        }
    }
    hidden
}

/// Outcome of reading a page identifier.
///
/// `Invalid` keeps the textual form of the original value so that it can be
/// reported as it was supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidParse {
    Valid(u64),
    Invalid(String),
}

impl UidParse {
    /// Accepts a non-negative JSON integer or a string made of decimal digits.
    pub fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(v) => as_uint(v)
                .map(Self::Valid)
                .unwrap_or_else(|| Self::Invalid(textual_form(v))),
            None => Self::Invalid(String::new()),
        }
    }

    pub fn valid(&self) -> Option<u64> {
        match self {
            Self::Valid(uid) => Some(*uid),
            Self::Invalid(_) => None,
        }
    }
}

impl fmt::Display for UidParse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(uid) => write!(f, "{uid}"),
            Self::Invalid(text) => f.write_str(text),
        }
    }
}

fn as_uint(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn textual_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
