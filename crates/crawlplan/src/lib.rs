mod builder;
mod config;
mod eligibility;
mod instruction;
mod page;
mod planner;
mod profile;
mod queue;
mod variants;

pub use builder::{CrawlRequestBuilder, Outcome};
pub use config::{keys, CrawlConfig, ExtensionSettings, OnError, SettingValue};
pub use eligibility::{PageEligibility, PageSkipRules, SkipCheck, SkipVerdict, DISALLOWED_DOKTYPES};
pub use instruction::{matches, parse_instruction_list};
pub use page::{hidden_subtrees, PageRecord, UidParse};
pub use planner::{compile_queue, Plan, PlanRequest, Run, SkippedPage};
pub use profile::{configuration_keys, load_profiles, select_profiles, CrawlProfile};
pub use queue::{CleanupPolicy, QueueEntry, Staleness, TIMESLOT_TOLERANCE_SECS};
pub use variants::{ParameterExpansion, UrlVariant, UrlVariantGenerator};

pub use anyhow;
