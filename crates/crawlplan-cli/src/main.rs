use std::env;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use crawlplan::{
    compile_queue, configuration_keys, keys, load_profiles, select_profiles, CleanupPolicy,
    CrawlConfig, CrawlProfile, ExtensionSettings, OnError, PageRecord, PlanRequest,
};
use fs_err::File;

mod writer;

use writer::{QueueCsvFormat, QueueWriter};

/// Crawl queue planner
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "plan")]
    Plan(PlanArgs),
    #[command(name = "cleanup")]
    Cleanup(CleanupArgs),
    #[command(hide = true)]
    Completion,
}

/// Compile the crawl queue of a list of pages
#[derive(Debug, clap::Args)]
pub struct PlanArgs {
    /// JSON file holding an array of page records
    #[arg(long)]
    pub pages: PathBuf,
    /// YAML file holding the crawl profiles
    #[arg(long)]
    pub profiles: PathBuf,
    /// Optional YAML extension settings
    #[arg(env = "CRAWLPLAN_SETTINGS", long)]
    pub settings: Option<PathBuf>,
    /// Comma separated profile names, all profiles when omitted
    #[arg(long)]
    pub conf: Option<String>,
    /// Processing instruction requested for this run, may be repeated
    #[arg(long = "proc-instruction")]
    pub proc_instructions: Vec<String>,
    /// Queue CSV holding already planned entries
    #[arg(long)]
    pub queue: Option<PathBuf>,
    /// Output CSV file, stdout when omitted
    #[arg(long, short)]
    pub output_file: Option<PathBuf>,
    /// Field delimiter of queue and output CSV files
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
    /// Override the maximum number of concurrent workers
    #[arg(long)]
    pub process_limit: Option<usize>,
    /// Override the maximum number of URLs compiled per page
    #[arg(long)]
    pub max_compile_urls: Option<usize>,
    /// Also plan hidden pages
    #[arg(long)]
    pub crawl_hidden_pages: bool,
    /// What to do with unknown or broken profiles
    #[arg(value_enum, long, default_value = "skip-and-log")]
    pub on_profile_error: OnError,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&PlanArgs> for CrawlConfig {
    type Error = anyhow::Error;

    fn try_from(args: &PlanArgs) -> Result<Self, Self::Error> {
        let mut settings = load_settings(args.settings.as_deref())?;
        if let Some(process_limit) = args.process_limit {
            settings.insert(keys::PROCESS_LIMIT, process_limit.to_string());
        }
        if let Some(max_compile_urls) = args.max_compile_urls {
            settings.insert(keys::MAX_COMPILE_URLS, max_compile_urls.to_string());
        }
        if args.crawl_hidden_pages {
            settings.insert(keys::CRAWL_HIDDEN_PAGES, "1");
        }
        Ok(CrawlConfig::from_settings(settings))
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<ExtensionSettings> {
    match path {
        Some(path) => ExtensionSettings::from_yaml_reader(File::open(path)?),
        None => Ok(ExtensionSettings::default()),
    }
}

fn read_pages(path: &Path) -> anyhow::Result<Vec<PageRecord>> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Couldn't parse pages {}", path.display()))
}

fn init_logger(config: &CrawlConfig, quiet: bool) {
    if quiet {
        return;
    }
    if env::var_os("RUST_LOG").is_none() {
        let level = if config.process_debug {
            "debug"
        } else if config.process_verbose {
            "info"
        } else {
            "warn"
        };
        env::set_var("RUST_LOG", format!("crawlplan={level},crawlplan_cli={level}"));
    }
    env_logger::init();
}

pub fn plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = Arc::new(CrawlConfig::try_from(&args)?);
    init_logger(&config, args.quiet);

    let profiles = load_profiles(File::open(&args.profiles)?)?;
    let keys = configuration_keys(args.conf.as_deref());
    let profiles: Vec<CrawlProfile> = select_profiles(&profiles, &keys, args.on_profile_error)?
        .into_iter()
        .cloned()
        .collect();

    let format = QueueCsvFormat::try_from(args.delimiter)?;
    let pages = read_pages(&args.pages)?;
    let existing = match &args.queue {
        Some(path) => format.read(path)?,
        None => vec![],
    };

    let request = PlanRequest {
        profiles: &profiles,
        pages: &pages,
        proc_instructions: &args.proc_instructions,
        existing: &existing,
        on_profile_error: args.on_profile_error,
        now: Utc::now(),
    };
    let plan = compile_queue(config.clone(), &request)?;

    for skipped in &plan.skipped {
        log::info!(
            "Skipped page \"{}\" for profile \"{}\": {}",
            skipped.uid,
            skipped.profile,
            skipped.reason
        );
    }

    let mut wtr = QueueWriter::create(args.output_file.as_deref(), &format)?;
    wtr.write_plan_header()?;
    for run in plan.runs(&config) {
        let estimated = run.estimated_duration(&config);
        if estimated > config.process_max_run_time {
            log::warn!(
                "Run {} needs about {}s, more than the {}s a process may run",
                run.number,
                estimated.as_secs(),
                config.process_max_run_time.as_secs()
            );
        }
        for entry in run.entries {
            wtr.write_planned(entry, run.number)?;
        }
    }
    wtr.flush()?;

    Ok(())
}

/// Remove stale entries from a queue CSV
#[derive(Debug, clap::Args)]
pub struct CleanupArgs {
    /// Queue CSV to clean up
    #[arg(long)]
    pub queue: PathBuf,
    /// Optional YAML extension settings
    #[arg(env = "CRAWLPLAN_SETTINGS", long)]
    pub settings: Option<PathBuf>,
    /// Output CSV file, stdout when omitted
    #[arg(long, short)]
    pub output_file: Option<PathBuf>,
    /// Field delimiter of the queue CSV files
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn cleanup(args: CleanupArgs) -> anyhow::Result<()> {
    let config = CrawlConfig::from_settings(load_settings(args.settings.as_deref())?);
    init_logger(&config, args.quiet);

    let format = QueueCsvFormat::try_from(args.delimiter)?;
    let mut entries = format.read(&args.queue)?;
    let dropped = CleanupPolicy::from(&config).retain_fresh(&mut entries, Utc::now());
    log::info!("Dropped {dropped} stale queue entries, {} left", entries.len());

    let mut wtr = QueueWriter::create(args.output_file.as_deref(), &format)?;
    for entry in &entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Plan(args) => plan(args),
        SubCommand::Cleanup(args) => cleanup(args),
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "crawlplan", &mut io::stdout());
            Ok(())
        }
    }
}
