use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crawlplan::{
    CrawlConfig, CrawlRequestBuilder, ExtensionSettings, Outcome, PageRecord, UrlVariant,
    UrlVariantGenerator,
};

fn extension_settings() -> ExtensionSettings {
    [
        ("sleepTime", "1000"),
        ("sleepAfterFinish", "10"),
        ("countInARun", "100"),
        ("purgeQueueDays", "14"),
        ("processLimit", "1"),
        ("processMaxRunTime", "300"),
        ("maxCompileUrls", "10000"),
        ("processDebug", "0"),
        ("processVerbose", "0"),
        ("crawlHiddenPages", "0"),
        ("phpPath", "/usr/bin/php"),
        ("enableTimeslot", "1"),
        ("makeDirectRequests", "0"),
        ("frontendBasePath", "/"),
        ("cleanUpOldQueueEntries", "1"),
        ("cleanUpProcessedAge", "2"),
        ("cleanUpScheduledAge", "7"),
    ]
    .into_iter()
    .collect()
}

fn config() -> Arc<CrawlConfig> {
    Arc::new(CrawlConfig::from_settings(extension_settings()))
}

/// Returns a fixed list of URLs and counts its invocations.
struct CountingGenerator {
    urls: Vec<UrlVariant>,
    calls: Arc<AtomicUsize>,
}

impl CountingGenerator {
    fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            urls: vec![
                "index.php?q=search&page=1".into(),
                "index.php?q=search&page=2".into(),
            ],
            calls,
        }
    }
}

impl UrlVariantGenerator for CountingGenerator {
    fn generate(&self, _page_id: u64) -> Vec<UrlVariant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.clone()
    }
}

fn builder(
    skip: Option<&'static str>,
    calls: Arc<AtomicUsize>,
) -> CrawlRequestBuilder<
    impl Fn(&PageRecord, &CrawlConfig) -> Option<String> + Send + Sync,
    CountingGenerator,
> {
    CrawlRequestBuilder::new(
        config(),
        move |_: &PageRecord, _: &CrawlConfig| skip.map(String::from),
        CountingGenerator::new(calls),
    )
}

fn search_urls() -> Vec<UrlVariant> {
    vec![
        "index.php?q=search&page=1".into(),
        "index.php?q=search&page=2".into(),
    ]
}

#[test]
fn skip_message_when_uid_not_an_integer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcome = builder(None, calls.clone()).build_urls(&PageRecord::new().with("uid", "string"));

    assert_eq!(
        Outcome::Skipped("PageUid \"string\" was not an integer".into()),
        outcome
    );
    assert_eq!(0, calls.load(Ordering::SeqCst));
}

#[test]
fn not_skipped_returns_generated_urls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcome = builder(None, calls.clone()).build_urls(&PageRecord::new().with("uid", 2001));

    assert_eq!(Outcome::Produced(search_urls()), outcome);
    assert_eq!(1, calls.load(Ordering::SeqCst));
}

#[test]
fn skipped_page_returns_no_urls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcome = builder(Some("Because page is hidden"), calls.clone())
        .build_urls(&PageRecord::new().with("uid", 2001));

    assert!(outcome.urls().is_empty());
    assert_eq!(Some("Because page is hidden"), outcome.skip_reason());
    assert_eq!(0, calls.load(Ordering::SeqCst));
}

#[test]
fn uid_string_with_int_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcome = builder(None, calls).build_urls(&PageRecord::new().with("uid", "2001"));

    assert_eq!(search_urls(), outcome.urls());
}

#[test]
fn uid_string_with_string_value_wins_over_delegated_reason() {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcome = builder(Some("Because page is hidden"), calls)
        .build_urls(&PageRecord::new().with("uid", "string"));

    assert_eq!(
        Some("PageUid \"string\" was not an integer"),
        outcome.skip_reason()
    );
}

#[test]
fn generator_receives_parsed_uid() {
    let builder = CrawlRequestBuilder::new(
        config(),
        |_: &PageRecord, _: &CrawlConfig| None,
        |page_id: u64| vec![UrlVariant::new(format!("/index.php?id={page_id}"))],
    );
    let outcome = builder.build_urls(&PageRecord::new().with("uid", "0042"));

    assert_eq!(vec![UrlVariant::from("/index.php?id=42")], outcome.urls());
}

#[test]
fn empty_generation_is_not_a_skip() {
    let builder = CrawlRequestBuilder::new(
        config(),
        |_: &PageRecord, _: &CrawlConfig| None,
        |_: u64| Vec::new(),
    );
    let outcome = builder.build_urls(&PageRecord::new().with("uid", 7));

    assert_eq!(Outcome::Produced(vec![]), outcome);
}

#[test]
fn settings_fixture_is_typed() {
    let config = config();

    assert_eq!(std::time::Duration::from_millis(1000), config.sleep_time);
    assert_eq!(100, config.count_in_a_run);
    assert_eq!(1, config.process_limit);
    assert_eq!(10_000, config.max_compile_urls);
    assert!(config.enable_timeslot);
    assert!(!config.crawl_hidden_pages);
    assert!(config.clean_up_old_queue_entries);
    assert_eq!("/", config.frontend_base_path);
    assert_eq!(std::path::Path::new("/usr/bin/php"), config.php_path);
}

#[test]
fn set_extension_settings_replaces_everything() {
    let config = config();
    let settings = ExtensionSettings::new()
        .with("makeDirectRequests", 0i64)
        .with("frontendBasePath", "/");

    let config = config.with_extension_settings(settings.clone());

    assert_eq!(&settings, config.extension_settings());
    assert!(!config.enable_timeslot);
    assert!(!config.clean_up_old_queue_entries);
    assert!(!config.make_direct_requests);
    assert_eq!(CrawlConfig::from_settings(settings), config);
}

#[test]
fn builders_share_one_snapshot_across_threads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let builder = Arc::new(builder(None, calls.clone()));

    let handles = (0..4)
        .map(|uid| {
            let builder = builder.clone();
            std::thread::spawn(move || builder.build_urls(&PageRecord::new().with("uid", uid)))
        })
        .collect::<Vec<_>>();

    for handle in handles {
        assert_eq!(Outcome::Produced(search_urls()), handle.join().unwrap());
    }
    assert_eq!(4, calls.load(Ordering::SeqCst));
}
