// tests/config_load.rs
use std::path::Path;
use std::{env, fs};

use f1_news_pipeline::config::{load_settings, Settings, ENV_CONFIG_PATH};

const ENV_KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    "MAX_POSTS_PER_HOUR",
    "MIN_RELEVANCE_SCORE",
    "CHECK_INTERVAL_MINUTES",
    "REDIS_URL",
    "OLLAMA_BASE_URL",
    "OLLAMA_MODEL",
    "RSS_FEEDS",
    "AUTO_PUBLISH",
    "KEYWORDS_CONFIG_PATH",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHANNEL_ID",
];

fn clear_env() {
    for k in ENV_KEYS {
        env::remove_var(k);
    }
}

/// Run `f` with the CWD inside a fresh temp dir so the repo's config/ is not read.
fn in_temp_cwd<F: FnOnce(&Path)>(f: F) {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();
    f(tmp.path());
    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn defaults_without_any_config() {
    in_temp_cwd(|_| {
        let s = load_settings().unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.max_posts_per_hour, 5);
        assert_eq!(s.min_relevance_score, 0.7);
    });
}

#[serial_test::serial]
#[test]
fn env_path_must_exist() {
    in_temp_cwd(|dir| {
        env::set_var(ENV_CONFIG_PATH, dir.join("nope.toml").display().to_string());
        let err = load_settings().unwrap_err();
        assert!(err.to_string().contains(ENV_CONFIG_PATH));
    });
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    in_temp_cwd(|dir| {
        let p = dir.join("pipeline.toml");
        fs::write(
            &p,
            r#"
max_posts_per_hour = 2
min_relevance_score = 0.9
rss_feeds = ["https://feed.test/rss"]

[limits]
sync_batch = 0
"#,
        )
        .unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var("MIN_RELEVANCE_SCORE", "0.5");
        env::set_var("AUTO_PUBLISH", "true");

        let s = load_settings().unwrap();
        assert_eq!(s.max_posts_per_hour, 2);
        assert_eq!(s.min_relevance_score, 0.5);
        assert_eq!(s.rss_feeds, vec!["https://feed.test/rss"]);
        assert!(s.auto_publish);
        assert_eq!(s.limits.sync_batch, 1);
    });
}

#[serial_test::serial]
#[test]
fn default_path_in_cwd_is_picked_up() {
    in_temp_cwd(|dir| {
        fs::create_dir_all(dir.join("config")).unwrap();
        fs::write(dir.join("config/pipeline.toml"), "redis_url = \"redis://cache:6379\"").unwrap();
        let s = load_settings().unwrap();
        assert_eq!(s.redis_url, "redis://cache:6379");
    });
}

#[serial_test::serial]
#[test]
fn custom_keywords_file_drives_both_gates() {
    in_temp_cwd(|dir| {
        let kw = dir.join("keywords.toml");
        fs::write(
            &kw,
            r#"
[tiers]
general = ["kart"]
high_priority = ["karting"]

[moderation]
spam_keywords = ["casino"]
"#,
        )
        .unwrap();
        env::set_var("KEYWORDS_CONFIG_PATH", kw.display().to_string());

        let s = load_settings().unwrap();
        let (scorer, moderator) = s.build_gates().unwrap();
        assert_eq!(scorer.tiers().all(), vec!["kart", "karting"]);
        // general + high priority + two title hits
        let score = scorer.score("Karting weekend", "").score;
        assert!((score - 0.6).abs() < 1e-6);

        let stats = moderator.stats();
        assert_eq!(stats.spam_keywords, 1);
        assert_eq!(stats.topical_keywords, 2);
        // other moderation lists keep their defaults
        assert_eq!(stats.promo_patterns, 8);
    });
}

#[test]
fn shipped_config_files_parse() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let s = Settings::load_from_file(root.join("config/pipeline.toml")).unwrap();
    assert_eq!(s.rss_feeds.len(), 2);
    assert_eq!(s.intervals.collect_secs, 900);
    assert!(!s.auto_publish);

    let s = Settings {
        keywords_path: Some(root.join("config/keywords.toml")),
        ..s
    };
    let (scorer, moderator) = s.build_gates().unwrap();
    assert!(scorer.tiers().all().contains(&"verstappen".to_string()));
    let stats = moderator.stats();
    assert_eq!(stats.spam_keywords, 11);
    assert_eq!(stats.source_rules, 3);
}
