// tests/moderation_scenarios.rs
use chrono::Utc;
use f1_news_pipeline::model::{EnrichedItem, ImportanceLevel, RawItem, Sentiment, SourceKind};
use f1_news_pipeline::moderation::{reasons, ModerationRules, Moderator};

fn enriched(title: &str, body: &str, relevance: f32) -> EnrichedItem {
    let mut raw = RawItem::new(
        title,
        body,
        "https://news.test/item",
        "Test Feed",
        SourceKind::Feed,
        Utc::now(),
    );
    raw.relevance_score = relevance;
    EnrichedItem::from_raw(raw)
}

fn strong_body() -> String {
    "Breaking: Ferrari and Mercedes drivers prepare for the Formula 1 race weekend. ".repeat(4)
}

#[test]
fn well_formed_item_is_approved() {
    let m = Moderator::default();
    let mut item = enriched("F1 championship test update", &strong_body(), 0.8);
    item.importance = ImportanceLevel::new(4).unwrap();
    item.sentiment = Sentiment::Positive;
    assert!(item.body().chars().count() >= 300);

    let v = m.moderate(&item);
    assert!(v.approved, "reasons: {:?}", v.reasons);
    assert!(v.quality_score > 0.3);
    assert!(v.reasons.is_empty());
    // contains "championship"
    assert!(v.suggestions.contains(&reasons::PRIORITIZE.to_string()));
}

#[test]
fn two_word_title_is_rejected_as_duplicate() {
    let m = Moderator::default();
    let mut item = enriched("F1 test", &strong_body(), 0.8);
    item.importance = ImportanceLevel::new(4).unwrap();
    item.sentiment = Sentiment::Positive;

    let v = m.moderate(&item);
    assert!(!v.approved);
    assert_eq!(v.reasons, vec![reasons::DUPLICATE.to_string()]);
    assert!(v.quality_score > 0.3);
}

#[test]
fn spam_short_circuits_with_single_reason() {
    let m = Moderator::default();
    let mut item = enriched(
        "Verstappen wins in Monaco",
        "Buy now! Guaranteed winner!!!",
        0.9,
    );
    item.importance = ImportanceLevel::MAX;

    let v = m.moderate(&item);
    assert!(!v.approved);
    assert_eq!(v.reasons, vec![reasons::SPAM.to_string()]);
    assert_eq!(v.quality_score, 0.0);
    assert!(v.suggestions.is_empty());
}

#[test]
fn failing_rules_accumulate_reasons() {
    let m = Moderator::default();
    let item = enriched("Local bakery opens downtown", "Fresh bread daily.", 0.0);

    let v = m.moderate(&item);
    assert!(!v.approved);
    assert_eq!(
        v.reasons,
        vec![
            reasons::LOW_QUALITY.to_string(),
            reasons::NOT_RELEVANT.to_string(),
            reasons::TOO_SHORT.to_string(),
        ]
    );
}

#[test]
fn moderation_is_deterministic() {
    let m = Moderator::default();
    let mut item = enriched("Alonso signs new Aston Martin contract", &strong_body(), 0.6);
    item.importance = ImportanceLevel::new(3).unwrap();
    let first = m.moderate(&item);
    for _ in 0..5 {
        assert_eq!(m.moderate(&item), first);
    }
}

#[test]
fn invalid_input_becomes_moderation_error() {
    let m = Moderator::default();
    let item = enriched("Leclerc leads opening practice", &strong_body(), f32::NAN);

    let v = m.moderate(&item);
    assert!(!v.approved);
    assert_eq!(v.reasons, vec![reasons::MODERATION_ERROR.to_string()]);
}

#[test]
fn shouting_title_gets_formatting_suggestion() {
    let m = Moderator::default();
    let mut item = enriched("FERRARI WIN AT MONZA", &strong_body(), 0.8);
    item.importance = ImportanceLevel::new(4).unwrap();

    let v = m.moderate(&item);
    assert!(v.approved, "reasons: {:?}", v.reasons);
    assert!(v.suggestions.contains(&reasons::IMPROVE_FORMATTING.to_string()));
}

#[test]
fn official_source_raises_quality() {
    let m = Moderator::default();
    let body = "Ferrari and Mercedes drivers prepare for the Formula 1 race weekend.";
    let plain = enriched("Drivers arrive in Monaco", body, 0.5);
    let mut official = plain.clone();
    official.raw.source = "Official Formula1.com".into();

    let delta = m.quality_score(&official) - m.quality_score(&plain);
    // first matching rule wins
    assert!((delta - 0.2).abs() < 1e-6);
}

#[test]
fn extended_spam_words_apply_and_bad_patterns_change_nothing() {
    let mut m = Moderator::default();
    let item = enriched("Paddock rumours about Sauber", &strong_body(), 0.8);
    assert!(!m.is_spam(&item));

    let before = m.stats();
    let bad = ModerationRules {
        spam_keywords: vec!["rumours".into()],
        promo_patterns: vec!["(unclosed".into()],
        quality_keywords: vec![],
        importance_boosters: vec![],
        source_reputation: vec![],
    };
    assert!(m.extend_rules(bad).is_err());
    assert_eq!(m.stats(), before);

    let good = ModerationRules {
        spam_keywords: vec!["Rumours".into()],
        promo_patterns: vec![],
        quality_keywords: vec![],
        importance_boosters: vec![],
        source_reputation: vec![],
    };
    m.extend_rules(good).unwrap();
    assert!(m.is_spam(&item));
    assert_eq!(m.stats().spam_keywords, before.spam_keywords + 1);
}

#[test]
fn free_practice_trips_default_promo_pattern_unless_overridden() {
    let item = enriched(
        "Leclerc tops second free practice in Monaco",
        &strong_body(),
        0.9,
    );
    assert!(Moderator::default().is_spam(&item));

    let rules = ModerationRules {
        promo_patterns: ModerationRules::default()
            .promo_patterns
            .into_iter()
            .filter(|p| !p.contains("free"))
            .collect(),
        ..ModerationRules::default()
    };
    let m = Moderator::new(rules, vec!["monaco".into()]).unwrap();
    assert!(!m.is_spam(&item));
}
