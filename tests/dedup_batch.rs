// tests/dedup_batch.rs
use chrono::Utc;
use f1_news_pipeline::collect::prepare_batch;
use f1_news_pipeline::dedup::{dedupe, is_duplicate, jaccard};
use f1_news_pipeline::model::{RawItem, SourceKind};
use f1_news_pipeline::relevance::RelevanceScorer;

fn item(title: &str, body: &str, url: &str) -> RawItem {
    RawItem::new(title, body, url, "Test Feed", SourceKind::Feed, Utc::now())
}

#[test]
fn same_url_in_one_batch_keeps_exactly_one() {
    let a = item(
        "Leclerc wins at Monza",
        "Ferrari celebrate a home victory in the Italian Grand Prix.",
        "https://news.test/monza",
    );
    let b = item(
        "Completely different headline here",
        "Nothing in common with the first body at all.",
        "https://news.test/monza",
    );

    let (kept, dropped) = dedupe(vec![a.clone(), b]);
    assert_eq!(kept.len(), 1);
    assert_eq!(dropped, 1);
    assert_eq!(kept[0].title, a.title);
}

#[test]
fn near_duplicate_titles_are_dropped_first_wins() {
    let first = item(
        "Norris takes pole position at Silverstone",
        "McLaren driver tops qualifying.",
        "https://a.test/1",
    );
    let second = item(
        "Norris takes pole position at Silverstone today",
        "A different body with other words entirely.",
        "https://b.test/2",
    );
    let third = item(
        "Alonso signs new Aston Martin deal",
        "Contract runs through next season.",
        "https://c.test/3",
    );

    let (kept, dropped) = dedupe(vec![first, second, third]);
    assert_eq!(dropped, 1);
    let urls: Vec<_> = kept.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.test/1", "https://c.test/3"]);
}

#[test]
fn similar_bodies_with_different_titles_are_duplicates() {
    let body = "Verstappen beat Leclerc and Norris in a tense qualifying session around Monaco";
    let existing = vec![item("Verstappen on pole", body, "https://a.test/1")];
    assert!(is_duplicate(
        "Red Bull driver leads the grid",
        &format!("{body} streets"),
        &existing
    ));
    assert!(!is_duplicate(
        "Red Bull driver leads the grid",
        "Unrelated paragraph about tyre allocation for the next event",
        &existing
    ));
}

#[test]
fn jaccard_edge_cases() {
    assert_eq!(jaccard("", ""), 0.0);
    assert_eq!(jaccard("a b", "a b"), 1.0);
    assert_eq!(jaccard("A B", "a b c d"), 0.5);
    assert_eq!(jaccard("x", ""), 0.0);
}

#[test]
fn prepare_batch_counts_each_drop_reason() {
    let scorer = RelevanceScorer::default();
    let raw = vec![
        item(
            "Hamilton fastest in Monza practice",
            "Ferrari pace looks strong before qualifying.",
            "https://a.test/1",
        ),
        // duplicate URL
        item(
            "Something else about Red Bull at Monza",
            "Different words in this body paragraph.",
            "https://a.test/1",
        ),
        // not http(s)
        item("Sainz joins Williams", "Formula 1 driver market news.", "ftp://a.test/2"),
        // off-topic
        item("Garden tips for spring", "Plant bulbs early.", "https://a.test/3"),
    ];

    let batch = prepare_batch(raw, &scorer);
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.duplicates, 1);
    assert_eq!(batch.invalid, 1);
    assert_eq!(batch.below_floor, 1);
    assert!(batch.items[0].relevance_score > 0.0);
    assert!(batch.items[0].keywords.contains("hamilton"));
}
