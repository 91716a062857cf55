// src/publish/mod.rs
//! Publication boundary: message formatting and the channel publisher trait.

pub mod telegram;

use async_trait::async_trait;

use crate::model::EnrichedItem;

pub const MESSAGE_SUMMARY_CHARS: usize = 200;
pub const MESSAGE_KEY_POINTS: usize = 2;
pub const MESSAGE_TAGS: usize = 3;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send one item. Returns the channel's handle for the message.
    async fn publish_to_channel(&self, item: &EnrichedItem) -> anyhow::Result<String>;
    fn name(&self) -> &'static str;
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head.trim_end())
    } else {
        s.to_string()
    }
}

/// Plain-text channel message. Translated title and summary are preferred
/// when the enrichment produced them.
pub fn format_message(item: &EnrichedItem) -> String {
    let translation = item.translation.as_ref();
    let title = translation
        .and_then(|t| t.title.as_deref())
        .unwrap_or(item.title());
    let summary = translation
        .and_then(|t| t.summary.as_deref())
        .unwrap_or(item.summary.as_str());
    let key_points = match translation {
        Some(t) if !t.key_points.is_empty() => &t.key_points,
        _ => &item.key_points,
    };

    let mut out = String::new();
    out.push_str(title.trim());
    out.push_str("\n\n");

    let summary = summary.trim();
    if !summary.is_empty() {
        out.push_str(&truncate_chars(summary, MESSAGE_SUMMARY_CHARS));
        out.push_str("\n\n");
    }

    let points: Vec<&String> = key_points.iter().take(MESSAGE_KEY_POINTS).collect();
    if !points.is_empty() {
        for p in points {
            out.push_str("• ");
            out.push_str(p.trim());
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("Source: ");
    out.push_str(item.raw.source.trim());
    out.push('\n');
    out.push_str(item.url());

    let tags: Vec<String> = item
        .tags
        .iter()
        .take(MESSAGE_TAGS)
        .map(|t| format!("#{}", t.trim().replace(' ', "_")))
        .collect();
    if !tags.is_empty() {
        out.push_str("\n\n");
        out.push_str(&tags.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawItem, SourceKind, Translation};
    use chrono::Utc;

    fn item() -> EnrichedItem {
        let mut e = EnrichedItem::from_raw(RawItem::new(
            "Norris wins in Miami",
            "body",
            "https://x.test/miami",
            "Motorsport.com",
            SourceKind::Feed,
            Utc::now(),
        ));
        e.summary = "s".repeat(250);
        e.key_points = vec!["one".into(), "two".into(), "three".into()];
        e.tags = vec!["f1".into(), "miami gp".into(), "mclaren".into(), "extra".into()];
        e
    }

    #[test]
    fn message_layout() {
        let msg = format_message(&item());
        let expected_summary = format!("{}...", "s".repeat(200));
        assert!(msg.starts_with("Norris wins in Miami\n\n"));
        assert!(msg.contains(&expected_summary));
        assert!(msg.contains("• one\n• two\n"));
        assert!(!msg.contains("three"));
        assert!(msg.contains("Source: Motorsport.com\nhttps://x.test/miami"));
        assert!(msg.ends_with("#f1 #miami_gp #mclaren"));
    }

    #[test]
    fn translation_is_preferred() {
        let mut e = item();
        e.translation = Some(Translation {
            title: Some("Норрис побеждает".into()),
            summary: None,
            key_points: vec![],
        });
        let msg = format_message(&e);
        assert!(msg.starts_with("Норрис побеждает\n\n"));
        assert!(msg.contains("• one"));
    }
}
