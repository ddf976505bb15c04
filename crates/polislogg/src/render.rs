//! Plain-text rendering for command output.

use chrono::{DateTime, Utc};

use polislogg_core::models::{CacheMetadata, CachedEvent, PoolMetadata};
use polislogg_core::utils::{format_age, truncate_string};
use polislogg_core::{PullOutcome, PushOutcome};

/// Event URLs in the feed are relative to this site.
const POLISEN_SITE: &str = "https://polisen.se";

/// Width of the name column in event lists.
const NAME_WIDTH: usize = 60;

pub fn event_line(cached: &CachedEvent) -> String {
    format!(
        "{:>9}  {:<17}  {:<8}  {}",
        cached.id(),
        cached.event.formatted_datetime(),
        cached.status_label(),
        truncate_string(&cached.event.name, NAME_WIDTH)
    )
}

pub fn event_detail(cached: &CachedEvent, now: DateTime<Utc>) -> String {
    let event = &cached.event;
    let mut lines = vec![
        event.name.clone(),
        String::new(),
        format!("  Id:        {}", event.id),
        format!("  Type:      {}", event.event_type),
        format!("  When:      {}", event.formatted_datetime()),
        format!("  Location:  {}", event.location.name),
    ];
    if let Some((lat, lon)) = event.location.coordinates() {
        lines.push(format!("  GPS:       {:.5}, {:.5}", lat, lon));
    }
    lines.push(format!(
        "  Cached:    {} ({})",
        cached.cached_at.format("%Y-%m-%d %H:%M"),
        format_age(cached.cached_at, now)
    ));
    lines.push(format!("  Status:    {}", cached.status_label()));
    if !event.url.is_empty() {
        lines.push(format!("  Link:      {}", full_url(&event.url)));
    }
    if !event.summary.is_empty() {
        lines.push(String::new());
        lines.push(event.summary.clone());
    }
    lines.join("\n")
}

fn full_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}{}", POLISEN_SITE, url)
    }
}

fn day_span(oldest: Option<DateTime<Utc>>, newest: Option<DateTime<Utc>>) -> String {
    match (oldest, newest) {
        (Some(oldest), Some(newest)) => format!(
            "{} to {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        ),
        _ => "-".to_string(),
    }
}

pub fn local_stats(
    metadata: Option<&CacheMetadata>,
    total: usize,
    archived: usize,
    now: DateTime<Utc>,
) -> String {
    let last_fetch = metadata
        .and_then(|m| m.last_fetch)
        .map(|at| format_age(at, now))
        .unwrap_or_else(|| "never".to_string());
    let span = metadata
        .map(|m| day_span(m.oldest_event, m.newest_event))
        .unwrap_or_else(|| "-".to_string());
    [
        "Local cache".to_string(),
        format!("  Events:      {} ({} live, {} archived)", total, total - archived, archived),
        format!("  Span:        {}", span),
        format!("  Last fetch:  {}", last_fetch),
    ]
    .join("\n")
}

pub fn shared_stats(metadata: &PoolMetadata, now: DateTime<Utc>) -> String {
    [
        "Shared pool".to_string(),
        format!("  Events:       {}", metadata.total_events),
        format!("  Contributors: {}", metadata.contributors.len()),
        format!("  Span:         {}", day_span(metadata.oldest_event, metadata.newest_event)),
        format!("  Updated:      {}", format_age(metadata.last_update, now)),
    ]
    .join("\n")
}

pub fn pull_outcome(outcome: &PullOutcome) -> String {
    match outcome {
        PullOutcome::Busy => "A pull is already running".to_string(),
        PullOutcome::Skipped => "Pulled recently, skipped this cycle".to_string(),
        PullOutcome::Merged(summary) => format!(
            "Pulled {} records: {} new, {} updated",
            summary.received, summary.inserted, summary.updated
        ),
    }
}

pub fn push_outcome(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Busy => "A push is already running".to_string(),
        PushOutcome::Empty => "Nothing to push".to_string(),
        PushOutcome::Uploaded(response) => format!(
            "Pushed: {} new, {} updated; pool holds {} events from {} contributors",
            response.new_events,
            response.updated_events,
            response.total_events,
            response.contributors
        ),
    }
}
