use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use crate::utils::contains_ignore_case;

/// Timestamp layouts seen in the upstream feed, tried after RFC 3339.
/// polisen.se reports "2024-06-01 10:00:00 +02:00".
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S %:z", "%Y-%m-%d %H:%M:%S %z"];

/// Offset-less layouts, interpreted as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse an event timestamp in any of the layouts the feed and its clients produce.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Location {
    pub name: String,
    /// Free-text "lat,lon"; not always parseable.
    #[serde(default)]
    pub gps: String,
}

impl Location {
    /// Any two finite numbers are returned as-is; the feed's values are not range-checked.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = self.gps.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
    }
}

/// One incident as reported by the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Event {
    pub id: i64,
    pub datetime: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub location: Location,
}

impl Event {
    /// Parsed occurrence time, if the feed gave us something readable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_event_time(&self.datetime)
    }

    /// "Jun 01, 2024 10:00"
    pub fn formatted_datetime(&self) -> String {
        match self.timestamp() {
            Some(dt) => dt.format("%b %d, %Y %H:%M").to_string(),
            None => self.datetime.chars().take(16).collect(),
        }
    }

    /// Case-insensitive match against name, summary, location name and type.
    pub fn matches_query(&self, query: &str) -> bool {
        contains_ignore_case(&self.name, query)
            || contains_ignore_case(&self.summary, query)
            || contains_ignore_case(&self.location.name, query)
            || contains_ignore_case(&self.event_type, query)
    }
}

/// An event as held in a client's local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct CachedEvent {
    #[serde(flatten)]
    pub event: Event,
    /// First time this client observed the event. Never updated once set.
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
    /// True once the event dropped out of the upstream's current response.
    #[serde(rename = "isArchived", default)]
    pub is_archived: bool,
}

impl CachedEvent {
    pub fn new(event: Event, cached_at: DateTime<Utc>) -> Self {
        Self {
            event,
            cached_at,
            is_archived: false,
        }
    }

    pub fn id(&self) -> i64 {
        self.event.id
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.event.timestamp()
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_archived {
            "archived"
        } else {
            "live"
        }
    }
}

/// Newest first; records with unreadable datetimes sort last.
pub fn sort_newest_first<T>(records: &mut [T], timestamp: impl Fn(&T) -> Option<DateTime<Utc>>) {
    records.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
}

/// Inclusive calendar-day range, evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// Covers `start_date` 00:00:00 through `end_date` 23:59:59.999.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start_date <= day && day <= self.end_date
    }
}

/// Earliest and latest event day held in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

/// Cheap summary of a local cache, refreshed on every upstream fetch and
/// on every merge that changes the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Last upstream snapshot; `None` when the store was only filled by merges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
    pub total_events: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_event: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_event: Option<DateTime<Utc>>,
}

/// Filters understood by the upstream feed, plus a client-side search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilters {
    /// "YYYY-MM-DD", "YYYY-MM" or "YYYY" as accepted by the feed.
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    /// Applied locally after the response arrives.
    #[serde(default)]
    pub search_query: Option<String>,
}

impl EventFilters {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref dt) = self.date_time {
            params.push(("DateTime", dt.clone()));
        }
        if let Some(ref location) = self.location_name {
            params.push(("locationname", location.clone()));
        }
        if let Some(ref event_type) = self.event_type {
            params.push(("type", event_type.clone()));
        }
        params
    }
}

#[cfg(test)]
pub(crate) fn sample_event(id: i64, datetime: &str) -> Event {
    Event {
        id,
        datetime: datetime.to_string(),
        name: format!("{} Trafikolycka, Stockholm", datetime),
        summary: "Två bilar har kolliderat.".to_string(),
        url: format!("/aktuellt/handelser/{}", id),
        event_type: "Trafikolycka".to_string(),
        location: Location {
            name: "Stockholm".to_string(),
            gps: "59.329324,18.068581".to_string(),
        },
    }
}
