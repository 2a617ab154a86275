//! Domain models for listening-history contributions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use streamproof_common::time;

/// Version tag written into every published raw-data artifact.
pub const RAW_DATA_VERSION: u32 = 1;

/// A resume cursor older than this is discarded and fetching restarts
/// from "now".
pub const CURSOR_STALENESS_DAYS: i64 = 7;

/// One play of one track, as observed from the upstream history API.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningEvent {
    pub track_id: String,
    /// Primary artist only; featured artists are not tracked.
    pub artist_id: String,
    pub duration_ms: u64,
    pub listened_at: DateTime<Utc>,
}

/// Aggregate statistics over one run's deduplicated events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListeningStats {
    pub total_minutes: u64,
    pub event_count: usize,
    pub unique_artists: BTreeSet<String>,
    /// Days between first and last listen, inclusive of both endpoints.
    /// 1 when all events share a timestamp, 0 when there are no events.
    pub activity_period_days: i64,
    pub first_listen: Option<DateTime<Utc>>,
    pub last_listen: Option<DateTime<Utc>>,
}

impl ListeningStats {
    pub fn from_events(events: &[ListeningEvent]) -> Self {
        let mut total_ms: u64 = 0;
        let mut unique_artists = BTreeSet::new();
        let mut first: Option<DateTime<Utc>> = None;
        let mut last: Option<DateTime<Utc>> = None;

        for event in events {
            total_ms += event.duration_ms;
            unique_artists.insert(event.artist_id.clone());
            first = Some(first.map_or(event.listened_at, |f| f.min(event.listened_at)));
            last = Some(last.map_or(event.listened_at, |l| l.max(event.listened_at)));
        }

        let activity_period_days = match (first, last) {
            (Some(f), Some(l)) => (l - f).num_days() + 1,
            _ => 0,
        };

        ListeningStats {
            total_minutes: total_ms / 60_000,
            event_count: events.len(),
            unique_artists,
            activity_period_days,
            first_listen: first,
            last_listen: last,
        }
    }
}

/// Backward-pagination marker: milliseconds since the Unix epoch, scoped to
/// one account. Only ever set from a cursor that was used for a successful
/// upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor(pub i64);

impl FetchCursor {
    pub fn at(ts: DateTime<Utc>) -> Self {
        FetchCursor(time::epoch_ms(ts))
    }

    /// A stale cursor must be discarded and fetching restarted from "now".
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.0 < time::epoch_ms(now - Duration::days(CURSOR_STALENESS_DAYS))
    }
}

/// Complete contribution package assembled by one run.
#[derive(Debug, Clone)]
pub struct ContributionData {
    pub account_id_hash: String,
    pub stats: ListeningStats,
    pub events: Vec<ListeningEvent>,
    /// Country reported by the upstream profile, if any
    pub country: Option<String>,
    /// Subscription tier reported by the upstream profile, if any
    pub product: Option<String>,
}

impl ContributionData {
    /// Serializable view of everything this run saw; this is what gets
    /// encrypted and published.
    pub fn raw_view(&self) -> RawDataView {
        RawDataView {
            version: RAW_DATA_VERSION,
            user: RawUserBlock {
                id_hash: self.account_id_hash.clone(),
                country: self.country.clone(),
                product: self.product.clone(),
            },
            stats: RawStatsBlock {
                total_minutes: self.stats.total_minutes,
                event_count: self.stats.event_count,
                unique_artist_count: self.stats.unique_artists.len(),
                activity_period_days: self.stats.activity_period_days,
                first_listen: self.stats.first_listen,
                last_listen: self.stats.last_listen,
            },
            events: self.events.clone(),
        }
    }
}

/// Version-tagged artifact published to blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataView {
    pub version: u32,
    pub user: RawUserBlock,
    pub stats: RawStatsBlock,
    pub events: Vec<ListeningEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUserBlock {
    pub id_hash: String,
    pub country: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatsBlock {
    pub total_minutes: u64,
    pub event_count: usize,
    pub unique_artist_count: usize,
    pub activity_period_days: i64,
    pub first_listen: Option<DateTime<Utc>>,
    pub last_listen: Option<DateTime<Utc>>,
}

/// What the ledger already knows about an account.
#[derive(Debug, Clone)]
pub struct ExistingContribution {
    /// Sum of every prior proof row's score; the amount already paid out.
    pub cumulative_score: f64,
    /// Prior runs that paid a positive reward
    pub times_rewarded: u32,
    pub event_count: i64,
    pub total_minutes: i64,
    pub activity_period_days: i64,
    pub unique_artists: i64,
    /// Resume point for the collector, if one was ever committed
    pub fetch_cursor: Option<FetchCursor>,
}
