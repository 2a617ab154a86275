//! Time-boxed, cursor-resumable history collection
//!
//! The collector walks the recently-played endpoint backward from a resume
//! cursor under a shared wall-clock budget, supplements the result with
//! top-track snapshots, deduplicates across both sources, and aggregates
//! the run's listening stats. It never blocks past its budget: the budget
//! is checked between requests and before every backoff sleep, and on
//! exhaustion the accumulated events are returned along with the last
//! cursor that was actually used for a successful request, so the next
//! run resumes without skipping anything, at worst re-fetching one page.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use streamproof_common::time;

use crate::models::{FetchCursor, ListeningEvent, ListeningStats};
use super::history_api::{FetchError, HistoryApi, PlayedItem, TopWindow, TrackRef, UserProfile};

/// Subtracted from the last event's timestamp when stepping the cursor, so
/// the boundary event is not fetched twice.
const CURSOR_EPSILON_MS: i64 = 1;

/// Transient failures are retried at most this many times per request.
const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff after a transient failure; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upstream-provided rate-limit waits are clamped into this range.
const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Synthetic age assigned to snapshot items, keeping them clearly apart
/// from real play timestamps.
const SNAPSHOT_SYNTHETIC_AGE_DAYS: i64 = 30;

/// Wall-clock budget shared by every request and backoff sleep in one run.
#[derive(Debug, Clone, Copy)]
pub struct FetchBudget {
    deadline: Instant,
}

impl FetchBudget {
    pub fn new(limit: Duration) -> Self {
        FetchBudget {
            deadline: Instant::now() + limit,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// True when `wait` still fits inside the remaining budget.
    pub fn allows(&self, wait: Duration) -> bool {
        Instant::now() + wait < self.deadline
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum backward-pagination depth per run
    pub max_pages: u32,
    /// Items requested per page and per snapshot window
    pub page_size: u32,
    /// Wall-clock budget for the whole fetch
    pub budget: Duration,
}

/// What one collection run produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Deduplicated events from pagination and snapshots
    pub events: Vec<ListeningEvent>,
    /// Last cursor used for a successful page request; the resume point.
    /// Unchanged from the input when no page request succeeded.
    pub cursor: Option<FetchCursor>,
    /// Aggregate stats over `events`
    pub stats: ListeningStats,
}

/// Time-boxed history collector over an abstract upstream API.
pub struct HistoryCollector<'a, A: HistoryApi + ?Sized> {
    api: &'a A,
    config: CollectorConfig,
}

impl<'a, A: HistoryApi + ?Sized> HistoryCollector<'a, A> {
    pub fn new(api: &'a A, config: CollectorConfig) -> Self {
        HistoryCollector { api, config }
    }

    /// Fetch the account profile, retried under its own budget window.
    ///
    /// Returns `Ok(None)` if the budget ran out before the request could
    /// complete; the caller decides whether that is fatal.
    pub async fn profile(&self) -> Result<Option<UserProfile>, FetchError> {
        let budget = FetchBudget::new(self.config.budget);
        self.request_with_retry(&budget, || self.api.profile()).await
    }

    /// Collect listening events, resuming from `resume` when it is fresh
    /// enough. See the module docs for the budget and cursor contract.
    pub async fn fetch(&self, resume: Option<FetchCursor>) -> Result<FetchOutcome, FetchError> {
        let budget = FetchBudget::new(self.config.budget);
        let now = time::now();

        let mut events: Vec<ListeningEvent> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        // Only ever advanced past `resume` by a successful page request
        let mut last_used = resume;

        let mut cursor = match resume {
            Some(c) if !c.is_stale(now) => c,
            Some(c) => {
                info!(cursor_ms = c.0, "resume cursor is stale, restarting from now");
                FetchCursor::at(now)
            }
            None => FetchCursor::at(now),
        };

        for page_index in 0..self.config.max_pages {
            if budget.expired() {
                debug!(pages = page_index, "fetch budget exhausted, stopping pagination");
                return Ok(self.outcome(events, last_used));
            }

            let page = match self
                .request_with_retry(&budget, || {
                    self.api.recently_played(self.config.page_size, Some(cursor.0))
                })
                .await?
            {
                Some(page) => page,
                None => return Ok(self.outcome(events, last_used)),
            };
            last_used = Some(cursor);

            if page.items.is_empty() {
                debug!(pages = page_index, "empty page, reached end of available history");
                break;
            }

            for item in &page.items {
                match event_from_played(item) {
                    Some(event) => {
                        if seen.insert(event.track_id.clone()) {
                            events.push(event);
                        }
                    }
                    None => warn!("skipping malformed history item"),
                }
            }

            // Step the cursor off the oldest event on the page. An
            // unparseable boundary timestamp means we cannot page further;
            // treat it like the end of history.
            let Some(oldest) = page
                .items
                .last()
                .and_then(|item| item.played_at.as_deref())
                .and_then(time::parse_played_at)
            else {
                debug!("page boundary timestamp unparseable, stopping pagination");
                break;
            };
            cursor = FetchCursor(time::epoch_ms(oldest) - CURSOR_EPSILON_MS);
        }

        // Snapshot supplement: top tracks over each window, tagged with a
        // synthetic timestamp and deduplicated against paginated plays.
        let synthetic_ts = now - ChronoDuration::days(SNAPSHOT_SYNTHETIC_AGE_DAYS);
        for window in TopWindow::ALL {
            if budget.expired() {
                debug!(window = window.as_query(), "fetch budget exhausted, skipping snapshots");
                break;
            }
            let snapshot = match self
                .request_with_retry(&budget, || {
                    self.api.top_tracks(window, self.config.page_size)
                })
                .await?
            {
                Some(snapshot) => snapshot,
                None => break,
            };
            for track in &snapshot.items {
                match event_from_snapshot(track, synthetic_ts) {
                    Some(event) => {
                        if seen.insert(event.track_id.clone()) {
                            events.push(event);
                        }
                    }
                    None => warn!(window = window.as_query(), "skipping malformed snapshot item"),
                }
            }
        }

        Ok(self.outcome(events, last_used))
    }

    fn outcome(&self, events: Vec<ListeningEvent>, cursor: Option<FetchCursor>) -> FetchOutcome {
        let stats = ListeningStats::from_events(&events);
        info!(
            events = events.len(),
            minutes = stats.total_minutes,
            artists = stats.unique_artists.len(),
            "history collection finished"
        );
        FetchOutcome { events, cursor, stats }
    }

    /// The one retrying-request primitive every upstream call goes through.
    ///
    /// Terminal errors propagate immediately. Rate limiting sleeps for the
    /// server-provided (or computed) wait, clamped to a sane range, without
    /// consuming a retry attempt. Other failures back off exponentially up
    /// to the attempt cap, after which the last error propagates. Every
    /// sleep is budget-checked first; `Ok(None)` means the budget ran out
    /// and the caller should settle for what it already has.
    async fn request_with_retry<T, F, Fut>(
        &self,
        budget: &FetchBudget,
        mut request: F,
    ) -> Result<Option<T>, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt: u32 = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match request().await {
                Ok(value) => return Ok(Some(value)),
                Err(err) if err.is_terminal() => {
                    warn!(error = %err, "terminal upstream failure, aborting");
                    return Err(err);
                }
                Err(FetchError::RateLimited { retry_after }) => {
                    let wait = retry_after
                        .unwrap_or(backoff)
                        .clamp(MIN_RATE_LIMIT_WAIT, MAX_RATE_LIMIT_WAIT);
                    if !budget.allows(wait) {
                        warn!(wait_ms = wait.as_millis() as u64, "rate-limit wait exceeds remaining budget");
                        return Ok(None);
                    }
                    debug!(wait_ms = wait.as_millis() as u64, "rate limited, waiting before retry");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        warn!(attempt, error = %err, "attempt cap exceeded, propagating");
                        return Err(err);
                    }
                    if !budget.allows(backoff) {
                        warn!(attempt, "backoff exceeds remaining budget");
                        return Ok(None);
                    }
                    warn!(attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "transient upstream failure, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// Build an event from one paginated play entry. `None` means the item is
/// malformed and should be skipped.
fn event_from_played(item: &PlayedItem) -> Option<ListeningEvent> {
    let track = item.track.as_ref()?;
    Some(ListeningEvent {
        track_id: track.id.clone()?,
        artist_id: track.artists.first()?.id.clone()?,
        duration_ms: track.duration_ms?,
        listened_at: item.played_at.as_deref().and_then(time::parse_played_at)?,
    })
}

/// Build an event from one snapshot track with its synthetic timestamp.
fn event_from_snapshot(
    track: &TrackRef,
    listened_at: chrono::DateTime<chrono::Utc>,
) -> Option<ListeningEvent> {
    Some(ListeningEvent {
        track_id: track.id.clone()?,
        artist_id: track.artists.first()?.id.clone()?,
        duration_ms: track.duration_ms?,
        listened_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history_api::{ArtistRef, HistoryPage, TopTracksPage};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn track(id: &str, artist: &str, minutes: u64) -> TrackRef {
        TrackRef {
            id: Some(id.to_string()),
            duration_ms: Some(minutes * 60_000),
            artists: vec![ArtistRef { id: Some(artist.to_string()) }],
        }
    }

    fn play(id: &str, artist: &str, minutes: u64, played_at: &str) -> PlayedItem {
        PlayedItem {
            track: Some(track(id, artist, minutes)),
            played_at: Some(played_at.to_string()),
        }
    }

    /// Scripted fake: pops one response per request, records call arguments.
    struct FakeApi {
        pages: StdMutex<Vec<Result<HistoryPage, FetchError>>>,
        tops: StdMutex<Vec<Result<TopTracksPage, FetchError>>>,
        page_cursors: StdMutex<Vec<Option<i64>>>,
    }

    impl FakeApi {
        fn new(
            pages: Vec<Result<HistoryPage, FetchError>>,
            tops: Vec<Result<TopTracksPage, FetchError>>,
        ) -> Self {
            let mut pages = pages;
            let mut tops = tops;
            pages.reverse();
            tops.reverse();
            FakeApi {
                pages: StdMutex::new(pages),
                tops: StdMutex::new(tops),
                page_cursors: StdMutex::new(Vec::new()),
            }
        }

        fn page_calls(&self) -> Vec<Option<i64>> {
            self.page_cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HistoryApi for FakeApi {
        async fn profile(&self) -> Result<UserProfile, FetchError> {
            Ok(UserProfile {
                id: "listener".to_string(),
                country: None,
                product: None,
            })
        }

        async fn recently_played(
            &self,
            _limit: u32,
            before_ms: Option<i64>,
        ) -> Result<HistoryPage, FetchError> {
            self.page_cursors.lock().unwrap().push(before_ms);
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(HistoryPage::default()))
        }

        async fn top_tracks(
            &self,
            _window: TopWindow,
            _limit: u32,
        ) -> Result<TopTracksPage, FetchError> {
            self.tops
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(TopTracksPage::default()))
        }
    }

    fn collector_config(budget: Duration) -> CollectorConfig {
        CollectorConfig {
            max_pages: 5,
            page_size: 50,
            budget,
        }
    }

    #[tokio::test]
    async fn test_zero_budget_issues_no_requests() {
        let api = FakeApi::new(vec![], vec![]);
        let collector = HistoryCollector::new(&api, collector_config(Duration::ZERO));
        let resume = Some(FetchCursor(1_700_000_000_000));

        let outcome = collector.fetch(resume).await.unwrap();

        assert!(outcome.events.is_empty());
        assert_eq!(outcome.cursor, resume); // original cursor unchanged
        assert!(api.page_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dedup_across_pagination_and_snapshots() {
        let api = FakeApi::new(
            vec![Ok(HistoryPage {
                items: vec![
                    play("t1", "a1", 3, "2024-03-01T10:00:00Z"),
                    play("t1", "a1", 3, "2024-03-01T09:00:00Z"), // repeat play
                    play("t2", "a2", 4, "2024-03-01T08:00:00Z"),
                ],
            })],
            vec![Ok(TopTracksPage {
                items: vec![track("t2", "a2", 4), track("t3", "a3", 5)],
            })],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let outcome = collector.fetch(None).await.unwrap();

        let ids: Vec<&str> = outcome.events.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(outcome.stats.event_count, 3);
        assert_eq!(outcome.stats.unique_artists.len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_items_get_synthetic_timestamp() {
        let api = FakeApi::new(
            vec![Ok(HistoryPage::default())],
            vec![Ok(TopTracksPage { items: vec![track("t9", "a9", 5)] })],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let outcome = collector.fetch(None).await.unwrap();

        assert_eq!(outcome.events.len(), 1);
        let age = time::now() - outcome.events[0].listened_at;
        assert_eq!(age.num_days(), SNAPSHOT_SYNTHETIC_AGE_DAYS);
    }

    #[tokio::test]
    async fn test_pagination_steps_cursor_back_with_epsilon() {
        let api = FakeApi::new(
            vec![
                Ok(HistoryPage {
                    items: vec![play("t1", "a1", 3, "2024-03-02T10:00:00Z")],
                }),
                Ok(HistoryPage {
                    items: vec![play("t2", "a2", 3, "2024-03-01T10:00:00Z")],
                }),
                Ok(HistoryPage::default()),
            ],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let outcome = collector.fetch(None).await.unwrap();

        let calls = api.page_calls();
        assert_eq!(calls.len(), 3);
        let boundary = time::parse_played_at("2024-03-02T10:00:00Z").unwrap();
        assert_eq!(calls[1], Some(time::epoch_ms(boundary) - CURSOR_EPSILON_MS));
        // Returned cursor is the one the last successful request used,
        // not the next computed step.
        assert_eq!(outcome.cursor, Some(FetchCursor(calls[2].unwrap())));
    }

    #[tokio::test]
    async fn test_unparseable_boundary_timestamp_stops_pagination() {
        let api = FakeApi::new(
            vec![Ok(HistoryPage {
                items: vec![
                    play("t1", "a1", 3, "2024-03-02T10:00:00Z"),
                    PlayedItem {
                        track: Some(track("t2", "a2", 3)),
                        played_at: Some("garbage".to_string()),
                    },
                ],
            })],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let outcome = collector.fetch(None).await.unwrap();

        // Malformed boundary item skipped, pagination stopped after one page
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(api.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_cursor_restarts_from_now() {
        let beyond_threshold = crate::models::contribution::CURSOR_STALENESS_DAYS + 1;
        let stale = FetchCursor::at(time::now() - ChronoDuration::days(beyond_threshold));
        let api = FakeApi::new(vec![Ok(HistoryPage::default())], vec![]);
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        collector.fetch(Some(stale)).await.unwrap();

        let first = api.page_calls()[0].unwrap();
        assert!(first > stale.0, "stale cursor must be discarded");
        let drift = time::epoch_ms(time::now()) - first;
        assert!(drift.abs() < 5_000, "restart cursor should be close to now");
    }

    #[tokio::test]
    async fn test_fresh_cursor_is_resumed() {
        let resume = FetchCursor::at(time::now() - ChronoDuration::days(1));
        let api = FakeApi::new(vec![Ok(HistoryPage::default())], vec![]);
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let outcome = collector.fetch(Some(resume)).await.unwrap();

        assert_eq!(api.page_calls(), vec![Some(resume.0)]);
        // The empty page was still a successful request at this cursor
        assert_eq!(outcome.cursor, Some(resume));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_server_error_is_retried() {
        let api = FakeApi::new(
            vec![
                Err(FetchError::Server { status: 502, message: "bad gateway".to_string() }),
                Err(FetchError::Network("connection reset".to_string())),
                Ok(HistoryPage {
                    items: vec![play("t1", "a1", 3, "2024-03-01T10:00:00Z")],
                }),
                Ok(HistoryPage::default()),
            ],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(600)));

        let outcome = collector.fetch(None).await.unwrap();

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(api.page_calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap_propagates_last_error() {
        let api = FakeApi::new(
            vec![
                Err(FetchError::Server { status: 500, message: String::new() }),
                Err(FetchError::Server { status: 502, message: String::new() }),
                Err(FetchError::Server { status: 503, message: "last".to_string() }),
            ],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(600)));

        let err = collector.fetch(None).await.unwrap_err();

        assert!(matches!(err, FetchError::Server { status: 503, .. }));
        assert_eq!(api.page_calls().len(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_immediately() {
        let api = FakeApi::new(
            vec![Err(FetchError::Auth("expired".to_string()))],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let err = collector.fetch(None).await.unwrap_err();

        assert!(matches!(err, FetchError::Auth(_)));
        assert_eq!(api.page_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_then_succeeds() {
        let api = FakeApi::new(
            vec![
                Err(FetchError::RateLimited { retry_after: Some(Duration::from_secs(2)) }),
                Ok(HistoryPage {
                    items: vec![play("t1", "a1", 3, "2024-03-01T10:00:00Z")],
                }),
                Ok(HistoryPage::default()),
            ],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(600)));

        let start = Instant::now();
        let outcome = collector.fetch(None).await.unwrap();

        assert_eq!(outcome.events.len(), 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_beyond_budget_returns_partial() {
        let api = FakeApi::new(
            vec![
                Ok(HistoryPage {
                    items: vec![play("t1", "a1", 3, "2024-03-02T10:00:00Z")],
                }),
                // Upstream demands a wait longer than the whole budget
                Err(FetchError::RateLimited { retry_after: Some(Duration::from_secs(25)) }),
            ],
            vec![],
        );
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(5)));

        let outcome = collector.fetch(None).await.unwrap();

        // Partial results, cursor pinned to the page that succeeded
        assert_eq!(outcome.events.len(), 1);
        let calls = api.page_calls();
        assert_eq!(outcome.cursor, Some(FetchCursor(calls[0].unwrap())));
    }

    #[tokio::test]
    async fn test_profile_passes_through() {
        let api = FakeApi::new(vec![], vec![]);
        let collector = HistoryCollector::new(&api, collector_config(Duration::from_secs(60)));

        let profile = collector.profile().await.unwrap().unwrap();
        assert_eq!(profile.id, "listener");
    }

    #[test]
    fn test_malformed_played_items_are_rejected() {
        assert!(event_from_played(&PlayedItem { track: None, played_at: None }).is_none());
        assert!(event_from_played(&PlayedItem {
            track: Some(TrackRef { id: None, duration_ms: Some(1), artists: vec![] }),
            played_at: Some("2024-03-01T10:00:00Z".to_string()),
        })
        .is_none());
        assert!(event_from_played(&PlayedItem {
            track: Some(track("t1", "a1", 3)),
            played_at: Some("not a time".to_string()),
        })
        .is_none());
        assert!(event_from_played(&play("t1", "a1", 3, "2024-03-01T10:00:00Z")).is_some());
    }
}
