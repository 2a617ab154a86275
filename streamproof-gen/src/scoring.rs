//! Listening-data scoring
//!
//! Pure tier tables over one run's aggregate stats. No I/O, no clock:
//! the same stats always produce the same breakdown. Thresholds are
//! inclusive lower bounds evaluated highest-first, with no interpolation
//! between tiers.

use serde::{Deserialize, Serialize};

use crate::models::ListeningStats;

/// Detailed breakdown of points awarded for one view of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub volume_points: u32,
    pub diversity_points: u32,
    pub history_points: u32,
    pub total_points: u32,
}

/// Score one run's aggregate stats.
pub fn score(stats: &ListeningStats) -> PointsBreakdown {
    let volume_points = volume_points(stats.total_minutes);
    let diversity_points = diversity_points(stats.unique_artists.len());
    let history_points = history_points(stats.activity_period_days);

    PointsBreakdown {
        volume_points,
        diversity_points,
        history_points,
        total_points: volume_points + diversity_points + history_points,
    }
}

/// Points for total listening time.
pub fn volume_points(total_minutes: u64) -> u32 {
    match total_minutes {
        m if m >= 5000 => 500,
        m if m >= 1000 => 150,
        m if m >= 500 => 50,
        m if m >= 100 => 25,
        m if m >= 30 => 5,
        _ => 0,
    }
}

/// Points for artist diversity.
pub fn diversity_points(unique_artists: usize) -> u32 {
    match unique_artists {
        a if a >= 50 => 150,
        a if a >= 25 => 75,
        a if a >= 10 => 30,
        a if a >= 5 => 10,
        a if a >= 3 => 5,
        _ => 0,
    }
}

/// Points for listening-history length.
pub fn history_points(activity_period_days: i64) -> u32 {
    match activity_period_days {
        d if d >= 180 => 100,
        d if d >= 90 => 50,
        d if d >= 30 => 25,
        d if d >= 7 => 10,
        _ => 0,
    }
}

/// Convert points to a normalized score in [0, 1].
pub fn normalize(points: u32, max_points: u32) -> f64 {
    if max_points == 0 {
        return 0.0;
    }
    (points as f64 / max_points as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListeningEvent;
    use streamproof_common::time;

    #[test]
    fn test_volume_tier_boundaries() {
        assert_eq!(volume_points(0), 0);
        assert_eq!(volume_points(29), 0);
        assert_eq!(volume_points(30), 5);
        assert_eq!(volume_points(99), 5);
        assert_eq!(volume_points(100), 25);
        assert_eq!(volume_points(499), 25);
        assert_eq!(volume_points(500), 50);
        assert_eq!(volume_points(999), 50);
        assert_eq!(volume_points(1000), 150);
        assert_eq!(volume_points(4999), 150);
        assert_eq!(volume_points(5000), 500);
        assert_eq!(volume_points(u64::MAX), 500);
    }

    #[test]
    fn test_diversity_tier_boundaries() {
        assert_eq!(diversity_points(0), 0);
        assert_eq!(diversity_points(2), 0);
        assert_eq!(diversity_points(3), 5);
        assert_eq!(diversity_points(4), 5);
        assert_eq!(diversity_points(5), 10);
        assert_eq!(diversity_points(9), 10);
        assert_eq!(diversity_points(10), 30);
        assert_eq!(diversity_points(24), 30);
        assert_eq!(diversity_points(25), 75);
        assert_eq!(diversity_points(49), 75);
        assert_eq!(diversity_points(50), 150);
    }

    #[test]
    fn test_history_tier_boundaries() {
        assert_eq!(history_points(0), 0);
        assert_eq!(history_points(6), 0);
        assert_eq!(history_points(7), 10);
        assert_eq!(history_points(29), 10);
        assert_eq!(history_points(30), 25);
        assert_eq!(history_points(89), 25);
        assert_eq!(history_points(90), 50);
        assert_eq!(history_points(179), 50);
        assert_eq!(history_points(180), 100);
    }

    #[test]
    fn test_tiers_are_monotonic() {
        for m in 0..6000u64 {
            assert!(volume_points(m + 1) >= volume_points(m));
        }
        for a in 0..60usize {
            assert!(diversity_points(a + 1) >= diversity_points(a));
        }
        for d in 0..200i64 {
            assert!(history_points(d + 1) >= history_points(d));
        }
    }

    #[test]
    fn test_normalize_bounds() {
        assert_eq!(normalize(0, 1000), 0.0);
        assert_eq!(normalize(205, 1000), 0.205);
        assert_eq!(normalize(1000, 1000), 1.0);
        // Clamped: points above the denominator never exceed 1
        assert_eq!(normalize(2500, 1000), 1.0);
        // Degenerate denominator
        assert_eq!(normalize(500, 0), 0.0);
        for p in (0..5000u32).step_by(7) {
            let s = normalize(p, 1000);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_score_empty_stats_is_all_zero() {
        let breakdown = score(&ListeningStats::default());
        assert_eq!(
            breakdown,
            PointsBreakdown {
                volume_points: 0,
                diversity_points: 0,
                history_points: 0,
                total_points: 0
            }
        );
    }

    #[test]
    fn test_score_fresh_account_example() {
        // 1200 minutes, 10 artists, 40 activity days
        let stats = ListeningStats {
            total_minutes: 1200,
            event_count: 300,
            unique_artists: (0..10).map(|i| format!("artist-{i}")).collect(),
            activity_period_days: 40,
            first_listen: time::parse_played_at("2024-01-01T00:00:00Z"),
            last_listen: time::parse_played_at("2024-02-09T00:00:00Z"),
        };
        let breakdown = score(&stats);
        assert_eq!(breakdown.volume_points, 150);
        assert_eq!(breakdown.diversity_points, 30);
        assert_eq!(breakdown.history_points, 25);
        assert_eq!(breakdown.total_points, 205);
        assert_eq!(normalize(breakdown.total_points, 1000), 0.205);
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        let stats = ListeningStats::from_events(&[ListeningEvent {
            track_id: "t".to_string(),
            artist_id: "a".to_string(),
            duration_ms: 45 * 60_000,
            listened_at: time::parse_played_at("2024-02-01T00:00:00Z").unwrap(),
        }]);
        let b = score(&stats);
        assert_eq!(b.total_points, b.volume_points + b.diversity_points + b.history_points);
    }
}
