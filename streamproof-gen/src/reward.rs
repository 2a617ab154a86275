//! Differential reward calculation
//!
//! Upstream windows overlap across runs: the same history can be re-fetched
//! wholesale on the next invocation. Diffing raw events would therefore
//! double-count. Instead each run computes what the *entire* view seen so
//! far would be worth as a first contribution, and pays out only the growth
//! over what previous runs already banked. The payout is exactly-once and
//! the account's cumulative score never decreases.

use crate::models::ListeningStats;
use crate::scoring::{self, PointsBreakdown};

/// Outcome of evaluating one run against an account's payout history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardOutcome {
    pub breakdown: PointsBreakdown,
    /// Normalized score the full view would earn as a first contribution
    pub potential_score: f64,
    /// This run's payout: max(0, potential − previously paid)
    pub reward: f64,
    /// `reward` re-expressed in points, for reporting
    pub differential_points: u32,
}

/// Evaluate one run's stats against the cumulative score already paid out.
pub fn evaluate(stats: &ListeningStats, previous_cumulative: f64, max_points: u32) -> RewardOutcome {
    let breakdown = scoring::score(stats);
    let potential_score = scoring::normalize(breakdown.total_points, max_points);
    let reward = (potential_score - previous_cumulative).max(0.0);

    RewardOutcome {
        breakdown,
        potential_score,
        reward,
        differential_points: (reward * f64::from(max_points)).round() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(minutes: u64, artists: usize, days: i64) -> ListeningStats {
        ListeningStats {
            total_minutes: minutes,
            event_count: 1,
            unique_artists: (0..artists).map(|i| format!("artist-{i}")).collect(),
            activity_period_days: days,
            first_listen: None,
            last_listen: None,
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_first_run_pays_full_potential() {
        let outcome = evaluate(&stats(1200, 10, 40), 0.0, 1000);
        assert_close(outcome.potential_score, 0.205);
        assert_close(outcome.reward, 0.205);
        assert_eq!(outcome.differential_points, 205);
    }

    #[test]
    fn test_overlapping_refetch_pays_only_growth() {
        // Next run sees more data: 300 points potential against 0.205 paid
        let outcome = evaluate(&stats(1200, 50, 5), 0.205, 1000);
        assert_close(outcome.potential_score, 0.300);
        assert_close(outcome.reward, 0.095);
        assert_eq!(outcome.differential_points, 95);
    }

    #[test]
    fn test_unchanged_view_pays_nothing() {
        let outcome = evaluate(&stats(1200, 10, 40), 0.205, 1000);
        assert_close(outcome.reward, 0.0);
        assert_eq!(outcome.differential_points, 0);
    }

    #[test]
    fn test_shrunken_view_never_goes_negative() {
        // Paid 0.5 already, this run's view is only worth 0.205
        let outcome = evaluate(&stats(1200, 10, 40), 0.5, 1000);
        assert_eq!(outcome.reward, 0.0);
        assert_eq!(outcome.differential_points, 0);
    }

    #[test]
    fn test_empty_fetch_pays_nothing() {
        let outcome = evaluate(&ListeningStats::default(), 0.0, 1000);
        assert_eq!(outcome.potential_score, 0.0);
        assert_eq!(outcome.reward, 0.0);
    }

    #[test]
    fn test_reward_is_never_negative() {
        for prev in [0.0, 0.1, 0.205, 0.5, 1.0, 3.7] {
            for (m, a, d) in [(0, 0, 0), (30, 3, 7), (1200, 10, 40), (9000, 80, 400)] {
                let outcome = evaluate(&stats(m, a, d), prev, 1000);
                assert!(outcome.reward >= 0.0);
            }
        }
    }

    #[test]
    fn test_degenerate_max_points() {
        let outcome = evaluate(&stats(1200, 10, 40), 0.0, 0);
        assert_eq!(outcome.potential_score, 0.0);
        assert_eq!(outcome.reward, 0.0);
    }
}
