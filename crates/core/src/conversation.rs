//! Call/message split for channels that report only a combined conversion count.

use crate::types::{ChannelDailyMetric, ConversationSplit};
use chrono::NaiveDate;

/// Share of local-services conversions attributed to phone calls when the
/// feed does not break them down.
pub const DEFAULT_CALL_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
pub struct ConversationEstimator {
    call_ratio: f64,
}

impl ConversationEstimator {
    /// `call_ratio` is clamped to `[0, 1]`.
    pub fn new(call_ratio: f64) -> Self {
        let call_ratio = if call_ratio.is_finite() {
            call_ratio.clamp(0.0, 1.0)
        } else {
            DEFAULT_CALL_RATIO
        };
        Self { call_ratio }
    }

    pub fn call_ratio(&self) -> f64 {
        self.call_ratio
    }

    /// Split an aggregate conversion count; `calls + messages == total`.
    pub fn split(&self, total: f64) -> ConversationSplit {
        if !total.is_finite() || total <= 0.0 {
            return ConversationSplit::default();
        }
        let calls = (total * self.call_ratio).round().min(total);
        ConversationSplit {
            calls,
            messages: total - calls,
        }
    }

    /// Estimate one raw daily record of the secondary channel.
    pub fn estimate_day(&self, date: NaiveDate, cost: f64, conversions: f64) -> ChannelDailyMetric {
        ChannelDailyMetric {
            date,
            cost,
            conversions,
            estimated: self.split(conversions),
        }
    }
}

impl Default for ConversationEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_total_for_whole_counts() {
        let estimator = ConversationEstimator::default();
        for total in 0..=500u32 {
            let total = f64::from(total);
            let split = estimator.split(total);
            assert_eq!(split.calls + split.messages, total, "total {total}");
            assert!(split.messages >= 0.0);
        }
    }

    #[test]
    fn split_applies_the_call_ratio() {
        let split = ConversationEstimator::default().split(20.0);
        assert_eq!(split.calls, 19.0);
        assert_eq!(split.messages, 1.0);

        // round(3 * 0.95) = round(2.85) = 3
        let split = ConversationEstimator::default().split(3.0);
        assert_eq!(split.calls, 3.0);
        assert_eq!(split.messages, 0.0);
    }

    #[test]
    fn fractional_totals_never_go_negative() {
        let split = ConversationEstimator::default().split(0.6);
        assert!(split.calls <= 0.6);
        assert!(split.messages >= 0.0);
    }

    #[test]
    fn configured_ratio_is_used_and_clamped() {
        let split = ConversationEstimator::new(0.5).split(10.0);
        assert_eq!((split.calls, split.messages), (5.0, 5.0));
        assert_eq!(ConversationEstimator::new(7.0).call_ratio(), 1.0);
        assert_eq!(ConversationEstimator::new(f64::NAN).call_ratio(), DEFAULT_CALL_RATIO);
    }

    #[test]
    fn estimate_day_keeps_raw_figures() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day = ConversationEstimator::default().estimate_day(date, 120.5, 40.0);
        assert_eq!(day.date, date);
        assert_eq!(day.cost, 120.5);
        assert_eq!(day.conversions, 40.0);
        assert_eq!(day.estimated.calls, 38.0);
        assert_eq!(day.estimated.messages, 2.0);
    }
}
