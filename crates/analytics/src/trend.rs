//! Rolling-window CPC trend classification.
//!
//! Two adjacent windows of equal length are compared: `[now - w, now)` is
//! the current window and `[now - 2w, now - w)` the previous one. Changes
//! smaller than the noise threshold are reported as stable so that an
//! irregularly reporting feed does not flap the direction.

use campaign_cache::CpcHistoryStore;
use campaign_core::config::TrendConfig;
use campaign_core::error::CampaignResult;
use campaign_core::types::{TrendDirection, TrendResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

/// Trend for one campaign in the all-campaign snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTrend {
    pub campaign_id: String,
    pub trend: TrendResult,
}

/// Percentage change and direction of `current` against `previous`.
///
/// `previous` of `None` means the earlier window had no usable samples.
pub fn classify(current: f64, previous: Option<f64>, threshold_pct: f64) -> (TrendDirection, f64) {
    let change_pct = match previous {
        Some(prev) if prev != 0.0 => (current - prev) / prev * 100.0,
        _ if current > 0.0 => 100.0,
        _ => 0.0,
    };
    let previous = previous.unwrap_or(0.0);
    let direction = if change_pct.abs() < threshold_pct || current == previous {
        TrendDirection::Stable
    } else if current > previous {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };
    (direction, change_pct)
}

#[derive(Clone)]
pub struct TrendCalculator {
    store: CpcHistoryStore,
    window: Duration,
    threshold_pct: f64,
    lookback: Duration,
}

impl TrendCalculator {
    pub fn new(store: CpcHistoryStore, config: &TrendConfig) -> Self {
        Self {
            store,
            window: Duration::minutes(config.window_minutes.max(1)),
            threshold_pct: config.noise_threshold_pct.max(0.0),
            lookback: Duration::minutes(config.active_lookback_minutes.max(1)),
        }
    }

    pub fn store(&self) -> &CpcHistoryStore {
        &self.store
    }

    pub async fn trend(&self, campaign_id: &str, now: DateTime<Utc>) -> CampaignResult<TrendResult> {
        let current = self.store.window_average(campaign_id, now - self.window, now).await?;

        let Some(current) = current else {
            // Nothing recent: repeat the last known value.
            let last = self.store.latest_before(campaign_id, now).await?;
            let (value, ts) = last.map_or((0.0, now), |s| (s.cpc, s.timestamp));
            debug!(campaign_id, value, "No samples in current window");
            return Ok(TrendResult::stable(value, ts));
        };

        let previous = self
            .store
            .window_average(campaign_id, now - self.window * 2, now - self.window)
            .await?;

        // A first window with nothing to compare against is not a rise.
        let Some(previous) = previous else {
            return Ok(TrendResult::stable(current.avg_cpc, current.last_timestamp));
        };

        let (direction, change_pct) = classify(current.avg_cpc, Some(previous.avg_cpc), self.threshold_pct);
        Ok(TrendResult {
            current_value: current.avg_cpc,
            previous_value: previous.avg_cpc,
            direction,
            change_pct,
            last_updated: current.last_timestamp,
        })
    }

    /// Trends for every campaign sampled within the lookback, dropping
    /// campaigns whose current value is zero.
    pub async fn active_trends(&self, now: DateTime<Utc>) -> CampaignResult<Vec<CampaignTrend>> {
        let campaign_ids = self
            .store
            .active_campaigns(now - self.lookback, now + Duration::milliseconds(1))
            .await?;

        let mut trends = Vec::with_capacity(campaign_ids.len());
        for campaign_id in campaign_ids {
            let trend = self.trend(&campaign_id, now).await?;
            if trend.current_value > 0.0 {
                trends.push(CampaignTrend { campaign_id, trend });
            }
        }
        metrics::counter!("trend.snapshot.campaigns").increment(trends.len() as u64);
        Ok(trends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_cache::LocalHistory;
    use campaign_core::types::CpcHistorySample;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn calculator() -> TrendCalculator {
        let store = CpcHistoryStore::new(Arc::new(LocalHistory::new()), 24);
        TrendCalculator::new(store, &TrendConfig::default())
    }

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
    }

    async fn sample(calc: &TrendCalculator, campaign: &str, cpc: f64, minutes_ago: i64) {
        let now = t();
        calc.store()
            .append_at(
                CpcHistorySample::at(campaign, "acct", cpc, cpc * 10.0, now - Duration::minutes(minutes_ago)),
                now,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rising_cpc_is_up() {
        let calc = calculator();
        sample(&calc, "111", 2.0, 5).await;
        sample(&calc, "111", 1.0, 20).await;

        let trend = calc.trend("111", t()).await.unwrap();
        assert_eq!(trend.direction, TrendDirection::Up);
        assert!((trend.current_value - 2.0).abs() < f64::EPSILON);
        assert!((trend.previous_value - 1.0).abs() < f64::EPSILON);
        assert!((trend.change_pct - 100.0).abs() < 1e-9);
        assert_eq!(trend.last_updated, t() - Duration::minutes(5));
    }

    #[tokio::test]
    async fn single_recent_sample_is_stable() {
        let calc = calculator();
        sample(&calc, "111", 1.0, 5).await;

        let trend = calc.trend("111", t()).await.unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert!((trend.current_value - 1.0).abs() < f64::EPSILON);
        assert!((trend.previous_value - trend.current_value).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn small_change_is_noise() {
        let calc = calculator();
        sample(&calc, "111", 1.00, 5).await;
        sample(&calc, "111", 1.01, 20).await;
        sample(&calc, "222", 1.00, 5).await;
        sample(&calc, "222", 0.95, 20).await;

        assert_eq!(calc.trend("111", t()).await.unwrap().direction, TrendDirection::Stable);
        assert_eq!(calc.trend("222", t()).await.unwrap().direction, TrendDirection::Up);
    }

    #[tokio::test]
    async fn falling_cpc_is_down() {
        let calc = calculator();
        sample(&calc, "111", 0.80, 2).await;
        sample(&calc, "111", 1.20, 25).await;
        assert_eq!(calc.trend("111", t()).await.unwrap().direction, TrendDirection::Down);
    }

    #[tokio::test]
    async fn empty_current_window_falls_back_to_last_sample() {
        let calc = calculator();
        sample(&calc, "111", 1.7, 50).await;

        let trend = calc.trend("111", t()).await.unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert!((trend.current_value - 1.7).abs() < f64::EPSILON);
        assert!((trend.previous_value - 1.7).abs() < f64::EPSILON);
        assert_eq!(trend.last_updated, t() - Duration::minutes(50));

        let none = calc.trend("999", t()).await.unwrap();
        assert!((none.current_value).abs() < f64::EPSILON);
        assert_eq!(none.direction, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn active_trends_skip_idle_and_zero_campaigns() {
        let calc = calculator();
        sample(&calc, "111", 1.0, 5).await;
        sample(&calc, "222", 0.0, 5).await;
        sample(&calc, "333", 1.0, 45).await;

        let trends = calc.active_trends(t()).await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].campaign_id, "111");
    }

    #[test]
    fn classify_without_previous_window() {
        assert_eq!(classify(1.5, None, 2.0), (TrendDirection::Up, 100.0));
        assert_eq!(classify(0.0, None, 2.0), (TrendDirection::Stable, 0.0));
    }
}
