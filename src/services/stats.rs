//! Dashboard statistics: public aggregate broadcasts and per-owner charts

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::broadcaster::{self, Broadcaster};
use crate::db::Store;
use crate::types::{ChartData, DashboardStats, PublicDashboardEvent, PUBLIC_DASHBOARD_CHANNEL};

/// Days shown in dashboard charts, today included
pub const CHART_DAYS: i64 = 30;

/// Computes system-wide client statistics and pushes them to the public channel
pub struct StatsPublisher {
    store: Arc<dyn Store>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl StatsPublisher {
    pub fn new(store: Arc<dyn Store>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { store, broadcaster }
    }

    pub async fn snapshot(&self) -> Result<DashboardStats> {
        self.store.client_stats().await
    }

    /// Event a new public subscriber receives once
    pub async fn initial_event(&self) -> Result<PublicDashboardEvent> {
        Ok(PublicDashboardEvent::InitialStats {
            data: self.snapshot().await?,
        })
    }

    /// Recompute and broadcast `stats_update`. Failures are logged, never returned.
    pub async fn publish_update(&self) {
        let event = match self.snapshot().await {
            Ok(data) => PublicDashboardEvent::StatsUpdate { data },
            Err(e) => {
                warn!("Failed to compute dashboard stats: {}", e);
                return;
            }
        };

        match broadcaster::publish(self.broadcaster.as_ref(), PUBLIC_DASHBOARD_CHANNEL, &event).await {
            Ok(()) => debug!("Dashboard stats broadcast"),
            Err(e) => warn!("Failed to broadcast dashboard stats: {}", e),
        }
    }
}

/// First instant of the chart window: local midnight `CHART_DAYS - 1` days before `today`
pub fn chart_window_start(today: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let first_day = today - Duration::days(CHART_DAYS - 1);
    let midnight = first_day.and_hms_opt(0, 0, 0).unwrap_or_default();
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Bucket timestamps into one count per local day, oldest first, zero-filled
pub fn build_daily_chart(
    timestamps: &[DateTime<Utc>],
    today: NaiveDate,
    offset: FixedOffset,
) -> ChartData {
    let mut per_day: HashMap<NaiveDate, i64> = HashMap::new();
    for ts in timestamps {
        *per_day.entry(ts.with_timezone(&offset).date_naive()).or_default() += 1;
    }

    let mut chart = ChartData::default();
    for i in (0..CHART_DAYS).rev() {
        let day = today - Duration::days(i);
        chart.labels.push(day.format("%d/%m").to_string());
        chart.values.push(per_day.get(&day).copied().unwrap_or(0));
    }
    chart
}

/// Today's date in the panel's offset
pub fn today_in(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

pub async fn clients_chart(
    store: &dyn Store,
    user_id: Uuid,
    offset: FixedOffset,
) -> Result<ChartData> {
    let today = today_in(offset);
    let dates = store
        .client_creation_dates(user_id, chart_window_start(today, offset))
        .await?;
    Ok(build_daily_chart(&dates, today, offset))
}

pub async fn appointments_chart(
    store: &dyn Store,
    user_id: Uuid,
    offset: FixedOffset,
) -> Result<ChartData> {
    let today = today_in(offset);
    let dates = store
        .appointment_creation_dates(user_id, chart_window_start(today, offset))
        .await?;
    Ok(build_daily_chart(&dates, today, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::broadcaster::testing::RecordingBroadcaster;
    use crate::types::NewClient;

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_chart_has_thirty_zero_filled_days() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let chart = build_daily_chart(&[], today, brt());
        assert_eq!(chart.labels.len(), 30);
        assert_eq!(chart.values, vec![0; 30]);
        assert_eq!(chart.labels.first().map(String::as_str), Some("12/08"));
        assert_eq!(chart.labels.last().map(String::as_str), Some("10/09"));
    }

    #[test]
    fn test_chart_buckets_by_local_day() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        // 01:00 UTC on the 10th is still the 9th at -03:00
        let late_evening = Utc.with_ymd_and_hms(2025, 9, 10, 1, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 9, 10, 15, 0, 0).unwrap();
        let too_old = Utc.with_ymd_and_hms(2025, 7, 1, 15, 0, 0).unwrap();

        let chart = build_daily_chart(&[late_evening, noon, noon, too_old], today, brt());
        assert_eq!(chart.values[29], 2);
        assert_eq!(chart.values[28], 1);
        assert_eq!(chart.values.iter().sum::<i64>(), 3);
    }

    #[test]
    fn test_window_start_is_local_midnight() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 10).unwrap();
        let start = chart_window_start(today, brt());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 8, 12, 3, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_publish_update_broadcasts_current_stats() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_client(
                Uuid::new_v4(),
                &NewClient {
                    name: "ANA".to_string(),
                    address: "Rua A 100".to_string(),
                    city: "Recife".to_string(),
                    state: "PE".to_string(),
                    cep: "50000-000".to_string(),
                    phone: "(81) 99999-9999".to_string(),
                    cpf: "11144477735".to_string(),
                },
            )
            .await
            .unwrap();
        let recorder = Arc::new(RecordingBroadcaster::default());
        let publisher = StatsPublisher::new(store, recorder.clone());

        publisher.publish_update().await;

        let events = recorder.events_on(PUBLIC_DASHBOARD_CHANNEL);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "stats_update");
        assert_eq!(events[0]["data"]["total_clients"], 1);
        assert_eq!(events[0]["data"]["clients_by_state"]["PE"], 1);
    }

    #[tokio::test]
    async fn test_publish_update_swallows_broadcast_failure() {
        let publisher = StatsPublisher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingBroadcaster::failing()),
        );
        publisher.publish_update().await;
    }

    #[tokio::test]
    async fn test_initial_event_shape() {
        let publisher = StatsPublisher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingBroadcaster::default()),
        );
        let json = serde_json::to_value(publisher.initial_event().await.unwrap()).unwrap();
        assert_eq!(json["type"], "initial_stats");
        assert_eq!(json["data"]["total_clients"], 0);
    }
}
