//! Dashboard statistics and push event payloads

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public channel name for aggregate statistics
pub const PUBLIC_DASHBOARD_CHANNEL: &str = "public_dashboard";

/// Private channel carrying import notifications for one owner
pub fn import_notifications_channel(user_id: Uuid) -> String {
    format!("import_notifications_{}", user_id)
}

/// System-wide client statistics (not scoped per owner)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_clients: i64,
    pub duplicate_phones: i64,
    pub clients_by_state: BTreeMap<String, i64>,
}

/// Events on the public dashboard channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublicDashboardEvent {
    InitialStats { data: DashboardStats },
    StatsUpdate { data: DashboardStats },
}

/// Events on a private import notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportNotification {
    ImportCompleted {
        import_report_id: Uuid,
        success_count: i32,
        error_count: i32,
        message: String,
    },
    ImportFailed {
        import_report_id: Uuid,
        message: String,
    },
}

/// Line chart series: one label and one value per day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_update_shape() {
        let mut stats = DashboardStats {
            total_clients: 3,
            duplicate_phones: 1,
            ..Default::default()
        };
        stats.clients_by_state.insert("SP".to_string(), 2);
        stats.clients_by_state.insert("RJ".to_string(), 1);

        let json = serde_json::to_value(PublicDashboardEvent::StatsUpdate { data: stats }).unwrap();
        assert_eq!(json["type"], "stats_update");
        assert_eq!(json["data"]["total_clients"], 3);
        assert_eq!(json["data"]["clients_by_state"]["SP"], 2);
    }

    #[test]
    fn test_import_completed_shape() {
        let event = ImportNotification::ImportCompleted {
            import_report_id: Uuid::nil(),
            success_count: 2,
            error_count: 0,
            message: "2 clientes importados com sucesso!".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "import_completed");
        assert_eq!(json["import_report_id"], Uuid::nil().to_string());
        assert_eq!(json["success_count"], 2);
    }

    #[test]
    fn test_channel_names() {
        let id = Uuid::nil();
        assert_eq!(
            import_notifications_channel(id),
            "import_notifications_00000000-0000-0000-0000-000000000000"
        );
    }
}
