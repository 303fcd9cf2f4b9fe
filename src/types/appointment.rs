//! Appointment types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::messages::default_limit;

/// Status derived from wall-clock time, never stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Past,
    Ongoing,
    Upcoming,
}

/// Appointment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` share an instant.
/// Touching endpoints do not overlap.
pub fn intervals_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && e1 > s2
}

impl Appointment {
    pub fn status_at(&self, now: DateTime<Utc>) -> AppointmentStatus {
        if self.end_time < now {
            AppointmentStatus::Past
        } else if self.start_time <= now {
            AppointmentStatus::Ongoing
        } else {
            AppointmentStatus::Upcoming
        }
    }

    /// Duration in hours, rounded to 2 decimals
    pub fn duration_hours(&self) -> f64 {
        let seconds = (self.end_time - self.start_time).num_seconds() as f64;
        (seconds / 3600.0 * 100.0).round() / 100.0
    }
}

/// Appointment with the derived fields, as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub status: AppointmentStatus,
    pub duration_hours: f64,
}

impl AppointmentView {
    pub fn at(appointment: Appointment, now: DateTime<Utc>) -> Self {
        Self {
            status: appointment.status_at(now),
            duration_hours: appointment.duration_hours(),
            appointment,
        }
    }
}

/// Create/update payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl AppointmentInput {
    /// Fill fields that were not provided from the stored record
    pub fn merged_over(&self, existing: &Appointment) -> AppointmentInput {
        AppointmentInput {
            name: self.name.clone().or_else(|| Some(existing.name.clone())),
            start_time: self.start_time.or(Some(existing.start_time)),
            end_time: self.end_time.or(Some(existing.end_time)),
        }
    }
}

/// Appointment fields after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub input: AppointmentInput,
}

/// Request for listing appointments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAppointmentsRequest {
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for ListAppointmentsRequest {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ListAppointmentsRequest {
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 10, hour, minute, 0).unwrap()
    }

    fn appointment(start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: "Consulta".to_string(),
            start_time: start,
            end_time: end,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let a = appointment(at(9, 0), at(10, 0));
        let b = appointment(at(9, 30), at(10, 30));
        assert!(intervals_overlap(a.start_time, a.end_time, b.start_time, b.end_time));
        assert!(intervals_overlap(b.start_time, b.end_time, a.start_time, a.end_time));
    }

    #[test]
    fn test_back_to_back_does_not_overlap() {
        let a = appointment(at(9, 0), at(10, 0));
        let b = appointment(at(10, 0), at(11, 0));
        assert!(!intervals_overlap(a.start_time, a.end_time, b.start_time, b.end_time));
        assert!(!intervals_overlap(b.start_time, b.end_time, a.start_time, a.end_time));
    }

    #[test]
    fn test_contained_interval_overlaps() {
        assert!(intervals_overlap(at(9, 0), at(12, 0), at(10, 0), at(11, 0)));
        assert!(intervals_overlap(at(10, 0), at(11, 0), at(9, 0), at(12, 0)));
    }

    #[test]
    fn test_status_derivation() {
        let a = appointment(at(9, 0), at(10, 0));
        assert_eq!(a.status_at(at(8, 0)), AppointmentStatus::Upcoming);
        assert_eq!(a.status_at(at(9, 0)), AppointmentStatus::Ongoing);
        assert_eq!(a.status_at(at(10, 0)), AppointmentStatus::Ongoing);
        assert_eq!(a.status_at(at(10, 1)), AppointmentStatus::Past);
    }

    #[test]
    fn test_duration_hours_rounds() {
        let a = appointment(at(9, 0), at(9, 0) + Duration::minutes(100));
        assert_eq!(a.duration_hours(), 1.67);
    }

    #[test]
    fn test_view_serializes_derived_fields() {
        let a = appointment(at(9, 0), at(10, 30));
        let json = serde_json::to_value(AppointmentView::at(a, at(12, 0))).unwrap();
        assert_eq!(json["status"], "past");
        assert_eq!(json["duration_hours"], 1.5);
        assert_eq!(json["name"], "Consulta");
    }

    #[test]
    fn test_list_request_status_filter() {
        let request: ListAppointmentsRequest =
            serde_json::from_str(r#"{"status":"upcoming"}"#).unwrap();
        assert_eq!(request.status, Some(AppointmentStatus::Upcoming));
        assert_eq!(request.limit, 50);
    }
}
