//! Appointment database queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::appointment::{
    Appointment, AppointmentStatus, ListAppointmentsRequest, NewAppointment,
};

/// Create a new appointment
pub async fn create_appointment(
    pool: &PgPool,
    user_id: Uuid,
    appointment: &NewAppointment,
) -> Result<Appointment> {
    let created = sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO appointments (id, user_id, name, start_time, end_time, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING id, user_id, name, start_time, end_time, created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&appointment.name)
    .bind(appointment.start_time)
    .bind(appointment.end_time)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

/// Get appointment by ID
pub async fn get_appointment(
    pool: &PgPool,
    user_id: Uuid,
    appointment_id: Uuid,
) -> Result<Option<Appointment>> {
    let appointment = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT id, user_id, name, start_time, end_time, created_at, updated_at
        FROM appointments
        WHERE id = $1 AND user_id = $2
        "#
    )
    .bind(appointment_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(appointment)
}

/// List appointments ordered by start time, optionally filtered by derived
/// status (evaluated at `now`) and name
pub async fn list_appointments(
    pool: &PgPool,
    user_id: Uuid,
    request: &ListAppointmentsRequest,
    now: DateTime<Utc>,
) -> Result<(Vec<Appointment>, i64)> {
    let mut conditions = vec!["user_id = $1".to_string()];
    let mut param_idx = 1;

    if let Some(status) = request.status {
        param_idx += 1;
        conditions.push(match status {
            AppointmentStatus::Upcoming => format!("start_time > ${}", param_idx),
            AppointmentStatus::Past => format!("end_time < ${}", param_idx),
            AppointmentStatus::Ongoing => {
                format!("start_time <= ${0} AND end_time >= ${0}", param_idx)
            }
        });
    }
    let pattern = request.term().map(|t| format!("%{}%", t));
    if pattern.is_some() {
        param_idx += 1;
        conditions.push(format!("name ILIKE ${}", param_idx));
    }

    let where_clause = conditions.join(" AND ");

    let query = format!(
        r#"
        SELECT id, user_id, name, start_time, end_time, created_at, updated_at
        FROM appointments
        WHERE {}
        ORDER BY start_time ASC
        LIMIT ${} OFFSET ${}
        "#,
        where_clause,
        param_idx + 1,
        param_idx + 2
    );
    let count_query = format!("SELECT COUNT(*) FROM appointments WHERE {}", where_clause);

    let mut query_builder = sqlx::query_as::<_, Appointment>(&query).bind(user_id);
    let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query).bind(user_id);

    if request.status.is_some() {
        query_builder = query_builder.bind(now);
        count_builder = count_builder.bind(now);
    }
    if let Some(p) = &pattern {
        query_builder = query_builder.bind(p);
        count_builder = count_builder.bind(p);
    }

    query_builder = query_builder.bind(request.limit).bind(request.offset);

    let appointments = query_builder.fetch_all(pool).await?;
    let total = count_builder.fetch_one(pool).await?;

    Ok((appointments, total))
}

/// Update an appointment
pub async fn update_appointment(
    pool: &PgPool,
    user_id: Uuid,
    appointment_id: Uuid,
    appointment: &NewAppointment,
) -> Result<Option<Appointment>> {
    let updated = sqlx::query_as::<_, Appointment>(
        r#"
        UPDATE appointments
        SET name = $3, start_time = $4, end_time = $5, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, name, start_time, end_time, created_at, updated_at
        "#
    )
    .bind(appointment_id)
    .bind(user_id)
    .bind(&appointment.name)
    .bind(appointment.start_time)
    .bind(appointment.end_time)
    .fetch_optional(pool)
    .await?;

    Ok(updated)
}

/// Delete an appointment
pub async fn delete_appointment(pool: &PgPool, user_id: Uuid, appointment_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = $1 AND user_id = $2")
        .bind(appointment_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// First appointment of the owner overlapping `[start, end)`, by start time
pub async fn find_conflict(
    pool: &PgPool,
    user_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> Result<Option<Appointment>> {
    let conflict = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT id, user_id, name, start_time, end_time, created_at, updated_at
        FROM appointments
        WHERE user_id = $1
          AND start_time < $3
          AND end_time > $2
          AND ($4::uuid IS NULL OR id <> $4)
        ORDER BY start_time ASC
        LIMIT 1
        "#
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .bind(exclude)
    .fetch_optional(pool)
    .await?;

    Ok(conflict)
}

/// Creation timestamps of a user's appointments since a given instant
pub async fn creation_dates(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let dates = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT created_at FROM appointments WHERE user_id = $1 AND created_at >= $2"
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(dates)
}
