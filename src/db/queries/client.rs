//! Client database queries

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::DuplicateCpf;
use crate::types::client::{Client, ListClientsRequest, NewClient};

const CLIENT_COLUMNS: &str =
    "id, user_id, name, address, city, state, cep, phone, cpf, created_at, updated_at";

/// Map the `(user_id, cpf)` unique violation onto [`DuplicateCpf`]
fn map_unique_violation(err: sqlx::Error, cpf: &str) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("clients_user_cpf_key") {
            return DuplicateCpf { cpf: cpf.to_string() }.into();
        }
    }
    err.into()
}

/// Create a new client
pub async fn create_client(pool: &PgPool, user_id: Uuid, client: &NewClient) -> Result<Client> {
    let created = sqlx::query_as::<_, Client>(
        r#"
        INSERT INTO clients (
            id, user_id, name, address, city, state, cep, phone, cpf,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
        RETURNING
            id, user_id, name, address, city, state, cep, phone, cpf,
            created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&client.name)
    .bind(&client.address)
    .bind(&client.city)
    .bind(&client.state)
    .bind(&client.cep)
    .bind(&client.phone)
    .bind(&client.cpf)
    .fetch_one(pool)
    .await
    .map_err(|e| map_unique_violation(e, &client.cpf))?;

    Ok(created)
}

/// Get client by ID
pub async fn get_client(pool: &PgPool, user_id: Uuid, client_id: Uuid) -> Result<Option<Client>> {
    let client = sqlx::query_as::<_, Client>(
        r#"
        SELECT
            id, user_id, name, address, city, state, cep, phone, cpf,
            created_at, updated_at
        FROM clients
        WHERE id = $1 AND user_id = $2
        "#
    )
    .bind(client_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(client)
}

/// List clients for a user with search, sort and pagination
pub async fn list_clients(
    pool: &PgPool,
    user_id: Uuid,
    request: &ListClientsRequest,
) -> Result<(Vec<Client>, i64)> {
    let mut conditions = vec!["user_id = $1".to_string()];
    let mut patterns: Vec<String> = Vec::new();

    if let Some(search) = request.search_columns() {
        let mut alternatives = Vec::new();
        for (column, term) in [
            ("name", &search.name),
            ("cpf", &search.cpf),
            ("phone", &search.phone),
        ] {
            if let Some(term) = term {
                patterns.push(format!("%{}%", term));
                alternatives.push(format!("{} ILIKE ${}", column, patterns.len() + 1));
            }
        }
        conditions.push(format!("({})", alternatives.join(" OR ")));
    }

    let where_clause = conditions.join(" AND ");
    let param_idx = patterns.len() + 1;

    let query = format!(
        r#"
        SELECT {}
        FROM clients
        WHERE {}
        ORDER BY {}, id
        LIMIT ${} OFFSET ${}
        "#,
        CLIENT_COLUMNS,
        where_clause,
        request.sort.order_by(),
        param_idx + 1,
        param_idx + 2
    );
    let count_query = format!("SELECT COUNT(*) FROM clients WHERE {}", where_clause);

    let mut query_builder = sqlx::query_as::<_, Client>(&query).bind(user_id);
    let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query).bind(user_id);

    for pattern in &patterns {
        query_builder = query_builder.bind(pattern);
        count_builder = count_builder.bind(pattern);
    }

    query_builder = query_builder.bind(request.limit).bind(request.offset);

    let clients = query_builder.fetch_all(pool).await?;
    let total = count_builder.fetch_one(pool).await?;

    Ok((clients, total))
}

/// Update a client; every column is rewritten with the validated values
pub async fn update_client(
    pool: &PgPool,
    user_id: Uuid,
    client_id: Uuid,
    client: &NewClient,
) -> Result<Option<Client>> {
    let updated = sqlx::query_as::<_, Client>(
        r#"
        UPDATE clients
        SET
            name = $3,
            address = $4,
            city = $5,
            state = $6,
            cep = $7,
            phone = $8,
            cpf = $9,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING
            id, user_id, name, address, city, state, cep, phone, cpf,
            created_at, updated_at
        "#
    )
    .bind(client_id)
    .bind(user_id)
    .bind(&client.name)
    .bind(&client.address)
    .bind(&client.city)
    .bind(&client.state)
    .bind(&client.cep)
    .bind(&client.phone)
    .bind(&client.cpf)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_unique_violation(e, &client.cpf))?;

    Ok(updated)
}

/// Delete a client
pub async fn delete_client(pool: &PgPool, user_id: Uuid, client_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM clients
        WHERE id = $1 AND user_id = $2
        "#
    )
    .bind(client_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether another client of the same owner already uses this CPF
pub async fn cpf_taken(
    pool: &PgPool,
    user_id: Uuid,
    cpf: &str,
    exclude: Option<Uuid>,
) -> Result<bool> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM clients
            WHERE user_id = $1 AND cpf = $2 AND ($3::uuid IS NULL OR id <> $3)
        )
        "#
    )
    .bind(user_id)
    .bind(cpf)
    .bind(exclude)
    .fetch_one(pool)
    .await?;

    Ok(taken)
}

/// Creation timestamps of a user's clients since a given instant
pub async fn creation_dates(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let dates = sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        SELECT created_at FROM clients
        WHERE user_id = $1 AND created_at >= $2
        "#
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(dates)
}
