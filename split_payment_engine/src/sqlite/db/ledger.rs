use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use super::push_id_list;
use crate::db_types::{LedgerRow, LedgerStatus, NewLedgerRow};

/// Inserts the row unless the line item already has one. Returns `None` if it did.
pub async fn insert_if_absent(row: NewLedgerRow, conn: &mut SqliteConnection) -> Result<Option<LedgerRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO transfer_ledger (
                order_id,
                line_item_id,
                maker_id,
                destination,
                gross,
                platform_fee,
                immediate,
                reserve,
                reserve_release_at,
                status,
                transfer_key,
                currency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (line_item_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(row.order_id)
    .bind(row.line_item_id)
    .bind(row.maker_id)
    .bind(row.destination)
    .bind(row.gross)
    .bind(row.platform_fee)
    .bind(row.immediate)
    .bind(row.reserve)
    .bind(row.reserve_release_at)
    .bind(row.status)
    .bind(row.transfer_key)
    .bind(row.currency)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LedgerRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transfer_ledger WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

pub async fn fetch_by_ids(ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<LedgerRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let mut builder = QueryBuilder::new("SELECT * FROM transfer_ledger WHERE id IN ");
    push_id_list(&mut builder, ids);
    builder.push(" ORDER BY id");
    builder.build_query_as::<LedgerRow>().fetch_all(conn).await
}

pub async fn fetch_unreleased_reserves(conn: &mut SqliteConnection) -> Result<Vec<LedgerRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM transfer_ledger
            WHERE reserve_released = FALSE AND status = $1 AND reserve > 0
            ORDER BY maker_id, id
        "#,
    )
    .bind(LedgerStatus::ImmediateSent)
    .fetch_all(conn)
    .await
}

/// Marks every non-completed row of the order as refunded. Returns the number of rows changed.
pub async fn refund_rows_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE transfer_ledger SET status = $1 WHERE order_id = $2 AND status NOT IN ($3, $1)")
        .bind(LedgerStatus::Refunded)
        .bind(order_id)
        .bind(LedgerStatus::Completed)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn mark_reserves_released(
    ids: &[i64],
    transfer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET reserve_released = TRUE, status = ");
    builder.push_bind(LedgerStatus::Completed);
    builder.push(", release_transfer_id = ");
    builder.push_bind(transfer_id.to_string());
    builder.push(", error = NULL WHERE reserve_released = FALSE AND status = ");
    builder.push_bind(LedgerStatus::ImmediateSent);
    builder.push(" AND id IN ");
    push_id_list(&mut builder, ids);
    let result = builder.build().execute(conn).await?;
    trace!("🗃️ {} of {} reserves marked released with transfer {transfer_id}", result.rows_affected(), ids.len());
    Ok(result.rows_affected())
}

/// Moves `pending` or `failed` rows to `immediate_sent`. Rows that were refunded in the meantime keep their status,
/// but the transfer id is still stored on them so the payment can be traced. Returns the number of rows moved.
pub async fn mark_immediate_sent(
    ids: &[i64],
    destination: &str,
    transfer_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET status = ");
    builder.push_bind(LedgerStatus::ImmediateSent);
    builder.push(", destination = ");
    builder.push_bind(destination.to_string());
    builder.push(", immediate_transfer_id = ");
    builder.push_bind(transfer_id.map(String::from));
    builder.push(", error = NULL, transfer_key = NULL, attempts = attempts + (status = ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(") WHERE status IN (");
    builder.push_bind(LedgerStatus::Pending);
    builder.push(", ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(") AND id IN ");
    push_id_list(&mut builder, ids);
    let moved = builder.build().execute(&mut *conn).await?.rows_affected();
    if let Some(transfer_id) = transfer_id {
        let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET immediate_transfer_id = ");
        builder.push_bind(transfer_id.to_string());
        builder.push(" WHERE immediate_transfer_id IS NULL AND status = ");
        builder.push_bind(LedgerStatus::Refunded);
        builder.push(" AND id IN ");
        push_id_list(&mut builder, ids);
        let traced = builder.build().execute(conn).await?.rows_affected();
        if traced > 0 {
            warn!("🗃️ Transfer {transfer_id} went out for {traced} ledger rows that were refunded meanwhile");
        }
    }
    Ok(moved)
}

/// Moves `pending` or `failed` rows to `failed`. `transfer_key` replaces the stored key; pass `None` once the
/// provider has definitely not moved any money under it. A row that was already failed counts one more attempt.
pub async fn mark_failed(
    ids: &[i64],
    message: &str,
    destination: Option<&str>,
    transfer_key: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET status = ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(", error = ");
    builder.push_bind(message.to_string());
    builder.push(", destination = COALESCE(");
    builder.push_bind(destination.map(String::from));
    builder.push(", destination), transfer_key = ");
    builder.push_bind(transfer_key.map(String::from));
    builder.push(", attempts = attempts + (status = ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(") WHERE status IN (");
    builder.push_bind(LedgerStatus::Pending);
    builder.push(", ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(") AND id IN ");
    push_id_list(&mut builder, ids);
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Records the destination and key of a transfer that is about to be attempted on `failed` rows, so a lost outcome
/// can be replayed under the same key.
pub async fn stage_transfer(
    ids: &[i64],
    destination: &str,
    transfer_key: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET destination = ");
    builder.push_bind(destination.to_string());
    builder.push(", transfer_key = ");
    builder.push_bind(transfer_key.to_string());
    builder.push(" WHERE status = ");
    builder.push_bind(LedgerStatus::Failed);
    builder.push(" AND id IN ");
    push_id_list(&mut builder, ids);
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn record_error(
    ids: &[i64],
    message: &str,
    count_attempt: bool,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE transfer_ledger SET error = ");
    builder.push_bind(message.to_string());
    if count_attempt {
        builder.push(", attempts = attempts + 1");
    }
    builder.push(" WHERE id IN ");
    push_id_list(&mut builder, ids);
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}
