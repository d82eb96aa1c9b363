use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Cents, DisbursementState, PaymentLinkage, TransferPlanRow},
    traits::{NewPaymentLinkage, NewPlannedTransfer, SettlementDbError},
};

pub async fn fetch_linkage(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentLinkage>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_linkages WHERE order_id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_linkage_by_payment(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentLinkage>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_linkages WHERE external_payment_id = $1")
        .bind(payment_id)
        .fetch_optional(conn)
        .await
}

/// Creates or replaces the checkout session for the order. Fails if the order already has a confirmed payment.
pub async fn upsert_linkage(
    order_id: i64,
    linkage: NewPaymentLinkage,
    conn: &mut SqliteConnection,
) -> Result<PaymentLinkage, SettlementDbError> {
    let result: Option<PaymentLinkage> = sqlx::query_as(
        r#"
            INSERT INTO payment_linkages (order_id, provider, external_session_id) VALUES ($1, $2, $3)
            ON CONFLICT (order_id) DO UPDATE
                SET provider = excluded.provider, external_session_id = excluded.external_session_id
                WHERE payment_linkages.external_payment_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(linkage.provider)
    .bind(linkage.external_session_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(SettlementDbError::CheckoutLocked(order_id))
}

/// Replaces the split plan for the order.
pub async fn replace_plan(
    order_id: i64,
    plan: Vec<NewPlannedTransfer>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM transfer_plan WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    for row in plan {
        sqlx::query(
            r#"
                INSERT INTO transfer_plan
                    (order_id, maker_id, line_item_id, destination, gross, platform_fee, immediate, reserve)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
            "#,
        )
        .bind(order_id)
        .bind(row.maker_id)
        .bind(row.line_item_id)
        .bind(row.destination)
        .bind(row.gross)
        .bind(row.platform_fee)
        .bind(row.immediate)
        .bind(row.reserve)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_plan(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<TransferPlanRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transfer_plan WHERE order_id = $1 ORDER BY maker_id, line_item_id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Attaches the provider payment id to the order's linkage. Only succeeds if no payment is attached yet.
pub async fn set_payment(
    order_id: i64,
    payment_id: &str,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentLinkage>, SettlementDbError> {
    sqlx::query_as(
        r#"
            UPDATE payment_linkages SET external_payment_id = $1, paid_at = $2
            WHERE order_id = $3 AND external_payment_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(payment_id)
    .bind(paid_at)
    .bind(order_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            SettlementDbError::PaymentAlreadyLinked(payment_id.to_string())
        },
        _ => SettlementDbError::from(e),
    })
}

pub async fn set_refund_amount(order_id: i64, amount: Cents, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_linkages SET refund_amount = $1 WHERE order_id = $2")
        .bind(amount)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Compare-and-set on the disbursement marker.
pub async fn transition_disbursement(
    order_id: i64,
    from: DisbursementState,
    to: DisbursementState,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentLinkage>, sqlx::Error> {
    let linkage: Option<PaymentLinkage> = sqlx::query_as(
        r#"
            UPDATE payment_linkages SET disbursement = $1
            WHERE order_id = $2 AND disbursement = $3
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(order_id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    if linkage.is_some() {
        trace!("🗃️ Disbursement for order {order_id} moved from {from:?} to {to:?}");
    }
    Ok(linkage)
}

/// Claims the disbursement for a paid order. The status check and the marker update happen in one statement.
pub async fn claim_disbursement(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentLinkage>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payment_linkages SET disbursement = 'in_progress'
            WHERE order_id = $1
              AND disbursement = 'pending'
              AND external_payment_id IS NOT NULL
              AND EXISTS (
                  SELECT 1 FROM orders WHERE orders.id = $1 AND status = 'processing' AND payment_status = 'paid'
              )
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}
