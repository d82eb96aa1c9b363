use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{LineItem, NewOrder, Order, OrderStatus, PaymentStatus, ProviderKind},
    traits::SettlementDbError,
};

/// Inserts the order and its line items. Not atomic on its own; run it inside a transaction.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementDbError> {
    if order.line_items.is_empty() {
        return Err(SettlementDbError::EmptyOrder);
    }
    let total = order.total_price().ok_or(SettlementDbError::OrderTotalOverflow)?;
    let order_number = order.order_number.clone();
    let record: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_number, owner_id, total_price, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.owner_id)
    .bind(total)
    .bind(order.currency)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => SettlementDbError::OrderAlreadyExists(order_number),
        _ => SettlementDbError::from(e),
    })?;
    for item in order.line_items {
        sqlx::query(
            r#"
                INSERT INTO order_line_items (order_id, maker_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6);
            "#,
        )
        .bind(record.id)
        .bind(item.maker_id)
        .bind(item.product_id)
        .bind(item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order {} inserted with id {}", record.order_number, record.id);
    Ok(record)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_number(order_number: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_number = $1").bind(order_number).fetch_optional(conn).await
}

pub async fn fetch_order_by_session(
    provider: ProviderKind,
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT orders.* FROM orders JOIN payment_linkages ON orders.id = payment_linkages.order_id
            WHERE payment_linkages.provider = $1 AND payment_linkages.external_session_id = $2
        "#,
    )
    .bind(provider)
    .bind(session_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_line_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LineItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_line_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Changes the order status after checking that the transition is legal.
pub async fn update_order_status(
    id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementDbError> {
    let order = fetch_order(id, &mut *conn).await?.ok_or(SettlementDbError::OrderNotFound(id))?;
    if !order.status.can_transition_to(status) {
        return Err(SettlementDbError::IllegalStatusChange { from: order.status, to: status });
    }
    set_status(id, order.status, status, None, conn).await?.ok_or(SettlementDbError::OrderNotFound(id))
}

/// Compare-and-set on the order status. The update only applies if the status is still `expected`, so two concurrent
/// callers cannot both move the same order. Returns `None` if the status had changed underneath us.
pub async fn set_status(
    id: i64,
    expected: OrderStatus,
    status: OrderStatus,
    payment_status: Option<PaymentStatus>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET status = $1, payment_status = COALESCE($2, payment_status)
            WHERE id = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(payment_status)
    .bind(id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    if order.is_some() {
        trace!("🗃️ Order {id} moved from {expected} to {status}");
    }
    Ok(order)
}
