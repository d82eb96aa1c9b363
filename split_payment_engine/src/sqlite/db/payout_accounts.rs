use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CapabilityFlags, MakerPayoutAccount},
    traits::{CapabilityUpdate, SettlementDbError},
};

pub async fn fetch_for_maker(maker_id: i64, conn: &mut SqliteConnection) -> Result<Option<MakerPayoutAccount>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM maker_payout_accounts WHERE maker_id = $1").bind(maker_id).fetch_optional(conn).await
}

pub async fn fetch_by_account_id(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MakerPayoutAccount>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM maker_payout_accounts WHERE account_id = $1")
        .bind(account_id)
        .fetch_optional(conn)
        .await
}

/// Inserts the account unless the maker already has one, in which case the existing record is returned with `false`.
pub async fn idempotent_insert(
    maker_id: i64,
    account_id: &str,
    flags: CapabilityFlags,
    conn: &mut SqliteConnection,
) -> Result<(MakerPayoutAccount, bool), SettlementDbError> {
    let inserted: Option<MakerPayoutAccount> = sqlx::query_as(
        r#"
            INSERT INTO maker_payout_accounts
                (maker_id, account_id, charges_enabled, payouts_enabled, details_submitted, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (maker_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(maker_id)
    .bind(account_id)
    .bind(flags.charges_enabled)
    .bind(flags.payouts_enabled)
    .bind(flags.details_submitted)
    .bind(flags.status())
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(account) => {
            debug!("🗃️ Payout account {account_id} stored for maker #{maker_id}");
            Ok((account, true))
        },
        None => {
            let existing = fetch_for_maker(maker_id, conn).await?.ok_or_else(|| {
                SettlementDbError::DatabaseError(format!("Payout account for maker #{maker_id} vanished"))
            })?;
            Ok((existing, false))
        },
    }
}

pub async fn update_capabilities(
    account_id: &str,
    flags: CapabilityFlags,
    conn: &mut SqliteConnection,
) -> Result<CapabilityUpdate, sqlx::Error> {
    let status = flags.status();
    let updated: Option<MakerPayoutAccount> = sqlx::query_as(
        r#"
            UPDATE maker_payout_accounts
            SET charges_enabled = $1, payouts_enabled = $2, details_submitted = $3, status = $4
            WHERE account_id = $5 AND (
                charges_enabled != $1 OR payouts_enabled != $2 OR details_submitted != $3 OR status != $4
            )
            RETURNING *;
        "#,
    )
    .bind(flags.charges_enabled)
    .bind(flags.payouts_enabled)
    .bind(flags.details_submitted)
    .bind(status)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(account) = updated {
        debug!("🗃️ Payout account {account_id} is now {status}");
        return Ok(CapabilityUpdate::Changed(account));
    }
    let result = match fetch_by_account_id(account_id, conn).await? {
        Some(account) => CapabilityUpdate::Unchanged(account),
        None => CapabilityUpdate::NotFound,
    };
    Ok(result)
}
