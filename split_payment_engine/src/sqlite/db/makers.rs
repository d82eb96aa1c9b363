use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{BuyerProfile, Maker, NewMaker},
    traits::SettlementDbError,
};

pub async fn insert_maker(maker: NewMaker, conn: &mut SqliteConnection) -> Result<Maker, SettlementDbError> {
    let user_id = maker.user_id.clone();
    let maker: Maker = sqlx::query_as(
        "INSERT INTO makers (user_id, display_name, email, country) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(maker.user_id)
    .bind(maker.display_name)
    .bind(maker.email)
    .bind(maker.country)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => SettlementDbError::MakerAlreadyExists(user_id),
        _ => SettlementDbError::from(e),
    })?;
    debug!("🗃️ Maker #{} ({}) created", maker.id, maker.display_name);
    Ok(maker)
}

pub async fn fetch_maker(id: i64, conn: &mut SqliteConnection) -> Result<Option<Maker>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM makers WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_maker_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<Maker>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM makers WHERE user_id = $1").bind(user_id).fetch_optional(conn).await
}

pub async fn upsert_buyer_profile(
    profile: BuyerProfile,
    conn: &mut SqliteConnection,
) -> Result<BuyerProfile, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO buyer_profiles (user_id, full_name, email) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET full_name = excluded.full_name, email = excluded.email
            RETURNING *;
        "#,
    )
    .bind(profile.user_id)
    .bind(profile.full_name)
    .bind(profile.email)
    .fetch_one(conn)
    .await
}

pub async fn fetch_buyer_profile(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<BuyerProfile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM buyer_profiles WHERE user_id = $1").bind(user_id).fetch_optional(conn).await
}
