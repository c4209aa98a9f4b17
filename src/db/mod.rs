//! Postgres projection of marketplace state.
//!
//! The in-memory components stay authoritative; this module mirrors their events
//! into tables so history survives restarts and can be queried by time range.

mod models;

pub use models::*;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::escrow::{EscrowMovement, EscrowRecord};
use crate::events::MarketEvent;
use crate::lifecycle::{ReviewRequest, ReviewSlot};
use crate::reputation::KarmaTransaction;

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

fn small(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn big(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub async fn upsert_request(pool: &PgPool, request: &ReviewRequest) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO review_requests
            (id, owner_id, title, content_type, review_type, budget_cents,
             reviews_requested, reviews_claimed, deadline, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            reviews_requested = EXCLUDED.reviews_requested,
            reviews_claimed = EXCLUDED.reviews_claimed,
            updated_at = NOW()
        "#,
    )
    .bind(request.id)
    .bind(request.owner_id)
    .bind(&request.title)
    .bind(&request.content_type)
    .bind(request.review_type.as_str())
    .bind(request.budget_cents)
    .bind(small(request.reviews_requested))
    .bind(small(request.reviews_claimed))
    .bind(request.deadline)
    .bind(request.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert the untouched slots of a new request.
pub async fn seed_slots(pool: &PgPool, request: &ReviewRequest) -> Result<(), sqlx::Error> {
    for slot_id in &request.slot_ids {
        sqlx::query(
            r#"
            INSERT INTO review_slots (id, review_request_id, status, version)
            VALUES ($1, $2, 'available', 0)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(*slot_id)
        .bind(request.id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Write a slot snapshot unless a newer version is already stored.
///
/// Returns false when the snapshot was stale.
pub async fn upsert_slot(pool: &PgPool, slot: &ReviewSlot) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO review_slots
            (id, review_request_id, reviewer_id, status, version, claimed_at, claim_deadline,
             submitted_at, auto_accept_at, resolved_at, content, rating, helpful_rating,
             auto_accepted, payment_amount_cents, payment_status, escrow_id,
             rejection_reason, rejection_notes, elaboration_count, elaboration_requests,
             dispute_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22)
        ON CONFLICT (id) DO UPDATE SET
            reviewer_id = EXCLUDED.reviewer_id,
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            claimed_at = EXCLUDED.claimed_at,
            claim_deadline = EXCLUDED.claim_deadline,
            submitted_at = EXCLUDED.submitted_at,
            auto_accept_at = EXCLUDED.auto_accept_at,
            resolved_at = EXCLUDED.resolved_at,
            content = EXCLUDED.content,
            rating = EXCLUDED.rating,
            helpful_rating = EXCLUDED.helpful_rating,
            auto_accepted = EXCLUDED.auto_accepted,
            payment_amount_cents = EXCLUDED.payment_amount_cents,
            payment_status = EXCLUDED.payment_status,
            escrow_id = EXCLUDED.escrow_id,
            rejection_reason = EXCLUDED.rejection_reason,
            rejection_notes = EXCLUDED.rejection_notes,
            elaboration_count = EXCLUDED.elaboration_count,
            elaboration_requests = EXCLUDED.elaboration_requests,
            dispute_reason = EXCLUDED.dispute_reason
        WHERE review_slots.version < EXCLUDED.version
        "#,
    )
    .bind(slot.id)
    .bind(slot.review_request_id)
    .bind(slot.reviewer_id)
    .bind(slot.status.as_str())
    .bind(big(slot.version))
    .bind(slot.claimed_at)
    .bind(slot.claim_deadline)
    .bind(slot.submitted_at)
    .bind(slot.auto_accept_at)
    .bind(slot.resolved_at)
    .bind(slot.content.as_deref())
    .bind(slot.rating.map(i16::from))
    .bind(slot.helpful_rating.map(i16::from))
    .bind(slot.auto_accepted)
    .bind(slot.payment_amount_cents)
    .bind(slot.payment_status.map(|status| status.as_str()))
    .bind(slot.escrow_id)
    .bind(slot.rejection_reason.as_deref())
    .bind(slot.rejection_notes.as_deref())
    .bind(small(slot.elaboration_count))
    .bind(Json(&slot.elaboration_requests))
    .bind(slot.dispute_reason.as_deref())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_karma_transaction(
    pool: &PgPool,
    tx: &KarmaTransaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO karma_transactions
            (id, sequence, user_id, action, points, reason, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(tx.id)
    .bind(big(tx.sequence))
    .bind(tx.user_id)
    .bind(tx.action.as_str())
    .bind(tx.points)
    .bind(&tx.reason)
    .bind(Json(&tx.metadata))
    .bind(tx.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Karma history with `from <= created_at < to`, oldest first. `sequence` only
/// breaks ties since it restarts with the process.
pub async fn karma_between(
    pool: &PgPool,
    user_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<KarmaTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, KarmaRow>(
        r#"
        SELECT id, sequence, user_id, action, points, reason, metadata, created_at
        FROM karma_transactions
        WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
        ORDER BY created_at, sequence
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(KarmaRow::into_transaction).collect())
}

pub async fn upsert_escrow(pool: &PgPool, record: &EscrowRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO escrow_records
            (id, slot_id, payer_id, payee_id, amount_cents, platform_fee_cents,
             reviewer_payout_cents, state, created_at, resolved_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            state = EXCLUDED.state,
            resolved_at = EXCLUDED.resolved_at
        "#,
    )
    .bind(record.id)
    .bind(record.slot_id)
    .bind(record.payer_id)
    .bind(record.payee_id)
    .bind(record.amount_cents)
    .bind(record.platform_fee_cents)
    .bind(record.reviewer_payout_cents)
    .bind(record.state.as_str())
    .bind(record.created_at)
    .bind(record.resolved_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_escrow_movement(
    pool: &PgPool,
    movement: &EscrowMovement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO escrow_movements (sequence, escrow_id, from_state, to_state, amount_cents, at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (escrow_id, sequence) DO NOTHING
        "#,
    )
    .bind(big(movement.sequence))
    .bind(movement.escrow_id)
    .bind(movement.from.as_str())
    .bind(movement.to.as_str())
    .bind(movement.amount_cents)
    .bind(movement.at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply one event to the tables.
pub async fn project(pool: &PgPool, event: &MarketEvent) -> Result<(), sqlx::Error> {
    match event {
        MarketEvent::RequestCreated { request } => {
            upsert_request(pool, request).await?;
            seed_slots(pool, request).await?;
        }
        MarketEvent::SlotChanged { slot, request, .. } => {
            upsert_request(pool, request).await?;
            if !upsert_slot(pool, slot).await? {
                debug!(slot_id = %slot.id, version = slot.version, "Stale slot snapshot skipped");
            }
        }
        MarketEvent::KarmaRecorded { transaction } => {
            insert_karma_transaction(pool, transaction).await?;
        }
        MarketEvent::EscrowMoved { record, movement } => {
            upsert_escrow(pool, record).await?;
            insert_escrow_movement(pool, movement).await?;
        }
        MarketEvent::ElaborationRequested { .. } => {}
    }
    Ok(())
}

/// Mirror every bus event into Postgres until the bus closes.
pub fn spawn_projector(pool: DbPool, mut events: broadcast::Receiver<MarketEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Postgres projector started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = project(pool.as_ref(), &event).await {
                        error!(event = event.name(), error = %e, "Failed to project event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Projector fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Postgres projector stopped");
    })
}
