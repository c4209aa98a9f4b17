//! Runs against a live Postgres when `DATABASE_URL` is set, otherwise each
//! test returns early.

use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use review_market::db;
use review_market::escrow::{EscrowMovement, EscrowRecord, EscrowState};
use review_market::events::MarketEvent;
use review_market::reputation::{KarmaAction, KarmaMetadata, KarmaTransaction};

async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(pool.as_ref()).await.unwrap();
    Some(pool.as_ref().clone())
}

fn escrow_moved(sequence: u64) -> (Uuid, MarketEvent) {
    let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
    let record = EscrowRecord {
        id: Uuid::new_v4(),
        slot_id: Uuid::new_v4(),
        payer_id: Uuid::new_v4(),
        payee_id: Uuid::new_v4(),
        amount_cents: 10_000,
        platform_fee_cents: 1_000,
        reviewer_payout_cents: 9_000,
        state: EscrowState::Escrowed,
        created_at: at,
        resolved_at: None,
    };
    let movement = EscrowMovement {
        sequence,
        escrow_id: record.id,
        from: EscrowState::Pending,
        to: EscrowState::Escrowed,
        amount_cents: record.amount_cents,
        at,
    };
    (record.id, MarketEvent::EscrowMoved { record, movement })
}

fn karma(user_id: Uuid, sequence: u64, created_at: chrono::DateTime<Utc>) -> KarmaTransaction {
    KarmaTransaction {
        id: Uuid::new_v4(),
        sequence,
        user_id,
        action: KarmaAction::Referral,
        points: 25,
        reason: format!("entry {}", sequence),
        metadata: KarmaMetadata::default(),
        created_at,
    }
}

#[tokio::test]
async fn test_movements_from_separate_runs_are_all_kept() {
    let Some(pool) = pool().await else {
        return;
    };

    // both processes start counting at 1
    let (first, before_restart) = escrow_moved(1);
    let (second, after_restart) = escrow_moved(1);
    db::project(&pool, &before_restart).await.unwrap();
    db::project(&pool, &after_restart).await.unwrap();

    for escrow_id in [first, second] {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM escrow_movements WHERE escrow_id = $1")
                .bind(escrow_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    // replaying the same event stays idempotent
    db::project(&pool, &after_restart).await.unwrap();
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM escrow_movements WHERE escrow_id = $1")
            .bind(second)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_karma_history_is_ordered_by_time_across_runs() {
    let Some(pool) = pool().await else {
        return;
    };

    let user = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
    let older = karma(user, 40, start);
    let newer = karma(user, 1, start + Duration::hours(2));
    db::insert_karma_transaction(&pool, &newer).await.unwrap();
    db::insert_karma_transaction(&pool, &older).await.unwrap();

    let history = db::karma_between(&pool, user, start, start + Duration::days(1))
        .await
        .unwrap();
    let ids: Vec<Uuid> = history.iter().map(|tx| tx.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}
