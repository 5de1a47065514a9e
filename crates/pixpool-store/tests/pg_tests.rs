//! PostgreSQL store integration tests.

use pixpool_models::{JobKind, NewJob, Progress};
use pixpool_store::{
    connect, CreditLedger, JobFilter, JobStore, PgCreditLedger, PgJobStore, StoreConfig,
    StoreError,
};
use sqlx::PgPool;

async fn pool() -> PgPool {
    dotenvy::dotenv().ok();
    connect(&StoreConfig::from_env())
        .await
        .expect("Failed to connect to Postgres")
}

async fn seed_user(pool: &PgPool, power: i64) -> i64 {
    let (id,): (i64,) = sqlx::query_as("INSERT INTO users (power) VALUES ($1) RETURNING id")
        .bind(power)
        .fetch_one(pool)
        .await
        .expect("Failed to seed user");
    id
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_job_lifecycle() {
    let pool = pool().await;
    let store = PgJobStore::new(pool.clone());
    let user_id = seed_user(&pool, 0).await;

    let mut job = store
        .create(NewJob {
            kind: JobKind::Upscale,
            user_id,
            prompt: "a cat --ar 16:9".into(),
            reference_id: Some("msg-1".into()),
            credit_cost: 5,
        })
        .await
        .expect("Failed to create job");
    assert_eq!(job.progress, Progress::Percent(0));

    job.bind("task-pg-1", "A");
    job.progress = Progress::Percent(40);
    store.update(&job).await.expect("Failed to update job");

    let found = store
        .find_by_task_id("task-pg-1")
        .await
        .unwrap()
        .expect("job by task id");
    assert_eq!(found.id, job.id);
    assert_eq!(found.kind, JobKind::Upscale);
    assert_eq!(found.channel_id.as_deref(), Some("A"));

    let in_flight = store.list_in_flight().await.unwrap();
    assert!(in_flight.iter().any(|j| j.id == job.id));

    let mut stale = job.clone();
    job.fail("NSFW content");
    store.update(&job).await.unwrap();

    stale.progress = Progress::Percent(100);
    assert!(matches!(
        store.update(&stale).await,
        Err(StoreError::AlreadyFailed(_))
    ));
    let finished = store
        .list(&JobFilter::for_user(user_id).finished(true))
        .await
        .unwrap();
    assert_eq!(finished.len(), 1);
    assert!(finished[0].progress.is_failed());

    assert!(store.set_publish(job.id, true).await.unwrap());
    assert!(store.delete(job.id).await.unwrap());
    assert!(store.get(job.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_ledger_debit_and_credit() {
    let pool = pool().await;
    let ledger = PgCreditLedger::new(pool.clone());
    let user_id = seed_user(&pool, 20).await;

    let entry = ledger.debit(user_id, 15, "mid-journey", "Generate").await.unwrap();
    assert_eq!(entry.balance_after, 5);

    let err = ledger
        .debit(user_id, 10, "mid-journey", "Generate")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientCredits { balance: 5, .. }));

    let refund = ledger.credit(user_id, 15, "mid-journey", "Refund").await.unwrap();
    assert_eq!(refund.balance_after, 20);

    let (logs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credit_logs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logs, 2);
}
