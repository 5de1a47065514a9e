//! Redis queue integration tests.

use std::time::Duration;

use pixpool_models::JobId;
use pixpool_queue::{NotifyMessage, PersistentQueue, QueueConfig, RedisQueue};

fn test_queue<T>() -> RedisQueue<T> {
    dotenvy::dotenv().ok();
    let config = QueueConfig::from_env();
    let name = format!("pixpool:test:{}", uuid::Uuid::new_v4());
    RedisQueue::new(&config.redis_url, name).expect("Failed to create queue")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_push_pop_fifo() {
    let queue = test_queue::<NotifyMessage>();

    for id in 1..=3 {
        queue
            .push(NotifyMessage::running(7, JobId(id)))
            .await
            .expect("Failed to push");
    }
    assert_eq!(queue.len().await.unwrap(), 3);

    for id in 1..=3 {
        let msg = queue.pop_blocking().await.expect("Failed to pop");
        assert_eq!(msg.job_id, JobId(id));
    }
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_pop_timeout_returns_none_when_empty() {
    let queue = test_queue::<NotifyMessage>();
    let popped = queue
        .pop_timeout(Duration::from_millis(200))
        .await
        .expect("Failed to pop");
    assert!(popped.is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_malformed_payload_is_discarded() {
    use redis::AsyncCommands;

    let queue = test_queue::<NotifyMessage>();
    let config = QueueConfig::from_env();
    let client = redis::Client::open(config.redis_url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    conn.rpush::<_, _, ()>(queue.name(), "{not json").await.unwrap();

    let popped = queue.pop_timeout(Duration::from_millis(200)).await.unwrap();
    assert!(popped.is_none());
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unreachable_store_reports_error() {
    let queue: RedisQueue<NotifyMessage> =
        RedisQueue::new("redis://127.0.0.1:1", "pixpool:unreachable").unwrap();
    let err = queue
        .pop_timeout(Duration::from_millis(100))
        .await
        .expect_err("pop must fail");
    assert!(err.is_recoverable());
}
