//! Redis-backed queue integration tests.
//!
//! These exercise a live Redis (`REDIS_URL`, default localhost) and are
//! ignored by default. Each test isolates itself under a random key
//! prefix.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use edumart_models::{JobId, WishlistAction};
use edumart_queue::{
    BackoffPolicy, FailureRetention, JobDelivery, JobError, JobHandler, JobOptions, JobQueue,
    QueueConfig, RepeatPolicy, Scheduler, SubscriptionSweepJob, WishlistJob, WorkerOptions,
    WorkerRuntime,
};

fn test_config() -> QueueConfig {
    dotenvy::dotenv().ok();
    QueueConfig {
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        prefix: format!("edumart-test-{}", uuid::Uuid::new_v4().simple()),
        dedup_ttl: Duration::from_secs(60),
    }
}

fn wishlist_job(student: &str) -> WishlistJob {
    WishlistJob {
        student_id: student.to_string(),
        course_id: "c1".to_string(),
        action: WishlistAction::Add,
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_consume_ack_cycle() {
    let queue: JobQueue<WishlistJob> = JobQueue::new(test_config()).expect("create queue");
    queue.init().await.expect("init");

    let job_id = queue.enqueue(wishlist_job("st1")).await.expect("enqueue");

    let jobs = queue.consume("test-consumer", 1000, 1).await.expect("consume");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].envelope.id, job_id);
    assert_eq!(jobs[0].attempts_made, 0);
    assert_eq!(jobs[0].envelope.name, "wishlist");

    queue.ack(&jobs[0].message_id, true).await.expect("ack");
    assert_eq!(queue.len().await.expect("len"), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn caller_supplied_id_enqueue_is_idempotent() {
    let queue: JobQueue<SubscriptionSweepJob> = JobQueue::new(test_config()).expect("create queue");
    queue.init().await.expect("init");

    let id = JobId::from_string("daily-expiration-check@1754300000");
    let job = SubscriptionSweepJob::default();

    queue
        .enqueue_with_id(id.clone(), job.clone(), JobOptions::default())
        .await
        .expect("first enqueue");
    // Same id again: a no-op, not a duplicate.
    queue
        .enqueue_with_id(id.clone(), job, JobOptions::default())
        .await
        .expect("second enqueue");

    assert_eq!(queue.len().await.expect("len"), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn recurring_registration_produces_one_schedule() {
    let queue: Arc<JobQueue<SubscriptionSweepJob>> =
        Arc::new(JobQueue::new(test_config()).expect("create queue"));
    queue.init().await.expect("init");

    let scheduler = Scheduler::new(Arc::clone(&queue)).expect("scheduler");
    let repeat = RepeatPolicy::daily("0 1 * * *", "Asia/Kolkata");
    let job = SubscriptionSweepJob::default();

    let first = scheduler
        .register("daily-expiration-check", repeat.clone(), job.clone(), JobOptions::default())
        .await
        .expect("register");
    let second = scheduler
        .register("daily-expiration-check", repeat, job, JobOptions::default())
        .await
        .expect("re-register");

    assert!(first);
    assert!(!second, "re-registration must be a no-op");

    // Two ticks fire the current slot exactly once.
    let now = chrono::Utc::now();
    let fired_first = scheduler.tick_once(now).await.expect("tick");
    let fired_second = scheduler.tick_once(now).await.expect("tick again");
    assert_eq!(fired_first, 1);
    assert_eq!(fired_second, 0);
    assert_eq!(queue.len().await.expect("len"), 1);
}

struct FlakyHandler {
    calls: AtomicU32,
    fail_first: u32,
    invocations: Mutex<Vec<Instant>>,
}

#[async_trait]
impl JobHandler<WishlistJob> for FlakyHandler {
    async fn handle(&self, _job: JobDelivery<WishlistJob>) -> Result<(), JobError> {
        self.invocations.lock().unwrap().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(JobError::retryable("transient failure"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn failing_handler_retries_with_backoff_then_succeeds() {
    let backoff = Duration::from_millis(400);
    let queue: Arc<JobQueue<WishlistJob>> =
        Arc::new(JobQueue::new(test_config()).expect("create queue"));
    // Create the consumer group before the first enqueue; the group
    // only sees messages added after it exists.
    queue.init().await.expect("init");

    let handler = Arc::new(FlakyHandler {
        calls: AtomicU32::new(0),
        fail_first: 2,
        invocations: Mutex::new(Vec::new()),
    });

    let options = WorkerOptions {
        concurrency: 1,
        promote_interval: Duration::from_millis(50),
        ..WorkerOptions::default()
    };
    let runtime =
        WorkerRuntime::new(Arc::clone(&queue), Arc::clone(&handler), options).expect("runtime");
    let runner = Arc::new(runtime);
    let run_handle = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run().await })
    };

    let opts = JobOptions::default()
        .with_attempts(3)
        .with_backoff(BackoffPolicy::fixed(backoff));
    queue
        .enqueue_with_opts(wishlist_job("st-flaky"), opts)
        .await
        .expect("enqueue");

    // Two failures + one success, spaced by the backoff.
    tokio::time::timeout(Duration::from_secs(10), async {
        while handler.calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("job never reached its third attempt");

    // Give the ack a moment, then stop the worker.
    tokio::time::sleep(Duration::from_millis(200)).await;
    runner.shutdown();
    run_handle.await.expect("join").expect("run");

    assert_eq!(handler.calls.load(Ordering::SeqCst), 3, "exactly k+1 invocations");

    let invocations = handler.invocations.lock().unwrap();
    for pair in invocations.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= backoff,
            "inter-attempt delay {:?} below configured backoff {:?}",
            gap,
            backoff
        );
    }

    assert_eq!(queue.dlq_len().await.expect("dlq"), 0);
}

struct AlwaysTerminal;

#[async_trait]
impl JobHandler<WishlistJob> for AlwaysTerminal {
    async fn handle(&self, _job: JobDelivery<WishlistJob>) -> Result<(), JobError> {
        Err(JobError::terminal("actor is not a student"))
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn terminal_errors_dead_letter_without_retries() {
    let queue: Arc<JobQueue<WishlistJob>> =
        Arc::new(JobQueue::new(test_config()).expect("create queue"));
    queue.init().await.expect("init");

    let options = WorkerOptions {
        concurrency: 1,
        promote_interval: Duration::from_millis(50),
        ..WorkerOptions::default()
    };
    let runtime = Arc::new(
        WorkerRuntime::new(Arc::clone(&queue), AlwaysTerminal, options).expect("runtime"),
    );
    let run_handle = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run().await })
    };

    let opts = JobOptions::default()
        .with_attempts(5)
        .with_failure_retention(FailureRetention::Keep(10));
    queue
        .enqueue_with_opts(wishlist_job("st-terminal"), opts)
        .await
        .expect("enqueue");

    tokio::time::timeout(Duration::from_secs(10), async {
        while queue.dlq_len().await.unwrap_or(0) == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("job never reached the DLQ");

    runtime.shutdown();
    run_handle.await.expect("join").expect("run");

    assert_eq!(queue.dlq_len().await.expect("dlq"), 1);
    assert_eq!(queue.delayed_len().await.expect("delayed"), 0, "no retry was parked");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn room_channel_delivers_to_subscribers_only() {
    use edumart_models::{RealtimeEvent, Room};
    use edumart_queue::{RealtimePublisher, RoomChannel};
    use futures_util::StreamExt;

    dotenvy::dotenv().ok();
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let channel = RoomChannel::new(&redis_url).expect("room channel");

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let room_x = Room::Institution(format!("x-{}", suffix));
    let room_y = Room::Institution(format!("y-{}", suffix));

    let mut stream_x = channel.subscribe(&room_x).await.expect("subscribe x");
    let mut stream_y = channel.subscribe(&room_y).await.expect("subscribe y");

    // Subscription setup races the publish without a settle delay.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let event = RealtimeEvent::course_views_updated(room_x.id(), "c1", 10);
    channel.emit_to_room(&room_x, &event).await.expect("publish");

    let received = tokio::time::timeout(Duration::from_secs(5), stream_x.next())
        .await
        .expect("timed out")
        .expect("stream ended");
    assert_eq!(received, event);

    // The other room must stay silent.
    let silent = tokio::time::timeout(Duration::from_millis(500), stream_y.next()).await;
    assert!(silent.is_err(), "room isolation violated");
}
