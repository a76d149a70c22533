//! Background worker binary: queue workers, repeat scheduler and
//! change-stream watchers in one process.

use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edumart_queue::{
    AnalyticsJob, EmailJob, JobOptions, JobQueue, NotificationJob, QueueConfig, RealtimePublisher,
    RepeatPolicy, RoomChannel, Scheduler, SubscriptionSweepJob, WishlistJob, WorkerOptions,
    WorkerRuntime,
};
use edumart_store::{DocumentStore, MemoryStore};
use edumart_worker::{
    AnalyticsHandler, CourseWatcher, EmailHandler, EnquiryWatcher, Mailer, NotificationHandler,
    SubscriptionHandler, TracingMailer, WishlistHandler, WorkerConfig,
};

fn must<T, E: Display>(result: Result<T, E>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to create {}: {}", what, e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("edumart=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting edumart-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);
    let queue_config = QueueConfig::from_env();

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);
    if metrics_enabled {
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
            warn!("Failed to install Prometheus exporter: {}", e);
        }
    }

    // Primary document store. The embedded backend keeps a single-node
    // deployment self-contained; a server-backed driver plugs in behind
    // the same trait.
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    // Broadcast layer, shared by reference with every publisher.
    let publisher: Arc<dyn RealtimePublisher> =
        Arc::new(must(RoomChannel::from_env(), "room channel"));

    let mailer: Arc<dyn Mailer> = Arc::new(TracingMailer);

    // One queue client per queue, each with its own Redis connection.
    let analytics_queue = Arc::new(must(
        JobQueue::<AnalyticsJob>::new(queue_config.clone()),
        "analytics queue",
    ));
    let email_queue = Arc::new(must(
        JobQueue::<EmailJob>::new(queue_config.clone()),
        "email queue",
    ));
    let notification_queue = Arc::new(must(
        JobQueue::<NotificationJob>::new(queue_config.clone()),
        "notification queue",
    ));
    let subscription_queue = Arc::new(must(
        JobQueue::<SubscriptionSweepJob>::new(queue_config.clone()),
        "subscription queue",
    ));
    let wishlist_queue = Arc::new(must(
        JobQueue::<WishlistJob>::new(queue_config),
        "wishlist queue",
    ));

    let analytics_worker = Arc::new(must(
        WorkerRuntime::new(
            Arc::clone(&analytics_queue),
            AnalyticsHandler::new(Arc::clone(&mailer)),
            WorkerOptions::default().with_concurrency(config.analytics_concurrency),
        ),
        "analytics worker",
    ));
    let email_worker = Arc::new(must(
        WorkerRuntime::new(
            Arc::clone(&email_queue),
            EmailHandler::new(Arc::clone(&mailer)),
            WorkerOptions::default()
                .with_concurrency(config.email_concurrency)
                .with_rate_limit(config.email_rate_limit),
        ),
        "email worker",
    ));
    let notification_worker = Arc::new(must(
        WorkerRuntime::new(
            Arc::clone(&notification_queue),
            NotificationHandler::new(Arc::clone(&store), Arc::clone(&publisher)),
            WorkerOptions::default().with_concurrency(config.notification_concurrency),
        ),
        "notification worker",
    ));
    let subscription_worker = Arc::new(must(
        WorkerRuntime::new(
            Arc::clone(&subscription_queue),
            SubscriptionHandler::new(Arc::clone(&store)),
            WorkerOptions::default().with_concurrency(config.subscription_concurrency),
        ),
        "subscription worker",
    ));
    let wishlist_worker = Arc::new(must(
        WorkerRuntime::new(
            Arc::clone(&wishlist_queue),
            WishlistHandler::new(Arc::clone(&store)),
            WorkerOptions::default().with_concurrency(config.wishlist_concurrency),
        ),
        "wishlist worker",
    ));

    // Idempotent: a second worker registering the same id is a no-op.
    let scheduler = must(
        Scheduler::new(Arc::clone(&subscription_queue)),
        "sweep scheduler",
    );
    must(
        scheduler
            .register(
                "daily-expiration-check",
                RepeatPolicy::daily(config.sweep_cron.clone(), config.sweep_timezone.clone()),
                SubscriptionSweepJob::default(),
                JobOptions::default(),
            )
            .await,
        "sweep registration",
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks: JoinSet<anyhow::Result<&'static str>> = JoinSet::new();
    {
        let rt = Arc::clone(&analytics_worker);
        tasks.spawn(async move {
            rt.run().await?;
            Ok("analytics worker")
        });
    }
    {
        let rt = Arc::clone(&email_worker);
        tasks.spawn(async move {
            rt.run().await?;
            Ok("email worker")
        });
    }
    {
        let rt = Arc::clone(&notification_worker);
        tasks.spawn(async move {
            rt.run().await?;
            Ok("notification worker")
        });
    }
    {
        let rt = Arc::clone(&subscription_worker);
        tasks.spawn(async move {
            rt.run().await?;
            Ok("subscription worker")
        });
    }
    {
        let rt = Arc::clone(&wishlist_worker);
        tasks.spawn(async move {
            rt.run().await?;
            Ok("wishlist worker")
        });
    }
    {
        let rx = shutdown_rx.clone();
        tasks.spawn(async move {
            scheduler.run(rx).await;
            Ok("sweep scheduler")
        });
    }
    {
        let watcher = CourseWatcher::new(Arc::clone(&store), Arc::clone(&publisher));
        tasks.spawn(async move {
            watcher.run().await;
            Ok("course watcher")
        });
    }
    {
        let watcher = EnquiryWatcher::new(Arc::clone(&store), Arc::clone(&publisher));
        tasks.spawn(async move {
            watcher.run().await;
            Ok("enquiry watcher")
        });
    }
    drop(shutdown_rx);

    let orderly = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        // Fail fast: none of the core tasks is expected to finish.
        Some(result) = tasks.join_next() => {
            match result {
                Ok(Ok(name)) => error!("{} exited unexpectedly", name),
                Ok(Err(e)) => error!("Fatal worker error: {}", e),
                Err(e) => error!("Worker task panicked: {}", e),
            }
            false
        }
    };

    if !orderly {
        std::process::exit(1);
    }

    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
    analytics_worker.shutdown();
    email_worker.shutdown();
    notification_worker.shutdown();
    subscription_worker.shutdown();
    wishlist_worker.shutdown();

    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!("Shutdown grace period elapsed, aborting remaining tasks");
        tasks.abort_all();
    }

    info!("Worker shutdown complete");
}
