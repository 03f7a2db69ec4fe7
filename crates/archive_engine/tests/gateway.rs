mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use archive_engine::{ApiError, Gateway, GatewaySettings, Params};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use support::{init_logging, FakeApi};

fn settings(requests_per_second: u32) -> GatewaySettings {
    GatewaySettings {
        requests_per_second,
        initial_backoff: Duration::from_millis(200),
        max_backoff: Duration::from_secs(2),
        ..GatewaySettings::default()
    }
}

fn ok_api() -> Arc<FakeApi> {
    Arc::new(FakeApi::new(|_, _| Ok(json!({"ok": 1}))))
}

fn assert_window(times: &[Instant], per_window: usize) {
    for pair in times.windows(per_window + 1) {
        let spread = pair[per_window] - pair[0];
        assert!(
            spread >= Duration::from_secs(1),
            "{} calls started within {spread:?}",
            per_window + 1
        );
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_workers_share_one_rate_window() {
    init_logging();
    let api = ok_api();
    let gateway = Arc::new(Gateway::new(api.clone(), settings(3), CancellationToken::new()));
    let start = Instant::now();

    let workers = (0..10).map(|worker| {
        let gateway = gateway.clone();
        async move {
            for page in 0..3 {
                let params = Params::new().with("worker", worker).with("page", page);
                gateway.call("wall.get", &params).await.unwrap();
            }
        }
    });
    join_all(workers).await;

    let times = api.start_times();
    assert_eq!(times.len(), 30);
    assert_window(&times, 3);
    assert!(start.elapsed() >= Duration::from_secs(9));
    assert_eq!(gateway.stats().await.calls, 30);
}

#[tokio::test(start_paused = true)]
async fn slow_calls_do_not_widen_the_window() {
    init_logging();
    let api = Arc::new(FakeApi::new(|_, _| Ok(Value::Null)).with_latency(Duration::from_millis(700)));
    let gateway = Arc::new(Gateway::new(api.clone(), settings(2), CancellationToken::new()));

    let calls = (0..8).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.call("users.get", &Params::new()).await }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_window(&api.start_times(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    init_logging();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let api = Arc::new(FakeApi::new(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ApiError::Transient("connection reset".into()))
        } else {
            Ok(json!([1]))
        }
    }));
    let gateway = Gateway::new(api.clone(), settings(100), CancellationToken::new());
    let start = Instant::now();

    let value = gateway.call("users.get", &Params::new()).await;

    assert_eq!(value, Ok(json!([1])));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // 200ms + 400ms of backoff.
    assert!(start.elapsed() >= Duration::from_millis(600));
    let stats = gateway.stats().await;
    assert_eq!((stats.calls, stats.retries), (3, 2));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_five_attempts() {
    init_logging();
    let api = Arc::new(FakeApi::new(|_, _| Err(ApiError::RateLimitExceeded)));
    let gateway = Gateway::new(api.clone(), settings(100), CancellationToken::new());

    let result = gateway.call("wall.get", &Params::new()).await;

    assert_eq!(result, Err(ApiError::RateLimitExceeded));
    assert_eq!(api.count("wall.get"), 5);
}

#[tokio::test(start_paused = true)]
async fn remote_errors_are_not_retried() {
    init_logging();
    let api = Arc::new(FakeApi::new(|_, _| {
        Err(ApiError::Remote {
            code: 15,
            message: "Access denied".into(),
        })
    }));
    let gateway = Gateway::new(api.clone(), settings(3), CancellationToken::new());

    let result = gateway.call("wall.get", &Params::new()).await;

    assert!(matches!(result, Err(ApiError::Remote { code: 15, .. })));
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn daily_budget_fails_fast_once_spent() {
    init_logging();
    let api = ok_api();
    let gateway = Gateway::new(
        api.clone(),
        GatewaySettings {
            daily_limit: 3,
            ..settings(10)
        },
        CancellationToken::new(),
    );

    for _ in 0..3 {
        gateway.call("users.get", &Params::new()).await.unwrap();
    }
    for _ in 0..2 {
        assert_eq!(
            gateway.call("users.get", &Params::new()).await,
            Err(ApiError::QuotaExhausted)
        );
    }

    assert_eq!(api.calls().len(), 3);
    assert!(gateway.stats().await.quota_exhausted);
}

#[tokio::test(start_paused = true)]
async fn remote_quota_error_latches() {
    init_logging();
    let api = Arc::new(FakeApi::new(|_, _| Err(ApiError::QuotaExhausted)));
    let gateway = Gateway::new(api.clone(), settings(10), CancellationToken::new());

    assert_eq!(gateway.call("wall.get", &Params::new()).await, Err(ApiError::QuotaExhausted));
    assert_eq!(gateway.call("wall.get", &Params::new()).await, Err(ApiError::QuotaExhausted));
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    init_logging();
    let api = Arc::new(FakeApi::new(|_, _| Err(ApiError::Transient("down".into()))));
    let cancel = CancellationToken::new();
    let gateway = Arc::new(Gateway::new(
        api.clone(),
        GatewaySettings {
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30),
            ..settings(10)
        },
        cancel.clone(),
    ));
    let start = Instant::now();

    let task = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.call("wall.get", &Params::new()).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert_eq!(task.await.unwrap(), Err(ApiError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(api.calls().len(), 1);
    assert_eq!(
        gateway.call("wall.get", &Params::new()).await,
        Err(ApiError::Cancelled)
    );
}
