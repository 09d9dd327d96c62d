use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use neurovisor::{
    BackoffPolicy, Config, EventKind, Payload, RestartPolicy, Runtime, RuntimeError, Worker,
    WorkerConfig, WorkerContext, WorkerError, WorkerFn, WorkerSpec, WorkerStatus,
};

/// Counts messages; panics on "crash"; reports its attempt and count.
struct Tally {
    seen: u64,
}

#[async_trait]
impl Worker for Tally {
    async fn handle(&mut self, msg: Payload, _ctx: &WorkerContext) -> Result<(), WorkerError> {
        if msg == "crash" {
            panic!("crash requested");
        }
        self.seen += 1;
        Ok(())
    }

    async fn state(&self, ctx: &WorkerContext) -> Result<Payload, WorkerError> {
        Ok(serde_json::json!({ "attempt": ctx.attempt, "seen": self.seen }))
    }
}

fn tally(id: &str) -> WorkerSpec {
    WorkerSpec::new(
        WorkerConfig::new(id),
        WorkerFn::arc(|_cfg: &WorkerConfig| Tally { seen: 0 }),
        RestartPolicy::OnFailure,
        BackoffPolicy::constant(Duration::from_millis(5)),
    )
}

const Q: Duration = Duration::from_secs(1);

#[tokio::test]
async fn count_list_and_double_stop() {
    let rt = Runtime::builder(Config::default()).build();
    let sup = rt.supervisor();

    let a = sup.start(tally("a")).await.expect("start a");
    let _b = sup.start(tally("b")).await.expect("start b");
    let count = sup.count().await.expect("count");
    assert_eq!((count.active, count.total), (2, 2));

    sup.stop(&a).await.expect("stop a");
    let err = sup.stop(&a).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NotFound { .. }));

    let ids: Vec<String> = sup
        .list()
        .await
        .expect("list")
        .iter()
        .map(|h| h.id().to_string())
        .collect();
    assert_eq!(ids, ["b"]);
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn crash_restarts_with_same_handle_and_fresh_state() {
    let rt = Runtime::builder(Config::default()).build();
    let mut events = rt.events();
    let h = rt.supervisor().start(tally("w")).await.expect("start");

    h.send(Payload::from(1)).expect("send");
    h.send(Payload::from(2)).expect("send");
    let before = h.query_state(Q).await.expect("state");
    assert_eq!(before["seen"], 2);

    h.send("crash".into()).expect("send");
    let after = h.query_state(Q).await.expect("state after restart");
    assert_eq!(after["attempt"], 2);
    assert_eq!(after["seen"], 0);
    assert_eq!(h.status(), WorkerStatus::Running);

    let mut saw_failure = false;
    while let Ok(ev) = events.try_recv() {
        saw_failure |= ev.kind == EventKind::WorkerFailed && ev.worker.as_deref() == Some("w");
    }
    assert!(saw_failure);
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn exhausted_budget_removes_worker() {
    let cfg = Config {
        max_restarts: 2,
        ..Config::default()
    };
    let rt = Runtime::builder(cfg).build();
    let builds = Arc::new(AtomicU32::new(0));
    let counter = builds.clone();
    let spec = WorkerSpec::new(
        WorkerConfig::new("flaky"),
        WorkerFn::arc(move |_cfg: &WorkerConfig| {
            counter.fetch_add(1, Ordering::SeqCst);
            Tally { seen: 0 }
        }),
        RestartPolicy::Always,
        BackoffPolicy::constant(Duration::from_millis(1)),
    );
    let h = rt.supervisor().start(spec).await.expect("start");

    for _ in 0..3 {
        // Each crash lands in the current incarnation's mailbox.
        let _ = h.query_state(Q).await;
        let _ = h.send("crash".into());
    }
    tokio::time::timeout(Q, h.closed()).await.expect("worker dies");
    assert_eq!(builds.load(Ordering::SeqCst), 3);

    // Exit notices are processed asynchronously by the supervisor.
    tokio::time::timeout(Q, async {
        while rt.supervisor().get("flaky").await.expect("get").is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("removed from registry");
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn restart_all_does_not_resurrect() {
    let rt = Runtime::builder(Config::default()).build();
    for id in ["x", "y", "z"] {
        rt.supervisor().start(tally(id)).await.expect("start");
    }
    assert_eq!(rt.supervisor().restart_all().await.expect("restart_all"), 3);
    assert_eq!(rt.supervisor().count().await.expect("count").total, 0);
    rt.shutdown().await.expect("shutdown");
}
