use neurovisor::{
    Config, HandlerError, HandlerFn, Payload, RouteContext, Runtime, RuntimeError, WorkerConfig,
    WorkerSpec, Neuron,
};
use serde_json::json;

#[tokio::test]
async fn unknown_route_is_no_handler() {
    let rt = Runtime::builder(Config::default()).build();
    let err = rt
        .router()
        .route("neuron", "missing", Payload::Null, RouteContext::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RuntimeError::NoHandler {
            category: "neuron".into(),
            key: "missing".into()
        }
    );
    let stats = rt.router().stats().await.expect("stats");
    assert_eq!((stats.routed, stats.errors, stats.unmatched), (0, 0, 1));
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn panic_is_contained_and_counted_once() {
    let rt = Runtime::builder(Config::default()).build();
    let router = rt.router();
    router
        .register(
            "neuron",
            "explode",
            HandlerFn::arc(|_p: Payload, _ctx: RouteContext| async move {
                if true {
                    panic!("handler bug");
                }
                Ok::<Payload, HandlerError>(Payload::Null)
            }),
        )
        .await
        .expect("register");
    router
        .register(
            "neuron",
            "echo",
            HandlerFn::arc(|p: Payload, _ctx: RouteContext| async move { Ok::<_, HandlerError>(p) }),
        )
        .await
        .expect("register");

    let err = router
        .route("neuron", "explode", Payload::Null, RouteContext::default())
        .await
        .unwrap_err();
    match err {
        RuntimeError::InternalFault { reason, .. } => assert_eq!(reason, "handler bug"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(router.stats().await.expect("stats").errors, 1);

    let echoed = router
        .route("neuron", "echo", json!({ "ok": true }), RouteContext::default())
        .await
        .expect("router still responsive");
    assert_eq!(echoed, json!({ "ok": true }));
    let stats = router.stats().await.expect("stats");
    assert_eq!((stats.routed, stats.errors, stats.handlers), (1, 1, 2));
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn handlers_drive_other_components() {
    let rt = Runtime::builder(Config::default()).build();
    let sup = rt.supervisor().clone();
    let cfg = rt.config().clone();
    rt.router()
        .register(
            "neuron",
            "start",
            HandlerFn::arc(move |p: Payload, ctx: RouteContext| {
                let sup = sup.clone();
                let cfg = cfg.clone();
                async move {
                    let id = p["id"]
                        .as_str()
                        .ok_or_else(|| HandlerError::BadRequest("missing id".into()))?;
                    let spec = WorkerSpec::with_defaults(WorkerConfig::new(id), Neuron::factory(), &cfg);
                    let h = sup.start(spec).await?;
                    Ok::<_, HandlerError>(json!({ "started": h.id(), "by": ctx.caller }))
                }
            }),
        )
        .await
        .expect("register");

    let ctx = RouteContext::default().with_caller("test");
    let out = rt
        .router()
        .route("neuron", "start", json!({ "id": "n-1" }), ctx.clone())
        .await
        .expect("route");
    assert_eq!(out, json!({ "started": "n-1", "by": "test" }));

    let dup = rt
        .router()
        .route("neuron", "start", json!({ "id": "n-1" }), ctx)
        .await
        .unwrap_err();
    assert_eq!(dup.as_label(), "handler_failed");
    assert!(rt.supervisor().get("n-1").await.expect("get").is_some());
    rt.shutdown().await.expect("shutdown");
}
