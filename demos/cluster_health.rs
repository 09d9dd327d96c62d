//! # Example: cluster health and routing
//!
//! Starts two clusters, exposes health and load through the router, stops a
//! member behind the manager's back and prints the reports.
//!
//! ```text
//! cargo run --example cluster_health --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use neurovisor::{
    Config, HEALTH_TOPIC, HandlerError, HandlerFn, LogWriter, Observe, Payload, RouteContext,
    Runtime,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    neurovisor::logging::init();

    let cfg = Config {
        default_cluster_size: 50,
        health_interval: Duration::from_millis(500),
        ..Config::default()
    };
    let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter::new())];
    let rt = Runtime::builder(cfg).with_observers(observers).build();

    let clusters = rt.clusters().clone();
    rt.router()
        .register(
            "cluster",
            "health",
            HandlerFn::arc(move |_p: Payload, _ctx: RouteContext| {
                let clusters = clusters.clone();
                async move { Ok::<_, HandlerError>(serde_json::to_value(clusters.health().await?)?) }
            }),
        )
        .await?;

    let (sub, mut inbox) = rt.bus().subscriber();
    rt.bus().subscribe(HEALTH_TOPIC, &sub).await?;

    let first = rt.clusters().start_default_cluster(1).await?;
    rt.clusters().start_cluster(2, 10).await?;

    for (token, worker) in first.iter().take(5) {
        worker.send(Payload::from(*token as f64 / 10.0))?;
    }
    if let Some(victim) = first.values().last() {
        rt.supervisor().stop(victim).await?;
    }

    let report = rt
        .router()
        .route("cluster", "health", Payload::Null, RouteContext::default())
        .await?;
    println!("health via router: overall = {}", report["overall"]);

    let load = rt.clusters().balance_load().await?;
    println!("load: average {:.1}, overloaded {:?}", load.average, load.overloaded);

    if let Some(d) = inbox.recv().await {
        println!("periodic health on {}: {}", d.topic, d.payload["overall"]);
    }

    rt.shutdown().await?;
    Ok(())
}
