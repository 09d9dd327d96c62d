use std::time::Duration;

use neurovisor::{Config, EventKind, Payload, Runtime};
use serde_json::json;

#[tokio::test]
async fn terminated_subscriber_gets_nothing() {
    let rt = Runtime::builder(Config::default()).build();
    let mut events = rt.events();
    let bus = rt.bus();

    let (gone, gone_inbox) = bus.subscriber();
    let (stays, mut stays_inbox) = bus.subscriber();
    bus.subscribe("spikes", &gone).await.expect("subscribe");
    bus.subscribe("spikes", &stays).await.expect("subscribe");

    drop(gone_inbox);
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let ev = events.recv().await.expect("event");
            if ev.kind == EventKind::SubscriberDown && ev.subscriber == Some(gone.id()) {
                break;
            }
        }
    })
    .await
    .expect("subscriber cleaned up");

    assert_eq!(bus.subscriber_count("spikes").await.expect("count"), 1);
    bus.broadcast("spikes", json!({ "v": 1 }), &[]).expect("broadcast");
    let got = stays_inbox.recv().await.expect("delivery");
    assert_eq!(got.payload["v"], 1);
    assert!(!gone.is_alive());
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn history_keeps_the_latest_thousand() {
    let rt = Runtime::builder(Config::default()).build();
    let bus = rt.bus();
    for n in 0..1200u64 {
        bus.broadcast("ticks", Payload::from(n), &[]).expect("broadcast");
    }

    let history = bus.history().await.expect("history");
    assert_eq!(history.len(), 1000);
    let seq: Vec<u64> = history.iter().filter_map(|e| e.payload.as_u64()).collect();
    assert_eq!(seq, (200..1200).collect::<Vec<_>>());
    rt.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn per_subscriber_fifo() {
    let rt = Runtime::builder(Config::default()).build();
    let bus = rt.bus();
    let (sub, mut inbox) = bus.subscriber();
    bus.subscribe("a", &sub).await.expect("subscribe");
    bus.subscribe("b", &sub).await.expect("subscribe");

    for n in 0..10 {
        let topic = if n % 2 == 0 { "a" } else { "b" };
        bus.publish(topic, json!(n)).expect("publish");
    }
    for n in 0..10 {
        let d = inbox.recv().await.expect("delivery");
        assert_eq!(d.payload, json!(n));
    }
    assert_eq!(bus.topics().await.expect("topics"), ["a", "b"]);
    rt.shutdown().await.expect("shutdown");
}
