use lithium_message_bus::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
struct Reading(pub u32);

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn broadcast_flow_carries_envelope() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe::<Reading>("device.focuser.position").unwrap();

    let reached = bus.publish("device.focuser.position", Reading(42)).unwrap();
    assert_eq!(reached, 1);

    let message = rx.recv().await.unwrap();
    assert_eq!(message.payload, Reading(42));
    assert_eq!(message.topic.as_str(), "device.focuser.position");
    assert!(message.sequence > 0);
}

#[tokio::test]
async fn publish_without_subscribers_reaches_nobody() {
    let bus = MessageBus::new();
    assert_eq!(bus.publish("nobody.listens", Reading(1)).unwrap(), 0);
    assert!(bus.topics().is_empty());
}

#[tokio::test]
async fn topics_and_types_are_isolated() {
    let bus = MessageBus::new();
    let mut camera = bus.subscribe::<Reading>("device.camera").unwrap();
    let mut focuser = bus.subscribe::<Reading>("device.focuser").unwrap();
    let mut camera_text = bus.subscribe::<String>("device.camera").unwrap();

    bus.publish("device.camera", Reading(7)).unwrap();
    bus.publish("device.focuser", Reading(13)).unwrap();
    bus.publish("device.camera", "exposing".to_owned()).unwrap();

    assert_eq!(camera.recv().await.unwrap().payload, Reading(7));
    assert_eq!(focuser.recv().await.unwrap().payload, Reading(13));
    assert_eq!(camera_text.recv().await.unwrap().payload, "exposing");
    assert!(camera.try_recv().is_err(), "camera receiver must not see focuser traffic");
}

#[tokio::test]
async fn lagged_receiver_recovers() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe_with_capacity::<Reading>("telemetry.tick", 2).unwrap();

    for i in 0..100 {
        bus.publish("telemetry.tick", Reading(i)).unwrap();
    }

    let first = MessageReceiverExt::recv(&mut rx).await.unwrap();
    assert!(first.payload.0 >= 98, "expected the tail of the buffer, got {}", first.payload.0);
    let second = MessageReceiverExt::recv(&mut rx).await.unwrap();
    assert_eq!(second.payload.0, first.payload.0 + 1);
}

#[tokio::test]
async fn invalid_topics_are_rejected() {
    let bus = MessageBus::new();
    assert!(matches!(bus.publish("", Reading(0)), Err(MessageBusError::InvalidTopic { .. })));
    assert!(matches!(
        bus.subscribe::<Reading>("has space"),
        Err(MessageBusError::InvalidTopic { .. })
    ));
}

#[tokio::test]
async fn zero_capacity_is_rejected() {
    let bus = MessageBus::new();
    assert!(matches!(
        bus.subscribe_with_capacity::<Reading>("x", 0),
        Err(MessageBusError::InvalidCapacity { .. })
    ));
    assert!(matches!(
        bus.subscribe_mpsc::<Reading>("x", 0),
        Err(MessageBusError::InvalidCapacity { .. })
    ));
}

#[tokio::test]
async fn kind_mismatch_is_reported() {
    let bus = MessageBus::new();
    let _rx = bus.subscribe_mpsc::<Reading>("jobs", 4).unwrap();

    assert!(matches!(bus.publish("jobs", Reading(1)), Err(MessageBusError::ChannelKindMismatch { .. })));
    assert!(matches!(
        bus.subscribe_watch("jobs", Reading(0)),
        Err(MessageBusError::ChannelKindMismatch { .. })
    ));
}

#[tokio::test]
async fn mpsc_receiver_is_taken_once() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe_mpsc::<Reading>("jobs", 2).unwrap();
    assert!(matches!(
        bus.subscribe_mpsc::<Reading>("jobs", 2),
        Err(MessageBusError::ChannelKindMismatch { .. })
    ));

    bus.publish_mpsc("jobs", Reading(1)).unwrap();
    bus.publish_mpsc("jobs", Reading(2)).unwrap();
    assert!(matches!(bus.publish_mpsc("jobs", Reading(3)), Err(MessageBusError::ChannelFull { .. })));

    assert_eq!(MessageReceiverExt::recv(&mut rx).await.unwrap().payload, Reading(1));
    assert_eq!(MessageReceiverExt::recv(&mut rx).await.unwrap().payload, Reading(2));
}

#[tokio::test]
async fn watch_keeps_latest_value() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe_watch("mount.state", Reading(0)).unwrap();
    assert_eq!(bus.latest::<Reading>("mount.state").unwrap().payload, Reading(0));

    bus.publish_watch("mount.state", Reading(1)).unwrap();
    bus.publish_watch("mount.state", Reading(2)).unwrap();

    assert_eq!(MessageReceiverExt::recv(&mut rx).await.unwrap().payload, Reading(2));
    assert_eq!(bus.latest::<Reading>("mount.state").unwrap().payload, Reading(2));
    assert!(matches!(
        bus.latest::<Reading>("mount.unknown"),
        Err(MessageBusError::ChannelNotFound { .. })
    ));
}

#[tokio::test]
async fn callbacks_run_in_publish_order() {
    let bus = MessageBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _sub = bus
        .on::<Reading, _>("guider.error", move |message| {
            let _ = tx.send(message.payload.0);
        })
        .unwrap();

    for i in 0..20 {
        assert_eq!(bus.publish("guider.error", Reading(i)).unwrap(), 1);
    }

    for expected in 0..20 {
        let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, expected);
    }
}

#[tokio::test]
async fn once_and_filter_options() {
    let bus = MessageBus::new();
    let once_hits = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let counter = Arc::clone(&once_hits);
    let _once = bus
        .on_with::<Reading, _>("solver.result", SubscribeOptions::new().once(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let _even = bus
        .on_with::<Reading, _>(
            "solver.result",
            SubscribeOptions::new().filter(|r: &Reading| r.0 % 2 == 0),
            move |message| {
                let _ = tx.send(message.payload.0);
            },
        )
        .unwrap();

    for i in 1..=4 {
        bus.publish("solver.result", Reading(i)).unwrap();
    }

    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(2));
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(4));
    assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count("solver.result"), 1);
}

#[tokio::test]
async fn dropping_subscription_unsubscribes() {
    let bus = MessageBus::new();
    let sub = bus.on::<Reading, _>("device.added", |_| {}).unwrap();
    assert!(bus.has_subscribers("device.added"));

    drop(sub);
    assert!(!bus.has_subscribers("device.added"));
    assert_eq!(bus.publish("device.added", Reading(1)).unwrap(), 0);
}

#[tokio::test]
async fn explicit_unsubscribe_and_detach() {
    let bus = MessageBus::new();
    let id = bus.on::<Reading, _>("device.removed", |_| {}).unwrap().detach();
    assert_eq!(bus.subscriber_count("device.removed"), 1);

    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    assert_eq!(bus.subscriber_count("device.removed"), 0);
}

#[tokio::test]
async fn namespaces_and_topics_are_listed() {
    let bus = MessageBus::new();
    let _a = bus.subscribe::<Reading>("device.camera.exposure").unwrap();
    let _b = bus.subscribe::<Reading>("device.added").unwrap();
    let _c = bus.on::<Reading, _>("config.changed", |_| {}).unwrap();

    assert_eq!(bus.namespaces(), vec!["config".to_owned(), "device".to_owned()]);
    assert_eq!(
        bus.topics(),
        vec!["config.changed".to_owned(), "device.added".to_owned(), "device.camera.exposure".to_owned()]
    );
    assert_eq!(bus.subscriber_count("device.added"), 1);
}

#[tokio::test]
async fn dropped_receivers_leave_no_topics_behind() {
    let bus = MessageBus::new();
    for topic in ["device.camera.main.property", "device.focuser.f1.property", "guide.stats"] {
        drop(bus.subscribe::<Reading>(topic).unwrap());
    }
    let sub = bus.on::<Reading, _>("config.changed", |_| {}).unwrap();

    assert_eq!(bus.topics(), vec!["config.changed".to_owned()]);
    assert_eq!(bus.namespaces(), vec!["config".to_owned()]);
    assert_eq!(bus.subscriber_count("guide.stats"), 0);

    drop(sub);
    assert!(bus.topics().is_empty());

    // A publish into a dead channel clears it, and a later subscriber still gets messages.
    let rx = bus.subscribe::<Reading>("guide.stats").unwrap();
    drop(rx);
    assert_eq!(bus.publish("guide.stats", Reading(1)).unwrap(), 0);
    let mut rx = bus.subscribe::<Reading>("guide.stats").unwrap();
    assert_eq!(bus.publish("guide.stats", Reading(2)).unwrap(), 1);
    assert_eq!(MessageReceiverExt::recv(&mut rx).await.unwrap().payload, Reading(2));
    assert_eq!(bus.topics(), vec!["guide.stats".to_owned()]);
}

#[tokio::test]
async fn unsubscribe_all_closes_topic() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe::<Reading>("preload.progress").unwrap();
    let _sub = bus.on::<Reading, _>("preload.progress", |_| {}).unwrap();

    assert_eq!(bus.unsubscribe_all("preload.progress"), 2);
    assert!(MessageReceiverExt::recv(&mut rx).await.is_none());
    assert!(!bus.has_subscribers("preload.progress"));
}

#[tokio::test]
async fn history_is_bounded_and_ordered() {
    let bus = MessageBus::with_settings(BusSettings { channel_capacity: 16, history_capacity: 3 });

    for i in 0..5 {
        bus.publish_json("config.changed", Reading(i)).unwrap();
    }

    let all = bus.history("config.changed", 10);
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["payload"], 2);
    assert_eq!(all[2]["payload"], 4);
    assert_eq!(all[2]["topic"], "config.changed");

    let last = bus.history("config.changed", 1);
    assert_eq!(last.len(), 1);
    assert_eq!(last[0]["payload"], 4);
    assert!(bus.history("unknown", 5).is_empty());
}

#[tokio::test]
async fn delayed_publish_arrives_later() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe::<Reading>("timer.fired").unwrap();

    let handle = bus.publish_delayed("timer.fired", Reading(9), Duration::from_millis(20)).unwrap();
    assert!(rx.try_recv().is_err());

    handle.await.unwrap();
    assert_eq!(MessageReceiverExt::recv(&mut rx).await.unwrap().payload, Reading(9));
}

#[test]
fn callbacks_need_a_runtime() {
    let bus = MessageBus::new();
    assert!(matches!(bus.on::<Reading, _>("x", |_| {}), Err(MessageBusError::Internal { .. })));
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let bus = MessageBus::new();
    let mut rx = bus.subscribe::<Reading>("a.b").unwrap();
    let _w = bus.subscribe_watch("c.d", Reading(0)).unwrap();
    let _sub = bus.on::<Reading, _>("e.f", |_| {}).unwrap();
    bus.publish_json("a.b", Reading(1)).unwrap();

    assert_eq!(bus.shutdown(), 3);
    assert!(bus.topics().is_empty());
    assert!(bus.history("a.b", 10).is_empty());

    // The message published before shutdown is still buffered.
    assert!(MessageReceiverExt::recv(&mut rx).await.is_some());
    assert!(MessageReceiverExt::recv(&mut rx).await.is_none());
}
