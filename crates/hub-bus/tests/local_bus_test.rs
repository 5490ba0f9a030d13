//! Dispatch loop behaviour on the in-process bus

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hub_bus::{Bus, LocalBus, LoopId, MessageHandler};
use hub_core::{event_types, Event, Message, Request, Response};
use tokio::sync::mpsc;

/// Forwards every handled message to a channel
struct Forward(mpsc::UnboundedSender<Message>);

#[async_trait]
impl MessageHandler for Forward {
    async fn handle(&self, msg: Message) {
        let _ = self.0.send(msg);
    }
}

fn spawn_loop(
    bus: Arc<LocalBus>,
    loop_id: LoopId,
) -> (
    tokio::task::JoinHandle<hub_bus::BusResult<()>>,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { bus.poll(&loop_id, &Forward(tx)).await });
    (handle, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("handler channel closed")
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let bus = Arc::new(LocalBus::new("hub"));
    let loop_id = LoopId::new();

    // posted before the loop starts
    bus.post(Event::ping("one").into()).unwrap();
    let (handle, mut rx) = spawn_loop(bus.clone(), loop_id.clone());
    bus.post(Request::builder("light.on").arg("room", "hall").build().into())
        .unwrap();
    bus.post(Response::new("done").into()).unwrap();

    let Message::Event(first) = next(&mut rx).await else {
        panic!("expected the ping first");
    };
    assert_eq!(first.get("message"), Some(&serde_json::json!("one")));
    assert_eq!(first.origin(), "hub");
    assert_eq!(first.target(), "hub");

    let Message::Request(second) = next(&mut rx).await else {
        panic!("expected the request second");
    };
    assert_eq!(second.action(), "light.on");

    assert!(matches!(next(&mut rx).await, Message::Response(_)));

    bus.stop(&loop_id).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stop_for_other_loop_is_ignored() {
    let bus = Arc::new(LocalBus::new("hub"));
    let loop_id = LoopId::new();
    let (handle, mut rx) = spawn_loop(bus.clone(), loop_id.clone());

    bus.stop(&LoopId::from("someone-else")).unwrap();
    let Message::Event(stop) = next(&mut rx).await else {
        panic!("expected the foreign stop event");
    };
    assert_eq!(stop.event_type().as_str(), event_types::STOP);

    // still running: later messages are delivered
    bus.post(Event::ping("still here").into()).unwrap();
    assert!(matches!(next(&mut rx).await, Message::Event(_)));
    assert!(!handle.is_finished());

    bus.stop(&loop_id).unwrap();
    let Message::Event(own_stop) = next(&mut rx).await else {
        panic!("expected our stop event");
    };
    assert_eq!(own_stop.stop_thread_id(), Some(loop_id.as_str()));

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not exit")
        .unwrap();
    assert!(result.is_ok());
}
