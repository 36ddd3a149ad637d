//! Scenario 6 from spec §8: with capacity=1 and FullMode::Wait, a second
//! publish to a full subscriber mailbox does not complete until the first
//! item is drained.

use std::time::Duration;

use aiswarm_kernel::bus::{EventBus, EventFilter, FullMode};
use aiswarm_kernel::cancellation::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Ping,
}

#[tokio::test]
async fn second_publish_blocks_until_drained() {
    let bus: EventBus<Kind, u32> = EventBus::new(1, FullMode::Wait);
    let sub = bus
        .subscribe(EventFilter::new([Kind::Ping], |_: &u32| true), CancellationToken::new())
        .unwrap();

    let cancel = CancellationToken::new();
    bus.publish(Kind::Ping, 1, None, &cancel).await.unwrap();

    let publisher_bus = bus.clone();
    let second_publish = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        publisher_bus.publish(Kind::Ping, 2, None, &cancel).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second_publish.is_finished(), "second publish should still be blocked");

    let first = sub.next().await.unwrap();
    assert_eq!(first.payload, 1);

    second_publish.await.unwrap();
    let second = sub.next().await.unwrap();
    assert_eq!(second.payload, 2);
}
