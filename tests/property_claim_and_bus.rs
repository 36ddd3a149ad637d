//! Property tests for the two invariants spec §9 calls out as P1/P3:
//! claim-next never double-assigns a task, and a subscriber's mailbox
//! never reorders what was published to it.

use std::sync::Arc;

use aiswarm_kernel::bus::{EventBus, EventFilter, FullMode};
use aiswarm_kernel::cancellation::CancellationToken;
use aiswarm_kernel::domain::{Agent, TaskPriority, WorkItem};
use aiswarm_kernel::store::migrations::Migrator;
use aiswarm_kernel::store::sqlite::SqliteStore;
use aiswarm_kernel::store::{create_test_pool, AgentRepository, TaskRepository};
use chrono::Utc;
use proptest::prelude::*;

proptest! {
    /// However many agents race to claim one pending task, exactly one
    /// of them ends up with it.
    #[test]
    fn prop_claim_next_assigns_task_to_exactly_one_agent(agent_count in 2usize..8) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let pool = create_test_pool().await.unwrap();
            Migrator::new(&pool).run().await.unwrap();
            let store = Arc::new(SqliteStore::new(pool));

            let mut agent_ids = Vec::with_capacity(agent_count);
            for _ in 0..agent_count {
                let agent = Agent::new("shared".into(), "claude-cli".into(), "/tmp".into(), None, None, Utc::now());
                AgentRepository::insert(store.as_ref(), &agent).await.unwrap();
                agent_ids.push(agent.id);
            }

            let task = WorkItem::new(None, Some("shared".into()), "contested".into(), TaskPriority::Normal, Utc::now());
            TaskRepository::insert(store.as_ref(), &task).await.unwrap();

            let mut handles = Vec::with_capacity(agent_count);
            for agent_id in agent_ids {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.claim_next(agent_id, "shared", Utc::now()).await.unwrap()
                }));
            }

            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap().is_some() {
                    winners += 1;
                }
            }
            prop_assert_eq!(winners, 1);
            Ok(())
        })?;
    }

    /// A subscriber's mailbox never reorders what was published to it,
    /// regardless of how many items are sent before anything is drained.
    #[test]
    fn prop_subscriber_receives_events_in_publish_order(items in prop::collection::vec(any::<u32>(), 1..50)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let bus: EventBus<(), u32> = EventBus::new(items.len().max(1), FullMode::Wait);
            let sub = bus.subscribe(EventFilter::new([()], |_: &u32| true), CancellationToken::new()).unwrap();
            let cancel = CancellationToken::new();
            for item in &items {
                bus.publish((), *item, None, &cancel).await.unwrap();
            }
            let mut received = Vec::with_capacity(items.len());
            for _ in 0..items.len() {
                received.push(sub.next().await.unwrap().payload);
            }
            prop_assert_eq!(received, items);
            Ok(())
        })?;
    }
}
