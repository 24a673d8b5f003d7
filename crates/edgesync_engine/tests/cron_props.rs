//! Property tests for the bounded cron loop.

use edgesync_codec::Value;
use edgesync_engine::{
    CronStop, LocalFabric, ManualClock, ManualScheduler, MockEndpoint, MockResponse,
    ModuleRegistry, Orchestrator, SyncConfig, SyncServices,
};
use edgesync_protocol::{Actor, Partition, RemoteReply};
use edgesync_store::{NewEntry, StateStore, SyncQueues};
use proptest::prelude::*;
use std::sync::Arc;

const START: u64 = 1_700_000_000;

fn reply_strategy() -> impl Strategy<Value = Option<u64>> {
    prop_oneof![Just(None), (0u64..40).prop_map(Some)]
}

proptest! {
    /// Whatever the remote answers, the loop ends, never sleeps past the
    /// horizon and never loses an entry it did not get acknowledged.
    #[test]
    fn cron_loop_is_bounded(
        entries in 1usize..12,
        replies in prop::collection::vec(reply_strategy(), 1..12),
    ) {
        let clock = ManualClock::new(START);
        let queues = Arc::new(SyncQueues::in_memory().unwrap());
        for i in 0..entries {
            queues
                .enqueue(
                    Partition::Regular,
                    NewEntry::new("save_post", vec![Value::Integer(i as i64)], Actor::SYSTEM, START),
                )
                .unwrap();
        }

        let endpoint = Arc::new(MockEndpoint::new());
        let mut offset = 0;
        for reply in &replies {
            match reply {
                None => endpoint.push_response(RemoteReply::Ack),
                Some(delay) => {
                    // Each hint lies further out than the previous one.
                    offset += delay;
                    endpoint.push_response(RemoteReply::RetryAfter { at: START + offset + 1 });
                }
            }
        }
        endpoint.set_default(MockResponse::TransportError("gone".into()));

        let services = SyncServices {
            queues: Arc::clone(&queues),
            state: Arc::new(StateStore::in_memory().unwrap()),
            modules: Arc::new(ModuleRegistry::new()),
            endpoint: endpoint.clone(),
            fabric: Arc::new(LocalFabric::new()),
            scheduler: Arc::new(ManualScheduler::new(Arc::new(clock.clone()))),
            clock: Arc::new(clock.clone()),
        };
        let config = SyncConfig::new().with_batch_limits(1, 1 << 20);
        let report = Orchestrator::new(config.clone(), services).do_cron_sync();

        prop_assert!(clock.total_slept() <= config.cron_horizon_secs);
        prop_assert_eq!(report.slept_secs, clock.total_slept());
        prop_assert_eq!(
            queues.size(Partition::Regular),
            entries - report.batches_sent as usize
        );
        prop_assert!(report.stop != CronStop::Gated);
        prop_assert!(endpoint.calls() <= report.attempts as usize);
    }
}
