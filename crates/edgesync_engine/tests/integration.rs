//! End-to-end tests of listener, full sync, sender and the cron loop.

use edgesync_codec::Value;
use edgesync_engine::{
    ActivationPolicy, Clock, CronStop, InvocationContext, LocalFabric, LoopbackClient, LoopbackServer,
    ManualClock, ManualScheduler, MockEndpoint, MockResponse, ModuleRegistry, MutationEvent,
    Orchestrator, RemoteEndpoint, RpcEndpoint, SendOutcome, SiteStatus, StaticModule, SyncConfig,
    SyncError, SyncServices, FULL_SYNC_END_ACTION, SYNC_CHECKSUM_ACTION,
};
use edgesync_protocol::{
    Actor, CodecKind, Partition, QueueEntry, RemoteReply, ReplyEnvelope, SyncActionsRequest,
};
use edgesync_storage::InMemoryBackend;
use edgesync_store::{DataDir, NewEntry, StateStore, SyncQueues};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::tempdir;

const NOW: u64 = 1_700_000_000;

struct Harness {
    queues: Arc<SyncQueues>,
    state: Arc<StateStore>,
    modules: Arc<ModuleRegistry>,
    fabric: Arc<LocalFabric>,
    scheduler: Arc<ManualScheduler>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_queues(SyncQueues::in_memory().unwrap(), StateStore::in_memory().unwrap())
    }

    fn with_queues(queues: SyncQueues, state: StateStore) -> Self {
        let clock = ManualClock::new(NOW);
        let items = |n: i64| -> Vec<Value> {
            (0..n).map(|i| Value::map([("id", Value::Integer(i))])).collect()
        };
        let modules = ModuleRegistry::new()
            .with_module(StaticModule::new("options", items(3)))
            .with_module(StaticModule::new("posts", items(4)))
            .with_module(StaticModule::new("users", items(2)));

        Self {
            queues: Arc::new(queues),
            state: Arc::new(state),
            modules: Arc::new(modules),
            fabric: Arc::new(LocalFabric::new()),
            scheduler: Arc::new(ManualScheduler::new(Arc::new(clock.clone()))),
            clock,
        }
    }

    fn services(&self, endpoint: Arc<dyn RemoteEndpoint>) -> SyncServices {
        SyncServices {
            queues: Arc::clone(&self.queues),
            state: Arc::clone(&self.state),
            modules: Arc::clone(&self.modules),
            endpoint,
            fabric: self.fabric.clone(),
            scheduler: self.scheduler.clone(),
            clock: Arc::new(self.clock.clone()),
        }
    }

    fn orchestrator(&self, config: SyncConfig, endpoint: &Arc<MockEndpoint>) -> Orchestrator {
        Orchestrator::new(config, self.services(endpoint.clone()))
    }

    fn enqueue(&self, n: usize) {
        for i in 0..n {
            self.queues
                .enqueue(
                    Partition::Regular,
                    NewEntry::new("save_post", vec![Value::Integer(i as i64)], Actor::user(1), NOW),
                )
                .unwrap();
        }
    }

    fn actions(&self, partition: Partition) -> Vec<String> {
        self.queues
            .partition(partition)
            .entries()
            .into_iter()
            .map(|e| e.action_name)
            .collect()
    }
}

fn decode(request: &SyncActionsRequest) -> Vec<QueueEntry> {
    let kind: CodecKind = request.codec_name.parse().unwrap();
    kind.build().decode(&request.payload).unwrap()
}

#[test]
fn enqueued_option_is_sent_and_removed() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    let id = h
        .queues
        .enqueue(
            Partition::Regular,
            NewEntry::new(
                "update_option",
                vec![Value::from("blogname"), Value::from("Foo")],
                Actor::user(1),
                NOW,
            ),
        )
        .unwrap();
    assert_eq!(id, 1);

    let batch = h.queues.peek_batch(Partition::Regular, 10, 10_000).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, 1);
    assert_eq!(batch[0].action_name, "update_option");
    assert_eq!(
        batch[0].action_args,
        vec![Value::from("blogname"), Value::from("Foo")]
    );

    assert!(orchestrator.sender().do_sync());
    assert_eq!(h.queues.size(Partition::Regular), 0);
    assert_eq!(decode(&endpoint.requests()[0]), batch);
}

#[test]
fn mutation_is_captured_and_flushed_at_end_of_request() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    let activation = orchestrator.init(&InvocationContext::admin());
    assert!(activation.listener && activation.sender);

    h.fabric
        .emit(&MutationEvent::new(
            "user.updated",
            vec![Value::Integer(7)],
            Actor::user(1),
        ))
        .unwrap();
    assert_eq!(h.actions(Partition::Regular), vec!["update_user"]);

    assert_eq!(
        orchestrator.end_invocation(),
        Some(SendOutcome::Sent {
            partition: Partition::Regular,
            deleted: 1
        })
    );
    assert_eq!(h.queues.total_size(), 0);
}

#[test]
fn short_backoff_is_slept_and_long_one_ends_the_loop() {
    let h = Harness::new();
    h.enqueue(1);
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.push_response(RemoteReply::RetryAfter { at: NOW + 5 });
    endpoint.push_response(RemoteReply::RetryAfter { at: NOW + 6 + 20 });
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    let report = orchestrator.do_cron_sync();

    assert_eq!(h.clock.sleeps(), vec![6]);
    assert_eq!(endpoint.calls(), 2);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.batches_sent, 0);
    assert_eq!(report.stop, CronStop::Backoff { until: NOW + 26 });
    assert_eq!(h.queues.size(Partition::Regular), 1);
}

#[test]
fn backoff_beyond_horizon_makes_exactly_one_call() {
    let h = Harness::new();
    h.enqueue(3);
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.set_default(RemoteReply::RetryAfter { at: NOW + 19 });
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    let report = orchestrator.do_cron_sync();

    assert_eq!(endpoint.calls(), 1);
    assert_eq!(report.attempts, 1);
    assert!(h.clock.sleeps().is_empty());
    assert_eq!(report.stop, CronStop::Backoff { until: NOW + 19 });
}

#[test]
fn healthy_remote_drains_five_batches_in_one_run() {
    let h = Harness::new();
    h.enqueue(10);
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new().with_batch_limits(2, 1 << 20), &endpoint);

    let report = orchestrator.do_cron_sync();

    assert_eq!(report.batches_sent, 5);
    assert_eq!(report.stop, CronStop::Drained);
    assert_eq!(endpoint.calls(), 5);
    assert_eq!(h.queues.total_size(), 0);
    assert_eq!(orchestrator.sender().stats().items_sent, 10);
}

#[test]
fn failing_remote_stops_the_loop_and_keeps_entries() {
    let h = Harness::new();
    h.enqueue(4);
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.set_default(MockResponse::TransportError("connection refused".into()));
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    let report = orchestrator.do_cron_sync();

    assert_eq!(report.stop, CronStop::Failed);
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(h.queues.size(Partition::Regular), 4);
}

#[test]
fn redelivered_entries_are_the_same_entries() {
    let h = Harness::new();
    h.enqueue(2);
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.push_response(MockResponse::Rejected("busy".into()));
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    assert!(!orchestrator.sender().do_sync());
    assert!(orchestrator.sender().do_sync());

    let requests = endpoint.requests();
    assert_eq!(decode(&requests[0]), decode(&requests[1]));
    assert_eq!(h.queues.total_size(), 0);
}

#[test]
fn listener_subscribes_once_per_invocation() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.set_default(MockResponse::Rejected("hold".into()));
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    orchestrator.init(&InvocationContext::mutating(true));
    orchestrator.init(&InvocationContext::mutating(true));
    orchestrator.do_full_sync(&[]).unwrap();
    assert_eq!(h.fabric.subscriber_count("post.saved"), 1);

    h.fabric
        .emit(&MutationEvent::new("post.saved", vec![Value::Integer(1)], Actor::user(2)))
        .unwrap();
    assert_eq!(h.actions(Partition::Regular), vec!["save_post"]);
}

#[test]
fn persistence_failure_reaches_the_emitter() {
    let regular = InMemoryBackend::new();
    let queues = SyncQueues::open(
        Box::new(regular.clone()),
        Box::new(InMemoryBackend::new()),
    )
    .unwrap();
    let h = Harness::with_queues(queues, StateStore::in_memory().unwrap());
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);
    orchestrator.init(&InvocationContext::mutating(true));

    regular.set_fail_writes(true);
    let result = h.fabric.emit(&MutationEvent::new(
        "option.updated",
        vec![Value::from("blogname")],
        Actor::user(1),
    ));

    assert!(matches!(result, Err(SyncError::QueuePersistence(_))));
    assert_eq!(h.queues.total_size(), 0);
}

#[test]
fn policy_can_veto_the_listener() {
    struct ReadOnlyNode;
    impl ActivationPolicy for ReadOnlyNode {
        fn should_start_listener(&self, _ctx: &InvocationContext, _default: bool) -> bool {
            false
        }
    }

    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h
        .orchestrator(SyncConfig::new(), &endpoint)
        .with_policy(ReadOnlyNode);

    let activation = orchestrator.init(&InvocationContext::mutating(true));
    assert!(!activation.listener);
    assert!(activation.sender);
    assert_eq!(h.fabric.total_subscribers(), 0);
}

#[test]
fn test_mode_opens_the_gate() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    let config = SyncConfig::new()
        .with_site(SiteStatus {
            staging: true,
            ..SiteStatus::connected()
        })
        .with_test_mode(true);
    let orchestrator = h.orchestrator(config, &endpoint);

    let activation = orchestrator.init(&InvocationContext::plain_read());
    assert!(activation.sync_allowed && activation.listener && activation.sender);
    assert_eq!(h.scheduler.len(), 2);
}

#[test]
fn staging_site_never_talks_to_the_remote() {
    let h = Harness::new();
    h.enqueue(1);
    let endpoint = Arc::new(MockEndpoint::new());
    let config = SyncConfig::new().with_site(SiteStatus {
        staging: true,
        ..SiteStatus::connected()
    });
    let orchestrator = h.orchestrator(config, &endpoint);

    orchestrator.init(&InvocationContext::admin());
    assert_eq!(orchestrator.do_cron_sync().stop, CronStop::Gated);
    assert!(!orchestrator.send_checksum().unwrap());
    assert_eq!(orchestrator.do_full_sync(&[]).unwrap(), None);
    assert_eq!(orchestrator.end_invocation(), None);
    assert_eq!(endpoint.calls(), 0);
}

#[test]
fn newer_full_sync_supersedes_queued_one() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.set_default(MockResponse::Rejected("not now".into()));
    let config = SyncConfig::new()
        .with_full_sync_chunk_size(1)
        .with_full_sync_chunks_per_invocation(2);
    let orchestrator = h.orchestrator(config, &endpoint);

    let first = orchestrator.do_full_sync(&[]).unwrap().unwrap();
    assert_eq!(first.requested_modules.len(), 3);
    assert_eq!(h.queues.size(Partition::FullSync), 3);

    let second = orchestrator
        .do_full_sync(&["users".to_string()])
        .unwrap()
        .unwrap();
    assert!(second.is_complete());
    assert_eq!(
        h.actions(Partition::FullSync),
        vec!["full_sync_start", "full_sync_users", "full_sync_users", FULL_SYNC_END_ACTION]
    );
}

#[test]
fn scheduled_full_sync_runs_and_drains_first() {
    let h = Harness::new();
    h.enqueue(1);
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);
    orchestrator.init(&InvocationContext::cli());

    assert!(orchestrator
        .schedule_full_sync(&["options".to_string()])
        .unwrap());
    h.clock.advance(1);

    for job in h.scheduler.due(h.clock.now()) {
        orchestrator.run_job(&job).unwrap();
    }

    assert_eq!(endpoint.requests()[0].queue_id, "full_sync");
    assert_eq!(h.queues.size(Partition::FullSync), 0);
    assert_eq!(h.queues.size(Partition::Regular), 1);

    let report = orchestrator.do_cron_sync();
    assert_eq!(report.batches_sent, 1);
    assert_eq!(h.queues.total_size(), 0);
}

#[test]
fn cron_resumes_budgeted_full_sync() {
    let h = Harness::new();
    let endpoint = Arc::new(MockEndpoint::new());
    let config = SyncConfig::new()
        .with_full_sync_chunk_size(2)
        .with_full_sync_chunks_per_invocation(1);
    let orchestrator = h.orchestrator(config.clone(), &endpoint);
    orchestrator.do_full_sync(&[]).unwrap();

    for _ in 0..6 {
        let next = h.orchestrator(config.clone(), &endpoint);
        next.do_cron_sync();
    }

    let job = orchestrator.full_sync().status().unwrap().unwrap();
    assert!(job.is_complete());
    assert_eq!(job.total_items(), 9);
    assert_eq!(h.queues.total_size(), 0);

    let sent: Vec<String> = endpoint
        .requests()
        .iter()
        .flat_map(decode)
        .map(|e| e.action_name)
        .collect();
    assert_eq!(sent.first().map(String::as_str), Some("full_sync_start"));
    assert_eq!(sent.last().map(String::as_str), Some(FULL_SYNC_END_ACTION));
}

#[test]
fn checksum_job_reports_every_scope() {
    let h = Harness::new();
    h.enqueue(2);
    let endpoint = Arc::new(MockEndpoint::new());
    let orchestrator = h.orchestrator(SyncConfig::new(), &endpoint);

    orchestrator
        .run_job(&edgesync_engine::ScheduledJob::SendChecksum)
        .unwrap();

    let request = &endpoint.requests()[0];
    assert_eq!(request.queue_id, "checksum");
    let batch = decode(request);
    assert_eq!(batch[0].action_name, SYNC_CHECKSUM_ACTION);
    assert_eq!(batch[0].action_args.len(), 5);
    assert_eq!(h.queues.size(Partition::Regular), 2);
}

/// A remote store that keeps every entry it accepts.
#[derive(Default)]
struct RemoteStore {
    received: Mutex<Vec<(String, QueueEntry)>>,
    refuse_json: bool,
}

impl LoopbackServer for RemoteStore {
    fn handle_call(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let request = SyncActionsRequest::decode(body).map_err(|e| e.to_string())?;
        if method != request.method {
            return Err("method mismatch".into());
        }

        let reply = if self.refuse_json && request.codec_name == "json-v1" {
            ReplyEnvelope::Rejected {
                reason: "json not accepted".into(),
            }
        } else {
            let mut received = self.received.lock();
            for entry in decode(&request) {
                received.push((request.queue_id.clone(), entry));
            }
            RemoteReply::Ack.into()
        };
        reply.encode().map_err(|e| e.to_string())
    }
}

#[test]
fn rpc_endpoint_delivers_in_order() {
    let h = Harness::new();
    h.enqueue(5);
    let endpoint = Arc::new(RpcEndpoint::new(LoopbackClient::new(RemoteStore::default())));
    let orchestrator = Orchestrator::new(
        SyncConfig::new().with_batch_limits(2, 1 << 20),
        h.services(endpoint.clone()),
    );

    let report = orchestrator.do_cron_sync();
    assert_eq!(report.batches_sent, 3);

    let received = endpoint.client().server().received.lock();
    let ids: Vec<u64> = received.iter().map(|(_, e)| e.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(received.iter().all(|(queue, _)| queue == "regular"));
}

#[test]
fn rpc_rejection_keeps_entries() {
    let h = Harness::new();
    h.enqueue(1);
    let server = RemoteStore {
        refuse_json: true,
        ..RemoteStore::default()
    };
    let endpoint = Arc::new(RpcEndpoint::new(LoopbackClient::new(server)));
    let orchestrator = Orchestrator::new(
        SyncConfig::new().with_codec(CodecKind::Json),
        h.services(endpoint.clone()),
    );

    assert!(!orchestrator.sender().do_sync());
    assert_eq!(h.queues.size(Partition::Regular), 1);
    assert!(orchestrator
        .sender()
        .stats()
        .last_error
        .unwrap()
        .contains("json not accepted"));
}

#[test]
fn queue_and_job_survive_between_invocations_on_disk() {
    let temp = tempdir().unwrap();
    let dir = DataDir::open(temp.path(), true).unwrap();
    let endpoint = Arc::new(MockEndpoint::new());
    endpoint.set_default(MockResponse::TransportError("offline".into()));
    let config = SyncConfig::new().with_full_sync_chunks_per_invocation(1);

    {
        let h = Harness::with_queues(dir.open_queues().unwrap(), dir.open_state().unwrap());
        let orchestrator = h.orchestrator(config.clone(), &endpoint);
        orchestrator.init(&InvocationContext::mutating(true));
        h.fabric
            .emit(&MutationEvent::new("post.deleted", vec![Value::Integer(9)], Actor::user(4)))
            .unwrap();
        orchestrator.do_full_sync(&[]).unwrap();
        assert_eq!(
            orchestrator.end_invocation(),
            Some(SendOutcome::Failed {
                reason: "transport error: offline".into()
            })
        );
    }

    endpoint.set_default(RemoteReply::Ack);
    let h = Harness::with_queues(dir.open_queues().unwrap(), dir.open_state().unwrap());
    assert_eq!(h.actions(Partition::Regular), vec!["delete_post"]);
    assert_eq!(h.queues.size(Partition::FullSync), 2);

    let orchestrator = h.orchestrator(config, &endpoint);
    let report = orchestrator.do_cron_sync();
    assert_eq!(report.stop, CronStop::Drained);
    assert!(!orchestrator.full_sync().status().unwrap().unwrap().is_complete());

    drop(orchestrator);
    drop(h);
    let queues = dir.open_queues().unwrap();
    assert_eq!(queues.total_size(), 0);
    assert_eq!(
        queues.enqueue(Partition::Regular, NewEntry::new("x", vec![], Actor::SYSTEM, NOW)).unwrap(),
        2
    );
}
