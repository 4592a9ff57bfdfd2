use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::{
    metrics, ProvisionError, SchedulingStrategy, SubmitError, TakeError, TenantConfig, TenantId,
    TenantTask, WorkQueueManager,
};

fn config(id: &str, capacity: usize) -> TenantConfig {
    TenantConfig::new(id, format!("{id}-name"), capacity)
}

fn task(tenant: &str, payload: u64) -> TenantTask<u64> {
    TenantTask::new(tenant, payload)
}

fn manager(configs: Vec<TenantConfig>, strategy: SchedulingStrategy) -> Arc<WorkQueueManager<u64>> {
    Arc::new(WorkQueueManager::new(configs, strategy).expect("manager construction"))
}

fn take(manager: &WorkQueueManager<u64>) -> TenantTask<u64> {
    manager
        .take_work_timeout(Duration::from_secs(2))
        .expect("manager closed")
        .expect("no task within timeout")
}

#[test]
fn round_robin_by_tenant_before_repeat() {
    let tenants = ["a", "b", "c", "d"];
    let mgr = manager(
        tenants.iter().map(|id| config(id, 10)).collect(),
        SchedulingStrategy::FairQueueing,
    );

    // Deep backlogs submitted before any consumption.
    for (idx, id) in tenants.iter().enumerate() {
        for seq in 0..3 {
            mgr.submit_work(task(id, idx as u64 * 10 + seq)).unwrap();
        }
    }

    // One task per tenant in activation order, each tenant's earliest
    // submission, before any tenant gets a second turn.
    for round in 0..3 {
        for (idx, id) in tenants.iter().enumerate() {
            let got = take(&mgr);
            assert_eq!(got.tenant, TenantId::from(*id));
            assert_eq!(got.task, idx as u64 * 10 + round);
        }
    }
}

#[test]
fn submit_up_to_work_capacity_never_blocks() {
    let mgr = manager(vec![config("a", 4)], SchedulingStrategy::FairQueueing);
    let (tx, rx) = mpsc::channel();
    let producer = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || {
            // 1 representative in the dispatch queue + 3 backlog slots.
            for seq in 0..4 {
                mgr.submit_work(task("a", seq)).unwrap();
            }
            tx.send(()).unwrap();
        })
    };
    assert!(
        rx.recv_timeout(Duration::from_secs(1)).is_ok(),
        "filling up to work capacity must not block"
    );
    producer.join().unwrap();
}

#[test]
fn submit_beyond_work_capacity_blocks_until_take() {
    let mgr = manager(vec![config("a", 4)], SchedulingStrategy::FairQueueing);
    for seq in 0..4 {
        mgr.submit_work(task("a", seq)).unwrap();
    }

    let (tx, rx) = mpsc::channel();
    let producer = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || {
            mgr.submit_work(task("a", 99)).unwrap();
            tx.send(()).unwrap();
        })
    };

    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "submit past capacity should block while nothing is consumed"
    );

    // One take dispatches the representative and promotes a backlog task,
    // freeing exactly one slot for the blocked producer.
    let got = take(&mgr);
    assert_eq!(got.task, 0);
    assert!(
        rx.recv_timeout(Duration::from_secs(1)).is_ok(),
        "blocked submit should complete after a take"
    );
    producer.join().unwrap();
}

#[test]
fn unknown_tenant_fails_fast_without_counter_mutation() {
    let mgr = manager(vec![config("a", 8)], SchedulingStrategy::FairQueueing);
    let err = mgr.submit_work(task("ghost", 1)).unwrap_err();
    assert_eq!(err, SubmitError::UnknownTenant(TenantId::from("ghost")));

    let stats = mgr.stats();
    assert_eq!(stats.tenants, 1);
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.rejected_unknown_tenant, 1);
}

#[test]
fn freshly_provisioned_tenant_skips_other_backlogs() {
    let mgr = manager(vec![config("busy", 100)], SchedulingStrategy::FairQueueing);
    for seq in 0..50 {
        mgr.submit_work(task("busy", seq)).unwrap();
    }

    mgr.provision_tenant(config("fresh", 100)).unwrap();
    mgr.submit_work(task("fresh", 777)).unwrap();

    // The fresh tenant enters the rotation behind at most one task per
    // currently active tenant, never behind "busy"'s 49-deep backlog.
    let mut position = None;
    for idx in 0..3 {
        if take(&mgr).tenant == TenantId::from("fresh") {
            position = Some(idx);
            break;
        }
    }
    assert!(
        position.is_some(),
        "fresh tenant's first task must not wait behind another tenant's backlog"
    );
}

#[test]
fn deprovisioned_tenant_is_unknown() {
    let mgr = manager(
        vec![config("a", 8), config("b", 8)],
        SchedulingStrategy::FairQueueing,
    );
    assert_eq!(mgr.tenant_count(), 2);

    mgr.deprovision_tenant(&TenantId::from("a")).unwrap();
    assert_eq!(mgr.tenant_count(), 1);

    let err = mgr.submit_work(task("a", 1)).unwrap_err();
    assert_eq!(err, SubmitError::UnknownTenant(TenantId::from("a")));
}

#[test]
fn deprovision_discards_backlog_but_delivers_dispatched_task() {
    let mgr = manager(vec![config("a", 10)], SchedulingStrategy::FairQueueing);
    for seq in 0..4 {
        mgr.submit_work(task("a", seq)).unwrap();
    }

    // 1 task in the dispatch queue, 3 in the backlog.
    let dropped = mgr.deprovision_tenant(&TenantId::from("a")).unwrap();
    assert_eq!(dropped, 3);
    assert_eq!(mgr.stats().backlog_len_estimate, 0);

    // The representative already in the dispatch queue still drains.
    assert_eq!(take(&mgr).task, 0);
    assert_eq!(
        mgr.take_work_timeout(Duration::from_millis(100)).unwrap(),
        None
    );
}

#[test]
fn two_tenants_then_fifo_degeneration() {
    let mgr = manager(
        vec![config("a", 100), config("b", 100)],
        SchedulingStrategy::FairQueueing,
    );

    mgr.submit_work(task("a", 1)).unwrap();
    mgr.submit_work(task("b", 2)).unwrap();

    // Activation order: A then B.
    let first = take(&mgr);
    assert_eq!((first.tenant, first.task), (TenantId::from("a"), 1));
    let second = take(&mgr);
    assert_eq!((second.tenant, second.task), (TenantId::from("b"), 2));

    // B is idle; A alone degenerates to plain FIFO with no waiting.
    mgr.submit_work(task("a", 3)).unwrap();
    let third = take(&mgr);
    assert_eq!((third.tenant, third.task), (TenantId::from("a"), 3));
}

#[test]
fn provision_twice_and_invalid_config_errors() {
    let mgr = manager(vec![config("a", 8)], SchedulingStrategy::FairQueueing);
    assert_eq!(
        mgr.provision_tenant(config("a", 8)).unwrap_err(),
        ProvisionError::AlreadyProvisioned(TenantId::from("a"))
    );
    assert!(matches!(
        mgr.provision_tenant(config("b", 0)).unwrap_err(),
        ProvisionError::InvalidConfig(_)
    ));
    assert_eq!(mgr.tenant_count(), 1);
}

#[test]
fn work_capacity_one_still_admits_work() {
    let mgr = manager(vec![config("tiny", 1)], SchedulingStrategy::FairQueueing);
    let (tx, rx) = mpsc::channel();
    let producer = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || {
            mgr.submit_work(task("tiny", 1)).unwrap();
            tx.send(()).unwrap();
        })
    };
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    producer.join().unwrap();
    assert_eq!(take(&mgr).task, 1);
}

#[test]
fn close_wakes_blocked_consumer() {
    let mgr = manager(vec![config("a", 8)], SchedulingStrategy::FairQueueing);
    let consumer = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || mgr.take_work())
    };
    thread::sleep(Duration::from_millis(150));
    mgr.close();
    assert_eq!(consumer.join().unwrap(), Err(TakeError::Closed));
}

#[test]
fn close_wakes_blocked_producer() {
    let mgr = manager(vec![config("a", 2)], SchedulingStrategy::FairQueueing);
    // Representative + single backlog slot.
    mgr.submit_work(task("a", 1)).unwrap();
    mgr.submit_work(task("a", 2)).unwrap();

    let producer = {
        let mgr = Arc::clone(&mgr);
        thread::spawn(move || mgr.submit_work(task("a", 3)))
    };
    thread::sleep(Duration::from_millis(150));
    mgr.close();
    assert_eq!(producer.join().unwrap(), Err(SubmitError::Closed));
}

#[test]
fn stress_exact_delivery_no_loss_no_duplication() {
    let tenant_count = 5u64;
    let producers_per_tenant = 3u64;
    let tasks_per_producer = 40u64;
    let consumer_count = 4;
    let target = tenant_count * producers_per_tenant * tasks_per_producer;

    let configs = (0..tenant_count)
        .map(|idx| config(&format!("tenant-{idx}"), 64))
        .collect();
    let mgr = manager(configs, SchedulingStrategy::FairQueueing);

    let delivered_count = Arc::new(AtomicU64::new(0));
    let delivered = Arc::new(Mutex::new(Vec::with_capacity(target as usize)));

    let mut handles = Vec::new();
    for tenant_idx in 0..tenant_count {
        for producer_idx in 0..producers_per_tenant {
            let mgr = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                let id = format!("tenant-{tenant_idx}");
                for seq in 0..tasks_per_producer {
                    let payload = tenant_idx * 1_000_000 + producer_idx * 1_000 + seq;
                    mgr.submit_work(task(&id, payload)).unwrap();
                }
            }));
        }
    }

    for _ in 0..consumer_count {
        let mgr = Arc::clone(&mgr);
        let delivered_count = Arc::clone(&delivered_count);
        let delivered = Arc::clone(&delivered);
        handles.push(thread::spawn(move || loop {
            if delivered_count.load(Ordering::Relaxed) >= target {
                break;
            }
            match mgr.take_work_timeout(Duration::from_millis(100)) {
                Ok(Some(got)) => {
                    delivered_count.fetch_add(1, Ordering::Relaxed);
                    delivered.lock().unwrap().push(got.task);
                }
                Ok(None) => {}
                Err(_) => break,
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let mut payloads = delivered.lock().unwrap().clone();
    assert_eq!(payloads.len() as u64, target, "every submitted task delivered");
    payloads.sort_unstable();
    payloads.dedup();
    assert_eq!(payloads.len() as u64, target, "no task delivered twice");
    assert_eq!(mgr.processed_count(), target);
}

#[test]
fn weighted_share_is_proportional_to_weight() {
    let mgr = manager(
        vec![
            config("w1", 100).with_weight(1),
            config("w2", 100).with_weight(2),
            config("w3", 100).with_weight(3),
        ],
        SchedulingStrategy::WeightedFairQueueing,
    );

    for id in ["w1", "w2", "w3"] {
        for seq in 0..36 {
            mgr.submit_work(task(id, seq)).unwrap();
        }
    }

    let mut counts = std::collections::HashMap::new();
    for _ in 0..36 {
        let got = take(&mgr);
        *counts.entry(got.tenant.clone()).or_insert(0u64) += 1;
    }

    // Six full rotations while all three stay backlogged: 1/2/3 per cycle.
    assert_eq!(counts[&TenantId::from("w1")], 6);
    assert_eq!(counts[&TenantId::from("w2")], 12);
    assert_eq!(counts[&TenantId::from("w3")], 18);
}

#[test]
fn weighted_never_skips_light_tenant() {
    let mgr = manager(
        vec![
            config("hot", 100).with_weight(5),
            config("cold", 100).with_weight(1),
        ],
        SchedulingStrategy::WeightedFairQueueing,
    );

    for seq in 0..20 {
        mgr.submit_work(task("hot", seq)).unwrap();
    }
    mgr.submit_work(task("cold", 999)).unwrap();

    let mut cold_position = None;
    for idx in 0..7 {
        if take(&mgr).tenant == TenantId::from("cold") {
            cold_position = Some(idx);
            break;
        }
    }
    // Bounded wait: at most one full rotation (sum of weights) before the
    // light tenant is served.
    assert!(cold_position.is_some(), "cold tenant must be served within one rotation");
}

#[test]
fn weighted_per_tenant_order_is_fifo() {
    let mgr = manager(
        vec![config("a", 100).with_weight(2), config("b", 100)],
        SchedulingStrategy::WeightedFairQueueing,
    );
    for seq in 0..6 {
        mgr.submit_work(task("a", seq)).unwrap();
        mgr.submit_work(task("b", 100 + seq)).unwrap();
    }

    let mut last_a = None;
    let mut last_b = None;
    for _ in 0..12 {
        let got = take(&mgr);
        if got.tenant == TenantId::from("a") {
            assert!(last_a.map_or(true, |prev| prev < got.task));
            last_a = Some(got.task);
        } else {
            assert!(last_b.map_or(true, |prev| prev < got.task));
            last_b = Some(got.task);
        }
    }
}

#[test]
fn weight_update_applies_on_live_system() {
    let mgr = manager(
        vec![config("a", 100), config("b", 100)],
        SchedulingStrategy::WeightedFairQueueing,
    );
    mgr.set_tenant_weight(&TenantId::from("a"), 3).unwrap();

    for id in ["a", "b"] {
        for seq in 0..12 {
            mgr.submit_work(task(id, seq)).unwrap();
        }
    }

    let mut counts = std::collections::HashMap::new();
    for _ in 0..8 {
        let got = take(&mgr);
        *counts.entry(got.tenant.clone()).or_insert(0u64) += 1;
    }
    // Two rotations of 3:1.
    assert_eq!(counts[&TenantId::from("a")], 6);
    assert_eq!(counts[&TenantId::from("b")], 2);

    assert_eq!(
        mgr.set_tenant_weight(&TenantId::from("ghost"), 2).unwrap_err(),
        ProvisionError::UnknownTenant(TenantId::from("ghost"))
    );
}

#[test]
fn metrics_exposition_contains_counters() {
    let mgr = manager(
        vec![config("a", 8), config("b", 8)],
        SchedulingStrategy::FairQueueing,
    );
    mgr.submit_work(task("a", 1)).unwrap();
    mgr.submit_work(task("a", 2)).unwrap();
    mgr.submit_work(task("a", 3)).unwrap();
    // Takes the representative and promotes one backlog task, leaving one.
    let _ = take(&mgr);
    let _ = mgr.submit_work(task("ghost", 4));

    let text = metrics::render_stats(&mgr.stats(), "");
    assert!(text.contains("tenq_tenants 2"));
    assert!(text.contains("tenq_submitted_total 3"));
    assert!(text.contains("tenq_processed_total 1"));
    assert!(text.contains("tenq_rejected_unknown_tenant_total 1"));
    assert!(text.contains("tenq_backlog_len_estimate 1"));
}
