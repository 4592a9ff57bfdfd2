use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use tenq_core::{
    SchedulingStrategy, SubmitError, TenantConfig, TenantId, TenantTask, WorkQueueManager,
};

// Hot-tenant-vs-cold-tenants harness: one tenant hammering the queue while
// many quiet tenants trickle, measuring throughput and whether the quiet
// tenants keep their share of dispatches.

fn main() {
    let run_seconds = 5u64;
    let worker_count = 4usize;
    let cold_tenants = 40usize;
    let work_capacity = 2_000usize;

    let mut configs = vec![TenantConfig::new("hot", "hot tenant", work_capacity)];
    for idx in 0..cold_tenants {
        configs.push(TenantConfig::new(
            format!("cold-{idx}"),
            format!("cold tenant {idx}"),
            work_capacity,
        ));
    }

    let manager = Arc::new(
        WorkQueueManager::new(configs, SchedulingStrategy::FairQueueing)
            .expect("manager construction"),
    );

    let running = Arc::new(AtomicBool::new(true));
    let produced_total = Arc::new(AtomicU64::new(0));
    let served_by_tenant: Arc<Mutex<HashMap<TenantId, u64>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut handles = Vec::new();

    handles.push(spawn_producer(
        Arc::clone(&manager),
        Arc::clone(&running),
        Arc::clone(&produced_total),
        TenantId::from("hot"),
        0,
    ));
    for idx in 0..cold_tenants {
        handles.push(spawn_producer(
            Arc::clone(&manager),
            Arc::clone(&running),
            Arc::clone(&produced_total),
            TenantId::from(format!("cold-{idx}")),
            25,
        ));
    }

    for _ in 0..worker_count {
        handles.push(spawn_worker(
            Arc::clone(&manager),
            Arc::clone(&served_by_tenant),
        ));
    }

    println!(
        "bench: hot tenant vs {} cold tenants ({} workers, {}s)",
        cold_tenants, worker_count, run_seconds
    );
    let start = Instant::now();
    thread::sleep(Duration::from_secs(run_seconds));
    let elapsed = start.elapsed().as_secs_f64();

    running.store(false, Ordering::Relaxed);
    manager.close();

    for handle in handles {
        let _ = handle.join();
    }

    let stats = manager.stats();
    let throughput = if elapsed > 0.0 {
        stats.processed as f64 / elapsed
    } else {
        0.0
    };

    let served = served_by_tenant.lock().unwrap();
    let hot_served = served.get(&TenantId::from("hot")).copied().unwrap_or(0);
    let cold_served: u64 = served
        .iter()
        .filter(|(tenant, _)| tenant.as_str() != "hot")
        .map(|(_, count)| *count)
        .sum();

    println!(
        "stats: submitted={} processed={} rejected_unknown={} backlog={}",
        stats.submitted, stats.processed, stats.rejected_unknown_tenant, stats.backlog_len_estimate
    );
    println!(
        "derived: throughput={:.1} ops/s hot_served={} cold_served={} produced_total={}",
        throughput,
        hot_served,
        cold_served,
        produced_total.load(Ordering::Relaxed),
    );
}

fn spawn_producer(
    manager: Arc<WorkQueueManager<u64>>,
    running: Arc<AtomicBool>,
    produced_total: Arc<AtomicU64>,
    tenant: TenantId,
    interval_ms: u64,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut seq = 0u64;
        while running.load(Ordering::Relaxed) {
            seq += 1;
            match manager.submit_work(TenantTask::new(tenant.clone(), seq)) {
                Ok(()) => {
                    produced_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(SubmitError::Closed) => break,
                Err(SubmitError::UnknownTenant(_)) => break,
            }
            if interval_ms > 0 {
                thread::sleep(Duration::from_millis(interval_ms));
            }
        }
    })
}

fn spawn_worker(
    manager: Arc<WorkQueueManager<u64>>,
    served_by_tenant: Arc<Mutex<HashMap<TenantId, u64>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match manager.take_work() {
            Ok(task) => {
                *served_by_tenant.lock().unwrap().entry(task.tenant).or_insert(0) += 1;
            }
            Err(_) => break,
        }
    })
}
