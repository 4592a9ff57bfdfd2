use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tenq_core::{
    metrics, SchedulingStrategy, TenantConfig, TenantTask, Work, WorkQueueManager,
};
use tracing::info;

// Core-only demo: a pool of worker threads draining a fair queue while many
// tenants submit search jobs, plus a late-provisioned tenant showing that a
// new tenant's first task never waits behind older backlogs.

struct SearchJob {
    description: String,
    submitted_at: Instant,
}

impl SearchJob {
    fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            submitted_at: Instant::now(),
        }
    }
}

impl Work for SearchJob {
    fn run(&self) {
        // Simulated search work.
        thread::sleep(Duration::from_micros(200));
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenq_core=debug".into()),
        )
        .init();

    let tenant_count = 8;
    let tasks_per_tenant = 200;
    let worker_count = 4;

    let configs: Vec<TenantConfig> = (0..tenant_count)
        .map(|idx| TenantConfig::new(format!("tenant-{idx}"), format!("Tenant {idx}"), 100))
        .collect();
    let manager = Arc::new(
        WorkQueueManager::<SearchJob>::new(configs, SchedulingStrategy::FairQueueing)
            .expect("manager construction"),
    );

    let mut handles = Vec::new();

    for worker_id in 0..worker_count {
        let manager = Arc::clone(&manager);
        handles.push(thread::spawn(move || {
            info!(worker_id, "worker started");
            while let Ok(task) = manager.take_work() {
                let waited = task.task.submitted_at.elapsed();
                if task.tenant.as_str() == "late" {
                    info!(
                        worker_id,
                        waited_ms = waited.as_millis() as u64,
                        desc = task.task.description(),
                        "late tenant's first task dispatched without head-of-line wait"
                    );
                }
                task.task.run();
            }
            info!(worker_id, "worker stopped");
        }));
    }

    for tenant_idx in 0..tenant_count {
        let manager = Arc::clone(&manager);
        handles.push(thread::spawn(move || {
            let id = format!("tenant-{tenant_idx}");
            for seq in 0..tasks_per_tenant {
                let job = SearchJob::new(format!("search {seq} for {id}"));
                if manager.submit_work(TenantTask::new(id.clone(), job)).is_err() {
                    break;
                }
            }
        }));
    }

    // Let the existing tenants build up backlog, then provision a new tenant
    // and submit a single task. Its wait should be a few milliseconds at
    // most, not the time it takes to drain everyone else's backlogs.
    thread::sleep(Duration::from_millis(50));
    manager
        .provision_tenant(TenantConfig::new("late", "Late Tenant", 100))
        .expect("provision late tenant");
    manager
        .submit_work(TenantTask::new("late", SearchJob::new("first search for late tenant")))
        .expect("submit for late tenant");

    // Drain: wait until everything submitted so far has been processed.
    let target = (tenant_count * tasks_per_tenant + 1) as u64;
    while manager.processed_count() < target {
        thread::sleep(Duration::from_millis(100));
    }

    manager.close();
    for handle in handles {
        let _ = handle.join();
    }

    println!("{}", metrics::render_stats(&manager.stats(), "tenq"));
}
