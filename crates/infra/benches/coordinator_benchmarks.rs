//! Coordinator hot-path benchmarks.
//!
//! The render itself dwarfs everything in production, so these stub it out
//! and measure what the worker adds around it: the store round trips per
//! delivery and the redelivery guard.

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use motionforge_core::{OutputFormat, Task, TaskId, TaskPayload, TaskStatus};
use motionforge_infra::{InMemoryTaskStore, RetryCoordinator, TaskStore, WorkError};

fn payload() -> TaskPayload {
    TaskPayload {
        prompt: "a benchmark scene".to_string(),
        image_b64: "aGVsbG8=".to_string(),
        format: OutputFormat::Gif,
        params: serde_json::Map::new(),
    }
}

/// Redelivery of an already-complete task: one fetch, no writes.
fn bench_redelivery_guard(c: &mut Criterion) {
    let mut group = c.benchmark_group("redelivery_guard");
    group.throughput(Throughput::Elements(1));

    let store = InMemoryTaskStore::arc();
    let mut task = Task::new(TaskId::from("t-done"), payload());
    task.status = TaskStatus::Complete;
    task.num_attempts = 1;
    task.result = Some(b"gif".to_vec());
    store.insert(&task).unwrap();

    let coordinator = RetryCoordinator::new(store, |_: &Task| -> Result<Vec<u8>, WorkError> {
        Ok(vec![])
    });

    group.bench_function("complete_task", |b| {
        b.iter(|| black_box(coordinator.handle_delivery(black_box("t-done")).unwrap()))
    });

    group.finish();
}

/// Full success path (fetch, claim, execute, complete) across artifact sizes.
fn bench_success_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("success_path");

    for size in [1_024usize, 65_536, 1_048_576] {
        group.throughput(Throughput::Bytes(size as u64));

        let store = InMemoryTaskStore::arc();
        let artifact = vec![0u8; size];
        let coordinator = RetryCoordinator::new(
            store.clone(),
            move |_: &Task| -> Result<Vec<u8>, WorkError> { Ok(artifact.clone()) },
        );

        let mut next = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || {
                    next += 1;
                    let id = TaskId::from(format!("t-{size}-{next}"));
                    store.insert(&Task::new(id.clone(), payload())).unwrap();
                    id
                },
                |id| black_box(coordinator.handle_delivery(id.as_str()).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_redelivery_guard, bench_success_path);
criterion_main!(benches);
