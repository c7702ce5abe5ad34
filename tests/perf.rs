#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use rs_rbac::{
    EngineBuilder, MemoryCache, MemoryStore, NewPermission, NewRole, PermissionCode, RoleName,
    UserId,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

const REPEATS: usize = 5;

fn benchmark_sync<F>(name: &str, iterations: usize, mut op: F)
where
    F: FnMut(),
{
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        for _ in 0..iterations {
            op();
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / iterations as f64;
    let ops_per_sec = iterations as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (iters={iterations}, repeats={REPEATS})"
    );
}

fn benchmark_parallel<F>(name: &str, threads: usize, iterations_per_thread: usize, op_factory: F)
where
    F: Fn() -> Box<dyn FnMut() + Send> + Send + Sync + 'static,
{
    let op_factory = Arc::new(op_factory);
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        let mut joins = Vec::with_capacity(threads);
        for _ in 0..threads {
            let factory = Arc::clone(&op_factory);
            joins.push(std::thread::spawn(move || {
                let mut op = factory();
                for _ in 0..iterations_per_thread {
                    op();
                }
            }));
        }
        for join in joins {
            join.join().expect("thread panicked");
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ops = threads * iterations_per_thread;
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / total_ops as f64;
    let ops_per_sec = total_ops as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (threads={threads}, total_ops={total_ops}, repeats={REPEATS})"
    );
}

/// One user holding `roles` roles, each granting its own `resN:read` code.
/// Returns the code granted by the last role.
fn setup_store(roles: usize) -> (MemoryStore, UserId, PermissionCode) {
    let store = MemoryStore::new();
    let engine = EngineBuilder::new(store.clone()).build();
    let user = UserId::new(1);
    let mut last = None;

    block_on(async {
        for i in 0..roles {
            let role = engine
                .create_role(NewRole::new(
                    RoleName::new(format!("role_{i}")).unwrap(),
                    "perf",
                ))
                .await
                .unwrap();
            let code = PermissionCode::from_parts(format!("res{i}"), "read").unwrap();
            let permission = engine
                .create_permission(NewPermission::new(code.clone(), "perf"))
                .await
                .unwrap();
            engine
                .assign_permissions_to_role(role.id, &[permission.id])
                .await
                .unwrap();
            engine.assign_role_to_user(user, role.id).await.unwrap();
            last = Some(code);
        }
    });

    (store, user, last.unwrap())
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_check_permission() {
    let iterations = 200_000;

    let (store, user, code) = setup_store(1);
    let engine = EngineBuilder::new(store).build();
    benchmark_sync("check_flat_no_cache", iterations, || {
        let result = block_on(engine.check_permission(user, &code)).unwrap();
        black_box(result);
    });

    let (store, user, code) = setup_store(1);
    let engine = EngineBuilder::new(store)
        .cache(MemoryCache::new(8_192))
        .build();
    assert!(block_on(engine.check_permission(user, &code)).unwrap());
    benchmark_sync("check_flat_hot_cache", iterations, || {
        let result = block_on(engine.check_permission(user, &code)).unwrap();
        black_box(result);
    });
    benchmark_sync("user_permissions_hot_cache", iterations, || {
        let result = block_on(engine.get_user_permissions(user)).unwrap();
        black_box(result);
    });

    let (store, user, code) = setup_store(32);
    let engine = EngineBuilder::new(store).build();
    benchmark_sync("check_fanout32_no_cache", iterations / 4, || {
        let result = block_on(engine.check_permission(user, &code)).unwrap();
        black_box(result);
    });

    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let iterations_per_thread = 50_000;

    let (store, user, code) = setup_store(1);
    let engine = Arc::new(
        EngineBuilder::new(store)
            .cache(MemoryCache::new(8_192))
            .build(),
    );
    assert!(block_on(engine.check_permission(user, &code)).unwrap());

    let engine_for_parallel = Arc::clone(&engine);
    benchmark_parallel(
        "check_flat_hot_cache_parallel",
        threads,
        iterations_per_thread,
        move || {
            let engine = Arc::clone(&engine_for_parallel);
            let code = code.clone();
            Box::new(move || {
                let result = block_on(engine.check_permission(user, &code)).unwrap();
                black_box(result);
            })
        },
    );

    let stats = block_on(engine.cache_stats());
    assert_eq!(stats.permission_checks, 1);
}
