//! Stress Tests - Concurrent Reference Counting
//!
//! These tests exercise race conditions in the lifetime contract by:
//! - Retaining and releasing one object from many tasks at once
//! - Querying capabilities concurrently from every view
//! - Creating and destroying instances through a shared factory
//! - Racing server locks against instance creation

mod common;

use std::sync::Arc;
use std::time::Instant;
use futures::future::join_all;
use tokio::sync::Barrier;

use com_core::{Aggregation, ComObject, ComPtr, ModuleConfig, ServerModule};
use common::*;

/// Test: many tasks clone and drop references to one object; it is destroyed exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_retain_release() {
    init_logging();

    const NUM_TASKS: usize = 64;
    const CLONES_PER_TASK: usize = 1000;

    let drops = DropTracker::new();
    let a = ComObject::create::<dyn IA>(Widget::new(&drops)).unwrap();
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let a = a.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                for _ in 0..CLONES_PER_TASK {
                    let extra = a.clone();
                    extra.add(1);
                    drop(extra);
                }
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap();
    }

    assert_eq!(ref_count(&a), 1);
    let b = a.query::<dyn IB>().unwrap();
    assert_eq!(b.total(), (NUM_TASKS * CLONES_PER_TASK) as u32);
    assert_eq!(drops.drops(), 0);

    drop(a);
    drop(b);
    assert_eq!(drops.drops(), 1);
}

/// Test: the last reference may be released on any task; destruction happens once
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_last_release() {
    init_logging();

    const NUM_OBJECTS: usize = 200;
    const HOLDERS: usize = 8;

    let drops = DropTracker::new();
    let barrier = Arc::new(Barrier::new(HOLDERS));

    let objects: Vec<ComPtr<dyn IA>> = (0..NUM_OBJECTS)
        .map(|_| ComObject::create::<dyn IA>(Widget::new(&drops)).unwrap())
        .collect();

    let handles: Vec<_> = (0..HOLDERS)
        .map(|holder| {
            let mine: Vec<ComPtr<dyn IB>> =
                objects.iter().map(|a| a.query::<dyn IB>().unwrap()).collect();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                // Release in a different order on every task.
                for (i, b) in mine.into_iter().enumerate() {
                    if (i + holder) % 2 == 0 {
                        tokio::task::yield_now().await;
                    }
                    drop(b);
                }
            })
        })
        .collect();

    drop(objects);
    for result in join_all(handles).await {
        result.unwrap();
    }

    assert_eq!(drops.drops(), NUM_OBJECTS);
}

/// Test: concurrent queries from both views of one object
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_queries() {
    init_logging();

    const NUM_TASKS: usize = 32;
    const QUERIES_PER_TASK: usize = 500;

    let drops = DropTracker::new();
    let a = ComObject::create::<dyn IA>(Widget::new(&drops)).unwrap();
    let b = a.query::<dyn IB>().unwrap();
    let stats = Arc::new(ConcurrentStats::new());
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|task| {
            let a = a.clone();
            let b = b.clone();
            let stats = stats.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                for i in 0..QUERIES_PER_TASK {
                    let start = Instant::now();
                    let ok = if (task + i) % 2 == 0 {
                        a.query::<dyn IB>().map(|v| v.is_same_object(&a)).unwrap_or(false)
                    } else {
                        b.query::<dyn IA>().map(|v| v.ptr_eq(&a)).unwrap_or(false)
                    };
                    let refused = a.query_interface(&IID_UNSUPPORTED).is_err();
                    if ok && refused {
                        stats.record_success(start.elapsed());
                    } else {
                        stats.record_failure();
                    }
                }
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap();
    }

    stats.print_summary("concurrent queries");
    assert_eq!(stats.failures(), 0);
    assert_eq!(stats.successes(), NUM_TASKS * QUERIES_PER_TASK);
    assert_eq!(ref_count(&a), 2);
}

/// Test: creation and destruction through one factory from many tasks
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_factory_creation() {
    init_logging();

    const NUM_TASKS: usize = 16;
    const INSTANCES_PER_TASK: usize = 250;

    let drops = DropTracker::new();
    let module = ServerModule::new(ModuleConfig::new("stress"));
    let widget_drops = drops.clone();
    module
        .register_class(move || Ok(Widget::new(&widget_drops)), Aggregation::Supported)
        .unwrap();
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|task| {
            let factory = factory.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let mut held = Vec::new();
                for i in 0..INSTANCES_PER_TASK {
                    // Lock the server around some of the creations.
                    let _lock = if (task + i) % 3 == 0 {
                        Some(factory.lock().unwrap())
                    } else {
                        None
                    };
                    let a = factory.create::<dyn IA>().unwrap();
                    a.add(1);
                    held.push(a);
                    if held.len() > 8 {
                        held.remove(0);
                    }
                }
            })
        })
        .collect();

    for result in join_all(handles).await {
        result.unwrap();
    }

    assert_eq!(drops.drops(), NUM_TASKS * INSTANCES_PER_TASK);
    assert_eq!(module.instance_count(), 0);
    assert_eq!(module.lock_count(), 0);
    assert!(module.can_unload_now());
}

/// Test: an instance limit holds under contention
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_instance_limit_under_contention() {
    init_logging();

    const NUM_TASKS: usize = 32;
    const LIMIT: usize = 10;

    let drops = DropTracker::new();
    let module = ServerModule::new(ModuleConfig::new("bounded").with_max_instances(LIMIT));
    let widget_drops = drops.clone();
    module
        .register_class(move || Ok(Widget::new(&widget_drops)), Aggregation::NotSupported)
        .unwrap();
    let factory = module.class_factory(&CLSID_WIDGET).unwrap();
    let barrier = Arc::new(Barrier::new(NUM_TASKS + 1));

    let handles: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let factory = factory.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let created = factory.create::<dyn IA>().ok();
                // Hold until every task has tried.
                barrier.wait().await;
                created.is_some()
            })
        })
        .collect();

    barrier.wait().await;
    barrier.wait().await;
    let created = join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(created, LIMIT);
    assert_eq!(module.instance_count(), 0);
    assert_eq!(drops.drops(), LIMIT);
}
