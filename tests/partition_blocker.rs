use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ecs_executor::engine::blocker::{execute_and_wait_until_zero, CounterBlocker};
use ecs_executor::engine::partition::{partition, split_count};
use ecs_executor::engine::settings::ParallelismStrategy;

#[test]
fn eight_entities_three_slices() {
    let ranges = partition(8, 3);
    let sizes: Vec<usize> = ranges.iter().map(|range| range.len()).collect();
    assert_eq!(sizes, vec![3, 3, 2]);
    assert_eq!(ranges, vec![0..3, 3..6, 6..8]);
}

#[test]
fn partition_is_contiguous_balanced_and_covering() {
    for total in 0..40 {
        for splits in 1..10 {
            let ranges = partition(total, splits);
            assert_eq!(ranges.len(), splits);

            let mut expected_begin = 0;
            for range in &ranges {
                assert_eq!(range.start, expected_begin);
                expected_begin = range.end;
            }
            assert_eq!(expected_begin, total);

            let min = ranges.iter().map(|range| range.len()).min().unwrap();
            let max = ranges.iter().map(|range| range.len()).max().unwrap();
            assert!(max - min <= 1, "total {total} splits {splits}");
        }
    }
}

#[test]
fn split_count_respects_strategy_and_bounds() {
    assert_eq!(split_count(ParallelismStrategy::None, 8, 100), 1);
    assert_eq!(split_count(ParallelismStrategy::SplitEvenly, 4, 100), 4);
    assert_eq!(split_count(ParallelismStrategy::SplitEvenly, 4, 3), 3);
    assert_eq!(split_count(ParallelismStrategy::SplitEvenly, 4, 0), 1);
    assert_eq!(split_count(ParallelismStrategy::SplitEveryN(10), 8, 25), 3);
    assert_eq!(split_count(ParallelismStrategy::SplitEveryN(10), 2, 25), 2);
    assert_eq!(split_count(ParallelismStrategy::SplitEveryN(0), 8, 5), 5);
}

#[test]
fn blocker_at_zero_does_not_block() {
    let blocker = CounterBlocker::new(0);
    blocker.wait_until_zero();
    assert_eq!(blocker.remaining(), 0);
}

#[test]
fn blocker_waits_for_k_decrements() {
    let k = 6;
    let blocker = Arc::new(CounterBlocker::new(k));
    let done = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..k)
        .map(|i| {
            let blocker = Arc::clone(&blocker);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(2 * i as u64));
                done.fetch_add(1, Ordering::SeqCst);
                blocker.decrement_and_notify();
            })
        })
        .collect();

    blocker.wait_until_zero();
    assert_eq!(done.load(Ordering::SeqCst), k);

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn blocker_releases_every_waiter() {
    let blocker = Arc::new(CounterBlocker::new(1));
    let released = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let blocker = Arc::clone(&blocker);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                blocker.wait_until_zero();
                released.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(10));
    blocker.decrement_and_notify();

    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(released.load(Ordering::SeqCst), 4);
}

#[test]
fn guard_decrements_even_when_the_worker_panics() {
    let blocker = Arc::new(CounterBlocker::new(1));

    let worker = {
        let blocker = Arc::clone(&blocker);
        thread::spawn(move || {
            let _done = blocker.decrement_on_drop();
            panic!("worker failed");
        })
    };

    blocker.wait_until_zero();
    assert!(worker.join().is_err());
}

#[test]
fn execute_then_wait_runs_inline_work_first() {
    let blocker = Arc::new(CounterBlocker::new(2));
    let helper = {
        let blocker = Arc::clone(&blocker);
        thread::spawn(move || blocker.decrement_and_notify())
    };

    let value = execute_and_wait_until_zero(&blocker, || {
        blocker.decrement_and_notify();
        41 + 1
    });

    assert_eq!(value, 42);
    assert_eq!(blocker.remaining(), 0);
    helper.join().unwrap();
}
