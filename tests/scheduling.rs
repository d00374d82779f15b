use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use timer_queue::{Duration, Instant, TaskManager, TaskState};
use tokio_test::assert_err;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn tasks_fire_in_due_order() {
    init_logging();
    let manager = TaskManager::new("ordering").unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let base = Instant::now() + Duration::from_millis(50);
    let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);

    for _ in 0..200 {
        let offset = Duration::from_millis(rng.gen_range(0..300));
        let due_at = base + offset;
        let fired = Arc::clone(&fired);
        manager
            .submit(
                move || {
                    assert!(Instant::now() >= due_at);
                    fired.lock().unwrap().push(due_at);
                },
                due_at,
            )
            .unwrap();
    }

    manager.shutdown();

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 200);
    assert!(fired.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn concurrent_submitters_and_cancellers() {
    init_logging();
    let manager = Arc::new(TaskManager::new("concurrent").unwrap());
    let (tx, rx) = mpsc::channel();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            let tx = tx.clone();
            thread::spawn(move || {
                let mut cancelled = Vec::new();
                for i in 0..25u64 {
                    let tx = tx.clone();
                    let id = worker * 100 + i;
                    let handle = manager
                        .submit_after(move || tx.send(id).unwrap(), Duration::from_millis(100 + i * 3))
                        .unwrap();
                    if i % 5 == 0 && manager.cancel(&handle) {
                        cancelled.push(id);
                    }
                }
                cancelled
            })
        })
        .collect();

    let mut cancelled = Vec::new();
    for worker in workers {
        cancelled.extend(worker.join().unwrap());
    }
    drop(tx);

    manager.shutdown();
    let ran: Vec<u64> = rx.iter().collect();

    assert_eq!(cancelled.len(), 8 * 5);
    assert_eq!(ran.len(), 8 * 25 - cancelled.len());
    assert!(ran.iter().all(|id| !cancelled.contains(id)));
}

#[test]
fn preemption_never_lengthens_the_wait() {
    let manager = TaskManager::new("preemption").unwrap();
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();

    for delay in [800u64, 400, 200, 100] {
        let tx = tx.clone();
        manager
            .submit_after(move || tx.send(delay).unwrap(), Duration::from_millis(delay))
            .unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 100);
    assert!(start.elapsed() < Duration::from_millis(300));

    manager.shutdown();
    let rest: Vec<u64> = rx.try_iter().collect();
    assert_eq!(rest, vec![200, 400, 800]);
}

#[test]
fn submit_after_shutdown_fails() {
    let manager = TaskManager::new("stopped").unwrap();
    let handle = manager
        .submit_after(|| {}, Duration::from_millis(10))
        .unwrap();

    manager.shutdown();
    manager.shutdown();

    assert_eq!(handle.state(), TaskState::Fired);
    let err = assert_err!(manager.submit(|| {}, Instant::now()));
    assert!(err.is_stopped());
    assert_eq!(err.to_string(), "task manager 'stopped' is stopped");
}
