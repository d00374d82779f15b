//! Basic usage example for the task manager and TTL cache

use std::sync::mpsc;

use timer_queue::{CancellationToken, Duration, TaskManager, TaskManagerConfig, TtlCache};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cancel_token = CancellationToken::new();

    // Create task manager with configuration
    let config = TaskManagerConfig::new("example_task_manager")
        .with_cancel_token(cancel_token.clone())
        .with_failure_hook(|failure| {
            eprintln!("Task {} failed: {}", failure.task_id, failure.message);
        });
    let manager = TaskManager::with_config(config)?;

    // Submit tasks out of order, they run by due time
    let (tx, rx) = mpsc::channel();
    for (name, secs) in [("long_task", 3), ("short_task", 1), ("medium_task", 2)] {
        let tx = tx.clone();
        manager.submit_after(
            move || {
                let _ = tx.send(name);
            },
            Duration::from_secs(secs),
        )?;
    }

    println!("Tasks submitted! Waiting for them to run...");

    for _ in 0..3 {
        let name = rx.recv()?;
        println!("Task '{}' ran!", name);
    }

    // Demonstrate cancellation
    let handle = manager.submit_after(
        move || {
            let _ = tx.send("cancelled_task");
        },
        Duration::from_secs(10),
    )?;
    println!("Submitted a task that will be cancelled...");

    std::thread::sleep(Duration::from_millis(100));
    if manager.cancel(&handle) {
        println!("Task cancelled!");
    }

    // Hard stop: the token abandons whatever is still queued, including the
    // cancelled entry, so shutdown returns without waiting out its deadline
    cancel_token.cancel();
    manager.shutdown();
    println!("Task manager stopped!");

    // Sliding TTL cache
    let cache = TtlCache::new("example_cache")?;
    cache.add("greeting", "hello".to_string(), Duration::from_millis(200))?;

    std::thread::sleep(Duration::from_millis(150));
    println!("Read before expiry: {:?}", cache.get("greeting"));

    std::thread::sleep(Duration::from_millis(300));
    println!("Read after expiry: {:?}", cache.get("greeting"));
    println!("{}", cache);

    Ok(())
}
