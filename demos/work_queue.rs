use semqueue::{BoundedBuffer, Config, Consumer, Coordinator, ItemSource, Pacing, Producer, Shared};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    println!("Work Queue Example\n");

    const NUM_WORKERS: usize = 4;
    const NUM_JOBS: usize = 20;

    // Jobs flow through the task loops; results come back on a second buffer.
    let jobs = Arc::new(Shared::<String>::new(8));
    let results = Arc::new(BoundedBuffer::<String>::new(8));

    let source: ItemSource<String> = Arc::new(|_, seq| format!("Job-{:02}", seq));
    let enqueue = Producer::new(0, NUM_JOBS, jobs.clone(), source, Pacing::new(Duration::from_millis(50), Duration::from_millis(50)));
    let producer = thread::spawn(move || {
        let n = enqueue.run();
        println!("✅ All {} jobs enqueued!", n);
    });

    let config = Config::new(8, 1, NUM_WORKERS, NUM_JOBS);
    let mut workers = vec![];
    for worker_id in 0..NUM_WORKERS {
        let worker = Consumer::new(worker_id, config.consumer_quota(worker_id), jobs.clone(), Pacing::NONE);
        let results_tx = results.clone();

        workers.push(thread::spawn(move || {
            let processed = worker.run_with(|job| {
                println!("🔨 Worker {} processing: {}", worker_id, job);
                thread::sleep(Duration::from_millis(200));
                results_tx.put(format!("{} -> completed by worker {}", job, worker_id));
            });
            println!("Worker {} finished ({} jobs)", worker_id, processed);
        }));
    }

    let results_rx = results.clone();
    let collector = thread::spawn(move || {
        for _ in 0..NUM_JOBS {
            println!("✨ Result: {}", results_rx.take());
        }
        println!("✅ All results collected!");
    });

    producer.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    collector.join().unwrap();
    println!("Jobs produced: {}, consumed: {}", jobs.tally.produced(), jobs.tally.consumed());

    // The same shape, run end to end by the coordinator.
    let source: ItemSource<String> = Arc::new(|p, seq| format!("P{}-Job-{:02}", p, seq));
    let mut coordinator = Coordinator::with_source(Config::new(8, 2, NUM_WORKERS, 10), source).unwrap();
    let report = coordinator.run().unwrap();
    println!("\n{}", report);

    println!("\n🎉 Work queue example completed!");
}
