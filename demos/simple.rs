//! Simple usage example

use semqueue::BoundedBuffer;
use std::sync::Arc;
use std::thread;

fn main() {
    println!("semqueue - Simple Example\n");

    // A buffer with 4 slots: the producer runs ahead by at most 4 messages
    let buffer = Arc::new(BoundedBuffer::<String>::new(4));

    let producer_buffer = buffer.clone();
    let consumer_buffer = buffer.clone();

    let producer = thread::spawn(move || {
        for i in 0..10 {
            let message = format!("Message {}", i);
            println!("Sending: {}", message);

            // Blocks while all 4 slots are taken
            producer_buffer.put(message);
        }
        println!("Producer finished!");
    });

    let consumer = thread::spawn(move || {
        for _ in 0..10 {
            let message = consumer_buffer.take();
            println!("Received: {}", message);

            // Slow consumer, so the producer fills the buffer and waits
            thread::sleep(std::time::Duration::from_millis(100));
        }
        println!("Consumer finished!");
    });

    producer.join().unwrap();
    consumer.join().unwrap();

    println!("\nPeak occupancy: {}/{}", buffer.peak(), buffer.capacity());
    println!("Example completed successfully!");
}
