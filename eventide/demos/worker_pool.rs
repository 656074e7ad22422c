//! Demo: offloading CPU-bound work to a worker pool

use eventide::WorkerPool;

#[eventide::main]
fn main(handle: eventide::Handle) {
    let pool = WorkerPool::new(4);

    for n in [20u64, 25, 30] {
        pool.offload(&handle, move || fibonacci(n), move |result| match result {
            Ok(value) => println!("fib({n}) = {value}"),
            Err(err) => eprintln!("fib({n}) failed: {err}"),
        })
        .unwrap();
    }
}

fn fibonacci(n: u64) -> u64 {
    if n < 2 { n } else { fibonacci(n - 1) + fibonacci(n - 2) }
}
