//! Demo: the order in which the event loop runs callbacks

use eventide::Handle;

#[eventide::main]
fn main(handle: Handle) {
    // Main script microtasks run before the first phase
    handle.schedule_tick(|| println!("tick A")).unwrap();
    handle.schedule_reaction(|| println!("reaction B")).unwrap();
    handle.schedule_tick(|| println!("tick C")).unwrap();

    handle.set_timeout(|| println!("timer"), 0).unwrap();
    handle.schedule_check(|| println!("check")).unwrap();
    handle.schedule_close(|| println!("close")).unwrap();
}
