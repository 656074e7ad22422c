//! Demo: a source, a line splitter and a sink connected into a pipeline

use eventide::config::StreamOptions;
use eventide::stream::{Pipeline, Sink, Source, Transform};

#[eventide::main]
fn main(handle: eventide::Handle) {
    let text = ["first li", "ne\nsecond line\nth", "ird line"].map(String::from);

    let source = Source::from_iter(&handle, StreamOptions::object().high_water_mark(2), text).unwrap();
    let lines = Transform::lines(&handle, StreamOptions::object()).unwrap();
    let sink = Sink::new(&handle, StreamOptions::object().high_water_mark(1), |line: String| {
        println!("line: {line}");
    })
    .unwrap();

    let done = Pipeline::new(&source)
        .pipe(&lines)
        .unwrap()
        .to(&sink)
        .unwrap()
        .run();

    done.then(|result| match result {
        Ok(()) => println!("pipeline finished"),
        Err(failure) => eprintln!("{failure}"),
    })
    .unwrap();
}
