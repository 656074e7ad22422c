#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Records the order in which callbacks ran.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    /// A callback appending `entry` when it runs.
    pub fn recorder(&self, entry: &str) -> impl FnOnce() + 'static {
        let log = self.clone();
        let entry = entry.to_string();
        move || log.push(entry)
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}
