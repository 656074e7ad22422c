use super::node::NodeCore;
use super::{AsStage, Chunk, Consumed, IntoReadable, NodeKind, Readable, Stage, Writable};
use crate::config::StreamOptions;
use crate::error::{ConfigError, StreamConsumeError, StreamProduceError};
use crate::runtime::Handle;

use tracing::trace;

use std::cell::RefCell;
use std::rc::Rc;

/// The head of a pipeline.
///
/// Chunks are pushed with [`produce`](Self::produce); a well-behaved
/// producer stops when it returns `false` and continues from
/// [`on_drain`](Self::on_drain). [`Source::from_iter`] does this on its own.
pub struct Source<T> {
    core: Rc<NodeCore<T>>,
}

impl<T: Chunk> Source<T> {
    pub fn new(handle: &Handle, options: StreamOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            core: Rc::new(NodeCore::new(handle, NodeKind::Source, options)?),
        })
    }

    /// A source fed from `iter` in Poll-phase callbacks.
    ///
    /// The generator stops pulling as soon as the buffer reaches its
    /// high-water mark and resumes when the drain signal fires. The source
    /// completes when the iterator is exhausted.
    pub fn from_iter<I>(handle: &Handle, options: StreamOptions, iter: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let source = Self::new(handle, options)?;

        let generator = Rc::new(Generator {
            core: source.core.clone(),
            iter: RefCell::new(Box::new(iter.into_iter())),
        });
        generator.schedule();

        Ok(source)
    }

    node_accessors!(core);

    pub fn produce(&self, chunk: T) -> Result<bool, StreamProduceError> {
        self.core.produce(chunk)
    }

    /// Calls `waker` once the buffer drains after `produce` returned `false`.
    pub fn on_drain<F>(&self, waker: F)
    where
        F: FnOnce() + 'static,
    {
        Writable::on_drain(&*self.core, Box::new(waker));
    }

    pub fn complete(&self) {
        self.core.complete();
    }

    pub fn fail(&self, error: impl Into<anyhow::Error>) {
        self.core.fail(error.into());
    }

    pub fn consume(&self) -> Result<Consumed<T>, StreamConsumeError> {
        self.core.consume()
    }

    pub fn on_readable<F>(&self, waker: F)
    where
        F: FnOnce() + 'static,
    {
        Readable::on_readable(&*self.core, Box::new(waker));
    }

    pub fn pause(&self) {
        Readable::pause(&*self.core);
    }

    pub fn resume(&self) {
        Readable::resume(&*self.core);
    }

    pub fn is_flowing(&self) -> bool {
        Readable::is_flowing(&*self.core)
    }
}

impl<T: Chunk> AsStage for Source<T> {
    fn stage(&self) -> Rc<dyn Stage> {
        self.core.clone()
    }
}

impl<T: Chunk> IntoReadable<T> for Source<T> {
    fn readable(&self) -> Rc<dyn Readable<T>> {
        self.core.clone()
    }
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// Pulls chunks out of an iterator into a source.
struct Generator<T> {
    core: Rc<NodeCore<T>>,
    iter: RefCell<Box<dyn Iterator<Item = T>>>,
}

impl<T: Chunk> Generator<T> {
    fn schedule(self: &Rc<Self>) {
        let generator = self.clone();
        let handle = Stage::handle(&*self.core);

        if handle.schedule_poll(move || generator.run()).is_err() {
            trace!(node = %Stage::id(&*self.core), "generator dropped by a torn-down loop");
        }
    }

    fn run(self: &Rc<Self>) {
        loop {
            let next = self.iter.borrow_mut().next();

            let Some(chunk) = next else {
                self.core.complete();
                return;
            };

            match self.core.produce(chunk) {
                Ok(true) => continue,
                Ok(false) => {
                    let generator = self.clone();
                    Writable::on_drain(&*self.core, Box::new(move || generator.schedule()));
                    return;
                }
                Err(_) => return,
            }
        }
    }
}
