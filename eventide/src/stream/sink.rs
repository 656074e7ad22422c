use super::node::NodeCore;
use super::{AsStage, Chunk, Consumed, IntoWritable, NodeKind, Readable, Stage, Writable};
use crate::config::StreamOptions;
use crate::error::{ConfigError, StreamConsumeError, StreamProduceError};
use crate::queue::IntoOutcome;
use crate::runtime::Handle;

use tracing::trace;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Write<T> = Box<dyn FnMut(T) -> anyhow::Result<()>>;

/// The tail of a pipeline.
///
/// A sink built with [`Sink::new`] hands its chunks to a writer, one chunk
/// per Poll-phase callback, so it is always slower than a synchronous
/// producer and its buffer fills up to the high-water mark. A writer error
/// fails the sink. A [`Sink::manual`] sink has no writer and is drained
/// with [`consume`](Self::consume).
///
/// The sink completes once `complete` was called and every buffered chunk
/// was written.
pub struct Sink<T> {
    core: Rc<NodeCore<T>>,
}

impl<T: Chunk> Sink<T> {
    pub fn new<F, R>(handle: &Handle, options: StreamOptions, write: F) -> Result<Self, ConfigError>
    where
        F: FnMut(T) -> R + 'static,
        R: IntoOutcome,
    {
        let sink = Self::manual(handle, options)?;
        let mut write = write;

        let writer = Rc::new(Writer {
            core: sink.core.clone(),
            write: RefCell::new(Box::new(move |chunk: T| write(chunk).into_outcome())),
            scheduled: Cell::new(false),
        });
        writer.arm();

        Ok(sink)
    }

    /// A sink without a writer.
    pub fn manual(handle: &Handle, options: StreamOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            core: Rc::new(NodeCore::new(handle, NodeKind::Sink, options)?),
        })
    }

    /// A sink that appends every chunk to the returned vector.
    pub fn collect(handle: &Handle, options: StreamOptions) -> Result<(Self, Rc<RefCell<Vec<T>>>), ConfigError> {
        let collected = Rc::new(RefCell::new(Vec::new()));
        let target = collected.clone();

        let sink = Self::new(handle, options, move |chunk| target.borrow_mut().push(chunk))?;
        Ok((sink, collected))
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

    /// Takes the next buffered chunk of a manual sink.
    pub fn consume(&self) -> Result<Consumed<T>, StreamConsumeError> {
        self.core.consume()
    }

    pub fn on_readable<F>(&self, waker: F)
    where
        F: FnOnce() + 'static,
    {
        Readable::on_readable(&*self.core, Box::new(waker));
    }
}

impl<T: Chunk> AsStage for Sink<T> {
    fn stage(&self) -> Rc<dyn Stage> {
        self.core.clone()
    }
}

impl<T: Chunk> IntoWritable<T> for Sink<T> {
    fn writable(&self) -> Rc<dyn Writable<T>> {
        self.core.clone()
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// Drains a sink's buffer into its writer.
struct Writer<T> {
    core: Rc<NodeCore<T>>,
    write: RefCell<Write<T>>,
    scheduled: Cell<bool>,
}

impl<T: Chunk> Writer<T> {
    /// Waits for the next chunk or the end of input.
    fn arm(self: &Rc<Self>) {
        let writer = self.clone();
        Readable::on_readable(&*self.core, Box::new(move || writer.schedule()));
    }

    fn schedule(self: &Rc<Self>) {
        if self.scheduled.replace(true) {
            return;
        }

        let writer = self.clone();
        let handle = Stage::handle(&*self.core);

        if handle.schedule_poll(move || writer.step()).is_err() {
            trace!(node = %Stage::id(&*self.core), "writer dropped by a torn-down loop");
        }
    }

    /// Writes a single chunk.
    fn step(self: &Rc<Self>) {
        self.scheduled.set(false);

        match self.core.consume() {
            Ok(Consumed::Chunk(chunk)) => {
                let written = {
                    let mut write = self.write.borrow_mut();
                    (*write)(chunk)
                };

                match written {
                    Ok(()) => self.arm(),
                    Err(cause) => self.core.fail(cause),
                }
            }
            Ok(Consumed::End) | Err(StreamConsumeError::Failed { .. }) => {}
            Err(StreamConsumeError::NotReady { .. }) => self.arm(),
        }
    }
}
