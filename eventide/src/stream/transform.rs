use super::node::NodeCore;
use super::{AsStage, Chunk, IntoReadable, IntoWritable, NodeId, NodeKind, NodeStatus, Readable, Stage, Waker, Writable};
use crate::config::StreamOptions;
use crate::error::{ConfigError, StreamProduceError};
use crate::queue::IntoOutcome;
use crate::runtime::Handle;

use std::cell::RefCell;
use std::rc::Rc;

type Apply<I, O> = Box<dyn for<'a> FnMut(I, &Emitter<'a, O>) -> anyhow::Result<()>>;

/// Output side handed to transform and flush functions.
pub struct Emitter<'a, O> {
    core: &'a NodeCore<O>,
}

impl<O: Chunk> Emitter<'_, O> {
    /// Appends `chunk` to the transform's output buffer.
    pub fn push(&self, chunk: O) -> Result<(), StreamProduceError> {
        self.core.push(chunk)
    }
}

/// A node that turns every input chunk into zero or more output chunks.
///
/// The transform function runs synchronously inside `produce`, so the
/// node's only buffer is its output buffer and its high-water mark bounds
/// the output. A function that expands one input into many outputs can
/// overshoot the mark by the size of one expansion.
///
/// The optional flush hook runs exactly once, when upstream completes and
/// before this node signals completion downstream.
pub struct Transform<I, O> {
    intake: Rc<Intake<I, O>>,
}

struct Intake<I, O> {
    core: Rc<NodeCore<O>>,
    apply: RefCell<Apply<I, O>>,
}

impl<I: Chunk, O: Chunk> Transform<I, O> {
    pub fn new<F, R>(handle: &Handle, options: StreamOptions, apply: F) -> Result<Self, ConfigError>
    where
        F: for<'a> FnMut(I, &Emitter<'a, O>) -> R + 'static,
        R: IntoOutcome,
    {
        let mut apply = apply;
        let core = Rc::new(NodeCore::new(handle, NodeKind::Transform, options)?);

        Ok(Self {
            intake: Rc::new(Intake {
                core,
                apply: RefCell::new(Box::new(move |chunk: I, out: &Emitter<'_, O>| {
                    apply(chunk, out).into_outcome()
                })),
            }),
        })
    }

    /// A one-to-one transform.
    pub fn map<F>(handle: &Handle, options: StreamOptions, map: F) -> Result<Self, ConfigError>
    where
        F: FnMut(I) -> O + 'static,
    {
        let mut map = map;
        Self::new(handle, options, move |chunk, out| out.push(map(chunk)))
    }

    /// Installs the hook emitting residual output after upstream completes.
    pub fn with_flush<F, R>(self, flush: F) -> Self
    where
        F: FnOnce(&Emitter<'_, O>) -> R + 'static,
        R: IntoOutcome,
    {
        self.intake
            .core
            .set_flush(Box::new(move |core: &NodeCore<O>| {
                flush(&Emitter { core }).into_outcome()
            }));
        self
    }

    node_accessors!(intake.core);

    pub fn produce(&self, chunk: I) -> Result<bool, StreamProduceError> {
        Writable::produce(&*self.intake, chunk)
    }

    pub fn complete(&self) {
        self.intake.core.complete();
    }

    pub fn fail(&self, error: impl Into<anyhow::Error>) {
        self.intake.core.fail(error.into());
    }
}

impl Transform<String, String> {
    /// Splits text into lines.
    ///
    /// Complete lines are emitted without their terminator (`\n` or
    /// `\r\n`); the trailing partial line is emitted by the flush hook.
    pub fn lines(handle: &Handle, options: StreamOptions) -> Result<Self, ConfigError> {
        let pending = Rc::new(RefCell::new(String::new()));
        let tail = pending.clone();

        let transform = Self::new(handle, options, move |text: String, out| {
            let mut pending = pending.borrow_mut();
            pending.push_str(&text);

            while let Some(end) = pending.find('\n') {
                let mut line: String = pending.drain(..=end).collect();
                line.pop();

                if line.ends_with('\r') {
                    line.pop();
                }

                out.push(line)?;
            }

            Ok::<(), StreamProduceError>(())
        })?;

        Ok(transform.with_flush(move |out| {
            let rest = std::mem::take(&mut *tail.borrow_mut());

            if rest.is_empty() {
                return Ok(());
            }

            out.push(rest)
        }))
    }
}

impl<I: Chunk, O: Chunk> Writable<I> for Intake<I, O> {
    fn id(&self) -> NodeId {
        Stage::id(&*self.core)
    }

    fn status(&self) -> NodeStatus {
        Stage::status(&*self.core)
    }

    fn produce(&self, chunk: I) -> Result<bool, StreamProduceError> {
        self.core.check_open()?;

        let outcome = match self.apply.try_borrow_mut() {
            Ok(mut apply) => (*apply)(chunk, &Emitter { core: &self.core }),
            Err(_) => Err(anyhow::anyhow!("transform re-entered from its own function")),
        };

        if let Err(cause) = outcome {
            self.core.fail(cause);

            return Err(StreamProduceError {
                node: Stage::id(&*self.core),
                status: Stage::status(&*self.core),
            });
        }

        Ok(self.core.pressure())
    }

    fn on_drain(&self, waker: Waker) {
        Writable::on_drain(&*self.core, waker);
    }

    fn complete(&self) {
        self.core.complete();
    }

    fn fail(&self, error: anyhow::Error) {
        self.core.fail(error);
    }
}

impl<I: Chunk, O: Chunk> AsStage for Transform<I, O> {
    fn stage(&self) -> Rc<dyn Stage> {
        self.intake.core.clone()
    }
}

impl<I: Chunk, O: Chunk> IntoReadable<O> for Transform<I, O> {
    fn readable(&self) -> Rc<dyn Readable<O>> {
        self.intake.core.clone()
    }
}

impl<I: Chunk, O: Chunk> IntoWritable<I> for Transform<I, O> {
    fn writable(&self) -> Rc<dyn Writable<I>> {
        self.intake.clone()
    }
}

impl<I, O> Clone for Transform<I, O> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
        }
    }
}
