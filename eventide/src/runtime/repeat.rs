use super::handle::Handle;
use super::phase::QueueId;
use crate::error::SchedulingError;
use crate::queue::CallbackHandle;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// What a repeated step asks for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run again after everything currently queued ahead of it.
    Continue,
    /// Stop repeating.
    Break,
}

#[derive(Default)]
struct Control {
    iterations: Cell<u64>,
    finished: Cell<bool>,
    cancelled: Cell<bool>,
    queued: RefCell<Option<CallbackHandle>>,
}

/// Handle to a step started with [`Handle::repeat`].
#[derive(Clone)]
pub struct RepeatHandle {
    control: Rc<Control>,
}

impl RepeatHandle {
    /// Number of times the step has run.
    pub fn iterations(&self) -> u64 {
        self.control.iterations.get()
    }

    /// Returns `true` once the step broke, was cancelled, or was dropped
    /// by a teardown.
    pub fn is_finished(&self) -> bool {
        self.control.finished.get()
    }

    /// Stops the repetition before its next iteration.
    pub fn cancel(&self) {
        self.control.cancelled.set(true);
        self.control.finished.set(true);

        if let Some(queued) = self.control.queued.borrow_mut().take() {
            queued.cancel();
        }
    }
}

/// A step travelling through the queue it repeats on.
struct Repeat {
    handle: Handle,
    queue: QueueId,
    step: Box<dyn FnMut() -> Step>,
    control: Rc<Control>,
}

impl Repeat {
    fn arm(self) -> Result<(), SchedulingError> {
        let handle = self.handle.clone();
        let control = self.control.clone();
        let queue = self.queue;

        let queued = handle.enqueue(queue, move || self.iterate())?;
        *control.queued.borrow_mut() = Some(queued);

        Ok(())
    }

    fn iterate(mut self) {
        if self.control.cancelled.get() {
            return;
        }

        let step = (self.step)();
        self.control
            .iterations
            .set(self.control.iterations.get() + 1);

        if step == Step::Continue && !self.control.cancelled.get() {
            // A torn-down loop drops the step, which marks it finished.
            let _ = self.arm();
        }
    }
}

impl Drop for Repeat {
    fn drop(&mut self) {
        self.control.finished.set(true);
    }
}

impl Handle {
    /// Runs `step` repeatedly, re-enqueueing it into `queue` after every
    /// iteration until it returns [`Step::Break`].
    ///
    /// Each iteration goes to the tail of `queue`, so other work queued
    /// there runs in between. On [`QueueId::Tick`] or [`QueueId::Reaction`]
    /// the phases do not advance until the step breaks; on the Check phase
    /// every other phase runs between iterations.
    pub fn repeat<F>(&self, queue: QueueId, step: F) -> Result<RepeatHandle, SchedulingError>
    where
        F: FnMut() -> Step + 'static,
    {
        let control = Rc::new(Control::default());

        Repeat {
            handle: self.clone(),
            queue,
            step: Box::new(step),
            control: control.clone(),
        }
        .arm()?;

        Ok(RepeatHandle { control })
    }
}
