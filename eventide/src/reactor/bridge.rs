use crate::error::SchedulingError;
use crate::queue::{Callback, IntoOutcome};
use crate::utils::Slab;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use tracing::{debug, trace, warn};

use std::any::Any;
use std::time::Duration;

/// A completion callback that may be built on another thread.
type SendCallback = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A loop-local continuation receiving a `Send` payload.
type Continuation = Box<dyn FnOnce(Box<dyn Any + Send>) -> anyhow::Result<()>>;

/// Messages sent from collaborators to the loop.
///
/// Every registration sends exactly one message over its lifetime.
pub(crate) enum Message {
    /// Run `callback` in the Poll phase.
    Notify { token: usize, callback: SendCallback },

    /// Hand `payload` to the registration's local continuation.
    Complete {
        token: usize,
        payload: Box<dyn Any + Send>,
    },

    /// The registration was dropped without completing.
    Release { token: usize },
}

/// Bookkeeping for one outstanding registration.
struct Pending {
    label: String,
    continuation: Option<Continuation>,
}

/// The loop side of the I/O completion bridge.
///
/// The bridge owns:
/// - the single-consumer end of the completion channel,
/// - a slab of outstanding registrations, indexed by token.
///
/// Outstanding registrations keep the loop alive and allow the Poll phase
/// to block waiting for completions.
pub(crate) struct Bridge {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    pending: Slab<Pending>,
}

impl Bridge {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self {
            sender,
            receiver,
            pending: Slab::new(16),
        }
    }

    /// Registers an operation and returns the collaborator's side of it.
    pub(crate) fn register(
        &mut self,
        label: &str,
        continuation: Option<Continuation>,
    ) -> IoCompletion {
        let token = self.pending.insert(Pending {
            label: label.to_string(),
            continuation,
        });

        debug!(token, label, "registered I/O operation");

        IoCompletion {
            token,
            sender: self.sender.clone(),
            done: false,
        }
    }

    /// Number of registrations that have not delivered their message yet.
    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Receives every message already in the channel.
    pub(crate) fn try_collect(&mut self) -> Vec<Callback> {
        let mut ready = Vec::new();

        loop {
            match self.receiver.try_recv() {
                Ok(message) => ready.extend(self.accept(message)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        ready
    }

    /// Blocks until a message arrives or `timeout` elapses.
    ///
    /// `None` waits without a deadline; callers only do that while
    /// registrations are outstanding.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> Vec<Callback> {
        let first = match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
            },
            None => self.receiver.recv().ok(),
        };

        let mut ready = Vec::new();
        if let Some(message) = first {
            ready.extend(self.accept(message));
        }

        ready.extend(self.try_collect());
        ready
    }

    /// Forgets every outstanding registration and disconnects their
    /// senders, so that later `notify`/`complete` calls fail.
    ///
    /// Undelivered messages are dropped with the old channel. The returned
    /// [`Cleared`] owns the loop-local continuations; release it after the
    /// loop state is no longer borrowed.
    pub(crate) fn clear(&mut self) -> Cleared {
        let (sender, receiver) = unbounded();
        self.sender = sender;
        self.receiver = receiver;

        Cleared {
            registrations: self.pending.drain(),
        }
    }

    fn accept(&mut self, message: Message) -> Option<Callback> {
        match message {
            Message::Notify { token, callback } => {
                let pending = self.pending.remove(token)?;
                trace!(token, label = %pending.label, "I/O completion received");

                Some(Callback::once(callback))
            }
            Message::Complete { token, payload } => {
                let pending = self.pending.remove(token)?;
                trace!(token, label = %pending.label, "I/O payload received");

                match pending.continuation {
                    Some(continuation) => Some(Callback::once(move || continuation(payload))),
                    None => {
                        warn!(token, label = %pending.label, "I/O payload without a continuation dropped");
                        None
                    }
                }
            }
            Message::Release { token } => {
                if let Some(pending) = self.pending.remove(token) {
                    debug!(token, label = %pending.label, "I/O registration released");
                }

                None
            }
        }
    }
}

/// Registrations removed by [`Bridge::clear`].
pub(crate) struct Cleared {
    registrations: Vec<Pending>,
}

impl Cleared {
    /// Number of registrations that were still outstanding.
    pub(crate) fn registrations(&self) -> usize {
        self.registrations.len()
    }
}

/// The collaborator's side of an I/O registration.
///
/// Created by [`Handle::register_io`](crate::Handle::register_io). It is
/// `Send`, so it can move to whichever thread performs the operation.
/// Completing it enqueues a callback into the Poll phase of the loop that
/// issued it; dropping it without completing releases the registration.
pub struct IoCompletion {
    token: usize,
    sender: Sender<Message>,
    done: bool,
}

impl IoCompletion {
    /// Token identifying this registration inside its loop.
    pub fn token(&self) -> usize {
        self.token
    }

    /// Enqueues `callback` into the Poll phase of the owning loop.
    pub fn notify<F, R>(mut self, callback: F) -> Result<(), SchedulingError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoOutcome,
    {
        self.done = true;

        self.sender
            .send(Message::Notify {
                token: self.token,
                callback: Box::new(move || callback().into_outcome()),
            })
            .map_err(|_| SchedulingError::TornDown)
    }

    /// Hands `value` to the continuation registered with
    /// [`Handle::register_io_with`](crate::Handle::register_io_with).
    pub fn complete<T>(mut self, value: T) -> Result<(), SchedulingError>
    where
        T: Send + 'static,
    {
        self.done = true;

        self.sender
            .send(Message::Complete {
                token: self.token,
                payload: Box::new(value),
            })
            .map_err(|_| SchedulingError::TornDown)
    }
}

impl Drop for IoCompletion {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.sender.send(Message::Release { token: self.token });
        }
    }
}

impl std::fmt::Debug for IoCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoCompletion")
            .field("token", &self.token)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn notify_from_another_thread_yields_a_callback() {
        let mut bridge = Bridge::new();
        let completion = bridge.register("read", None);
        assert_eq!(bridge.outstanding(), 1);

        thread::spawn(move || completion.notify(|| ()).unwrap())
            .join()
            .unwrap();

        let mut ready = bridge.wait(Some(Duration::from_secs(1)));
        assert_eq!(ready.len(), 1);
        assert_eq!(bridge.outstanding(), 0);
        ready[0].execute().unwrap();
    }

    #[test]
    fn dropping_a_registration_releases_it() {
        let mut bridge = Bridge::new();
        drop(bridge.register("abandoned", None));

        assert!(bridge.try_collect().is_empty());
        assert_eq!(bridge.outstanding(), 0);
    }

    #[test]
    fn payload_goes_to_the_continuation() {
        let mut bridge = Bridge::new();
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = seen.clone();

        let completion = bridge.register(
            "compute",
            Some(Box::new(move |payload| {
                let value = payload
                    .downcast::<u32>()
                    .map_err(|_| anyhow::anyhow!("wrong payload"))?;
                sink.set(*value);
                Ok(())
            })),
        );

        completion.complete(41u32 + 1).unwrap();

        for mut callback in bridge.try_collect() {
            callback.execute().unwrap();
        }
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn clear_disconnects_outstanding_registrations() {
        let mut bridge = Bridge::new();
        let completion = bridge.register("read", None);
        let abandoned = bridge.register("write", None);

        let cleared = bridge.clear();
        assert_eq!(cleared.registrations(), 2);
        drop(cleared);

        assert_eq!(completion.notify(|| ()), Err(SchedulingError::TornDown));
        drop(abandoned);
        assert_eq!(bridge.outstanding(), 0);
        assert!(bridge.try_collect().is_empty());
    }

    #[test]
    fn wait_times_out_without_messages() {
        let mut bridge = Bridge::new();
        let _completion = bridge.register("slow", None);

        assert!(bridge.wait(Some(Duration::from_millis(5))).is_empty());
        assert_eq!(bridge.outstanding(), 1);
    }
}
