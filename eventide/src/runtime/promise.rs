use super::handle::Handle;
use crate::error::SchedulingError;
use crate::queue::IntoOutcome;

use tracing::debug;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Reaction<T> = Box<dyn FnOnce(T) -> anyhow::Result<()>>;

struct Inner<T> {
    value: Option<T>,
    reactions: Vec<Reaction<T>>,
}

/// A value that settles once.
///
/// Reactions registered with [`then`](Self::then) run as standard
/// microtasks: never synchronously, always after every priority tick that
/// is queued at that point.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
    handle: Handle,
}

/// The settling side of a [`Promise`].
pub struct Resolver<T> {
    inner: Rc<RefCell<Inner<T>>>,
    handle: Handle,
}

impl<T: Clone + 'static> Promise<T> {
    /// Creates an unsettled promise and its resolver.
    pub fn new(handle: &Handle) -> (Self, Resolver<T>) {
        let inner = Rc::new(RefCell::new(Inner {
            value: None,
            reactions: Vec::new(),
        }));

        (
            Self {
                inner: inner.clone(),
                handle: handle.clone(),
            },
            Resolver {
                inner,
                handle: handle.clone(),
            },
        )
    }

    /// Creates a promise that is already settled with `value`.
    pub fn resolved(handle: &Handle, value: T) -> Self {
        let (promise, resolver) = Self::new(handle);
        resolver.resolve(value);
        promise
    }

    /// Schedules `reaction` with the settled value.
    ///
    /// On a settled promise the reaction is queued immediately; otherwise
    /// it is queued when the promise settles.
    pub fn then<F, R>(&self, reaction: F) -> Result<(), SchedulingError>
    where
        F: FnOnce(T) -> R + 'static,
        R: IntoOutcome,
    {
        let settled = self.inner.borrow().value.clone();

        match settled {
            Some(value) => self
                .handle
                .schedule_reaction(move || reaction(value).into_outcome())
                .map(|_| ()),
            None => {
                if self.handle.is_torn_down() {
                    return Err(SchedulingError::TornDown);
                }

                self.inner
                    .borrow_mut()
                    .reactions
                    .push(Box::new(move |value| reaction(value).into_outcome()));
                Ok(())
            }
        }
    }

    /// The settled value, if any.
    pub fn peek(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().value.is_some()
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Settles the promise.
    ///
    /// Returns `false` if it was already settled; the first value wins.
    pub fn resolve(&self, value: T) -> bool {
        let reactions = {
            let mut inner = self.inner.borrow_mut();

            if inner.value.is_some() {
                return false;
            }

            inner.value = Some(value.clone());
            std::mem::take(&mut inner.reactions)
        };

        for reaction in reactions {
            let value = value.clone();

            if self
                .handle
                .schedule_reaction(move || reaction(value))
                .is_err()
            {
                debug!("promise reaction dropped by a torn-down loop");
            }
        }

        true
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().value.is_some()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("value", &self.inner.borrow().value)
            .finish()
    }
}
