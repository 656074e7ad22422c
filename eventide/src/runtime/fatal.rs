use crate::error::UncaughtError;

/// What the loop does after an uncaught callback error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The error was handled; continue with the next eligible callback.
    Resume,
    /// Tear the loop down and return the error from `run`.
    Abort,
}

/// Observes every uncaught error before the loop decides how to proceed.
pub type DiagnosticHook = Box<dyn FnMut(&UncaughtError)>;

/// Decides whether the loop survives an uncaught error.
pub type UncaughtHandler = Box<dyn FnMut(&UncaughtError) -> Recovery>;

/// Registered diagnostic hooks and the optional override handler.
#[derive(Default)]
pub(crate) struct Hooks {
    diagnostics: Vec<DiagnosticHook>,
    handler: Option<UncaughtHandler>,
}

impl Hooks {
    pub(crate) fn add_diagnostic(&mut self, hook: DiagnosticHook) {
        self.diagnostics.push(hook);
    }

    pub(crate) fn set_handler(&mut self, handler: UncaughtHandler) {
        self.handler = Some(handler);
    }

    /// Runs every diagnostic hook, then asks the handler. Fail-fast without one.
    pub(crate) fn report(&mut self, err: &UncaughtError) -> Recovery {
        for hook in &mut self.diagnostics {
            hook(err);
        }

        match &mut self.handler {
            Some(handler) => handler(err),
            None => Recovery::Abort,
        }
    }

    /// Puts `previous` back in front of hooks registered while it was taken out.
    pub(crate) fn restore(&mut self, mut previous: Hooks) {
        previous.diagnostics.append(&mut self.diagnostics);
        self.diagnostics = previous.diagnostics;

        if self.handler.is_none() {
            self.handler = previous.handler;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use crate::runtime::QueueId;

    use std::cell::Cell;
    use std::rc::Rc;

    fn sample() -> UncaughtError {
        UncaughtError {
            phase: None,
            queue: QueueId::Tick,
            error: CallbackError::Panicked("x".into()),
        }
    }

    #[test]
    fn aborts_without_a_handler() {
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();

        let mut hooks = Hooks::default();
        hooks.add_diagnostic(Box::new(move |_| counter.set(counter.get() + 1)));

        assert_eq!(hooks.report(&sample()), Recovery::Abort);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn handler_decides_recovery() {
        let mut hooks = Hooks::default();
        hooks.set_handler(Box::new(|_| Recovery::Resume));

        assert_eq!(hooks.report(&sample()), Recovery::Resume);
    }

    #[test]
    fn restore_keeps_previous_and_new_hooks() {
        let mut taken = Hooks::default();
        taken.add_diagnostic(Box::new(|_| {}));
        taken.set_handler(Box::new(|_| Recovery::Resume));

        let mut current = Hooks::default();
        current.add_diagnostic(Box::new(|_| {}));
        current.restore(taken);

        assert_eq!(current.diagnostics.len(), 2);
        assert_eq!(current.report(&sample()), Recovery::Resume);
    }
}
