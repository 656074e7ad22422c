use super::fatal::{Hooks, Recovery};
use super::handle::Handle;
use super::microtask::MicrotaskQueues;
use super::phase::{Phase, QueueId};
use super::stats::LoopStats;
use crate::config::LoopConfig;
use crate::error::{CallbackError, LoopError, SchedulingError, UncaughtError};
use crate::queue::{CallbackQueue, Entry, EntryState};
use crate::reactor::{Bridge, Cleared, TimerEntry, TimerQueue};

use tracing::{debug, error, trace, warn};

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Everything the loop owns that callbacks can mutate through a [`Handle`].
///
/// The state is never borrowed while a callback runs: entries are taken
/// out, executed, and only then is the state touched again.
pub(crate) struct State {
    pub(crate) timers: TimerQueue,
    pub(crate) pending: CallbackQueue,
    pub(crate) poll: CallbackQueue,
    pub(crate) check: CallbackQueue,
    pub(crate) close: CallbackQueue,
    pub(crate) microtasks: MicrotaskQueues,
    pub(crate) bridge: Bridge,
    pub(crate) stats: LoopStats,
    pub(crate) torn_down: bool,
}

impl State {
    fn new() -> Self {
        Self {
            timers: TimerQueue::new(),
            pending: CallbackQueue::new(),
            poll: CallbackQueue::new(),
            check: CallbackQueue::new(),
            close: CallbackQueue::new(),
            microtasks: MicrotaskQueues::default(),
            bridge: Bridge::new(),
            stats: LoopStats::default(),
            torn_down: false,
        }
    }

    /// FIFO queue backing `phase`; timers live in their own heap.
    pub(crate) fn queue_mut(&mut self, phase: Phase) -> Option<&mut CallbackQueue> {
        match phase {
            Phase::Timers => None,
            Phase::PendingCallbacks => Some(&mut self.pending),
            Phase::Poll => Some(&mut self.poll),
            Phase::Check => Some(&mut self.check),
            Phase::Close => Some(&mut self.close),
        }
    }

    fn has_queued_callbacks(&self) -> bool {
        !self.pending.is_empty()
            || !self.poll.is_empty()
            || !self.check.is_empty()
            || !self.close.is_empty()
            || !self.microtasks.is_empty()
    }

    /// Live timers, outstanding I/O or queued callbacks keep the loop alive.
    pub(crate) fn is_alive(&mut self) -> bool {
        !self.torn_down
            && (self.timers.has_live()
                || self.bridge.outstanding() > 0
                || self.has_queued_callbacks())
    }

    /// How long the Poll phase may block.
    ///
    /// `None` means do not block, `Some(None)` means wait without a deadline.
    fn poll_timeout(&mut self) -> Option<Option<Duration>> {
        if self.has_queued_callbacks() {
            return None;
        }

        match self.timers.next_deadline() {
            Some(deadline) => Some(Some(deadline.saturating_duration_since(Instant::now()))),
            None if self.bridge.outstanding() > 0 => Some(None),
            None => None,
        }
    }
}

/// Work dropped by a teardown, released outside the state borrow.
struct Leftovers {
    entries: Vec<Entry>,
    timers: Vec<TimerEntry>,
    bridge: Cleared,
}

/// State shared between the loop and its handles.
pub(crate) struct Shared {
    state: RefCell<State>,
    hooks: RefCell<Hooks>,
    phase: Cell<Option<Phase>>,
    running: Cell<bool>,
    pub(crate) config: LoopConfig,
}

impl Shared {
    pub(crate) fn state(&self) -> RefMut<'_, State> {
        self.state.borrow_mut()
    }

    pub(crate) fn hooks(&self) -> RefMut<'_, Hooks> {
        self.hooks.borrow_mut()
    }

    pub(crate) fn phase(&self) -> Option<Phase> {
        self.phase.get()
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.state.borrow().torn_down
    }

    /// Appends `entry` to the tail of `queue`.
    ///
    /// `Phase::Timers` arms a zero-delay timer.
    pub(crate) fn push(&self, queue: QueueId, entry: Entry) -> Result<(), SchedulingError> {
        let mut state = self.state();

        if state.torn_down {
            return Err(SchedulingError::TornDown);
        }

        match queue {
            QueueId::Tick => state.microtasks.push_tick(entry),
            QueueId::Reaction => state.microtasks.push_reaction(entry),
            QueueId::Phase(phase) => match state.queue_mut(phase) {
                Some(queue) => queue.push(entry),
                None => state.timers.push(TimerEntry {
                    id: entry.id,
                    deadline: Instant::now(),
                    seq: 0,
                    period: None,
                    callback: entry.callback,
                    state: entry.state,
                }),
            },
        }

        Ok(())
    }

    /// Drops every queued callback and registration; later enqueues fail.
    pub(crate) fn teardown(&self) {
        let leftovers = {
            let mut state = self.state();

            if state.torn_down {
                return;
            }
            state.torn_down = true;

            let mut entries: Vec<Entry> = Vec::new();
            entries.extend(state.pending.take_all());
            entries.extend(state.poll.take_all());
            entries.extend(state.check.take_all());
            entries.extend(state.close.take_all());
            entries.extend(state.microtasks.take_all());

            Leftovers {
                entries,
                timers: state.timers.take_all(),
                bridge: state.bridge.clear(),
            }
        };

        debug!(
            callbacks = leftovers.entries.len(),
            timers = leftovers.timers.len(),
            registrations = leftovers.bridge.registrations(),
            "event loop torn down"
        );

        drop(leftovers);
    }

    /// Reports an uncaught error to the hooks and returns their verdict.
    fn report(&self, err: &UncaughtError) -> Recovery {
        let mut taken = std::mem::take(&mut *self.hooks());
        let recovery = taken.report(err);
        self.hooks().restore(taken);
        recovery
    }
}

/// A single-threaded event loop.
///
/// The loop cycles through the phases of [`Phase::ALL`]. Inside a phase it
/// executes one eligible callback, drains the microtask queues (priority
/// ticks first, then reactions), and repeats until the phase has nothing
/// eligible left. After Close it stops if nothing can produce more work.
///
/// All interaction from inside callbacks goes through a [`Handle`].
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = EventLoop::new();
/// let handle = event_loop.handle();
///
/// handle.set_timeout(|| println!("later"), 10)?;
/// handle.schedule_tick(|| println!("first"))?;
///
/// event_loop.run()?;
/// ```
pub struct EventLoop {
    shared: Rc<Shared>,
}

impl EventLoop {
    /// Creates a loop with the default configuration.
    pub fn new() -> Self {
        Self::with_parts(LoopConfig::default(), Hooks::default())
    }

    pub(crate) fn with_parts(config: LoopConfig, hooks: Hooks) -> Self {
        debug!(?config, "event loop created");

        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State::new()),
                hooks: RefCell::new(hooks),
                phase: Cell::new(None),
                running: Cell::new(false),
                config,
            }),
        }
    }

    /// Returns a handle for scheduling work on this loop.
    pub fn handle(&self) -> Handle {
        Handle::new(Rc::downgrade(&self.shared))
    }

    pub fn config(&self) -> &LoopConfig {
        &self.shared.config
    }

    /// Phase currently executing, `None` outside of [`run`](Self::run).
    pub fn phase(&self) -> Option<Phase> {
        self.shared.phase()
    }

    /// Snapshot of the loop counters.
    pub fn stats(&self) -> LoopStats {
        self.state().stats.clone()
    }

    /// Returns `true` if running the loop would do anything.
    pub fn is_alive(&self) -> bool {
        self.shared.state().is_alive()
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.is_torn_down()
    }

    /// Registers a hook observing every uncaught error.
    pub fn on_uncaught<F>(&self, hook: F)
    where
        F: FnMut(&UncaughtError) + 'static,
    {
        self.shared.hooks().add_diagnostic(Box::new(hook));
    }

    /// Installs the handler deciding whether the loop survives an uncaught error.
    pub fn set_uncaught_handler<F>(&self, handler: F)
    where
        F: FnMut(&UncaughtError) -> Recovery + 'static,
    {
        self.shared.hooks().set_handler(Box::new(handler));
    }

    /// Tears the loop down, dropping everything still queued.
    pub fn shutdown(&self) {
        self.shared.teardown();
    }

    /// Runs the loop until no timers, I/O registrations or queued
    /// callbacks remain.
    ///
    /// Microtasks queued before the call are drained before the first
    /// Timers phase. A loop that ran out of work can be run again once new
    /// work is scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Uncaught`] when a callback error is not
    /// recovered; the loop is torn down first.
    pub fn run(&self) -> Result<(), LoopError> {
        self.drive(false).map(|_| ())
    }

    /// Runs a single iteration of the loop.
    ///
    /// Returns whether the loop is still alive afterwards.
    pub fn run_once(&self) -> Result<bool, LoopError> {
        self.drive(true)
    }

    fn drive(&self, once: bool) -> Result<bool, LoopError> {
        if self.shared.running.replace(true) {
            return Err(LoopError::Reentrant);
        }

        debug!(once, "event loop started");
        let result = self.drive_inner(once);

        self.shared.running.set(false);
        self.shared.phase.set(None);

        match &result {
            Ok(alive) => debug!(alive, "event loop returned"),
            Err(err) => {
                error!(%err, "event loop failed");
                self.shared.teardown();
            }
        }

        result
    }

    fn drive_inner(&self, once: bool) -> Result<bool, LoopError> {
        self.shared.phase.set(None);
        self.drain_microtasks()?;

        loop {
            if self.shared.is_torn_down() {
                return Ok(false);
            }

            let alive = self.tick()?;
            if !alive || once {
                return Ok(alive);
            }
        }
    }

    /// One full cycle through every phase.
    fn tick(&self) -> Result<bool, LoopError> {
        for phase in Phase::ALL {
            if self.shared.is_torn_down() {
                return Ok(false);
            }

            self.shared.phase.set(Some(phase));
            trace!(%phase, "entering phase");

            match phase {
                Phase::Timers => self.run_timers()?,
                Phase::Poll => self.run_poll()?,
                other => self.run_batch(other)?,
            }
        }

        let mut state = self.state();
        state.stats.loop_ticks += 1;
        Ok(state.is_alive())
    }

    /// Runs the snapshot of timers due at phase start.
    fn run_timers(&self) -> Result<(), LoopError> {
        let due = self.state().timers.take_due(Instant::now());

        for mut timer in due {
            if self.shared.is_torn_down() {
                return Ok(());
            }

            // An earlier timer of this batch may have cancelled it.
            if timer.state.get() != EntryState::Pending {
                continue;
            }

            trace!(callback = timer.id.get(), repeating = timer.period.is_some(), "timer fired");
            timer.state.set(EntryState::Running);
            let outcome = timer.callback.execute();
            self.rearm(timer);

            self.settle(QueueId::Phase(Phase::Timers), outcome)?;
            self.drain_microtasks()?;
        }

        Ok(())
    }

    /// Re-arms an interval that is still live, or retires a one-shot.
    fn rearm(&self, mut timer: TimerEntry) {
        if timer.state.get() != EntryState::Running {
            return;
        }

        let next = timer
            .period
            .and_then(|period| Instant::now().checked_add(period));

        match next {
            Some(deadline) => {
                timer.state.set(EntryState::Pending);
                timer.deadline = deadline;

                let mut state = self.state();
                if !state.torn_down {
                    state.timers.push(timer);
                }
            }
            None => timer.state.set(EntryState::Done),
        }
    }

    /// Runs the batch queued at phase start; later arrivals wait a tick.
    fn run_batch(&self, phase: Phase) -> Result<(), LoopError> {
        let batch = match self.state().queue_mut(phase) {
            Some(queue) => queue.dequeue_all_ready(),
            None => return Ok(()),
        };

        for entry in batch {
            if self.shared.is_torn_down() {
                return Ok(());
            }

            self.invoke(QueueId::Phase(phase), entry)?;
        }

        Ok(())
    }

    /// Waits for I/O if nothing else is ready, then runs the poll queue
    /// until it is empty or the batch limit is hit.
    fn run_poll(&self) -> Result<(), LoopError> {
        {
            let mut state = self.state();

            if let Some(timeout) = state.poll_timeout() {
                trace!(?timeout, "poll phase blocking");

                let arrived = state.bridge.wait(timeout);
                for callback in arrived {
                    state.poll.push(Entry::new(callback).0);
                }
            }
        }

        let limit = self.shared.config.poll_batch_limit;
        let mut executed = 0;

        while executed < limit {
            if self.shared.is_torn_down() {
                return Ok(());
            }

            let next = {
                let mut state = self.state();

                let arrived = state.bridge.try_collect();
                for callback in arrived {
                    state.poll.push(Entry::new(callback).0);
                }

                state.poll.pop()
            };

            let Some(entry) = next else {
                return Ok(());
            };

            executed += 1;
            self.invoke(QueueId::Phase(Phase::Poll), entry)?;
        }

        debug!(limit, "poll batch limit reached");
        Ok(())
    }

    /// Executes one entry followed by a full microtask drain.
    fn invoke(&self, queue: QueueId, mut entry: Entry) -> Result<(), LoopError> {
        if !entry.begin() {
            return Ok(());
        }

        trace!(callback = entry.id.get(), ?queue, "running callback");
        let outcome = entry.callback.execute();
        entry.finish();

        self.settle(queue, outcome)?;
        self.drain_microtasks()
    }

    /// Runs priority ticks and reactions until both queues are empty.
    fn drain_microtasks(&self) -> Result<(), LoopError> {
        let budget = self.shared.config.microtask_budget;
        let mut executed = 0usize;

        loop {
            let next = {
                let mut state = self.state();

                if state.torn_down {
                    return Ok(());
                }

                state.microtasks.next()
            };

            let Some((queue, mut entry)) = next else {
                return Ok(());
            };

            if !entry.begin() {
                continue;
            }

            trace!(callback = entry.id.get(), ?queue, "running microtask");
            let outcome = entry.callback.execute();
            entry.finish();
            executed += 1;

            if budget.is_some_and(|budget| executed == budget + 1) {
                warn!(
                    executed,
                    phase = ?self.shared.phase(),
                    "microtask drain exceeded its budget; phases are starved"
                );
            }

            self.settle(queue, outcome)?;
        }
    }

    /// Records an executed callback and handles its error, if any.
    fn settle(&self, queue: QueueId, outcome: Result<(), CallbackError>) -> Result<(), LoopError> {
        {
            let mut state = self.state();
            state.stats.record(queue);

            if outcome.is_err() {
                state.stats.uncaught += 1;
            }
        }

        let Err(error) = outcome else {
            return Ok(());
        };

        let err = UncaughtError {
            phase: self.shared.phase(),
            queue,
            error,
        };

        match self.shared.report(&err) {
            Recovery::Resume => {
                warn!(%err, "recovered from uncaught callback error");
                Ok(())
            }
            Recovery::Abort => Err(err.into()),
        }
    }

    fn state(&self) -> RefMut<'_, State> {
        self.shared.state()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    /// Tears the loop down so that handles stop accepting work and queued
    /// callbacks release whatever they captured.
    fn drop(&mut self) {
        self.shared.teardown();
    }
}
