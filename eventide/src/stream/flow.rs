use super::Waker;

/// Whether a node's output is being pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Ready,
    Paused,
}

/// Flow-control state of a node's output side.
///
/// Pausing only records that the consumer backed off; resuming hands back
/// the wake callbacks registered while paused so the caller can schedule
/// them.
#[derive(Default)]
pub struct Flow {
    state: FlowState,
    resume: Vec<Waker>,
}

impl Flow {
    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == FlowState::Ready
    }

    pub fn pause(&mut self) {
        self.state = FlowState::Paused;
    }

    /// Switches to `Ready`, returning the callbacks waiting for it.
    #[must_use]
    pub fn resume(&mut self) -> Vec<Waker> {
        self.state = FlowState::Ready;
        std::mem::take(&mut self.resume)
    }

    /// Registers `waker` for the next resume.
    ///
    /// Returns it back if the flow is already `Ready`.
    pub fn on_resume(&mut self, waker: Waker) -> Option<Waker> {
        match self.state {
            FlowState::Ready => Some(waker),
            FlowState::Paused => {
                self.resume.push(waker);
                None
            }
        }
    }

    /// Drops every registered callback.
    pub fn clear(&mut self) {
        self.resume.clear();
    }
}
