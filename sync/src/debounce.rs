use web_time::{Duration, Instant};

/// Identifies one write so its completion can be matched to the flush that started it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlushTicket(u64);

/// Persistence lifecycle of a grid.
///
/// Valid transitions:
/// - Clean -> Dirty (edit)
/// - Dirty -> Dirty (edit, deadline pushed back)
/// - Dirty -> Flushing (deadline reached)
/// - Flushing -> Clean (write succeeded, no edits meanwhile)
/// - Flushing -> Dirty (write failed, or edits arrived while writing)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PersistState {
    Clean,
    Dirty {
        deadline: Instant,
    },
    Flushing {
        ticket: FlushTicket,
        /// Deadline for the follow-up write when edits arrive mid-flight
        redirty: Option<Instant>,
    },
}

impl PersistState {
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Clean)
    }
}

impl Default for PersistState {
    fn default() -> Self {
        Self::Clean
    }
}

/// Coalesces bursts of edits into single writes, with at most one write in flight.
///
/// The grid itself is what gets written, not a queue of diffs, so moving or dropping the deadline never loses an edit.
#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    state: PersistState,
    next_ticket: u64,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: PersistState::Clean,
            next_ticket: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> PersistState {
        self.state
    }

    /// Whether the grid holds edits that have not been confirmed written.
    pub fn is_dirty(&self) -> bool {
        !self.state.is_clean()
    }

    /// When the pending write should start, `None` when clean or while a write is in flight.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PersistState::Dirty { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Records an edit made at `now`, restarting the quiet period.
    pub fn touch(&mut self, now: Instant) {
        let deadline = now + self.delay;
        self.state = match self.state {
            PersistState::Clean | PersistState::Dirty { .. } => PersistState::Dirty { deadline },
            PersistState::Flushing { ticket, .. } => PersistState::Flushing {
                ticket,
                redirty: Some(deadline),
            },
        };
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.state, PersistState::Dirty { deadline } if now >= deadline)
    }

    /// Starts a write if the deadline has passed.
    pub fn begin_flush(&mut self, now: Instant) -> Option<FlushTicket> {
        if self.is_due(now) { self.start() } else { None }
    }

    /// Starts a write right away if anything is pending and nothing is in flight.
    pub fn force_flush(&mut self) -> Option<FlushTicket> {
        match self.state {
            PersistState::Dirty { .. } => self.start(),
            _ => None,
        }
    }

    /// Completes the write identified by `ticket`.
    ///
    /// A failed write leaves the grid dirty and retries after another quiet period.
    pub fn finish_flush(&mut self, ticket: FlushTicket, succeeded: bool, now: Instant) {
        let PersistState::Flushing {
            ticket: current,
            redirty,
        } = self.state
        else {
            log::warn!("Ignoring completion of {:?}, no write in flight", ticket);
            return;
        };
        if current != ticket {
            log::warn!("Ignoring completion of {:?}, {:?} is in flight", ticket, current);
            return;
        }

        self.state = match (succeeded, redirty) {
            (true, None) => PersistState::Clean,
            (true, Some(deadline)) => PersistState::Dirty { deadline },
            (false, _) => PersistState::Dirty {
                deadline: now + self.delay,
            },
        };
    }

    /// Drops any pending or in-flight write, used when the grid is replaced wholesale from the store.
    pub fn reset(&mut self) {
        self.state = PersistState::Clean;
    }

    fn start(&mut self) -> Option<FlushTicket> {
        let ticket = FlushTicket(self.next_ticket);
        self.next_ticket += 1;
        self.state = PersistState::Flushing {
            ticket,
            redirty: None,
        };
        Some(ticket)
    }
}
