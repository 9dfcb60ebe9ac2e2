use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of a single transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Retrying,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Retrying => "retrying",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Generation guard shared between a transport handle and its background task.
///
/// Every (re)start bumps the generation. A task only mutates state or
/// publishes while holding the gate and only if its own generation is still
/// current, so nothing from a superseded connection gets through once
/// `begin`/`end` has returned.
///
/// Code running inside [`if_current`](Self::if_current) on the same thread,
/// such as a dispatcher handler, may call `begin`/`end`: the gate is already
/// held there, so the generation is bumped without re-locking it.
pub struct Lifecycle {
    generation: AtomicU64,
    gate: Mutex<()>,
    state: watch::Sender<ConnectionState>,
}

thread_local! {
    /// Address of the `Lifecycle` whose gate this thread currently holds.
    static HOLDING: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as holding a gate; restores the previous mark on drop.
struct Holding {
    previous: usize,
}

impl Holding {
    fn enter(lifecycle: &Lifecycle) -> Self {
        let previous = HOLDING.with(|h| h.replace(lifecycle.addr()));
        Self { previous }
    }
}

impl Drop for Holding {
    fn drop(&mut self) {
        HOLDING.with(|h| h.set(self.previous));
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            generation: AtomicU64::new(0),
            gate: Mutex::new(()),
            state,
        }
    }

    /// Supersede any running task and enter `initial`. Returns the new generation.
    pub fn begin(&self, initial: ConnectionState) -> u64 {
        self.supersede(initial)
    }

    /// Supersede any running task and enter `Closed`.
    pub fn end(&self) {
        self.supersede(ConnectionState::Closed);
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run `f` if `generation` is still current. Returns whether it ran.
    pub fn if_current(&self, generation: u64, f: impl FnOnce()) -> bool {
        if self.held_here() {
            // Nested call from code already running under this gate.
            if self.current() != generation {
                return false;
            }
            f();
            return true;
        }

        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.current() != generation {
            return false;
        }
        let _holding = Holding::enter(self);
        f();
        true
    }

    /// Move to `state` if `generation` is still current.
    pub fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        self.if_current(generation, || self.transition(state))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn supersede(&self, next: ConnectionState) -> u64 {
        let _gate = if self.held_here() {
            None
        } else {
            Some(self.gate.lock().unwrap_or_else(PoisonError::into_inner))
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.transition(next);
        generation
    }

    fn held_here(&self) -> bool {
        HOLDING.with(|h| h.get() == self.addr())
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "connection state");
        }
    }
}
