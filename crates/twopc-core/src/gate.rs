//! The rendezvous point between the coordinator and its participants.
//!
//! A [`PhaseGate`] pairs a one-shot "open" signal with an N-of-N arrival
//! counter. The coordinator opens the gate, every participant arrives once,
//! and whoever waits for completion is released by the Nth arrival or by its
//! deadline.
//!
//! Both waits follow the same discipline: register interest in the notify
//! first, then check the condition, then sleep. A signal fired between the
//! check and the sleep is therefore never lost, and a condition that became
//! true before the deadline fired is always reported as ready.

use twopc_utils::atomic_flag::AtomicFlag;

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    Ready,
    TimedOut,
    Interrupted,
}

impl GateWait {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, GateWait::Ready)
    }
}

pub struct PhaseGate {
    name: &'static str,
    parties: usize,
    opened: AtomicFlag,
    arrived: AtomicUsize,
    open_notify: Notify,
    complete_notify: Notify,
}

impl PhaseGate {
    #[must_use]
    pub fn new(name: &'static str, parties: usize) -> Self {
        Self {
            name,
            parties,
            opened: AtomicFlag::new(false),
            arrived: AtomicUsize::new(0),
            open_notify: Notify::new(),
            complete_notify: Notify::new(),
        }
    }

    /// Releases every current and future waiter of [`PhaseGate::wait_open`].
    ///
    /// Returns `false` if the gate was already open.
    pub fn open(&self) -> bool {
        if self.opened.raise() {
            trace!(gate = self.name, "open");
            self.open_notify.notify_waiters();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened.get()
    }

    /// Records one arrival. Returns `true` for the arrival that completed the gate.
    ///
    /// Arrivals beyond the configured number of parties are ignored.
    pub fn arrive(&self) -> bool {
        let mut current = self.arrived.load(SeqCst);
        loop {
            if current >= self.parties {
                trace!(gate = self.name, "extra arrival ignored");
                return false;
            }
            let next = current.wrapping_add(1);
            match self.arrived.compare_exchange_weak(current, next, SeqCst, SeqCst) {
                Ok(_) => {
                    if next == self.parties {
                        trace!(gate = self.name, arrived = next, "complete");
                        self.complete_notify.notify_waiters();
                        return true;
                    }
                    return false;
                }
                Err(actual) => current = actual,
            }
        }
    }

    #[must_use]
    pub fn arrived(&self) -> usize {
        self.arrived.load(SeqCst)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.arrived() >= self.parties
    }

    pub async fn wait_open(&self, deadline: Instant, cancel: &CancellationToken) -> GateWait {
        wait_until(&self.open_notify, || self.is_open(), deadline, cancel).await
    }

    pub async fn await_completion(&self, deadline: Instant, cancel: &CancellationToken) -> GateWait {
        wait_until(&self.complete_notify, || self.is_complete(), deadline, cancel).await
    }
}

async fn wait_until(
    notify: &Notify,
    ready: impl Fn() -> bool,
    deadline: Instant,
    cancel: &CancellationToken,
) -> GateWait {
    let mut notified = pin!(notify.notified());
    loop {
        notified.as_mut().enable();
        if ready() {
            return GateWait::Ready;
        }
        tokio::select! {
            biased;
            () = notified.as_mut() => {
                notified.set(notify.notified());
            }
            () = cancel.cancelled() => {
                return if ready() { GateWait::Ready } else { GateWait::Interrupted };
            }
            () = sleep_until(deadline) => {
                return if ready() { GateWait::Ready } else { GateWait::TimedOut };
            }
        }
    }
}
