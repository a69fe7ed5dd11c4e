//! Per-request timeout scheduling
//!
//! Spawns a thread with its own tokio runtime that keeps a min-heap of
//! deadlines keyed by [`RequestId`]. Timers can be disarmed before they fire;
//! a disarmed entry left in the heap is skipped when its deadline passes.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::error::{BrokerError, Result};
use crate::types::RequestId;

/// Longest single sleep. Farther deadlines are approached in steps.
const MAX_SLEEP: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Commands sent from the broker to the timer worker
#[derive(Debug)]
pub(crate) enum TimerCommand {
    /// Fire `RequestId` after the given delay
    Arm { id: RequestId, after: Duration },
    /// Cancel a pending timer; no-op if it already fired
    Disarm(RequestId),
    /// Cancel everything pending
    DisarmAll,
    /// Stop the worker
    Shutdown,
}

/// Handle to the background timer worker.
pub(crate) struct TimeoutScheduler {
    command_tx: mpsc::UnboundedSender<TimerCommand>,
    _worker: JoinHandle<()>,
}

impl TimeoutScheduler {
    /// Spawn the worker. `on_expired` runs on the worker thread for each
    /// timer that reaches its deadline while still armed.
    pub fn spawn<F>(on_expired: F) -> Result<Self>
    where
        F: Fn(RequestId) + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let worker = thread::Builder::new()
            .name("geo-broker-timeouts".to_string())
            .spawn(move || {
                rt.block_on(run_timer_loop(command_rx, on_expired));
            })?;

        Ok(Self {
            command_tx,
            _worker: worker,
        })
    }

    pub fn arm(&self, id: RequestId, after: Duration) -> Result<()> {
        self.command_tx
            .send(TimerCommand::Arm { id, after })
            .map_err(|_| BrokerError::SchedulerUnavailable)
    }

    pub fn disarm(&self, id: RequestId) {
        if self.command_tx.send(TimerCommand::Disarm(id)).is_err() {
            tracing::debug!("Timer worker gone, nothing to disarm for {}", id);
        }
    }

    pub fn disarm_all(&self) {
        let _ = self.command_tx.send(TimerCommand::DisarmAll);
    }

    /// Stop the worker thread. Pending timers are dropped without firing.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(TimerCommand::Shutdown);
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        let _ = self.command_tx.send(TimerCommand::Shutdown);
    }
}

/// Pending deadlines. `armed` is authoritative; `queue` may hold stale entries.
#[derive(Default)]
struct DelayQueue {
    armed: HashMap<RequestId, Instant>,
    queue: BinaryHeap<Reverse<(Instant, RequestId)>>,
}

impl DelayQueue {
    fn arm(&mut self, id: RequestId, deadline: Instant) {
        self.armed.insert(id, deadline);
        self.queue.push(Reverse((deadline, id)));
    }

    fn disarm(&mut self, id: RequestId) -> bool {
        self.armed.remove(&id).is_some()
    }

    fn clear(&mut self) {
        self.armed.clear();
        self.queue.clear();
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queue.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pop every entry due at `now`, returning those still armed.
    fn expire(&mut self, now: Instant) -> Vec<RequestId> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, id))) = self.queue.peek().copied() {
            if deadline > now {
                break;
            }
            self.queue.pop();
            if self.armed.get(&id) == Some(&deadline) {
                self.armed.remove(&id);
                expired.push(id);
            }
        }
        expired
    }
}

async fn run_timer_loop<F>(mut command_rx: mpsc::UnboundedReceiver<TimerCommand>, on_expired: F)
where
    F: Fn(RequestId),
{
    let mut timers = DelayQueue::default();

    tracing::debug!("Timeout worker started");

    loop {
        let wake_at = timers
            .next_deadline()
            .map(|deadline| deadline.min(Instant::now() + MAX_SLEEP));

        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(TimerCommand::Arm { id, after }) => {
                        match Instant::now().checked_add(after) {
                            Some(deadline) => timers.arm(id, deadline),
                            None => tracing::warn!("Timeout {:?} for {} is out of range, not armed", after, id),
                        }
                    }
                    Some(TimerCommand::Disarm(id)) => {
                        if timers.disarm(id) {
                            tracing::trace!("Disarmed timer for {}", id);
                        }
                    }
                    Some(TimerCommand::DisarmAll) => timers.clear(),
                    Some(TimerCommand::Shutdown) | None => break,
                }
            }

            _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                for id in timers.expire(Instant::now()) {
                    tracing::debug!("Timer expired for {}", id);
                    on_expired(id);
                }
            }
        }
    }

    tracing::debug!("Timeout worker shut down");
}
