//! Dispatch of sentence contexts onto a fixed pool of persistent workers
//!
//! Each slot owns one thread and one channel. A worker blocks on its channel
//! between sentences; the dispatcher scans slots from 0, hands the context to
//! the first slot that is not busy and, when every slot is busy, waits on a
//! condition variable for at most the configured backoff before rescanning.

use crate::error::{EngineError, TaskError};
use crate::reassembler::{OutputQueue, TaskOutcome, Ticket};
use crate::stats::WorkerStats;
use crate::window::SentenceContext;
use crate::worker::{Pipeline, UpdateEngine};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No thread started yet
    New,
    /// Running a sentence
    Busy,
    /// Idle, blocked on its channel
    Waiting,
    /// Thread has exited
    Terminated,
}

/// Cancellation flag shared by the dispatcher and every worker
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// A token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every worker to stop at its next resume point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Task {
    ticket: Ticket,
    context: SentenceContext,
}

/// State shared between the dispatcher and the workers
struct Shared {
    slots: Mutex<Vec<SlotState>>,
    slot_freed: Condvar,
    queue: Mutex<OutputQueue>,
    fatal: Mutex<Option<TaskError>>,
}

impl Shared {
    fn complete(&self, id: usize, ticket: Ticket, outcome: TaskOutcome) {
        self.queue.lock().resolve(ticket, outcome);
        self.set_state(id, SlotState::Waiting);
    }

    fn abort(&self, id: usize, ticket: Ticket, error: TaskError) {
        error!("Worker {id}: {error}");
        self.queue.lock().resolve(
            ticket,
            TaskOutcome::Failed {
                partial: String::new(),
                reason: error.to_string(),
            },
        );
        self.fatal.lock().get_or_insert(error);
        self.set_state(id, SlotState::Waiting);
    }

    fn set_state(&self, id: usize, state: SlotState) {
        let mut slots = self.slots.lock();
        slots[id] = state;
        self.slot_freed.notify_all();
    }
}

/// Marks the slot terminated however the worker thread exits and fails
/// anything still queued for it, so the output queue never stalls
struct SlotGuard {
    id: usize,
    shared: Arc<Shared>,
    tasks: Receiver<Task>,
    current: Option<Ticket>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = self.shared.slots.lock();
        let mut orphaned: Vec<Ticket> = self.current.take().into_iter().collect();
        orphaned.extend(self.tasks.try_iter().map(|task| task.ticket));
        if !orphaned.is_empty() {
            let mut queue = self.shared.queue.lock();
            for ticket in orphaned {
                queue.resolve(
                    ticket,
                    TaskOutcome::Failed {
                        partial: String::new(),
                        reason: format!("worker {} terminated", self.id),
                    },
                );
            }
        }
        slots[self.id] = SlotState::Terminated;
        self.shared.slot_freed.notify_all();
        trace!("Worker {} terminated", self.id);
    }
}

fn worker_loop(mut engine: UpdateEngine, mut guard: SlotGuard, stop: StopToken) -> WorkerStats {
    let id = engine.id();
    loop {
        let task = match guard.tasks.recv() {
            Ok(task) => task,
            Err(_) => break,
        };
        if stop.is_cancelled() {
            guard.current = Some(task.ticket);
            break;
        }

        guard.current = Some(task.ticket);
        let first = task.ticket.position() == 0;
        match engine.process(&task.context, first) {
            Ok(outcome) => guard.shared.complete(id, task.ticket, outcome),
            Err(e) => guard.shared.abort(id, task.ticket, e),
        }
        guard.current = None;
    }
    drop(guard);
    engine.into_stats()
}

/// Fixed-size worker pool with in-order output reservation
pub struct Scheduler {
    shared: Arc<Shared>,
    pipeline: Arc<Pipeline>,
    senders: Vec<Option<Sender<Task>>>,
    handles: Vec<Option<JoinHandle<WorkerStats>>>,
    stop: StopToken,
    backoff: Duration,
    finished: Vec<WorkerStats>,
}

impl Scheduler {
    pub(crate) fn new(workers: usize, backoff: Duration, pipeline: Arc<Pipeline>) -> Self {
        let workers = workers.max(1);
        debug!("Scheduler with {workers} worker slots");
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(vec![SlotState::New; workers]),
                slot_freed: Condvar::new(),
                queue: Mutex::new(OutputQueue::new()),
                fatal: Mutex::new(None),
            }),
            pipeline,
            senders: (0..workers).map(|_| None).collect(),
            handles: (0..workers).map(|_| None).collect(),
            stop: StopToken::new(),
            backoff,
            finished: Vec::new(),
        }
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Current state of every slot
    pub fn slot_states(&self) -> Vec<SlotState> {
        self.shared.slots.lock().clone()
    }

    /// Reserve the next output position and hand the context to a free worker
    ///
    /// Blocks while every worker is busy. Fails if a worker hit a fatal error
    /// or a thread could not be started.
    pub fn dispatch(&mut self, context: SentenceContext) -> Result<Ticket, EngineError> {
        let shared = Arc::clone(&self.shared);
        let mut slots = shared.slots.lock();
        loop {
            self.check_fatal()?;

            if let Some(id) = slots.iter().position(|state| *state != SlotState::Busy) {
                let previous = slots[id];
                let ticket = shared.queue.lock().reserve();
                slots[id] = SlotState::Busy;

                let task = Task { ticket, context };
                match previous {
                    SlotState::Waiting => self.resume(id, task)?,
                    SlotState::Terminated => {
                        warn!("Worker {id} was terminated, restarting");
                        self.reap(id);
                        self.start(id, Some(task))?;
                    }
                    _ => self.start(id, Some(task))?,
                }
                trace!("Sentence {} dispatched to worker {id}", ticket.position());
                return Ok(ticket);
            }

            shared.slot_freed.wait_for(&mut slots, self.backoff);
        }
    }

    /// Resolved outcomes at the head of the output queue, in arrival order
    pub fn take_ready(&self) -> Vec<TaskOutcome> {
        let mut queue = self.shared.queue.lock();
        std::iter::from_fn(|| queue.pop_ready()).collect()
    }

    /// Sentences reserved but not yet taken
    pub fn in_flight(&self) -> usize {
        self.shared.queue.lock().in_flight()
    }

    /// Block until no worker is running a sentence
    pub fn wait_idle(&self) -> Result<(), EngineError> {
        let mut slots = self.shared.slots.lock();
        while slots.contains(&SlotState::Busy) {
            self.shared.slot_freed.wait_for(&mut slots, self.backoff);
        }
        drop(slots);
        self.check_fatal()
    }

    /// Wait for running sentences, stop every worker and collect their histories
    pub fn shutdown(mut self) -> Result<Vec<WorkerStats>, EngineError> {
        self.wait_idle()?;
        self.stop_workers();
        self.check_fatal()?;
        Ok(std::mem::take(&mut self.finished))
    }

    fn check_fatal(&self) -> Result<(), EngineError> {
        match self.shared.fatal.lock().as_ref() {
            Some(TaskError::Encoding(message)) => Err(EngineError::Encoding(message.clone())),
            Some(other) => Err(EngineError::Encoding(other.to_string())),
            None => Ok(()),
        }
    }

    /// Hand a task to an idle worker; restarts the slot if its thread is gone
    fn resume(&mut self, id: usize, task: Task) -> Result<(), EngineError> {
        let Some(sender) = &self.senders[id] else {
            return self.start(id, Some(task));
        };
        if let Err(returned) = sender.send(task) {
            warn!("Worker {id} hung up, restarting");
            self.reap(id);
            return self.start(id, Some(returned.into_inner()));
        }
        Ok(())
    }

    fn start(&mut self, id: usize, task: Option<Task>) -> Result<(), EngineError> {
        let (sender, tasks) = unbounded();
        if let Some(task) = task {
            if sender.send(task).is_err() {
                return Err(EngineError::Spawn {
                    id,
                    reason: "task channel closed".to_string(),
                });
            }
        }

        let guard = SlotGuard {
            id,
            shared: Arc::clone(&self.shared),
            tasks,
            current: None,
        };
        let engine = UpdateEngine::new(id, Arc::clone(&self.pipeline));
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name(format!("conll-update-{id}"))
            .spawn(move || worker_loop(engine, guard, stop))
            .map_err(|e| EngineError::Spawn {
                id,
                reason: e.to_string(),
            })?;

        trace!("Worker {id} started");
        self.senders[id] = Some(sender);
        self.handles[id] = Some(handle);
        Ok(())
    }

    /// Join a finished thread and keep its history
    fn reap(&mut self, id: usize) {
        self.senders[id] = None;
        if let Some(handle) = self.handles[id].take() {
            match handle.join() {
                Ok(stats) => self.finished.push(stats),
                Err(_) => error!("Worker {id} panicked; its statistics are lost"),
            }
        }
    }

    fn stop_workers(&mut self) {
        self.stop.cancel();

        // Slots that never ran still get a thread so every slot ends terminated
        let never_started: Vec<usize> = {
            let slots = self.shared.slots.lock();
            slots
                .iter()
                .enumerate()
                .filter(|(_, state)| **state == SlotState::New)
                .map(|(id, _)| id)
                .collect()
        };
        for id in never_started {
            if let Err(e) = self.start(id, None) {
                warn!("{e}");
            }
        }

        for sender in &mut self.senders {
            sender.take();
        }
        for id in 0..self.handles.len() {
            self.reap(id);
        }
        debug!("All {} workers stopped", self.workers());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handles.iter().any(Option::is_some) {
            self.stop_workers();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers())
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}
