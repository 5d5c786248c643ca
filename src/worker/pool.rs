use super::{TaskHandler, WorkerError};
use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

const FALLBACK_POOL_SIZE: usize = 4;

/// Host concurrency hint, or 4 when it cannot be determined.
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(FALLBACK_POOL_SIZE)
}

type Reply<R> = Sender<Result<R, WorkerError>>;

struct Job<H: TaskHandler> {
    id: u64,
    request: H::Request,
    reply: Reply<H::Response>,
}

impl<H: TaskHandler> Job<H> {
    fn reject(self, err: WorkerError) {
        // Capacity 1 and a single reply per job, so this never waits.
        let _ = self.reply.try_send(Err(err));
    }
}

struct WorkerSlot<H: TaskHandler> {
    sender: Option<Sender<Job<H>>>,
    busy: bool,
}

struct Dispatcher<H: TaskHandler> {
    slots: Vec<WorkerSlot<H>>,
    pending: VecDeque<Job<H>>,
    next_id: u64,
    shut_down: bool,
}

impl<H: TaskHandler> Dispatcher<H> {
    fn idle_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| !slot.busy && slot.sender.is_some())
    }

    fn dispatch(&mut self, index: usize, job: Job<H>) {
        let slot = &mut self.slots[index];
        let Some(sender) = slot.sender.as_ref() else {
            job.reject(WorkerError::Disconnected);
            return;
        };

        slot.busy = true;
        if let Err(err) = sender.try_send(job) {
            warn!("[worker] worker {index} is gone; retiring its slot");
            slot.busy = false;
            slot.sender = None;
            err.into_inner().reject(WorkerError::Disconnected);
        }
    }

    /// Called by a worker after finishing a job. Hands back the next queued
    /// job (keeping the slot busy) or marks the slot idle.
    fn release(&mut self, index: usize) -> Option<Job<H>> {
        if !self.shut_down
            && let Some(job) = self.pending.pop_front()
        {
            return Some(job);
        }

        if let Some(slot) = self.slots.get_mut(index) {
            slot.busy = false;
        }
        None
    }
}

struct Shared<H: TaskHandler> {
    handler: H,
    dispatcher: Mutex<Dispatcher<H>>,
}

/// Fixed-size pool of worker threads with a FIFO overflow queue.
///
/// The pool lives until [`WorkerPool::shutdown`] or drop, which closes every
/// worker channel, rejects requests still waiting in the queue and joins the
/// threads. Requests already handed to a worker run to completion.
pub struct WorkerPool<H: TaskHandler> {
    shared: Arc<Shared<H>>,
    threads: Vec<JoinHandle<()>>,
}

impl<H: TaskHandler> WorkerPool<H> {
    pub fn new(handler: H, size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            handler,
            dispatcher: Mutex::new(Dispatcher {
                slots: Vec::with_capacity(size),
                pending: VecDeque::new(),
                next_id: 0,
                shut_down: false,
            }),
        });

        let mut pool = Self {
            shared,
            threads: Vec::with_capacity(size),
        };

        for index in 0..size {
            let (sender, receiver) = async_channel::unbounded();
            pool.shared.dispatcher.lock().slots.push(WorkerSlot {
                sender: Some(sender),
                busy: false,
            });

            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("spectrostream-worker-{index}"))
                .spawn(move || worker_loop(index, shared, receiver))?;
            pool.threads.push(handle);
        }

        info!("[worker] started pool with {size} workers");
        Ok(pool)
    }

    pub fn with_default_size(handler: H) -> io::Result<Self> {
        Self::new(handler, default_pool_size())
    }

    pub fn size(&self) -> usize {
        self.shared.dispatcher.lock().slots.len()
    }

    /// Requests waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.shared.dispatcher.lock().pending.len()
    }

    /// Workers currently running a request.
    pub fn busy(&self) -> usize {
        self.shared
            .dispatcher
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.busy)
            .count()
    }

    /// Hand `request` to a free worker, or queue it behind earlier requests.
    pub fn submit(&self, request: H::Request) -> PendingResult<H::Response> {
        let (reply, receiver) = async_channel::bounded(1);
        let label = H::describe(&request);

        let mut dispatcher = self.shared.dispatcher.lock();
        let id = dispatcher.next_id;
        dispatcher.next_id += 1;
        let job = Job { id, request, reply };

        if dispatcher.shut_down {
            job.reject(WorkerError::ShutDown);
        } else if let Some(index) = dispatcher.idle_slot() {
            debug!("[worker] dispatching {label} #{id} to worker {index}");
            dispatcher.dispatch(index, job);
        } else {
            debug!(
                "[worker] all workers busy; queueing {label} #{id} ({} waiting)",
                dispatcher.pending.len()
            );
            dispatcher.pending.push_back(job);
        }

        PendingResult { receiver }
    }

    pub fn shutdown(&mut self) {
        let drained: Vec<Job<H>> = {
            let mut dispatcher = self.shared.dispatcher.lock();
            if dispatcher.shut_down && self.threads.is_empty() {
                return;
            }
            dispatcher.shut_down = true;
            for slot in &mut dispatcher.slots {
                slot.sender = None;
            }
            dispatcher.pending.drain(..).collect()
        };

        if !drained.is_empty() {
            warn!(
                "[worker] rejecting {} queued requests on shutdown",
                drained.len()
            );
        }
        for job in drained {
            job.reject(WorkerError::ShutDown);
        }

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("[worker] worker thread panicked outside a task");
            }
        }
        info!("[worker] pool stopped");
    }
}

impl<H: TaskHandler> Drop for WorkerPool<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Future resolving to a worker's reply.
#[must_use = "results are only observed by awaiting them"]
#[derive(Debug)]
pub struct PendingResult<R> {
    receiver: Receiver<Result<R, WorkerError>>,
}

impl<R> PendingResult<R> {
    pub async fn wait(self) -> Result<R, WorkerError> {
        self.receiver
            .recv()
            .await
            .unwrap_or_else(|_| Err(WorkerError::Disconnected))
    }

    /// Blocking variant for threads outside any async context.
    pub fn wait_blocking(self) -> Result<R, WorkerError> {
        self.receiver
            .recv_blocking()
            .unwrap_or_else(|_| Err(WorkerError::Disconnected))
    }
}

fn worker_loop<H: TaskHandler>(index: usize, shared: Arc<Shared<H>>, jobs: Receiver<Job<H>>) {
    while let Ok(job) = jobs.recv_blocking() {
        let mut next = Some(job);
        while let Some(job) = next.take() {
            run_job(index, &shared.handler, job);
            next = shared.dispatcher.lock().release(index);
        }
    }
    debug!("[worker] worker {index} exiting");
}

fn run_job<H: TaskHandler>(index: usize, handler: &H, job: Job<H>) {
    let Job { id, request, reply } = job;
    let label = H::describe(&request);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)))
        .unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(payload.as_ref()))));

    if let Err(err) = &outcome {
        warn!("[worker] {label} #{id} failed on worker {index}: {err}");
    }

    if reply.send_blocking(outcome).is_err() {
        debug!("[worker] {label} #{id} finished but nobody is waiting for it");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::AnalysisError;
    use std::time::Duration;

    struct Doubler;

    impl TaskHandler for Doubler {
        type Request = i32;
        type Response = i32;

        fn handle(&self, request: i32) -> Result<i32, WorkerError> {
            match request {
                0 => panic!("boom"),
                value if value < 0 => Err(AnalysisError::InvalidScaleSize.into()),
                value => Ok(value * 2),
            }
        }
    }

    struct Gated {
        started: Sender<u32>,
        release: Receiver<()>,
    }

    impl TaskHandler for Gated {
        type Request = u32;
        type Response = u32;

        fn handle(&self, request: u32) -> Result<u32, WorkerError> {
            let _ = self.started.send_blocking(request);
            let _ = self.release.recv_blocking();
            Ok(request + 100)
        }
    }

    fn gated_pool(size: usize) -> (WorkerPool<Gated>, Receiver<u32>, Sender<()>) {
        let (started_tx, started_rx) = async_channel::unbounded();
        let (release_tx, release_rx) = async_channel::unbounded();
        let pool = WorkerPool::new(
            Gated {
                started: started_tx,
                release: release_rx,
            },
            size,
        )
        .expect("spawn workers");
        (pool, started_rx, release_tx)
    }

    fn recv_started(started: &Receiver<u32>) -> u32 {
        for _ in 0..500 {
            if let Ok(value) = started.try_recv() {
                return value;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("worker did not start a task in time");
    }

    #[test]
    fn default_size_is_positive() {
        assert!(default_pool_size() >= 1);
    }

    #[test]
    fn resolves_results_for_every_submission() {
        let pool = WorkerPool::new(Doubler, 3).expect("spawn workers");
        assert_eq!(pool.size(), 3);

        let pending: Vec<_> = (1..=10).map(|value| pool.submit(value)).collect();
        let results: Vec<_> = pending
            .into_iter()
            .map(|result| result.wait_blocking())
            .collect();
        assert_eq!(results, (1..=10).map(|value| Ok(value * 2)).collect::<Vec<_>>());
    }

    #[test]
    fn failures_reject_without_stalling_the_slot() {
        let pool = WorkerPool::new(Doubler, 1).expect("spawn workers");

        let failing = pool.submit(-1);
        let panicking = pool.submit(0);
        let healthy = pool.submit(5);

        assert_eq!(
            failing.wait_blocking(),
            Err(WorkerError::Analysis(AnalysisError::InvalidScaleSize))
        );
        assert_eq!(
            panicking.wait_blocking(),
            Err(WorkerError::Panicked("boom".to_owned()))
        );
        assert_eq!(healthy.wait_blocking(), Ok(10));
    }

    #[test]
    fn overflow_requests_start_in_submission_order() {
        let (pool, started, release) = gated_pool(2);

        let pending: Vec<_> = (0..5).map(|value| pool.submit(value)).collect();

        let mut first_two = [recv_started(&started), recv_started(&started)];
        first_two.sort_unstable();
        assert_eq!(first_two, [0, 1]);
        assert_eq!(pool.queued(), 3);
        assert_eq!(pool.busy(), 2);

        release.send_blocking(()).expect("gate open");
        assert_eq!(recv_started(&started), 2);
        release.send_blocking(()).expect("gate open");
        assert_eq!(recv_started(&started), 3);
        release.send_blocking(()).expect("gate open");
        assert_eq!(recv_started(&started), 4);
        assert_eq!(pool.queued(), 0);

        release.send_blocking(()).expect("gate open");
        release.send_blocking(()).expect("gate open");

        let results: Vec<_> = pending
            .into_iter()
            .map(|result| result.wait_blocking())
            .collect();
        assert_eq!(results, vec![Ok(100), Ok(101), Ok(102), Ok(103), Ok(104)]);
    }

    #[test]
    fn shutdown_rejects_queued_work_and_finishes_in_flight_work() {
        let (pool, started, release) = gated_pool(1);

        let in_flight = pool.submit(7);
        assert_eq!(recv_started(&started), 7);
        let queued = pool.submit(8);

        let stopper = thread::spawn(move || {
            let mut pool = pool;
            pool.shutdown();
            pool
        });

        assert_eq!(queued.wait_blocking(), Err(WorkerError::ShutDown));
        release.send_blocking(()).expect("gate open");
        assert_eq!(in_flight.wait_blocking(), Ok(107));

        let pool = stopper.join().expect("shutdown thread");
        assert_eq!(pool.submit(9).wait_blocking(), Err(WorkerError::ShutDown));
    }

    #[test]
    fn async_wait_resolves_under_block_on() {
        let pool = WorkerPool::new(Doubler, 2).expect("spawn workers");
        let result = pollster::block_on(pool.submit(21).wait());
        assert_eq!(result, Ok(42));
    }
}
