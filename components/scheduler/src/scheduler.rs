//! Worker thread and task queue

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use fluxplayer_shared_types::PlayerState;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

/// Id returned when a task could not be scheduled
pub const TASK_ID_INVALID: i32 = 0;

const TASK_ID_DEFAULT: i32 = 1;
const TASK_ID_CEILING: i32 = i32::MAX;

type TaskFn = Box<dyn FnOnce() + Send + 'static>;

struct TaskObj {
    id: i32,
    name: String,
    task: TaskFn,
}

struct QueueState {
    tasks: VecDeque<TaskObj>,
    running: bool,
    lockout: bool,
    next_id: i32,
    current_id: i32,
    player_state: PlayerState,
}

/// Binary semaphore standing in for the worker's execution lock
///
/// `suspend` holds it across calls, which a lexically scoped mutex guard
/// cannot express.
struct ExecLock {
    locked: Mutex<bool>,
    cv: Condvar,
}

impl ExecLock {
    fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.cv.wait(&mut locked);
        }
        *locked = true;
    }

    fn release(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        self.cv.notify_all();
    }
}

struct Inner {
    queue: Mutex<QueueState>,
    queue_cv: Condvar,
    exec: ExecLock,
}

/// Single-worker async task scheduler
///
/// States: stopped (no worker, `schedule` rejects), running (worker drains
/// the queue), suspended (`schedule` rejects, worker blocked on the
/// execution lock until `resume`).
pub struct Scheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a stopped scheduler
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    running: false,
                    lockout: false,
                    next_id: TASK_ID_DEFAULT,
                    current_id: TASK_ID_INVALID,
                    player_state: PlayerState::Idle,
                }),
                queue_cv: Condvar::new(),
                exec: ExecLock::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker thread and mark the scheduler running
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            warn!("scheduler already started");
            return;
        }
        {
            let mut queue = self.inner.queue.lock();
            queue.running = true;
            queue.lockout = false;
        }
        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("flux-scheduler".to_string())
            .spawn(move || worker_loop(inner));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!("started async worker thread");
            }
            Err(err) => {
                self.inner.queue.lock().running = false;
                warn!(%err, "failed to spawn scheduler worker");
            }
        }
    }

    /// Stop the worker: clear the queue, signal, join
    pub fn stop(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            let Some(handle) = worker.take() else {
                return;
            };
            let mut queue = self.inner.queue.lock();
            queue.running = false;
            queue.lockout = true;
            if !queue.tasks.is_empty() {
                warn!(pending = queue.tasks.len(), "clearing task queue on stop");
                queue.tasks.clear();
            }
            self.inner.queue_cv.notify_one();
            handle
        };
        let _ = handle.join();
        info!("stopped async worker thread");
    }

    /// Queue a named task for execution
    ///
    /// Returns the task id, or [`TASK_ID_INVALID`] when the scheduler is
    /// stopped, suspended, or the player is in ERROR/RELEASED.
    pub fn schedule(&self, name: &str, task: impl FnOnce() + Send + 'static) -> i32 {
        let mut queue = self.inner.queue.lock();
        if !queue.running {
            warn!(task = name, "schedule while scheduler not running, task ignored");
            return TASK_ID_INVALID;
        }
        if queue.player_state.rejects_tasks() {
            return TASK_ID_INVALID;
        }
        if queue.lockout {
            // Races against suspend during normal operation, hence info level
            info!(task = name, "schedule while locked out, skipping operation");
            return TASK_ID_INVALID;
        }
        let id = queue.next_id;
        queue.next_id += 1;
        if queue.next_id >= TASK_ID_CEILING {
            queue.next_id = TASK_ID_DEFAULT;
        }
        queue.tasks.push_back(TaskObj {
            id,
            name: name.to_string(),
            task: Box::new(task),
        });
        self.inner.queue_cv.notify_one();
        id
    }

    /// Remove a queued task by id
    ///
    /// The currently executing task is never removed; returns whether a
    /// queued task was dropped.
    pub fn remove(&self, id: i32) -> bool {
        let mut queue = self.inner.queue.lock();
        if id == TASK_ID_INVALID || queue.current_id == id {
            return false;
        }
        let before = queue.tasks.len();
        queue.tasks.retain(|t| t.id != id);
        before != queue.tasks.len()
    }

    /// Drop every queued task, preserving the one in flight
    pub fn remove_all(&self) {
        let mut queue = self.inner.queue.lock();
        if !queue.tasks.is_empty() {
            warn!(pending = queue.tasks.len(), "clearing task queue");
            queue.tasks.clear();
        }
    }

    /// Block until the current task completes, then lock out new work
    pub fn suspend(&self) {
        debug!("suspending async worker");
        self.inner.exec.acquire();
        self.inner.queue.lock().lockout = true;
    }

    /// Release the execution lock and accept work again
    pub fn resume(&self) {
        debug!("resuming async worker");
        self.inner.exec.release();
        self.inner.queue.lock().lockout = false;
    }

    /// Clear the lockout without touching the execution lock
    pub fn enable_schedule_task(&self) {
        self.inner.queue.lock().lockout = false;
    }

    /// Update the player state consulted by `schedule` and the worker
    pub fn set_player_state(&self, state: PlayerState) {
        self.inner.queue.lock().player_state = state;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.worker.lock().is_some() {
            self.stop();
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    let mut queue = inner.queue.lock();
    while queue.running {
        if queue.tasks.is_empty() {
            inner.queue_cv.wait(&mut queue);
            continue;
        }
        let obj = match queue.tasks.pop_front() {
            Some(obj) => obj,
            None => continue,
        };
        if obj.id == TASK_ID_INVALID {
            warn!("task with invalid id in queue, skipped");
            continue;
        }
        queue.current_id = obj.id;
        // Player state is observed at pick-up time, not schedule time
        if queue.player_state.rejects_tasks() {
            debug!(task = %obj.name, "skipping task, player in terminal state");
            continue;
        }
        drop(queue);

        inner.exec.acquire();
        debug!(task = %obj.name, id = obj.id, "executing task");
        (obj.task)();
        inner.exec.release();

        queue = inner.queue.lock();
    }
    info!("exited async worker thread");
}
