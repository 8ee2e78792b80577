//! Post-step tasks and launchers
//!
//! Every play step hands three tasks to a [`TaskLauncher`], in this order:
//! `Tic` (advance the transport), `ClearBuffer` (scrub the buffer two slots
//! ahead) and `SwitchBufferFlag` (rotate `current`). Launchers must run the
//! tasks of all batches in submission order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::SoundcardShared;

/// What a task does when run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Tic,
    ClearBuffer,
    SwitchBufferFlag,
}

/// One deferred effect on a soundcard
pub struct Task {
    kind: TaskKind,
    target: Arc<SoundcardShared>,
}

impl Task {
    pub(crate) fn new(kind: TaskKind, target: Arc<SoundcardShared>) -> Self {
        Self { kind, target }
    }

    #[inline]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn run(self) {
        match self.kind {
            TaskKind::Tic => self.target.tic(),
            TaskKind::ClearBuffer => self.target.clear_ahead(),
            TaskKind::SwitchBufferFlag => self.target.switch_buffer(),
        }
    }
}

/// Executes task batches in FIFO order
pub trait TaskLauncher: Send + Sync {
    fn add_task_all(&self, tasks: Vec<Task>);

    /// Block until every batch submitted so far has run
    fn wait_idle(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// INLINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs each batch immediately on the submitting thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTaskLauncher;

impl TaskLauncher for InlineTaskLauncher {
    fn add_task_all(&self, tasks: Vec<Task>) {
        tasks.into_iter().for_each(Task::run);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// THREADED
// ═══════════════════════════════════════════════════════════════════════════════

enum Message {
    Batch(Vec<Task>),
    Barrier(Sender<()>),
}

/// One worker thread draining a channel, so batches run in order
pub struct ThreadedTaskLauncher {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedTaskLauncher {
    pub fn new() -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Message>();

        let worker = thread::Builder::new().name("sc-task-launcher".to_string()).spawn(move || {
            for message in receiver {
                match message {
                    Message::Batch(tasks) => tasks.into_iter().for_each(Task::run),
                    Message::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            log::debug!("Task launcher worker exiting");
        })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting tasks, drain the queue and join the worker
    pub fn shutdown(&self) {
        self.sender.lock().take();

        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            log::error!("Task launcher worker panicked");
        }
    }
}

impl TaskLauncher for ThreadedTaskLauncher {
    fn add_task_all(&self, tasks: Vec<Task>) {
        if let Some(sender) = self.sender.lock().as_ref()
            && sender.send(Message::Batch(tasks)).is_err()
        {
            log::warn!("Task launcher stopped, dropping batch");
        }
    }

    fn wait_idle(&self) {
        let (done_tx, done_rx) = bounded(1);

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(Message::Barrier(done_tx)).is_ok(),
            None => false,
        };

        if sent {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for ThreadedTaskLauncher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
