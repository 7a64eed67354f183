//! Fixed-size worker pool with a bounded task queue

use std::fmt;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use relaymcp_core::{ErrorCode, McpError, McpResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Worker threads draining a bounded queue
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size)
            .field("queued", &self.queued())
            .finish()
    }
}

impl ThreadPool {
    /// Spawn `size` workers sharing a queue of `queue_size` tasks
    ///
    /// # Errors
    ///
    /// Returns an internal error if a worker thread cannot be spawned.
    pub fn new(size: usize, queue_size: usize) -> McpResult<Self> {
        let (sender, receiver) = bounded::<Task>(queue_size.max(1));
        let size = size.max(1);
        let workers = (0..size)
            .map(|index| spawn_worker(index, receiver.clone()))
            .collect::<McpResult<Vec<_>>>()?;
        debug!("Thread pool started with {} workers", size);
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    /// Queue a task without blocking
    ///
    /// # Errors
    ///
    /// [`ErrorCode::TooManyRequests`] when the queue is full,
    /// [`ErrorCode::ServerShuttingDown`] after [`ThreadPool::shutdown`].
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> McpResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(McpError::from_code(ErrorCode::ServerShuttingDown));
        };
        match sender.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Thread pool task queue full");
                Err(McpError::new(ErrorCode::TooManyRequests, "task queue full"))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(McpError::from_code(ErrorCode::ServerShuttingDown))
            }
        }
    }

    /// Stop accepting tasks, finish the queued ones and join the workers
    pub fn shutdown(&self) {
        // Workers exit once the queue is drained and the sender is gone
        drop(self.sender.lock().take());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                error!("Thread pool worker panicked");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(index: usize, receiver: Receiver<Task>) -> McpResult<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("relaymcp-worker-{index}"))
        .spawn(move || {
            for task in receiver.iter() {
                task();
            }
        })
        .map_err(|e| McpError::internal(format!("Failed to spawn worker thread: {e}")))
}
