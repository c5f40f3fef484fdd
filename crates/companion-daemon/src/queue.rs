//! Serial task queue.
//!
//! A [`SerialQueue`] owns a state value on a dedicated worker thread and runs
//! pushed tasks against it one at a time, in push order. Producers on any
//! thread push through a [`QueueHandle`]. The worker enters the tokio runtime
//! so tasks may spawn I/O, but never blocks on it.

use std::thread::{self, JoinHandle};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::DaemonError;

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Command<S> {
    Run(Task<S>),
    Terminate,
}

/// Push side of a [`SerialQueue`].
pub struct QueueHandle<S> {
    tx: mpsc::UnboundedSender<Command<S>>,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> QueueHandle<S> {
    /// Enqueue `task`. Returns `false` once the queue has stopped accepting
    /// work.
    pub fn push<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Command::Run(Box::new(task))).is_ok()
    }
}

/// Single-consumer FIFO executor owning a state value.
pub struct SerialQueue<S> {
    handle: QueueHandle<S>,
    worker: Option<JoinHandle<()>>,
}

impl<S: 'static> SerialQueue<S> {
    /// Spawn the worker thread. `init` runs on the worker, before any pushed
    /// task, and builds the state from a handle to this queue.
    pub fn spawn<I>(name: &str, runtime: Handle, init: I) -> Result<Self, DaemonError>
    where
        I: FnOnce(QueueHandle<S>) -> S + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<S>>();
        let handle = QueueHandle { tx };
        let worker_handle = handle.clone();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _runtime = runtime.enter();
                let mut state = init(worker_handle);
                while let Some(command) = rx.blocking_recv() {
                    match command {
                        Command::Run(task) => task(&mut state),
                        Command::Terminate => {
                            trace!("queue terminating, draining");
                            rx.close();
                        }
                    }
                }
                drop(state);
                debug!("queue worker stopped");
            })
            .map_err(DaemonError::QueueSpawn)?;

        Ok(Self {
            handle,
            worker: Some(worker),
        })
    }
}

impl<S> SerialQueue<S> {
    pub fn handle(&self) -> QueueHandle<S> {
        self.handle.clone()
    }

    pub fn push<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle.push(task)
    }

    /// Run every task already queued, refuse new ones, drop the state and
    /// join the worker. Calling it again is a no-op.
    pub fn terminate(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.handle.tx.send(Command::Terminate);
        if worker.join().is_err() {
            error!("queue worker panicked");
        }
    }
}

impl<S> Drop for SerialQueue<S> {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    fn spawn_vec_queue(rt: &tokio::runtime::Runtime) -> SerialQueue<Vec<u32>> {
        SerialQueue::spawn("test-queue", rt.handle().clone(), |_| Vec::new()).unwrap()
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn tasks_run_in_push_order() {
        let rt = runtime();
        let mut queue = spawn_vec_queue(&rt);
        for i in 0..100 {
            assert!(queue.push(move |v| v.push(i)));
        }
        let (tx, rx) = std_mpsc::channel();
        queue.push(move |v| tx.send(v.clone()).unwrap());
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        queue.terminate();
    }

    #[test]
    fn pushes_from_many_threads_are_serialized() {
        let rt = runtime();
        let mut queue = spawn_vec_queue(&rt);
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let handle = queue.handle();
                thread::spawn(move || {
                    for i in 0..50 {
                        handle.push(move |v| v.push(t * 1000 + i));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let (tx, rx) = std_mpsc::channel();
        queue.push(move |v| tx.send(v.clone()).unwrap());
        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.len(), 200);
        for t in 0..4 {
            let per_thread: Vec<_> = seen.iter().filter(|x| **x / 1000 == t).collect();
            assert!(per_thread.windows(2).all(|w| w[0] < w[1]));
        }
        queue.terminate();
    }

    #[test]
    fn terminate_drains_queued_tasks() {
        let rt = runtime();
        let (tx, rx) = std_mpsc::channel();
        let mut queue: SerialQueue<std_mpsc::Sender<u32>> =
            SerialQueue::spawn("test-queue", rt.handle().clone(), move |_| tx).unwrap();
        queue.push(|_| thread::sleep(Duration::from_millis(50)));
        for i in 0..10 {
            queue.push(move |tx| tx.send(i).unwrap());
        }
        queue.terminate();
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn push_is_refused_after_terminate() {
        let rt = runtime();
        let mut queue = spawn_vec_queue(&rt);
        let handle = queue.handle();
        queue.terminate();
        assert!(!handle.push(|v| v.push(1)));
        queue.terminate();
    }

    #[test]
    fn state_is_dropped_on_terminate() {
        struct Flag(std_mpsc::Sender<()>);
        impl Drop for Flag {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let rt = runtime();
        let (tx, rx) = std_mpsc::channel();
        let queue =
            SerialQueue::spawn("test-queue", rt.handle().clone(), move |_| Flag(tx)).unwrap();
        drop(queue);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn tasks_can_spawn_on_the_runtime() {
        let rt = runtime();
        let mut queue = spawn_vec_queue(&rt);
        let (tx, rx) = tokio::sync::oneshot::channel();
        queue.push(move |_| {
            tokio::spawn(async move {
                let _ = tx.send(7u32);
            });
        });
        let value = rt.block_on(rx).unwrap();
        assert_eq!(value, 7);
        queue.terminate();
    }
}
