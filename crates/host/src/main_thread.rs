//! Marshalling of host calls onto the host's main thread.
//!
//! [`channel`] pairs a cloneable [`MainThreadHandle`] for background workers
//! with the [`MainThreadQueue`] the main thread drains. Every call waits for
//! its answer with a bounded timeout so a stalled host never wedges a
//! worker.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::JoinHandle,
    time::Duration,
};

use tracing::{debug, warn};

use crate::{Error, Result, app::HostApp};

/// Default bound on how long a marshalled call may take.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

type Job = Box<dyn FnOnce(&mut dyn HostApp) + Send>;

/// Create a connected handle/queue pair.
#[must_use]
pub fn channel() -> (MainThreadHandle, MainThreadQueue) {
    let (tx, rx) = mpsc::channel();
    (
        MainThreadHandle {
            tx,
            timeout: DEFAULT_CALL_TIMEOUT,
        },
        MainThreadQueue { rx },
    )
}

#[derive(Clone)]
pub struct MainThreadHandle {
    tx: Sender<Job>,
    timeout: Duration,
}

impl std::fmt::Debug for MainThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadHandle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MainThreadHandle {
    /// Same queue, different bound on call latency.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            tx: self.tx.clone(),
            timeout,
        }
    }

    /// Run `f` on the main thread and wait for its result.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn HostApp) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.call_with_timeout(self.timeout, f).await
    }

    pub async fn call_with_timeout<F, T>(&self, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn HostApp) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let job: Job = Box::new(move |host| {
            // The caller may have timed out already.
            let _ = reply_tx.send(f(host));
        });
        self.tx.send(job).map_err(|_| Error::MainThreadGone)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::MainThreadGone),
            Err(_) => {
                warn!(?timeout, "main thread call timed out");
                Err(Error::MainThreadTimeout { elapsed: timeout })
            },
        }
    }

    /// Queue `f` without waiting for it to run.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn HostApp) + Send + 'static,
    {
        self.tx.send(Box::new(f)).map_err(|_| Error::MainThreadGone)
    }
}

/// Receiving end, owned by the host's main thread.
pub struct MainThreadQueue {
    rx: Receiver<Job>,
}

impl MainThreadQueue {
    /// Execute jobs until every handle has been dropped.
    pub fn run(self, host: &mut dyn HostApp) {
        while let Ok(job) = self.rx.recv() {
            job(host);
        }
        debug!("main thread queue closed");
    }

    /// Execute all pending jobs without blocking. Returns how many ran.
    pub fn pump(&self, host: &mut dyn HostApp) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job(host);
                    ran += 1;
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Wait up to `wait` for the first job, then drain the rest.
    ///
    /// Returns `Err(MainThreadGone)` once all handles are dropped.
    pub fn pump_timeout(&self, host: &mut dyn HostApp, wait: Duration) -> Result<usize> {
        match self.rx.recv_timeout(wait) {
            Ok(job) => {
                job(host);
                Ok(1 + self.pump(host))
            },
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(Error::MainThreadGone),
        }
    }

    /// Serve `host` from a dedicated thread.
    pub fn spawn<H>(self, mut host: H) -> std::io::Result<JoinHandle<H>>
    where
        H: HostApp + Send + 'static,
    {
        std::thread::Builder::new()
            .name("deskgram-host-main".into())
            .spawn(move || {
                self.run(&mut host);
                host
            })
    }
}
