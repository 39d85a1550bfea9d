// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

/// Handle to a background worker thread.
///
/// Joining is split in two steps: wait on the [`ShutdownSignaler`] with a
/// timeout first, then join the thread, so a hung worker cannot block the
/// caller forever.
pub struct WorkerHandle {
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
    shutdown_finished: Arc<ShutdownSignaler>,
}

impl WorkerHandle {
    pub fn new(shutdown_finished: Arc<ShutdownSignaler>, handle: thread::JoinHandle<()>) -> Self {
        Self {
            join_handle: Mutex::new(Some(handle)),
            shutdown_finished,
        }
    }

    pub fn wait_for_shutdown(&self, timeout: Duration) -> Result<(), WorkerError> {
        let Some(handle) = self
            .join_handle
            .lock()
            .map_err(|_| {
                crate::sift_error!("WorkerHandle.wait_for_shutdown: handle mutex poisoned");
                WorkerError::HandleMutexPoisoned
            })?
            .take()
        else {
            return Ok(());
        };
        self.shutdown_finished.wait_for_shutdown(timeout)?;
        handle.join().map_err(|e| {
            let err = if let Some(e) = e.downcast_ref::<&'static str>() {
                e
            } else if let Some(e) = e.downcast_ref::<String>() {
                e
            } else {
                "unknown panic type"
            };
            crate::sift_error!("WorkerHandle.wait_for_shutdown: worker panicked: {}", err);
            WorkerError::WorkerPanicked(err.to_string())
        })?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum WorkerError {
    ShutdownTimedOut,
    HandleMutexPoisoned,
    WorkerPanicked(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutdownTimedOut => write!(f, "shutdown timed out"),
            Self::HandleMutexPoisoned => write!(f, "handle mutex poisoned"),
            Self::WorkerPanicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Signals worker exit to whoever is waiting in [`WorkerHandle::wait_for_shutdown`].
#[derive(Default)]
pub struct ShutdownSignaler {
    shutdown_finished: Mutex<bool>,
    shutdown_condvar: Condvar,
}

impl ShutdownSignaler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signal_shutdown(&self) {
        let mut finished = self.shutdown_finished.lock().unwrap_or_else(|e| e.into_inner());
        *finished = true;
        self.shutdown_condvar.notify_all();
    }

    fn wait_for_shutdown(&self, timeout: Duration) -> Result<(), WorkerError> {
        let Ok(finished) = self.shutdown_finished.lock() else {
            return Ok(());
        };
        let Ok((_finished, timeout)) =
            self.shutdown_condvar
                .wait_timeout_while(finished, timeout, |f| !*f)
        else {
            return Ok(());
        };
        if timeout.timed_out() {
            return Err(WorkerError::ShutdownTimedOut);
        }
        Ok(())
    }
}

/// Flags shutdown completion when the owning task scope is dropped, so the
/// signal fires even if the worker exits by panic.
pub struct ShutdownReceiver {
    shutdown_finished: Arc<ShutdownSignaler>,
}

impl ShutdownReceiver {
    pub fn new(shutdown_finished: Arc<ShutdownSignaler>) -> Self {
        Self { shutdown_finished }
    }
}

impl Drop for ShutdownReceiver {
    fn drop(&mut self) {
        self.shutdown_finished.signal_shutdown();
    }
}
