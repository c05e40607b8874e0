//! Fixed-interval background timer.
//!
//! The timer thread sleeps on a stop channel. A receive timeout fires one
//! tick; a stop message or a dropped [`Scheduler`] ends the thread. The
//! thread is never joined, so an in-flight tick finishes on its own and the
//! timer never keeps the process alive past `main`.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct Scheduler {
    stop: mpsc::Sender<()>,
    interval: Duration,
}

impl Scheduler {
    /// Start calling `tick` every `interval`.
    ///
    /// Errors and panics from `tick` are logged and the timer keeps going.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("autosave-scheduler".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "scheduler armed");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    debug!("scheduler tick");
                    match catch_unwind(AssertUnwindSafe(&mut tick)) {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => error!(err = %format!("{err:#}"), "scheduled tick failed"),
                        Err(_) => error!("scheduled tick panicked"),
                    }
                }
                info!("scheduler stopped");
            })?;
        Ok(Self { stop, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the timer without waiting for a running tick.
    pub fn cancel(self) {
        // The thread may already be gone; a failed send means it is.
        let _ = self.stop.send(());
    }
}
