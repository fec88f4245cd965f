//! OS signal trapping
//!
//! Listeners run as tasks on a small dedicated tokio runtime. They only ever
//! cancel the shared [`Cancellation`] token or call the forced termination
//! callback; the command path is never touched from here.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use log::{debug, warn};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::context::Cancellation;

/// Signals the runner can trap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Interrupt,
    Terminate,
    Quit,
    Hangup,
}

impl Signal {
    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Quit => SignalKind::quit(),
            Signal::Hangup => SignalKind::hangup(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
        })
    }
}

/// Counts receptions per signal kind.
///
/// [`record`](Self::record) reports `true` each time one kind reaches the
/// threshold, then starts counting that kind from zero again.
#[derive(Debug)]
pub struct ForceCounter {
    threshold: usize,
    counts: HashMap<Signal, usize>,
}

impl ForceCounter {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        ForceCounter {
            threshold,
            counts: HashMap::new(),
        }
    }

    pub fn record(&mut self, signal: Signal) -> bool {
        let count = self.counts.entry(signal).or_default();
        *count += 1;
        if *count < self.threshold {
            return false;
        }
        *count = 0;
        true
    }
}

/// Callback invoked when a signal reached the forced termination threshold.
pub type ForceFn = Arc<dyn Fn(Signal) + Send + Sync>;

/// Installed signal listeners. Dropping the trap stops them.
pub struct Trap {
    runtime: Option<Runtime>,
    sender: mpsc::UnboundedSender<Signal>,
}

impl Trap {
    /// Start listening for `signals`.
    ///
    /// The first received signal cancels `token`. When `force_term` is non
    /// zero, receiving the same signal `force_term` times calls `on_force`.
    /// When it is zero, any signal after the first calls `on_force`, the way
    /// the default disposition would terminate the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built or a signal handler
    /// cannot be registered.
    pub fn install(
        signals: &[Signal],
        force_term: usize,
        token: Cancellation,
        on_force: ForceFn,
    ) -> io::Result<Trap> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("signal-trap")
            .enable_all()
            .build()?;
        let (sender, mut receiver) = mpsc::unbounded_channel();
        {
            let _guard = runtime.enter();
            for &signal in signals {
                listen(signal, sender.clone())?;
            }
            let mut counter = (force_term > 0).then(|| ForceCounter::new(force_term));
            tokio::spawn(async move {
                let mut trapped = false;
                while let Some(signal) = receiver.recv().await {
                    debug!("received {signal}");
                    if token.cancel() {
                        debug!("cancelled by {signal}");
                    }
                    match counter.as_mut() {
                        Some(counter) => {
                            if counter.record(signal) {
                                warn!("received {signal} {force_term} times, forcing termination");
                                on_force(signal);
                            }
                        }
                        None if trapped => {
                            warn!("received {signal} after cancelling, forcing termination");
                            on_force(signal);
                        }
                        None => {}
                    }
                    trapped = true;
                }
            });
        }
        Ok(Trap {
            runtime: Some(runtime),
            sender,
        })
    }

    /// Feed a signal through the trap as if the OS had delivered it.
    pub fn notify(&self, signal: Signal) {
        let _ = self.sender.send(signal);
    }
}

impl Drop for Trap {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(unix)]
fn listen(signal: Signal, sender: mpsc::UnboundedSender<Signal>) -> io::Result<()> {
    let mut stream = tokio::signal::unix::signal(signal.kind())?;
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            if sender.send(signal).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn listen(signal: Signal, sender: mpsc::UnboundedSender<Signal>) -> io::Result<()> {
    if signal != Signal::Interrupt {
        warn!("{signal} cannot be trapped on this platform");
        return Ok(());
    }
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if sender.send(signal).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_counter_fires_at_threshold() {
        let mut counter = ForceCounter::new(3);
        assert!(!counter.record(Signal::Interrupt));
        assert!(!counter.record(Signal::Interrupt));
        assert!(!counter.record(Signal::Terminate));
        assert!(counter.record(Signal::Interrupt));
        // Counting restarts after firing.
        assert!(!counter.record(Signal::Interrupt));
    }

    #[test]
    fn test_counter_kinds_are_independent() {
        let mut counter = ForceCounter::new(2);
        assert!(!counter.record(Signal::Interrupt));
        assert!(!counter.record(Signal::Terminate));
        assert!(!counter.record(Signal::Quit));
        assert!(counter.record(Signal::Terminate));
    }

    #[test]
    fn test_threshold_of_one() {
        let mut counter = ForceCounter::new(1);
        assert!(counter.record(Signal::Quit));
        assert!(counter.record(Signal::Quit));
    }

    fn install(force_term: usize) -> (Trap, Cancellation, std_mpsc::Receiver<Signal>) {
        let token = Cancellation::new();
        let (tx, rx) = std_mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let trap = Trap::install(
            &[],
            force_term,
            token.clone(),
            Arc::new(move |signal| {
                let _ = tx.lock().send(signal);
            }),
        )
        .unwrap();
        (trap, token, rx)
    }

    #[test]
    fn test_trap_cancels_once_and_forces_at_n() {
        let (trap, token, forced) = install(3);
        trap.notify(Signal::Terminate);
        assert!(token.wait_timeout(Duration::from_secs(5)));

        trap.notify(Signal::Terminate);
        assert!(forced.recv_timeout(Duration::from_millis(200)).is_err());

        trap.notify(Signal::Terminate);
        assert_eq!(
            forced.recv_timeout(Duration::from_secs(5)),
            Ok(Signal::Terminate)
        );
    }

    #[test]
    fn test_trap_without_threshold_forces_on_second_signal() {
        let (trap, token, forced) = install(0);
        trap.notify(Signal::Interrupt);
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert!(forced.recv_timeout(Duration::from_millis(200)).is_err());

        trap.notify(Signal::Terminate);
        assert_eq!(
            forced.recv_timeout(Duration::from_secs(5)),
            Ok(Signal::Terminate)
        );
    }
}
