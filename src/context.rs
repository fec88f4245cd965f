//! Execution context threaded through every dispatch step
//!
//! The context records the command path taken so far and carries the
//! cancellation token that trapped signals trigger. The path is append-only:
//! entries are pushed by the dispatch engine and never reordered or removed
//! during one invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::debug;
use parking_lot::Mutex;

use crate::command::CommandRef;
use crate::error::Error;
use crate::flags::{FlagSet, Value};
use crate::runner::{self, Runner};

static EMPTY_FLAGS: FlagSet = FlagSet::empty();

/// One step of the command path
pub struct Entry {
    name: String,
    command: CommandRef,
    flags: FlagSet,
}

impl Entry {
    pub(crate) fn new(name: impl Into<String>, command: CommandRef, flags: FlagSet) -> Self {
        Entry {
            name: name.into(),
            command,
            flags,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn command(&self) -> &CommandRef {
        &self.command
    }

    #[must_use]
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Cooperative cancellation shared between the runner and signal listeners.
///
/// Cancelling drops the only sender of the `done` channel, so every receiver
/// observes disconnection. This lets commands race their work against
/// cancellation with `crossbeam_channel::select!`.
#[derive(Clone)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    sender: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        let (sender, done) = crossbeam_channel::bounded(0);
        Cancellation {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                done,
            }),
        }
    }

    /// Cancel the token. Returns `true` only for the call that cancelled it.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        drop(self.inner.sender.lock().take());
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Channel that becomes disconnected once the token is cancelled.
    #[must_use]
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Block until cancelled or until `timeout` elapses.
    /// Returns `true` if the token was cancelled.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.done.recv_timeout(timeout) {
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one invocation as seen by the running command
pub struct Context<'r> {
    runner: &'r Runner,
    cancellation: Cancellation,
    path: Vec<Entry>,
}

impl<'r> Context<'r> {
    #[must_use]
    pub fn new(runner: &'r Runner, cancellation: Cancellation) -> Self {
        Context {
            runner,
            cancellation,
            path: Vec::new(),
        }
    }

    pub(crate) fn runner(&self) -> &'r Runner {
        self.runner
    }

    /// The command path taken so far, root first.
    #[must_use]
    pub fn path(&self) -> &[Entry] {
        &self.path
    }

    /// Entry of the command currently running.
    #[must_use]
    pub fn last(&self) -> Option<&Entry> {
        self.path.last()
    }

    /// Names of the path entries joined by spaces, e.g. `git remote add`.
    #[must_use]
    pub fn command_path(&self) -> String {
        self.path
            .iter()
            .map(Entry::name)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Flag store of the command currently running.
    #[must_use]
    pub fn flags(&self) -> &FlagSet {
        self.path.last().map_or(&EMPTY_FLAGS, Entry::flags)
    }

    /// Look a flag up from the deepest entry towards the root.
    ///
    /// This is how a command reads flags defined by one of its ancestors.
    #[must_use]
    pub fn find_flag(&self, name: &str) -> Option<&Value> {
        self.path.iter().rev().find_map(|e| e.flags.get(name))
    }

    /// Mutable access to every flag store in path order.
    ///
    /// The path itself cannot be changed through this.
    pub fn flag_sets_mut(&mut self) -> impl Iterator<Item = (&str, &mut FlagSet)> {
        self.path
            .iter_mut()
            .map(|e| (e.name.as_str(), &mut e.flags))
    }

    #[must_use]
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Channel that disconnects when the invocation is cancelled.
    #[must_use]
    pub fn done(&self) -> &Receiver<()> {
        self.cancellation.done()
    }

    /// Run `command` as the next step of the path.
    ///
    /// # Errors
    ///
    /// Returns flag parsing errors and whatever `command` returns, unchanged.
    pub fn dispatch(
        &mut self,
        command: CommandRef,
        name: &str,
        args: Vec<String>,
    ) -> Result<(), Error> {
        runner::dispatch(self, command, name, args)
    }

    /// Append a step to the path.
    pub(crate) fn push(&mut self, entry: Entry) {
        debug!("entering command `{} {}`", self.command_path(), entry.name);
        self.path.push(entry);
    }

    /// Swap the deepest entry's flag store for `flags`, returning the old one.
    pub(crate) fn replace_last_flags(&mut self, flags: FlagSet) -> FlagSet {
        match self.path.last_mut() {
            Some(entry) => std::mem::replace(&mut entry.flags, flags),
            None => flags,
        }
    }
}
