//! Nested sub-command dispatch for command line programs
//!
//! A program is a tree of [`Command`]s. [`Table`]s dispatch to children by
//! name, [`Container`]s decorate a command, and the [`Runner`] drives one
//! invocation: it traps termination signals into a cancellation token,
//! walks the tree with fresh per-command flag stores, renders help and
//! turns the outcome into a process exit code.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cmdtree::{Command, Context, Error, FlagSet, Table};
//!
//! struct Sleep;
//!
//! impl Command for Sleep {
//!     fn run(&self, ctx: &mut Context<'_>, _args: Vec<String>) -> Result<(), Error> {
//!         let d = ctx.flags().get_duration("d").unwrap_or_default();
//!         if ctx.cancellation().wait_timeout(d) {
//!             return Err(Error::other("interrupted"));
//!         }
//!         Ok(())
//!     }
//!
//!     fn define_flags(&self, flags: &mut FlagSet) {
//!         flags.duration("d", Duration::from_secs(1), "how long to sleep");
//!     }
//! }
//!
//! cmdtree::main(Table::new().with("sleep", Sleep));
//! ```

pub mod command;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod flags;
pub mod logger;
pub mod posix;
pub mod runner;
pub mod signal;
pub mod table;

pub use command::{Command, CommandFn, CommandRef};
pub use container::Container;
pub use context::{Cancellation, Context, Entry};
pub use error::{EXIT_FAILURE, EXIT_SIGNAL, EXIT_USAGE, Error};
pub use flags::{FlagSet, Value};
pub use runner::Runner;
pub use signal::Signal;
pub use table::Table;

/// Run `root` with the default runner and exit the process.
///
/// The default runner cancels on SIGINT, SIGTERM and SIGQUIT.
pub fn main(root: impl Command + 'static) -> ! {
    Runner::default().main(root)
}
