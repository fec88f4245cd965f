//! The capability contract every runnable unit implements
//!
//! Only [`Command::run`] is mandatory. The optional capabilities default to
//! "absent": `None` for the text probes and a no-op for flag definition.

use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::flags::FlagSet;

/// A runnable unit in the command tree
pub trait Command {
    /// Execute the command with the arguments left after flag parsing.
    ///
    /// # Errors
    ///
    /// Any error is propagated unchanged to the runner, which maps it to an
    /// exit code.
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error>;

    /// Short human readable title, shown in help and in a parent table's listing.
    fn name(&self) -> Option<String> {
        None
    }

    /// Argument summary shown after the command path in usage.
    fn synopsis(&self) -> Option<String> {
        None
    }

    /// Longer text shown below the usage line.
    fn description(&self) -> Option<String> {
        None
    }

    /// Register this command's flags on a fresh store.
    fn define_flags(&self, _flags: &mut FlagSet) {}
}

/// Shared handle to a command in the tree
pub type CommandRef = Arc<dyn Command>;

/// Adapter to use a plain closure as a [`Command`]
pub struct CommandFn<F>(F);

impl<F> CommandFn<F>
where
    F: Fn(&mut Context<'_>, Vec<String>) -> Result<(), Error>,
{
    pub fn new(f: F) -> Self {
        CommandFn(f)
    }
}

impl<F> Command for CommandFn<F>
where
    F: Fn(&mut Context<'_>, Vec<String>) -> Result<(), Error>,
{
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        (self.0)(ctx, args)
    }
}

impl<T: Command + ?Sized> Command for Arc<T> {
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        (**self).run(ctx, args)
    }

    fn name(&self) -> Option<String> {
        (**self).name()
    }

    fn synopsis(&self) -> Option<String> {
        (**self).synopsis()
    }

    fn description(&self) -> Option<String> {
        (**self).description()
    }

    fn define_flags(&self, flags: &mut FlagSet) {
        (**self).define_flags(flags);
    }
}
