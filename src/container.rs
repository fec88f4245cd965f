//! Decorator that selectively overrides a wrapped command's capabilities

use std::sync::Arc;

use crate::command::{Command, CommandRef};
use crate::context::Context;
use crate::error::Error;
use crate::flags::FlagSet;

type TextFn = Box<dyn Fn() -> String>;
type DefineFlagsFn = Box<dyn Fn(&CommandRef, &mut FlagSet)>;
type RunFn = Box<dyn Fn(&CommandRef, &mut Context<'_>, Vec<String>) -> Result<(), Error>>;

/// Wraps a command and lets any capability, or `run` itself, be replaced.
///
/// Every probe uses the override when one is set and otherwise delegates to
/// the wrapped command. With no overrides a container behaves exactly like
/// the command it wraps.
pub struct Container {
    command: CommandRef,
    name: Option<TextFn>,
    synopsis: Option<TextFn>,
    description: Option<TextFn>,
    define_flags: Option<DefineFlagsFn>,
    run: Option<RunFn>,
}

impl Container {
    pub fn new(command: impl Command + 'static) -> Self {
        Container {
            command: Arc::new(command),
            name: None,
            synopsis: None,
            description: None,
            define_flags: None,
            run: None,
        }
    }

    /// The wrapped command.
    #[must_use]
    pub fn inner(&self) -> &CommandRef {
        &self.command
    }

    #[must_use]
    pub fn with_name(mut self, f: impl Fn() -> String + 'static) -> Self {
        self.name = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_synopsis(mut self, f: impl Fn() -> String + 'static) -> Self {
        self.synopsis = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_description(mut self, f: impl Fn() -> String + 'static) -> Self {
        self.description = Some(Box::new(f));
        self
    }

    /// Replace flag definition. The closure receives the wrapped command so
    /// it can layer extra flags on top of the command's own.
    #[must_use]
    pub fn with_define_flags(mut self, f: impl Fn(&CommandRef, &mut FlagSet) + 'static) -> Self {
        self.define_flags = Some(Box::new(f));
        self
    }

    /// Replace `run`. The closure receives the wrapped command so it can
    /// add behaviour before or after delegating to it.
    #[must_use]
    pub fn with_run(
        mut self,
        f: impl Fn(&CommandRef, &mut Context<'_>, Vec<String>) -> Result<(), Error> + 'static,
    ) -> Self {
        self.run = Some(Box::new(f));
        self
    }
}

impl Command for Container {
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        match &self.run {
            Some(f) => f(&self.command, ctx, args),
            None => self.command.run(ctx, args),
        }
    }

    fn name(&self) -> Option<String> {
        match &self.name {
            Some(f) => Some(f()),
            None => self.command.name(),
        }
    }

    fn synopsis(&self) -> Option<String> {
        match &self.synopsis {
            Some(f) => Some(f()),
            None => self.command.synopsis(),
        }
    }

    fn description(&self) -> Option<String> {
        match &self.description {
            Some(f) => Some(f()),
            None => self.command.description(),
        }
    }

    fn define_flags(&self, flags: &mut FlagSet) {
        match &self.define_flags {
            Some(f) => f(&self.command, flags),
            None => self.command.define_flags(flags),
        }
    }
}
