//! Dispatch by sub-command name
//!
//! A [`Table`] is itself a [`Command`], so tables nest: a table entry may be
//! another table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{Command, CommandRef};
use crate::context::Context;
use crate::error::{EXIT_USAGE, Error};
use crate::runner;

/// Mapping of sub-command name to its implementation
#[derive(Default, Clone)]
pub struct Table {
    commands: BTreeMap<String, CommandRef>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Help,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sub-command, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, command: impl Command + 'static) -> Self {
        self.insert(name, command);
        self
    }

    /// Add a sub-command, replacing any existing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, command: impl Command + 'static) {
        self.commands.insert(name.into(), Arc::new(command));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandRef> {
        self.commands.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl Command for Table {
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        let mut args = args.into_iter();
        let mut mode = Mode::Normal;
        let name = loop {
            match args.next() {
                None => return Err(Error::Help),
                Some(token) if token == "help" => mode = Mode::Help,
                Some(name) => break name,
            }
        };
        let Some(command) = self.commands.get(&name) else {
            let path = ctx.command_path();
            return Err(Error::exit(
                EXIT_USAGE,
                format!("`{path} {name}`: unknown command\nRun `{path} help` for help."),
            ));
        };
        let command = Arc::clone(command);
        match mode {
            Mode::Help => {
                runner::register(ctx, command, &name);
                Err(Error::Help)
            }
            Mode::Normal => ctx.dispatch(command, &name, args.collect()),
        }
    }

    fn synopsis(&self) -> Option<String> {
        Some("[help] <command>".to_string())
    }

    fn description(&self) -> Option<String> {
        let width = self.commands.keys().map(String::len).max().unwrap_or(0);
        let lines: Vec<String> = self
            .commands
            .iter()
            .map(|(key, command)| {
                let title = command.name().unwrap_or_default();
                format!("  {key:<width$}  {title}").trim_end().to_string()
            })
            .collect();
        let mut out = String::from("Commands:\n");
        out.push_str(&lines.join("\n"));
        Some(out)
    }
}
