//! Top-level invocation: signal setup, dispatch, outcome resolution and exit

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use log::{debug, error};

use crate::command::{Command, CommandRef};
use crate::context::{Cancellation, Context, Entry};
use crate::error::{EXIT_FAILURE, EXIT_SIGNAL, Error};
use crate::flags::FlagSet;
use crate::signal::{ForceFn, Signal, Trap};

/// Strategy used to fill a command's flag store from its arguments.
///
/// Receives the context holding the ancestors' entries, the fresh store and
/// the arguments; returns the arguments left for the command.
pub type ParseFlagsFn =
    Box<dyn Fn(&Context<'_>, &mut FlagSet, Vec<String>) -> Result<Vec<String>, Error> + Send + Sync>;

/// Strategy used to render a flag store's defaults in help output.
pub type PrintFlagsFn =
    Box<dyn Fn(&Context<'_>, &mut dyn Write, &FlagSet) -> io::Result<()> + Send + Sync>;

/// Options for running a command tree
///
/// Built once before [`Runner::main`] and read by every dispatch step.
pub struct Runner {
    term_signals: Vec<Signal>,
    force_term: usize,
    parse_flags: Option<ParseFlagsFn>,
    print_flags: Option<PrintFlagsFn>,
    on_force: ForceFn,
}

impl Default for Runner {
    /// Traps SIGINT, SIGTERM and SIGQUIT. A second signal forces termination.
    fn default() -> Self {
        Runner {
            term_signals: vec![Signal::Interrupt, Signal::Terminate, Signal::Quit],
            force_term: 0,
            parse_flags: None,
            print_flags: None,
            on_force: Arc::new(|_| std::process::exit(EXIT_SIGNAL)),
        }
    }
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that cancel the running command. An empty list traps nothing.
    #[must_use]
    pub fn with_signals(mut self, signals: impl IntoIterator<Item = Signal>) -> Self {
        self.term_signals = signals.into_iter().collect();
        self
    }

    /// Exit immediately with code 130 once the same signal arrived `n` times.
    /// With zero, the default, any trapped signal after the first one forces
    /// termination.
    #[must_use]
    pub fn with_force_term(mut self, n: usize) -> Self {
        self.force_term = n;
        self
    }

    #[must_use]
    pub fn with_parse_flags(
        mut self,
        f: impl Fn(&Context<'_>, &mut FlagSet, Vec<String>) -> Result<Vec<String>, Error>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.parse_flags = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_print_flags(
        mut self,
        f: impl Fn(&Context<'_>, &mut dyn Write, &FlagSet) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.print_flags = Some(Box::new(f));
        self
    }

    /// Replace the forced termination action, which exits with 130 by default.
    #[must_use]
    pub fn with_force_action(mut self, f: impl Fn(Signal) + Send + Sync + 'static) -> Self {
        self.on_force = Arc::new(f);
        self
    }

    #[must_use]
    pub fn term_signals(&self) -> &[Signal] {
        &self.term_signals
    }

    #[must_use]
    pub fn force_term(&self) -> usize {
        self.force_term
    }

    /// Run `root` with the process arguments and exit the process.
    pub fn main(&self, root: impl Command + 'static) -> ! {
        let argv: Vec<String> = std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let code = self.run(
            Arc::new(root),
            argv,
            &mut io::stdout().lock(),
            &mut io::stderr().lock(),
        );
        std::process::exit(code)
    }

    /// Run `root` with `argv` (program path first) and return the exit code.
    ///
    /// Usage goes to `out`, error messages to `err`.
    pub fn run(
        &self,
        root: CommandRef,
        argv: Vec<String>,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        let token = Cancellation::new();
        let _trap = if self.term_signals.is_empty() {
            None
        } else {
            match Trap::install(
                &self.term_signals,
                self.force_term,
                token.clone(),
                Arc::clone(&self.on_force),
            ) {
                Ok(trap) => Some(trap),
                Err(e) => {
                    error!("unable to trap signals: {e}");
                    let _ = writeln!(err, "unable to trap signals: {e}");
                    return EXIT_FAILURE;
                }
            }
        };

        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .as_deref()
            .map(program_name)
            .unwrap_or_default();
        let mut ctx = Context::new(self, token.clone());
        let result = dispatch(&mut ctx, root, &program, argv.collect());

        match result {
            Err(Error::Help) => {
                if let Err(e) = out
                    .write_all(self.usage(&ctx).as_bytes())
                    .and_then(|()| out.flush())
                {
                    debug!("writing usage of `{}` failed: {e}", ctx.command_path());
                }
                0
            }
            _ if token.is_cancelled() => {
                debug!("`{}` cancelled", ctx.command_path());
                EXIT_SIGNAL
            }
            Err(e) => {
                if let Err(write_err) = writeln!(err, "{e}") {
                    debug!("writing error of `{}` failed: {write_err}", ctx.command_path());
                }
                e.exit_code()
            }
            Ok(()) => 0,
        }
    }

    /// Render usage of the deepest command in the path.
    #[must_use]
    pub fn usage(&self, ctx: &Context<'_>) -> String {
        let Some(entry) = ctx.last() else {
            return String::new();
        };
        let command = entry.command();
        let mut out = String::new();
        if let Some(name) = command.name().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "{name}\n");
        }
        out.push_str("Usage:\n\n");
        match command.synopsis().filter(|s| !s.is_empty()) {
            Some(synopsis) => {
                let _ = writeln!(out, "  {} {synopsis}\n", ctx.command_path());
            }
            None => {
                let _ = writeln!(out, "  {}\n", ctx.command_path());
            }
        }
        if let Some(description) = command.description().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "{description}\n");
        }

        let mut flags = Vec::new();
        if let Err(e) = self.print_flags(ctx, &mut flags, entry.flags()) {
            debug!("printing flags of `{}` failed: {e}", ctx.command_path());
        }
        if !flags.is_empty() {
            out.push_str("Options:\n\n");
            out.push_str(&String::from_utf8_lossy(&flags));
        }
        out
    }

    fn parse_flags(
        &self,
        ctx: &Context<'_>,
        flags: &mut FlagSet,
        args: Vec<String>,
    ) -> Result<Vec<String>, Error> {
        match &self.parse_flags {
            Some(parse) => parse(ctx, flags, args),
            None => flags.parse(args),
        }
    }

    fn print_flags(&self, ctx: &Context<'_>, w: &mut dyn Write, flags: &FlagSet) -> io::Result<()> {
        match &self.print_flags {
            Some(print) => print(ctx, w, flags),
            None => flags.print_defaults(w),
        }
    }
}

/// Base name of the invoked program.
fn program_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |s| s.to_string_lossy().into_owned())
}

/// Store for `command` with its flags defined.
fn flag_set(command: &CommandRef, name: &str) -> FlagSet {
    let mut flags = FlagSet::new(name);
    command.define_flags(&mut flags);
    flags
}

/// Run `command` as the next step of the path.
///
/// A fresh store is always created and pushed, so help rendering works the
/// same for commands without flags. The entry is on the path while the parse
/// strategy runs, so the strategy and a `-h` usage both see this command.
pub(crate) fn dispatch(
    ctx: &mut Context<'_>,
    command: CommandRef,
    name: &str,
    args: Vec<String>,
) -> Result<(), Error> {
    ctx.push(Entry::new(name, Arc::clone(&command), flag_set(&command, name)));
    let mut flags = ctx.replace_last_flags(FlagSet::default());
    let runner = ctx.runner();
    let parsed = runner.parse_flags(ctx, &mut flags, args);
    ctx.replace_last_flags(flags);
    let args = parsed?;
    debug!("running `{}` with {args:?}", ctx.command_path());
    command.run(ctx, args)
}

/// Push `command` onto the path without parsing or running it.
pub(crate) fn register(ctx: &mut Context<'_>, command: CommandRef, name: &str) {
    let flags = flag_set(&command, name);
    ctx.push(Entry::new(name, command, flags));
}
