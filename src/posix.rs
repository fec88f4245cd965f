//! POSIX style flag syntax
//!
//! An alternative parse and print strategy pair for [`Runner`]. Long flags
//! use two dashes (`--interval 2s`, `--interval=2s`), single character flags
//! use one and may be grouped (`-vd 2s`, `-vd2s`). Parsing is delegated to a
//! `clap` command built from the flag store on every call.

use std::io::{self, Write};

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};

use crate::context::Context;
use crate::error::Error;
use crate::flags::{FlagError, FlagSet, default_suffix};
use crate::runner::Runner;

/// Id of the positional collecting the arguments left for the command.
const LEFTOVERS: &str = "cmdtree::leftovers";

/// A runner using POSIX flag syntax, trapping the default signals.
#[must_use]
pub fn runner() -> Runner {
    Runner::default()
        .with_parse_flags(parse_flags)
        .with_print_flags(print_flags)
}

/// Parse POSIX style flags, stopping at `--` or the first non-option argument.
///
/// Bool flags take no value. Everything from the first positional on is
/// returned untouched, dashes included.
///
/// # Errors
///
/// Returns `Error::Help` for an undefined `-h` or `--help`, and `Error::Flag`
/// for unknown flags, missing or invalid values.
pub fn parse_flags(
    _ctx: &Context<'_>,
    fs: &mut FlagSet,
    args: Vec<String>,
) -> Result<Vec<String>, Error> {
    let matches = command(fs).try_get_matches_from(args).map_err(from_clap)?;

    let given: Vec<(String, bool)> = fs
        .iter()
        .filter(|flag| matches.value_source(&flag.name) == Some(ValueSource::CommandLine))
        .map(|flag| (flag.name.clone(), flag.default.is_bool()))
        .collect();
    for (name, is_bool) in given {
        if is_bool {
            fs.set(&name, "true")?;
        } else if let Some(value) = matches.get_one::<String>(&name) {
            fs.set(&name, value)?;
        }
    }
    Ok(leftovers(&matches))
}

/// Clap command mirroring the flags of `fs`.
fn command(fs: &FlagSet) -> clap::Command {
    let args = fs.iter().map(|flag| {
        let mut chars = flag.name.chars();
        let arg = match (chars.next(), chars.next()) {
            (Some(c), None) => Arg::new(flag.name.clone()).short(c),
            _ => Arg::new(flag.name.clone()).long(flag.name.clone()),
        };
        if flag.default.is_bool() {
            arg.action(ArgAction::SetTrue)
        } else {
            arg.action(ArgAction::Set).allow_hyphen_values(true)
        }
    });
    clap::Command::new(fs.name().to_string())
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true)
        .args(args)
        .arg(
            Arg::new(LEFTOVERS)
                .num_args(0..)
                .action(ArgAction::Append)
                .trailing_var_arg(true),
        )
}

fn leftovers(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>(LEFTOVERS)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Flag name a clap error is about, without dashes or value placeholder.
fn offending_flag(err: &clap::Error) -> String {
    match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(arg)) => arg
            .trim_start_matches('-')
            .split([' ', '='])
            .next()
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn from_clap(err: clap::Error) -> Error {
    let name = offending_flag(&err);
    match err.kind() {
        ErrorKind::UnknownArgument if name == "h" || name == "help" => Error::Help,
        ErrorKind::UnknownArgument => FlagError::Unknown(name).into(),
        ErrorKind::InvalidValue | ErrorKind::NoEquals => FlagError::MissingValue(name).into(),
        _ => FlagError::BadSyntax(err.render().to_string().trim_end().to_string()).into(),
    }
}

/// Print defaults with `-x` for single character flags and `--name` otherwise.
///
/// # Errors
///
/// Returns any error from writing to `w`.
pub fn print_flags(_ctx: &Context<'_>, w: &mut dyn Write, fs: &FlagSet) -> io::Result<()> {
    for flag in fs.iter() {
        let dashes = if flag.name.chars().count() == 1 { "-" } else { "--" };
        let (placeholder, usage) = flag.placeholder_and_usage();
        let mut line = format!("  {dashes}{}", flag.name);
        if !placeholder.is_empty() {
            line.push(' ');
            line.push_str(&placeholder);
        }
        line.push_str("\n    \t");
        line.push_str(&usage.replace('\n', "\n    \t"));
        line.push_str(&default_suffix(flag));
        writeln!(w, "{line}")?;
    }
    Ok(())
}
