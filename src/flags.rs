//! Flag store scoped to a single command invocation
//!
//! A [`FlagSet`] is created fresh for every dispatch step. Commands register
//! typed options on it from `define_flags`, the runner's parse strategy fills
//! it from the command line, and the command reads the values back through the
//! execution context while it runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use log::warn;
use thiserror::Error;

use crate::error::Error;

/// Errors produced while setting or parsing flags
#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flag provided but not defined: -{0}")]
    Unknown(String),
    #[error("flag needs an argument: -{0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for flag -{name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("bad flag syntax: {0}")]
    BadSyntax(String),
}

/// A typed flag value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Duration(Duration),
}

impl Value {
    /// Name of the value type as shown in help output. Bool flags have none.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Duration(_) => "duration",
        }
    }

    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Uint(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Duration(d) => d.is_zero(),
        }
    }

    /// Parse `input` into a value of the same type as `self`.
    ///
    /// # Errors
    ///
    /// Returns a human readable reason when `input` is not valid for the type.
    pub fn parse_like(&self, input: &str) -> Result<Value, String> {
        match self {
            Value::Bool(_) => parse_bool(input).map(Value::Bool),
            Value::Int(_) => input
                .parse()
                .map(Value::Int)
                .map_err(|e| format!("parse error: {e}")),
            Value::Uint(_) => input
                .parse()
                .map(Value::Uint)
                .map_err(|e| format!("parse error: {e}")),
            Value::Float(_) => input
                .parse()
                .map(Value::Float)
                .map_err(|e| format!("parse error: {e}")),
            Value::String(_) => Ok(Value::String(input.to_string())),
            Value::Duration(_) => parse_duration(input).map(Value::Duration),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
        }
    }
}

/// A single registered option
#[derive(Debug, Clone)]
pub struct Flag {
    pub name: String,
    pub usage: String,
    pub default: Value,
    pub value: Value,
}

impl Flag {
    /// Split usage into the value placeholder and the usage text.
    ///
    /// The first back-quoted word of the usage names the placeholder, e.g.
    /// "a `host` to ping" gives `("host", "a host to ping")`. Otherwise the
    /// placeholder is the type name.
    #[must_use]
    pub fn placeholder_and_usage(&self) -> (String, String) {
        if let Some(start) = self.usage.find('`')
            && let Some(len) = self.usage[start + 1..].find('`')
        {
            let name = &self.usage[start + 1..start + 1 + len];
            let usage = format!(
                "{}{}{}",
                &self.usage[..start],
                name,
                &self.usage[start + 2 + len..]
            );
            return (name.to_string(), usage);
        }
        (self.default.type_name().to_string(), self.usage.clone())
    }
}

/// Named registry of typed options for one dispatch step
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    name: String,
    flags: BTreeMap<String, Flag>,
    actual: BTreeSet<String>,
}

impl FlagSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        FlagSet {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) const fn empty() -> Self {
        FlagSet {
            name: String::new(),
            flags: BTreeMap::new(),
            actual: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a flag with the given default value.
    ///
    /// Redefining a name replaces the earlier definition.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        default: Value,
        usage: impl Into<String>,
    ) -> &mut Self {
        let name = name.into();
        if self.flags.contains_key(&name) {
            warn!("{}: flag redefined: {name}", self.name);
            self.actual.remove(&name);
        }
        self.flags.insert(
            name.clone(),
            Flag {
                name,
                usage: usage.into(),
                value: default.clone(),
                default,
            },
        );
        self
    }

    pub fn bool(&mut self, name: &str, default: bool, usage: &str) -> &mut Self {
        self.define(name, Value::Bool(default), usage)
    }

    pub fn int(&mut self, name: &str, default: i64, usage: &str) -> &mut Self {
        self.define(name, Value::Int(default), usage)
    }

    pub fn uint(&mut self, name: &str, default: u64, usage: &str) -> &mut Self {
        self.define(name, Value::Uint(default), usage)
    }

    pub fn float(&mut self, name: &str, default: f64, usage: &str) -> &mut Self {
        self.define(name, Value::Float(default), usage)
    }

    pub fn string(&mut self, name: &str, default: &str, usage: &str) -> &mut Self {
        self.define(name, Value::String(default.to_string()), usage)
    }

    pub fn duration(&mut self, name: &str, default: Duration, usage: &str) -> &mut Self {
        self.define(name, Value::Duration(default), usage)
    }

    /// Set a flag from its textual form and mark it as explicitly set.
    ///
    /// # Errors
    ///
    /// Returns `FlagError::Unknown` if no such flag is defined, or
    /// `FlagError::InvalidValue` if the text does not parse as the flag's type.
    pub fn set(&mut self, name: &str, input: &str) -> Result<(), FlagError> {
        let flag = self
            .flags
            .get_mut(name)
            .ok_or_else(|| FlagError::Unknown(name.to_string()))?;
        flag.value = flag
            .default
            .parse_like(input)
            .map_err(|reason| FlagError::InvalidValue {
                name: name.to_string(),
                value: input.to_string(),
                reason,
            })?;
        self.actual.insert(name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Flag> {
        self.flags.get(name)
    }

    /// Whether the flag was set explicitly rather than left at its default.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.actual.contains(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// All defined flags in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.values()
    }

    /// Flags that were set explicitly, in lexical order.
    pub fn iter_set(&self) -> impl Iterator<Item = &Flag> {
        self.actual.iter().filter_map(|name| self.flags.get(name))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.flags.get(name).map(|f| &f.value)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_uint(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            Value::Uint(u) => Some(*u),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_duration(&self, name: &str) -> Option<Duration> {
        match self.get(name)? {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Strict parsing: no abbreviations, stops at the first non-flag token.
    ///
    /// Accepts `-name`, `--name`, `-name=value` and `-name value`; bool flags
    /// only take a value in the `=` form. A lone `--` is consumed and ends
    /// parsing. Returns the arguments left after the flags.
    ///
    /// # Errors
    ///
    /// Returns `Error::Help` for an undefined `-h` or `-help`, and
    /// `Error::Flag` for any other malformed or unknown flag.
    pub fn parse(&mut self, args: Vec<String>) -> Result<Vec<String>, Error> {
        let mut args = args.into_iter().peekable();
        while let Some(arg) = args.peek() {
            if arg.len() < 2 || !arg.starts_with('-') {
                break;
            }
            let arg = args.next().unwrap_or_default();
            let name = if let Some(long) = arg.strip_prefix("--") {
                if long.is_empty() {
                    break;
                }
                long
            } else {
                &arg[1..]
            };
            if name.starts_with('-') || name.starts_with('=') {
                return Err(FlagError::BadSyntax(arg.clone()).into());
            }
            let (name, inline) = match name.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (name, None),
            };
            let Some(flag) = self.flags.get(name) else {
                if name == "h" || name == "help" {
                    return Err(Error::Help);
                }
                return Err(FlagError::Unknown(name.to_string()).into());
            };
            let value = match inline {
                Some(value) => value.to_string(),
                None if flag.default.is_bool() => "true".to_string(),
                None => args
                    .next()
                    .ok_or_else(|| FlagError::MissingValue(name.to_string()))?,
            };
            self.set(name, &value)?;
        }
        Ok(args.collect())
    }

    /// Print every flag with its usage and non-zero default.
    ///
    /// # Errors
    ///
    /// Returns any error from writing to `w`.
    pub fn print_defaults(&self, w: &mut dyn Write) -> io::Result<()> {
        for flag in self.iter() {
            let mut line = format!("  -{}", flag.name);
            let (placeholder, usage) = flag.placeholder_and_usage();
            if !placeholder.is_empty() {
                line.push(' ');
                line.push_str(&placeholder);
            }
            if line.len() <= 4 {
                line.push('\t');
            } else {
                line.push_str("\n    \t");
            }
            line.push_str(&usage.replace('\n', "\n    \t"));
            line.push_str(&default_suffix(flag));
            writeln!(w, "{line}")?;
        }
        Ok(())
    }
}

/// The ` (default ..)` suffix shown after a flag's usage, empty for zero defaults.
pub(crate) fn default_suffix(flag: &Flag) -> String {
    match &flag.default {
        v if v.is_zero() => String::new(),
        Value::String(s) => format!(" (default {s:?})"),
        v => format!(" (default {v})"),
    }
}

fn parse_bool(input: &str) -> Result<bool, String> {
    match input {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err("parse error".to_string()),
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse durations such as `300ms`, `1.5h` or `2h45m`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// needs no unit. Negative durations are rejected.
///
/// # Errors
///
/// Returns a human readable reason for malformed input.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {input:?}");
    let mut s = input.strip_prefix('+').unwrap_or(input);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }
    let mut total: u128 = 0;
    while !s.is_empty() {
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, rest) = s.split_at(int_len);
        let (frac_part, rest) = match rest.strip_prefix('.') {
            Some(r) => r.split_at(r.bytes().take_while(u8::is_ascii_digit).count()),
            None => ("", rest),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (unit, rest) = rest.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(format!("missing unit in duration {input:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };
        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut frac: u128 = 0;
        let mut div: u128 = 1;
        for digit in frac_part.bytes().take(18) {
            frac = frac * 10 + u128::from(digit - b'0');
            div *= 10;
        }
        total = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(frac * scale / div))
            .and_then(|n| n.checked_add(total))
            .ok_or_else(invalid)?;
        s = rest;
    }
    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid())?;
    let nanos = u32::try_from(total % NANOS_PER_SEC).map_err(|_| invalid())?;
    Ok(Duration::new(secs, nanos))
}

/// Format a duration as `1h2m3.5s`, `1.5ms` or `0s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_SEC {
        let (unit, scale) = if nanos < 1_000 {
            ("ns", 1)
        } else if nanos < 1_000_000 {
            ("µs", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        return format!("{}{unit}", decimal(nanos, scale));
    }
    let secs = d.as_secs();
    let (hours, minutes) = (secs / 3600, secs % 3600 / 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    let rest = u128::from(secs % 60) * NANOS_PER_SEC + u128::from(d.subsec_nanos());
    out.push_str(&decimal(rest, NANOS_PER_SEC));
    out.push('s');
    out
}

fn decimal(value: u128, scale: u128) -> String {
    let (whole, rem) = (value / scale, value % scale);
    if rem == 0 {
        return whole.to_string();
    }
    let width = scale.to_string().len() - 1;
    let digits = format!("{rem:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
