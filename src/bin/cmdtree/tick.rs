use std::io::Write;
use std::time::Duration;

use cmdtree::flags::Value;
use cmdtree::{Command, Context, Error, FlagSet};
use crossbeam_channel::{after, select};

/// Prints a mark every interval until cancelled or the count is reached.
pub struct Tick;

impl Command for Tick {
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        let interval = ctx.flags().get_duration("interval").unwrap_or_default();
        let count = ctx.flags().get_uint("count").unwrap_or_default();
        let verbose = matches!(ctx.find_flag("verbose"), Some(Value::Bool(true)));
        let label = if args.is_empty() {
            ".".to_string()
        } else {
            args.join(" ")
        };

        let mut ticks = 0u64;
        loop {
            ticks += 1;
            if verbose {
                println!("tick {ticks}: {label}");
            } else {
                print!("{label}");
                std::io::stdout().flush()?;
            }
            if count > 0 && ticks >= count {
                if !verbose {
                    println!();
                }
                return Ok(());
            }
            select! {
                recv(ctx.done()) -> _ => return Err(Error::other("tick cancelled")),
                recv(after(interval)) -> _ => {}
            }
        }
    }

    fn name(&self) -> Option<String> {
        Some("Prints a mark periodically until interrupted.".to_string())
    }

    fn synopsis(&self) -> Option<String> {
        Some("[-interval duration] [-count n] [label...]".to_string())
    }

    fn define_flags(&self, flags: &mut FlagSet) {
        flags
            .duration("interval", Duration::from_secs(1), "how frequent to tick")
            .uint("count", 0, "stop after `n` ticks, 0 ticks forever");
    }
}
