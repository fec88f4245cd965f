use std::time::Duration;

use cmdtree::flags::format_duration;
use cmdtree::{Command, Context, Error, FlagSet, exitf};

pub struct Sleep;

impl Command for Sleep {
    fn run(&self, ctx: &mut Context<'_>, args: Vec<String>) -> Result<(), Error> {
        if !args.is_empty() {
            return Err(exitf!(2, "unexpected arguments: {}", args.join(" ")));
        }
        let duration = ctx.flags().get_duration("d").unwrap_or_default();
        println!("going to sleep for {}", format_duration(duration));
        if ctx.cancellation().wait_timeout(duration) {
            return Err(Error::other("sleep interrupted"));
        }
        Ok(())
    }

    fn name(&self) -> Option<String> {
        Some("Suspends execution for a given amount of time.".to_string())
    }

    fn synopsis(&self) -> Option<String> {
        Some("[-d duration]".to_string())
    }

    fn define_flags(&self, flags: &mut FlagSet) {
        flags.duration("d", Duration::from_secs(1), "how long to sleep");
    }
}
