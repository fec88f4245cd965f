mod sleep;
mod tick;

use std::path::Path;

use cmdtree::config::ConfigFile;
use cmdtree::{Command, Container, Runner, Table};
use log::LevelFilter;

/// Wrap the target command so the file named by the global `-config` flag is
/// applied once every command in the path has parsed its own flags.
///
/// Unlike [`cmdtree::config::with_config`], the path is only known after the
/// root parsed its flags, and a path the user typed that does not exist is an
/// error rather than an empty config.
fn with_config(command: impl Command + 'static) -> Container {
    Container::new(command).with_run(|inner, ctx, args| {
        let path = ctx.path()[0]
            .flags()
            .get_string("config")
            .unwrap_or_default()
            .to_string();
        if !path.is_empty() {
            ConfigFile::from_file(Path::new(&path))?.apply(ctx)?;
        }
        inner.run(ctx, args)
    })
}

fn main() {
    let _ = cmdtree::logger::init(None, LevelFilter::Warn);

    let commands = Table::new()
        .with("sleep", with_config(sleep::Sleep))
        .with("tick", with_config(tick::Tick));
    let root = Container::new(commands)
        .with_name(|| "Demo of nested sub-commands.".to_string())
        .with_define_flags(|inner, fs| {
            fs.bool("verbose", false, "be verbose")
                .string("config", "", "`path` of a YAML or JSON config file");
            inner.define_flags(fs);
        });

    Runner::default().with_force_term(3).main(root)
}
