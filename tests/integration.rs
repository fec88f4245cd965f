use std::sync::Arc;
use std::time::Duration;

use cmdtree::config::with_config;
use cmdtree::{
    Command, CommandFn, CommandRef, Container, Context, Error, FlagSet, Runner, Signal, Table,
};
use parking_lot::Mutex;

struct Sleep;

impl Command for Sleep {
    fn run(&self, _ctx: &mut Context<'_>, _args: Vec<String>) -> Result<(), Error> {
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

/// What a leaf command saw when it ran.
#[derive(Default, Debug, Clone, PartialEq)]
struct Observed {
    path: Vec<String>,
    args: Vec<String>,
    duration: Option<Duration>,
}

/// A sleep-like leaf that records its view of the context.
fn recording_leaf(seen: &Arc<Mutex<Option<Observed>>>) -> Container {
    let seen = Arc::clone(seen);
    Container::new(CommandFn::new(move |ctx, args| {
        *seen.lock() = Some(Observed {
            path: ctx.path().iter().map(|e| e.name().to_string()).collect(),
            args,
            duration: ctx.flags().get_duration("d"),
        });
        Ok(())
    }))
    .with_define_flags(|_, fs| {
        fs.duration("d", Duration::from_secs(1), "how long to sleep");
    })
}

fn run(root: impl Command + 'static, args: &[&str]) -> (i32, String, String) {
    run_with(&Runner::new().with_signals([]), Arc::new(root), args)
}

fn run_with(runner: &Runner, root: CommandRef, args: &[&str]) -> (i32, String, String) {
    let argv = std::iter::once("/usr/local/bin/tool")
        .chain(args.iter().copied())
        .map(String::from)
        .collect();
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let code = runner.run(root, argv, &mut out, &mut err);
    (
        code,
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

#[test]
fn test_bare_table_shows_help() {
    let (code, out, err) = run(Table::new().with("sleep", Sleep), &[]);
    assert_eq!(code, 0);
    assert!(out.starts_with("Usage:\n"));
    assert!(err.is_empty());
}

#[test]
fn test_help_token_shows_root_usage() {
    let (code, out, _) = run(Table::new().with("sleep", Sleep), &["help"]);
    assert_eq!(code, 0);
    assert_eq!(
        out,
        "Usage:\n\n  tool [help] <command>\n\n\
         Commands:\n  sleep  Suspends execution for a given amount of time.\n\n"
    );
}

#[test]
fn test_unknown_command() {
    let (code, out, err) = run(Table::new(), &["foo"]);
    assert_eq!(code, 2);
    assert!(out.is_empty());
    assert_eq!(
        err,
        "`tool foo`: unknown command\nRun `tool help` for help.\n"
    );
}

#[test]
fn test_unknown_nested_command_names_full_path() {
    let root = Table::new().with("remote", Table::new().with("add", Sleep));
    let (code, _, err) = run(root, &["remote", "rm"]);
    assert_eq!(code, 2);
    assert!(err.starts_with("`tool remote rm`: unknown command\n"));
    assert!(err.contains("Run `tool remote help` for help."));
}

#[test]
fn test_help_name_matches_dash_h() {
    let root = || Table::new().with("sleep", Sleep);
    let (code, by_token, _) = run(root(), &["help", "sleep"]);
    assert_eq!(code, 0);
    let (code, by_flag, _) = run(root(), &["sleep", "-h"]);
    assert_eq!(code, 0);
    assert_eq!(by_token, by_flag);
    let (_, by_long_flag, _) = run(root(), &["sleep", "--help"]);
    assert_eq!(by_token, by_long_flag);

    insta::assert_snapshot!(by_token, @r"
    Suspends execution for a given amount of time.

    Usage:

      tool sleep [-d duration]

    Options:

      -d duration
        	how long to sleep (default 1s)
    ");
}

#[test]
fn test_repeated_help_tokens() {
    let root = || Table::new().with("sleep", Sleep);
    let (_, once, _) = run(root(), &["help", "sleep"]);
    let (code, twice, _) = run(root(), &["help", "help", "sleep"]);
    assert_eq!(code, 0);
    assert_eq!(once, twice);
}

#[test]
fn test_help_for_unknown_name_is_usage_error() {
    let (code, _, err) = run(Table::new().with("sleep", Sleep), &["help", "nap"]);
    assert_eq!(code, 2);
    assert!(err.contains("unknown command"));
}

#[test]
fn test_sleep_duration_flag() {
    let seen = Arc::new(Mutex::new(None));
    let root = Table::new().with("sleep", recording_leaf(&seen));
    let (code, _, _) = run(root, &["sleep", "-d", "2s"]);
    assert_eq!(code, 0);
    assert_eq!(
        seen.lock().clone(),
        Some(Observed {
            path: vec!["tool".to_string(), "sleep".to_string()],
            args: vec![],
            duration: Some(Duration::from_secs(2)),
        })
    );
}

#[test]
fn test_leftover_args_reach_leaf() {
    let seen = Arc::new(Mutex::new(None));
    let root = Table::new().with("sleep", recording_leaf(&seen));
    let (code, _, _) = run(root, &["sleep", "-d=3s", "now", "-d", "4s"]);
    assert_eq!(code, 0);
    let observed = seen.lock().clone().unwrap();
    assert_eq!(observed.args, ["now", "-d", "4s"]);
    assert_eq!(observed.duration, Some(Duration::from_secs(3)));
}

#[test]
fn test_nested_path_in_traversal_order() {
    let seen = Arc::new(Mutex::new(None));
    let root = Table::new().with("a", Table::new().with("b", recording_leaf(&seen)));
    let (code, _, _) = run(root, &["a", "b"]);
    assert_eq!(code, 0);
    assert_eq!(seen.lock().clone().unwrap().path, ["tool", "a", "b"]);
}

#[test]
fn test_failed_lookup_adds_no_entry() {
    let path = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let path = Arc::clone(&path);
        Container::new(Table::new().with("b", Sleep)).with_run(move |inner, ctx, args| {
            let result = inner.run(ctx, args);
            *path.lock() = ctx.path().iter().map(|e| e.name().to_string()).collect();
            result
        })
    };
    let (code, _, _) = run(Table::new().with("a", recorder), &["a", "zzz"]);
    assert_eq!(code, 2);
    assert_eq!(*path.lock(), ["tool", "a"]);
}

#[test]
fn test_path_entries_share_commands() {
    let captured: Arc<Mutex<Vec<CommandRef>>> = Arc::new(Mutex::new(Vec::new()));
    let leaf = {
        let captured = Arc::clone(&captured);
        CommandFn::new(move |ctx, _| {
            *captured.lock() = ctx.path().iter().map(|e| Arc::clone(e.command())).collect();
            Ok(())
        })
    };
    let inner = Table::new().with("b", leaf);
    let root = Table::new().with("a", inner);
    let expected_a = Arc::clone(root.get("a").unwrap());
    let (code, _, _) = run_with(&Runner::new().with_signals([]), Arc::new(root), &["a", "b"]);
    assert_eq!(code, 0);
    let captured = captured.lock();
    assert_eq!(captured.len(), 3);
    assert!(Arc::ptr_eq(&captured[1], &expected_a));
}

#[test]
fn test_container_is_transparent_at_runtime() {
    for args in [&["help", "sleep"][..], &["sleep", "-h"], &["nap"], &[]] {
        let plain = run(Table::new().with("sleep", Sleep), args);
        let wrapped = run(Container::new(Table::new().with("sleep", Sleep)), args);
        assert_eq!(plain, wrapped, "args: {args:?}");
    }
}

#[test]
fn test_global_flags_from_root_container() {
    let verbose = Arc::new(Mutex::new(None));
    let leaf = {
        let verbose = Arc::clone(&verbose);
        CommandFn::new(move |ctx, _| {
            *verbose.lock() = ctx.path()[0].flags().get_bool("verbose");
            Ok(())
        })
    };
    let root = Container::new(Table::new().with("tick", leaf)).with_define_flags(|_, fs| {
        fs.bool("verbose", false, "be verbose");
    });
    let (code, _, _) = run(root, &["-verbose", "tick"]);
    assert_eq!(code, 0);
    assert_eq!(*verbose.lock(), Some(true));
}

#[test]
fn test_root_help_lists_global_flags() {
    let root = Container::new(Table::new().with("sleep", Sleep))
        .with_name(|| "Demo tool.".to_string())
        .with_define_flags(|_, fs| {
            fs.bool("verbose", false, "be verbose");
        });
    let (code, out, _) = run(root, &["-h"]);
    assert_eq!(code, 0);
    assert!(out.starts_with("Demo tool.\n\nUsage:\n\n  tool [help] <command>\n"));
    assert!(out.ends_with("Options:\n\n  -verbose\n    \tbe verbose\n"));
}

#[test]
fn test_flag_error_in_sub_command() {
    let (code, _, err) = run(Table::new().with("sleep", Sleep), &["sleep", "-d", "soon"]);
    assert_eq!(code, 2);
    assert!(err.starts_with("invalid value \"soon\" for flag -d"));
}

#[test]
fn test_config_file_fills_unset_flags() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "sleep:\n  d: 5s\n").unwrap();

    let seen = Arc::new(Mutex::new(None));
    let root = || Table::new().with("sleep", with_config(recording_leaf(&seen), &config));

    let (code, _, _) = run(root(), &["sleep"]);
    assert_eq!(code, 0);
    assert_eq!(
        seen.lock().clone().unwrap().duration,
        Some(Duration::from_secs(5))
    );

    let (code, _, _) = run(root(), &["sleep", "-d", "2s"]);
    assert_eq!(code, 0);
    assert_eq!(
        seen.lock().clone().unwrap().duration,
        Some(Duration::from_secs(2))
    );
}

#[test]
fn test_config_file_errors_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "sleep:\n  nope: 1\n").unwrap();
    let root = Table::new().with("sleep", with_config(Sleep, &config));
    let (code, _, err) = run(root, &["sleep"]);
    assert_eq!(code, 1);
    assert_eq!(err, "Unknown flag `nope` in config section `sleep`\n");
}

#[test]
fn test_missing_config_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let root = Table::new().with("sleep", with_config(Sleep, dir.path().join("absent.yaml")));
    assert_eq!(run(root, &["sleep"]).0, 0);
}

#[test]
fn test_posix_runner() {
    let seen = Arc::new(Mutex::new(None));
    let root = Table::new().with("sleep", recording_leaf(&seen));
    let runner = cmdtree::posix::runner().with_signals([]);
    let (code, _, _) = run_with(&runner, Arc::new(root), &["sleep", "-d2s", "rest"]);
    assert_eq!(code, 0);
    let observed = seen.lock().clone().unwrap();
    assert_eq!(observed.duration, Some(Duration::from_secs(2)));
    assert_eq!(observed.args, ["rest"]);
}

#[test]
fn test_cancelled_leaf_exits_130() {
    let root = Table::new().with(
        "tick",
        CommandFn::new(|ctx, _| {
            ctx.cancellation().cancel();
            crossbeam_channel::select! {
                recv(ctx.done()) -> _ => Err(Error::other("cancelled")),
                recv(crossbeam_channel::after(Duration::from_secs(5))) -> _ => Ok(()),
            }
        }),
    );
    let (code, out, err) = run(root, &["tick"]);
    assert_eq!(code, 130);
    assert!(out.is_empty());
    assert!(err.is_empty());
}

/// Send `signal` (as understood by kill(1)) to this test process.
#[cfg(unix)]
fn raise(signal: &str) {
    let status = std::process::Command::new("kill")
        .args([signal, &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

/// A leaf that raises `signal` twice and reports whether each raise forced
/// termination.
#[cfg(unix)]
fn raise_twice(
    signal: &'static str,
    forced: std::sync::mpsc::Receiver<Signal>,
) -> impl Command + 'static {
    CommandFn::new(move |ctx, _| {
        raise(signal);
        assert!(ctx.cancellation().wait_timeout(Duration::from_secs(5)));
        assert!(forced.recv_timeout(Duration::from_millis(300)).is_err());

        raise(signal);
        assert!(forced.recv_timeout(Duration::from_secs(5)).is_ok());
        Err(Error::other("interrupted"))
    })
}

#[cfg(unix)]
fn recording_runner(signal: Signal, force_term: usize) -> (Runner, std::sync::mpsc::Receiver<Signal>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);
    let runner = Runner::new()
        .with_signals([signal])
        .with_force_term(force_term)
        .with_force_action(move |signal| {
            let _ = tx.lock().send(signal);
        });
    (runner, rx)
}

#[cfg(unix)]
#[test]
fn test_os_signal_forces_at_threshold() {
    let (runner, forced) = recording_runner(Signal::Hangup, 2);
    let root = Table::new().with("wait", raise_twice("-HUP", forced));
    let (code, out, err) = run_with(&runner, Arc::new(root), &["wait"]);
    assert_eq!(code, 130);
    assert!(out.is_empty());
    assert!(err.is_empty());
}

#[cfg(unix)]
#[test]
fn test_os_signal_after_cancel_forces_without_threshold() {
    let (runner, forced) = recording_runner(Signal::Terminate, 0);
    let root = Table::new().with("wait", raise_twice("-TERM", forced));
    let (code, _, _) = run_with(&runner, Arc::new(root), &["wait"]);
    assert_eq!(code, 130);
}
