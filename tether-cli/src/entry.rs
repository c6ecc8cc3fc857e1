//! Implements the command-line interface for `tether`.

use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use tether_core::{ManagedProcess, PipeSender, ProcessEvent, TokioEventLoop};

use crate::args::CommandLineArgs;
use crate::error::CliError;
use crate::{config, events, productinfo};

/// Size of the buffer used when relaying this process's stdin to the child.
const STDIN_CHUNK_SIZE: usize = 8 * 1024;

/// Main entry point for `tether`.
pub fn run() {
    install_panic_handlers();

    let parsed_args = match CommandLineArgs::try_parse() {
        Ok(parsed_args) => parsed_args,
        Err(e) => {
            let _ = e.print();

            // clap returns errors for `--help` and `--version` too.
            let exit_code = match e.kind() {
                clap::error::ErrorKind::DisplayVersion | clap::error::ErrorKind::DisplayHelp => 0,
                _ => 1,
            };

            std::process::exit(exit_code);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run_async(parsed_args));

    // The stdin relay may still be parked in a blocking read.
    runtime.shutdown_background();

    let exit_code = match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("error: {err:#}");
            1
        }
    };

    std::process::exit(i32::from(exit_code));
}

/// Installs a panic handler that captures panic details to a report file on
/// release builds and prints a human-readable message.
fn install_panic_handlers() {
    human_panic::setup_panic!(
        human_panic::Metadata::new(productinfo::PRODUCT_NAME, productinfo::PRODUCT_VERSION)
            .homepage(productinfo::PRODUCT_REPO)
            .support(format!(
                "please file an issue at {}/issues/new",
                productinfo::PRODUCT_REPO
            ))
    );
}

enum Step {
    Event(Option<ProcessEvent>),
    Timeout,
}

/// Runs the requested program to completion. Returns the exit code to report.
///
/// # Arguments
///
/// * `args` - The already-parsed command-line arguments.
async fn run_async(args: CommandLineArgs) -> Result<u8, CliError> {
    let mut trace_config = events::TraceEventConfig::init(&args.enabled_debug_events);

    let loaded = config::load_config(args.no_config, args.config_file.as_deref());
    if let Some(source) = loaded.error {
        let path = loaded.path.unwrap_or_default();
        if loaded.explicit_path {
            return Err(CliError::Config { path, source });
        }
        tracing::warn!("{}: {source}; using defaults", path.display());
    }

    for event in &loaded.config.log.debug {
        if let Err(e) = trace_config.enable(*event) {
            tracing::warn!("cannot enable tracing of {event}: {e}");
        }
    }

    let settings = loaded.config.to_run_settings(&args);
    let timeout_signal = tether_core::parse_signal(&settings.timeout_signal)?;

    let event_loop = Arc::new(TokioEventLoop::current()?);
    let mut process = ManagedProcess::with_args(event_loop, args.command)?;
    process.cwd = args.cwd;
    process.env = args.env;
    process.clear_env = settings.clear_env;
    process.inherit_stderr = settings.inherit_stderr;
    process.max_args = settings.max_args;

    let mut process_events = process.subscribe();
    let pid = process.spawn()?;
    tracing::debug!("started {} as process {pid}", process.options().file().display());

    // The relay's handle keeps stdin open until it reaches end-of-file.
    if !args.no_stdin {
        relay_stdin(process.stdin().sender()?);
    }
    process.stdin().close();

    let deadline = settings.timeout.map(|timeout| Instant::now() + timeout);
    let mut timed_out = false;
    let mut exit_code = None;
    let mut stdout_closed = false;
    let mut stdout = tokio::io::stdout();

    while exit_code.is_none() || !stdout_closed {
        let step = tokio::select! {
            event = process_events.recv() => Step::Event(event),
            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() && !timed_out => Step::Timeout,
        };

        match step {
            Step::Event(Some(ProcessEvent::Output { data, .. })) => {
                stdout.write_all(&data).await?;
                stdout.flush().await?;
            }
            Step::Event(Some(ProcessEvent::StdoutClosed { .. })) => stdout_closed = true,
            Step::Event(Some(ProcessEvent::Exited {
                exit_code: code,
                signal,
                ..
            })) => {
                tracing::debug!("process {pid} exited with code {code} (signal: {signal:?})");
                exit_code = Some(code);
            }
            Step::Event(Some(ProcessEvent::Spawned { .. })) => (),
            Step::Event(None) => break,
            Step::Timeout => {
                timed_out = true;
                tracing::warn!(
                    "process {pid} timed out; sending {}",
                    tether_core::signal_name(timeout_signal)
                );
                match process.kill(timeout_signal) {
                    Ok(()) | Err(tether_core::Error::InvalidKillTarget) => (),
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(exit_code.map_or(1, reported_exit_code))
}

/// Maps a child's exit code onto the range a process can exit with. A code below
/// zero means the exit could not be observed and is reported as a failure.
fn reported_exit_code(code: i64) -> u8 {
    if code < 0 {
        1
    } else {
        u8::try_from(code).unwrap_or(u8::MAX)
    }
}

/// Relays this process's stdin to the child until end-of-file. Reading pauses
/// while the child's write queue is full.
fn relay_stdin(sender: PipeSender) {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buffer = vec![0u8; STDIN_CHUNK_SIZE];

        loop {
            match stdin.read(&mut buffer).await {
                Ok(0) => break,
                Ok(count) => {
                    if let Err(e) = sender.send(&buffer[..count]).await {
                        tracing::debug!("no longer relaying stdin: {e}");
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
}
