//! End-to-end tests spawning real child processes.

#![cfg(unix)]
#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use pretty_assertions::assert_eq;
use tether_core::{
    Error, EventLoop, ManagedProcess, ProcessEvent, ProcessState, Signal, StdioRedirect,
    WRITE_QUEUE_DEPTH,
};

fn shell(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

#[tokio::test]
async fn echo_delivers_output_and_exit_code() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["echo", "hello"])?;

    let output = Arc::new(Mutex::new(Vec::new()));
    let output_in_callback = Arc::clone(&output);
    process.on_stdout(move |chunk| {
        if let Ok(mut output) = output_in_callback.lock() {
            output.extend_from_slice(chunk);
        }
    });

    let (exit_tx, mut exit_rx) = tokio::sync::mpsc::unbounded_channel();
    process.on_exit(move |code| {
        let _ = exit_tx.send(code);
    });

    let events = process.subscribe();
    let pid = process.spawn()?;
    assert!(pid > 0);
    assert_eq!(process.pid(), Some(pid));

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "hello\n");
    assert_eq!(completion.exit_code, Some(0));
    assert_eq!(exit_rx.recv().await, Some(0));

    let delivered = output.lock().map(|o| o.clone()).unwrap_or_default();
    assert_eq!(delivered, b"hello\n");

    assert_eq!(process.pid(), None);
    assert!(process.exit_status().is_some_and(|s| s.success()));
    assert_eq!(event_loop.creations(), 1);

    Ok(())
}

#[tokio::test]
async fn nonexistent_binary_fails_to_spawn() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process =
        ManagedProcess::with_args(event_loop.clone(), ["/nonexistent/binary", "--flag"])?;

    let err = process.spawn().err().context("spawn should fail")?;

    assert!(matches!(err, Error::SpawnFailed { ref executable, .. }
        if executable == &PathBuf::from("/nonexistent/binary")));
    assert_eq!(err.os_code(), Some(2));
    assert_eq!(process.pid(), None);
    assert_eq!(process.state(), ProcessState::Idle);
    assert!(matches!(process.terminate(), Err(Error::InvalidKillTarget)));

    Ok(())
}

#[tokio::test]
async fn failed_spawn_can_be_retried() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["/nonexistent/binary"])?;
    assert!(process.spawn().is_err());

    process.args = vec!["echo".into(), "second try".into()];
    let events = process.subscribe();
    process.spawn()?;

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "second try\n");
    assert_eq!(event_loop.creations(), 2);

    Ok(())
}

#[tokio::test]
async fn argument_limit_is_enforced_before_creation() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;

    let eleven: Vec<String> = std::iter::once("echo".to_string())
        .chain((1..=10).map(|i| i.to_string()))
        .collect();
    let mut process = ManagedProcess::with_args(event_loop.clone(), eleven)?;
    assert!(matches!(
        process.spawn(),
        Err(Error::TooManyArguments { count: 11, max: 10 })
    ));
    assert_eq!(event_loop.creations(), 0);

    let ten: Vec<String> = std::iter::once("echo".to_string())
        .chain((1..=9).map(|i| i.to_string()))
        .collect();
    let mut process = ManagedProcess::with_args(event_loop.clone(), ten)?;
    let events = process.subscribe();
    process.spawn()?;

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "1 2 3 4 5 6 7 8 9\n");
    assert_eq!(event_loop.creations(), 1);

    Ok(())
}

#[tokio::test]
async fn missing_executable_is_rejected() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::new(event_loop.clone())?;

    assert!(matches!(process.spawn(), Err(Error::MissingExecutable)));
    assert_eq!(event_loop.creations(), 0);

    Ok(())
}

#[tokio::test]
async fn first_argument_names_the_executable() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;

    for _ in 0..2 {
        let mut process = ManagedProcess::with_args(event_loop.clone(), ["echo", "again"])?;
        let events = process.subscribe();
        process.spawn()?;
        assert_eq!(process.options().file(), std::path::Path::new("echo"));

        let completion = common::complete(events).await?;
        assert_eq!(completion.output_str(), "again\n");
    }

    assert_eq!(event_loop.creations(), 2);
    Ok(())
}

#[tokio::test]
async fn explicit_file_keeps_argv0() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(
        event_loop,
        ["custom-name", "-c", "printf %s \"$0\""],
    )?;
    process.file = Some(PathBuf::from("sh"));

    let events = process.subscribe();
    process.spawn()?;

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "custom-name");

    Ok(())
}

#[tokio::test]
async fn kill_after_exit_is_rejected() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["true"])?;

    let mut events = process.subscribe();
    process.spawn()?;
    let (code, _) = common::exited(&mut events).await?;
    assert_eq!(code, 0);

    assert!(matches!(
        process.kill(Signal::SIGTERM),
        Err(Error::InvalidKillTarget)
    ));
    assert!(event_loop.signals().is_empty());

    Ok(())
}

#[tokio::test]
async fn stdin_is_delivered_in_order() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, ["cat"])?;

    // Queued before the child exists.
    process.stdin().write("first ")?;

    let events = process.subscribe();
    process.spawn()?;

    process.stdin().write("second ")?;
    process.stdin().write(b"third".to_vec())?;
    process.stdin().close();
    assert!(matches!(
        process.stdin().write("late"),
        Err(Error::PipeClosed)
    ));

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "first second third");
    assert_eq!(completion.exit_code, Some(0));

    Ok(())
}

#[tokio::test]
async fn stdout_cannot_be_read_twice() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["sleep", "5"])?;
    process.spawn()?;

    let result = process
        .stdout()
        .read_start(&*event_loop, Box::new(|_chunk| ()));
    assert!(matches!(result, Err(Error::PipeAlreadyReading)));

    process.kill(Signal::SIGKILL)?;
    Ok(())
}

#[tokio::test]
async fn sigkill_reports_signal_exit() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["sleep", "30"])?;

    let mut events = process.subscribe();
    let pid = process.spawn()?;
    process.kill(Signal::SIGKILL)?;

    let (code, signal) = common::exited(&mut events).await?;
    assert_eq!(code, 137);
    assert_eq!(signal, Some(9));
    assert_eq!(event_loop.signals(), vec![(pid, Signal::SIGKILL)]);

    let status = process.exit_status().context("exit status")?;
    assert_eq!(status.signal(), Some(9));
    assert_eq!(
        process.state(),
        ProcessState::Exited { pid, status }
    );

    Ok(())
}

#[tokio::test]
async fn drop_terminates_running_child() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["sleep", "30"])?;

    let mut events = process.subscribe();
    let pid = process.spawn()?;
    drop(process);

    assert_eq!(event_loop.signals(), vec![(pid, Signal::SIGTERM)]);

    // The exit watcher outlives the handle and still reports the exit.
    let (code, signal) = common::exited(&mut events).await?;
    assert_eq!(code, 128 + 15);
    assert_eq!(signal, Some(15));

    Ok(())
}

#[tokio::test]
async fn respawn_is_rejected() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["true"])?;

    let mut events = process.subscribe();
    process.spawn()?;
    assert!(matches!(process.spawn(), Err(Error::AlreadySpawned)));

    common::exited(&mut events).await?;
    assert!(matches!(process.spawn(), Err(Error::AlreadySpawned)));
    assert_eq!(event_loop.creations(), 1);

    Ok(())
}

#[tokio::test]
async fn working_directory_is_applied() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, ["pwd"])?;
    process.cwd = Some(PathBuf::from("/"));

    let events = process.subscribe();
    process.spawn()?;

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "/\n");

    Ok(())
}

#[tokio::test]
async fn missing_working_directory_fails_to_spawn() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, ["pwd"])?;
    process.cwd = Some(PathBuf::from("/nonexistent/directory"));

    assert!(matches!(process.spawn(), Err(Error::SpawnFailed { .. })));
    assert_eq!(process.pid(), None);

    Ok(())
}

#[tokio::test]
async fn environment_is_applied() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;

    let mut process =
        ManagedProcess::with_args(event_loop.clone(), shell("printf %s \"$TETHER_VALUE\""))?;
    process.env = vec![("TETHER_VALUE".into(), "from parent".into())];
    let events = process.subscribe();
    process.spawn()?;
    assert_eq!(common::complete(events).await?.output_str(), "from parent");

    let mut process = ManagedProcess::with_args(
        event_loop,
        shell("printf %s \"${HOME-unset}:$ONLY\""),
    )?;
    process.file = Some(PathBuf::from("/bin/sh"));
    process.clear_env = true;
    process.env = vec![("ONLY".into(), "1".into())];
    let events = process.subscribe();
    process.spawn()?;
    assert_eq!(common::complete(events).await?.output_str(), "unset:1");

    Ok(())
}

#[tokio::test]
async fn stderr_is_discarded_by_default() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process =
        ManagedProcess::with_args(event_loop, shell("echo out; echo err >&2; exit 4"))?;

    let events = process.subscribe();
    process.spawn()?;

    let completion = common::complete(events).await?;
    assert_eq!(completion.output_str(), "out\n");
    assert_eq!(completion.exit_code, Some(4));

    Ok(())
}

#[tokio::test]
async fn events_follow_lifecycle_order() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process =
        ManagedProcess::with_args(event_loop, ["echo", "ordered"])?;
    process.cwd = Some(PathBuf::from("/tmp"));

    let events = process.subscribe();
    let pid = process.spawn()?;
    let completion = common::complete(events).await?;

    assert_eq!(
        completion.events.first(),
        Some(&ProcessEvent::Spawned {
            pid,
            program: PathBuf::from("echo"),
            args: vec!["echo".into(), "ordered".into()],
            cwd: Some(PathBuf::from("/tmp")),
        })
    );

    let closed_at = completion
        .events
        .iter()
        .position(|e| matches!(e, ProcessEvent::StdoutClosed { .. }))
        .context("stdout closed")?;
    let last_output = completion
        .events
        .iter()
        .rposition(|e| matches!(e, ProcessEvent::Output { .. }))
        .context("output")?;
    assert!(last_output < closed_at);

    Ok(())
}

#[tokio::test]
async fn read_start_failure_leaves_child_running() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    event_loop.refuse_readers();

    let mut process = ManagedProcess::with_args(event_loop.clone(), ["sleep", "30"])?;
    let mut events = process.subscribe();

    let err = process.spawn().err().context("spawn should fail")?;
    assert!(matches!(err, Error::ReadStartFailed(_)));
    assert!(err.is_partial_spawn());
    assert_eq!(err.os_code(), Some(24));

    let pid = process.pid().context("child should still be running")?;
    process.kill(Signal::SIGKILL)?;
    let (code, _) = common::exited(&mut events).await?;
    assert_eq!(code, 137);
    assert_eq!(event_loop.signals(), vec![(pid, Signal::SIGKILL)]);

    Ok(())
}

#[tokio::test]
async fn read_start_failure_keeps_both_pipes_usable() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    event_loop.refuse_readers();

    let mut process = ManagedProcess::with_args(
        event_loop.clone(),
        shell("read line; echo \"got $line\"; exit 7"),
    )?;
    let mut events = process.subscribe();

    let err = process.spawn().err().context("spawn should fail")?;
    assert!(matches!(err, Error::ReadStartFailed(_)));

    // Stdin was started anyway.
    process.stdin().write("hello\n")?;
    process.stdin().close();

    // The stdout end was kept, so reading can be retried.
    event_loop.allow_readers();
    let output = Arc::new(Mutex::new(Vec::new()));
    let output_in_callback = Arc::clone(&output);
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    process.stdout().read_start_with_close(
        &*event_loop,
        Box::new(move |chunk| {
            if let Ok(mut output) = output_in_callback.lock() {
                output.extend_from_slice(chunk);
            }
        }),
        Box::new(move || {
            let _ = closed_tx.send(());
        }),
    )?;

    let (code, _) = common::exited(&mut events).await?;
    assert_eq!(code, 7);
    tokio::time::timeout(common::TIMEOUT, closed_rx).await??;
    assert_eq!(
        output.lock().map(|o| o.clone()).unwrap_or_default(),
        b"got hello\n".to_vec()
    );

    Ok(())
}

#[tokio::test]
async fn stdin_queue_applies_backpressure() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, ["sleep", "30"])?;
    let mut events = process.subscribe();
    process.spawn()?;

    // The first chunk is larger than the OS pipe buffer, so the writer stalls on it.
    let chunk = vec![b'x'; 1024 * 1024];
    process.stdin().write(chunk.clone())?;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let mut accepted = 0;
    let err = loop {
        match process.stdin().write(chunk.clone()) {
            Ok(()) => accepted += 1,
            Err(e) => break e,
        }
        assert!(accepted <= WRITE_QUEUE_DEPTH, "queue never filled up");
    };
    assert!(matches!(err, Error::PipeFull));

    // Waiting for room does not complete while the child is not reading.
    let blocked = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        process.stdin().send(chunk),
    )
    .await;
    assert!(blocked.is_err());

    process.kill(Signal::SIGKILL)?;
    let (code, _) = common::exited(&mut events).await?;
    assert_eq!(code, 137);

    Ok(())
}

#[tokio::test]
async fn ignored_stdout_produces_no_output() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, ["echo", "hidden"])?;
    process.set_stdio([StdioRedirect::ReadablePipe, StdioRedirect::Ignore]);

    let events = process.subscribe();
    process.spawn()?;
    let completion = common::complete(events).await?;

    assert_eq!(completion.exit_code, Some(0));
    assert_eq!(completion.output_str(), "");
    assert_eq!(
        process.options().stdio(),
        &[StdioRedirect::ReadablePipe, StdioRedirect::Ignore]
    );

    Ok(())
}

#[tokio::test]
async fn ignored_stdin_reads_as_empty() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, shell("cat; echo done"))?;
    process.set_stdio([StdioRedirect::Ignore, StdioRedirect::WritablePipe]);

    let events = process.subscribe();
    process.spawn()?;
    let completion = common::complete(events).await?;

    assert_eq!(completion.exit_code, Some(0));
    assert_eq!(completion.output_str(), "done\n");

    Ok(())
}

#[tokio::test]
async fn mismatched_stdio_is_rejected() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop.clone(), ["true"])?;
    process.set_stdio([StdioRedirect::WritablePipe, StdioRedirect::WritablePipe]);

    assert!(matches!(process.spawn(), Err(Error::WrongPipeDirection)));
    assert_eq!(event_loop.creations(), 0);
    assert_eq!(process.state(), ProcessState::Idle);

    Ok(())
}

#[tokio::test]
async fn write_start_failure_still_delivers_output() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    event_loop.refuse_writers();

    let mut process = ManagedProcess::with_args(event_loop, shell("echo ready; sleep 30"))?;
    let mut events = process.subscribe();

    let err = process.spawn().err().context("spawn should fail")?;
    assert!(matches!(err, Error::WriteStartFailed(_)));
    assert!(process.pid().is_some());

    // Reading was started before the failure.
    let first_output = tokio::time::timeout(common::TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(ProcessEvent::Output { data, .. }) => return Some(data),
                Some(_) => (),
                None => return None,
            }
        }
    })
    .await?;
    assert_eq!(first_output, Some(b"ready\n".to_vec()));

    process.kill(Signal::SIGKILL)?;
    let (code, _) = common::exited(&mut events).await?;
    assert_eq!(code, 137);

    Ok(())
}

#[tokio::test]
async fn exit_callback_runs_once() -> anyhow::Result<()> {
    let event_loop = common::RecordingLoop::current()?;
    let mut process = ManagedProcess::with_args(event_loop, shell("exit 7"))?;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_in_callback = Arc::clone(&calls);
    process.on_exit(move |code| {
        if let Ok(mut calls) = calls_in_callback.lock() {
            calls.push(code);
        }
    });

    let mut events = process.subscribe();
    process.spawn()?;
    common::exited(&mut events).await?;

    let observed = calls.lock().map(|c| c.clone()).unwrap_or_default();
    assert_eq!(observed, vec![7]);

    Ok(())
}

#[test]
fn creating_process_needs_no_runtime() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let event_loop: Arc<dyn EventLoop> =
        Arc::new(tether_core::TokioEventLoop::from_handle(runtime.handle().clone()));

    // Outside any runtime context: the loop enters its own runtime when needed.
    let mut process = ManagedProcess::with_args(event_loop, ["echo", "detached"])?;
    let events = process.subscribe();
    process.spawn()?;

    let completion = runtime.block_on(common::complete(events))?;
    assert_eq!(completion.output_str(), "detached\n");

    Ok(())
}
