//! External commands.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tern_types::JobId;
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use super::exception::{Cause, ExecResult, Exception};
use super::frame::Frame;
use super::pipe::PipeWriter;
use super::port::{ByteIn, ByteOut};
use super::value::Value;

const COPY_CHUNK: usize = 8 * 1024;

/// Run `name` with `args` and wait for it.
///
/// The command's stdio is wired to the frame's byte ports. Its value input
/// is closed first so an upstream stage sending values cannot block on a
/// reader that will never come.
#[instrument(level = "debug", skip(args, frame))]
pub(crate) async fn run_external(name: &str, args: &[Value], frame: &Frame) -> ExecResult<()> {
    let mut argv = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Str(_) | Value::Num(_) => argv.push(arg.to_str()),
            other => return Err(Exception::new(Cause::wrong_type("string", other.kind()))),
        }
    }
    frame.ports.input.values.close().await;

    let mut cmd = Command::new(name);
    cmd.args(&argv);

    let feed = match &frame.ports.input.bytes {
        ByteIn::Closed => {
            cmd.stdin(Stdio::null());
            None
        }
        ByteIn::Stdin => {
            cmd.stdin(Stdio::inherit());
            None
        }
        ByteIn::File(f) => {
            cmd.stdin(std_file(f).await?);
            None
        }
        ByteIn::Pipe(_) => {
            cmd.stdin(Stdio::piped());
            frame.ports.input.bytes.reader().await
        }
    };
    let out_pipe = wire_output(&mut cmd, &frame.ports.output.bytes, Stream::Out).await?;
    let err_pipe = wire_output(&mut cmd, &frame.ports.error.bytes, Stream::Err).await?;

    let mut child = spawn(&mut cmd, frame).map_err(|e| Exception::new(Cause::Io(format!("{name}: {e}"))))?;
    let pid = child.id().unwrap_or_default();
    debug!(pid, "spawned");

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let feeding = async move {
        if let (Some(mut from), Some(mut to)) = (feed, stdin) {
            // the child may exit without reading everything
            let _ = tokio::io::copy(&mut from, &mut to).await;
            let _ = to.shutdown().await;
        }
    };
    let work = async {
        let (status, (), (), ()) = tokio::join!(
            child.wait(),
            feeding,
            pump(stdout, out_pipe),
            pump(stderr, err_pipe),
        );
        status
    };
    let status = tokio::select! {
        biased;
        _ = frame.cancel.cancelled() => return Err(Exception::new(Cause::Canceled)),
        status = work => status.map_err(|e| Exception::new(Cause::Io(format!("{name}: {e}"))))?,
    };

    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(Exception::new(Cause::ExternalExit {
            cmd: name.to_string(),
            pid,
            code,
        }));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(Exception::new(Cause::ExternalSignaled {
                cmd: name.to_string(),
                pid,
                signal,
            }));
        }
    }
    Err(Exception::new(Cause::ExternalExit {
        cmd: name.to_string(),
        pid,
        code: -1,
    }))
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Point the command's stdout or stderr at `target`; a pipe target needs a
/// copy task, returned here.
async fn wire_output(cmd: &mut Command, target: &ByteOut, stream: Stream) -> ExecResult<Option<Arc<PipeWriter>>> {
    let (stdio, pipe) = match target {
        ByteOut::Discard => (Stdio::null(), None),
        ByteOut::Stdout => (Stdio::from(std::io::stdout()), None),
        ByteOut::Stderr => (Stdio::from(std::io::stderr()), None),
        ByteOut::File(f) => (std_file(f).await?, None),
        ByteOut::Pipe(w) => (Stdio::piped(), Some(w.clone())),
    };
    match stream {
        Stream::Out => cmd.stdout(stdio),
        Stream::Err => cmd.stderr(stdio),
    };
    Ok(pipe)
}

async fn std_file(f: &tokio::sync::Mutex<tokio::fs::File>) -> ExecResult<Stdio> {
    let file = f.lock().await.try_clone().await.map_err(|e| Exception::new(Cause::io(e)))?;
    Ok(Stdio::from(file.into_std().await))
}

/// Copy a child's output into an in-memory pipe. Stops early when the
/// reading stage has gone away, so the child sees a broken pipe too.
async fn pump(from: Option<impl AsyncRead + Unpin>, to: Option<Arc<PipeWriter>>) {
    let (Some(mut from), Some(to)) = (from, to) else {
        return;
    };
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        match from.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if to.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Spawn inside the frame's job, if it has one.
fn spawn(cmd: &mut Command, frame: &Frame) -> std::io::Result<Child> {
    let Some(job) = &frame.job else {
        return cmd.spawn();
    };
    // held across spawn so sibling stages agree on the group
    let mut slot = job.lock();
    let child = match slot.group {
        None => spawn_in_group(cmd, 0)?,
        Some(group) => match spawn_in_group(cmd, group) {
            Ok(child) => child,
            Err(e) if group_is_gone(&e) => {
                let fresh = frame.job_controller().create_job().map_err(std::io::Error::other)?;
                debug!(job = %slot.current, group, fresh = %fresh, "process group gone, starting a new one");
                slot.restart(fresh);
                spawn_in_group(cmd, 0)?
            }
            Err(e) => return Err(e),
        },
    };
    let Some(pid) = child.id() else {
        return Ok(child);
    };
    let first = slot.group.is_none();
    if first {
        slot.group = Some(pid);
    }
    let id = slot.current;
    drop(slot);
    join_job(frame, id, pid, first);
    Ok(child)
}

/// Spawn into process group `group`, or a new group led by the child when 0.
#[cfg_attr(not(unix), allow(unused_variables))]
fn spawn_in_group(cmd: &mut Command, group: u32) -> std::io::Result<Child> {
    #[cfg(unix)]
    cmd.process_group(group as i32);
    cmd.spawn()
}

/// `setpgid` into a group with no members left fails with EPERM.
fn group_is_gone(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(nix::errno::Errno::EPERM as i32)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

fn join_job(frame: &Frame, id: JobId, pid: u32, first: bool) {
    let jobs = frame.job_controller();
    if let Err(e) = jobs.add_process(id, pid) {
        warn!(job = %id, pid, "could not add process to job: {e}");
        return;
    }
    if first && frame.evaler.config.interactive {
        if let Err(e) = jobs.bring_to_foreground(id) {
            warn!(job = %id, "could not foreground job: {e}");
        }
    }
}
