use super::{Capability, ExecOptions, Step};
use crate::extractor::{ExtractedUnit, Interrupt};
use crate::outcome::{Location, Outcome, RunError, Verdict, OUT_OF_BAND_STATUS};
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// How long to keep draining output pipes after the process ended. Something
/// that left the process group can still hold them open.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Writes the example into a fresh temporary directory, runs its commands, and
/// checks the result against the example's directives.
pub(super) async fn run_unit<C: Capability + ?Sized>(
    capability: &C,
    unit: &ExtractedUnit,
    ordinal: usize,
    options: &ExecOptions,
) -> Outcome {
    let start = Instant::now();
    let at = unit.location();
    let code = capability.source_text(unit);

    let workdir = match tempfile::Builder::new()
        .prefix(&format!("mdexec-{:03}-", ordinal))
        .tempdir()
    {
        Ok(dir) => dir,
        Err(error) => return prepare_failed(at, error).with_code(code),
    };

    let file = workdir.path().join(capability.file_name(unit));
    if let Err(error) = write_source_file(&code, &file).await {
        return prepare_failed(at, error).with_code(code);
    }

    let steps = capability.commands(unit, &file);
    execute_steps(&steps, workdir.path(), unit, at, options)
        .await
        .with_code(code)
        .with_duration(start.elapsed())
}

/// Writes the example to `<dir>/<NNN>_<document stem>/<file name>`.
pub(super) fn extract_unit<C: Capability + ?Sized>(
    capability: &C,
    unit: &ExtractedUnit,
    ordinal: usize,
    dir: &Path,
) -> Outcome {
    let at = unit.location();
    let code = capability.source_text(unit);

    let stem = unit
        .source
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let unit_dir = dir.join(format!("{:03}_{}", ordinal, stem));
    let file = unit_dir.join(capability.file_name(unit));

    let written = fs::create_dir_all(&unit_dir).and_then(|_| fs::write(&file, &code));
    match written {
        Ok(()) => {
            log::debug!("extracted source={} dest={}", at, file.display());
            Outcome::new(at, 0, Verdict::Passed).with_code(code)
        }
        Err(error) => prepare_failed(at, error).with_code(code),
    }
}

fn prepare_failed(at: Location, error: io::Error) -> Outcome {
    Outcome::new(
        at.clone(),
        OUT_OF_BAND_STATUS,
        Verdict::Failed(RunError::Prepare { at, error }),
    )
}

async fn write_source_file(code: &str, path: &Path) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(code.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Runs `steps` in order inside `cwd`, stopping at the first failing one.
pub(super) async fn execute_steps(
    steps: &[Step],
    cwd: &Path,
    unit: &ExtractedUnit,
    at: Location,
    options: &ExecOptions,
) -> Outcome {
    let interrupt_after = unit.tags.interrupt.as_ref().and_then(Interrupt::after);
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut status = 0;
    let mut final_output: Option<(String, String)> = None;

    for step in steps {
        let limit = match interrupt_after {
            Some(after) if step.is_final => after,
            _ => options.timeout,
        };

        let captured = match spawn_and_wait(step, cwd, limit).await {
            Ok(captured) => captured,
            Err(error) if options.skip_missing && error.kind() == io::ErrorKind::NotFound => {
                let reason = format!("'{}' is not installed", step.program);
                return Outcome::new(at, OUT_OF_BAND_STATUS, Verdict::Skipped(reason))
                    .with_output(stdout, stderr);
            }
            Err(error) => {
                let program = step.program.clone();
                return Outcome::new(
                    at.clone(),
                    OUT_OF_BAND_STATUS,
                    Verdict::Failed(RunError::Spawn { at, program, error }),
                )
                .with_output(stdout, stderr);
            }
        };

        stdout.push_str(&captured.stdout);
        stderr.push_str(&captured.stderr);

        match captured.end {
            End::Exited(code) => {
                let expected = if step.is_final {
                    unit.tags.exit.unwrap_or(0)
                } else {
                    0
                };
                if code != expected {
                    let error = RunError::ExitStatus {
                        at: at.clone(),
                        program: step.program.clone(),
                        status: code,
                        expected,
                    };
                    return Outcome::new(at, code, Verdict::Failed(error)).with_output(stdout, stderr);
                }
                status = code;
            }
            End::Stopped if step.is_final && interrupt_after.is_some() => {
                log::debug!("interrupted source={} after={:?}", at, limit);
                status = 0;
            }
            End::Stopped => {
                let error = RunError::Timeout {
                    at: at.clone(),
                    program: step.program.clone(),
                    after: limit,
                };
                return Outcome::new(at, OUT_OF_BAND_STATUS, Verdict::Failed(error))
                    .with_output(stdout, stderr);
            }
        }

        if step.is_final {
            final_output = Some((captured.stdout, captured.stderr));
        }
    }

    let (final_stdout, final_stderr) = final_output.unwrap_or_default();
    let verdict = match check_output(unit, &at, &final_stdout, &final_stderr) {
        Ok(()) => Verdict::Passed,
        Err(error) => Verdict::Failed(error),
    };

    Outcome::new(at, status, verdict).with_output(stdout, stderr)
}

/// Matches the `output` and `error` directives against what the final step printed.
pub(super) fn check_output(
    unit: &ExtractedUnit,
    at: &Location,
    stdout: &str,
    stderr: &str,
) -> Result<(), RunError> {
    let checks = [
        ("output", "stdout", unit.tags.output.as_deref(), stdout),
        ("error", "stderr", unit.tags.error.as_deref(), stderr),
    ];

    for (tag, stream, pattern, text) in checks {
        let Some(pattern) = pattern else {
            continue;
        };

        let re = Regex::new(pattern).map_err(|error| RunError::InvalidPattern {
            at: at.clone(),
            tag,
            error,
        })?;

        if !re.is_match(text) {
            return Err(RunError::OutputMismatch {
                at: at.clone(),
                stream,
                pattern: pattern.to_string(),
            });
        }
    }

    Ok(())
}

enum End {
    Exited(i32),
    /// Still running when the limit expired, and killed.
    Stopped,
}

struct Captured {
    stdout: String,
    stderr: String,
    end: End,
}

async fn spawn_and_wait(step: &Step, cwd: &Path, limit: Duration) -> io::Result<Captured> {
    log::debug!("exec {} {:?} cwd={}", step.program, step.args, cwd.display());

    let mut command = Command::new(&step.program);
    command
        .args(&step.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a stop reaches everything the example started
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;

    let stdout = Stream::capture(child.stdout.take());
    let stderr = Stream::capture(child.stderr.take());

    let end = tokio::select! {
        status = child.wait() => End::Exited(status?.code().unwrap_or(OUT_OF_BAND_STATUS)),
        _ = tokio::time::sleep(limit) => {
            stop(&mut child).await?;
            End::Stopped
        }
    };

    let (stdout, stderr) = tokio::join!(stdout.drain(), stderr.drain());
    Ok(Captured {
        stdout,
        stderr,
        end,
    })
}

/// Kills the child and, on unix, the rest of its process group.
async fn stop(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; the child leads its own group until reaped below
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }

    if let Err(e) = child.start_kill() {
        log::debug!("kill failed error={}", e);
    }
    child.wait().await?;
    Ok(())
}

/// Output of one pipe, collected by a background task into a buffer that
/// stays readable even if the task has to be abandoned.
struct Stream {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Stream {
    fn capture<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|reader| tokio::spawn(read_into(reader, buf.clone())));
        Self { buf, task }
    }

    async fn drain(self) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                log::debug!("output still open after {:?}, giving up", DRAIN_GRACE);
                task.abort();
            }
        }

        let buf = std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&buf).into_owned()
    }
}

async fn read_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
        }
    }
}
