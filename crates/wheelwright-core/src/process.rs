use std::{
    io::{self, Read, Write},
    path::Path,
    process::{Command, Stdio},
    thread,
};

use anyhow::{Context, Result};

const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Exit status and captured output of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Captured stderr followed by stdout, trimmed; empty when nothing was captured.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let mut text = String::new();
        for stream in [self.stderr.trim(), self.stdout.trim()] {
            if stream.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stream);
        }
        text
    }
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command(program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
    let mut command = configured_command(program, args, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, MAX_CAPTURE_BYTES));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, MAX_CAPTURE_BYTES));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Execute a program with every stream attached to the null device.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned.
pub fn run_command_silent(program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
    let mut command = configured_command(program, args, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    let status = command
        .status()
        .with_context(|| format!("failed to start {program}"))?;
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        ..RunOutput::default()
    })
}

/// Execute a program while streaming stdout/stderr to the parent process.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or its output streams
/// cannot be read.
pub fn run_command_streaming(program: &str, args: &[String], cwd: &Path) -> Result<RunOutput> {
    let mut command = configured_command(program, args, cwd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;

    let stdout_handle =
        thread::spawn(move || tee_to_string_limited(&mut stdout, io::stdout(), MAX_CAPTURE_BYTES));
    let stderr_handle =
        thread::spawn(move || tee_to_string_limited(&mut stderr, io::stderr(), MAX_CAPTURE_BYTES));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;

    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

fn configured_command(program: &str, args: &[String], cwd: &Path) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    command.current_dir(cwd);
    command
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<String> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok(finish_capture(&buffer, truncated))
}

fn tee_to_string_limited(
    reader: &mut dyn Read,
    mut writer: impl Write,
    limit: usize,
) -> Result<String> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        writer.write_all(&chunk[..read])?;
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    writer.flush().ok();
    Ok(finish_capture(&buffer, truncated))
}

fn finish_capture(buffer: &[u8], truncated: bool) -> String {
    let mut text = String::from_utf8_lossy(buffer).to_string();
    if truncated {
        text.insert_str(0, "[...truncated...]\n");
    }
    text
}

// Keeps the tail of the stream; the last lines of a failing build matter most.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}
