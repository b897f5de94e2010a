use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::error::{ProcessingError, ProcessingResult};

/// Reject paths carrying shell metacharacters or traversal sequences.
pub(crate) fn validate_path(path: &str) -> ProcessingResult<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::InvalidPath(format!(
            "contains dangerous characters: {}",
            path
        )));
    }
    if path.contains("..") {
        return Err(ProcessingError::InvalidPath(format!(
            "contains directory traversal: {}",
            path
        )));
    }
    Ok(())
}

/// Executable paths are further limited to a conservative character set.
pub(crate) fn validate_executable(path: &str) -> ProcessingResult<()> {
    validate_path(path)?;
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\');
    if path.is_empty() || !path.chars().all(allowed) {
        return Err(ProcessingError::InvalidPath(format!(
            "unsafe executable path: {}",
            path
        )));
    }
    Ok(())
}

pub(crate) fn path_arg(path: &Path) -> ProcessingResult<String> {
    let arg = path.to_string_lossy().to_string();
    validate_path(&arg)?;
    Ok(arg)
}

/// Run a tool to completion and return its stdout. A non-zero exit surfaces stderr.
pub(crate) async fn run(
    program: &str,
    args: &[String],
    operation: &'static str,
) -> ProcessingResult<Vec<u8>> {
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::warn!(
            process.executable.name = program,
            ffmpeg.operation = operation,
            exit_code = ?output.status.code(),
            "Media tool exited with failure"
        );
        return Err(ProcessingError::Ffmpeg { operation, stderr });
    }

    tracing::debug!(
        process.executable.name = program,
        ffmpeg.operation = operation,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Media tool finished"
    );
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_path("/tmp/video.mp4").is_ok());
        assert!(validate_path("/tmp/a;rm -rf.mp4").is_err());
        assert!(validate_path("/tmp/../etc/passwd").is_err());
    }

    #[test]
    fn executable_paths_are_restricted() {
        assert!(validate_executable("ffmpeg").is_ok());
        assert!(validate_executable("/usr/local/bin/ffprobe").is_ok());
        assert!(validate_executable("ffmpeg --help").is_err());
        assert!(validate_executable("").is_err());
    }
}
