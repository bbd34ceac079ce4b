//! Generator subprocess control.
//!
//! A generator note's body is executed in a subprocess and its standard
//! output is re-parsed as Markdown. The code comes from either the first
//! fenced code block of the note (interpreter inferred from the fence's
//! language tag) or an external script named in the note's attributes.
//! Each invocation runs under a wall-clock timeout; stderr is captured so
//! failures surface with context.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::errors::NtError;

/// Location of the generator note inside its file, for diagnostics.
#[derive(Debug, Clone)]
pub struct GeneratorSite {
    pub path: PathBuf,
    pub line: usize,
}

/// Runs generator code in a subprocess with a timeout.
pub struct Generator {
    timeout: Duration,
}

/// A fenced code block lifted out of a generator body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Find the first fenced code block of a Markdown body.
pub fn first_code_block(body: &str) -> Option<CodeBlock> {
    let mut lines = body.lines();
    let mut language = String::new();
    let mut fence_char = '`';
    let mut fence_len = 0;
    for line in lines.by_ref() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence_char = trimmed.chars().next().unwrap_or('`');
            fence_len = trimmed.chars().take_while(|c| *c == fence_char).count();
            language = trimmed
                .trim_start_matches(fence_char)
                .trim()
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
            break;
        }
    }
    if fence_len == 0 {
        return None;
    }
    let mut code_lines = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.len() >= fence_len && trimmed.chars().all(|c| c == fence_char) {
            return Some(CodeBlock {
                language,
                code: code_lines.join("\n"),
            });
        }
        code_lines.push(line);
    }
    None
}

/// Interpreter binary for a fence language tag.
pub fn interpreter_for(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "python3" | "py" => "python3",
        "bash" => "bash",
        "ruby" | "rb" => "ruby",
        "node" | "javascript" | "js" => "node",
        "perl" => "perl",
        _ => "sh",
    }
}

impl Generator {
    pub fn new(timeout: Duration) -> Generator {
        Generator { timeout }
    }

    /// Execute inline generator code, returning captured stdout.
    pub fn run_inline(
        &self,
        block: &CodeBlock,
        workdir: &Path,
        site: &GeneratorSite,
    ) -> Result<String, NtError> {
        let mut script = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut script, block.code.as_bytes())?;
        std::io::Write::flush(&mut script)?;
        self.spawn(
            interpreter_for(&block.language),
            script.path(),
            workdir,
            site,
        )
    }

    /// Execute an external generator script, returning captured stdout.
    pub fn run_script(
        &self,
        script: &Path,
        interpreter: Option<&str>,
        workdir: &Path,
        site: &GeneratorSite,
    ) -> Result<String, NtError> {
        if !script.exists() {
            return Err(NtError::GeneratorMissing {
                path: site.path.clone(),
                line: site.line,
                script: script.display().to_string(),
            });
        }
        let interpreter = interpreter.unwrap_or_else(|| {
            script
                .extension()
                .and_then(|e| e.to_str())
                .map(interpreter_for)
                .unwrap_or("sh")
        });
        self.spawn(interpreter, script, workdir, site)
    }

    fn spawn(
        &self,
        interpreter: &str,
        script: &Path,
        workdir: &Path,
        site: &GeneratorSite,
    ) -> Result<String, NtError> {
        debug!(interpreter, script = %script.display(), "running generator");
        let mut child = Command::new(interpreter)
            .arg(script)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr is piped");
        let out_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let err_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(NtError::GeneratorTimeout {
                        path: site.path.clone(),
                        line: site.line,
                        seconds: self.timeout.as_secs(),
                    });
                }
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        };

        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(NtError::GeneratorFailed {
                path: site.path.clone(),
                line: site.line,
                status: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        String::from_utf8(stdout).map_err(|e| NtError::GeneratorOutput {
            path: site.path.clone(),
            line: site.line,
            reason: format!("stdout is not UTF-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> GeneratorSite {
        GeneratorSite {
            path: PathBuf::from("gen.md"),
            line: 3,
        }
    }

    #[test]
    fn test_first_code_block() {
        let body = "Intro.\n\n```python\nprint('hi')\n```\n\nAfter.";
        let block = first_code_block(body).unwrap();
        assert_eq!(block.language, "python");
        assert_eq!(block.code, "print('hi')");
    }

    #[test]
    fn test_no_code_block() {
        assert_eq!(first_code_block("Just text."), None);
        // An unterminated fence yields nothing.
        assert_eq!(first_code_block("```python\nprint('hi')"), None);
    }

    #[test]
    fn test_interpreter_mapping() {
        assert_eq!(interpreter_for("python"), "python3");
        assert_eq!(interpreter_for("sh"), "sh");
        assert_eq!(interpreter_for("unknown"), "sh");
    }

    #[test]
    fn test_run_inline_captures_stdout() {
        let generator = Generator::new(Duration::from_secs(10));
        let block = CodeBlock {
            language: "sh".into(),
            code: "echo '## Note: Generated'\necho 'Hello.'".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let out = generator.run_inline(&block, dir.path(), &site()).unwrap();
        assert_eq!(out, "## Note: Generated\nHello.\n");
    }

    #[test]
    fn test_run_inline_nonzero_exit() {
        let generator = Generator::new(Duration::from_secs(10));
        let block = CodeBlock {
            language: "sh".into(),
            code: "echo oops >&2\nexit 3".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = generator.run_inline(&block, dir.path(), &site()).unwrap_err();
        match err {
            NtError::GeneratorFailed { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_kills_child() {
        let generator = Generator::new(Duration::from_millis(100));
        let block = CodeBlock {
            language: "sh".into(),
            code: "sleep 30".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = generator.run_inline(&block, dir.path(), &site()).unwrap_err();
        assert!(matches!(err, NtError::GeneratorTimeout { .. }));
    }

    #[test]
    fn test_missing_script() {
        let generator = Generator::new(Duration::from_secs(1));
        let err = generator
            .run_script(Path::new("/no/such/script.py"), None, Path::new("."), &site())
            .unwrap_err();
        assert!(matches!(err, NtError::GeneratorMissing { .. }));
    }
}
