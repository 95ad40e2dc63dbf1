//! Compiler backed by an external command.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use super::{CompileError, CompiledComponent, ComponentCompiler};
use crate::layout::BuildType;

/// Runs `command [args...] <component path> <ssr|client>` once per component,
/// feeding the source on stdin and reading `{"code": ..., "css": ...}` JSON
/// from stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCompiler {
    pub command: String,
    pub args: Vec<String>,
}

impl ExternalCompiler {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    fn failure(&self, path: &Path, message: impl Into<String>) -> CompileError {
        CompileError::Command {
            path: path.to_path_buf(),
            command: self.command.clone(),
            message: message.into(),
        }
    }
}

impl ComponentCompiler for ExternalCompiler {
    fn compile(
        &self,
        source: &str,
        path: &Path,
        build_type: BuildType,
    ) -> Result<CompiledComponent, CompileError> {
        let io = |source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(path)
            .arg(build_type.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.failure(path, err.to_string()))?;

        // Stdin is fed from its own thread while stdout is drained, so a
        // compiler that streams output before reading all input cannot stall.
        let stdin = child.stdin.take();
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(source.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (output, written)
        });

        let output = output.map_err(io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(path, format!("{}: {}", output.status, stderr.trim())));
        }
        match written {
            Err(err) if err.kind() != io::ErrorKind::BrokenPipe => return Err(io(err)),
            _ => {}
        }

        serde_json::from_slice(&output.stdout).map_err(|source| CompileError::Output {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn parses_json_from_stdout() {
        let compiler = ExternalCompiler::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat >/dev/null; printf '{"code":"export default 1;","css":{"code":"p{}"}}'"#
                    .to_string(),
            ],
        );
        let out = compiler
            .compile("<p/>", Path::new("/p/A.svelte"), BuildType::Ssr)
            .unwrap();
        assert_eq!(out.code, "export default 1;");
        assert_eq!(out.css.unwrap().code, "p{}");
    }

    #[test]
    fn non_zero_exit_is_a_compile_error() {
        let compiler = ExternalCompiler::new(
            "sh",
            vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()],
        );
        let err = compiler
            .compile("", Path::new("/p/A.svelte"), BuildType::Client)
            .unwrap_err();
        assert!(matches!(err, CompileError::Command { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn large_sources_stream_through_the_compiler() {
        let compiler = ExternalCompiler::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '{"code":"'; cat; printf '"}'"#.to_string(),
            ],
        );
        let source = "a".repeat(1 << 20);
        let out = compiler
            .compile(&source, Path::new("/p/Big.svelte"), BuildType::Ssr)
            .unwrap();
        assert_eq!(out.code.len(), source.len());
        assert!(out.css.is_none());
    }
}
