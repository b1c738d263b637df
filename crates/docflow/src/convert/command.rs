//! Converter backed by an external program.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{Converter, DiagnosticSink, LineSplitter};
use crate::config::ConverterConfig;
use crate::error::ConversionError;

const INPUT_PLACEHOLDER: &str = "{input}";
const STDERR_TAIL_LINES: usize = 10;

/// Runs a program per document. Stdout is the rendered text; stderr is
/// streamed line by line into the job's diagnostic sink.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_directory: None,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_directory: config.working_directory.as_ref().map(PathBuf::from),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    fn command_for(&self, input: &Path) -> Command {
        let input = input.to_string_lossy();
        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.args
                .iter()
                .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input)),
        )
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn convert(
        &self,
        input: &Path,
        sink: &dyn DiagnosticSink,
    ) -> Result<String, ConversionError> {
        let mut child = self
            .command_for(input)
            .spawn()
            .map_err(|e| ConversionError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConversionError::Failed("converter stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::Failed("converter stderr unavailable".to_string()))?;

        // Both pipes are drained together; a full stderr pipe would otherwise
        // stall the child while stdout is being read.
        let read_stdout = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        };
        let pump_stderr = async {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut on_line = |line: &str| {
                sink.write_line(line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.trim().to_string());
            };

            let mut splitter = LineSplitter::default();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stderr.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                splitter.push(&chunk[..n], &mut on_line);
            }
            splitter.finish(&mut on_line);
            Ok::<_, std::io::Error>(tail)
        };

        let (stdout_bytes, stderr_tail) = tokio::join!(read_stdout, pump_stderr);
        let status = child.wait().await?;
        let stdout_bytes = stdout_bytes?;
        let stderr_tail = stderr_tail?;

        if !status.success() {
            let stderr: Vec<String> = stderr_tail.into_iter().collect();
            return Err(ConversionError::ExitStatus {
                status: status.to_string(),
                stderr: stderr.join("\n"),
            });
        }

        Ok(String::from_utf8_lossy(&stdout_bytes).into_owned())
    }
}
