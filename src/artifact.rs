use std::fs;
use std::path::Path;
use std::process::Stdio;
use colored::Colorize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use crate::config::SandboxConfig;
use crate::debug_note;
use crate::tools::ReportError;

pub const SOURCE_FILENAME: &str = "StabilityAnalysisVisualization.java";
pub const DATASET_FILENAME: &str = "metrics_data.json";

///First ```java fence of the response, trimmed. Responses usually interleave
///prose and code; everything past the first block is commentary on it.
pub fn extract_code_block(text: &str) -> Option<String> {
    for marker in ["```java", "```Java"] {
        if let Some(start) = text.find(marker) {
            let body = &text[start + marker.len()..];
            if let Some(end) = body.find("```") {
                let code = body[..end].trim();
                if !code.is_empty() {
                    return Some(code.to_string());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub output: String,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug)]
pub struct SandboxOutcome {
    pub compile: ProcessResult,
    ///None when compilation failed and the program was never started
    pub run: Option<ProcessResult>,
}

impl SandboxOutcome {
    ///Terminal-ready account of what happened to the generated program
    pub fn describe(&self) -> String {
        if !self.compile.success() {
            return format!(
                "{}\n{}",
                "❌ Generated program failed to compile:".bright_red(),
                self.compile.output
            );
        }
        match &self.run {
            Some(run) if run.success() => {
                format!(
                    "{}\n{}",
                    "✅ Visualization program executed:".bright_green(),
                    run.output
                )
            }
            Some(run) => format!(
                "{} (exit code {})\n{}",
                "❌ Visualization program failed".bright_red(),
                run.exit_code,
                run.output
            ),
            None => String::new(),
        }
    }
}

pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> SandboxRunner {
        SandboxRunner { config }
    }

    ///Persists the extracted program next to a verbatim copy of the dataset,
    ///compiles it, and runs it with the report directory as working directory
    ///so generated files land beside the report. Both children are killed when
    ///the configured deadline expires.
    pub async fn run(
        &self,
        source_code: &str,
        dataset_json: &str,
        report_dir: &str,
    ) -> Result<SandboxOutcome, ReportError> {
        let source_path = Path::new(report_dir).join(SOURCE_FILENAME);
        fs::write(&source_path, source_code)?;
        fs::write(Path::new(report_dir).join(DATASET_FILENAME), dataset_json)?;

        let compile = self
            .bounded(
                Command::new(&self.config.compiler)
                    .arg("-cp")
                    .arg(&self.config.classpath)
                    .arg(&source_path),
                "compile",
            )
            .await?;
        if !compile.success() {
            debug_note!("compilation failed with exit code {}", compile.exit_code);
            return Ok(SandboxOutcome { compile, run: None });
        }

        let separator = if cfg!(windows) { ";" } else { ":" };
        let run_classpath = format!("{}{}{}", self.config.classpath, separator, report_dir);
        let run = self
            .bounded(
                Command::new(&self.config.runtime)
                    .arg("-cp")
                    .arg(&run_classpath)
                    .arg(&self.config.main_class)
                    .current_dir(report_dir),
                "run",
            )
            .await?;
        Ok(SandboxOutcome {
            compile,
            run: Some(run),
        })
    }

    ///Spawns with merged-capture stdout/stderr and a hard deadline; kill on
    ///drop covers the timeout path
    async fn bounded(&self, command: &mut Command, phase: &str) -> Result<ProcessResult, ReportError> {
        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let waited = tokio::time::timeout(self.config.timeout, async {
            let mut out = String::new();
            let mut err = String::new();
            //drain both pipes concurrently so a chatty child can't fill one
            //of them and stall
            let (out_read, err_read) = tokio::join!(
                async {
                    match stdout.as_mut() {
                        Some(pipe) => pipe.read_to_string(&mut out).await,
                        None => Ok(0),
                    }
                },
                async {
                    match stderr.as_mut() {
                        Some(pipe) => pipe.read_to_string(&mut err).await,
                        None => Ok(0),
                    }
                }
            );
            out_read?;
            err_read?;
            let status = child.wait().await?;
            out.push_str(&err);
            Ok::<(i32, String), std::io::Error>((status.code().unwrap_or(-1), out))
        })
        .await;

        match waited {
            Ok(Ok((exit_code, output))) => Ok(ProcessResult { exit_code, output }),
            Ok(Err(e)) => Err(ReportError::Io(e)),
            Err(_) => Err(ReportError::Timeout(format!(
                "{} step exceeded the {} s sandbox deadline",
                phase,
                self.config.timeout.as_secs()
            ))),
        }
    }
}
