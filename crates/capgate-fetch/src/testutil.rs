//! Scripted [`ProcessRunner`] for tests.
//!
//! Interprets the `--output` and `--sub-langs` arguments the way the real
//! tool does, so the executor's artifact handling runs unchanged.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::FetchError;
use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};

/// What the fake tool does when invoked.
#[derive(Clone, Debug)]
pub enum ScriptedBehavior {
    /// Write the caption file, print `stdout`, exit 0.
    WriteCaptions {
        /// Caption file contents.
        captions: String,
        /// Printed metadata.
        stdout: String,
    },
    /// Exit with `code` and `stderr`, writing nothing.
    Exit {
        /// Exit code.
        code: i32,
        /// Printed diagnostics.
        stderr: String,
    },
    /// Write the caption file, then exit with `code`.
    WriteThenExit {
        /// Caption file contents.
        captions: String,
        /// Exit code.
        code: i32,
    },
    /// Exit 0 without writing anything.
    NoOutput,
    /// Report a timeout, optionally leaving a partial download behind.
    TimeOut {
        /// Write `<token>.<lang>.json3.part` first.
        partial: bool,
    },
    /// Write a partial file and never finish.
    Hang,
}

/// A runner that follows a [`ScriptedBehavior`] instead of spawning.
pub struct ScriptedRunner {
    behavior: ScriptedBehavior,
    calls: AtomicUsize,
    outputs: Mutex<Vec<PathBuf>>,
    last_spec: Mutex<Option<ProcessSpec>>,
}

impl ScriptedRunner {
    /// Create a runner with a fixed behavior.
    pub fn new(behavior: ScriptedBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            outputs: Mutex::new(Vec::new()),
            last_spec: Mutex::new(None),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Caption paths each invocation was told to write.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.lock().clone()
    }

    /// The most recent invocation.
    pub fn last_spec(&self) -> Option<ProcessSpec> {
        self.last_spec.lock().clone()
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Resolve the caption path the real tool would write for `spec`.
pub fn caption_path_for(spec: &ProcessSpec) -> Option<PathBuf> {
    let template = arg_after(&spec.args, "--output")?;
    let lang = arg_after(&spec.args, "--sub-langs")?;
    Some(PathBuf::from(template.replace("%(ext)s", &format!("{lang}.json3"))))
}

fn exited(code: i32, stdout: String, stderr: String) -> ProcessOutput {
    ProcessOutput {
        stdout,
        stderr,
        exit_code: code,
        duration_ms: 1,
        timed_out: false,
    }
}

fn part_path(captions: &std::path::Path) -> PathBuf {
    let mut name = captions.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, FetchError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_spec.lock() = Some(spec.clone());
        let path = caption_path_for(spec).ok_or(FetchError::NoCaptions)?;
        self.outputs.lock().push(path.clone());

        match &self.behavior {
            ScriptedBehavior::WriteCaptions { captions, stdout } => {
                tokio::fs::write(&path, captions).await?;
                Ok(exited(0, stdout.clone(), String::new()))
            }
            ScriptedBehavior::Exit { code, stderr } => {
                Ok(exited(*code, String::new(), stderr.clone()))
            }
            ScriptedBehavior::WriteThenExit { captions, code } => {
                tokio::fs::write(&path, captions).await?;
                Ok(exited(*code, String::new(), "ERROR: interrupted".into()))
            }
            ScriptedBehavior::NoOutput => Ok(exited(0, String::new(), String::new())),
            ScriptedBehavior::TimeOut { partial } => {
                if *partial {
                    tokio::fs::write(part_path(&path), b"{\"events\": [").await?;
                }
                Ok(ProcessOutput {
                    stdout: String::new(),
                    stderr: "Process timed out".into(),
                    exit_code: -1,
                    duration_ms: u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX),
                    timed_out: true,
                })
            }
            ScriptedBehavior::Hang => {
                tokio::fs::write(part_path(&path), b"{").await?;
                std::future::pending::<()>().await;
                Ok(exited(0, String::new(), String::new()))
            }
        }
    }
}
