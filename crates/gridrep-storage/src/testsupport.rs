//! Shared fixtures for the crate's unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::command::{CommandOutput, CommandRunner};
use crate::error::Result;

/// Scripted runner: pops pre-canned outputs in order and records every
/// invocation for assertion.
pub(crate) struct ScriptedRunner {
    outputs: Mutex<Vec<Result<CommandOutput>>>,
    pub(crate) calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub(crate) fn new(outputs: Vec<Result<CommandOutput>>) -> Self {
        ScriptedRunner {
            outputs: Mutex::new(outputs),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(stdout: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub(crate) fn fail(stderr: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            status: 2,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.is_empty() {
            panic!("scripted runner exhausted for {}", program);
        }
        outputs.remove(0)
    }
}
