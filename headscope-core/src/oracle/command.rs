//! Oracle backed by an external program.
//!
//! The program receives `{"text": "..."}` on stdin and must print
//! `{"tokens": [...], "attention": [[[[...]]]]}` on stdout, the attention
//! laid out `[layer][head][query][key]`. `scripts/gpt2_attention.py` is the
//! reference implementation for GPT-2 small.

use super::{AttentionOracle, AttentionOutput, AttentionTensor, Availability};
use crate::error::{ProfilerError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Serialize)]
struct OracleRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct OracleResponse {
    tokens: Vec<String>,
    attention: Vec<Vec<Vec<Vec<f32>>>>,
}

/// Runs a subprocess per sentence and parses its JSON reply.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    name: String,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = format!("command:{program}");
        Self {
            program,
            args,
            name,
        }
    }

    /// Locate the program: an explicit path must exist, a bare name is
    /// searched for on `PATH`.
    fn resolve_program(&self) -> Option<PathBuf> {
        let candidate = Path::new(&self.program);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .flat_map(|dir| {
                let plain = dir.join(&self.program);
                let exe = dir.join(format!("{}.exe", self.program));
                [plain, exe]
            })
            .find(|p| p.is_file())
    }
}

impl AttentionOracle for CommandOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn availability(&self) -> Availability {
        match self.resolve_program() {
            Some(_) => Availability::Available,
            None => Availability::Unavailable {
                reason: format!("program '{}' not found", self.program),
            },
        }
    }

    fn attend(&self, text: &str) -> Result<AttentionOutput> {
        let request = serde_json::to_vec(&OracleRequest { text })?;
        debug!(program = %self.program, chars = text.len(), "Invoking attention oracle");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProfilerError::oracle(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(&request)
        {
            drop(stdin);
            // Reap the child so a failed write leaves no zombie behind.
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProfilerError::oracle(format!(
                "failed to write request to {}: {e}",
                self.program
            )));
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProfilerError::oracle(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let response: OracleResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProfilerError::oracle(format!("malformed oracle output: {e}")))?;
        let attention = AttentionTensor::from_nested(response.attention)?;
        if attention.seq_len() != response.tokens.len() {
            debug!(
                tokens = response.tokens.len(),
                seq_len = attention.seq_len(),
                "Oracle token count differs from attention width"
            );
        }
        Ok(AttentionOutput {
            tokens: response.tokens,
            attention,
        })
    }
}
