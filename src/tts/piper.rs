//! # External Synthesis Command Backend
//!
//! Drives a piper-style synthesis executable: text goes in on stdin, a
//! complete WAV stream comes out on stdout. The probe runs `--version` once
//! to establish that the executable exists and starts.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::tts::SpeechSynthesis;

#[derive(Debug)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    /// Probe the configured command line. An empty command means synthesis
    /// was deliberately not configured.
    pub fn probe(command_line: &str) -> Result<Self, String> {
        let mut parts = command_line.split_whitespace();
        let program = match parts.next() {
            Some(p) => p.to_string(),
            None => return Err("no synthesis command configured".to_string()),
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        let status = Command::new(&program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| format!("synthesis command '{}' not runnable: {}", program, e))?;
        if !status.success() {
            return Err(format!(
                "synthesis command '{}' failed its version check",
                program
            ));
        }

        tracing::info!("synthesis command '{}' available", program);
        Ok(Self { program, args })
    }
}

impl SpeechSynthesis for CommandBackend {
    fn synthesize(&mut self, text: &str) -> Result<Vec<u8>, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to start '{}': {}", self.program, e))?;

        // stdin is piped above, so take() always yields a handle.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| format!("failed to send text to '{}': {}", self.program, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("synthesis process error: {}", e))?;
        if !output.status.success() {
            return Err(format!(
                "synthesis command exited with {}",
                output.status
            ));
        }
        if output.stdout.is_empty() {
            return Err("synthesis command produced no audio".to_string());
        }

        Ok(output.stdout)
    }
}
