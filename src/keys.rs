//! Key generation
//!
//! Keys are issued by the WireGuard `wg` tool. The call blocks until the
//! tool exits; there is no timeout.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};
use crate::site::Keys;

/// Source of private/public/preshared key triples
pub trait KeyProvider {
    fn generate(&self) -> Result<Keys>;
}

/// Key provider backed by the `wg` executable
#[derive(Debug, Clone)]
pub struct WgKeyProvider {
    executable: String,
}

impl WgKeyProvider {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Fail early when the tool is not installed
    pub fn check_available(&self) -> Result<()> {
        self.run(&["genpsk"], None).map(|_| ())
    }

    fn run(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::KeyToolNotFound(self.executable.clone()),
                _ => Error::KeyTool(format!("{} {}: {}", self.executable, args.join(" "), e)),
            })?;

        if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(data.as_bytes())?;
            // stdin is dropped here, closing the pipe
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(Error::KeyTool(format!(
                "{} {} failed: {}",
                self.executable,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            return Err(Error::KeyTool(format!(
                "{} {} produced empty output",
                self.executable,
                args.join(" ")
            )));
        }
        Ok(value)
    }
}

impl Default for WgKeyProvider {
    fn default() -> Self {
        Self::new("wg")
    }
}

impl KeyProvider for WgKeyProvider {
    fn generate(&self) -> Result<Keys> {
        let privkey = self.run(&["genkey"], None)?;
        let pubkey = self.run(&["pubkey"], Some(&privkey))?;
        let psk = self.run(&["genpsk"], None)?;
        debug!("Generated key triple, public key {}", pubkey);
        Ok(Keys { privkey, pubkey, psk })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_not_found() {
        let provider = WgKeyProvider::new("/nonexistent/wolfgrid-wg-tool");
        match provider.generate() {
            Err(Error::KeyToolNotFound(tool)) => {
                assert_eq!(tool, "/nonexistent/wolfgrid-wg-tool")
            }
            other => panic!("expected KeyToolNotFound, got {:?}", other),
        }
        assert!(provider.check_available().unwrap_err().is_fatal());
    }
}
