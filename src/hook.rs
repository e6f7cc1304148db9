//! The external encode hook.
//!
//! The transform applied to protected classes is opaque to this crate: it
//! is whatever an [`EncodeHook`] returns. Closures implement the trait, and
//! [`CommandHook`] pipes class bytes through an external program.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use log::trace;

/// Encodes the bytes of one protected class.
///
/// Implementations need not be deterministic. A failure aborts the run; the
/// hook is never retried.
///
/// # Example
///
/// ```
/// use jarcloak::EncodeHook;
///
/// let xor = |data: &[u8]| -> std::io::Result<Vec<u8>> {
///     Ok(data.iter().map(|b| b ^ 0x5a).collect())
/// };
/// assert_eq!(xor.encode(b"\x5a").unwrap(), [0]);
/// ```
pub trait EncodeHook {
    /// Returns the encoded form of `data`.
    fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

impl<F> EncodeHook for F
where
    F: Fn(&[u8]) -> io::Result<Vec<u8>>,
{
    fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        self(data)
    }
}

/// Runs an external program per class: class bytes on stdin, encoded bytes
/// on stdout.
///
/// A non-zero exit status is an error; the program's stderr is included in
/// the message.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandHook {
    /// Creates a hook running `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl EncodeHook for CommandHook {
    fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        trace!("running {:?} on {} bytes", self.program, data.len());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin not captured"))?;
        let input = data.to_vec();
        // The child may fill stdout before it has read all of stdin.
        let writer = thread::spawn(move || -> io::Result<()> {
            stdin.write_all(&input)?;
            drop(stdin);
            Ok(())
        });

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| io::Error::other("stdin writer panicked"))?;

        if !output.status.success() {
            let status = output.status;
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(io::Error::other(if stderr.is_empty() {
                format!("{:?} exited with {status}", self.program)
            } else {
                format!("{:?} exited with {status}: {stderr}", self.program)
            }));
        }
        written?;
        Ok(output.stdout)
    }
}

/// Formats bytes as uppercase hexadecimal.
pub fn to_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_hook() {
        let reverse = |data: &[u8]| -> io::Result<Vec<u8>> { Ok(data.iter().rev().copied().collect()) };
        let hook: &dyn EncodeHook = &reverse;
        assert_eq!(hook.encode(b"abc").unwrap(), b"cba");
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0xab, 0x7f]), "00AB7F");
        assert_eq!(to_hex(&[]), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_hook_pipes_bytes() {
        let hook = CommandHook::new("tr").args(["a-z", "A-Z"]);
        assert_eq!(hook.encode(b"hello").unwrap(), b"HELLO");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_hook_failure() {
        let hook = CommandHook::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = hook.encode(b"x").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_missing_program() {
        let hook = CommandHook::new("jarcloak-no-such-encoder");
        assert!(hook.encode(b"x").is_err());
    }
}
