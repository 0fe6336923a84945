//! Client for Mercurial's command server (`hg serve --cmdserver pipe`).
//!
//! The server writes framed messages to its stdout: one channel byte, a
//! big-endian `u32` length and that many bytes of data. Input requests on the
//! `I` and `L` channels carry only the length. Commands are sent as
//! `runcommand\n`, a big-endian `u32` length, and the arguments joined by NUL.

use crate::constants::HG_SHUTDOWN_TIMEOUT_SECS;
use anyhow::{Context, Result, bail};
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// a running command server; the process is shut down when this is dropped
pub struct CommandServer {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

impl CommandServer {
    /// spawn a server for the repository at `root` and complete the handshake
    pub fn spawn(program: &OsStr, root: &Path) -> Result<Self> {
        let mut child = Command::new(program)
            .args(["serve", "--cmdserver", "pipe", "--config", "ui.interactive=False"])
            .arg("--repository")
            .arg(root)
            .current_dir(root)
            .env("HGPLAIN", "1")
            .env("HGENCODING", "UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn mercurial command server ({})",
                    program.to_string_lossy()
                )
            })?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            bail!("failed to take stdout from command server");
        };

        // from here on the Drop impl releases the child on every error path
        let mut server = Self {
            child,
            stdin,
            stdout,
        };
        let hello = read_hello(&mut server.stdout)?;
        if !hello.encoding.eq_ignore_ascii_case("UTF-8") {
            bail!("command server uses unsupported encoding {}", hello.encoding);
        }
        Ok(server)
    }

    /// run one hg command and return its output; a non-zero exit is an error
    pub fn run_command(&mut self, args: &[&str]) -> Result<String> {
        let stdin = self
            .stdin
            .as_mut()
            .context("command server stdin is closed")?;
        write_command(stdin, args)?;
        let result = read_result(&mut self.stdout, stdin)?;

        if result.code != 0 {
            bail!(
                "hg {} exited with status {}: {}",
                args.join(" "),
                result.code,
                result.error.trim()
            );
        }
        Ok(result.output)
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        // closing stdin asks the server to exit
        drop(self.stdin.take());
        let timeout = Duration::from_secs(HG_SHUTDOWN_TIMEOUT_SECS);
        match self.child.wait_timeout(timeout) {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Message {
    Data { channel: u8, data: Vec<u8> },
    InputRequest,
}

fn read_message(reader: &mut impl Read) -> Result<Message> {
    let mut header = [0u8; 5];
    reader
        .read_exact(&mut header)
        .context("command server closed the pipe")?;
    let channel = header[0];
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);

    // input requests carry the maximum size wanted instead of data
    if matches!(channel, b'I' | b'L') {
        return Ok(Message::InputRequest);
    }

    let mut data = vec![0u8; length as usize];
    reader
        .read_exact(&mut data)
        .with_context(|| format!("truncated message on channel '{}'", char::from(channel)))?;
    Ok(Message::Data { channel, data })
}

/// what the server announced on startup
#[derive(Debug, Default, PartialEq, Eq)]
struct Hello {
    capabilities: Vec<String>,
    encoding: String,
}

fn read_hello(reader: &mut impl Read) -> Result<Hello> {
    let data = match read_message(reader)? {
        Message::Data {
            channel: b'o',
            data,
        } => data,
        other => bail!("unexpected command server greeting: {other:?}"),
    };

    let mut hello = Hello::default();
    for line in String::from_utf8_lossy(&data).lines() {
        match line.split_once(": ") {
            Some(("capabilities", value)) => {
                hello.capabilities = value.split_whitespace().map(str::to_string).collect();
            }
            Some(("encoding", value)) => hello.encoding = value.trim().to_string(),
            _ => {}
        }
    }

    if !hello.capabilities.iter().any(|c| c == "runcommand") {
        bail!("command server does not support runcommand");
    }
    Ok(hello)
}

fn write_command(writer: &mut impl Write, args: &[&str]) -> Result<()> {
    let payload = args.join("\0");
    let length = u32::try_from(payload.len()).context("hg command is too long")?;
    writer.write_all(b"runcommand\n")?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(payload.as_bytes())?;
    writer
        .flush()
        .context("failed to send command to command server")?;
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CommandResult {
    code: i32,
    output: String,
    error: String,
}

fn read_result(reader: &mut impl Read, writer: &mut impl Write) -> Result<CommandResult> {
    let mut output = Vec::new();
    let mut error = Vec::new();

    loop {
        match read_message(reader)? {
            Message::Data {
                channel: b'o',
                data,
            } => output.extend_from_slice(&data),
            Message::Data {
                channel: b'e',
                data,
            } => error.extend_from_slice(&data),
            Message::Data {
                channel: b'r',
                data,
            } => {
                let bytes: [u8; 4] = data
                    .as_slice()
                    .try_into()
                    .context("malformed result code from command server")?;
                return Ok(CommandResult {
                    code: i32::from_be_bytes(bytes),
                    output: String::from_utf8_lossy(&output).to_string(),
                    error: String::from_utf8_lossy(&error).to_string(),
                });
            }
            // nothing is ever typed at a prompt: answer every input request with EOF
            Message::InputRequest => {
                writer.write_all(&0u32.to_be_bytes())?;
                writer.flush()?;
            }
            Message::Data { channel, .. } if channel.is_ascii_uppercase() => {
                bail!(
                    "unsupported required channel '{}' from command server",
                    char::from(channel)
                );
            }
            // optional channels (debug output etc.)
            Message::Data { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(channel: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![channel];
        out.extend_from_slice(&u32::try_from(data.len()).unwrap().to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn result_frame(code: i32) -> Vec<u8> {
        frame(b'r', &code.to_be_bytes())
    }

    #[test]
    fn parses_hello() {
        let bytes = frame(
            b'o',
            b"capabilities: getencoding runcommand\nencoding: UTF-8\npid: 4242",
        );
        let hello = read_hello(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(hello.capabilities, vec!["getencoding", "runcommand"]);
        assert_eq!(hello.encoding, "UTF-8");
    }

    #[test]
    fn rejects_hello_without_runcommand() {
        let bytes = frame(b'o', b"capabilities: getencoding\nencoding: UTF-8");
        assert!(read_hello(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_hello_on_wrong_channel() {
        let bytes = frame(b'e', b"abort: no repository found");
        assert!(read_hello(&mut Cursor::new(bytes)).is_err());
        assert!(read_hello(&mut Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn encodes_runcommand() {
        let mut out = Vec::new();
        write_command(&mut out, &["identify", "-i", "-b"]).unwrap();

        let mut expected = b"runcommand\n".to_vec();
        expected.extend_from_slice(&14u32.to_be_bytes());
        expected.extend_from_slice(b"identify\0-i\0-b");
        assert_eq!(out, expected);
    }

    #[test]
    fn collects_output_until_result() {
        let mut bytes = frame(b'o', b"M a.txt\n");
        bytes.extend(frame(b'd', b"debug noise"));
        bytes.extend(frame(b'o', b"? b.txt\n"));
        bytes.extend(frame(b'e', b"warning\n"));
        bytes.extend(result_frame(0));

        let mut sink = Vec::new();
        let result = read_result(&mut Cursor::new(bytes), &mut sink).unwrap();
        assert_eq!(
            result,
            CommandResult {
                code: 0,
                output: String::from("M a.txt\n? b.txt\n"),
                error: String::from("warning\n"),
            }
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn answers_input_requests_with_eof() {
        let mut bytes = vec![b'L'];
        bytes.extend_from_slice(&4096u32.to_be_bytes());
        bytes.extend(result_frame(255));

        let mut sink = Vec::new();
        let result = read_result(&mut Cursor::new(bytes), &mut sink).unwrap();
        assert_eq!(result.code, 255);
        assert_eq!(sink, vec![0, 0, 0, 0]);
    }

    #[test]
    fn fails_on_unknown_required_channel() {
        let bytes = frame(b'X', b"");
        let mut sink = Vec::new();
        assert!(read_result(&mut Cursor::new(bytes), &mut sink).is_err());
    }

    #[test]
    fn fails_on_truncated_stream() {
        let mut bytes = frame(b'o', b"partial output");
        bytes.truncate(8);
        let mut sink = Vec::new();
        assert!(read_result(&mut Cursor::new(bytes), &mut sink).is_err());
    }

    #[test]
    fn fails_on_malformed_result_code() {
        let bytes = frame(b'r', &[0, 1]);
        let mut sink = Vec::new();
        assert!(read_result(&mut Cursor::new(bytes), &mut sink).is_err());
    }
}
