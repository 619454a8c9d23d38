//! CLI utilities for Spindle.
//!
//! The utilities present in this module back the interactive `spindle_client`.
use std::io::{BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),
    #[error("invalid message type '{0}'")]
    InvalidType(String),
    #[error("no command provided")]
    Empty,
    #[error("failed to read input: {0}")]
    Io(String),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`
    Exit,
    /// `<type> [payload]`: send one frame.
    Send { msg_type: u32, payload: String },
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CommandError::Empty);
        }
        if value == ".exit" {
            return Ok(Command::Exit);
        }
        if value.starts_with('.') {
            return Err(CommandError::Unrecognized(value.to_string()));
        }

        let (msg_type, payload) = value.split_once(' ').unwrap_or((value, ""));
        let msg_type = msg_type
            .parse()
            .map_err(|_| CommandError::InvalidType(msg_type.to_string()))?;
        Ok(Command::Send {
            msg_type,
            payload: payload.to_string(),
        })
    }
}

/// Prompt user for a valid command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| CommandError::Io(e.to_string()))?;
    writer.flush().map_err(|e| CommandError::Io(e.to_string()))?;

    // EOF on stdin ends the session.
    if reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Io(e.to_string()))?
        == 0
    {
        return Ok(Command::Exit);
    }

    s.as_str().try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
        assert_eq!(res, Command::Exit);
    }

    #[test]
    fn prompt_parses_send() {
        let input = b"1 hello world\n";
        let res = prompt(&input[..], Vec::new()).unwrap();

        assert_eq!(
            res,
            Command::Send {
                msg_type: 1,
                payload: "hello world".to_string()
            }
        );
    }

    #[test]
    fn prompt_send_without_payload() {
        let res = prompt(&b"42\n"[..], Vec::new()).unwrap();

        assert_eq!(
            res,
            Command::Send {
                msg_type: 42,
                payload: String::new()
            }
        );
    }

    #[test]
    fn prompt_eof_exits() {
        assert_eq!(prompt(&b""[..], Vec::new()).unwrap(), Command::Exit);
    }

    #[test]
    fn prompt_rejects_bad_input() {
        assert_eq!(
            prompt(&b".something_wrong\n"[..], Vec::new()),
            Err(CommandError::Unrecognized(".something_wrong".to_string()))
        );
        assert_eq!(
            prompt(&b"ping\n"[..], Vec::new()),
            Err(CommandError::InvalidType("ping".to_string()))
        );
        assert_eq!(prompt(&b"\n"[..], Vec::new()), Err(CommandError::Empty));
    }
}
