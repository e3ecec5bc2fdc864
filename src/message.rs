//! IRC message parsing and rendering.
//!
//! Wire format per RFC 2812 section 2.3:
//!
//! ```text
//! [':' prefix SP] command (SP param){0,14} [SP ':' trailing]
//! ```
//!
//! Tokenization is whitespace-split with empty-token coalescing. The
//! trailing segment opens on a token whose *first* character is `:`, not
//! on the first `:` anywhere in the line — parameters may legally contain
//! interior colons (IPv6 addresses, server masks). Once fourteen middle
//! parameters have been collected, the remainder of the line is the
//! trailing regardless of a colon.
//!
//! Parsing is side-effect free; a malformed line yields
//! [`MessageParseError`] and the caller decides what to do with it.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// Hard limit on a wire line, including the CRLF terminator.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum number of middle parameters per message.
pub const MAX_PARAMS: usize = 14;

/// A structured IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Origin of the message, when present.
    pub prefix: Option<Prefix>,
    /// Command verb or three-digit numeric, as received.
    pub command: String,
    /// Middle parameters (at most [`MAX_PARAMS`]).
    pub params: Vec<String>,
    /// Trailing free-form segment, when present.
    pub trailing: Option<String>,
}

/// Parse message prefix (the part after `:` and before the first space).
fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Parse the command token (anything up to the next space).
fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ' ')(input)
}

impl Message {
    /// Build a message from parts. Intended for outbound construction.
    pub fn new(
        command: impl Into<String>,
        params: Vec<String>,
        trailing: Option<String>,
    ) -> Message {
        Message {
            prefix: None,
            command: command.into(),
            params,
            trailing,
        }
    }

    /// Shorthand for a command with middle parameters only.
    pub fn cmd<S: Into<String>>(command: &str, params: impl IntoIterator<Item = S>) -> Message {
        Message::new(
            command,
            params.into_iter().map(Into::into).collect(),
            None,
        )
    }

    /// Shorthand for a command whose last argument is a trailing segment.
    pub fn with_trailing<S: Into<String>>(
        command: &str,
        params: impl IntoIterator<Item = S>,
        trailing: impl Into<String>,
    ) -> Message {
        Message::new(
            command,
            params.into_iter().map(Into::into).collect(),
            Some(trailing.into()),
        )
    }

    /// Parse a single line (CRLF already stripped or present; both accepted).
    pub fn parse(line: &str) -> Result<Message, MessageParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let input = line.trim_start_matches(' ');

        let (input, prefix) =
            opt(parse_prefix)(input).map_err(|_: nom::Err<nom::error::Error<&str>>| {
                MessageParseError::InvalidPrefix(line.to_string())
            })?;
        let input = input.trim_start_matches(' ');

        let (input, command) =
            parse_command(input).map_err(|_: nom::Err<nom::error::Error<&str>>| {
                MessageParseError::MissingCommand
            })?;

        let (params, trailing) = split_params(input);

        Ok(Message {
            prefix: prefix.map(Prefix::parse),
            command: command.to_string(),
            params,
            trailing,
        })
    }

    /// The command parsed as a three-digit numeric, if it is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Middle parameter by index.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// The nickname of the message source, if the prefix is a user.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// Render as a wire line with CRLF terminator.
    pub fn to_line(&self) -> String {
        let mut s = self.to_string();
        s.push_str("\r\n");
        s
    }
}

/// Split the remainder after the command into middle params and trailing.
fn split_params(input: &str) -> (Vec<String>, Option<String>) {
    let mut params = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            return (params, None);
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            return (params, Some(stripped.to_string()));
        }

        if params.len() == MAX_PARAMS {
            // Param cap reached: everything left is the trailing.
            let joined = rest.split(' ').filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ");
            return (params, Some(joined));
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(rest[..end].to_string());
        rest = &rest[end..];
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{}", trailing)?;
        }
        Ok(())
    }
}

/// Strip the characters that may never appear inside a message payload.
///
/// Idempotent: stripping twice equals stripping once.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

/// Split `text` into chunks such that `overhead + chunk` stays within the
/// 510-octet pre-terminator budget. Splits on char boundaries; never
/// produces an empty chunk.
pub fn split_text(overhead: usize, text: &str) -> Vec<&str> {
    let budget = (MAX_LINE_LEN - 2).saturating_sub(overhead).max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > budget {
        let mut cut = budget;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than the whole budget: emit it alone
            // rather than looping without progress.
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}
