//! Client-To-Client Protocol framing.
//!
//! A PRIVMSG or NOTICE whose trailing segment is delimited by `\x01`
//! octets carries a CTCP payload: a command word and an optional argument.
//! Requests ride PRIVMSG and replies ride NOTICE; `ACTION` is the one
//! command that is an emote rather than a query.

use chrono::{DateTime, Local, TimeZone, Utc};

/// The CTCP delimiter octet.
pub const CTCP_DELIM: char = '\u{1}';

/// A recognized CTCP command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CtcpCommand {
    /// `ACTION` — an emote; not a query.
    Action,
    /// `PING` — latency probe carrying an opaque timestamp argument.
    Ping,
    /// `VERSION` — client software identification.
    Version,
    /// `CLIENTINFO` — list of supported CTCP commands.
    ClientInfo,
    /// `SOURCE` — where to obtain the client.
    Source,
    /// `TIME` — local time at the peer.
    Time,
    /// `ERRMSG` — error report for an unsupported query.
    ErrMsg,
    /// `DCC` — Direct Client Connection negotiation.
    Dcc,
    /// Anything else.
    Unknown(String),
}

impl CtcpCommand {
    fn from_word(word: &str) -> CtcpCommand {
        match word.to_ascii_uppercase().as_str() {
            "ACTION" => CtcpCommand::Action,
            "PING" => CtcpCommand::Ping,
            "VERSION" => CtcpCommand::Version,
            "CLIENTINFO" => CtcpCommand::ClientInfo,
            "SOURCE" => CtcpCommand::Source,
            "TIME" => CtcpCommand::Time,
            "ERRMSG" => CtcpCommand::ErrMsg,
            "DCC" => CtcpCommand::Dcc,
            _ => CtcpCommand::Unknown(word.to_ascii_uppercase()),
        }
    }

    /// The wire spelling of the command.
    pub fn as_str(&self) -> &str {
        match self {
            CtcpCommand::Action => "ACTION",
            CtcpCommand::Ping => "PING",
            CtcpCommand::Version => "VERSION",
            CtcpCommand::ClientInfo => "CLIENTINFO",
            CtcpCommand::Source => "SOURCE",
            CtcpCommand::Time => "TIME",
            CtcpCommand::ErrMsg => "ERRMSG",
            CtcpCommand::Dcc => "DCC",
            CtcpCommand::Unknown(word) => word,
        }
    }
}

/// A decoded CTCP payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp {
    /// The command word.
    pub command: CtcpCommand,
    /// Everything after the command word, if anything.
    pub argument: Option<String>,
}

impl Ctcp {
    /// Decode a trailing segment as CTCP, if it is one.
    ///
    /// The segment must begin with `\x01`; a missing closing delimiter is
    /// tolerated (some historic clients omit it).
    pub fn decode(trailing: &str) -> Option<Ctcp> {
        let inner = trailing.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
        if inner.is_empty() {
            return None;
        }

        let (word, argument) = match inner.split_once(' ') {
            Some((w, rest)) => (w, Some(rest.to_string())),
            None => (inner, None),
        };

        Some(Ctcp {
            command: CtcpCommand::from_word(word),
            argument,
        })
    }

    /// Encode as a trailing segment: `\x01COMMAND [arg]\x01`.
    pub fn encode(command: &CtcpCommand, argument: Option<&str>) -> String {
        match argument {
            Some(arg) => format!("{}{} {}{}", CTCP_DELIM, command.as_str(), arg, CTCP_DELIM),
            None => format!("{}{}{}", CTCP_DELIM, command.as_str(), CTCP_DELIM),
        }
    }

    /// A `PING` request argument: the current UTC time in Unix seconds.
    pub fn ping_token(now: DateTime<Utc>) -> String {
        now.timestamp().to_string()
    }

    /// Round-trip latency in whole seconds for a `PING` reply whose
    /// argument is the Unix timestamp we sent.
    ///
    /// Returns `None` for unparseable arguments; a negative difference
    /// (clock skew) clamps to zero.
    pub fn ping_latency(argument: &str, now: DateTime<Utc>) -> Option<i64> {
        let sent = argument.trim().parse::<i64>().ok()?;
        let sent = Utc.timestamp_opt(sent, 0).single()?;
        Some((now - sent).num_seconds().max(0))
    }

    /// The `TIME` reply payload: local time in a human-readable form.
    pub fn time_reply(now: DateTime<Local>) -> String {
        now.format("%a %b %d %H:%M:%S %Y").to_string()
    }
}
