//! WHOIS and WHOWAS result accumulation.
//!
//! A WHOIS answer is spread over many numerics (311, 312, 313, 317, 319,
//! 330, 335, 338, 378, 671) and terminated by 318. The builder soaks up
//! fields as they arrive and the dispatcher emits the finished
//! [`WhoisInfo`] on the end marker. WHOWAS works the same way with 314
//! and 369.

use chrono::{DateTime, TimeZone, Utc};

/// A complete WHOIS result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhoisInfo {
    /// The queried nick.
    pub nick: String,
    /// Ident, from 311.
    pub user: Option<String>,
    /// Host, from 311.
    pub host: Option<String>,
    /// Real name, from 311.
    pub realname: Option<String>,
    /// Server the user is on, from 312.
    pub server: Option<String>,
    /// Server description, from 312.
    pub server_info: Option<String>,
    /// IRC operator flag, from 313.
    pub is_operator: bool,
    /// Idle seconds, from 317.
    pub idle_secs: Option<u64>,
    /// Sign-on time, from 317.
    pub signon_at: Option<DateTime<Utc>>,
    /// Channel memberships (possibly sigil-decorated), from 319.
    pub channels: Vec<String>,
    /// Services account, from 330.
    pub account: Option<String>,
    /// Bot flag, from 335.
    pub is_bot: bool,
    /// Actual host/IP, from 338.
    pub actual_host: Option<String>,
    /// Connecting-from text, from 378.
    pub connecting_from: Option<String>,
    /// TLS connection flag, from 671.
    pub is_secure: bool,
}

impl WhoisInfo {
    /// Start an accumulator for `nick`.
    pub fn new(nick: &str) -> WhoisInfo {
        WhoisInfo {
            nick: nick.to_string(),
            ..WhoisInfo::default()
        }
    }

    /// Apply 311: `<nick> <user> <host> * :<realname>`.
    pub fn apply_user(&mut self, user: &str, host: &str, realname: Option<&str>) {
        self.user = Some(user.to_string());
        self.host = Some(host.to_string());
        self.realname = realname.map(str::to_string);
    }

    /// Apply 312: `<nick> <server> :<server info>`.
    pub fn apply_server(&mut self, server: &str, info: Option<&str>) {
        self.server = Some(server.to_string());
        self.server_info = info.map(str::to_string);
    }

    /// Apply 317: `<nick> <idle> [<signon>] :seconds idle...`.
    pub fn apply_idle(&mut self, idle: &str, signon: Option<&str>) {
        self.idle_secs = idle.parse().ok();
        self.signon_at = signon
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|t| Utc.timestamp_opt(t, 0).single());
    }

    /// Apply 319: trailing is a space-separated channel list.
    pub fn apply_channels(&mut self, list: &str) {
        self.channels
            .extend(list.split_whitespace().map(str::to_string));
    }
}

/// A complete WHOWAS result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhowasInfo {
    /// The queried nick.
    pub nick: String,
    /// Ident, from 314.
    pub user: Option<String>,
    /// Host, from 314.
    pub host: Option<String>,
    /// Real name, from 314.
    pub realname: Option<String>,
    /// Server last seen on, from 312.
    pub server: Option<String>,
}

impl WhowasInfo {
    /// Start an accumulator for `nick`.
    pub fn new(nick: &str) -> WhowasInfo {
        WhowasInfo {
            nick: nick.to_string(),
            ..WhowasInfo::default()
        }
    }
}
