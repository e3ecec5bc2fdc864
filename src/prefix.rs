//! IRC message prefix (source) types.
//!
//! The prefix of an inbound message names its origin: either a server
//! (`:irc.example.net`) or a user in `nick!user@host` form. The `!user`
//! and `@host` segments are optional on the wire.

use std::fmt;

/// The source of an IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prefix {
    /// A server name.
    Server(String),
    /// A user, with optional ident and host.
    User {
        /// Nickname.
        nick: String,
        /// Ident (the part after `!`), if present.
        user: Option<String>,
        /// Host (the part after `@`), if present.
        host: Option<String>,
    },
}

impl Prefix {
    /// Parse a prefix string (without the leading `:`).
    ///
    /// A token containing `!` or `@` is a user; a token containing `.`
    /// but neither `!` nor `@` is a server name. A bare token is taken as
    /// a nickname, which is what servers send for NICK/QUIT from users on
    /// networks that omit user\@host.
    pub fn parse(s: &str) -> Prefix {
        if !s.contains('!') && !s.contains('@') && s.contains('.') {
            return Prefix::Server(s.to_string());
        }

        let (nick_user, host) = match s.split_once('@') {
            Some((nu, h)) => (nu, Some(h.to_string())),
            None => (s, None),
        };
        let (nick, user) = match nick_user.split_once('!') {
            Some((n, u)) => (n.to_string(), Some(u.to_string())),
            None => (nick_user.to_string(), None),
        };

        Prefix::User { nick, user, host }
    }

    /// The nickname of a user prefix, if this is one.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::User { nick, .. } => Some(nick),
            Prefix::Server(_) => None,
        }
    }

    /// The ident of a user prefix, if present.
    pub fn user(&self) -> Option<&str> {
        match self {
            Prefix::User { user, .. } => user.as_deref(),
            Prefix::Server(_) => None,
        }
    }

    /// The host of a user prefix, if present.
    pub fn host(&self) -> Option<&str> {
        match self {
            Prefix::User { host, .. } => host.as_deref(),
            Prefix::Server(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => {
                write!(f, "{}", nick)?;
                if let Some(user) = user {
                    write!(f, "!{}", user)?;
                }
                if let Some(host) = host {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_user() {
        let p = Prefix::parse("nick!user@host.example.com");
        assert_eq!(p.nick(), Some("nick"));
        assert_eq!(p.user(), Some("user"));
        assert_eq!(p.host(), Some("host.example.com"));
    }

    #[test]
    fn test_parse_server() {
        let p = Prefix::parse("irc.example.net");
        assert_eq!(p, Prefix::Server("irc.example.net".to_string()));
        assert_eq!(p.nick(), None);
    }

    #[test]
    fn test_parse_bare_nick() {
        let p = Prefix::parse("alice");
        assert_eq!(p.nick(), Some("alice"));
        assert_eq!(p.user(), None);
        assert_eq!(p.host(), None);
    }

    #[test]
    fn test_parse_nick_host_no_user() {
        let p = Prefix::parse("alice@host");
        assert_eq!(p.nick(), Some("alice"));
        assert_eq!(p.user(), None);
        assert_eq!(p.host(), Some("host"));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["nick!user@host", "irc.example.net", "alice", "alice@host"] {
            assert_eq!(Prefix::parse(s).to_string(), s);
        }
    }
}
