//! Validated IRC name types.
//!
//! Raw text is converted into [`Nickname`], [`ChannelName`], [`Username`],
//! and [`Password`] at the API boundary; everything past that boundary can
//! assume well-formed names. Length caps are negotiated (NICKLEN,
//! CHANNELLEN) so constructors take the cap explicitly instead of reading
//! ambient state.

use crate::error::ClientError;

/// Characters that may open a nickname per RFC 2812's grammar.
fn is_nick_first_char(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '}' | '|')
}

/// Characters allowed in the body of a nickname.
fn is_nick_char(c: char) -> bool {
    is_nick_first_char(c) || c.is_ascii_digit() || c == '-'
}

/// Valid channel sigil characters.
pub const CHANNEL_SIGILS: &[char] = &['#', '&', '+', '!'];

/// Characters that are invalid anywhere in a channel name per RFC 2812.
const INVALID_CHAN_CHARS: &[char] = &[' ', ',', '\x07', '\x00', '\r', '\n'];

/// A validated nickname.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Nickname(String);

impl Nickname {
    /// Validate `s` as a nickname under the negotiated `max_len` cap.
    pub fn parse(s: &str, max_len: usize) -> Result<Nickname, ClientError> {
        if s.is_empty() {
            return Err(ClientError::EmptyArgument("nickname"));
        }
        if s.len() > max_len {
            return Err(ClientError::NameTooLong {
                what: "nickname",
                max: max_len,
                actual: s.len(),
            });
        }
        let mut chars = s.chars();
        let first = chars.next().unwrap();
        if !is_nick_first_char(first) {
            return Err(ClientError::Validation {
                what: "nickname",
                reason: format!("invalid first character {:?}", first),
            });
        }
        if let Some(bad) = chars.find(|&c| !is_nick_char(c)) {
            return Err(ClientError::Validation {
                what: "nickname",
                reason: format!("invalid character {:?}", bad),
            });
        }
        Ok(Nickname(s.to_string()))
    }

    /// The nickname text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated channel name, always carrying its sigil.
///
/// A name supplied without a sigil has `#` prepended *before* validation,
/// so a rejection always reports the name as it would have gone on the
/// wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelName(String);

impl ChannelName {
    /// Validate `s` as a channel name under the negotiated `max_len` cap.
    pub fn parse(s: &str, max_len: usize) -> Result<ChannelName, ClientError> {
        if s.is_empty() {
            return Err(ClientError::EmptyArgument("channel name"));
        }

        let name = if s.starts_with(CHANNEL_SIGILS) {
            s.to_string()
        } else {
            format!("#{}", s)
        };

        let body = &name[1..];
        if body.is_empty() {
            return Err(ClientError::Validation {
                what: "channel name",
                reason: format!("{:?} has no name after the sigil", name),
            });
        }
        if body.len() > max_len {
            return Err(ClientError::NameTooLong {
                what: "channel name",
                max: max_len,
                actual: body.len(),
            });
        }
        if let Some(bad) = name.chars().skip(1).find(|c| INVALID_CHAN_CHARS.contains(c)) {
            return Err(ClientError::Validation {
                what: "channel name",
                reason: format!("invalid character {:?} in {:?}", bad, name),
            });
        }

        Ok(ChannelName(name))
    }

    /// The full channel name including the sigil.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sigil character.
    pub fn sigil(&self) -> char {
        self.0.chars().next().unwrap()
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated username (ident).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Username(String);

impl Username {
    /// Validate `s` as a username: nonempty, no space, NUL, CR, or LF.
    pub fn parse(s: &str) -> Result<Username, ClientError> {
        validate_opaque(s, "username")?;
        Ok(Username(s.to_string()))
    }

    /// The username text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated server password.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Password(String);

impl Password {
    /// Validate `s` as a password: nonempty, no space, NUL, CR, or LF.
    pub fn parse(s: &str) -> Result<Password, ClientError> {
        validate_opaque(s, "password")?;
        Ok(Password(s.to_string()))
    }

    /// The password text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Passwords stay out of Debug output.
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

fn validate_opaque(s: &str, what: &'static str) -> Result<(), ClientError> {
    if s.is_empty() {
        return Err(ClientError::EmptyArgument(what));
    }
    if let Some(bad) = s.chars().find(|c| matches!(c, ' ' | '\0' | '\r' | '\n')) {
        return Err(ClientError::Validation {
            what,
            reason: format!("invalid character {:?}", bad),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_accepts_rfc_specials() {
        for n in ["alice", "[away]", "`quote", "_sub", "{brace}", "a-b-c", "x|y"] {
            assert!(Nickname::parse(n, 28).is_ok(), "{} should parse", n);
        }
    }

    #[test]
    fn test_nickname_rejects_leading_digit_and_dash() {
        assert!(Nickname::parse("9lives", 28).is_err());
        assert!(Nickname::parse("-dash", 28).is_err());
        assert!(Nickname::parse("has space", 28).is_err());
    }

    #[test]
    fn test_nickname_length_cap() {
        let long = "a".repeat(29);
        assert!(matches!(
            Nickname::parse(&long, 28),
            Err(ClientError::NameTooLong { max: 28, .. })
        ));
        assert!(Nickname::parse(&long, 32).is_ok());
    }

    #[test]
    fn test_channel_prepends_hash() {
        let c = ChannelName::parse("rust", 50).unwrap();
        assert_eq!(c.as_str(), "#rust");
        assert_eq!(c.sigil(), '#');
    }

    #[test]
    fn test_channel_keeps_existing_sigils() {
        for (input, sigil) in [("#a", '#'), ("&local", '&'), ("+modeless", '+'), ("!safe", '!')] {
            let c = ChannelName::parse(input, 50).unwrap();
            assert_eq!(c.sigil(), sigil);
            assert_eq!(c.as_str(), input);
        }
    }

    #[test]
    fn test_channel_rejects_bell_space_comma() {
        assert!(ChannelName::parse("#has space", 50).is_err());
        assert!(ChannelName::parse("#a,b", 50).is_err());
        assert!(ChannelName::parse("#bell\x07", 50).is_err());
    }

    #[test]
    fn test_channel_error_reports_prefixed_form() {
        // The name is mutated before validation; the error text shows the
        // form that was actually checked.
        let err = ChannelName::parse("bad name", 50).unwrap_err();
        assert!(err.to_string().contains("#bad name"), "{}", err);
    }

    #[test]
    fn test_channel_length_counts_body_only() {
        let body = "x".repeat(50);
        assert!(ChannelName::parse(&format!("#{}", body), 50).is_ok());
        assert!(ChannelName::parse(&format!("#{}y", body), 50).is_err());
    }

    #[test]
    fn test_username_password_reject_separators() {
        assert!(Username::parse("ident").is_ok());
        assert!(Username::parse("bad ident").is_err());
        assert!(Password::parse("s3cret").is_ok());
        assert!(Password::parse("bad\npass").is_err());
        assert!(Password::parse("").is_err());
    }

    #[test]
    fn test_password_debug_redacted() {
        let p = Password::parse("hunter2").unwrap();
        assert_eq!(format!("{:?}", p), "Password(***)");
    }
}
