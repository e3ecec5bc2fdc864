//! Property-based tests for the line codec.
//!
//! Random well-formed components are rendered and reparsed to check the
//! parser bijection, and random payloads exercise the sanitizer and the
//! splitter invariants.

use proptest::prelude::*;
use slirc_core::message::{sanitize, split_text, MAX_LINE_LEN};
use slirc_core::{Message, Prefix};

// =============================================================================
// Strategies
// =============================================================================

/// Valid nickname: letter or RFC special first, then letters, digits,
/// specials, or hyphens.
fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\-\\[\\]\\\\^_`{|}]{0,8}")
        .expect("valid regex")
}

fn username_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9]{0,9}").expect("valid regex")
}

fn hostname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]+(\\.[a-z0-9]+)*").expect("valid regex")
}

/// A command verb or three-digit numeric.
fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[A-Z]{3,10}").expect("valid regex"),
        prop::string::string_regex("[0-9]{3}").expect("valid regex"),
    ]
}

/// A middle parameter: no spaces, no leading colon, no line breaks.
/// Interior colons are deliberately allowed (IPv6).
fn param_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9#&+!@._\\-]([a-zA-Z0-9#&+!:@._\\-]{0,20})?")
        .expect("valid regex")
}

/// Trailing text: anything printable without CR/LF/NUL.
fn trailing_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,200}").expect("valid regex")
}

fn prefix_strategy() -> impl Strategy<Value = Prefix> {
    prop_oneof![
        prop::string::string_regex("[a-z]+\\.[a-z]+\\.[a-z]+")
            .expect("valid regex")
            .prop_map(Prefix::Server),
        (nickname_strategy(), username_strategy(), hostname_strategy()).prop_map(
            |(nick, user, host)| Prefix::User {
                nick,
                user: Some(user),
                host: Some(host),
            }
        ),
    ]
}

fn message_strategy() -> impl Strategy<Value = Message> {
    (
        prop::option::of(prefix_strategy()),
        command_strategy(),
        prop::collection::vec(param_strategy(), 0..8),
        prop::option::of(trailing_strategy()),
    )
        .prop_map(|(prefix, command, params, trailing)| Message {
            prefix,
            command,
            params,
            trailing,
        })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Rendering then parsing reproduces the exact components.
    #[test]
    fn message_render_parse_bijection(msg in message_strategy()) {
        let line = msg.to_string();
        let reparsed = Message::parse(&line).expect("rendered line must parse");
        prop_assert_eq!(reparsed, msg);
    }

    /// Parsing never panics on arbitrary printable input.
    #[test]
    fn parse_never_panics(line in "[ -~]{0,600}") {
        let _ = Message::parse(&line);
    }

    /// Stripping illegal characters is idempotent, and a stripped payload
    /// never fails the parser on those characters.
    #[test]
    fn sanitize_idempotent(text in "[ -~\r\n\x00]{0,300}") {
        let once = sanitize(&text);
        prop_assert_eq!(sanitize(&once), once.clone());
        prop_assert!(!once.contains(['\r', '\n', '\0']));
    }

    /// Splitting respects the octet budget, loses nothing, and never
    /// produces an empty final chunk.
    #[test]
    fn split_text_invariants(overhead in 0usize..100, text in "[ -~]{1,2000}") {
        let chunks = split_text(overhead, &text);
        prop_assert!(!chunks.is_empty());
        let budget = (MAX_LINE_LEN - 2).saturating_sub(overhead).max(1);
        for chunk in &chunks {
            prop_assert!(chunk.len() <= budget);
            prop_assert!(!chunk.is_empty());
        }
        prop_assert_eq!(chunks.concat(), text);
    }

    /// A parsed message obeys the structural invariants regardless of
    /// input shape.
    #[test]
    fn parsed_params_capped(line in "[ -~]{1,600}") {
        if let Ok(msg) = Message::parse(&line) {
            prop_assert!(msg.params.len() <= slirc_core::message::MAX_PARAMS);
            for param in &msg.params {
                prop_assert!(!param.is_empty());
                prop_assert!(!param.contains(' '));
                prop_assert!(!param.starts_with(':'));
            }
        }
    }
}
