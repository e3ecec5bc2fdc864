//! Channel and client mode machinery.
//!
//! Mode parsing is not context free: whether a flag character consumes a
//! parameter depends on the negotiated `CHANMODES` categories and the
//! `PREFIX` user-mode set, so every parse takes the current
//! [`ServerOptions`](crate::isupport::ServerOptions) explicitly.

use std::fmt;

use crate::error::ModeParseError;
use crate::isupport::{ModeCategory, ServerOptions};

/// A single mode flag with its direction and optional parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeChange {
    /// The mode character.
    pub mode: char,
    /// `true` for `+`, `false` for `-`.
    pub added: bool,
    /// Parameter, when the category requires one.
    pub param: Option<String>,
}

impl ModeChange {
    /// A `+mode` change without parameter.
    pub fn plus(mode: char) -> ModeChange {
        ModeChange {
            mode,
            added: true,
            param: None,
        }
    }

    /// A `-mode` change without parameter.
    pub fn minus(mode: char) -> ModeChange {
        ModeChange {
            mode,
            added: false,
            param: None,
        }
    }

    /// Attach a parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> ModeChange {
        self.param = Some(param.into());
        self
    }
}

/// Parse the flags-and-params form of a channel `MODE` into an ordered
/// change sequence.
///
/// `signless` handles numeric 324, which omits the leading `+`; every flag
/// is then treated as added. Parameter consumption follows the negotiated
/// categories:
///
/// - PREFIX user modes and always-param modes consume one parameter;
/// - param-on-set modes consume one only when being added;
/// - list modes (`b`, `e`, `I`) consume one when present, but may appear
///   bare as a list query;
/// - everything else is parameterless.
pub fn parse_channel_modes(
    flags: &str,
    params: &[&str],
    opts: &ServerOptions,
    signless: bool,
) -> Result<Vec<ModeChange>, ModeParseError> {
    let mut changes = Vec::new();
    let mut args = params.iter().copied().peekable();
    let mut added = true;

    for c in flags.chars() {
        match c {
            '+' => added = true,
            '-' => added = false,
            _ => {
                let takes_param = match opts.categorize(c) {
                    ModeCategory::UserPrefix | ModeCategory::AlwaysParam => true,
                    ModeCategory::ParamWhenSet => added || signless,
                    ModeCategory::List => args.peek().is_some(),
                    ModeCategory::NoParam => false,
                };
                let param = if takes_param {
                    match args.next() {
                        Some(p) => Some(p.to_string()),
                        None => return Err(ModeParseError::MissingParameter { mode: c }),
                    }
                } else {
                    None
                };
                changes.push(ModeChange {
                    mode: c,
                    added,
                    param,
                });
            }
        }
    }

    if args.peek().is_some() {
        return Err(ModeParseError::UnusedParameters);
    }

    Ok(changes)
}

/// Parse a client (user) mode string: single-character flags, no params.
pub fn parse_client_modes(flags: &str) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut added = true;
    for c in flags.chars() {
        match c {
            '+' => added = true,
            '-' => added = false,
            _ => changes.push(ModeChange {
                mode: c,
                added,
                param: None,
            }),
        }
    }
    changes
}

/// An ordered sequence of channel mode changes, renderable back to the
/// `[+/-][chars][ params…]` wire form.
///
/// Also used as a channel's *current* mode set, where [`apply`]
/// replaces-or-removes by mode character.
///
/// [`apply`]: ChannelModeString::apply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelModeString {
    entries: Vec<ModeChange>,
}

impl ChannelModeString {
    /// An empty mode string.
    pub fn new() -> ChannelModeString {
        ChannelModeString::default()
    }

    /// Build from a change sequence, preserving order.
    pub fn from_changes(entries: Vec<ModeChange>) -> ChannelModeString {
        ChannelModeString { entries }
    }

    /// The changes in order.
    pub fn entries(&self) -> &[ModeChange] {
        &self.entries
    }

    /// Whether any entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is `mode` currently set?
    pub fn contains(&self, mode: char) -> bool {
        self.entries.iter().any(|m| m.mode == mode)
    }

    /// The parameter stored for `mode`, if set with one.
    pub fn param_for(&self, mode: char) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.mode == mode)
            .and_then(|m| m.param.as_deref())
    }

    /// Fold a change into the current set: an added mode replaces any
    /// prior entry for the same character, a removed mode drops it.
    pub fn apply(&mut self, change: &ModeChange) {
        self.entries.retain(|m| m.mode != change.mode);
        if change.added {
            self.entries.push(change.clone());
        }
    }

    /// Render to wire form, grouping consecutive same-sign entries.
    pub fn render(&self) -> String {
        let mut flags = String::new();
        let mut params: Vec<&str> = Vec::new();
        let mut sign: Option<bool> = None;

        for entry in &self.entries {
            if sign != Some(entry.added) {
                flags.push(if entry.added { '+' } else { '-' });
                sign = Some(entry.added);
            }
            flags.push(entry.mode);
            if let Some(p) = &entry.param {
                params.push(p);
            }
        }

        if params.is_empty() {
            flags
        } else {
            format!("{} {}", flags, params.join(" "))
        }
    }
}

impl fmt::Display for ChannelModeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// The client's own umode set: parameterless single characters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientModeString {
    modes: Vec<char>,
}

impl ClientModeString {
    /// An empty mode set.
    pub fn new() -> ClientModeString {
        ClientModeString::default()
    }

    /// Is `mode` currently set?
    pub fn contains(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }

    /// Apply a change sequence parsed by [`parse_client_modes`].
    pub fn apply_all(&mut self, changes: &[ModeChange]) {
        for change in changes {
            if change.added {
                if !self.modes.contains(&change.mode) {
                    self.modes.push(change.mode);
                }
            } else {
                self.modes.retain(|&m| m != change.mode);
            }
        }
    }

    /// Clear all modes.
    pub fn clear(&mut self) {
        self.modes.clear();
    }

    /// Render as `+abc`, or an empty string when no modes are set.
    pub fn render(&self) -> String {
        if self.modes.is_empty() {
            String::new()
        } else {
            let mut s = String::with_capacity(self.modes.len() + 1);
            s.push('+');
            s.extend(&self.modes);
            s
        }
    }
}

impl fmt::Display for ClientModeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isupport::ServerOptions;

    fn standard_opts() -> ServerOptions {
        let mut opts = ServerOptions::default();
        opts.digest(&["CHANMODES=beI,k,l,mnt", "PREFIX=(ohv)@%+"]);
        opts
    }

    #[test]
    fn test_isupport_driven_consumption() {
        // MODE #x +klo-b secret 50 alice *!*@host
        let opts = standard_opts();
        let changes = parse_channel_modes(
            "+klo-b",
            &["secret", "50", "alice", "*!*@host"],
            &opts,
            false,
        )
        .unwrap();
        assert_eq!(
            changes,
            vec![
                ModeChange::plus('k').with_param("secret"),
                ModeChange::plus('l').with_param("50"),
                ModeChange::plus('o').with_param("alice"),
                ModeChange::minus('b').with_param("*!*@host"),
            ]
        );
    }

    #[test]
    fn test_limit_removal_takes_no_param() {
        let opts = standard_opts();
        let changes = parse_channel_modes("-l", &[], &opts, false).unwrap();
        assert_eq!(changes, vec![ModeChange::minus('l')]);
    }

    #[test]
    fn test_ban_query_without_mask() {
        let opts = standard_opts();
        let changes = parse_channel_modes("+b", &[], &opts, false).unwrap();
        assert_eq!(changes, vec![ModeChange::plus('b')]);
    }

    #[test]
    fn test_missing_key_param_is_error() {
        let opts = standard_opts();
        assert_eq!(
            parse_channel_modes("+k", &[], &opts, false),
            Err(ModeParseError::MissingParameter { mode: 'k' })
        );
    }

    #[test]
    fn test_unused_params_is_error() {
        let opts = standard_opts();
        assert_eq!(
            parse_channel_modes("+n", &["stray"], &opts, false),
            Err(ModeParseError::UnusedParameters)
        );
    }

    #[test]
    fn test_signless_324_form() {
        let opts = standard_opts();
        let changes = parse_channel_modes("ntl", &["25"], &opts, true).unwrap();
        assert!(changes.iter().all(|c| c.added));
        assert_eq!(changes[2].param.as_deref(), Some("25"));
    }

    #[test]
    fn test_render_groups_signs() {
        let s = ChannelModeString::from_changes(vec![
            ModeChange::plus('n'),
            ModeChange::plus('t'),
            ModeChange::minus('s'),
            ModeChange::minus('m'),
            ModeChange::plus('k').with_param("secret"),
        ]);
        assert_eq!(s.render(), "+nt-sm+k secret");
    }

    #[test]
    fn test_mode_round_trip() {
        let opts = standard_opts();
        let original = ChannelModeString::from_changes(vec![
            ModeChange::plus('k').with_param("pass"),
            ModeChange::plus('l').with_param("10"),
            ModeChange::minus('n'),
            ModeChange::plus('t'),
        ]);
        let rendered = original.render();
        let mut parts = rendered.split(' ');
        let flags = parts.next().unwrap();
        let params: Vec<&str> = parts.collect();
        let reparsed = parse_channel_modes(flags, &params, &opts, false).unwrap();
        assert_eq!(reparsed, original.entries());
    }

    #[test]
    fn test_apply_replaces_and_removes() {
        let mut s = ChannelModeString::new();
        s.apply(&ModeChange::plus('l').with_param("10"));
        s.apply(&ModeChange::plus('l').with_param("20"));
        assert_eq!(s.param_for('l'), Some("20"));
        assert_eq!(s.entries().len(), 1);
        s.apply(&ModeChange::minus('l'));
        assert!(!s.contains('l'));
    }

    #[test]
    fn test_client_modes() {
        let mut m = ClientModeString::new();
        m.apply_all(&parse_client_modes("+iw"));
        assert!(m.contains('i') && m.contains('w'));
        m.apply_all(&parse_client_modes("-i+x"));
        assert!(!m.contains('i'));
        assert_eq!(m.render(), "+wx");
    }
}
