//! Channel state projection.
//!
//! A [`Channel`] is the engine's authoritative view of one joined
//! channel: roster, topic, mode string, and the three management lists.
//! It consumes engine events filtered by channel name; it performs no
//! I/O of its own.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::casemap::CaseMapping;
use crate::isupport::{ModeCategory, PrefixSpec, ServerOptions};
use crate::mode::{ChannelModeString, ModeChange};

/// One member of a channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelUser {
    /// Current nick.
    pub nick: String,
    /// Ident, when known (UHNAMES or observed activity).
    pub user: Option<String>,
    /// Host, when known.
    pub host: Option<String>,
    /// `~` / mode `q`.
    pub is_owner: bool,
    /// `&` / mode `a`.
    pub is_protected: bool,
    /// `@` / mode `o`.
    pub is_operator: bool,
    /// `%` / mode `h`.
    pub is_half_op: bool,
    /// `+` / mode `v`.
    pub is_voiced: bool,
}

impl ChannelUser {
    /// A plain member with no status.
    pub fn new(nick: &str) -> ChannelUser {
        ChannelUser {
            nick: nick.to_string(),
            ..ChannelUser::default()
        }
    }

    /// Operator or better (owner / protected count as operator-grade).
    pub fn is_operator_or_better(&self) -> bool {
        self.is_owner || self.is_protected || self.is_operator
    }

    /// Half-op or better.
    pub fn is_half_op_or_better(&self) -> bool {
        self.is_half_op || self.is_operator_or_better()
    }

    /// Apply a PREFIX-granted mode (promotion when `added`, demotion
    /// otherwise). Unknown prefix modes are ignored.
    pub fn apply_prefix_mode(&mut self, mode: char, added: bool) {
        match mode {
            'q' => self.is_owner = added,
            'a' => self.is_protected = added,
            'o' => self.is_operator = added,
            'h' => self.is_half_op = added,
            'v' => self.is_voiced = added,
            _ => {}
        }
    }

    /// Decode one NAMES entry under the negotiated prefix spec.
    ///
    /// Handles plain (`nick`), prefix-decorated (`@nick`), NAMESX
    /// multi-prefix (`@+nick`) and UHNAMES (`nick!user@host`) forms in
    /// any combination.
    pub fn from_names_entry(entry: &str, prefix: &PrefixSpec) -> Option<ChannelUser> {
        let mut rest = entry;
        let mut sigils = Vec::new();
        while let Some(c) = rest.chars().next() {
            if prefix.is_sigil(c) {
                sigils.push(c);
                rest = &rest[c.len_utf8()..];
            } else {
                break;
            }
        }
        if rest.is_empty() {
            return None;
        }

        // UHNAMES decorates the entry as nick!user@host.
        let (nick, user, host) = match rest.split_once('!') {
            Some((n, uh)) => match uh.split_once('@') {
                Some((u, h)) => (n, Some(u.to_string()), Some(h.to_string())),
                None => (n, Some(uh.to_string()), None),
            },
            None => (rest, None, None),
        };

        let mut cu = ChannelUser::new(nick);
        cu.user = user;
        cu.host = host;
        for sigil in sigils {
            if let Some(mode) = prefix.mode_for_sigil(sigil) {
                cu.apply_prefix_mode(mode, true);
            }
        }
        Some(cu)
    }
}

/// The three mask lists a channel maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskList {
    /// Mode `b`.
    Ban,
    /// Mode `e`.
    BanException,
    /// Mode `I`.
    InviteException,
}

impl MaskList {
    /// The list mutated by a mode character, if it is a list mode.
    pub fn for_mode(mode: char) -> Option<MaskList> {
        match mode {
            'b' => Some(MaskList::Ban),
            'e' => Some(MaskList::BanException),
            'I' => Some(MaskList::InviteException),
            _ => None,
        }
    }
}

/// State of one joined channel.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    /// Channel name including sigil, as joined.
    pub name: String,
    /// Current topic; `None` when unset or cleared.
    pub topic: Option<String>,
    /// Who set the topic, from 333 or a TOPIC verb.
    pub topic_author: Option<String>,
    /// When the topic was set, from 333.
    pub topic_set_at: Option<DateTime<Utc>>,
    /// Channel modes; `None` until first received. The option state is
    /// what dedupes servers that send 324 both before and after JOIN.
    pub modes: Option<ChannelModeString>,
    /// Roster keyed by case-folded nick.
    users: HashMap<String, ChannelUser>,
    /// Ban masks (`+b`).
    pub bans: Vec<String>,
    /// Ban-exception masks (`+e`).
    pub ban_exceptions: Vec<String>,
    /// Invite-exception masks (`+I`).
    pub invite_exceptions: Vec<String>,
    /// Creation time, from 329.
    pub created_at: Option<DateTime<Utc>>,
    /// Homepage URL, from 328.
    pub homepage: Option<String>,
    /// Join throttle `(limit, seconds)`, from mode `f`/`j`.
    pub throttle: Option<(u32, u32)>,
    /// Whether we are currently in the channel.
    pub is_active: bool,
}

impl Channel {
    /// A fresh active channel.
    pub fn new(name: &str) -> Channel {
        Channel {
            name: name.to_string(),
            is_active: true,
            ..Channel::default()
        }
    }

    /// Number of members currently known.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Look up a member by nick.
    pub fn user(&self, nick: &str, mapping: CaseMapping) -> Option<&ChannelUser> {
        self.users.get(&mapping.fold(nick))
    }

    /// The member entry for the client itself: whichever entry matches
    /// the client's *current* nick. The pointer follows nick changes
    /// because the lookup is by current nick, not by a stored key.
    pub fn client_user(&self, client_nick: &str, mapping: CaseMapping) -> Option<&ChannelUser> {
        self.user(client_nick, mapping)
    }

    /// Iterate the roster in unspecified order.
    pub fn users(&self) -> impl Iterator<Item = &ChannelUser> {
        self.users.values()
    }

    /// Insert a member (JOIN or NAMES).
    pub fn add_user(&mut self, user: ChannelUser, mapping: CaseMapping) {
        self.users.insert(mapping.fold(&user.nick), user);
    }

    /// Remove a member (PART, KICK, QUIT). Returns the removed entry.
    pub fn remove_user(&mut self, nick: &str, mapping: CaseMapping) -> Option<ChannelUser> {
        self.users.remove(&mapping.fold(nick))
    }

    /// Whether `nick` is on the channel.
    pub fn has_user(&self, nick: &str, mapping: CaseMapping) -> bool {
        self.users.contains_key(&mapping.fold(nick))
    }

    /// Re-key a member after a nick change. The map key follows the new
    /// nick so later lookups by it succeed.
    pub fn rename_user(&mut self, old: &str, new: &str, mapping: CaseMapping) -> bool {
        if let Some(mut user) = self.users.remove(&mapping.fold(old)) {
            user.nick = new.to_string();
            self.users.insert(mapping.fold(new), user);
            true
        } else {
            false
        }
    }

    fn list_mut(&mut self, list: MaskList) -> &mut Vec<String> {
        match list {
            MaskList::Ban => &mut self.bans,
            MaskList::BanException => &mut self.ban_exceptions,
            MaskList::InviteException => &mut self.invite_exceptions,
        }
    }

    /// Record one entry of a list reply (367/348/346).
    pub fn add_list_mask(&mut self, list: MaskList, mask: &str) {
        let masks = self.list_mut(list);
        if !masks.iter().any(|m| m == mask) {
            masks.push(mask.to_string());
        }
    }

    /// Apply one mode change under the negotiated options.
    ///
    /// PREFIX modes mutate the named member's status flags; list modes
    /// mutate the mask lists; everything else folds into the mode string.
    /// The `f`/`j` join throttle also updates its typed field.
    pub fn apply_mode(&mut self, change: &ModeChange, opts: &ServerOptions) {
        match opts.categorize(change.mode) {
            ModeCategory::UserPrefix => {
                if let Some(nick) = &change.param {
                    let key = opts.case_mapping.fold(nick);
                    if let Some(user) = self.users.get_mut(&key) {
                        user.apply_prefix_mode(change.mode, change.added);
                    }
                }
            }
            ModeCategory::List => {
                let Some(list) = MaskList::for_mode(change.mode) else {
                    return;
                };
                let Some(mask) = &change.param else {
                    // A bare list mode is a query, not a mutation.
                    return;
                };
                let masks = self.list_mut(list);
                if change.added {
                    if !masks.iter().any(|m| m == mask) {
                        masks.push(mask.clone());
                    }
                } else {
                    masks.retain(|m| m != mask);
                }
            }
            _ => {
                if matches!(change.mode, 'f' | 'j') {
                    self.throttle = if change.added {
                        change.param.as_deref().and_then(parse_throttle)
                    } else {
                        None
                    };
                }
                self.modes
                    .get_or_insert_with(ChannelModeString::new)
                    .apply(change);
            }
        }
    }

    /// Apply a 324 mode snapshot, but only when no modes are known yet.
    ///
    /// Some servers volunteer 324 on JOIN and also answer the client's
    /// own MODE query; applying only into the `None` state keeps the
    /// snapshot from landing twice.
    pub fn apply_mode_snapshot(&mut self, changes: &[ModeChange], opts: &ServerOptions) -> bool {
        if self.modes.is_some() {
            return false;
        }
        self.modes = Some(ChannelModeString::new());
        for change in changes {
            self.apply_mode(change, opts);
        }
        true
    }

    /// Wipe state while keeping the identity, as happens on a kick
    /// targeting the client or on disconnect. The name survives so
    /// auto-reconnect can rejoin.
    pub fn clear(&mut self) {
        let name = std::mem::take(&mut self.name);
        *self = Channel {
            name,
            is_active: false,
            ..Channel::default()
        };
    }
}

/// Parse a join-throttle parameter of the form `limit:duration`.
///
/// Dialects wrap the value in brackets or suffix the duration unit; the
/// digits are what matter.
fn parse_throttle(param: &str) -> Option<(u32, u32)> {
    let trimmed = param.trim_matches(|c| c == '[' || c == ']');
    let (limit, duration) = trimmed.split_once(':')?;
    let digits = |s: &str| -> Option<u32> {
        let d: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        d.parse().ok()
    };
    Some((digits(limit)?, digits(duration)?))
}
