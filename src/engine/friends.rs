//! Friend presence over MONITOR or WATCH.
//!
//! The two server facilities differ only in wire shape: MONITOR batches
//! comma-separated targets after `+ ` / `- `, WATCH takes space-separated
//! per-item `+nick` / `-nick` tokens. One [`FriendList`] fronts both; the
//! backend is chosen from the negotiated options (MONITOR preferred) and
//! the whole list is re-registered whenever a registration makes a
//! facility available again.

use crate::casemap::CaseMapping;
use crate::isupport::PresenceBackend;
use crate::message::MAX_LINE_LEN;

/// One watched nickname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Friend {
    /// The watched nick.
    pub nick: String,
    /// Last known ident.
    pub user: Option<String>,
    /// Last known host.
    pub host: Option<String>,
    /// Current presence.
    pub is_online: bool,
}

impl Friend {
    fn new(nick: &str) -> Friend {
        Friend {
            nick: nick.to_string(),
            user: None,
            host: None,
            is_online: false,
        }
    }
}

/// The friends list. Entries survive reconnect; the wire registration is
/// replayed per session.
#[derive(Clone, Debug, Default)]
pub struct FriendList {
    friends: Vec<Friend>,
}

impl FriendList {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.friends.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    /// Iterate entries.
    pub fn iter(&self) -> impl Iterator<Item = &Friend> {
        self.friends.iter()
    }

    /// Look up an entry.
    pub fn get(&self, nick: &str, mapping: CaseMapping) -> Option<&Friend> {
        self.friends.iter().find(|f| mapping.eq(&f.nick, nick))
    }

    /// Add entries locally; returns the nicks that were actually new.
    pub fn add<'a>(&mut self, nicks: &[&'a str], mapping: CaseMapping) -> Vec<&'a str> {
        let mut added = Vec::new();
        for &nick in nicks {
            if self.get(nick, mapping).is_none() {
                self.friends.push(Friend::new(nick));
                added.push(nick);
            }
        }
        added
    }

    /// Remove entries locally; returns the nicks that were present.
    pub fn remove<'a>(&mut self, nicks: &[&'a str], mapping: CaseMapping) -> Vec<&'a str> {
        let mut removed = Vec::new();
        for &nick in nicks {
            let before = self.friends.len();
            self.friends.retain(|f| !mapping.eq(&f.nick, nick));
            if self.friends.len() != before {
                removed.push(nick);
            }
        }
        removed
    }

    /// Record a presence transition. Returns `true` only when the flag
    /// actually flipped, keeping repeated server notifications from
    /// producing duplicate events.
    pub fn set_presence(
        &mut self,
        nick: &str,
        user: Option<&str>,
        host: Option<&str>,
        online: bool,
        mapping: CaseMapping,
    ) -> bool {
        let Some(friend) = self.friends.iter_mut().find(|f| mapping.eq(&f.nick, nick)) else {
            return false;
        };
        if let Some(user) = user {
            friend.user = Some(user.to_string());
        }
        if let Some(host) = host {
            friend.host = Some(host.to_string());
        }
        if friend.is_online == online {
            return false;
        }
        friend.is_online = online;
        true
    }

    /// All nicks, for whole-list re-registration.
    pub fn nicks(&self) -> Vec<&str> {
        self.friends.iter().map(|f| f.nick.as_str()).collect()
    }
}

/// Batch an add (`+`) or remove (`-`) of `nicks` into wire lines that fit
/// the 510-octet budget for the given backend.
pub fn registration_lines(backend: PresenceBackend, add: bool, nicks: &[&str]) -> Vec<String> {
    let budget = MAX_LINE_LEN - 2;
    let sign = if add { '+' } else { '-' };
    let mut lines = Vec::new();

    match backend {
        PresenceBackend::Monitor => {
            let head = format!("MONITOR {} ", sign);
            let mut targets: Vec<&str> = Vec::new();
            let mut len = head.len();
            for &nick in nicks {
                let extra = nick.len() + usize::from(!targets.is_empty());
                if !targets.is_empty() && len + extra > budget {
                    lines.push(format!("{}{}", head, targets.join(",")));
                    targets.clear();
                    len = head.len();
                }
                len += nick.len() + usize::from(!targets.is_empty());
                targets.push(nick);
            }
            if !targets.is_empty() {
                lines.push(format!("{}{}", head, targets.join(",")));
            }
        }
        PresenceBackend::Watch => {
            let mut line = String::from("WATCH");
            for &nick in nicks {
                let token_len = nick.len() + 2;
                if line.len() > 5 && line.len() + token_len > budget {
                    lines.push(std::mem::replace(&mut line, String::from("WATCH")));
                }
                line.push(' ');
                line.push(sign);
                line.push_str(nick);
            }
            if line.len() > 5 {
                lines.push(line);
            }
        }
    }

    lines
}
