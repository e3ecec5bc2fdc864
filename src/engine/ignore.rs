//! Server-side ignore list over SILENCE.
//!
//! SILENCE keeps the ignore list on the server, so nothing from a matching
//! mask ever reaches the client. Adds and removes are `+mask` / `-mask`
//! tokens, batched under the 510-octet line budget; the list is replayed
//! when a registration advertises SILENCE again.

use crate::casemap::CaseMapping;
use crate::message::MAX_LINE_LEN;

/// One ignored hostmask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredUser {
    /// The mask, e.g. `*!*@spam.example`.
    pub mask: String,
    /// Network the entry belongs to, when known.
    pub network: Option<String>,
}

/// The ignore list.
#[derive(Clone, Debug, Default)]
pub struct IgnoreList {
    entries: Vec<IgnoredUser>,
}

impl IgnoreList {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries.
    pub fn iter(&self) -> impl Iterator<Item = &IgnoredUser> {
        self.entries.iter()
    }

    /// Add a mask; returns `false` if it was already present.
    pub fn add(&mut self, mask: &str, network: Option<&str>, mapping: CaseMapping) -> bool {
        if self.contains(mask, mapping) {
            return false;
        }
        self.entries.push(IgnoredUser {
            mask: mask.to_string(),
            network: network.map(str::to_string),
        });
        true
    }

    /// Remove a mask; returns `false` if it was absent.
    pub fn remove(&mut self, mask: &str, mapping: CaseMapping) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !mapping.eq(&e.mask, mask));
        self.entries.len() != before
    }

    /// Whether a mask is present.
    pub fn contains(&self, mask: &str, mapping: CaseMapping) -> bool {
        self.entries.iter().any(|e| mapping.eq(&e.mask, mask))
    }

    /// All masks, for whole-list re-registration.
    pub fn masks(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.mask.as_str()).collect()
    }
}

/// Batch `+mask` / `-mask` tokens into `SILENCE` lines under the
/// 510-octet budget.
pub fn silence_lines(add: bool, masks: &[&str]) -> Vec<String> {
    let budget = MAX_LINE_LEN - 2;
    let sign = if add { '+' } else { '-' };
    let mut lines = Vec::new();
    let mut line = String::from("SILENCE");

    for &mask in masks {
        let token_len = mask.len() + 2;
        if line.len() > 7 && line.len() + token_len > budget {
            lines.push(std::mem::replace(&mut line, String::from("SILENCE")));
        }
        line.push(' ');
        line.push(sign);
        line.push_str(mask);
    }
    if line.len() > 7 {
        lines.push(line);
    }

    lines
}
