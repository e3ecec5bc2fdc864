//! Case folding for IRC names.
//!
//! IRC name comparison is case-insensitive, but which characters fold is
//! negotiated: the server's `CASEMAPPING` ISUPPORT token selects one of
//! three historical mappings. Under `rfc1459`, the characters `[]\~` are
//! the uppercase forms of `{}|^` (a leftover from the Scandinavian origin
//! of the protocol). `strict-rfc1459` leaves `~`/`^` alone, and `ascii`
//! folds only `A-Z`.
//!
//! The mapping is carried explicitly by callers (it lives in
//! [`ServerOptions`](crate::isupport::ServerOptions)) rather than being
//! ambient process state, so comparisons before and after negotiation use
//! the mapping that was actually in force.

/// A negotiated case-folding function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaseMapping {
    /// Fold `A-Z` only.
    Ascii,
    /// Fold `A-Z` and `[]\~` → `{}|^`. The protocol default.
    #[default]
    Rfc1459,
    /// Fold `A-Z` and `[]\` → `{}|`, leaving `~` alone.
    StrictRfc1459,
}

impl CaseMapping {
    /// Select a mapping from a `CASEMAPPING` ISUPPORT value.
    ///
    /// Unknown values fall back to `rfc1459`, the protocol default.
    pub fn from_isupport(value: &str) -> Self {
        match value {
            v if v.eq_ignore_ascii_case("ascii") => CaseMapping::Ascii,
            v if v.eq_ignore_ascii_case("strict-rfc1459") => CaseMapping::StrictRfc1459,
            _ => CaseMapping::Rfc1459,
        }
    }

    fn fold_char(self, c: char) -> char {
        match (self, c) {
            (CaseMapping::Rfc1459, '[') | (CaseMapping::StrictRfc1459, '[') => '{',
            (CaseMapping::Rfc1459, ']') | (CaseMapping::StrictRfc1459, ']') => '}',
            (CaseMapping::Rfc1459, '\\') | (CaseMapping::StrictRfc1459, '\\') => '|',
            (CaseMapping::Rfc1459, '~') => '^',
            (_, 'A'..='Z') => c.to_ascii_lowercase(),
            _ => c,
        }
    }

    /// Fold a string to its canonical lowercase form under this mapping.
    pub fn fold(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Compare two strings for equality under this mapping without allocating.
    pub fn eq(self, a: &str, b: &str) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| self.fold_char(ca) == self.fold_char(cb))
    }
}
