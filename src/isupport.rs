//! ISUPPORT (numeric 005) resolution.
//!
//! During registration the server advertises its dialect as `KEY` or
//! `KEY=VALUE` tokens. The digested [`ServerOptions`] map parameterizes
//! everything downstream: mode categorization, prefix mapping, name length
//! caps, case folding, and which optional facilities (MONITOR, WATCH,
//! SILENCE, KNOCK, ...) exist at all.
//!
//! Two rules keep the session robust:
//!
//! - a malformed value for one key never fails the digest — the broken
//!   token is skipped and the rest of the line still applies;
//! - unrecognized keys are retained verbatim so callers can query them,
//!   but have no effect.
//!
//! The option set is reset to RFC 1459 defaults on every fresh
//! registration, then rebuilt as `005` lines arrive.

use std::collections::HashMap;

use crate::casemap::CaseMapping;

/// Which server-side presence facility backs the friends list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceBackend {
    /// IRCv3-era `MONITOR` (numerics 730/731).
    Monitor,
    /// Legacy `WATCH` (numerics 600-607).
    Watch,
}

/// Side effects a `005` line can demand beyond updating the map.
///
/// The engine translates these into outbound lines or projection resets;
/// the resolver itself never performs I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionSideEffect {
    /// NETWORK changed relative to the previous value: projections reset.
    NetworkChanged(String),
    /// Server understands `PROTOCTL NAMESX`: request multi-prefix NAMES.
    EnableNamesx,
    /// Server understands `PROTOCTL UHNAMES`: request user@host NAMES.
    EnableUhnames,
    /// A presence facility became available: re-register friends on it.
    PresenceAvailable(PresenceBackend),
    /// SILENCE became available: re-register the ignore list.
    IgnoresAvailable,
}

/// The four CHANMODES categories plus the PREFIX-granted user modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeCategory {
    /// Type A: list-mutating modes (`b`, `e`, `I`); parameter is a mask.
    List,
    /// Type B: parameter always required (`k`).
    AlwaysParam,
    /// Type C: parameter required only when setting (`l`).
    ParamWhenSet,
    /// Type D: never takes a parameter (`imnpst`).
    NoParam,
    /// PREFIX mode granting channel status to a nick (`o`, `h`, `v`, ...).
    UserPrefix,
}

/// Ordered mapping from user-granted modes to display sigils.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixSpec {
    modes: Vec<char>,
    sigils: Vec<char>,
}

impl PrefixSpec {
    /// Parse a `PREFIX` value of the form `(modes)sigils`.
    pub fn parse(s: &str) -> Option<PrefixSpec> {
        let rest = s.strip_prefix('(')?;
        let close = rest.find(')')?;
        let modes: Vec<char> = rest[..close].chars().collect();
        let sigils: Vec<char> = rest[close + 1..].chars().collect();
        if modes.is_empty() || modes.len() != sigils.len() {
            return None;
        }
        Some(PrefixSpec { modes, sigils })
    }

    fn rfc1459_default() -> PrefixSpec {
        PrefixSpec {
            modes: vec!['o', 'v'],
            sigils: vec!['@', '+'],
        }
    }

    /// Is `c` a mode this server grants as user status?
    pub fn is_user_mode(&self, c: char) -> bool {
        self.modes.contains(&c)
    }

    /// Is `c` a status sigil (`@`, `+`, ...)?
    pub fn is_sigil(&self, c: char) -> bool {
        self.sigils.contains(&c)
    }

    /// The mode granted by a sigil, e.g. `@` → `o`.
    pub fn mode_for_sigil(&self, sigil: char) -> Option<char> {
        let idx = self.sigils.iter().position(|&s| s == sigil)?;
        Some(self.modes[idx])
    }

    /// The sigil displayed for a mode, e.g. `o` → `@`.
    pub fn sigil_for_mode(&self, mode: char) -> Option<char> {
        let idx = self.modes.iter().position(|&m| m == mode)?;
        Some(self.sigils[idx])
    }

    /// The modes in rank order, highest first.
    pub fn modes(&self) -> &[char] {
        &self.modes
    }
}

/// Four comma-separated CHANMODES category strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    /// Type A: list modes.
    pub list: String,
    /// Type B: always-parameter modes.
    pub always_param: String,
    /// Type C: parameter-on-set modes.
    pub param_when_set: String,
    /// Type D: parameterless modes.
    pub no_param: String,
}

impl ChanModes {
    /// Parse a `CHANMODES` value of the form `a,b,c,d`.
    pub fn parse(s: &str) -> Option<ChanModes> {
        let mut parts = s.splitn(4, ',');
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        Some(ChanModes {
            list: a.to_string(),
            always_param: b.to_string(),
            param_when_set: c.to_string(),
            no_param: d.to_string(),
        })
    }

    fn rfc1459_default() -> ChanModes {
        ChanModes {
            list: "b".to_string(),
            always_param: "k".to_string(),
            param_when_set: "l".to_string(),
            no_param: "imnpst".to_string(),
        }
    }
}

/// Per-mode caps for ban / ban-exception / invite-exception lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaxList {
    entries: Vec<(char, usize)>,
}

impl MaxList {
    /// Parse a `MAXLIST` value of the form `modes:limit[,modes:limit...]`.
    pub fn parse(s: &str) -> Option<MaxList> {
        let mut entries: Vec<(char, usize)> = Vec::new();
        for part in s.split(',') {
            if part.is_empty() {
                continue;
            }
            let (modes, limit_str) = part.split_once(':')?;
            let limit: usize = match limit_str.parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            for ch in modes.chars() {
                entries.retain(|(c, _)| *c != ch);
                entries.push((ch, limit));
            }
        }
        Some(MaxList { entries })
    }

    /// The negotiated cap for a list mode, if any.
    pub fn limit_for(&self, mode: char) -> Option<usize> {
        self.entries.iter().find(|(c, _)| *c == mode).map(|(_, n)| *n)
    }
}

/// The digested server capability map.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerOptions {
    /// Network name from `NETWORK`.
    pub network: Option<String>,
    /// Nickname length cap.
    pub nick_len: usize,
    /// Channel name length cap (excluding the sigil).
    pub channel_len: usize,
    /// Topic length cap.
    pub topic_len: usize,
    /// Kick reason length cap.
    pub kick_len: usize,
    /// Away message length cap.
    pub away_len: usize,
    /// Maximum simultaneously joined channels.
    pub chan_limit: usize,
    /// Maximum targets per PRIVMSG/NOTICE.
    pub max_targets: usize,
    /// Maximum mode changes per MODE command.
    pub modes_per_line: usize,
    /// Server penalty factor, when advertised.
    pub penalty: Option<u32>,
    /// Channel mode categories.
    pub chan_modes: ChanModes,
    /// Status prefix mapping.
    pub prefix: PrefixSpec,
    /// Allowed channel sigils.
    pub chan_types: String,
    /// List caps from `MAXLIST`.
    pub max_list: MaxList,
    /// Ban-exception list supported (`EXCEPTS`).
    pub excepts: bool,
    /// Invite-exception list supported (`INVEX`).
    pub invex: bool,
    /// `KNOCK` available.
    pub knock: bool,
    /// `CNOTICE` available.
    pub cnotice: bool,
    /// `CPRIVMSG` available.
    pub cprivmsg: bool,
    /// `USERIP` available.
    pub userip: bool,
    /// Sigils permitted as message-target prefixes (`STATUSMSG`).
    pub status_msg: Option<String>,
    /// Server accepts `PROTOCTL NAMESX`.
    pub namesx: bool,
    /// Server accepts `PROTOCTL UHNAMES`.
    pub uhnames: bool,
    /// `MONITOR` cap, when available.
    pub monitor: Option<usize>,
    /// `WATCH` cap, when available.
    pub watch: Option<usize>,
    /// `SILENCE` cap, when available.
    pub silence: Option<usize>,
    /// Forced nick changes possible (`FNC`).
    pub fnc: bool,
    /// Server claims RFC 2812 conformance.
    pub rfc2812: bool,
    /// `LIST` will not flood the client off (`SAFELIST`).
    pub safelist: bool,
    /// WHOX extensions to `WHO`.
    pub whox: bool,
    /// Negotiated case mapping.
    pub case_mapping: CaseMapping,
    /// Unrecognized keys, retained verbatim.
    pub other: HashMap<String, Option<String>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            network: None,
            nick_len: 28,
            channel_len: 50,
            topic_len: 80,
            kick_len: 80,
            away_len: 160,
            chan_limit: 10,
            max_targets: 4,
            modes_per_line: 3,
            penalty: None,
            chan_modes: ChanModes::rfc1459_default(),
            prefix: PrefixSpec::rfc1459_default(),
            chan_types: "#&+!".to_string(),
            max_list: MaxList::default(),
            excepts: false,
            invex: false,
            knock: false,
            cnotice: false,
            cprivmsg: false,
            userip: false,
            status_msg: None,
            namesx: false,
            uhnames: false,
            monitor: None,
            watch: None,
            silence: None,
            fnc: false,
            rfc2812: false,
            safelist: false,
            whox: false,
            case_mapping: CaseMapping::Rfc1459,
            other: HashMap::new(),
        }
    }
}

impl ServerOptions {
    /// Reset to RFC 1459 defaults, as happens on each fresh registration.
    pub fn reset(&mut self) {
        *self = ServerOptions::default();
    }

    /// Categorize a channel mode character under the current options.
    pub fn categorize(&self, mode: char) -> ModeCategory {
        if self.prefix.is_user_mode(mode) {
            ModeCategory::UserPrefix
        } else if self.chan_modes.list.contains(mode) {
            ModeCategory::List
        } else if self.chan_modes.always_param.contains(mode) {
            ModeCategory::AlwaysParam
        } else if self.chan_modes.param_when_set.contains(mode) {
            ModeCategory::ParamWhenSet
        } else {
            ModeCategory::NoParam
        }
    }

    /// The preferred presence backend, MONITOR winning over WATCH.
    pub fn presence_backend(&self) -> Option<PresenceBackend> {
        if self.monitor.is_some() {
            Some(PresenceBackend::Monitor)
        } else if self.watch.is_some() {
            Some(PresenceBackend::Watch)
        } else {
            None
        }
    }

    /// The cap on the active presence backend's target list.
    pub fn presence_limit(&self) -> Option<usize> {
        match self.presence_backend()? {
            PresenceBackend::Monitor => self.monitor,
            PresenceBackend::Watch => self.watch,
        }
    }

    /// Digest one `005` parameter list (target nick and trailing already
    /// removed by the dispatcher).
    ///
    /// Returns the side effects the engine must act on. Individual
    /// malformed tokens are skipped; the digest itself cannot fail.
    pub fn digest(&mut self, tokens: &[&str]) -> Vec<OptionSideEffect> {
        let mut effects = Vec::new();

        for token in tokens {
            if token.is_empty() {
                continue;
            }
            let (key, value) = match token.find('=') {
                Some(eq) => (&token[..eq], Some(&token[eq + 1..])),
                None => (*token, None),
            };

            match key.to_ascii_uppercase().as_str() {
                "NETWORK" => {
                    if let Some(v) = value {
                        if self.network.as_deref() != Some(v) {
                            let changed = self.network.is_some();
                            self.network = Some(v.to_string());
                            if changed {
                                effects.push(OptionSideEffect::NetworkChanged(v.to_string()));
                            }
                        }
                    }
                }
                "NICKLEN" => parse_into(value, &mut self.nick_len),
                "CHANNELLEN" => parse_into(value, &mut self.channel_len),
                "TOPICLEN" => parse_into(value, &mut self.topic_len),
                "KICKLEN" => parse_into(value, &mut self.kick_len),
                "AWAYLEN" => parse_into(value, &mut self.away_len),
                "MAXTARGETS" => parse_into(value, &mut self.max_targets),
                "MODES" => parse_into(value, &mut self.modes_per_line),
                "PENALTY" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        self.penalty = Some(n);
                    }
                }
                "CHANLIMIT" => {
                    // <types>:<n>[,...] — the cap for our primary sigil set.
                    if let Some(n) = value
                        .and_then(|v| v.split(',').next())
                        .and_then(|part| part.split_once(':'))
                        .and_then(|(_, n)| n.parse().ok())
                    {
                        self.chan_limit = n;
                    }
                }
                "MAXCHANNELS" => parse_into(value, &mut self.chan_limit),
                "CHANMODES" => {
                    if let Some(cm) = value.and_then(ChanModes::parse) {
                        self.chan_modes = cm;
                    }
                }
                "PREFIX" => {
                    if let Some(p) = value.and_then(PrefixSpec::parse) {
                        self.prefix = p;
                    }
                }
                "CHANTYPES" => {
                    if let Some(v) = value {
                        self.chan_types = v.to_string();
                    }
                }
                "MAXLIST" => {
                    if let Some(ml) = value.and_then(MaxList::parse) {
                        self.max_list = ml;
                    }
                }
                "EXCEPTS" => self.excepts = true,
                "INVEX" => self.invex = true,
                "KNOCK" => self.knock = true,
                "CNOTICE" => self.cnotice = true,
                "CPRIVMSG" => self.cprivmsg = true,
                "USERIP" => self.userip = true,
                "STATUSMSG" => {
                    if let Some(v) = value {
                        self.status_msg = Some(v.to_string());
                    }
                }
                "NAMESX" => {
                    if !self.namesx {
                        self.namesx = true;
                        effects.push(OptionSideEffect::EnableNamesx);
                    }
                }
                "UHNAMES" => {
                    if !self.uhnames {
                        self.uhnames = true;
                        effects.push(OptionSideEffect::EnableUhnames);
                    }
                }
                "MONITOR" => {
                    if self.monitor.is_none() {
                        self.monitor = Some(value.and_then(|v| v.parse().ok()).unwrap_or(usize::MAX));
                        effects.push(OptionSideEffect::PresenceAvailable(PresenceBackend::Monitor));
                    }
                }
                "WATCH" => {
                    if self.watch.is_none() {
                        self.watch = Some(value.and_then(|v| v.parse().ok()).unwrap_or(usize::MAX));
                        effects.push(OptionSideEffect::PresenceAvailable(PresenceBackend::Watch));
                    }
                }
                "SILENCE" => {
                    if self.silence.is_none() {
                        self.silence = Some(value.and_then(|v| v.parse().ok()).unwrap_or(usize::MAX));
                        effects.push(OptionSideEffect::IgnoresAvailable);
                    }
                }
                "CASEMAPPING" => {
                    if let Some(v) = value {
                        self.case_mapping = CaseMapping::from_isupport(v);
                    }
                }
                "FNC" => self.fnc = true,
                "RFC2812" => self.rfc2812 = true,
                "SAFELIST" => self.safelist = true,
                "WHOX" => self.whox = true,
                _ => {
                    self.other
                        .insert(key.to_string(), value.map(str::to_string));
                }
            }
        }

        effects
    }
}

fn parse_into(value: Option<&str>, slot: &mut usize) {
    if let Some(n) = value.and_then(|v| v.parse().ok()) {
        *slot = n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(opts: &mut ServerOptions, line: &str) -> Vec<OptionSideEffect> {
        let tokens: Vec<&str> = line.split(' ').collect();
        opts.digest(&tokens)
    }

    #[test]
    fn test_defaults() {
        let opts = ServerOptions::default();
        assert_eq!(opts.nick_len, 28);
        assert_eq!(opts.chan_limit, 10);
        assert_eq!(opts.max_targets, 4);
        assert_eq!(opts.topic_len, 80);
        assert_eq!(opts.prefix.sigil_for_mode('o'), Some('@'));
        assert_eq!(opts.presence_backend(), None);
    }

    #[test]
    fn test_integer_caps() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "NICKLEN=16 TOPICLEN=307 KICKLEN=255 AWAYLEN=200");
        assert_eq!(opts.nick_len, 16);
        assert_eq!(opts.topic_len, 307);
        assert_eq!(opts.kick_len, 255);
        assert_eq!(opts.away_len, 200);
    }

    #[test]
    fn test_chanlimit_forms() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "CHANLIMIT=#&:25");
        assert_eq!(opts.chan_limit, 25);
    }

    #[test]
    fn test_prefix_mapping() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "PREFIX=(qaohv)~&@%+");
        assert!(opts.prefix.is_user_mode('q'));
        assert_eq!(opts.prefix.mode_for_sigil('%'), Some('h'));
        assert_eq!(opts.prefix.sigil_for_mode('a'), Some('&'));
        assert_eq!(opts.categorize('h'), ModeCategory::UserPrefix);
    }

    #[test]
    fn test_chanmodes_categories() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "CHANMODES=beI,k,l,imnpst");
        assert_eq!(opts.categorize('b'), ModeCategory::List);
        assert_eq!(opts.categorize('k'), ModeCategory::AlwaysParam);
        assert_eq!(opts.categorize('l'), ModeCategory::ParamWhenSet);
        assert_eq!(opts.categorize('m'), ModeCategory::NoParam);
        // PREFIX wins over CHANMODES membership.
        assert_eq!(opts.categorize('o'), ModeCategory::UserPrefix);
    }

    #[test]
    fn test_network_change_signal() {
        let mut opts = ServerOptions::default();
        let fx = digest(&mut opts, "NETWORK=Foo");
        assert!(fx.is_empty(), "first NETWORK is not a change");
        let fx = digest(&mut opts, "NETWORK=Foo");
        assert!(fx.is_empty(), "same NETWORK is not a change");
        let fx = digest(&mut opts, "NETWORK=Bar");
        assert_eq!(fx, vec![OptionSideEffect::NetworkChanged("Bar".into())]);
    }

    #[test]
    fn test_protoctl_signals_fire_once() {
        let mut opts = ServerOptions::default();
        let fx = digest(&mut opts, "NAMESX UHNAMES");
        assert_eq!(
            fx,
            vec![OptionSideEffect::EnableNamesx, OptionSideEffect::EnableUhnames]
        );
        assert!(digest(&mut opts, "NAMESX UHNAMES").is_empty());
    }

    #[test]
    fn test_presence_preference() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "WATCH=128");
        assert_eq!(opts.presence_backend(), Some(PresenceBackend::Watch));
        assert_eq!(opts.presence_limit(), Some(128));

        digest(&mut opts, "MONITOR=100");
        assert_eq!(opts.presence_backend(), Some(PresenceBackend::Monitor));
        assert_eq!(opts.presence_limit(), Some(100));
    }

    #[test]
    fn test_maxlist() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "MAXLIST=beI:60");
        assert_eq!(opts.max_list.limit_for('b'), Some(60));
        assert_eq!(opts.max_list.limit_for('I'), Some(60));
        assert_eq!(opts.max_list.limit_for('q'), None);
    }

    #[test]
    fn test_malformed_tokens_swallowed() {
        let mut opts = ServerOptions::default();
        digest(
            &mut opts,
            "NICKLEN=notanumber CHANMODES=only,three,parts PREFIX=broken NICKLEN=20",
        );
        // The broken tokens were skipped; the good one still applied.
        assert_eq!(opts.nick_len, 20);
        assert_eq!(opts.chan_modes, ChanModes::rfc1459_default());
    }

    #[test]
    fn test_unknown_keys_retained() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "ELIST=MNUCT DEAF");
        assert_eq!(opts.other.get("ELIST"), Some(&Some("MNUCT".to_string())));
        assert_eq!(opts.other.get("DEAF"), Some(&None));
    }

    #[test]
    fn test_casemapping_selection() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "CASEMAPPING=ascii");
        assert_eq!(opts.case_mapping, CaseMapping::Ascii);
    }

    #[test]
    fn test_boolean_flags() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "EXCEPTS INVEX KNOCK CNOTICE CPRIVMSG USERIP SAFELIST WHOX FNC RFC2812 STATUSMSG=@+");
        assert!(opts.excepts && opts.invex && opts.knock);
        assert!(opts.cnotice && opts.cprivmsg && opts.userip);
        assert!(opts.safelist && opts.whox && opts.fnc && opts.rfc2812);
        assert_eq!(opts.status_msg.as_deref(), Some("@+"));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut opts = ServerOptions::default();
        digest(&mut opts, "NICKLEN=16 MONITOR=100 NETWORK=Foo");
        opts.reset();
        assert_eq!(opts, ServerOptions::default());
    }
}
