//! The sans-IO protocol engine.
//!
//! [`Engine`] consumes inbound lines and produces outbound lines plus
//! typed [`Event`]s; it never touches a socket. The async connection
//! runner in [`conn`](crate::conn) wires it to a transport, but the same
//! API drives scripted transcripts in tests.
//!
//! All authoritative state lives here: the connection state machine, the
//! negotiated [`ServerOptions`], channel and private-message projections,
//! the friends and ignore lists, and the client's own mode set. Facade
//! methods validate synchronously — wrong state, bad names, length caps,
//! missing server facilities, insufficient channel status — before any
//! line is queued, so a caller that gets `Ok(())` knows the command went
//! on the wire in order.

pub mod channel;
mod dispatch;
pub mod friends;
pub mod ignore;
pub mod query;
pub mod whois;

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use rand::Rng;

use crate::casemap::CaseMapping;
use crate::ctcp::{Ctcp, CtcpCommand};
use crate::dcc::DccRequest;
use crate::error::ClientError;
use crate::event::Event;
use crate::isupport::{OptionSideEffect, ServerOptions};
use crate::message::{sanitize, split_text, Message, MAX_LINE_LEN};
use crate::mode::{ChannelModeString, ClientModeString, ModeChange};
use crate::names::{ChannelName, Nickname, Password, Username};

use self::channel::{Channel, ChannelUser};
use self::friends::FriendList;
use self::ignore::IgnoreList;
use self::query::PrivateMessage;
use self::whois::{WhoisInfo, WhowasInfo};

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected. Terminal until a reconnect begins.
    Disconnected,
    /// Transport is being established.
    Connecting,
    /// Transport is up; registration burst sent, 001 pending.
    Connected,
    /// 001 received; the session is live.
    Registered,
}

/// Reply strings used for CTCP auto-responses.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtcpReplies {
    /// `VERSION` reply.
    pub version: String,
    /// `SOURCE` reply.
    pub source: String,
    /// `CLIENTINFO` reply.
    pub client_info: String,
}

impl Default for CtcpReplies {
    fn default() -> Self {
        CtcpReplies {
            version: concat!("slirc-core ", env!("CARGO_PKG_VERSION")).to_string(),
            source: env!("CARGO_PKG_REPOSITORY").to_string(),
            client_info: "ACTION CLIENTINFO DCC ERRMSG PING SOURCE TIME VERSION".to_string(),
        }
    }
}

/// Identity and behavior configuration for one session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Desired nickname.
    pub nickname: String,
    /// Ident sent in `USER`.
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, if required.
    pub password: Option<String>,
    /// CTCP auto-response strings.
    pub ctcp: CtcpReplies,
}

impl SessionConfig {
    /// A config with default CTCP replies.
    pub fn new(nickname: &str, username: &str, realname: &str) -> SessionConfig {
        SessionConfig {
            nickname: nickname.to_string(),
            username: username.to_string(),
            realname: realname.to_string(),
            password: None,
            ctcp: CtcpReplies::default(),
        }
    }

    /// Attach a server password.
    pub fn with_password(mut self, password: &str) -> SessionConfig {
        self.password = Some(password.to_string());
        self
    }
}

/// Server identity recorded from numeric 004.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server software version.
    pub version: String,
    /// Supported user mode characters.
    pub user_modes: String,
    /// Supported channel mode characters.
    pub channel_modes: String,
}

/// The sans-IO protocol core.
pub struct Engine {
    pub(crate) config: SessionConfig,
    pub(crate) state: ConnectionState,
    pub(crate) options: ServerOptions,
    /// Current nick: the requested one until the server accepts or
    /// forces another.
    pub(crate) nick: String,
    pub(crate) channels: Vec<Channel>,
    pub(crate) queries: Vec<PrivateMessage>,
    pub(crate) friends: FriendList,
    pub(crate) ignores: IgnoreList,
    pub(crate) client_modes: ClientModeString,
    pub(crate) server_info: Option<ServerInfo>,
    pub(crate) whois: Option<WhoisInfo>,
    pub(crate) whowas: Option<WhowasInfo>,
    pub(crate) away: bool,
    /// Channels to rejoin in one batched JOIN after re-registration.
    pub(crate) rejoin: Vec<String>,
    /// Set by `quit`; suppresses auto-reconnect.
    pub(crate) quit_requested: bool,
    outbound: VecDeque<String>,
    events: VecDeque<Event>,
}

impl Engine {
    /// Create an engine, validating the configured identity.
    pub fn new(config: SessionConfig) -> Result<Engine, ClientError> {
        let defaults = ServerOptions::default();
        Nickname::parse(&config.nickname, defaults.nick_len)?;
        Username::parse(&config.username)?;
        if let Some(pass) = &config.password {
            Password::parse(pass)?;
        }
        let nick = config.nickname.clone();
        Ok(Engine {
            config,
            state: ConnectionState::Disconnected,
            options: defaults,
            nick,
            channels: Vec::new(),
            queries: Vec::new(),
            friends: FriendList::default(),
            ignores: IgnoreList::default(),
            client_modes: ClientModeString::new(),
            server_info: None,
            whois: None,
            whowas: None,
            away: false,
            rejoin: Vec::new(),
            quit_requested: false,
            outbound: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current nickname.
    pub fn nickname(&self) -> &str {
        &self.nick
    }

    /// Negotiated server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Network name, once advertised.
    pub fn network(&self) -> Option<&str> {
        self.options.network.as_deref()
    }

    /// Server identity from 004, once received.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// A joined channel by name (case-folded comparison).
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        let mapping = self.options.case_mapping;
        self.channels.iter().find(|c| mapping.eq(&c.name, name))
    }

    /// All channel projections, active and cleared.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// A private conversation by peer nick.
    pub fn private_message(&self, peer: &str) -> Option<&PrivateMessage> {
        let mapping = self.options.case_mapping;
        self.queries.iter().find(|q| mapping.eq(&q.peer, peer))
    }

    /// The friends list.
    pub fn friends(&self) -> &FriendList {
        &self.friends
    }

    /// The ignore list.
    pub fn ignores(&self) -> &IgnoreList {
        &self.ignores
    }

    /// The client's own umodes.
    pub fn client_modes(&self) -> &ClientModeString {
        &self.client_modes
    }

    /// Whether we are currently marked away.
    pub fn is_away(&self) -> bool {
        self.away
    }

    /// Whether the last disconnect calls for a reconnect attempt.
    pub fn wants_reconnect(&self) -> bool {
        !self.quit_requested
    }

    // ------------------------------------------------------------------
    // Output and events
    // ------------------------------------------------------------------

    /// Take the next queued outbound line (CRLF-terminated).
    pub fn take_outbound(&mut self) -> Option<String> {
        self.outbound.pop_front()
    }

    /// Drain all queued outbound lines.
    pub fn drain_outbound(&mut self) -> Vec<String> {
        self.outbound.drain(..).collect()
    }

    /// Take the next pending event.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Drain all pending events.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Queue a line, clamping to the 510-octet pre-terminator budget.
    pub(crate) fn send_raw(&mut self, line: String) {
        self.outbound.push_back(frame(line));
    }

    /// Queue a line ahead of everything else (PONG priority).
    pub(crate) fn send_raw_front(&mut self, line: String) {
        self.outbound.push_front(frame(line));
    }

    pub(crate) fn send_msg(&mut self, msg: Message) {
        self.send_raw(msg.to_string());
    }

    // ------------------------------------------------------------------
    // Transport lifecycle
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.emit(Event::ConnectionStateChanged(state));
        }
    }

    /// The runner is about to dial.
    pub fn on_connecting(&mut self) {
        self.quit_requested = false;
        self.set_state(ConnectionState::Connecting);
    }

    /// Transport is ready: send the registration burst.
    pub fn on_transport_connected(&mut self) {
        self.set_state(ConnectionState::Connected);
        // Requested nick resets to the configured one on each attempt.
        self.nick = self.config.nickname.clone();
        if let Some(pass) = self.config.password.clone() {
            self.send_msg(Message::cmd("PASS", [pass]));
        }
        let nick = self.nick.clone();
        self.send_msg(Message::cmd("NICK", [nick]));
        let username = self.config.username.clone();
        let realname = self.config.realname.clone();
        self.send_msg(Message::with_trailing(
            "USER",
            [username, "8".to_string(), "*".to_string()],
            realname,
        ));
    }

    /// Transport closed. Channel state clears but identities survive so a
    /// reconnect can rejoin; friends and ignores survive outright.
    pub fn on_transport_closed(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        if !self.quit_requested {
            self.rejoin = self
                .channels
                .iter()
                .filter(|c| c.is_active)
                .map(|c| c.name.clone())
                .collect();
        } else {
            self.rejoin.clear();
        }
        for chan in &mut self.channels {
            chan.clear();
        }
        self.client_modes.clear();
        self.whois = None;
        self.whowas = None;
        self.away = false;
        self.outbound.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Feed one inbound line. Malformed lines become
    /// [`Event::ParseError`]; the session continues.
    pub fn handle_line(&mut self, line: &str) {
        match Message::parse(line) {
            Ok(msg) => self.dispatch(msg),
            Err(error) => self.emit(Event::ParseError {
                raw: line.to_string(),
                error,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Registration internals
    // ------------------------------------------------------------------

    pub(crate) fn on_registered(&mut self, accepted_nick: Option<&str>) {
        // Stale options from the previous session must not leak into this
        // one; 005 lines will rebuild the map.
        self.options.reset();
        self.server_info = None;
        if let Some(nick) = accepted_nick {
            if !nick.is_empty() && nick != self.nick {
                self.nick = nick.to_string();
            }
        }
        self.set_state(ConnectionState::Registered);

        if !self.rejoin.is_empty() {
            let batch = std::mem::take(&mut self.rejoin).join(",");
            self.send_msg(Message::cmd("JOIN", [batch]));
        }
    }

    pub(crate) fn on_nick_collision(&mut self) {
        // Synthesize <nick><4 digits>, trimmed to fit the cap.
        let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
        let cap = self.options.nick_len;
        let mut base = self.config.nickname.clone();
        while base.len() + 4 > cap && base.len() > 1 {
            base.pop();
        }
        let candidate = format!("{}{:04}", base, suffix);
        self.nick = candidate.clone();
        self.send_msg(Message::cmd("NICK", [candidate]));
    }

    pub(crate) fn apply_option_effects(&mut self, effects: Vec<OptionSideEffect>) {
        let mut presence_arrived = false;
        for effect in effects {
            match effect {
                OptionSideEffect::NetworkChanged(name) => {
                    // A different network behind the same address means the
                    // old projections describe someone else's channels.
                    self.channels.clear();
                    self.queries.clear();
                    self.emit(Event::NetworkChanged(name));
                }
                OptionSideEffect::EnableNamesx => {
                    self.send_msg(Message::cmd("PROTOCTL", ["NAMESX"]));
                }
                OptionSideEffect::EnableUhnames => {
                    self.send_msg(Message::cmd("PROTOCTL", ["UHNAMES"]));
                }
                OptionSideEffect::PresenceAvailable(_) => presence_arrived = true,
                OptionSideEffect::IgnoresAvailable => {
                    if !self.ignores.is_empty() {
                        let masks: Vec<String> =
                            self.ignores.masks().iter().map(|s| s.to_string()).collect();
                        let refs: Vec<&str> = masks.iter().map(String::as_str).collect();
                        for line in ignore::silence_lines(true, &refs) {
                            self.send_raw(line);
                        }
                    }
                }
            }
        }
        // One registration per line, on whichever backend wins after the
        // whole line is digested (MONITOR beats WATCH).
        if presence_arrived && !self.friends.is_empty() {
            if let Some(backend) = self.options.presence_backend() {
                let nicks: Vec<String> =
                    self.friends.nicks().iter().map(|s| s.to_string()).collect();
                let refs: Vec<&str> = nicks.iter().map(String::as_str).collect();
                for line in friends::registration_lines(backend, true, &refs) {
                    self.send_raw(line);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared validation
    // ------------------------------------------------------------------

    pub(crate) fn mapping(&self) -> CaseMapping {
        self.options.case_mapping
    }

    pub(crate) fn is_self(&self, nick: &str) -> bool {
        self.mapping().eq(nick, &self.nick)
    }

    fn require_registered(&self) -> Result<(), ClientError> {
        if self.state == ConnectionState::Registered {
            Ok(())
        } else {
            Err(ClientError::WrongState {
                required: ConnectionState::Registered,
                actual: self.state,
            })
        }
    }

    fn require_nonempty(value: &str, what: &'static str) -> Result<(), ClientError> {
        if value.is_empty() {
            Err(ClientError::EmptyArgument(what))
        } else {
            Ok(())
        }
    }

    fn require_cap(value: &str, max: usize, what: &'static str) -> Result<(), ClientError> {
        if value.len() > max {
            Err(ClientError::NameTooLong {
                what,
                max,
                actual: value.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Local permission gate for mode changes: operator for status grants
    /// other than voice, half-op for voice and list edits, operator for
    /// everything else.
    fn require_mode_permission(
        &self,
        channel: &str,
        changes: &[ModeChange],
    ) -> Result<(), ClientError> {
        let mapping = self.mapping();
        let chan = self.channel(channel).ok_or_else(|| ClientError::Validation {
            what: "channel",
            reason: format!("not joined to {}", channel),
        })?;
        let me = chan
            .client_user(&self.nick, mapping)
            .ok_or(ClientError::PermissionDenied("channel membership"))?;

        for change in changes {
            let half_op_suffices = matches!(change.mode, 'v' | 'b' | 'e' | 'I');
            if half_op_suffices {
                if !me.is_half_op_or_better() {
                    return Err(ClientError::PermissionDenied("half-operator"));
                }
            } else if !me.is_operator_or_better() {
                return Err(ClientError::PermissionDenied("operator"));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Facade: channels and messaging
    // ------------------------------------------------------------------

    /// Join a channel, optionally with a key.
    pub fn join(&mut self, channel: &str, key: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        let active = self.channels.iter().filter(|c| c.is_active).count();
        if active >= self.options.chan_limit {
            return Err(ClientError::TooManyChannels(self.options.chan_limit));
        }
        match key {
            Some(k) => self.send_msg(Message::cmd("JOIN", [name.as_str(), k])),
            None => self.send_msg(Message::cmd("JOIN", [name.as_str()])),
        }
        Ok(())
    }

    /// Leave a channel.
    pub fn part(&mut self, channel: &str, reason: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        match reason {
            Some(r) => self.send_msg(Message::with_trailing("PART", [name.as_str()], sanitize(r))),
            None => self.send_msg(Message::cmd("PART", [name.as_str()])),
        }
        Ok(())
    }

    /// Send a PRIVMSG, splitting bodies that exceed the line budget.
    pub fn privmsg(&mut self, target: &str, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(target, "target")?;
        Self::require_nonempty(text, "message")?;
        if self.is_self(target) {
            return Err(ClientError::TargetIsSelf);
        }
        let text = sanitize(text);
        let overhead = "PRIVMSG ".len() + target.len() + " :".len();
        for chunk in split_text(overhead, &text) {
            self.send_msg(Message::with_trailing("PRIVMSG", [target], chunk));
        }
        Ok(())
    }

    /// Send a NOTICE, splitting bodies that exceed the line budget.
    pub fn notice(&mut self, target: &str, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(target, "target")?;
        Self::require_nonempty(text, "message")?;
        let text = sanitize(text);
        let overhead = "NOTICE ".len() + target.len() + " :".len();
        for chunk in split_text(overhead, &text) {
            self.send_msg(Message::with_trailing("NOTICE", [target], chunk));
        }
        Ok(())
    }

    /// Open a private conversation without sending anything.
    pub fn open_private_message(&mut self, peer: &str) -> Result<(), ClientError> {
        Self::require_nonempty(peer, "peer")?;
        if self.is_self(peer) {
            return Err(ClientError::TargetIsSelf);
        }
        if self.private_message(peer).is_none() {
            self.queries.push(PrivateMessage::new(peer));
        }
        Ok(())
    }

    /// Query or set a channel topic.
    pub fn topic(&mut self, channel: &str, topic: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        match topic {
            Some(t) => {
                Self::require_cap(t, self.options.topic_len, "topic")?;
                self.send_msg(Message::with_trailing("TOPIC", [name.as_str()], sanitize(t)));
            }
            None => self.send_msg(Message::cmd("TOPIC", [name.as_str()])),
        }
        Ok(())
    }

    /// Apply mode changes to a channel, gated by local status.
    pub fn set_channel_modes(
        &mut self,
        channel: &str,
        changes: &[ModeChange],
    ) -> Result<(), ClientError> {
        self.require_registered()?;
        if changes.is_empty() {
            return Err(ClientError::EmptyArgument("mode changes"));
        }
        self.require_mode_permission(channel, changes)?;
        let rendered = ChannelModeString::from_changes(changes.to_vec()).render();
        let mut params = vec![channel.to_string()];
        params.extend(rendered.split(' ').map(str::to_string));
        self.send_msg(Message::new("MODE", params, None));
        Ok(())
    }

    /// Ask the server for a channel's current modes.
    pub fn request_channel_modes(&mut self, channel: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        self.send_msg(Message::cmd("MODE", [name.as_str()]));
        Ok(())
    }

    /// Set or unset our own umodes.
    pub fn set_client_modes(&mut self, changes: &[ModeChange]) -> Result<(), ClientError> {
        self.require_registered()?;
        if changes.is_empty() {
            return Err(ClientError::EmptyArgument("mode changes"));
        }
        let mut flags = String::new();
        let mut sign = None;
        for change in changes {
            if sign != Some(change.added) {
                flags.push(if change.added { '+' } else { '-' });
                sign = Some(change.added);
            }
            flags.push(change.mode);
        }
        let nick = self.nick.clone();
        self.send_msg(Message::cmd("MODE", [nick, flags]));
        Ok(())
    }

    /// Request the ban list (`MODE <chan> +b`).
    pub fn request_ban_list(&mut self, channel: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_msg(Message::cmd("MODE", [channel, "+b"]));
        Ok(())
    }

    /// Request the ban-exception list; requires `EXCEPTS`.
    pub fn request_ban_exceptions(&mut self, channel: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.excepts {
            return Err(ClientError::NotSupported("EXCEPTS"));
        }
        self.send_msg(Message::cmd("MODE", [channel, "+e"]));
        Ok(())
    }

    /// Request the invite-exception list; requires `INVEX`.
    pub fn request_invite_exceptions(&mut self, channel: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.invex {
            return Err(ClientError::NotSupported("INVEX"));
        }
        self.send_msg(Message::cmd("MODE", [channel, "+I"]));
        Ok(())
    }

    /// Kick a user from a channel.
    pub fn kick(
        &mut self,
        channel: &str,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        match reason {
            Some(r) => {
                Self::require_cap(r, self.options.kick_len, "kick reason")?;
                self.send_msg(Message::with_trailing(
                    "KICK",
                    [name.as_str(), nick],
                    sanitize(r),
                ));
            }
            None => self.send_msg(Message::cmd("KICK", [name.as_str(), nick])),
        }
        Ok(())
    }

    /// Invite a user to a channel.
    pub fn invite(&mut self, nick: &str, channel: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        self.send_msg(Message::cmd("INVITE", [nick, name.as_str()]));
        Ok(())
    }

    /// Change nickname. Confirmation arrives as a NICK echo.
    pub fn nick(&mut self, new_nick: &str) -> Result<(), ClientError> {
        let nick = Nickname::parse(new_nick, self.options.nick_len)?;
        self.send_msg(Message::cmd("NICK", [nick.as_str()]));
        Ok(())
    }

    /// Quit the session. Cancels auto-reconnect.
    pub fn quit(&mut self, reason: Option<&str>) {
        self.quit_requested = true;
        match reason {
            Some(r) => self.send_msg(Message::with_trailing("QUIT", [] as [&str; 0], sanitize(r))),
            None => self.send_msg(Message::cmd("QUIT", [] as [&str; 0])),
        }
    }

    /// Send an already-formatted line. The escape hatch for commands the
    /// facade does not cover; the line is still sanitized and clamped.
    pub fn raw(&mut self, line: &str) -> Result<(), ClientError> {
        Self::require_nonempty(line, "line")?;
        self.send_raw(sanitize(line));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Facade: CTCP and DCC
    // ------------------------------------------------------------------

    fn ctcp_query(
        &mut self,
        nick: &str,
        command: CtcpCommand,
        argument: Option<&str>,
    ) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        if self.is_self(nick) {
            return Err(ClientError::TargetIsSelf);
        }
        let payload = Ctcp::encode(&command, argument);
        self.send_msg(Message::with_trailing("PRIVMSG", [nick], payload));
        Ok(())
    }

    /// CTCP PING: measures round trip via the timestamp argument.
    pub fn ctcp_ping(&mut self, nick: &str) -> Result<(), ClientError> {
        let token = Ctcp::ping_token(chrono::Utc::now());
        self.ctcp_query(nick, CtcpCommand::Ping, Some(&token))
    }

    /// CTCP VERSION query.
    pub fn ctcp_version(&mut self, nick: &str) -> Result<(), ClientError> {
        self.ctcp_query(nick, CtcpCommand::Version, None)
    }

    /// CTCP TIME query.
    pub fn ctcp_time(&mut self, nick: &str) -> Result<(), ClientError> {
        self.ctcp_query(nick, CtcpCommand::Time, None)
    }

    /// CTCP CLIENTINFO query.
    pub fn ctcp_clientinfo(&mut self, nick: &str) -> Result<(), ClientError> {
        self.ctcp_query(nick, CtcpCommand::ClientInfo, None)
    }

    /// CTCP SOURCE query.
    pub fn ctcp_source(&mut self, nick: &str) -> Result<(), ClientError> {
        self.ctcp_query(nick, CtcpCommand::Source, None)
    }

    /// Send an emote (`/me`).
    pub fn action(&mut self, target: &str, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(target, "target")?;
        let payload = Ctcp::encode(&CtcpCommand::Action, Some(&sanitize(text)));
        self.send_msg(Message::with_trailing("PRIVMSG", [target], payload));
        Ok(())
    }

    /// Offer a DCC CHAT session.
    pub fn dcc_offer_chat(
        &mut self,
        nick: &str,
        addr: Ipv4Addr,
        port: u16,
    ) -> Result<(), ClientError> {
        let body = DccRequest::format_chat(addr, port);
        self.ctcp_query(nick, CtcpCommand::Dcc, Some(&body))
    }

    /// Offer a DCC SEND transfer. The data plane is the caller's.
    pub fn dcc_offer_send(
        &mut self,
        nick: &str,
        filename: &str,
        addr: Ipv4Addr,
        port: u16,
        size: u64,
    ) -> Result<(), ClientError> {
        Self::require_nonempty(filename, "filename")?;
        let body = DccRequest::format_send(filename, addr, port, size);
        self.ctcp_query(nick, CtcpCommand::Dcc, Some(&body))
    }

    // ------------------------------------------------------------------
    // Facade: queries and service commands
    // ------------------------------------------------------------------

    /// WHO query.
    pub fn who(&mut self, mask: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(mask, "mask")?;
        self.send_msg(Message::cmd("WHO", [mask]));
        Ok(())
    }

    /// WHOIS query.
    pub fn whois(&mut self, nick: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        self.send_msg(Message::cmd("WHOIS", [nick]));
        Ok(())
    }

    /// WHOWAS query.
    pub fn whowas(&mut self, nick: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        self.send_msg(Message::cmd("WHOWAS", [nick]));
        Ok(())
    }

    /// USERHOST query for up to five nicks.
    pub fn userhost(&mut self, nicks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        if nicks.is_empty() {
            return Err(ClientError::EmptyArgument("nicknames"));
        }
        self.send_msg(Message::cmd("USERHOST", nicks.iter().take(5).copied()));
        Ok(())
    }

    /// ISON query.
    pub fn ison(&mut self, nicks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        if nicks.is_empty() {
            return Err(ClientError::EmptyArgument("nicknames"));
        }
        self.send_msg(Message::cmd("ISON", nicks.iter().copied()));
        Ok(())
    }

    /// Mark away with a message, or return (`None`).
    pub fn away(&mut self, message: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        match message {
            Some(m) => {
                Self::require_cap(m, self.options.away_len, "away message")?;
                self.send_msg(Message::with_trailing("AWAY", [] as [&str; 0], sanitize(m)));
            }
            None => self.send_msg(Message::cmd("AWAY", [] as [&str; 0])),
        }
        Ok(())
    }

    /// OPER up.
    pub fn oper(&mut self, name: &str, password: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(name, "name")?;
        let password = Password::parse(password)?;
        self.send_msg(Message::cmd("OPER", [name, password.as_str()]));
        Ok(())
    }

    /// Global channel LIST, optionally restricted to a mask.
    pub fn list(&mut self, channels: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        match channels {
            Some(c) => self.send_msg(Message::cmd("LIST", [c])),
            None => self.send_msg(Message::cmd("LIST", [] as [&str; 0])),
        }
        Ok(())
    }

    /// LINKS query.
    pub fn links(&mut self, mask: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("LINKS", mask)
    }

    /// Server TIME query.
    pub fn time(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("TIME", target)
    }

    /// Server VERSION query.
    pub fn version(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("VERSION", target)
    }

    /// STATS query.
    pub fn stats(&mut self, query: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("STATS", query)
    }

    /// TRACE query.
    pub fn trace(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("TRACE", target)
    }

    /// SUMMON a user to IRC.
    pub fn summon(&mut self, user: &str, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(user, "user")?;
        match target {
            Some(t) => self.send_msg(Message::cmd("SUMMON", [user, t])),
            None => self.send_msg(Message::cmd("SUMMON", [user])),
        }
        Ok(())
    }

    /// USERS query.
    pub fn users(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("USERS", target)
    }

    /// MOTD query.
    pub fn motd(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("MOTD", target)
    }

    /// LUSERS query.
    pub fn lusers(&mut self) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("LUSERS", None)
    }

    /// ADMIN query.
    pub fn admin(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("ADMIN", target)
    }

    /// INFO query.
    pub fn info(&mut self, target: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("INFO", target)
    }

    /// WALLOPS broadcast (operators).
    pub fn wallops(&mut self, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(text, "message")?;
        self.send_msg(Message::with_trailing("WALLOPS", [] as [&str; 0], sanitize(text)));
        Ok(())
    }

    /// Change real name where the server supports SETNAME.
    pub fn setname(&mut self, realname: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(realname, "realname")?;
        self.send_msg(Message::with_trailing("SETNAME", [] as [&str; 0], sanitize(realname)));
        Ok(())
    }

    /// HELP query.
    pub fn help(&mut self, topic: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("HELP", topic)
    }

    /// RULES query.
    pub fn rules(&mut self) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("RULES", None)
    }

    /// KILL a client off the network (operators).
    pub fn kill(&mut self, nick: &str, comment: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(nick, "nickname")?;
        Self::require_nonempty(comment, "comment")?;
        self.send_msg(Message::with_trailing("KILL", [nick], sanitize(comment)));
        Ok(())
    }

    /// Ask a server to CONNECT to another (operators).
    pub fn connect_server(&mut self, target: &str, port: u16) -> Result<(), ClientError> {
        self.require_registered()?;
        Self::require_nonempty(target, "server")?;
        self.send_msg(Message::cmd("CONNECT", [target.to_string(), port.to_string()]));
        Ok(())
    }

    /// REHASH the server configuration (operators).
    pub fn rehash(&mut self) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("REHASH", None)
    }

    /// DIE: shut the server down (operators).
    pub fn die(&mut self) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("DIE", None)
    }

    /// RESTART the server (operators).
    pub fn restart(&mut self) -> Result<(), ClientError> {
        self.require_registered()?;
        self.send_simple("RESTART", None)
    }

    fn send_simple(&mut self, verb: &str, arg: Option<&str>) -> Result<(), ClientError> {
        match arg {
            Some(a) => self.send_msg(Message::cmd(verb, [a])),
            None => self.send_msg(Message::cmd(verb, [] as [&str; 0])),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Facade: capability-gated commands
    // ------------------------------------------------------------------

    /// KNOCK on an invite-only channel; requires `KNOCK`.
    pub fn knock(&mut self, channel: &str, message: Option<&str>) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.knock {
            return Err(ClientError::NotSupported("KNOCK"));
        }
        let name = ChannelName::parse(channel, self.options.channel_len)?;
        match message {
            Some(m) => self.send_msg(Message::with_trailing("KNOCK", [name.as_str()], sanitize(m))),
            None => self.send_msg(Message::cmd("KNOCK", [name.as_str()])),
        }
        Ok(())
    }

    /// USERIP query; requires `USERIP`.
    pub fn userip(&mut self, nick: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.userip {
            return Err(ClientError::NotSupported("USERIP"));
        }
        Self::require_nonempty(nick, "nickname")?;
        self.send_msg(Message::cmd("USERIP", [nick]));
        Ok(())
    }

    /// CNOTICE: op-to-member notice bypassing flood limits; requires
    /// `CNOTICE`.
    pub fn cnotice(&mut self, nick: &str, channel: &str, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.cnotice {
            return Err(ClientError::NotSupported("CNOTICE"));
        }
        Self::require_nonempty(text, "message")?;
        self.send_msg(Message::with_trailing(
            "CNOTICE",
            [nick, channel],
            sanitize(text),
        ));
        Ok(())
    }

    /// CPRIVMSG: op-to-member message bypassing flood limits; requires
    /// `CPRIVMSG`.
    pub fn cprivmsg(&mut self, nick: &str, channel: &str, text: &str) -> Result<(), ClientError> {
        self.require_registered()?;
        if !self.options.cprivmsg {
            return Err(ClientError::NotSupported("CPRIVMSG"));
        }
        Self::require_nonempty(text, "message")?;
        self.send_msg(Message::with_trailing(
            "CPRIVMSG",
            [nick, channel],
            sanitize(text),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Facade: presence and ignores
    // ------------------------------------------------------------------

    /// Add friends to the presence list; requires MONITOR or WATCH.
    pub fn friends_add(&mut self, nicks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        let backend = self
            .options
            .presence_backend()
            .ok_or(ClientError::NotSupported("MONITOR or WATCH"))?;
        if nicks.is_empty() {
            return Err(ClientError::EmptyArgument("nicknames"));
        }
        if let Some(limit) = self.options.presence_limit() {
            if self.friends.len() + nicks.len() > limit {
                return Err(ClientError::Validation {
                    what: "friend list",
                    reason: format!("server caps the list at {}", limit),
                });
            }
        }
        let mapping = self.mapping();
        let added = self.friends.add(nicks, mapping);
        for line in friends::registration_lines(backend, true, &added) {
            self.send_raw(line);
        }
        Ok(())
    }

    /// Remove friends from the presence list.
    pub fn friends_remove(&mut self, nicks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        let backend = self
            .options
            .presence_backend()
            .ok_or(ClientError::NotSupported("MONITOR or WATCH"))?;
        let mapping = self.mapping();
        let removed = self.friends.remove(nicks, mapping);
        for line in friends::registration_lines(backend, false, &removed) {
            self.send_raw(line);
        }
        Ok(())
    }

    /// Add ignore masks; requires `SILENCE`.
    pub fn ignores_add(&mut self, masks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        if self.options.silence.is_none() {
            return Err(ClientError::NotSupported("SILENCE"));
        }
        if masks.is_empty() {
            return Err(ClientError::EmptyArgument("masks"));
        }
        let mapping = self.mapping();
        let network = self.options.network.clone();
        let mut fresh = Vec::new();
        for &mask in masks {
            if self.ignores.add(mask, network.as_deref(), mapping) {
                fresh.push(mask);
            }
        }
        for line in ignore::silence_lines(true, &fresh) {
            self.send_raw(line);
        }
        Ok(())
    }

    /// Remove ignore masks.
    pub fn ignores_remove(&mut self, masks: &[&str]) -> Result<(), ClientError> {
        self.require_registered()?;
        if self.options.silence.is_none() {
            return Err(ClientError::NotSupported("SILENCE"));
        }
        let mapping = self.mapping();
        let mut present = Vec::new();
        for &mask in masks {
            if self.ignores.remove(mask, mapping) {
                present.push(mask);
            }
        }
        for line in ignore::silence_lines(false, &present) {
            self.send_raw(line);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal projection plumbing (used by dispatch)
    // ------------------------------------------------------------------

    pub(crate) fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let mapping = self.options.case_mapping;
        self.channels.iter_mut().find(|c| mapping.eq(&c.name, name))
    }

    pub(crate) fn ensure_channel(&mut self, name: &str) -> &mut Channel {
        let mapping = self.options.case_mapping;
        if let Some(idx) = self
            .channels
            .iter()
            .position(|c| mapping.eq(&c.name, name))
        {
            let chan = &mut self.channels[idx];
            if !chan.is_active {
                *chan = Channel::new(name);
            }
            chan
        } else {
            self.channels.push(Channel::new(name));
            self.channels.last_mut().unwrap()
        }
    }

    pub(crate) fn ensure_query(&mut self, peer: &str) -> &mut PrivateMessage {
        let mapping = self.options.case_mapping;
        if let Some(idx) = self.queries.iter().position(|q| mapping.eq(&q.peer, peer)) {
            &mut self.queries[idx]
        } else {
            self.queries.push(PrivateMessage::new(peer));
            self.queries.last_mut().unwrap()
        }
    }

    pub(crate) fn user_from_prefix(&self, msg: &Message) -> Option<ChannelUser> {
        let prefix = msg.prefix.as_ref()?;
        let nick = prefix.nick()?;
        let mut user = ChannelUser::new(nick);
        user.user = prefix.user().map(str::to_string);
        user.host = prefix.host().map(str::to_string);
        Some(user)
    }
}

/// Clamp to the 510-octet budget and terminate with CRLF.
fn frame(mut line: String) -> String {
    let budget = MAX_LINE_LEN - 2;
    if line.len() > budget {
        let mut cut = budget;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    line.push_str("\r\n");
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(SessionConfig::new("alice", "alice", "Alice R")).unwrap()
    }

    fn registered_engine() -> Engine {
        let mut e = engine();
        e.on_connecting();
        e.on_transport_connected();
        e.handle_line(":srv 001 alice :Welcome to the network");
        e.drain_outbound();
        e.drain_events();
        e
    }

    #[test]
    fn test_registration_burst_order() {
        let mut e = Engine::new(
            SessionConfig::new("alice", "alice", "Alice R").with_password("sekrit"),
        )
        .unwrap();
        e.on_connecting();
        e.on_transport_connected();
        let out = e.drain_outbound();
        assert_eq!(out[0], "PASS sekrit\r\n");
        assert_eq!(out[1], "NICK alice\r\n");
        assert_eq!(out[2], "USER alice 8 * :Alice R\r\n");
    }

    #[test]
    fn test_state_transitions_emit_events() {
        let mut e = engine();
        e.on_connecting();
        e.on_transport_connected();
        e.handle_line(":srv 001 alice :Welcome");
        let events = e.drain_events();
        let states: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                Event::ConnectionStateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Registered,
            ]
        );
    }

    #[test]
    fn test_commands_require_registration() {
        let mut e = engine();
        assert!(matches!(
            e.join("#rust", None),
            Err(ClientError::WrongState { .. })
        ));
        assert!(e.drain_outbound().is_empty());
    }

    #[test]
    fn test_privmsg_to_self_rejected() {
        let mut e = registered_engine();
        assert!(matches!(e.privmsg("alice", "hi"), Err(ClientError::TargetIsSelf)));
        assert!(matches!(e.privmsg("ALICE", "hi"), Err(ClientError::TargetIsSelf)));
        assert!(e.drain_outbound().is_empty());
    }

    #[test]
    fn test_privmsg_split_preserves_target_prefix() {
        let mut e = registered_engine();
        let body = "x".repeat(1000);
        e.privmsg("#rust", &body).unwrap();
        let out = e.drain_outbound();
        assert!(out.len() >= 2);
        for line in &out {
            assert!(line.starts_with("PRIVMSG #rust :"));
            assert!(line.len() <= MAX_LINE_LEN);
            assert!(line.ends_with("\r\n"));
        }
        let rejoined: String = out
            .iter()
            .map(|l| l.trim_start_matches("PRIVMSG #rust :").trim_end())
            .collect();
        assert_eq!(rejoined, body);
    }

    #[test]
    fn test_join_respects_chanlimit() {
        let mut e = registered_engine();
        e.handle_line(":srv 005 alice CHANLIMIT=#:2 :are supported");
        for name in ["#a", "#b"] {
            e.join(name, None).unwrap();
            e.handle_line(&format!(":alice!u@h JOIN :{}", name));
        }
        assert!(matches!(
            e.join("#c", None),
            Err(ClientError::TooManyChannels(2))
        ));
    }

    #[test]
    fn test_nick_cap_after_isupport() {
        let mut e = registered_engine();
        e.handle_line(":srv 005 alice NICKLEN=16 :are supported");
        assert!(e.nick("exactly16charsok").is_ok());
        assert!(matches!(
            e.nick("seventeencharslng"),
            Err(ClientError::NameTooLong { max: 16, .. })
        ));
    }

    #[test]
    fn test_facility_gating() {
        let mut e = registered_engine();
        assert!(matches!(e.knock("#x", None), Err(ClientError::NotSupported("KNOCK"))));
        assert!(matches!(e.userip("bob"), Err(ClientError::NotSupported("USERIP"))));
        assert!(matches!(
            e.friends_add(&["bob"]),
            Err(ClientError::NotSupported(_))
        ));
        assert!(matches!(
            e.ignores_add(&["*!*@x"]),
            Err(ClientError::NotSupported("SILENCE"))
        ));

        e.handle_line(":srv 005 alice KNOCK USERIP MONITOR=100 SILENCE=15 :are supported");
        assert!(e.knock("#x", None).is_ok());
        assert!(e.userip("bob").is_ok());
        assert!(e.friends_add(&["bob"]).is_ok());
        assert!(e.ignores_add(&["*!*@x"]).is_ok());
    }

    #[test]
    fn test_outbound_clamped_to_512() {
        let mut e = registered_engine();
        e.raw(&format!("TOPIC #x :{}", "y".repeat(2000))).unwrap();
        let out = e.drain_outbound();
        assert_eq!(out.len(), 1);
        assert!(out[0].len() <= MAX_LINE_LEN);
        assert!(out[0].ends_with("\r\n"));
    }

    #[test]
    fn test_quit_suppresses_reconnect() {
        let mut e = registered_engine();
        assert!(e.wants_reconnect());
        e.quit(Some("bye"));
        e.on_transport_closed();
        assert!(!e.wants_reconnect());
        assert_eq!(e.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_mode_permission_gate() {
        let mut e = registered_engine();
        e.handle_line(":alice!u@h JOIN :#test");
        e.handle_line(":srv 353 alice = #test :alice @bob");
        e.handle_line(":srv 366 alice #test :End");

        // Not an operator: op grants and plain channel modes are denied.
        let err = e
            .set_channel_modes("#test", &[ModeChange::plus('o').with_param("bob")])
            .unwrap_err();
        assert!(matches!(err, ClientError::PermissionDenied("operator")));
        assert!(e.drain_outbound().is_empty());

        // Promote us; now it goes through.
        e.handle_line(":bob!u@h MODE #test +o alice");
        e.set_channel_modes("#test", &[ModeChange::plus('o').with_param("bob")])
            .unwrap();
        let out = e.drain_outbound();
        assert_eq!(out, vec!["MODE #test +o bob\r\n"]);
    }
}
