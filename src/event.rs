//! Events published by the protocol engine.
//!
//! Every inbound line the engine understands becomes one or more typed
//! events; projections and application code filter the stream by payload
//! identity (channel name, peer nick). Lines the engine does not
//! understand are surfaced, not dropped: unknown numerics and verbs get
//! generic variants, and malformed lines get [`Event::ParseError`] with
//! the raw text.

use chrono::{DateTime, Utc};

use crate::ctcp::CtcpCommand;
use crate::dcc::DccRequest;
use crate::engine::whois::{WhoisInfo, WhowasInfo};
use crate::engine::ConnectionState;
use crate::error::MessageParseError;
use crate::message::Message;
use crate::mode::ModeChange;

/// Typed server errors the dispatcher recognizes in the 4xx/5xx range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerError {
    /// 433 after registration — the requested nick is taken.
    NicknameInUse(String),
    /// 447 — nick changes are disallowed here.
    CannotChangeNick(String),
    /// 436 — nickname collision KILL.
    NicknameCollision(String),
    /// 405 — joining would exceed the server's channel cap.
    TooManyChannels(String),
    /// 473 — the channel is invite-only.
    InviteOnlyChannel(String),
    /// 439 — target changed too fast.
    TargetTooFast(String),
}

/// One event from the engine.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// The connection state machine moved.
    ConnectionStateChanged(ConnectionState),
    /// The server identified its network (ISUPPORT `NETWORK`).
    NetworkChanged(String),
    /// Our nickname changed (either as requested or forced).
    OwnNickChanged {
        /// Previous nick.
        old: String,
        /// Current nick.
        new: String,
    },

    /// A PRIVMSG to us or to a channel we are on.
    MessageReceived {
        /// Sender nick (or server name).
        from: String,
        /// Target as addressed: channel name, our nick, or a
        /// STATUSMSG-prefixed channel.
        target: String,
        /// Message body.
        text: String,
    },
    /// A NOTICE.
    NoticeReceived {
        /// Sender nick (or server name).
        from: String,
        /// Target as addressed.
        target: String,
        /// Notice body.
        text: String,
        /// Whether this notice carried a CTCP reply envelope.
        is_ctcp_reply: bool,
    },
    /// A CTCP ACTION (emote).
    EmoteReceived {
        /// Sender nick.
        from: String,
        /// Target as addressed.
        target: String,
        /// Emote body.
        text: String,
    },
    /// A CTCP query arrived (already auto-answered where applicable).
    CtcpRequested {
        /// Sender nick.
        from: String,
        /// The query.
        command: CtcpCommand,
        /// Its argument, if any.
        argument: Option<String>,
    },
    /// A CTCP PING reply arrived; latency computed from its timestamp.
    CtcpPingReply {
        /// Peer nick.
        from: String,
        /// Round-trip seconds (never negative).
        latency_secs: i64,
    },
    /// A DCC negotiation request arrived.
    DccRequested {
        /// Offering peer.
        from: String,
        /// The parsed negotiation.
        request: DccRequest,
    },

    /// We joined a channel.
    ChannelJoined(String),
    /// We left a channel (PART or server-initiated removal).
    ChannelLeft(String),
    /// We were kicked from a channel.
    KickedFromChannel {
        /// The channel.
        channel: String,
        /// Who kicked us.
        by: String,
        /// Kick reason, if given.
        reason: Option<String>,
    },
    /// A peer joined a channel we are on.
    UserJoined {
        /// The channel.
        channel: String,
        /// Their nick.
        nick: String,
    },
    /// A peer left a channel we are on.
    UserParted {
        /// The channel.
        channel: String,
        /// Their nick.
        nick: String,
        /// Part message, if given.
        reason: Option<String>,
    },
    /// A peer was kicked from a channel we are on.
    UserKicked {
        /// The channel.
        channel: String,
        /// The removed nick.
        nick: String,
        /// Who kicked them.
        by: String,
        /// Kick reason, if given.
        reason: Option<String>,
    },
    /// A peer quit the network.
    UserQuit {
        /// Their nick.
        nick: String,
        /// Quit message, if given.
        reason: Option<String>,
    },
    /// A peer changed nick.
    NickChanged {
        /// Previous nick.
        old: String,
        /// New nick.
        new: String,
    },

    /// Channel topic text (332 or TOPIC).
    TopicChanged {
        /// The channel.
        channel: String,
        /// New topic; `None` when cleared.
        topic: Option<String>,
        /// Who set it, when known (TOPIC verb).
        by: Option<String>,
    },
    /// Topic attribution (333).
    TopicAuthorReceived {
        /// The channel.
        channel: String,
        /// Author, when the server included one.
        author: Option<String>,
        /// Set time, when the server included one.
        set_at: Option<DateTime<Utc>>,
    },
    /// A channel MODE was applied.
    ModeChanged {
        /// The channel.
        channel: String,
        /// Who changed it.
        by: String,
        /// The applied changes in order.
        changes: Vec<ModeChange>,
    },
    /// Our own umode set changed.
    ClientModeChanged {
        /// The applied changes in order.
        changes: Vec<ModeChange>,
    },
    /// The initial NAMES roster for a channel is complete (366).
    UserListReceived(String),
    /// One entry of a ban/exception/invite list (367/348/346).
    ChannelListEntryReceived {
        /// The channel.
        channel: String,
        /// Which list: `b`, `e`, or `I`.
        list: char,
        /// The mask.
        mask: String,
    },
    /// A LIST reply row (322).
    GlobalListItem {
        /// Channel name.
        channel: String,
        /// Visible user count.
        users: usize,
        /// Topic text.
        topic: String,
    },
    /// End of LIST (323).
    GlobalListEnd,

    /// A complete WHOIS result (emitted on 318).
    WhoisReceived(WhoisInfo),
    /// A complete WHOWAS result (emitted on 369).
    WhowasReceived(WhowasInfo),
    /// Away status: 301 for peers, 305/306 for ourselves.
    AwayChanged {
        /// Whose status; our own nick for 305/306.
        nick: String,
        /// Away or back.
        is_away: bool,
        /// Away text, when given.
        message: Option<String>,
    },
    /// ISON reply (303).
    IsonReply(Vec<String>),
    /// USERHOST reply (302).
    UserhostReply(Vec<String>),
    /// We were invited to a channel.
    Invited {
        /// The channel.
        channel: String,
        /// Inviting nick.
        by: String,
    },
    /// A watched friend went online or offline.
    FriendStatusChanged {
        /// Their nick.
        nick: String,
        /// Current presence.
        online: bool,
    },

    /// A recognized server error numeric.
    ServerErrorReceived(ServerError),
    /// Any other 4xx/5xx numeric.
    ErrorReceived {
        /// The numeric.
        numeric: u16,
        /// Raw text (params joined with the trailing).
        text: String,
    },
    /// The server sent an ERROR verb; the link is going away.
    ServerClosedLink(String),
    /// A numeric the dispatcher has no handler for.
    UnhandledNumeric(Message),
    /// A verb the dispatcher has no handler for.
    UnhandledCommand(Message),
    /// An inbound line that did not parse. The session continues.
    ParseError {
        /// The raw line.
        raw: String,
        /// Why it failed.
        error: MessageParseError,
    },
}
