//! End-to-end engine scenarios against scripted server transcripts.
//!
//! Each test plays a server-side script into the sans-IO engine and
//! asserts on the outbound lines and events it produces, covering the
//! full registration / negotiation / channel / presence surface without
//! a socket.

use slirc_core::engine::{ConnectionState, Engine, SessionConfig};
use slirc_core::{ClientError, Event, ModeChange, MAX_LINE_LEN};

fn fresh_engine() -> Engine {
    Engine::new(SessionConfig::new("Alice", "alice", "Alice R")).unwrap()
}

fn registered() -> Engine {
    let mut engine = fresh_engine();
    engine.on_connecting();
    engine.on_transport_connected();
    engine.handle_line(":srv 001 Alice :Welcome to ExampleNet, Alice");
    engine.drain_outbound();
    engine.drain_events();
    engine
}

fn state_changes(events: &[Event]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|ev| match ev {
            Event::ConnectionStateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

// ----------------------------------------------------------------------
// Scenario 1: registration handshake
// ----------------------------------------------------------------------

#[test]
fn registration_handshake() {
    let mut engine = fresh_engine();
    engine.on_connecting();
    engine.on_transport_connected();

    let out = engine.drain_outbound();
    assert_eq!(out, vec!["NICK Alice\r\n", "USER alice 8 * :Alice R\r\n"]);

    engine.handle_line(":srv 001 Alice :Welcome to ExampleNet, Alice");
    assert_eq!(engine.state(), ConnectionState::Registered);

    // Connecting -> Connected -> Registered: the transcript-visible pair
    // plus the initial dial.
    let events = engine.drain_events();
    assert_eq!(
        state_changes(&events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Registered,
        ]
    );
}

// ----------------------------------------------------------------------
// Scenario 2: ISUPPORT negotiation
// ----------------------------------------------------------------------

#[test]
fn isupport_negotiation() {
    let mut engine = registered();
    engine.handle_line(
        ":srv 005 Alice NETWORK=Foo NICKLEN=16 CHANMODES=beI,k,l,mnt PREFIX=(ohv)@%+ :are supported by this server",
    );

    let opts = engine.options();
    assert_eq!(opts.network.as_deref(), Some("Foo"));
    assert_eq!(opts.nick_len, 16);
    assert_eq!(opts.chan_modes.list, "beI");
    assert_eq!(opts.prefix.mode_for_sigil('%'), Some('h'));

    // A 20-char nick now fails synchronously, before any I/O.
    let err = engine.nick("twentycharacternickk").unwrap_err();
    assert!(matches!(err, ClientError::NameTooLong { max: 16, .. }));
    assert!(engine.drain_outbound().is_empty());
}

// ----------------------------------------------------------------------
// Scenario 3: channel join with roster
// ----------------------------------------------------------------------

#[test]
fn channel_join_with_roster() {
    let mut engine = registered();
    engine.join("#test", None).unwrap();
    assert_eq!(engine.drain_outbound(), vec!["JOIN #test\r\n"]);

    engine.handle_line(":Alice!u@h JOIN :#test");
    engine.handle_line(":srv 353 Alice = #test :@Alice +bob charlie");
    engine.handle_line(":srv 366 Alice #test :End of NAMES list");

    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|ev| matches!(ev, Event::ChannelJoined(c) if c == "#test")));
    assert!(events
        .iter()
        .any(|ev| matches!(ev, Event::UserListReceived(c) if c == "#test")));

    let mapping = engine.options().case_mapping;
    let chan = engine.channel("#test").unwrap();
    assert_eq!(chan.user_count(), 3);
    assert!(chan.user("Alice", mapping).unwrap().is_operator);
    assert!(chan.user("bob", mapping).unwrap().is_voiced);
    let charlie = chan.user("charlie", mapping).unwrap();
    assert!(!charlie.is_operator && !charlie.is_half_op && !charlie.is_voiced);

    // The ClientUser pointer is the op entry.
    let me = chan.client_user(engine.nickname(), mapping).unwrap();
    assert!(me.is_operator);
}

// ----------------------------------------------------------------------
// Scenario 4: mode change with user prefix
// ----------------------------------------------------------------------

#[test]
fn mode_change_with_user_prefix() {
    let mut engine = registered();
    engine.handle_line(":Alice!u@h JOIN :#test");
    engine.handle_line(":srv 353 Alice = #test :Alice bob");
    engine.handle_line(":srv 366 Alice #test :End of NAMES list");
    engine.drain_events();

    engine.handle_line(":x!u@h MODE #test +ov bob Alice");

    let mapping = engine.options().case_mapping;
    let chan = engine.channel("#test").unwrap();
    assert!(chan.user("bob", mapping).unwrap().is_operator);
    assert!(chan.user("Alice", mapping).unwrap().is_voiced);
    // User-status modes never land in the channel's own mode string.
    assert!(chan.modes.is_none());

    let events = engine.drain_events();
    assert!(events.iter().any(|ev| matches!(
        ev,
        Event::ModeChanged { channel, by, changes }
            if channel == "#test" && by == "x" && changes.len() == 2
    )));
}

// ----------------------------------------------------------------------
// Scenario 5: CTCP PING round trip
// ----------------------------------------------------------------------

#[test]
fn ctcp_ping_round_trip() {
    let mut engine = registered();
    engine.ctcp_ping("bob").unwrap();

    let out = engine.drain_outbound();
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("PRIVMSG bob :\u{1}PING "));
    assert!(out[0].trim_end().ends_with('\u{1}'));

    // Replay the timestamp we sent, as the peer's reply.
    let token = out[0]
        .trim_end()
        .trim_start_matches("PRIVMSG bob :\u{1}PING ")
        .trim_end_matches('\u{1}')
        .to_string();
    engine.handle_line(&format!(":bob!u@h NOTICE Alice :\u{1}PING {}\u{1}", token));

    let events = engine.drain_events();
    assert!(events.iter().any(|ev| matches!(
        ev,
        Event::NoticeReceived { is_ctcp_reply: true, from, .. } if from == "bob"
    )));
    let latency = events
        .iter()
        .find_map(|ev| match ev {
            Event::CtcpPingReply { latency_secs, .. } => Some(*latency_secs),
            _ => None,
        })
        .expect("latency computed");
    assert!(latency >= 0);
}

// ----------------------------------------------------------------------
// Scenario 6: auto-reconnect batched rejoin
// ----------------------------------------------------------------------

#[test]
fn auto_reconnect_batched_rejoin() {
    let mut engine = registered();
    engine.handle_line(":Alice!u@h JOIN :#a");
    engine.handle_line(":Alice!u@h JOIN :#b");
    engine.drain_events();
    engine.drain_outbound();

    // Unexpected transport close: not user-initiated.
    engine.on_transport_closed();
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    assert!(engine.wants_reconnect());

    // The runner dials again and re-registers.
    engine.on_connecting();
    engine.on_transport_connected();
    engine.drain_outbound();
    engine.handle_line(":srv 001 Alice :Welcome back");

    let out = engine.drain_outbound();
    let joins: Vec<&String> = out.iter().filter(|l| l.starts_with("JOIN")).collect();
    assert_eq!(joins, vec!["JOIN #a,#b\r\n"], "one batched JOIN, not two");
}

// ----------------------------------------------------------------------
// Registration recovery (433 before / after 001)
// ----------------------------------------------------------------------

#[test]
fn nick_collision_before_welcome_retries_and_registers() {
    let mut engine = fresh_engine();
    engine.on_connecting();
    engine.on_transport_connected();
    engine.drain_outbound();

    engine.handle_line(":srv 433 * Alice :Nickname is already in use");
    let out = engine.drain_outbound();
    assert_eq!(out.len(), 1);
    let retry = out[0].trim_end().trim_start_matches("NICK ").to_string();
    assert!(retry.starts_with("Alice"));
    assert_eq!(retry.len(), "Alice".len() + 4);
    assert!(retry[5..].chars().all(|c| c.is_ascii_digit()));

    engine.handle_line(&format!(":srv 001 {} :Welcome", retry));
    assert_eq!(engine.state(), ConnectionState::Registered);
    assert_eq!(engine.nickname(), retry);
}

#[test]
fn nick_collision_after_welcome_only_surfaces() {
    let mut engine = registered();
    engine.handle_line(":srv 433 Alice wanted :Nickname is already in use");
    assert!(engine.drain_outbound().is_empty());
    assert_eq!(engine.nickname(), "Alice");
    assert!(engine.drain_events().iter().any(|ev| matches!(
        ev,
        Event::ServerErrorReceived(slirc_core::ServerError::NicknameInUse(n)) if n == "wanted"
    )));
}

// ----------------------------------------------------------------------
// ISUPPORT reset between registrations
// ----------------------------------------------------------------------

#[test]
fn options_reset_on_each_registration() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice NICKLEN=16 MONITOR=50 :are supported");
    assert_eq!(engine.options().nick_len, 16);

    engine.on_transport_closed();
    engine.on_connecting();
    engine.on_transport_connected();
    engine.handle_line(":srv 001 Alice :Welcome back");

    // Defaults until the new server's 005 lines arrive.
    assert_eq!(engine.options().nick_len, 28);
    assert!(engine.options().monitor.is_none());
}

// ----------------------------------------------------------------------
// Friend facility unification
// ----------------------------------------------------------------------

#[test]
fn friends_use_monitor_when_only_monitor() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice MONITOR=100 :are supported");
    engine.friends_add(&["n1", "n2"]).unwrap();
    let out = engine.drain_outbound();
    assert_eq!(out, vec!["MONITOR + n1,n2\r\n"]);
    assert!(!out.iter().any(|l| l.starts_with("WATCH")));
}

#[test]
fn friends_use_watch_when_only_watch() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice WATCH=128 :are supported");
    engine.friends_add(&["n1", "n2"]).unwrap();
    assert_eq!(engine.drain_outbound(), vec!["WATCH +n1 +n2\r\n"]);
}

#[test]
fn friends_prefer_monitor_when_both() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice WATCH=128 MONITOR=100 :are supported");
    engine.friends_add(&["n1"]).unwrap();
    assert_eq!(engine.drain_outbound(), vec!["MONITOR + n1\r\n"]);
}

#[test]
fn friends_reregistered_after_reconnect() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice MONITOR=100 :are supported");
    engine.friends_add(&["n1", "n2"]).unwrap();
    engine.drain_outbound();

    engine.on_transport_closed();
    engine.on_connecting();
    engine.on_transport_connected();
    engine.handle_line(":srv 001 Alice :Welcome back");
    engine.drain_outbound();

    // Entries survived; the new 005 triggers one batched registration.
    engine.handle_line(":srv 005 Alice MONITOR=100 :are supported");
    assert_eq!(engine.drain_outbound(), vec!["MONITOR + n1,n2\r\n"]);
}

// ----------------------------------------------------------------------
// Outbound length bound
// ----------------------------------------------------------------------

#[test]
fn outbound_lines_never_exceed_512_octets() {
    let mut engine = registered();
    let body = "лorem ipsum ".repeat(200);
    engine.privmsg("#channel", &body).unwrap();

    let out = engine.drain_outbound();
    assert!(out.len() > 1);
    for line in &out {
        assert!(line.len() <= MAX_LINE_LEN, "{} octets", line.len());
        assert!(line.ends_with("\r\n"));
        assert!(line.starts_with("PRIVMSG #channel :"));
    }
    let last_chunk = out
        .last()
        .unwrap()
        .trim_start_matches("PRIVMSG #channel :")
        .trim_end();
    assert!(!last_chunk.is_empty(), "final chunk must not be empty");
}

// ----------------------------------------------------------------------
// Self-message rejection
// ----------------------------------------------------------------------

#[test]
fn private_message_to_self_fails_synchronously() {
    let mut engine = registered();
    assert!(matches!(
        engine.privmsg("Alice", "hello me"),
        Err(ClientError::TargetIsSelf)
    ));
    // Case-folded comparison catches decorated spellings too.
    assert!(matches!(
        engine.privmsg("alice", "hello me"),
        Err(ClientError::TargetIsSelf)
    ));
    assert!(engine.drain_outbound().is_empty());
}

// ----------------------------------------------------------------------
// Case-fold equivalence across the API
// ----------------------------------------------------------------------

#[test]
fn join_and_part_fold_to_the_same_channel() {
    let mut engine = registered();
    engine.handle_line(":Alice!u@h JOIN :#Foo");
    assert!(engine.channel("#foo").unwrap().is_active);

    engine.handle_line(":Alice!u@h PART #foo");
    let chan = engine.channel("#Foo").unwrap();
    assert!(!chan.is_active);
    assert_eq!(engine.channels().count(), 1, "same entry, not a second one");
}

#[test]
fn rfc1459_fold_applies_to_nicks() {
    let mut engine = registered();
    engine.handle_line(":Alice!u@h JOIN :#test");
    engine.handle_line(":srv 353 Alice = #test :Alice bob[away]");
    let mapping = engine.options().case_mapping;
    let chan = engine.channel("#test").unwrap();
    // [] folds to {} under rfc1459.
    assert!(chan.user("BOB{AWAY}", mapping).is_some());
}

// ----------------------------------------------------------------------
// ISUPPORT-driven mode parameter consumption (end to end)
// ----------------------------------------------------------------------

#[test]
fn isupport_drives_mode_param_consumption() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice CHANMODES=beI,k,l,mnt PREFIX=(ohv)@%+ :are supported");
    engine.handle_line(":Alice!u@h JOIN :#x");
    engine.handle_line(":srv 353 Alice = #x :@Alice alice2");
    engine.drain_events();

    engine.handle_line(":op!u@h MODE #x +klo-b secret 50 Alice *!*@host");

    let events = engine.drain_events();
    let changes = events
        .iter()
        .find_map(|ev| match ev {
            Event::ModeChanged { changes, .. } => Some(changes.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        changes,
        vec![
            ModeChange::plus('k').with_param("secret"),
            ModeChange::plus('l').with_param("50"),
            ModeChange::plus('o').with_param("Alice"),
            ModeChange::minus('b').with_param("*!*@host"),
        ]
    );

    let chan = engine.channel("#x").unwrap();
    let modes = chan.modes.as_ref().unwrap();
    assert_eq!(modes.param_for('k'), Some("secret"));
    assert_eq!(modes.param_for('l'), Some("50"));
    assert!(!modes.contains('o'), "o went to the user, not the channel");
}

// ----------------------------------------------------------------------
// Double-mode suppression across JOIN
// ----------------------------------------------------------------------

#[test]
fn mode_324_before_and_after_join_applies_once() {
    let mut engine = registered();

    // Some servers volunteer 324 before our join settles.
    engine.handle_line(":Alice!u@h JOIN :#test");
    engine.handle_line(":srv 324 Alice #test +nt");
    engine.handle_line(":srv 324 Alice #test +si");

    let chan = engine.channel("#test").unwrap();
    let modes = chan.modes.as_ref().unwrap();
    assert!(modes.contains('n') && modes.contains('t'));
    assert!(!modes.contains('s') && !modes.contains('i'));
}

// ----------------------------------------------------------------------
// PROTOCTL responses and UHNAMES rosters
// ----------------------------------------------------------------------

#[test]
fn namesx_uhnames_trigger_protoctl_and_decorate_roster() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice NAMESX UHNAMES :are supported");
    let out = engine.drain_outbound();
    assert_eq!(out, vec!["PROTOCTL NAMESX\r\n", "PROTOCTL UHNAMES\r\n"]);

    engine.handle_line(":Alice!u@h JOIN :#test");
    engine.handle_line(":srv 353 Alice = #test :@+bob!ident@host.example Alice");
    let mapping = engine.options().case_mapping;
    let chan = engine.channel("#test").unwrap();
    let bob = chan.user("bob", mapping).unwrap();
    assert!(bob.is_operator && bob.is_voiced);
    assert_eq!(bob.user.as_deref(), Some("ident"));
    assert_eq!(bob.host.as_deref(), Some("host.example"));
}

// ----------------------------------------------------------------------
// NETWORK change resets projections
// ----------------------------------------------------------------------

#[test]
fn network_change_resets_projections() {
    let mut engine = registered();
    engine.handle_line(":srv 005 Alice NETWORK=Foo :are supported");
    engine.handle_line(":Alice!u@h JOIN :#test");
    assert!(engine.channel("#test").is_some());

    engine.handle_line(":srv 005 Alice NETWORK=Bar :are supported");
    assert!(engine.channel("#test").is_none());
    assert!(engine
        .drain_events()
        .iter()
        .any(|ev| matches!(ev, Event::NetworkChanged(n) if n == "Bar")));
}

// ----------------------------------------------------------------------
// SILENCE facility
// ----------------------------------------------------------------------

#[test]
fn silence_gated_and_batched() {
    let mut engine = registered();
    assert!(matches!(
        engine.ignores_add(&["*!*@spam.example"]),
        Err(ClientError::NotSupported("SILENCE"))
    ));

    engine.handle_line(":srv 005 Alice SILENCE=15 :are supported");
    engine.ignores_add(&["*!*@spam.example", "*!*@flood.example"]).unwrap();
    assert_eq!(
        engine.drain_outbound(),
        vec!["SILENCE +*!*@spam.example +*!*@flood.example\r\n"]
    );

    engine.ignores_remove(&["*!*@spam.example"]).unwrap();
    assert_eq!(engine.drain_outbound(), vec!["SILENCE -*!*@spam.example\r\n"]);
    assert_eq!(engine.ignores().len(), 1);
}
