//! Inbound message dispatch.
//!
//! One entry point, [`Engine::dispatch`], branches on whether the command
//! parses as a three-digit numeric or is a verb. Handlers are projections
//! from `Message` plus the current option map onto state mutations and
//! events; none of them performs I/O (the PONG answer and CTCP
//! auto-replies only queue lines). Numerics and verbs without a handler
//! are surfaced through the generic unhandled events rather than dropped.

use chrono::{TimeZone, Utc};

use crate::ctcp::{Ctcp, CtcpCommand};
use crate::dcc::DccRequest;
use crate::error::{MessageParseError, ModeParseError};
use crate::event::{Event, ServerError};
use crate::message::Message;
use crate::mode::{parse_channel_modes, parse_client_modes};
use crate::prefix::Prefix;

use super::channel::{ChannelUser, MaskList};
use super::whois::{WhoisInfo, WhowasInfo};
use super::{ConnectionState, Engine, ServerInfo};

impl Engine {
    pub(crate) fn dispatch(&mut self, msg: Message) {
        match msg.numeric() {
            Some(numeric) => self.dispatch_numeric(numeric, msg),
            None => self.dispatch_verb(msg),
        }
    }

    // ==================================================================
    // Numerics
    // ==================================================================

    fn dispatch_numeric(&mut self, numeric: u16, msg: Message) {
        match numeric {
            1 => self.on_registered(msg.param(0)),
            4 => {
                self.server_info = Some(ServerInfo {
                    name: msg.param(1).unwrap_or_default().to_string(),
                    version: msg.param(2).unwrap_or_default().to_string(),
                    user_modes: msg.param(3).unwrap_or_default().to_string(),
                    channel_modes: msg.param(4).unwrap_or_default().to_string(),
                });
            }
            5 => {
                // First param is our nick, the trailing is prose.
                let tokens: Vec<&str> = msg.params.iter().skip(1).map(String::as_str).collect();
                let effects = self.options.digest(&tokens);
                self.apply_option_effects(effects);
            }

            // --- away ---
            301 => {
                let nick = msg.param(1).unwrap_or_default().to_string();
                self.emit(Event::AwayChanged {
                    nick,
                    is_away: true,
                    message: msg.trailing.clone(),
                });
            }
            305 | 306 => {
                self.away = numeric == 306;
                let nick = self.nick.clone();
                self.emit(Event::AwayChanged {
                    nick,
                    is_away: numeric == 306,
                    message: None,
                });
            }

            // --- simple query replies ---
            302 => {
                let entries = split_reply_list(&msg);
                self.emit(Event::UserhostReply(entries));
            }
            303 => {
                let entries = split_reply_list(&msg);
                self.emit(Event::IsonReply(entries));
            }

            // --- WHOIS accumulation, emitted on 318 ---
            311 => {
                let (user, host) = (
                    msg.param(2).unwrap_or_default().to_string(),
                    msg.param(3).unwrap_or_default().to_string(),
                );
                let realname = msg.trailing.clone();
                self.whois_entry(&nick_param(&msg))
                    .apply_user(&user, &host, realname.as_deref());
            }
            312 => {
                let server = msg.param(2).unwrap_or_default().to_string();
                let info = msg.trailing.clone();
                let nick = nick_param(&msg);
                // WHOWAS answers also carry 312 for the last-seen server.
                if let Some(whowas) = self.whowas.as_mut() {
                    whowas.server = Some(server);
                } else {
                    self.whois_entry(&nick).apply_server(&server, info.as_deref());
                }
            }
            313 => self.whois_entry(&nick_param(&msg)).is_operator = true,
            317 => {
                let idle = msg.param(2).unwrap_or_default().to_string();
                let signon = msg.param(3).map(str::to_string);
                self.whois_entry(&nick_param(&msg))
                    .apply_idle(&idle, signon.as_deref());
            }
            319 => {
                if let Some(list) = msg.trailing.clone() {
                    self.whois_entry(&nick_param(&msg)).apply_channels(&list);
                }
            }
            330 => {
                let account = msg.param(2).map(str::to_string);
                self.whois_entry(&nick_param(&msg)).account = account;
            }
            335 => self.whois_entry(&nick_param(&msg)).is_bot = true,
            338 => {
                let actual = msg
                    .param(2)
                    .map(str::to_string)
                    .or_else(|| msg.trailing.clone());
                self.whois_entry(&nick_param(&msg)).actual_host = actual;
            }
            378 => {
                let from = msg.trailing.clone();
                self.whois_entry(&nick_param(&msg)).connecting_from = from;
            }
            671 => self.whois_entry(&nick_param(&msg)).is_secure = true,
            318 => {
                if let Some(info) = self.whois.take() {
                    self.emit(Event::WhoisReceived(info));
                }
            }

            // --- WHOWAS, emitted on 369 ---
            314 => {
                let mut info = WhowasInfo::new(&nick_param(&msg));
                info.user = msg.param(2).map(str::to_string);
                info.host = msg.param(3).map(str::to_string);
                info.realname = msg.trailing.clone();
                self.whowas = Some(info);
            }
            369 => {
                if let Some(info) = self.whowas.take() {
                    self.emit(Event::WhowasReceived(info));
                }
            }

            // --- global channel list ---
            321 => {}
            322 => {
                let channel = msg.param(1).unwrap_or_default().to_string();
                let users = msg.param(2).and_then(|n| n.parse().ok()).unwrap_or(0);
                let topic = msg.trailing.clone().unwrap_or_default();
                self.emit(Event::GlobalListItem {
                    channel,
                    users,
                    topic,
                });
            }
            323 => self.emit(Event::GlobalListEnd),

            // --- channel metadata ---
            324 => self.on_channel_mode_numeric(&msg),
            328 => {
                if let Some(chan) = self.channel_mut(&chan_param(&msg)) {
                    chan.homepage = msg.trailing.clone();
                }
            }
            329 => {
                let at = msg
                    .param(2)
                    .and_then(|t| t.parse::<i64>().ok())
                    .and_then(|t| Utc.timestamp_opt(t, 0).single());
                if let Some(chan) = self.channel_mut(&chan_param(&msg)) {
                    chan.created_at = at;
                }
            }
            331 => {
                let channel = chan_param(&msg);
                if let Some(chan) = self.channel_mut(&channel) {
                    chan.topic = None;
                }
                self.emit(Event::TopicChanged {
                    channel,
                    topic: None,
                    by: None,
                });
            }
            332 => {
                let channel = chan_param(&msg);
                let topic = msg.trailing.clone();
                if let Some(chan) = self.channel_mut(&channel) {
                    chan.topic = topic.clone();
                }
                self.emit(Event::TopicChanged {
                    channel,
                    topic,
                    by: None,
                });
            }
            333 => {
                // <chan> [<author> [<time>]] — either field may be absent;
                // absent stays absent rather than being faked as blank.
                let channel = chan_param(&msg);
                let author = msg.param(2).map(str::to_string);
                let set_at = msg
                    .param(3)
                    .and_then(|t| t.parse::<i64>().ok())
                    .and_then(|t| Utc.timestamp_opt(t, 0).single());
                if let Some(chan) = self.channel_mut(&channel) {
                    chan.topic_author = author.clone();
                    chan.topic_set_at = set_at;
                }
                self.emit(Event::TopicAuthorReceived {
                    channel,
                    author,
                    set_at,
                });
            }

            // --- NAMES ---
            353 => self.on_names_reply(&msg),
            366 => {
                let channel = chan_param(&msg);
                self.emit(Event::UserListReceived(channel));
            }

            // --- mask lists ---
            367 => self.on_mask_list_entry(&msg, MaskList::Ban, 'b'),
            348 => self.on_mask_list_entry(&msg, MaskList::BanException, 'e'),
            346 => self.on_mask_list_entry(&msg, MaskList::InviteException, 'I'),
            368 | 349 | 347 => {}

            // --- presence (WATCH then MONITOR) ---
            600 | 604 => self.on_watch_numeric(&msg, true),
            // 602 (stopped watching) and 607 (end of list) take the same
            // adapter path: a nick still tracked drops to offline, and
            // the nickless end marker passes through without effect.
            601 | 602 | 605 | 607 => self.on_watch_numeric(&msg, false),
            603 | 606 => {}
            730 => self.on_monitor_numeric(&msg, true),
            731 => self.on_monitor_numeric(&msg, false),

            // --- typed errors ---
            433 => {
                if self.state != ConnectionState::Registered {
                    self.on_nick_collision();
                } else {
                    let nick = msg.param(1).unwrap_or_default().to_string();
                    self.emit(Event::ServerErrorReceived(ServerError::NicknameInUse(nick)));
                }
            }
            436 => {
                let nick = msg.param(1).unwrap_or_default().to_string();
                self.emit(Event::ServerErrorReceived(ServerError::NicknameCollision(
                    nick,
                )));
            }
            447 => {
                let reason = msg.trailing.clone().unwrap_or_default();
                self.emit(Event::ServerErrorReceived(ServerError::CannotChangeNick(
                    reason,
                )));
            }
            405 => {
                let channel = msg.param(1).unwrap_or_default().to_string();
                self.emit(Event::ServerErrorReceived(ServerError::TooManyChannels(
                    channel,
                )));
            }
            473 => {
                let channel = msg.param(1).unwrap_or_default().to_string();
                self.emit(Event::ServerErrorReceived(ServerError::InviteOnlyChannel(
                    channel,
                )));
            }
            439 => {
                let target = msg.param(1).unwrap_or_default().to_string();
                self.emit(Event::ServerErrorReceived(ServerError::TargetTooFast(
                    target,
                )));
            }
            501 => {
                // Our view of our own umodes is wrong; ask for a resync.
                let nick = self.nick.clone();
                self.send_msg(Message::cmd("MODE", [nick]));
            }

            400..=599 => {
                let mut text = msg.params.iter().skip(1).cloned().collect::<Vec<_>>().join(" ");
                if let Some(trailing) = &msg.trailing {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(trailing);
                }
                self.emit(Event::ErrorReceived { numeric, text });
            }

            _ => self.emit(Event::UnhandledNumeric(msg)),
        }
    }

    // ==================================================================
    // Verbs
    // ==================================================================

    fn dispatch_verb(&mut self, msg: Message) {
        match msg.command.to_ascii_uppercase().as_str() {
            "PING" => {
                let token = msg
                    .trailing
                    .clone()
                    .or_else(|| msg.param(0).map(str::to_string))
                    .unwrap_or_default();
                // Answered ahead of anything already queued.
                self.send_raw_front(Message::with_trailing("PONG", [] as [&str; 0], token).to_string());
            }
            "PONG" => {}
            "JOIN" => self.on_join(&msg),
            "PART" => self.on_part(&msg),
            "KICK" => self.on_kick(&msg),
            "QUIT" => self.on_quit(&msg),
            "NICK" => self.on_nick_verb(&msg),
            "MODE" => self.on_mode_verb(&msg),
            "TOPIC" => self.on_topic_verb(&msg),
            "PRIVMSG" | "CPRIVMSG" => self.on_privmsg(&msg),
            "NOTICE" | "CNOTICE" => self.on_notice(&msg),
            "INVITE" => {
                let by = source_nick(&msg);
                let channel = msg
                    .param(1)
                    .map(str::to_string)
                    .or_else(|| msg.trailing.clone())
                    .unwrap_or_default();
                self.emit(Event::Invited { channel, by });
            }
            "SILENCE" => self.on_silence_echo(&msg),
            "ERROR" => {
                let reason = msg.trailing.clone().unwrap_or_default();
                self.emit(Event::ServerClosedLink(reason));
            }
            _ => self.emit(Event::UnhandledCommand(msg)),
        }
    }

    // ==================================================================
    // Verb handlers
    // ==================================================================

    fn on_join(&mut self, msg: &Message) {
        let Some(channel) = target_param(msg) else {
            return;
        };
        let Some(joiner) = self.user_from_prefix(msg) else {
            return;
        };
        let mapping = self.mapping();

        if self.is_self(&joiner.nick) {
            let chan = self.ensure_channel(&channel);
            let name = chan.name.clone();
            chan.add_user(joiner, mapping);
            self.emit(Event::ChannelJoined(name));
        } else {
            let nick = joiner.nick.clone();
            if let Some(chan) = self.channel_mut(&channel) {
                chan.add_user(joiner, mapping);
            }
            self.emit(Event::UserJoined { channel, nick });
        }
    }

    fn on_part(&mut self, msg: &Message) {
        let Some(channel) = target_param(msg) else {
            return;
        };
        let nick = source_nick(msg);
        let mapping = self.mapping();
        let reason = if msg.param(0).is_some() {
            msg.trailing.clone()
        } else {
            None
        };

        if self.is_self(&nick) {
            if let Some(chan) = self.channel_mut(&channel) {
                chan.clear();
            }
            self.emit(Event::ChannelLeft(channel));
        } else {
            if let Some(chan) = self.channel_mut(&channel) {
                chan.remove_user(&nick, mapping);
            }
            self.emit(Event::UserParted {
                channel,
                nick,
                reason,
            });
        }
    }

    fn on_kick(&mut self, msg: &Message) {
        let Some(channel) = msg.param(0).map(str::to_string) else {
            return;
        };
        let Some(victim) = msg.param(1).map(str::to_string) else {
            return;
        };
        let by = source_nick(msg);
        let reason = msg.trailing.clone();
        let mapping = self.mapping();

        if self.is_self(&victim) {
            if let Some(chan) = self.channel_mut(&channel) {
                chan.clear();
            }
            self.emit(Event::KickedFromChannel {
                channel,
                by,
                reason,
            });
        } else {
            if let Some(chan) = self.channel_mut(&channel) {
                chan.remove_user(&victim, mapping);
            }
            self.emit(Event::UserKicked {
                channel,
                nick: victim,
                by,
                reason,
            });
        }
    }

    fn on_quit(&mut self, msg: &Message) {
        let nick = source_nick(msg);
        if nick.is_empty() {
            return;
        }
        let mapping = self.mapping();
        for chan in &mut self.channels {
            chan.remove_user(&nick, mapping);
        }
        self.emit(Event::UserQuit {
            nick,
            reason: msg.trailing.clone(),
        });
    }

    fn on_nick_verb(&mut self, msg: &Message) {
        let old = source_nick(msg);
        let Some(new) = target_param(msg) else {
            return;
        };
        let mapping = self.mapping();

        for chan in &mut self.channels {
            chan.rename_user(&old, &new, mapping);
        }
        for query in &mut self.queries {
            if mapping.eq(&query.peer, &old) {
                query.peer = new.clone();
            }
        }

        if self.is_self(&old) {
            self.nick = new.clone();
            self.emit(Event::OwnNickChanged { old, new });
        } else {
            self.emit(Event::NickChanged { old, new });
        }
    }

    fn on_mode_verb(&mut self, msg: &Message) {
        let Some(target) = msg.param(0) else {
            return;
        };
        let is_channel = target
            .chars()
            .next()
            .map(|c| self.options.chan_types.contains(c))
            .unwrap_or(false);

        if is_channel {
            let target = target.to_string();
            let Some(flags) = msg.param(1).map(str::to_string) else {
                return;
            };
            let params: Vec<&str> = msg.params.iter().skip(2).map(String::as_str).collect();
            let changes = match parse_channel_modes(&flags, &params, &self.options, false) {
                Ok(changes) => changes,
                Err(cause) => {
                    self.emit(Event::ParseError {
                        raw: msg.to_string(),
                        error: mode_error(&flags, cause),
                    });
                    return;
                }
            };

            let mapping = self.options.case_mapping;
            if let Some(idx) = self
                .channels
                .iter()
                .position(|c| mapping.eq(&c.name, &target))
            {
                let chan = &mut self.channels[idx];
                for change in &changes {
                    chan.apply_mode(change, &self.options);
                }
            }
            self.emit(Event::ModeChanged {
                channel: target,
                by: source_nick(msg),
                changes,
            });
        } else {
            let flags = msg
                .param(1)
                .map(str::to_string)
                .or_else(|| msg.trailing.clone())
                .unwrap_or_default();
            let changes = parse_client_modes(&flags);
            if changes.is_empty() {
                return;
            }
            self.client_modes.apply_all(&changes);
            self.emit(Event::ClientModeChanged { changes });
        }
    }

    fn on_topic_verb(&mut self, msg: &Message) {
        let Some(channel) = msg.param(0).map(str::to_string) else {
            return;
        };
        let by = source_nick(msg);
        let topic = msg.trailing.clone().filter(|t| !t.is_empty());

        if let Some(chan) = self.channel_mut(&channel) {
            chan.topic = topic.clone();
            chan.topic_author = Some(by.clone());
            chan.topic_set_at = Some(Utc::now());
        }
        self.emit(Event::TopicChanged {
            channel,
            topic,
            by: Some(by),
        });
    }

    fn on_privmsg(&mut self, msg: &Message) {
        let from = source_nick(msg);
        let Some(target) = msg.param(0).map(str::to_string) else {
            return;
        };
        let Some(body) = msg.trailing.clone().or_else(|| msg.param(1).map(str::to_string)) else {
            return;
        };

        if let Some(ctcp) = Ctcp::decode(&body) {
            self.on_ctcp_request(&from, &target, ctcp);
            return;
        }

        // A direct message opens (or refreshes) the peer conversation.
        if self.is_self(&target) && !from.is_empty() {
            self.ensure_query(&from).record(&body, Utc::now());
        }

        self.emit(Event::MessageReceived {
            from,
            target,
            text: body,
        });
    }

    fn on_ctcp_request(&mut self, from: &str, target: &str, ctcp: Ctcp) {
        let argument = ctcp.argument.clone();
        match &ctcp.command {
            CtcpCommand::Action => {
                self.emit(Event::EmoteReceived {
                    from: from.to_string(),
                    target: target.to_string(),
                    text: argument.unwrap_or_default(),
                });
                return;
            }
            CtcpCommand::Dcc => {
                if let Some(body) = &argument {
                    if let Ok(request) = DccRequest::parse(body) {
                        self.emit(Event::DccRequested {
                            from: from.to_string(),
                            request,
                        });
                    }
                }
                return;
            }
            CtcpCommand::Ping => {
                // Echo the peer's timestamp back verbatim.
                let reply = Ctcp::encode(&CtcpCommand::Ping, argument.as_deref());
                self.ctcp_reply(from, reply);
            }
            CtcpCommand::Version => {
                let version = self.config.ctcp.version.clone();
                let reply = Ctcp::encode(&CtcpCommand::Version, Some(&version));
                self.ctcp_reply(from, reply);
            }
            CtcpCommand::Source => {
                let source = self.config.ctcp.source.clone();
                let reply = Ctcp::encode(&CtcpCommand::Source, Some(&source));
                self.ctcp_reply(from, reply);
            }
            CtcpCommand::ClientInfo => {
                let info = self.config.ctcp.client_info.clone();
                let reply = Ctcp::encode(&CtcpCommand::ClientInfo, Some(&info));
                self.ctcp_reply(from, reply);
            }
            CtcpCommand::Time => {
                let time = Ctcp::time_reply(chrono::Local::now());
                let reply = Ctcp::encode(&CtcpCommand::Time, Some(&time));
                self.ctcp_reply(from, reply);
            }
            CtcpCommand::ErrMsg => {}
            CtcpCommand::Unknown(word) => {
                let text = format!("{} :Unknown CTCP query", word);
                let reply = Ctcp::encode(&CtcpCommand::ErrMsg, Some(&text));
                self.ctcp_reply(from, reply);
            }
        }

        self.emit(Event::CtcpRequested {
            from: from.to_string(),
            command: ctcp.command,
            argument: ctcp.argument,
        });
    }

    fn ctcp_reply(&mut self, nick: &str, payload: String) {
        if nick.is_empty() {
            return;
        }
        self.send_msg(Message::with_trailing("NOTICE", [nick], payload));
    }

    fn on_notice(&mut self, msg: &Message) {
        let from = source_nick(msg);
        let Some(target) = msg.param(0).map(str::to_string) else {
            return;
        };
        let Some(body) = msg.trailing.clone().or_else(|| msg.param(1).map(str::to_string)) else {
            return;
        };

        let mut is_ctcp_reply = false;
        let mut text = body.clone();
        if let Some(ctcp) = Ctcp::decode(&body) {
            is_ctcp_reply = true;
            text = match &ctcp.argument {
                Some(arg) => format!("{} {}", ctcp.command.as_str(), arg),
                None => ctcp.command.as_str().to_string(),
            };
            if ctcp.command == CtcpCommand::Ping {
                if let Some(latency) =
                    ctcp.argument.as_deref().and_then(|a| Ctcp::ping_latency(a, Utc::now()))
                {
                    self.emit(Event::CtcpPingReply {
                        from: from.clone(),
                        latency_secs: latency,
                    });
                }
            }
        }

        self.emit(Event::NoticeReceived {
            from,
            target,
            text,
            is_ctcp_reply,
        });
    }

    fn on_silence_echo(&mut self, msg: &Message) {
        // The server confirms SILENCE changes by echoing signed masks.
        let mapping = self.mapping();
        let network = self.options.network.clone();
        for param in &msg.params {
            if let Some(mask) = param.strip_prefix('+') {
                self.ignores.add(mask, network.as_deref(), mapping);
            } else if let Some(mask) = param.strip_prefix('-') {
                self.ignores.remove(mask, mapping);
            }
        }
    }

    // ==================================================================
    // Numeric handler helpers
    // ==================================================================

    fn on_channel_mode_numeric(&mut self, msg: &Message) {
        let channel = chan_param(msg);
        let Some(flags) = msg.param(2).map(str::to_string) else {
            return;
        };
        let params: Vec<&str> = msg.params.iter().skip(3).map(String::as_str).collect();
        let changes = match parse_channel_modes(&flags, &params, &self.options, true) {
            Ok(changes) => changes,
            Err(cause) => {
                self.emit(Event::ParseError {
                    raw: msg.to_string(),
                    error: mode_error(&flags, cause),
                });
                return;
            }
        };

        let mapping = self.options.case_mapping;
        if let Some(idx) = self
            .channels
            .iter()
            .position(|c| mapping.eq(&c.name, &channel))
        {
            let chan = &mut self.channels[idx];
            chan.apply_mode_snapshot(&changes, &self.options);
        }
    }

    fn on_names_reply(&mut self, msg: &Message) {
        // 353 <me> <symbol> <channel> :entries
        let Some(channel) = msg.param(2).map(str::to_string) else {
            return;
        };
        let Some(entries) = msg.trailing.clone() else {
            return;
        };
        let mapping = self.options.case_mapping;
        let prefix = self.options.prefix.clone();

        if let Some(idx) = self
            .channels
            .iter()
            .position(|c| mapping.eq(&c.name, &channel))
        {
            let chan = &mut self.channels[idx];
            for entry in entries.split_whitespace() {
                if let Some(user) = ChannelUser::from_names_entry(entry, &prefix) {
                    chan.add_user(user, mapping);
                }
            }
        }
    }

    fn on_mask_list_entry(&mut self, msg: &Message, list: MaskList, list_char: char) {
        let channel = chan_param(msg);
        let Some(mask) = msg.param(2).map(str::to_string) else {
            return;
        };
        if let Some(chan) = self.channel_mut(&channel) {
            chan.add_list_mask(list, &mask);
        }
        self.emit(Event::ChannelListEntryReceived {
            channel,
            list: list_char,
            mask,
        });
    }

    fn on_watch_numeric(&mut self, msg: &Message, online: bool) {
        // 600/604: <me> <nick> <user> <host> <ts> :went online
        let Some(nick) = msg.param(1).map(str::to_string) else {
            return;
        };
        let user = msg.param(2).filter(|u| *u != "*").map(str::to_string);
        let host = msg.param(3).filter(|h| *h != "*").map(str::to_string);
        self.presence_update(&nick, user.as_deref(), host.as_deref(), online);
    }

    fn on_monitor_numeric(&mut self, msg: &Message, online: bool) {
        // 730/731: <me> :target[,target...] where target is nick[!user@host]
        let Some(targets) = msg
            .trailing
            .clone()
            .or_else(|| msg.param(1).map(str::to_string))
        else {
            return;
        };
        for target in targets.split(',') {
            let target = target.trim();
            if target.is_empty() {
                continue;
            }
            let prefix = Prefix::parse(target);
            match prefix {
                Prefix::User { nick, user, host } => {
                    self.presence_update(&nick, user.as_deref(), host.as_deref(), online);
                }
                Prefix::Server(name) => {
                    // A bare nick with dots parses as a server name; treat
                    // it as a nick here since MONITOR only carries nicks.
                    self.presence_update(&name, None, None, online);
                }
            }
        }
    }

    fn presence_update(&mut self, nick: &str, user: Option<&str>, host: Option<&str>, online: bool) {
        let mapping = self.options.case_mapping;
        if self.friends.set_presence(nick, user, host, online, mapping) {
            self.emit(Event::FriendStatusChanged {
                nick: nick.to_string(),
                online,
            });
        }
    }

    fn whois_entry(&mut self, nick: &str) -> &mut WhoisInfo {
        let mapping = self.options.case_mapping;
        let current = self
            .whois
            .as_ref()
            .map(|w| mapping.eq(&w.nick, nick))
            .unwrap_or(false);
        if !current {
            self.whois = Some(WhoisInfo::new(nick));
        }
        self.whois.as_mut().unwrap()
    }
}

// ----------------------------------------------------------------------
// Small parsing helpers
// ----------------------------------------------------------------------

fn source_nick(msg: &Message) -> String {
    msg.prefix
        .as_ref()
        .map(|p| match p {
            Prefix::User { nick, .. } => nick.clone(),
            Prefix::Server(name) => name.clone(),
        })
        .unwrap_or_default()
}

/// First param, falling back to the trailing (`JOIN :#chan` form).
fn target_param(msg: &Message) -> Option<String> {
    msg.param(0)
        .map(str::to_string)
        .or_else(|| msg.trailing.clone())
        .filter(|s| !s.is_empty())
}

/// The nick a WHOIS/WHOWAS numeric refers to (second param).
fn nick_param(msg: &Message) -> String {
    msg.param(1).unwrap_or_default().to_string()
}

/// The channel a channel-metadata numeric refers to (second param).
fn chan_param(msg: &Message) -> String {
    msg.param(1).unwrap_or_default().to_string()
}

/// Whitespace-split trailing, as USERHOST/ISON replies use.
fn split_reply_list(msg: &Message) -> Vec<String> {
    msg.trailing
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn mode_error(flags: &str, cause: ModeParseError) -> MessageParseError {
    MessageParseError::InvalidModeString {
        string: flags.to_string(),
        cause,
    }
}
