//! # slirc-core
//!
//! A client-side IRC protocol engine: RFC 2812 message parsing, ISUPPORT
//! (005) negotiation, channel and user state projection, CTCP/DCC
//! signaling, and WATCH/MONITOR/SILENCE presence and ignore facilities.
//!
//! ## Architecture
//!
//! The core is sans-IO: [`Engine`] consumes inbound lines and produces
//! outbound lines plus typed [`Event`]s, which makes every protocol
//! behavior testable against a scripted transcript. The optional `tokio`
//! feature (on by default) adds the [`transport`] and [`conn`] modules
//! that put the engine on a real TCP or TLS connection with
//! auto-reconnect.
//!
//! ## Quick Start
//!
//! ```no_run
//! use slirc_core::conn::{Client, ClientConfig};
//! use slirc_core::engine::SessionConfig;
//! use slirc_core::transport::ServerAddr;
//! use slirc_core::Event;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     addr: ServerAddr::parse("ircs://irc.libera.chat")?,
//!     session: SessionConfig::new("slircbot", "slirc", "slirc bot"),
//!     auto_reconnect: true,
//! };
//! let (client, mut events) = Client::connect(config)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         Event::ConnectionStateChanged(state) => println!("state: {:?}", state),
//!         Event::MessageReceived { from, target, text } => {
//!             println!("<{}:{}> {}", target, from, text);
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving the engine directly
//!
//! ```
//! use slirc_core::engine::{Engine, SessionConfig};
//!
//! let mut engine = Engine::new(SessionConfig::new("alice", "alice", "Alice")).unwrap();
//! engine.on_connecting();
//! engine.on_transport_connected();
//! assert_eq!(engine.take_outbound().unwrap(), "NICK alice\r\n");
//! assert_eq!(engine.take_outbound().unwrap(), "USER alice 8 * :Alice\r\n");
//!
//! engine.handle_line(":srv 001 alice :Welcome");
//! engine.handle_line(":srv 005 alice NICKLEN=16 PREFIX=(ohv)@%+ :are supported");
//! assert_eq!(engine.options().nick_len, 16);
//! ```

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod casemap;
pub mod ctcp;
pub mod dcc;
pub mod engine;
pub mod error;
pub mod event;
pub mod isupport;
pub mod message;
pub mod mode;
pub mod names;
pub mod prefix;

#[cfg(feature = "tokio")]
pub mod codec;
#[cfg(feature = "tokio")]
pub mod conn;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::casemap::CaseMapping;
pub use self::ctcp::{Ctcp, CtcpCommand};
pub use self::dcc::{DccParseError, DccRequest};
pub use self::engine::{ConnectionState, Engine, SessionConfig};
pub use self::error::{ClientError, MessageParseError, ModeParseError, ProtocolError};
pub use self::event::{Event, ServerError};
pub use self::isupport::{ChanModes, MaxList, PrefixSpec, PresenceBackend, ServerOptions};
pub use self::message::{Message, MAX_LINE_LEN};
pub use self::mode::{ChannelModeString, ClientModeString, ModeChange};
pub use self::names::{ChannelName, Nickname, Password, Username};
pub use self::prefix::Prefix;

#[cfg(feature = "tokio")]
pub use self::codec::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::conn::{Client, ClientConfig};
#[cfg(feature = "tokio")]
pub use self::transport::{
    ServerAddr, Transport, TransportReadError, TransportReader, TransportWriter,
};
