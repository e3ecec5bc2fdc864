//! Simple IRC client example
//!
//! Connects to a server through the engine-backed [`Client`], joins a
//! channel, greets it, and echoes events until the connection ends.

use slirc_core::conn::{Client, ClientConfig};
use slirc_core::engine::SessionConfig;
use slirc_core::transport::ServerAddr;
use slirc_core::{ConnectionState, Event};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig {
        addr: ServerAddr::parse("irc://irc.libera.chat:6667")?,
        session: SessionConfig::new("slirc_example", "slirc", "slirc-core example"),
        auto_reconnect: false,
    };

    let (client, mut events) = Client::connect(config)?;

    while let Some(event) = events.recv().await {
        match event {
            Event::ConnectionStateChanged(ConnectionState::Registered) => {
                println!("✓ Registered as {}", client.nickname());
                client.join("#example", None)?;
            }
            Event::ConnectionStateChanged(ConnectionState::Disconnected) => {
                println!("Connection closed");
                break;
            }
            Event::ConnectionStateChanged(state) => {
                println!("state: {:?}", state);
            }
            Event::ChannelJoined(channel) => {
                println!("✓ Joined {}", channel);
                client.privmsg(&channel, "Hello from the slirc-core example!")?;
            }
            Event::MessageReceived { from, target, text } => {
                println!("<{}:{}> {}", target, from, text);
                if text.contains("hello") {
                    client.privmsg(&target, "Hello there!")?;
                }
                if text.contains("quit please") {
                    client.quit(Some("Goodbye!"));
                }
            }
            Event::NoticeReceived { from, text, .. } => {
                println!("-{}- {}", from, text);
            }
            Event::ParseError { raw, error } => {
                eprintln!("unparseable line {:?}: {}", raw, error);
            }
            _ => {}
        }
    }

    Ok(())
}
