//! DCC (Direct Client Connection) negotiation parsing.
//!
//! DCC offers arrive inside a CTCP whose command is `DCC`. The body is
//! space-split into a subcommand and its arguments. Addresses are 32-bit
//! integers encoding an IPv4 address in network byte order; port 0 is a
//! "reverse DCC" offer and is surfaced, not rejected. Only the signaling
//! is handled here — the data plane belongs to the caller.

use std::fmt;
use std::net::Ipv4Addr;
use std::num::ParseIntError;

/// A parsed DCC negotiation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DccRequest {
    /// `DCC CHAT chat <addr> <port>` — a direct chat offer.
    Chat {
        /// Decoded peer address.
        addr: Ipv4Addr,
        /// Peer port; 0 means reverse DCC.
        port: u16,
    },
    /// `DCC SEND <filename> <addr> <port> <filesize> [<token>]` — a file
    /// transfer offer.
    Send {
        /// Offered file name.
        filename: String,
        /// Decoded peer address.
        addr: Ipv4Addr,
        /// Peer port; 0 means reverse DCC.
        port: u16,
        /// File size in bytes. Obsolete clients may omit it.
        size: Option<u64>,
        /// Passive-transfer token, when present.
        token: Option<String>,
    },
    /// `DCC RESUME <filename> <port> <position> [<token>]` — resume a
    /// partial transfer.
    Resume {
        /// File name of the transfer being resumed.
        filename: String,
        /// Port of the original offer.
        port: u16,
        /// Byte offset to resume from.
        position: u64,
        /// Passive-transfer token, when present.
        token: Option<String>,
    },
    /// `DCC ACCEPT <filename> <port> <position> [<token>]` — acceptance of
    /// a resume request.
    Accept {
        /// File name of the transfer being resumed.
        filename: String,
        /// Port of the original offer.
        port: u16,
        /// Byte offset agreed on.
        position: u64,
        /// Passive-transfer token, when present.
        token: Option<String>,
    },
}

/// Why a DCC body failed to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DccParseError {
    /// The body was empty or the subcommand is unknown.
    UnknownSubcommand(String),
    /// Too few arguments for the subcommand.
    MissingArgument(&'static str),
    /// A numeric field did not parse.
    BadNumber(&'static str),
}

impl fmt::Display for DccParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DccParseError::UnknownSubcommand(s) => write!(f, "unknown DCC subcommand: {}", s),
            DccParseError::MissingArgument(what) => write!(f, "missing DCC argument: {}", what),
            DccParseError::BadNumber(what) => write!(f, "bad DCC number: {}", what),
        }
    }
}

impl std::error::Error for DccParseError {}

impl From<ParseIntError> for DccParseError {
    fn from(_: ParseIntError) -> Self {
        DccParseError::BadNumber("integer field")
    }
}

/// Decode a network-byte-order u32 into an IPv4 address.
pub fn decode_addr(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(n)
}

/// Encode an IPv4 address as the network-byte-order u32 the wire uses.
pub fn encode_addr(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

impl DccRequest {
    /// Parse the body of a `DCC` CTCP. This is the one place DCC
    /// subcommands are named; callers match on the variants.
    pub fn parse(body: &str) -> Result<DccRequest, DccParseError> {
        let mut words = body.split_whitespace();
        let sub = words
            .next()
            .ok_or_else(|| DccParseError::UnknownSubcommand(String::new()))?;
        let rest: Vec<&str> = words.collect();

        match sub.to_ascii_uppercase().as_str() {
            "CHAT" => {
                // The first argument is the literal protocol word "chat".
                let addr = rest.get(1).ok_or(DccParseError::MissingArgument("address"))?;
                let port = rest.get(2).ok_or(DccParseError::MissingArgument("port"))?;
                Ok(DccRequest::Chat {
                    addr: decode_addr(addr.parse()?),
                    port: port.parse()?,
                })
            }
            "SEND" => {
                // Quoted filenames may contain spaces; everything before the
                // numeric address belongs to the name.
                let addr_idx = rest
                    .iter()
                    .rposition(|w| w.parse::<u32>().is_ok())
                    .filter(|&i| i >= 1)
                    .ok_or(DccParseError::MissingArgument("address"))?;

                // Scan forward for the shape <addr> <port> [<size> [<token>]].
                let mut split = addr_idx;
                for i in 1..rest.len().saturating_sub(1) {
                    if rest[i].parse::<u32>().is_ok() && rest.get(i + 1).map_or(false, |p| p.parse::<u16>().is_ok()) {
                        split = i;
                        break;
                    }
                }

                let filename = rest[..split].join(" ");
                let filename = filename.trim_matches('"').to_string();
                if filename.is_empty() {
                    return Err(DccParseError::MissingArgument("filename"));
                }
                let addr: u32 = rest[split].parse()?;
                let port: u16 = rest
                    .get(split + 1)
                    .ok_or(DccParseError::MissingArgument("port"))?
                    .parse()?;
                let size = rest.get(split + 2).and_then(|s| s.parse::<u64>().ok());
                let token = rest.get(split + 3).map(|s| s.to_string());

                Ok(DccRequest::Send {
                    filename,
                    addr: decode_addr(addr),
                    port,
                    size,
                    token,
                })
            }
            "RESUME" | "ACCEPT" => {
                if rest.len() < 3 {
                    return Err(DccParseError::MissingArgument("port/position"));
                }
                let n = rest.len();
                // Token present iff four trailing fields parse as expected.
                let (fields, token) = if n >= 4 && rest[n - 1].parse::<u64>().is_err() {
                    (&rest[..n - 1], Some(rest[n - 1].to_string()))
                } else {
                    (&rest[..], None)
                };
                let n = fields.len();
                let filename = fields[..n - 2].join(" ").trim_matches('"').to_string();
                if filename.is_empty() {
                    return Err(DccParseError::MissingArgument("filename"));
                }
                let port: u16 = fields[n - 2].parse()?;
                let position: u64 = fields[n - 1].parse()?;

                if sub.eq_ignore_ascii_case("RESUME") {
                    Ok(DccRequest::Resume {
                        filename,
                        port,
                        position,
                        token,
                    })
                } else {
                    Ok(DccRequest::Accept {
                        filename,
                        port,
                        position,
                        token,
                    })
                }
            }
            other => Err(DccParseError::UnknownSubcommand(other.to_string())),
        }
    }

    /// Render an outbound `DCC SEND` body. Spaces in the file name are
    /// replaced with `_` so the receiver's split cannot misparse it.
    pub fn format_send(filename: &str, addr: Ipv4Addr, port: u16, size: u64) -> String {
        format!(
            "SEND {} {} {} {}",
            filename.replace(' ', "_"),
            encode_addr(addr),
            port,
            size
        )
    }

    /// Render an outbound `DCC CHAT` body.
    pub fn format_chat(addr: Ipv4Addr, port: u16) -> String {
        format!("CHAT chat {} {}", encode_addr(addr), port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_codec() {
        let addr = Ipv4Addr::new(173, 80, 26, 71);
        assert_eq!(encode_addr(addr), 2907707975);
        assert_eq!(decode_addr(2907707975), addr);
    }

    #[test]
    fn test_parse_chat() {
        let r = DccRequest::parse("CHAT chat 2907707975 3078").unwrap();
        assert_eq!(
            r,
            DccRequest::Chat {
                addr: Ipv4Addr::new(173, 80, 26, 71),
                port: 3078,
            }
        );
    }

    #[test]
    fn test_parse_send() {
        let r = DccRequest::parse("SEND results.txt.zip 2907707975 3078 24999").unwrap();
        assert_eq!(
            r,
            DccRequest::Send {
                filename: "results.txt.zip".to_string(),
                addr: Ipv4Addr::new(173, 80, 26, 71),
                port: 3078,
                size: Some(24999),
                token: None,
            }
        );
    }

    #[test]
    fn test_parse_send_quoted_filename_with_spaces() {
        let r = DccRequest::parse(r#"SEND "my file.txt" 2907707975 3078 100"#).unwrap();
        match r {
            DccRequest::Send { filename, size, .. } => {
                assert_eq!(filename, "my file.txt");
                assert_eq!(size, Some(100));
            }
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_reverse_dcc_port_zero_allowed() {
        let r = DccRequest::parse("SEND file.bin 2130706433 0 4096 42").unwrap();
        match r {
            DccRequest::Send { port, token, .. } => {
                assert_eq!(port, 0);
                assert_eq!(token.as_deref(), Some("42"));
            }
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_resume_accept() {
        let r = DccRequest::parse("RESUME file.bin 3078 1024").unwrap();
        assert_eq!(
            r,
            DccRequest::Resume {
                filename: "file.bin".to_string(),
                port: 3078,
                position: 1024,
                token: None,
            }
        );
        let r = DccRequest::parse("ACCEPT file.bin 3078 1024").unwrap();
        assert!(matches!(r, DccRequest::Accept { position: 1024, .. }));
    }

    #[test]
    fn test_unknown_subcommand() {
        assert!(matches!(
            DccRequest::parse("XMIT whatever"),
            Err(DccParseError::UnknownSubcommand(_))
        ));
    }

    #[test]
    fn test_format_send_replaces_spaces() {
        let s = DccRequest::format_send("my file.txt", Ipv4Addr::new(127, 0, 0, 1), 5000, 10);
        assert_eq!(s, "SEND my_file.txt 2130706433 5000 10");
    }
}
