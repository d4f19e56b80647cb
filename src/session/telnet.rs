//! Telnet transport: RFC 854 option negotiation and the socket I/O task.

use super::*;
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SGA: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Incremental telnet decoder.
///
/// Separates application data from protocol commands and produces the replies to option
/// requests. The server may echo and suppress go-ahead; every other option is refused.
/// Each (verb, option) pair is answered once, which keeps negotiation from looping.
#[derive(Debug, Default)]
pub struct TelnetCodec {
    state: DecodeState,
    answered: HashSet<(u8, u8)>,
}

impl TelnetCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk read from the socket.
    ///
    /// Application bytes are appended to `data`, negotiation replies to `replies`.
    /// State carries over between calls, so commands split across reads are handled.
    pub fn decode(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            let state = self.state;
            self.state = match state {
                DecodeState::Data => match byte {
                    IAC => DecodeState::Iac,
                    // CR NUL is a bare carriage return on the wire.
                    0 => DecodeState::Data,
                    _ => {
                        data.push(byte);
                        DecodeState::Data
                    }
                },
                DecodeState::Iac => match byte {
                    IAC => {
                        data.push(IAC);
                        DecodeState::Data
                    }
                    DO | DONT | WILL | WONT => DecodeState::Negotiate(byte),
                    SB => DecodeState::Sub,
                    _ => DecodeState::Data,
                },
                DecodeState::Negotiate(verb) => {
                    self.negotiate(verb, byte, replies);
                    DecodeState::Data
                }
                DecodeState::Sub => match byte {
                    IAC => DecodeState::SubIac,
                    _ => DecodeState::Sub,
                },
                DecodeState::SubIac => match byte {
                    SE => DecodeState::Data,
                    _ => DecodeState::Sub,
                },
            };
        }
    }

    fn negotiate(&mut self, verb: u8, option: u8, replies: &mut Vec<u8>) {
        let reply = match (verb, option) {
            (WILL, OPT_ECHO) | (WILL, OPT_SGA) => DO,
            (WILL, _) => DONT,
            (DO, OPT_SGA) => WILL,
            (DO, _) => WONT,
            // Refusals need no answer.
            _ => return,
        };
        if self.answered.insert((verb, option)) {
            trace!("telnet negotiate verb={} option={} reply={}", verb, option, reply);
            replies.extend_from_slice(&[IAC, reply, option]);
        }
    }

    /// Encodes outgoing text: line ends become CR LF and literal 0xFF bytes are doubled.
    pub fn encode(text: &str) -> Vec<u8> {
        let normalized = text.replace("\r\n", "\n");
        let mut out = Vec::with_capacity(normalized.len() + 8);
        for &byte in normalized.as_bytes() {
            match byte {
                b'\n' => out.extend_from_slice(b"\r\n"),
                IAC => out.extend_from_slice(&[IAC, IAC]),
                _ => out.push(byte),
            }
        }
        out
    }
}

/// Drains `pending` into a string, keeping back a trailing UTF-8 sequence that the
/// next read has to complete. Invalid bytes become U+FFFD.
fn take_text(pending: &mut Vec<u8>) -> String {
    let tail = pending.split_off(complete_prefix_len(pending));
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = tail;
    text
}

/// Length of `bytes` without a truncated multi-byte sequence at the end.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { len - back } else { len };
    }
    len
}

/// Both ends of the user side of a telnet connection plus its I/O task.
pub(super) struct TelnetChannel {
    pub sender: Sender<String>,
    pub recv: Receiver<String>,
    pub task: JoinHandle<()>,
}

/// Opens the TCP connection and spawns the task that shuttles bytes between the socket
/// and a pair of string channels.
pub(super) async fn open(
    addr: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TelnetChannel, ConnectError> {
    let device_addr = format!("{addr}:{port}");
    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((addr, port)))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => return Err(ConnectError::ConnectFailed(err)),
        Err(_) => return Err(ConnectError::ConnectTimeout(connect_timeout.as_secs())),
    };
    let _ = stream.set_nodelay(true);
    debug!("{} TCP connection successful", device_addr);

    let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
    let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

    let task = tokio::spawn(async move {
        let (mut reader, mut writer) = stream.into_split();
        let mut codec = TelnetCodec::new();
        let mut buf = vec![0u8; 4096];
        // Decoded bytes not yet forwarded: an incomplete UTF-8 sequence from the last read.
        let mut data = Vec::new();
        loop {
            tokio::select! {
                outgoing = receiver_from_user.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = writer.write_all(&TelnetCodec::encode(&text)).await {
                            debug!("{} Failed to send data to device: {:?}", device_addr, e);
                            break;
                        }
                    }
                    None => {
                        debug!("{} Session dropped its sender. Closing task.", device_addr);
                        break;
                    }
                },
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("{} Device closed the connection.", device_addr);
                        break;
                    }
                    Ok(n) => {
                        let mut replies = Vec::new();
                        codec.decode(&buf[..n], &mut data, &mut replies);
                        if !replies.is_empty() && writer.write_all(&replies).await.is_err() {
                            debug!("{} Failed to answer negotiation.", device_addr);
                            break;
                        }
                        let text = take_text(&mut data);
                        if !text.is_empty() && sender_to_user.send(text).await.is_err() {
                            debug!("{} Output receiver dropped. Closing task.", device_addr);
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("{} Read error: {:?}", device_addr, e);
                        break;
                    }
                },
            }
        }
        let _ = writer.shutdown().await;
        debug!("{} Telnet I/O task ended.", device_addr);
    });

    Ok(TelnetChannel {
        sender: sender_to_shell,
        recv: receiver_from_shell,
        task,
    })
}
