//! Minimal NATS text-protocol client
//!
//! Speaks just enough of the protocol for the emitter: CONNECT, PUB, SUB,
//! UNSUB, MSG, PING/PONG. A reader task owns the receive half and fans
//! messages out to subscription channels; writes go through a shared write
//! half. There is no reconnect logic here - a broken bus connection is the
//! supervisor's problem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::{BusError, BusMessage, MessageBus, Result, Subscription};

/// Per-subscription buffer depth
const SUBSCRIPTION_BUFFER: usize = 64;

/// Initial read buffer capacity
const READ_BUFFER: usize = 16 * 1024;

type SubscriptionMap = Arc<Mutex<HashMap<u64, mpsc::Sender<BusMessage>>>>;
type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// NATS-backed message bus
pub struct NatsBus {
    writer: SharedWriter,
    subscriptions: SubscriptionMap,
    next_sid: AtomicU64,
}

impl NatsBus {
    /// Connect to a NATS server at `host:port`
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(BusError::Connect)?;
        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(write_half));
        let subscriptions: SubscriptionMap = Arc::default();

        {
            let mut w = writer.lock().await;
            w.write_all(b"CONNECT {\"verbose\":false,\"pedantic\":false,\"name\":\"route-emitter\"}\r\n")
                .await?;
            w.flush().await?;
        }

        tokio::spawn(read_loop(
            read_half,
            Arc::clone(&writer),
            Arc::clone(&subscriptions),
        ));

        tracing::info!(addr, "connected to message bus");
        Ok(Self {
            writer,
            subscriptions,
            next_sid: AtomicU64::new(0),
        })
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn publish_raw(
        &self,
        subject: &str,
        reply_to: Option<&str>,
        payload: &[u8],
    ) -> Result<()> {
        let header = match reply_to {
            Some(reply) => format!("PUB {} {} {}\r\n", subject, reply, payload.len()),
            None => format!("PUB {} {}\r\n", subject, payload.len()),
        };
        let mut command = Vec::with_capacity(header.len() + payload.len() + 2);
        command.extend_from_slice(header.as_bytes());
        command.extend_from_slice(payload);
        command.extend_from_slice(b"\r\n");
        self.write(&command).await
    }
}

#[async_trait::async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.publish_raw(subject, None, &payload).await
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.publish_raw(subject, Some(reply_to), &payload).await
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let sid = self.next_sid.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscriptions.lock().await.insert(sid, sender);

        if let Err(error) = self.write(format!("SUB {subject} {sid}\r\n").as_bytes()).await {
            self.subscriptions.lock().await.remove(&sid);
            return Err(error);
        }
        Ok(Subscription::new(subject, receiver))
    }
}

/// A frame parsed off the wire
enum Frame {
    Message { sid: u64, message: BusMessage },
    Ping,
    Ignored,
}

async fn read_loop(mut reader: OwnedReadHalf, writer: SharedWriter, subscriptions: SubscriptionMap) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER);
    loop {
        loop {
            match parse_frame(&mut buf) {
                Ok(Some(Frame::Message { sid, message })) => {
                    deliver(&subscriptions, &writer, sid, message).await;
                }
                Ok(Some(Frame::Ping)) => {
                    let mut w = writer.lock().await;
                    let _ = w.write_all(b"PONG\r\n").await;
                    let _ = w.flush().await;
                }
                Ok(Some(Frame::Ignored)) => {}
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(error = %error, "bus protocol error, closing reader");
                    return;
                }
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::warn!("bus connection closed by peer");
                return;
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(error = %error, "bus read failed");
                return;
            }
        }
    }
}

/// Hand a message to its subscription, unsubscribing lazily if it is gone
async fn deliver(
    subscriptions: &SubscriptionMap,
    writer: &SharedWriter,
    sid: u64,
    message: BusMessage,
) {
    let mut map = subscriptions.lock().await;
    let stale = match map.get(&sid) {
        Some(sender) => match sender.try_send(message) {
            Ok(()) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(sid, "subscriber full, dropping bus message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => true,
        },
        None => false,
    };

    if stale && map.remove(&sid).is_some() {
        drop(map);
        let mut w = writer.lock().await;
        let _ = w.write_all(format!("UNSUB {sid}\r\n").as_bytes()).await;
        let _ = w.flush().await;
    }
}

/// Parse one frame from the buffer, or `None` if more bytes are needed
fn parse_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[..line_end])
        .map_err(|_| BusError::Protocol("control line is not utf-8".to_string()))?;
    let mut parts = line.split_ascii_whitespace();

    match parts.next() {
        Some("MSG") => {
            let subject = parts
                .next()
                .ok_or_else(|| BusError::Protocol("MSG missing subject".to_string()))?
                .to_string();
            let sid: u64 = parts
                .next()
                .ok_or_else(|| BusError::Protocol("MSG missing sid".to_string()))?
                .parse()
                .map_err(|_| BusError::Protocol("MSG sid is not a number".to_string()))?;
            let third = parts
                .next()
                .ok_or_else(|| BusError::Protocol("MSG missing length".to_string()))?;
            let (reply_to, length_token) = match parts.next() {
                Some(fourth) => (Some(third.to_string()), fourth),
                None => (None, third),
            };
            let payload_len: usize = length_token
                .parse()
                .map_err(|_| BusError::Protocol("MSG length is not a number".to_string()))?;

            let total = line_end + 2 + payload_len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            buf.advance(line_end + 2);
            let payload = buf.split_to(payload_len).to_vec();
            buf.advance(2);

            Ok(Some(Frame::Message {
                sid,
                message: BusMessage {
                    subject,
                    reply_to,
                    payload,
                },
            }))
        }
        Some("PING") => {
            buf.advance(line_end + 2);
            Ok(Some(Frame::Ping))
        }
        Some("-ERR") => {
            tracing::warn!(error = line, "bus reported an error");
            buf.advance(line_end + 2);
            Ok(Some(Frame::Ignored))
        }
        Some("INFO") | Some("PONG") | Some("+OK") | None => {
            buf.advance(line_end + 2);
            Ok(Some(Frame::Ignored))
        }
        Some(other) => Err(BusError::Protocol(format!(
            "unexpected control token '{other}'"
        ))),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(input: &[u8]) -> (Vec<(u64, BusMessage)>, usize, usize) {
        let mut buf = BytesMut::from(input);
        let mut messages = Vec::new();
        let mut pings = 0;
        let mut ignored = 0;
        while let Ok(Some(frame)) = parse_frame(&mut buf) {
            match frame {
                Frame::Message { sid, message } => messages.push((sid, message)),
                Frame::Ping => pings += 1,
                Frame::Ignored => ignored += 1,
            }
        }
        (messages, pings, ignored)
    }

    #[test]
    fn parses_msg_frames() {
        let (messages, _, _) = frames(b"MSG router.start 1 5\r\nhello\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 1);
        assert_eq!(messages[0].1.subject, "router.start");
        assert_eq!(messages[0].1.reply_to, None);
        assert_eq!(messages[0].1.payload, b"hello");
    }

    #[test]
    fn parses_msg_with_reply_subject() {
        let (messages, _, _) = frames(b"MSG router.greet 2 some-reply 2\r\nok\r\n");
        assert_eq!(messages[0].1.reply_to.as_deref(), Some("some-reply"));
        assert_eq!(messages[0].1.payload, b"ok");
    }

    #[test]
    fn skips_info_and_answers_ping() {
        let (messages, pings, ignored) =
            frames(b"INFO {\"server_id\":\"x\"}\r\nPING\r\n+OK\r\n");
        assert!(messages.is_empty());
        assert_eq!(pings, 1);
        assert_eq!(ignored, 2);
    }

    #[test]
    fn waits_for_complete_payload() {
        let mut buf = BytesMut::from(&b"MSG a 1 11\r\npart"[..]);
        assert!(matches!(parse_frame(&mut buf), Ok(None)));

        buf.extend_from_slice(b"ial-pay\r\n");
        match parse_frame(&mut buf) {
            Ok(Some(Frame::Message { message, .. })) => {
                assert_eq!(message.payload, b"partial-pay");
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn rejects_garbage() {
        let mut buf = BytesMut::from(&b"WAT is this\r\n"[..]);
        assert!(parse_frame(&mut buf).is_err());
    }

    #[tokio::test]
    async fn subscribes_and_receives_over_tcp() {
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            write_half
                .write_all(b"INFO {\"server_id\":\"test\"}\r\n")
                .await
                .unwrap();

            let mut lines = BufReader::new(read_half).lines();
            let mut sid = None;
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(rest) = line.strip_prefix("SUB router.start ") {
                    sid = Some(rest.trim().to_string());
                    break;
                }
            }
            let sid = sid.expect("client never subscribed");
            write_half
                .write_all(format!("MSG router.start {sid} 4\r\nping\r\n").as_bytes())
                .await
                .unwrap();

            // hold the socket open until the client is done
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        });

        let bus = NatsBus::connect(&addr.to_string()).await.unwrap();
        let mut subscription = bus.subscribe("router.start").await.unwrap();

        let message = tokio::time::timeout(std::time::Duration::from_secs(2), subscription.next())
            .await
            .expect("timed out waiting for bus message")
            .expect("subscription closed");
        assert_eq!(message.payload, b"ping");

        server.abort();
    }
}
