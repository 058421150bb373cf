//! Slack Socket Mode connector.
//!
//! `apps.connections.open` (app-level token) hands out a WebSocket URL. Every
//! envelope received on it is acknowledged by `envelope_id`; `events_api`
//! envelopes carrying `message` or `app_mention` events become inbound
//! messages. Replies are posted with `chat.postMessage` (bot token).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{protocol::Message, Error as WsError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventMetadata, InboundMessage, MessageSource, ResponseWriter, TransportError};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

const RECONNECT_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub app_token: String,
    pub api_base: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct SlackSocketMode {
    config: SlackConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<Self, TransportError> {
        if self.ok {
            Ok(self)
        } else {
            Err(TransportError::Api(format!(
                "{} failed: {}",
                method,
                self.error.as_deref().unwrap_or("unknown error")
            )))
        }
    }
}

impl SlackSocketMode {
    pub fn new(config: SlackConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn api_base(&self) -> String {
        api_base(&self.config.api_base)
    }

    async fn call(&self, method: &str, token: &str) -> Result<ApiResponse, TransportError> {
        let response: ApiResponse = self
            .client
            .post(format!("{}/{}", self.api_base(), method))
            .bearer_auth(token)
            .send()
            .await?
            .json()
            .await?;
        response.into_result(method)
    }

    /// The bot's own user id, used to strip mentions and skip its own messages.
    async fn bot_user_id(&self) -> Result<String, TransportError> {
        self.call("auth.test", &self.config.bot_token)
            .await?
            .user_id
            .ok_or_else(|| TransportError::Api("auth.test returned no user_id".to_string()))
    }

    async fn open_socket_url(&self) -> Result<String, TransportError> {
        self.call("apps.connections.open", &self.config.app_token)
            .await?
            .url
            .ok_or_else(|| TransportError::Api("apps.connections.open returned no url".to_string()))
    }

    fn writer_for(&self, event: &EventMetadata) -> Arc<dyn ResponseWriter> {
        Arc::new(SlackResponseWriter {
            client: self.client.clone(),
            api_base: self.api_base(),
            bot_token: self.config.bot_token.clone(),
            channel: event.channel_id.clone(),
            thread_ts: event.thread_ts.clone(),
        })
    }

    /// One WebSocket session. `Ok(true)` asks for a reconnect.
    ///
    /// Only the `apps.connections.open` call is fatal; connect, read, ack and
    /// pong failures end the session and ask for a reconnect.
    async fn run_session(
        &self,
        bot_user: &str,
        inbound: &mpsc::Sender<InboundMessage>,
        cancel: &CancellationToken,
    ) -> Result<bool, TransportError> {
        let url = self.open_socket_url().await?;
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                warn!("[Slack] WebSocket connect failed, reconnecting: {}", e);
                return Ok(true);
            }
        };
        let (mut sink, mut stream) = socket.split();
        info!("[Slack] Socket Mode session opened");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(false);
                }
                frame = stream.next() => frame,
            };

            let text = match classify_read(frame) {
                SocketRead::Reconnect(reason) => {
                    warn!("[Slack] Session ended ({}), reconnecting", reason);
                    return Ok(true);
                }
                SocketRead::Ping(payload) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        warn!("[Slack] Pong failed, reconnecting: {}", e);
                        return Ok(true);
                    }
                    continue;
                }
                SocketRead::Skip => continue,
                SocketRead::Text(text) => text,
            };

            let frame = match parse_frame(&text, bot_user) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[Slack] Ignoring undecodable frame: {}", e);
                    continue;
                }
            };

            match frame {
                Frame::Hello => debug!("[Slack] hello"),
                Frame::Disconnect(reason) => {
                    info!("[Slack] Server requested reconnect ({})", reason);
                    return Ok(true);
                }
                Frame::Envelope {
                    envelope_id,
                    message,
                } => {
                    let ack = json!({ "envelope_id": envelope_id }).to_string();
                    if let Err(e) = sink.send(Message::Text(ack)).await {
                        warn!("[Slack] Ack failed, reconnecting: {}", e);
                        return Ok(true);
                    }

                    if let Some((text, event)) = message {
                        let writer = self.writer_for(&event);
                        let message = InboundMessage {
                            text,
                            event,
                            writer,
                        };
                        let delivered = tokio::select! {
                            _ = cancel.cancelled() => false,
                            sent = inbound.send(message) => sent.is_ok(),
                        };
                        if !delivered {
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(false);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MessageSource for SlackSocketMode {
    async fn run(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let bot_user = self.bot_user_id().await?;
        info!("[Slack] Authenticated as {}", bot_user);

        while !cancel.is_cancelled() {
            if !self.run_session(&bot_user, &inbound, &cancel).await? {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        info!("[Slack] Socket Mode stopped");
        Ok(())
    }
}

struct SlackResponseWriter {
    client: Client,
    api_base: String,
    bot_token: String,
    channel: String,
    thread_ts: Option<String>,
}

#[async_trait]
impl ResponseWriter for SlackResponseWriter {
    async fn reply(&self, text: &str) -> Result<(), TransportError> {
        let mut body = json!({ "channel": self.channel, "text": text });
        if let Some(thread_ts) = &self.thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let response: ApiResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        response.into_result("chat.postMessage").map(|_| ())
    }
}

fn api_base(configured: &Option<String>) -> String {
    configured
        .as_deref()
        .unwrap_or(SLACK_API_BASE)
        .trim_end_matches('/')
        .to_string()
}

/// What one WebSocket read means for the session.
#[derive(Debug, PartialEq)]
enum SocketRead {
    Text(String),
    Ping(Vec<u8>),
    Skip,
    Reconnect(String),
}

fn classify_read(frame: Option<Result<Message, WsError>>) -> SocketRead {
    match frame {
        None => SocketRead::Reconnect("stream ended".to_string()),
        Some(Ok(Message::Close(_))) => SocketRead::Reconnect("closed by server".to_string()),
        Some(Err(e)) => SocketRead::Reconnect(format!("read failed: {}", e)),
        Some(Ok(Message::Ping(payload))) => SocketRead::Ping(payload),
        Some(Ok(Message::Text(text))) => SocketRead::Text(text),
        Some(Ok(_)) => SocketRead::Skip,
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Hello,
    Disconnect(String),
    Envelope {
        envelope_id: String,
        message: Option<(String, EventMetadata)>,
    },
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

fn parse_frame(text: &str, bot_user: &str) -> Result<Frame, serde_json::Error> {
    let envelope: SocketEnvelope = serde_json::from_str(text)?;
    match envelope.kind.as_str() {
        "hello" => return Ok(Frame::Hello),
        "disconnect" => {
            return Ok(Frame::Disconnect(
                envelope.reason.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
        _ => {}
    }

    let Some(envelope_id) = envelope.envelope_id else {
        return Ok(Frame::Hello);
    };
    let message = if envelope.kind == "events_api" {
        envelope
            .payload
            .get("event")
            .cloned()
            .and_then(|raw| inbound_from_event(raw, bot_user))
    } else {
        None
    };
    Ok(Frame::Envelope {
        envelope_id,
        message,
    })
}

/// Accept `app_mention` events and plain user `message` events. A channel
/// message that mentions the bot is skipped because Slack also delivers it
/// as an `app_mention`.
fn inbound_from_event(raw: Value, bot_user: &str) -> Option<(String, EventMetadata)> {
    let event: SlackEvent = serde_json::from_value(raw.clone()).ok()?;
    if event.bot_id.is_some() || event.subtype.is_some() {
        return None;
    }
    if event.user.as_deref() == Some(bot_user) {
        return None;
    }

    let mention = format!("<@{}>", bot_user);
    let text = event.text.as_deref()?;
    match event.kind.as_str() {
        "app_mention" => {}
        "message" if event.channel_type.as_deref() == Some("im") || !text.contains(&mention) => {}
        _ => return None,
    }

    let text = unescape(text.trim_start().strip_prefix(&mention).unwrap_or(text).trim());
    let metadata = EventMetadata {
        channel_id: event.channel?,
        user_id: event.user,
        ts: event.ts,
        thread_ts: event.thread_ts,
        raw,
    };
    Some((text, metadata))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn events_api(event: Value) -> String {
        json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": { "team_id": "T1", "event": event }
        })
        .to_string()
    }

    #[test]
    fn test_hello_and_disconnect() {
        assert_eq!(parse_frame(r#"{"type":"hello"}"#, "UBOT").unwrap(), Frame::Hello);
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#, "UBOT").unwrap(),
            Frame::Disconnect("refresh_requested".to_string())
        );
    }

    #[test]
    fn test_app_mention_strips_bot_mention() {
        let frame = parse_frame(
            &events_api(json!({
                "type": "app_mention",
                "user": "U1",
                "text": "<@UBOT> query for bot - capital of france",
                "channel": "C1",
                "ts": "1700000000.000100"
            })),
            "UBOT",
        )
        .unwrap();

        let Frame::Envelope { envelope_id, message } = frame else {
            panic!("expected envelope");
        };
        assert_eq!(envelope_id, "env-1");
        let (text, meta) = message.unwrap();
        assert_eq!(text, "query for bot - capital of france");
        assert_eq!(meta.channel_id, "C1");
        assert_eq!(meta.user_id.as_deref(), Some("U1"));
        assert_eq!(meta.raw["type"], "app_mention");
    }

    #[test]
    fn test_bot_and_subtype_messages_are_acked_but_ignored() {
        for event in [
            json!({"type": "message", "bot_id": "B1", "text": "hi", "channel": "C1"}),
            json!({"type": "message", "subtype": "message_changed", "text": "hi", "channel": "C1"}),
            json!({"type": "message", "user": "UBOT", "text": "hi", "channel": "C1"}),
            json!({"type": "reaction_added", "user": "U1", "channel": "C1"}),
        ] {
            let frame = parse_frame(&events_api(event), "UBOT").unwrap();
            assert_eq!(
                frame,
                Frame::Envelope {
                    envelope_id: "env-1".to_string(),
                    message: None
                }
            );
        }
    }

    #[test]
    fn test_channel_message_with_mention_defers_to_app_mention() {
        let frame = parse_frame(
            &events_api(json!({
                "type": "message", "user": "U1", "channel": "C1", "channel_type": "channel",
                "text": "<@UBOT> query for bot - pi"
            })),
            "UBOT",
        )
        .unwrap();
        assert!(matches!(frame, Frame::Envelope { message: None, .. }));

        let frame = parse_frame(
            &events_api(json!({
                "type": "message", "user": "U1", "channel": "D1", "channel_type": "im",
                "text": "query for bot - 3 &lt; 4 &amp;&amp; 4 &gt; 3", "thread_ts": "1.2"
            })),
            "UBOT",
        )
        .unwrap();
        let Frame::Envelope { message: Some((text, meta)), .. } = frame else {
            panic!("expected message");
        };
        assert_eq!(text, "query for bot - 3 < 4 && 4 > 3");
        assert_eq!(meta.thread_ts.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_read_failures_ask_for_reconnect() {
        let reset = WsError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(matches!(
            classify_read(Some(Err(reset))),
            SocketRead::Reconnect(reason) if reason.starts_with("read failed")
        ));
        assert!(matches!(
            classify_read(Some(Err(WsError::ConnectionClosed))),
            SocketRead::Reconnect(_)
        ));
        assert!(matches!(classify_read(None), SocketRead::Reconnect(_)));
        assert!(matches!(
            classify_read(Some(Ok(Message::Close(None)))),
            SocketRead::Reconnect(_)
        ));
    }

    #[test]
    fn test_ping_and_text_frames_keep_session() {
        assert_eq!(
            classify_read(Some(Ok(Message::Ping(vec![1, 2])))),
            SocketRead::Ping(vec![1, 2])
        );
        assert_eq!(
            classify_read(Some(Ok(Message::Text(r#"{"type":"hello"}"#.to_string())))),
            SocketRead::Text(r#"{"type":"hello"}"#.to_string())
        );
        assert_eq!(classify_read(Some(Ok(Message::Binary(vec![0])))), SocketRead::Skip);
    }

    #[test]
    fn test_api_base_trims_slash() {
        assert_eq!(api_base(&None), SLACK_API_BASE);
        assert_eq!(api_base(&Some("http://localhost:1/api/".to_string())), "http://localhost:1/api");
    }
}
