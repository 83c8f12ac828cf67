use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::api::error::ApiError;
use crate::api::models::{ChatMessage, MessageDto, UserId};

/// Envelope of every frame on the push channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(alias = "type", alias = "event_type")]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Decodes a text frame. `Ok(None)` for events that carry no chat message.
pub fn decode_frame(text: &str) -> Result<Option<ChatMessage>, serde_json::Error> {
    let envelope: IncomingEvent = serde_json::from_str(text)?;
    match envelope.event.as_str() {
        "message" | "new-message" | "chat.message" | "receive_message" => {
            let dto: MessageDto = serde_json::from_value(envelope.data)?;
            Ok(Some(dto.into_message()))
        }
        other => {
            debug!("ignoring push event `{other}`");
            Ok(None)
        }
    }
}

pub fn subscribe_frame(user_id: UserId) -> String {
    serde_json::json!({
        "event": "subscribe",
        "data": { "channel": format!("chat.{user_id}") }
    })
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Handshaking, or waiting out the reconnect delay.
    Connecting,
    Connected,
}

enum Stop {
    Shutdown,
    Closed,
}

#[derive(Clone)]
struct Link {
    url: Url,
    user_id: UserId,
    reconnect_delay: Duration,
    state: Arc<Mutex<ConnectionState>>,
    frames: mpsc::Sender<ChatMessage>,
}

impl Link {
    fn set(&self, next: ConnectionState) {
        *lock(&self.state) = next;
    }
}

fn lock(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Websocket subscription delivering chat messages for one user.
/// At most one connection is live per channel.
pub struct PushChannel {
    link: Link,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    pub fn new(
        ws_url: &str,
        user_id: UserId,
        token: Option<&str>,
        reconnect_delay: Duration,
    ) -> Result<(Self, mpsc::Receiver<ChatMessage>), ApiError> {
        let mut url = Url::parse(ws_url)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("userId", &user_id.to_string());
            if let Some(t) = token {
                query.append_pair("token", t);
            }
        }
        let (frames, rx) = mpsc::channel(64);
        let (shutdown, _) = watch::channel(false);
        let link = Link {
            url,
            user_id,
            reconnect_delay,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            frames,
        };
        Ok((
            Self {
                link,
                shutdown,
                task: None,
            },
            rx,
        ))
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.link.state)
    }

    /// Starts the connection task. Skipped when already connecting or connected.
    pub fn connect(&mut self) -> bool {
        {
            let mut state = lock(&self.link.state);
            if *state != ConnectionState::Idle {
                debug!("push channel already {:?}, not connecting again", *state);
                return false;
            }
            *state = ConnectionState::Connecting;
        }
        self.shutdown.send_replace(false);
        let link = self.link.clone();
        let shutdown = self.shutdown.subscribe();
        self.task = Some(tokio::spawn(run_link(link, shutdown)));
        true
    }

    pub async fn shutdown(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("push channel task ended abnormally: {e}");
            }
        }
        self.link.set(ConnectionState::Idle);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn run_link(link: Link, mut shutdown: watch::Receiver<bool>) {
    loop {
        link.set(ConnectionState::Connecting);
        match connect_once(&link, &mut shutdown).await {
            Ok(Stop::Shutdown) => break,
            Ok(Stop::Closed) => info!("push channel closed by server"),
            Err(e) => warn!("push channel error: {e}"),
        }
        link.set(ConnectionState::Connecting);
        tokio::select! {
            _ = tokio::time::sleep(link.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
    link.set(ConnectionState::Idle);
    debug!("push channel for user {} stopped", link.user_id);
}

async fn connect_once(link: &Link, shutdown: &mut watch::Receiver<bool>) -> Result<Stop, ApiError> {
    if *shutdown.borrow() {
        return Ok(Stop::Shutdown);
    }
    let ws = tokio::select! {
        res = connect_async(link.url.as_str()) => res?.0,
        _ = shutdown.changed() => return Ok(Stop::Shutdown),
    };
    link.set(ConnectionState::Connected);
    info!("push channel connected for user {}", link.user_id);

    let (mut write, mut read) = ws.split();
    write.send(Message::Text(subscribe_frame(link.user_id))).await?;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(Some(msg)) => {
                        // a full queue must not keep the task from seeing shutdown
                        let delivered = tokio::select! {
                            sent = link.frames.send(msg) => sent.is_ok(),
                            _ = shutdown.changed() => false,
                        };
                        if !delivered {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(Stop::Shutdown);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("malformed push frame: {e}"),
                },
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(Stop::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(Stop::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn push_text(from: UserId, text: &str, at: i64) -> String {
        serde_json::json!({
            "event": "message",
            "data": { "senderId": from, "receiverId": 5, "message": text, "timestamp": at }
        })
        .to_string()
    }

    async fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    #[test]
    fn message_frames_decode() {
        let text = r#"{"event":"new-message","data":{"senderId":"12","receiverId":5,"message":"hi","conversationId":"12_5","timestamp":1700000000000}}"#;
        let msg = decode_frame(text).unwrap().unwrap();
        assert_eq!(msg.sender_id, 12);
        assert_eq!(msg.conversation_key, "12_5");
        assert_eq!(msg.sent_at, 1_700_000_000_000);
    }

    #[test]
    fn other_events_are_ignored() {
        assert_eq!(decode_frame(r#"{"type":"presence","data":{"online":true}}"#).unwrap(), None);
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"event":"message","data":{"senderId":1}}"#).is_err());
    }

    #[test]
    fn subscribe_names_the_user_channel() {
        let frame: serde_json::Value = serde_json::from_str(&subscribe_frame(5)).unwrap();
        assert_eq!(frame["data"]["channel"], "chat.5");
    }

    #[tokio::test]
    async fn second_connect_is_skipped() {
        // nothing listens on port 9; the task ends up waiting out its reconnect delay
        let (mut channel, _rx) =
            PushChannel::new("ws://127.0.0.1:9/ws", 5, Some("abc"), Duration::from_secs(60)).unwrap();
        assert_eq!(channel.state(), ConnectionState::Idle);
        assert!(channel.link.url.as_str().ends_with("?userId=5&token=abc"));

        assert!(channel.connect());
        assert!(!channel.connect());
        assert_ne!(channel.state(), ConnectionState::Idle);

        channel.shutdown().await;
        assert_eq!(channel.state(), ConnectionState::Idle);
        assert!(channel.connect());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn pushes_arrive_and_link_comes_back_after_server_close() {
        let (listener, url) = local_listener().await;
        let (subs_tx, mut subs) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for round in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                if let Some(Ok(Message::Text(sub))) = ws.next().await {
                    let _ = subs_tx.send(sub);
                }
                if round == 0 {
                    let _ = ws.send(Message::Text(push_text(12, "still available?", 1))).await;
                    let _ = ws.close(None).await;
                } else {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        });

        let (mut channel, mut rx) = PushChannel::new(&url, 5, None, Duration::from_millis(50)).unwrap();
        assert!(channel.connect());

        let first = timeout(WAIT, subs.recv()).await.unwrap().unwrap();
        assert_eq!(first, subscribe_frame(5));
        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.content, "still available?");
        assert_eq!(msg.conversation_key, "12_5");

        let again = timeout(WAIT, subs.recv()).await.unwrap().unwrap();
        assert_eq!(again, subscribe_frame(5));
        assert_eq!(channel.state(), ConnectionState::Connected);

        timeout(WAIT, channel.shutdown()).await.unwrap();
        assert_eq!(channel.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn shutdown_finishes_while_frames_wait_unread() {
        let (listener, url) = local_listener().await;
        let (sent_tx, sent) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            for i in 0..100 {
                let _ = ws.send(Message::Text(push_text(12, &format!("bid {i}"), i))).await;
            }
            let _ = sent_tx.send(());
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (mut channel, mut rx) = PushChannel::new(&url, 5, None, Duration::from_millis(50)).unwrap();
        assert!(channel.connect());
        timeout(WAIT, sent).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(timeout(Duration::from_secs(3), channel.shutdown()).await.is_ok());
        assert_eq!(channel.state(), ConnectionState::Idle);
        assert!(rx.try_recv().is_ok());
    }
}
