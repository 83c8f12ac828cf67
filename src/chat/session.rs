use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::api::error::ApiError;
use crate::api::events::PushChannel;
use crate::api::models::{ChatMessage, Conversation, OutgoingMessage, UserId};
use crate::chat::state::{ChatState, Notice, NoticeLevel, PushOutcome};
use crate::utils::{now_millis, spawn_to_queue};

/// REST operations the chat needs from the backend.
pub trait ChatBackend: Send + Sync + 'static {
    fn list_conversations(&self, me: UserId) -> impl Future<Output = Result<Vec<Conversation>, ApiError>> + Send;
    fn history(&self, me: UserId, peer: UserId) -> impl Future<Output = Result<Vec<ChatMessage>, ApiError>> + Send;
    fn send_message(&self, msg: &OutgoingMessage) -> impl Future<Output = Result<Option<String>, ApiError>> + Send;
    fn create_conversation(&self, me: UserId, peer: UserId) -> impl Future<Output = Result<Conversation, ApiError>> + Send;
}

/// Presentation of the chat; called after every state change.
pub trait ChatView {
    fn conversations(&mut self, list: &[Conversation], active: Option<&str>);
    fn messages(&mut self, me: UserId, key: Option<&str>, list: &[ChatMessage]);
    fn notice(&mut self, notice: &Notice);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(UserId),
    Send(String),
    Refresh,
    Start { peer: UserId, text: Option<String> },
    Close,
    Quit,
}

#[derive(Debug)]
pub enum TaskResult {
    Conversations(Result<Vec<Conversation>, ApiError>),
    History {
        key: String,
        result: Result<Vec<ChatMessage>, ApiError>,
    },
    Sent {
        message: ChatMessage,
        result: Result<Option<String>, ApiError>,
    },
    Created {
        text: Option<String>,
        result: Result<Conversation, ApiError>,
    },
}

pub struct ChatSession<B: ChatBackend, V: ChatView> {
    state: ChatState,
    backend: Arc<B>,
    view: V,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results_rx: mpsc::UnboundedReceiver<TaskResult>,
    clock: fn() -> i64,
}

impl<B: ChatBackend, V: ChatView> ChatSession<B, V> {
    pub fn new(me: UserId, backend: B, view: V) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            state: ChatState::new(me),
            backend: Arc::new(backend),
            view,
            results_tx,
            results_rx,
            clock: now_millis,
        }
    }

    /// Serializes commands, pushed messages and finished requests through
    /// one loop until `Quit` or the command sender goes away. The push
    /// channel lives exactly as long as the loop.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        push: Option<(PushChannel, mpsc::Receiver<ChatMessage>)>,
    ) {
        let (mut channel, mut frames) = match push {
            Some((channel, frames)) => (Some(channel), Some(frames)),
            None => (None, None),
        };
        if let Some(channel) = channel.as_mut() {
            channel.connect();
        }
        self.handle_command(Command::Refresh);

        loop {
            let event = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Quit) | None => break,
                    Some(cmd) => Event::Command(cmd),
                },
                Some(msg) = next_frame(&mut frames) => Event::Push(msg),
                Some(done) = self.results_rx.recv() => Event::Done(done),
            };
            match event {
                Event::Command(cmd) => self.handle_command(cmd),
                Event::Push(msg) => self.handle_push(msg),
                Event::Done(done) => self.handle_result(done),
            }
        }

        drop(frames);
        if let Some(mut channel) = channel {
            debug!("closing push channel ({:?})", channel.state());
            channel.shutdown().await;
        }
        info!("chat session for user {} closed", self.state.me());
    }

    pub fn handle_command(&mut self, cmd: Command) {
        let me = self.state.me();
        match cmd {
            Command::Open(peer) => {
                if let Some(key) = self.state.open(peer) {
                    self.render_all();
                    self.fetch_history(key, peer);
                }
            }
            Command::Send(text) => match self.state.begin_send(&text, (self.clock)()) {
                Some(message) => {
                    self.render_messages();
                    let backend = Arc::clone(&self.backend);
                    spawn_to_queue(self.results_tx.clone(), async move {
                        let result = backend.send_message(&OutgoingMessage::from(&message)).await;
                        TaskResult::Sent { message, result }
                    });
                }
                None if self.state.active().is_none() => {
                    self.state.notify(NoticeLevel::Info, "Open a conversation first.");
                }
                None => {}
            },
            Command::Refresh => {
                let backend = Arc::clone(&self.backend);
                spawn_to_queue(self.results_tx.clone(), async move {
                    TaskResult::Conversations(backend.list_conversations(me).await)
                });
            }
            Command::Start { peer, text } => {
                if peer == me {
                    self.state.notify(NoticeLevel::Error, "You cannot start a chat with yourself.");
                } else {
                    let backend = Arc::clone(&self.backend);
                    spawn_to_queue(self.results_tx.clone(), async move {
                        TaskResult::Created {
                            text,
                            result: backend.create_conversation(me, peer).await,
                        }
                    });
                }
            }
            Command::Close => {
                self.state.close();
                self.render_all();
            }
            Command::Quit => {}
        }
        self.flush_notices();
    }

    pub fn handle_push(&mut self, msg: ChatMessage) {
        match self.state.apply_push(msg) {
            PushOutcome::Duplicate => {}
            PushOutcome::Applied {
                appended,
                needs_refresh,
            } => {
                if appended {
                    self.render_messages();
                }
                self.render_conversations();
                if needs_refresh {
                    debug!("push for an unlisted conversation, refreshing list");
                    self.handle_command(Command::Refresh);
                }
            }
        }
        self.flush_notices();
    }

    pub fn handle_result(&mut self, done: TaskResult) {
        match done {
            TaskResult::Conversations(Ok(list)) => {
                self.state.load_conversations(list);
                self.render_conversations();
            }
            TaskResult::Conversations(Err(e)) => {
                warn!("loading conversations failed: {e}");
                self.state.conversations_failed(&e.to_string());
                self.render_conversations();
            }
            TaskResult::History { key, result: Ok(list) } => {
                self.state.load_history(&key, list);
                self.render_messages();
            }
            TaskResult::History { key, result: Err(e) } => {
                warn!("loading history of {key} failed: {e}");
                self.state.history_failed(&key, &e.to_string());
                self.render_messages();
            }
            TaskResult::Sent { message, result: Ok(id) } => {
                let known = self.state.confirm_send(&message, id);
                self.render_messages();
                self.render_conversations();
                if !known {
                    self.handle_command(Command::Refresh);
                }
            }
            TaskResult::Sent { message, result: Err(e) } => {
                warn!("sending message failed: {e}");
                self.state.fail_send(&message, &e.to_string());
                self.render_messages();
            }
            TaskResult::Created { text, result: Ok(conv) } => {
                let peer = conv.peer.id;
                self.state.upsert_conversation(conv);
                self.handle_command(Command::Open(peer));
                if let Some(text) = text {
                    self.handle_command(Command::Send(text));
                }
            }
            TaskResult::Created { result: Err(e), .. } => {
                warn!("creating conversation failed: {e}");
                self.state
                    .notify(NoticeLevel::Error, format!("Could not start the conversation: {e}"));
            }
        }
        self.flush_notices();
    }

    fn fetch_history(&self, key: String, peer: UserId) {
        let me = self.state.me();
        let backend = Arc::clone(&self.backend);
        spawn_to_queue(self.results_tx.clone(), async move {
            TaskResult::History {
                key,
                result: backend.history(me, peer).await,
            }
        });
    }

    fn render_conversations(&mut self) {
        self.view
            .conversations(self.state.conversations(), self.state.active_key());
    }

    fn render_messages(&mut self) {
        self.view
            .messages(self.state.me(), self.state.active_key(), self.state.messages());
    }

    fn render_all(&mut self) {
        self.render_conversations();
        self.render_messages();
    }

    fn flush_notices(&mut self) {
        for notice in self.state.drain_notices() {
            self.view.notice(&notice);
        }
    }

    #[cfg(test)]
    async fn next_result(&mut self) -> TaskResult {
        self.results_rx.recv().await.expect("session holds a sender")
    }
}

enum Event {
    Command(Command),
    Push(ChatMessage),
    Done(TaskResult),
}

async fn next_frame(frames: &mut Option<mpsc::Receiver<ChatMessage>>) -> Option<ChatMessage> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
