use std::io::BufRead;

use tokio::sync::mpsc;

use crate::api::client::ApiClient;
use crate::api::events::PushChannel;
use crate::api::models::UserId;
use crate::app::AppConfig;
use crate::chat::session::{ChatSession, Command};
use crate::error::CliError;
use crate::storage::Session;
use crate::ui::chat_view::TerminalView;

const HELP: &str = "/open <user id>  open a conversation
/new <user id> [message]  start a conversation with a seller
/list  reload conversations
/close  close the open conversation
/quit  leave the chat
anything else is sent to the open conversation";

/// Turns one typed line into a chat command. `None` for blank lines,
/// `Err` carries text to show the user.
pub fn parse_input(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Send(line.to_string())));
    };
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let parse_peer = |raw: &str| {
        raw.parse::<UserId>()
            .map_err(|_| format!("`{raw}` is not a user id"))
    };
    Some(match name {
        "open" => parse_peer(args).map(Command::Open),
        "new" => {
            let (peer, text) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            parse_peer(peer).map(|peer| Command::Start { peer, text })
        }
        "list" => Ok(Command::Refresh),
        "close" => Ok(Command::Close),
        "quit" | "exit" => Ok(Command::Quit),
        "help" => Err(HELP.to_string()),
        other => Err(format!("unknown command /{other}; try /help")),
    })
}

/// Interactive chat: stdin feeds the session, the push channel lives until
/// the session ends.
pub async fn run_chat(config: &AppConfig, session: &Session, open_with: Option<UserId>) -> Result<(), CliError> {
    let client = ApiClient::new(config, session.token.clone())?;
    let push = PushChannel::new(
        &config.ws_url,
        session.user_id,
        session.token.as_deref(),
        config.reconnect_delay(),
    )?;

    let (tx, rx) = mpsc::channel::<Command>(32);
    if let Some(peer) = open_with {
        tx.send(Command::Open(peer))
            .await
            .map_err(|_| CliError::Usage("chat session ended early".into()))?;
    }

    println!("Signed in as {} (#{}). Type /help for commands.", session.display_name, session.user_id);

    // a plain thread, so a pending read never holds the runtime open at exit
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_input(&line) {
                Some(Ok(cmd)) => {
                    let quit = cmd == Command::Quit;
                    if tx.blocking_send(cmd).is_err() || quit {
                        return;
                    }
                }
                Some(Err(hint)) => println!("{hint}"),
                None => {}
            }
        }
        let _ = tx.blocking_send(Command::Quit);
    });

    let view = TerminalView::new(std::io::stdout());
    ChatSession::new(session.user_id, client, view)
        .run(rx, Some(push))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(parse_input("  hello  "), Some(Ok(Command::Send("hello".into()))));
        assert_eq!(parse_input("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/open 12"), Some(Ok(Command::Open(12))));
        assert_eq!(
            parse_input("/new 12 is the VF8 available?"),
            Some(Ok(Command::Start { peer: 12, text: Some("is the VF8 available?".into()) }))
        );
        assert_eq!(parse_input("/new 40"), Some(Ok(Command::Start { peer: 40, text: None })));
        assert_eq!(parse_input("/list"), Some(Ok(Command::Refresh)));
        assert_eq!(parse_input("/quit"), Some(Ok(Command::Quit)));
    }

    #[test]
    fn bad_commands_explain_themselves() {
        assert!(matches!(parse_input("/open abc"), Some(Err(e)) if e.contains("abc")));
        assert!(matches!(parse_input("/dance"), Some(Err(e)) if e.contains("/help")));
        assert!(matches!(parse_input("/help"), Some(Err(e)) if e.contains("/open")));
    }
}
