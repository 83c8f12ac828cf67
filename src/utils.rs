use chrono::{Local, TimeZone};
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

/// Runs `fut` on the runtime and delivers its output to the loop that owns `tx`.
pub fn spawn_to_queue<T, Fut>(tx: UnboundedSender<T>, fut: Fut)
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    tokio::spawn(async move {
        let _ = tx.send(fut.await);
    });
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn format_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%d/%m %H:%M").to_string(),
        None => "--".into(),
    }
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

pub fn normalize_ws_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("wss://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_get_a_scheme() {
        assert_eq!(normalize_url(" market.vn/ "), "https://market.vn");
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_ws_url("push.market.vn/ws"), "wss://push.market.vn/ws");
        assert_eq!(normalize_ws_url("http://localhost:8080/ws"), "ws://localhost:8080/ws");
        assert_eq!(normalize_ws_url("wss://a.b/"), "wss://a.b");
    }

    #[tokio::test]
    async fn spawned_results_reach_the_queue() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_to_queue(tx, async { 40 + 2 });
        assert_eq!(rx.recv().await, Some(42));
    }
}
