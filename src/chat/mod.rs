pub mod session;
pub mod state;

use crate::api::models::UserId;

/// Order-independent key for a two-party conversation.
///
/// Ids are compared as decimal strings, so `5` and `12` give `"12_5"`.
pub fn conversation_key(a: UserId, b: UserId) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}
