//! Stale reasoning removal
//!
//! Reasoning from completed turns is useless to continue a conversation and several
//! vendors reject it. Inside the current turn (everything from the last user message
//! on, including a tool-call loop) it must be kept, because vendors such as DeepSeek
//! require it to be sent back.

use std::borrow::Cow;

use crate::types::{ChatRole, NeutralContent, NeutralMessage};

/// Drop `Think` blocks from assistant messages that precede the last user message.
///
/// Returns the input borrowed when nothing has to change, so callers can detect the
/// no-op by identity. Only changed messages are cloned.
pub fn remove_non_current_turn_thinking(messages: &[NeutralMessage]) -> Cow<'_, [NeutralMessage]> {
    let Some(last_user) = messages.iter().rposition(|m| m.role == ChatRole::User) else {
        return Cow::Borrowed(messages);
    };
    if last_user == 0 {
        return Cow::Borrowed(messages);
    }

    let stale = |m: &NeutralMessage| m.role == ChatRole::Assistant && m.has_think();
    if !messages[..last_user].iter().any(stale) {
        return Cow::Borrowed(messages);
    }

    let filtered = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if i < last_user && stale(m) {
                NeutralMessage {
                    role: m.role,
                    contents: m
                        .contents
                        .iter()
                        .filter(|c| !matches!(c, NeutralContent::Think { .. }))
                        .cloned()
                        .collect(),
                }
            } else {
                m.clone()
            }
        })
        .collect();
    Cow::Owned(filtered)
}
