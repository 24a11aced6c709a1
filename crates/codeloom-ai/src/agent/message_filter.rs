//! Outbound message cleanup.
//!
//! Applied to a copy of the history before every model call; the stored
//! history is never touched. Running the filter on its own output is a no-op.

use std::collections::HashSet;

use crate::llm::{Message, Role};

/// Produce the message list sent to the provider.
///
/// 1. Drops assistant messages with no content and no tool calls, along with
///    tool results that no longer answer a preceding tool call.
/// 2. Merges adjacent user/user and assistant/assistant messages, joining
///    their content with a blank line, for providers that require strict
///    role alternation.
pub fn filter_outbound(messages: &[Message]) -> Vec<Message> {
    merge_adjacent(drop_empty_turns(messages))
}

fn drop_empty_turns(messages: &[Message]) -> Vec<Message> {
    let mut kept = Vec::with_capacity(messages.len());
    let mut known_calls: HashSet<&str> = HashSet::new();

    for message in messages {
        match message.role {
            Role::Assistant if message.content.trim().is_empty() && message.calls().is_empty() => {
                tracing::debug!("Dropping empty assistant message from outbound history");
            }
            Role::Assistant => {
                known_calls.extend(message.calls().iter().map(|call| call.id.as_str()));
                kept.push(message.clone());
            }
            Role::Tool => {
                let answered = message
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| known_calls.contains(id));
                if answered {
                    kept.push(message.clone());
                } else {
                    tracing::debug!(
                        tool_call_id = ?message.tool_call_id,
                        "Dropping orphaned tool result from outbound history"
                    );
                }
            }
            Role::System | Role::User => kept.push(message.clone()),
        }
    }

    kept
}

fn merge_adjacent(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages {
        if let Some(last) = merged.last_mut()
            && last.role == message.role
            && matches!(message.role, Role::User | Role::Assistant)
        {
            last.content = join_content(&last.content, &message.content);
            if let Some(calls) = message.tool_calls {
                last.tool_calls.get_or_insert_with(Vec::new).extend(calls);
            }
            continue;
        }
        merged.push(message);
    }

    merged
}

fn join_content(first: &str, second: &str) -> String {
    match (first.trim().is_empty(), second.trim().is_empty()) {
        (true, _) => second.to_string(),
        (false, true) => first.to_string(),
        (false, false) => format!("{first}\n\n{second}"),
    }
}
