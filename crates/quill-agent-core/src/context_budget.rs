//! Two-tier context budgeting for the per-role working set.
//!
//! Soft compaction shrinks tool results that predate the latest model
//! response; hard trimming drops whole older messages when the total
//! still exceeds the ceiling. The first two messages (system + task)
//! and the last two (most recent exchange) are never removed.

use quill_ai::{ContentBlock, Message, MessageRole};
use tracing::{info, warn};

/// Max chars kept per older tool result during soft compaction.
pub const COMPACT_TOOL_CHARS: usize = 500;

/// Hard ceiling on total working-set chars before whole messages drop.
pub const MAX_TOTAL_CONTEXT_CHARS: usize = 12_000;

const COMPACTION_MARKER: &str = " ... [earlier result trimmed]";

/// Total text chars across the working set.
pub fn context_chars(working: &[Message]) -> usize {
    working
        .iter()
        .map(|message| message.text_content().chars().count())
        .sum()
}

/// Shrinks tool results older than the last assistant message in place.
/// Monotonic within one invocation: a shrunk result stays shrunk.
pub fn compact_older_tool_results(working: &mut [Message]) {
    let Some(last_assistant_idx) = working
        .iter()
        .rposition(|message| message.role == MessageRole::Assistant)
    else {
        return;
    };
    if last_assistant_idx == 0 {
        return;
    }

    let mut freed = 0usize;
    for message in &mut working[..last_assistant_idx] {
        if message.role != MessageRole::Tool {
            continue;
        }
        let text = message.text_content();
        let original = text.chars().count();
        if original <= COMPACT_TOOL_CHARS {
            continue;
        }

        let short: String = text.chars().take(COMPACT_TOOL_CHARS).collect();
        let compacted = format!("{short}{COMPACTION_MARKER}");
        freed += original.saturating_sub(compacted.chars().count());
        message.content = vec![ContentBlock::Text { text: compacted }];
    }

    if freed > 0 {
        info!(freed_chars = freed, "compacted older tool results");
    }
}

/// Drops whole older messages until the working set fits `target_chars`.
/// Protects the first two and last two messages so the system prompt
/// and the most recent exchange always survive.
pub fn hard_trim_context(working: &mut Vec<Message>, target_chars: usize) {
    if working.len() <= 4 {
        return;
    }

    let mut total = context_chars(working);
    let mut to_remove: Vec<usize> = Vec::new();
    let mut removed_chars = 0usize;

    for idx in 2..working.len() - 2 {
        if total.saturating_sub(removed_chars) <= target_chars {
            break;
        }
        let chars = working[idx].text_content().chars().count();
        if chars > 0 {
            to_remove.push(idx);
            removed_chars += chars;
        }
    }

    if to_remove.is_empty() {
        return;
    }

    for idx in to_remove.iter().rev() {
        working.remove(*idx);
    }
    total = total.saturating_sub(removed_chars);
    warn!(
        removed = to_remove.len(),
        removed_chars,
        remaining_chars = total,
        limit = target_chars,
        "hard-trimmed working context"
    );
}
