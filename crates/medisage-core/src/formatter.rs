//! Builds the outbound message list for a completion request.
//!
//! Each turn becomes one role-tagged block list: the text block first (when
//! there is text), then one block per attachment in the order supplied.
//! Images travel as `image_url` blocks; documents only as text pointers,
//! since the endpoint accepts text and image content only.

use crate::{EngineError, Result};
use medisage_types::{
    Attachment, AttachmentKind, ContentBlock, ConversationTurn, MessageContent, Role, WireMessage,
};

/// Text block used in place of a document attachment.
pub fn document_reference(attachment: &Attachment) -> String {
    format!(
        "Document reference: {} at {}",
        attachment.display_name, attachment.url
    )
}

fn attachment_block(attachment: &Attachment) -> ContentBlock {
    match attachment.kind {
        AttachmentKind::Image => ContentBlock::image(attachment.url.clone()),
        AttachmentKind::Document => ContentBlock::text(document_reference(attachment)),
    }
}

/// Blocks for new user input. Fails with `EmptyMessage` when there is
/// neither text nor an attachment.
pub fn user_blocks(text: &str, attachments: &[Attachment]) -> Result<Vec<ContentBlock>> {
    if text.trim().is_empty() && attachments.is_empty() {
        return Err(EngineError::EmptyMessage);
    }

    let mut blocks = Vec::with_capacity(attachments.len() + 1);
    if !text.trim().is_empty() {
        blocks.push(ContentBlock::text(text));
    }
    blocks.extend(attachments.iter().map(attachment_block));
    Ok(blocks)
}

fn turn_blocks(turn: &ConversationTurn) -> Vec<ContentBlock> {
    let mut blocks = match &turn.content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
        MessageContent::Blocks(blocks) => blocks.clone(),
    };
    blocks.extend(turn.attachments.iter().map(attachment_block));
    blocks
}

/// Format prior turns plus the new input.
///
/// System turns are dropped and only the last `window` remaining turns are
/// kept. Prior turns that carry no content are skipped.
pub fn format_conversation(
    history: &[ConversationTurn],
    text: &str,
    attachments: &[Attachment],
    window: usize,
) -> Result<Vec<WireMessage>> {
    let current = user_blocks(text, attachments)?;

    let prior: Vec<&ConversationTurn> = history.iter().filter(|t| t.role != Role::System).collect();
    let start = prior.len().saturating_sub(window);

    let mut messages: Vec<WireMessage> = prior[start..]
        .iter()
        .filter_map(|turn| {
            let blocks = turn_blocks(turn);
            (!blocks.is_empty()).then(|| WireMessage {
                role: turn.role,
                content: MessageContent::Blocks(blocks),
            })
        })
        .collect();

    messages.push(WireMessage {
        role: Role::User,
        content: MessageContent::Blocks(current),
    });
    Ok(messages)
}
