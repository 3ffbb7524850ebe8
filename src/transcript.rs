//! Typed schema for newline-delimited transcript messages
//!
//! ## Overview
//!
//! The external agent process emits one JSON document per line. The engine
//! only cares about a narrow slice of each document: the role, the model,
//! token usage, and any tool-use items in the content array. This module
//! validates that slice at parse time with a tagged schema instead of
//! poking at open maps.
//!
//! Validation fails closed: a line whose content array carries a block the
//! schema does not know is rejected whole rather than partially read.
//! Callers treat a rejected line as opaque transcript data and skip it.

use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;

/// One parsed transcript line
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEntry {
    /// Entry kind as reported by the transcript source
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload, absent on bookkeeping entries
    #[serde(default)]
    pub message: Option<Message>,
}

/// Message payload of a transcript entry
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message author role (`user`, `assistant`)
    #[serde(default)]
    pub role: Option<String>,
    /// Model that produced this message
    #[serde(default)]
    pub model: Option<String>,
    /// Token accounting for this message
    #[serde(default)]
    pub usage: Option<Usage>,
    /// Message content, either a bare string or structured blocks
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Token usage counters reported per message
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

impl Usage {
    /// Total tokens consumed by this message
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// Message content, which the wire format carries in two shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content (typical for user prompts)
    Text(String),
    /// Structured content blocks (typical for assistant turns)
    Blocks(Vec<ContentBlock>),
}

/// A structured content block
///
/// The set of variants is the transcript contract; a block of any other
/// kind fails the whole line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Assistant or user text
    Text {
        #[serde(default)]
        text: String,
    },
    /// A tool invocation with its input payload
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Result of a prior tool invocation
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
    },
}

impl TranscriptEntry {
    /// Parse one transcript line against the schema
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Iterate over tool-use blocks as (tool name, input) pairs
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.content_blocks().filter_map(|block| match block {
            ContentBlock::ToolUse { name, input } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    /// Whether this entry carries at least one tool use
    pub fn has_tool_use(&self) -> bool {
        self.tool_uses().next().is_some()
    }

    /// Extract the prompt text if this is a user entry with string content
    pub fn user_prompt(&self) -> Option<&str> {
        let message = self.message.as_ref()?;
        if message.role.as_deref() != Some("user") {
            return None;
        }
        match message.content.as_ref()? {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(_) => None,
        }
    }

    fn content_blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.message
            .iter()
            .filter_map(|m| match m.content.as_ref() {
                Some(MessageContent::Blocks(blocks)) => Some(blocks.iter()),
                _ => None,
            })
            .flatten()
    }
}
