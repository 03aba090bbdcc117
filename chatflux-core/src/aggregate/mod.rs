//! Segment aggregation
//!
//! Folds a segment sequence into one `ChatResponse` and keeps an ordered, merged copy
//! of the segments for persistence.

use std::collections::BTreeMap;

use futures_util::StreamExt;

use crate::error::LlmError;
use crate::streaming::ChatSegmentStream;
use crate::types::{
    ChatResponse, ChatSegment, FinishReason, NeutralContent, ReasoningBlock, ResponseError,
    ToolCall, ToolCallSegment, Usage,
};

/// Accumulates segments of one response.
#[derive(Debug, Default, Clone)]
pub struct ChatAggregator {
    text: String,
    reasoning: Option<ReasoningBlock>,
    tool_calls: BTreeMap<u32, ToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    error: Option<ResponseError>,
    merged: Vec<ChatSegment>,
}

impl ChatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: &ChatSegment) {
        match segment {
            ChatSegment::Text { text } => self.text.push_str(text),
            ChatSegment::Think { content, signature } => {
                let block = self.reasoning.get_or_insert_with(ReasoningBlock::default);
                block.content.push_str(content);
                if block.signature.as_deref().is_none_or(str::is_empty)
                    && let Some(sig) = signature.as_deref().filter(|s| !s.is_empty())
                {
                    block.signature = Some(sig.to_string());
                }
            }
            ChatSegment::ToolCall(delta) => {
                let call = self.tool_calls.entry(delta.index).or_insert_with(|| ToolCall {
                    index: delta.index,
                    ..Default::default()
                });
                if call.id.is_empty()
                    && let Some(id) = &delta.id
                {
                    call.id.clone_from(id);
                }
                if call.name.is_empty()
                    && let Some(name) = &delta.name
                {
                    call.name.clone_from(name);
                }
                call.arguments.push_str(&delta.arguments);
            }
            ChatSegment::Usage(usage) => self.usage = Some(*usage),
            ChatSegment::FinishReason { reason } => self.finish_reason = Some(*reason),
            ChatSegment::Error { code, message } => {
                self.error = Some(ResponseError {
                    code: code.clone(),
                    message: message.clone(),
                });
            }
        }
        merge_into(&mut self.merged, segment.clone());
    }

    /// Segments with adjacent text, adjacent thinking and same-index tool-call
    /// fragments merged, in arrival order.
    pub fn merged_segments(&self) -> &[ChatSegment] {
        &self.merged
    }

    /// Ordered content blocks for persisting the assistant message.
    pub fn contents(&self) -> Vec<NeutralContent> {
        self.merged
            .iter()
            .filter_map(|segment| match segment {
                ChatSegment::Text { text } => Some(NeutralContent::text(text.clone())),
                ChatSegment::Think { content, signature } => {
                    Some(NeutralContent::think(content.clone(), signature.clone()))
                }
                ChatSegment::ToolCall(call) => Some(NeutralContent::tool_call(
                    call.id.clone().unwrap_or_default(),
                    call.name.clone().unwrap_or_default(),
                    call.arguments.clone(),
                )),
                ChatSegment::Error { message, .. } => Some(NeutralContent::error(message.clone())),
                ChatSegment::Usage(_) | ChatSegment::FinishReason { .. } => None,
            })
            .collect()
    }

    pub fn snapshot(&self) -> ChatResponse {
        self.clone().finish()
    }

    pub fn finish(self) -> ChatResponse {
        ChatResponse {
            text: self.text,
            reasoning: self.reasoning,
            tool_calls: self.tool_calls.into_values().collect(),
            usage: self.usage,
            finish_reason: self.finish_reason,
            error: self.error,
        }
    }

    /// Drain `stream` into a response. The first error aborts with that error.
    pub async fn collect(stream: ChatSegmentStream) -> Result<ChatResponse, LlmError> {
        let (response, error) = Self::collect_partial(stream).await;
        match error {
            Some(e) => Err(e),
            None => Ok(response),
        }
    }

    /// Drain `stream`, keeping whatever arrived before a failure.
    pub async fn collect_partial(mut stream: ChatSegmentStream) -> (ChatResponse, Option<LlmError>) {
        let mut aggregator = Self::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(segment) => aggregator.push(&segment),
                Err(e) => {
                    if aggregator.finish_reason.is_none() {
                        aggregator.finish_reason = Some(if e.is_cancellation() {
                            FinishReason::Cancelled
                        } else {
                            FinishReason::Error
                        });
                    }
                    return (aggregator.finish(), Some(e));
                }
            }
        }
        (aggregator.finish(), None)
    }
}

/// Append `item`, merging it into the last segment when both are of a mergeable kind.
pub fn merge_into(items: &mut Vec<ChatSegment>, item: ChatSegment) {
    let Some(last) = items.last_mut() else {
        items.push(item);
        return;
    };
    match (last, item) {
        (ChatSegment::Text { text }, ChatSegment::Text { text: more }) => text.push_str(&more),
        (
            ChatSegment::Think { content, signature },
            ChatSegment::Think {
                content: more,
                signature: more_sig,
            },
        ) => {
            content.push_str(&more);
            match (signature.as_mut(), more_sig) {
                (Some(sig), Some(more_sig)) => sig.push_str(&more_sig),
                (None, more_sig) => *signature = more_sig,
                (Some(_), None) => {}
            }
        }
        (ChatSegment::ToolCall(last_call), ChatSegment::ToolCall(call))
            if last_call.index == call.index =>
        {
            merge_tool_call(last_call, call);
        }
        (_, item) => items.push(item),
    }
}

fn merge_tool_call(into: &mut ToolCallSegment, delta: ToolCallSegment) {
    if into.id.is_none() {
        into.id = delta.id;
    }
    if into.name.is_none() {
        into.name = delta.name;
    }
    into.arguments.push_str(&delta.arguments);
}
