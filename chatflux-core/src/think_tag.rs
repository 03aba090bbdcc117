//! `<think>` markup extraction
//!
//! Some vendors return reasoning inline as `<think>...</think>` at the very start of
//! the text output. The parser re-labels that region as `Think` segments.
//!
//! The start marker only counts when it is the first text of the stream. Only the
//! bytes needed to decide that are buffered; inside the think region only a possible
//! partial end marker is held back.

use futures_util::StreamExt;

use crate::streaming::ChatSegmentStream;
use crate::types::ChatSegment;

const START_TAG: &str = "<think>";
const END_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Undecided,
    Think,
    Text,
}

/// Incremental think-tag state machine.
#[derive(Debug)]
pub struct ThinkTagParser {
    mode: Mode,
    pre_buffer: String,
    think_buffer: String,
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self {
            mode: Mode::Undecided,
            pre_buffer: String::new(),
            think_buffer: String::new(),
        }
    }

    /// Wrap a segment stream. Non-text segments pass through in place.
    pub fn parse(stream: ChatSegmentStream) -> ChatSegmentStream {
        let mut inner = stream;
        Box::pin(async_stream::stream! {
            let mut parser = ThinkTagParser::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(ChatSegment::Text { text }) => {
                        for segment in parser.push_text(&text) {
                            yield Ok(segment);
                        }
                    }
                    other => yield other,
                }
            }
            for segment in parser.finish() {
                yield Ok(segment);
            }
        })
    }

    /// Feed one text token.
    pub fn push_text(&mut self, token: &str) -> Vec<ChatSegment> {
        let mut out = Vec::new();
        let mut token = token.to_string();

        if self.mode == Mode::Undecided {
            self.pre_buffer.push_str(&token);
            if self.pre_buffer.len() > START_TAG.len() {
                if self.pre_buffer.starts_with(START_TAG) {
                    self.mode = Mode::Think;
                    token = self.pre_buffer.split_off(START_TAG.len());
                    self.pre_buffer.clear();
                } else {
                    self.mode = Mode::Text;
                    out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
                    return out;
                }
            } else if self.pre_buffer == START_TAG {
                self.mode = Mode::Think;
                self.pre_buffer.clear();
                return out;
            } else if !START_TAG.starts_with(self.pre_buffer.as_str()) {
                self.mode = Mode::Text;
                out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
                return out;
            } else {
                return out;
            }
        }

        if token.is_empty() {
            return out;
        }
        if self.mode == Mode::Text {
            out.push(ChatSegment::text(token));
            return out;
        }

        self.think_buffer.push_str(&token);
        while !self.think_buffer.is_empty() {
            if let Some(index) = self.think_buffer.find(END_TAG) {
                if index > 0 {
                    out.push(ChatSegment::think(&self.think_buffer[..index]));
                }
                let rest = &self.think_buffer[index + END_TAG.len()..];
                if !rest.is_empty() {
                    out.push(ChatSegment::text(rest));
                }
                self.think_buffer.clear();
                self.mode = Mode::Text;
                break;
            }

            let overlap = end_tag_overlap(&self.think_buffer);
            let emit_len = self.think_buffer.len() - overlap;
            if emit_len == 0 {
                break;
            }
            let held = self.think_buffer.split_off(emit_len);
            out.push(ChatSegment::think(std::mem::replace(
                &mut self.think_buffer,
                held,
            )));
        }
        out
    }

    /// Flush whatever is still buffered at end of stream.
    pub fn finish(&mut self) -> Vec<ChatSegment> {
        let mut out = Vec::new();
        if self.mode == Mode::Undecided && !self.pre_buffer.is_empty() {
            out.push(ChatSegment::text(std::mem::take(&mut self.pre_buffer)));
        }
        if self.mode == Mode::Think && !self.think_buffer.is_empty() {
            out.push(ChatSegment::think(std::mem::take(&mut self.think_buffer)));
        }
        out
    }
}

/// Longest suffix of `s` that is a prefix of the end marker.
fn end_tag_overlap(s: &str) -> usize {
    let max = s.len().min(END_TAG.len());
    (1..=max)
        .rev()
        .find(|&len| s.ends_with(&END_TAG[..len]))
        .unwrap_or(0)
}
