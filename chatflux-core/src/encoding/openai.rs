//! `chat.completion.chunk` encoding
//!
//! Segment-level deltas only. The closing chunk with finish reason and usage comes from
//! `ChatResponse::to_final_chunk` once the stream has been aggregated.

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};

use crate::aggregate::ChatAggregator;
use crate::transport::ByteStream;
use crate::streaming::{ChatSegmentStream, encode_sse_data};
use crate::types::ChatSegment;

/// Delta chunk for one segment, or `None` for segments carried by the final chunk.
pub fn segment_to_chunk(segment: &ChatSegment, id: &str, model: &str, created: i64) -> Option<Value> {
    let delta = match segment {
        ChatSegment::Text { text } => json!({ "content": text }),
        ChatSegment::Think { content, .. } => json!({ "reasoning_content": content }),
        ChatSegment::ToolCall(call) => {
            let mut function = serde_json::Map::new();
            if let Some(name) = &call.name {
                function.insert("name".into(), json!(name));
            }
            function.insert("arguments".into(), json!(call.arguments));
            let mut tool_call = serde_json::Map::new();
            tool_call.insert("index".into(), json!(call.index));
            if let Some(id) = &call.id {
                tool_call.insert("id".into(), json!(id));
                tool_call.insert("type".into(), json!("function"));
            }
            tool_call.insert("function".into(), Value::Object(function));
            json!({ "tool_calls": [Value::Object(tool_call)] })
        }
        ChatSegment::Usage(_) | ChatSegment::FinishReason { .. } | ChatSegment::Error { .. } => {
            return None;
        }
    };
    Some(json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": null,
        }],
    }))
}

/// `data: {json}\n\n`
pub fn encode_chunk_sse(chunk: &Value) -> Bytes {
    encode_sse_data(&chunk.to_string())
}

/// `data: [DONE]\n\n`
pub fn done_event() -> Bytes {
    encode_sse_data("[DONE]")
}

/// Forward a segment stream as an OpenAI-compatible SSE body.
///
/// Deltas are emitted as they arrive; the stream closes with the aggregated final chunk
/// and `[DONE]`. An upstream error ends the body with that error after the final chunk
/// has been written, so clients still see a finish reason.
pub fn encode_chat_stream_as_sse(
    mut stream: ChatSegmentStream,
    id: String,
    model: String,
    created: i64,
) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut aggregator = ChatAggregator::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(segment) => {
                    if let Some(chunk) = segment_to_chunk(&segment, &id, &model, created) {
                        yield Ok(encode_chunk_sse(&chunk));
                    }
                    aggregator.push(&segment);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        let response = aggregator.finish();
        yield Ok(encode_chunk_sse(&response.to_final_chunk(&id, &model, created)));
        match failure {
            Some(e) if !e.is_cancellation() => yield Err(e),
            _ => yield Ok(done_event()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::types::{FinishReason, Usage};

    #[test]
    fn text_and_reasoning_deltas() {
        let chunk = segment_to_chunk(&ChatSegment::text("Hi"), "c1", "m", 1).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["content"], "Hi");
        assert!(chunk["choices"][0]["finish_reason"].is_null());

        let chunk = segment_to_chunk(&ChatSegment::think("hmm"), "c1", "m", 1).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["reasoning_content"], "hmm");
    }

    #[test]
    fn tool_call_header_and_fragment() {
        let header = ChatSegment::tool_call(2, Some("call_1".into()), Some("f".into()), "");
        let chunk = segment_to_chunk(&header, "c1", "m", 1).unwrap();
        let call = &chunk["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["index"], 2);
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "f");

        let fragment = ChatSegment::tool_call(2, None, None, "{\"a\":1}");
        let chunk = segment_to_chunk(&fragment, "c1", "m", 1).unwrap();
        let call = &chunk["choices"][0]["delta"]["tool_calls"][0];
        assert!(call.get("id").is_none());
        assert_eq!(call["function"]["arguments"], "{\"a\":1}");
    }

    #[test]
    fn metadata_segments_have_no_delta() {
        assert!(segment_to_chunk(&ChatSegment::Usage(Usage::new(1, 1)), "c", "m", 0).is_none());
        assert!(segment_to_chunk(&ChatSegment::finish(FinishReason::Stop), "c", "m", 0).is_none());
    }

    #[test]
    fn done_framing() {
        assert_eq!(&done_event()[..], b"data: [DONE]\n\n");
        assert_eq!(&encode_chunk_sse(&json!({"a": 1}))[..], b"data: {\"a\":1}\n\n");
    }

    #[tokio::test]
    async fn forwards_stream_with_final_chunk() {
        let input: ChatSegmentStream = Box::pin(futures::stream::iter(vec![
            Ok::<_, LlmError>(ChatSegment::text("Hel")),
            Ok(ChatSegment::text("lo")),
            Ok(ChatSegment::Usage(Usage::new(5, 2))),
            Ok(ChatSegment::finish(FinishReason::Stop)),
        ]));
        let frames: Vec<Bytes> = encode_chat_stream_as_sse(input, "c1".into(), "m".into(), 7)
            .map(|b| b.unwrap())
            .collect()
            .await;
        assert_eq!(frames.len(), 4);
        let final_chunk: Value =
            serde_json::from_slice(&frames[2][b"data: ".len()..frames[2].len() - 2]).unwrap();
        assert_eq!(final_chunk["choices"][0]["finish_reason"], "stop");
        assert_eq!(final_chunk["usage"]["total_tokens"], 7);
        assert_eq!(frames[3], done_event());
    }
}
