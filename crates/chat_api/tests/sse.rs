use chat_api::{FrameDecoder, StreamEvent};
use serde_json::json;

fn delta_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"content": content}}]})
    )
}

#[test]
fn frame_decoder_parses_frames_and_done() {
    let payload = format!("{}{}data: [DONE]\n\n", delta_frame("hel"), delta_frame("lo"));

    let events = FrameDecoder::decode_str(&payload);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StreamEvent::DataFrame(_)));
    assert!(matches!(events[1], StreamEvent::DataFrame(_)));
    assert_eq!(events[2], StreamEvent::Terminator);
}

#[test]
fn frame_decoder_downgrades_malformed_json_and_continues() {
    let payload = format!("data: {{broken-json\n{}", delta_frame("x"));

    let events = FrameDecoder::decode_str(&payload);
    assert_eq!(events.len(), 2);
    match &events[0] {
        StreamEvent::Malformed { payload, error } => {
            assert_eq!(payload, "{broken-json");
            assert!(!error.is_empty());
        }
        other => panic!("expected malformed frame, got {other:?}"),
    }
    assert!(matches!(events[1], StreamEvent::DataFrame(_)));
}

#[test]
fn frame_decoder_skips_heartbeats_comments_and_empty_data() {
    let payload = format!(
        "\n\n: ping\nevent: message\nid: 7\ndata: \n{}\n",
        delta_frame("done")
    );

    let events = FrameDecoder::decode_str(&payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::DataFrame(_)));
}

#[test]
fn frame_decoder_handles_split_frames_incrementally() {
    let mut decoder = FrameDecoder::default();
    assert!(decoder
        .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"abc\"}}")
        .is_empty());
    let mut events = decoder.feed(b"]}\n");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events.pop(),
        Some(StreamEvent::DataFrame(
            json!({"choices": [{"delta": {"content": "abc"}}]})
        ))
    );
}

#[test]
fn frame_decoder_flushes_unterminated_trailing_line_on_finish() {
    let mut decoder = FrameDecoder::default();
    assert!(decoder.feed(b"data: [DONE]").is_empty());
    assert!(!decoder.is_empty_buffer());
    assert_eq!(decoder.finish(), Some(StreamEvent::Terminator));
    assert!(decoder.is_terminated());
}

#[test]
fn frame_decoder_keeps_incomplete_trailing_bytes_buffered() {
    let mut decoder = FrameDecoder::default();
    assert!(decoder.feed(b"data: {\"choices\":[]").is_empty());
    assert!(!decoder.is_empty_buffer());
    assert!(!decoder.is_terminated());
}
