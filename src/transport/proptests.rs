//! Property tests for the event parser
//!
//! However the body is cut into network chunks, the parser must produce
//! the same events in the same order.

use super::parser::{EventParser, StreamEvent};
use proptest::prelude::*;

fn encode(payloads: &[String], message_id: &str) -> Vec<u8> {
    let mut body = String::new();
    for data in payloads {
        let record = serde_json::json!({
            "type": "code_chunk",
            "data": data,
            "message_id": message_id,
        });
        body.push_str("data: ");
        body.push_str(&record.to_string());
        body.push('\n');
    }
    body.push_str("data: {\"type\":\"completed\",\"data\":\"\",\"message_id\":\"");
    body.push_str(message_id);
    body.push_str("\"}\n");
    body.into_bytes()
}

/// Cut `bytes` at the given (sorted, deduplicated) offsets
fn split_at_offsets(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.retain(|c| *c > 0 && *c < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        pieces.push(&bytes[start..cut]);
        start = cut;
    }
    pieces.push(&bytes[start..]);
    pieces
}

fn arb_payload() -> impl Strategy<Value = String> {
    // Mix ASCII code, newlines and multi-byte characters
    prop_oneof![
        "[a-zA-Z0-9_ ()=:.]{0,24}",
        Just("\n".to_string()),
        Just("    self.play(Create(circle))\n".to_string()),
        "[αβγπ∑√ñé]{1,6}",
        Just("🎬🔵".to_string()),
    ]
}

proptest! {
    #[test]
    fn chunk_boundaries_do_not_change_result(
        payloads in proptest::collection::vec(arb_payload(), 0..12),
        cuts in proptest::collection::vec(0usize..2048, 0..16),
    ) {
        let body = encode(&payloads, "m1");
        let mut parser = EventParser::new();
        let mut events = Vec::new();

        for piece in split_at_offsets(&body, cuts) {
            parser.push(piece);
            while let Some(event) = parser.next_event() {
                events.push(event);
            }
        }

        let (terminal, chunks) = events.split_last().expect("completed event");
        prop_assert!(terminal.is_terminal());

        let code: String = chunks
            .iter()
            .map(|event| match event {
                StreamEvent::CodeChunk { data, .. } => data.as_str(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        prop_assert_eq!(code, payloads.concat());
        prop_assert_eq!(parser.skipped(), 0);
    }

    #[test]
    fn garbage_lines_are_skipped_not_fatal(
        garbage in proptest::collection::vec("[^\n]{1,40}", 1..6),
    ) {
        let mut parser = EventParser::new();
        for line in &garbage {
            parser.push(b"data: ");
            parser.push(line.as_bytes());
            parser.push(b"\n");
        }
        parser.push(b"data: {\"type\":\"code_chunk\",\"data\":\"ok\",\"message_id\":\"m1\"}\n");

        let mut last = None;
        while let Some(event) = parser.next_event() {
            last = Some(event);
        }
        prop_assert_eq!(
            last,
            Some(StreamEvent::CodeChunk { data: "ok".to_string(), message_id: "m1".to_string() })
        );
    }
}
