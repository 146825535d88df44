//! Property-based tests for the `BroadChat` wire format.
//!
//! Uses proptest to verify:
//! 1. Any chat text survives the envelope encode → decode round-trip,
//!    including text that needs JSON escaping.
//! 2. The permissive inbound parse never panics on arbitrary input.
//! 3. A structured `{"text": ...}` payload always yields its text verbatim.
//! 4. Announcement envelopes preserve their client count on the wire.

use proptest::prelude::*;

use broadchat_proto::codec;
use broadchat_proto::envelope::Envelope;

proptest! {
    #[test]
    fn chat_text_survives_the_wire(text in ".*") {
        let envelope = Envelope::chat("client-1", text.clone());
        let json = codec::encode(&envelope).unwrap();
        let decoded = codec::decode(&json).unwrap();
        prop_assert_eq!(decoded.text.as_deref(), Some(text.as_str()));
        prop_assert_eq!(decoded.client_id.as_deref(), Some("client-1"));
    }

    #[test]
    fn inbound_parse_never_panics(raw in ".*") {
        // Both outcomes are acceptable; panicking is not.
        let _ = codec::extract_text(&raw);
    }

    #[test]
    fn structured_payload_yields_its_text(text in ".*") {
        let raw = serde_json::json!({ "text": &text }).to_string();
        let extracted = codec::extract_text(&raw).unwrap();
        prop_assert_eq!(extracted, text);
    }

    #[test]
    fn announcement_counts_survive_the_wire(count in 1usize..100_000) {
        for envelope in [Envelope::join("client-7", count), Envelope::leave("client-7", count)] {
            let json = codec::encode(&envelope).unwrap();
            let decoded = codec::decode(&json).unwrap();
            prop_assert_eq!(decoded.clients_count, Some(count));
        }
    }
}
