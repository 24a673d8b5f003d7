//! Property tests for batch codecs.

use edgesync_codec::Value;
use edgesync_protocol::{Actor, CodecKind, QueueEntry};
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z0-9 ]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn arb_entry() -> impl Strategy<Value = QueueEntry> {
    (
        1u64..1_000_000,
        "[a-z_]{1,24}",
        prop::collection::vec(arb_value(), 0..4),
        0u64..10_000,
        0u64..4_000_000_000,
    )
        .prop_map(|(id, action_name, action_args, user_id, timestamp)| QueueEntry {
            id,
            action_name,
            action_args,
            actor: Actor::user(user_id),
            timestamp,
            enqueued_at: timestamp,
        })
}

proptest! {
    #[test]
    fn batches_survive_both_codecs(entries in prop::collection::vec(arb_entry(), 0..8)) {
        for kind in [CodecKind::Cbor, CodecKind::Json] {
            let codec = kind.build();
            let payload = codec.encode(&entries).unwrap();
            prop_assert_eq!(&codec.decode(&payload).unwrap(), &entries);
        }
    }

    #[test]
    fn cbor_encoding_is_deterministic(entries in prop::collection::vec(arb_entry(), 1..4)) {
        let codec = CodecKind::Cbor.build();
        prop_assert_eq!(codec.encode(&entries).unwrap(), codec.encode(&entries).unwrap());
    }
}
