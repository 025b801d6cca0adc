use proptest::prelude::*;
use vectra_core::Metric;
use vectra_store::core_store::CoreStore;
use vectra_store::wal::{encode_segment, replay_into, WalRecord};

const DIM: usize = 4;

fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1000.0f32..1000.0, DIM)
}

fn arb_record() -> impl Strategy<Value = WalRecord> {
    prop_oneof![
        (any::<u32>(), arb_vector()).prop_map(|(id, vector)| WalRecord::Upsert {
            id,
            vector,
            meta: None,
        }),
        any::<u32>().prop_map(|id| WalRecord::Remove { id }),
    ]
}

fn apply_reference(records: &[WalRecord], state: &mut std::collections::HashMap<u32, Vec<f32>>) {
    for r in records {
        match r {
            WalRecord::Upsert { id, vector, .. } => {
                state.insert(*id, vector.clone());
            }
            WalRecord::Remove { id } => {
                state.remove(id);
            }
            WalRecord::SetMeta { .. } => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn replay_matches_sequential_application(records in proptest::collection::vec(arb_record(), 1..50)) {
        let bytes = encode_segment(&records, false).unwrap();
        let mut store_state = CoreStore::new(DIM, Metric::Dot, 4);
        replay_into(&bytes, &mut store_state);

        let mut reference = std::collections::HashMap::new();
        apply_reference(&records, &mut reference);

        prop_assert_eq!(store_state.count(), reference.len());
        for (id, vector) in &reference {
            prop_assert_eq!(store_state.get(*id), Some(vector.as_slice()));
        }
    }

    #[test]
    fn replaying_twice_from_fresh_state_is_idempotent(records in proptest::collection::vec(arb_record(), 1..50)) {
        let bytes = encode_segment(&records, false).unwrap();

        let mut once = CoreStore::new(DIM, Metric::Dot, 4);
        replay_into(&bytes, &mut once);

        let mut twice = CoreStore::new(DIM, Metric::Dot, 4);
        replay_into(&bytes, &mut twice);
        replay_into(&bytes, &mut twice);

        prop_assert_eq!(once.count(), twice.count());
    }
}
