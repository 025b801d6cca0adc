use vectra_core::Metric;
use vectra_store::core_store::CoreStore;
use vectra_store::wal::{encode_segment, replay_into, verify, WalRecord};

#[test]
fn truncated_segment_stops_replay_without_erroring() {
    let records = vec![
        WalRecord::Upsert {
            id: 1,
            vector: vec![0.5, 0.5, 0.5],
            meta: None,
        },
        WalRecord::Upsert {
            id: 2,
            vector: vec![0.1, 0.2, 0.3],
            meta: None,
        },
    ];
    let full = encode_segment(&records, false).unwrap();
    let truncated = &full[..full.len() - 4];

    let mut state = CoreStore::new(3, Metric::Dot, 4);
    let stats = replay_into(truncated, &mut state);
    assert_eq!(stats.applied, 1);
    assert!(state.contains(1));
    assert!(!state.contains(2));
}

#[test]
fn crc_corruption_is_detected_by_verify_not_replay() {
    let records = vec![WalRecord::Upsert {
        id: 1,
        vector: vec![0.5, 0.5, 0.5],
        meta: None,
    }];
    let mut bytes = encode_segment(&records, true).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;

    let result = verify(&bytes);
    assert!(!result.ok);
}

#[test]
fn multi_segment_file_on_disk_replays_fully() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.bin");

    let seg_a = encode_segment(
        &[WalRecord::Upsert {
            id: 1,
            vector: vec![1.0, 0.0, 0.0],
            meta: None,
        }],
        false,
    )
    .unwrap();
    let seg_b = encode_segment(&[WalRecord::Remove { id: 1 }], false).unwrap();

    std::fs::write(&path, [seg_a, seg_b].concat()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut state = CoreStore::new(3, Metric::Dot, 4);
    let stats = replay_into(&bytes, &mut state);
    assert_eq!(stats.applied, 2);
    assert!(!state.contains(1));
}
