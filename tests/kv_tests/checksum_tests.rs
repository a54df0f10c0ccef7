//! Tests for KvChecksum and checksum comparison
//!
//! These tests verify:
//! - Checksums do not depend on pair order or grouping
//! - Byte and pair totals are tracked
//! - Comparison reports only the fields that differ

use dumpload::kv::{compare_checksum, KvChecksum, KvPair, RemoteChecksum};
use dumpload::LoadError;

// =============================================================================
// Helper Functions
// =============================================================================

fn pairs() -> Vec<KvPair> {
    vec![
        KvPair::new(&b"k1"[..], &b"v1"[..]),
        KvPair::new(&b"k2"[..], &b"value2"[..]),
        KvPair::new(&b"k3"[..], &b""[..]),
    ]
}

fn remote_of(sum: &KvChecksum) -> RemoteChecksum {
    RemoteChecksum {
        schema: "db".to_string(),
        table: "t".to_string(),
        checksum: sum.sum(),
        total_kvs: sum.sum_kvs(),
        total_bytes: sum.sum_size(),
    }
}

// =============================================================================
// Accumulation
// =============================================================================

#[test]
fn test_totals() {
    let sum = KvChecksum::from_pairs(&pairs());
    assert_eq!(sum.sum_kvs(), 3);
    assert_eq!(sum.sum_size(), 4 + 8 + 2);
    assert_ne!(sum.sum(), 0);
}

#[test]
fn test_order_independent() {
    let mut reversed = pairs();
    reversed.reverse();
    assert_eq!(KvChecksum::from_pairs(&pairs()), KvChecksum::from_pairs(&reversed));
}

#[test]
fn test_merge_matches_single_pass() {
    let all = pairs();
    let mut merged = KvChecksum::from_pairs(&all[..1]);
    merged.add(&KvChecksum::from_pairs(&all[1..]));
    assert_eq!(merged, KvChecksum::from_pairs(&all));

    let mut one_by_one = KvChecksum::default();
    for pair in &all {
        one_by_one.update_one(&pair.key, &pair.val);
    }
    assert_eq!(one_by_one, merged);
}

#[test]
fn test_same_pair_twice_cancels_digest() {
    let pair = &pairs()[0];
    let mut sum = KvChecksum::default();
    sum.update_one(&pair.key, &pair.val);
    sum.update_one(&pair.key, &pair.val);
    assert_eq!(sum.sum(), 0);
    assert_eq!(sum.sum_kvs(), 2);
}

// =============================================================================
// Comparison
// =============================================================================

#[test]
fn test_compare_equal() {
    let local = KvChecksum::from_pairs(&pairs());
    compare_checksum("`db`.`t`", &remote_of(&local), &local).unwrap();
}

#[test]
fn test_compare_reports_differing_fields() {
    let local = KvChecksum::new(10, 2, 5);
    let mut remote = remote_of(&local);
    remote.total_kvs = 3;

    let err = compare_checksum("`db`.`t`", &remote, &local).unwrap_err();
    assert!(matches!(err, LoadError::ChecksumMismatch(_)));
    let msg = err.to_string();
    assert!(msg.contains("(total_kvs: 3 vs 2)"));
    assert!(!msg.contains("checksum:"));
    assert!(!msg.contains("total_bytes"));
}

#[test]
fn test_compare_all_fields_differ() {
    let local = KvChecksum::new(10, 2, 5);
    let remote = RemoteChecksum::default();

    let msg = compare_checksum("`db`.`t`", &remote, &local).unwrap_err().to_string();
    assert!(msg.contains("(checksum: 0 vs 5) (total_kvs: 0 vs 2) (total_bytes: 0 vs 10)"));
}
