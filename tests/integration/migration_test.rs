// tests/integration/migration_test.rs

//! Live slot migration: `SLOTSMGRTONE`/`SLOTSMGRTTAGONE` moving individual
//! keys (or their tag group) and `SLOTSMGRTSLOT`/`SLOTSMGRTTAGSLOT` draining
//! a whole slot one key at a time between two running nodes over a real TCP
//! hop (`spec.md` §8, scenarios 4 and 5).

use super::test_helpers::{TestServer, assert_bulk, assert_nil, assert_ok};
use foliokv::core::protocol::RespValue;
use foliokv::core::slot::key_slot;
use std::collections::HashMap;

/// Brute-forces two distinct, untagged keys that land in the same slot, so a
/// single `SLOTSMGRTSLOT` on that slot needs more than one call to drain it
/// (`spec.md` §8's "repeated yields `[1,1]` per call until `[0,0]`").
fn two_keys_sharing_a_slot() -> (String, String) {
    let mut seen: HashMap<u16, String> = HashMap::new();
    for i in 0..100_000u32 {
        let candidate = format!("mkey{i}");
        let slot = key_slot(candidate.as_bytes());
        if let Some(first) = seen.get(&slot) {
            return (first.clone(), candidate);
        }
        seen.insert(slot, candidate);
    }
    panic!("failed to find two keys sharing a slot within the search budget");
}

fn assert_pair(value: &RespValue, n: i64, flag: i64) {
    let expected = RespValue::Array(vec![RespValue::Integer(n), RespValue::Integer(flag)]);
    assert_eq!(value, &expected, "expected [{n}, {flag}]");
}

#[tokio::test]
async fn slotsmgrtone_moves_a_single_key_to_the_destination() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;
    let mut dst_client = dst.connect().await;

    assert_ok(&src_client.command(&["SET", "migrant", "payload"]).await);

    let moved = src_client
        .command(&[
            "SLOTSMGRTONE",
            &dst.addr.ip().to_string(),
            &dst.addr.port().to_string(),
            "0",
            "migrant",
        ])
        .await;
    assert_eq!(moved, RespValue::Integer(1));

    assert_nil(&src_client.command(&["GET", "migrant"]).await);
    assert_bulk(&dst_client.command(&["GET", "migrant"]).await, "payload");
}

#[tokio::test]
async fn slotsmgrtone_of_a_missing_key_moves_nothing() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;

    let moved = src_client
        .command(&[
            "SLOTSMGRTONE",
            &dst.addr.ip().to_string(),
            &dst.addr.port().to_string(),
            "0",
            "nonexistent",
        ])
        .await;
    assert_eq!(moved, RespValue::Integer(0));
}

#[tokio::test]
async fn slotsmgrttagone_moves_the_whole_hash_tag_group_atomically() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;
    let mut dst_client = dst.connect().await;

    assert_ok(&src_client.command(&["SET", "{user1}name", "alice"]).await);
    assert_ok(&src_client.command(&["SET", "{user1}age", "30"]).await);
    // A key sharing no tag with the group must stay behind.
    assert_ok(&src_client.command(&["SET", "unrelated", "x"]).await);

    let moved = src_client
        .command(&[
            "SLOTSMGRTTAGONE",
            &dst.addr.ip().to_string(),
            &dst.addr.port().to_string(),
            "0",
            "{user1}name",
        ])
        .await;
    assert_eq!(moved, RespValue::Integer(2));

    assert_nil(&src_client.command(&["GET", "{user1}name"]).await);
    assert_nil(&src_client.command(&["GET", "{user1}age"]).await);
    assert_bulk(&src_client.command(&["GET", "unrelated"]).await, "x");

    assert_bulk(&dst_client.command(&["GET", "{user1}name"]).await, "alice");
    assert_bulk(&dst_client.command(&["GET", "{user1}age"]).await, "30");
}

#[tokio::test]
async fn slotshashkey_and_slotsinfo_agree_on_slot_occupancy() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "probe", "v"]).await);

    let slot = match client.command(&["SLOTSHASHKEY", "probe"]).await {
        RespValue::Array(items) => match items.as_slice() {
            [RespValue::Integer(slot)] => *slot,
            other => panic!("expected a single integer, got {other:?}"),
        },
        other => panic!("expected an array, got {other:?}"),
    };

    let info = client
        .command(&["SLOTSINFO", &slot.to_string(), "1"])
        .await;
    match info {
        RespValue::Array(items) => {
            assert_eq!(items.len(), 1);
            match &items[0] {
                RespValue::Array(pair) => {
                    assert_eq!(pair[0], RespValue::Integer(slot));
                    assert_eq!(pair[1], RespValue::Integer(1));
                }
                other => panic!("expected a [slot, present] pair, got {other:?}"),
            }
        }
        other => panic!("expected an array, got {other:?}"),
    }
}

#[tokio::test]
async fn slotsrestore_rejects_a_malformed_triple_count() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["SLOTSRESTORE", "onlykey", "0"]).await {
        RespValue::Error(_) => {}
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn slotsmgrtslot_of_an_empty_slot_returns_zero_zero() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;

    let reply = src_client
        .command(&[
            "SLOTSMGRTSLOT",
            &dst.addr.ip().to_string(),
            &dst.addr.port().to_string(),
            "1000",
            "0",
        ])
        .await;
    assert_pair(&reply, 0, 0);
}

#[tokio::test]
async fn slotsmgrtslot_drains_every_key_in_the_slot_before_reporting_empty() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;
    let mut dst_client = dst.connect().await;

    let (key_a, key_b) = two_keys_sharing_a_slot();
    let slot = key_slot(key_a.as_bytes());
    assert_eq!(slot, key_slot(key_b.as_bytes()));

    assert_ok(&src_client.command(&["SET", &key_a, "a-value"]).await);
    assert_ok(&src_client.command(&["SET", &key_b, "b-value"]).await);

    let dst_ip = dst.addr.ip().to_string();
    let dst_port = dst.addr.port().to_string();
    let slot_str = slot.to_string();

    // Two keys in the slot: the first two calls each move exactly one key,
    // the third finds the slot drained.
    for _ in 0..2 {
        let reply = src_client
            .command(&["SLOTSMGRTSLOT", &dst_ip, &dst_port, "1000", &slot_str])
            .await;
        assert_pair(&reply, 1, 1);
    }
    let reply = src_client
        .command(&["SLOTSMGRTSLOT", &dst_ip, &dst_port, "1000", &slot_str])
        .await;
    assert_pair(&reply, 0, 0);

    assert_nil(&src_client.command(&["GET", &key_a]).await);
    assert_nil(&src_client.command(&["GET", &key_b]).await);
    assert_bulk(&dst_client.command(&["GET", &key_a]).await, "a-value");
    assert_bulk(&dst_client.command(&["GET", &key_b]).await, "b-value");
}

#[tokio::test]
async fn slotsmgrttagslot_moves_the_whole_tag_group_then_drains_to_zero() {
    let src = TestServer::start(|_| {}).await;
    let dst = TestServer::start(|_| {}).await;
    let mut src_client = src.connect().await;
    let mut dst_client = dst.connect().await;

    assert_ok(&src_client.command(&["SET", "{grp}x", "1"]).await);
    assert_ok(&src_client.command(&["SET", "{grp}y", "2"]).await);
    let slot = key_slot(b"{grp}x");
    assert_eq!(slot, key_slot(b"{grp}y"));

    let dst_ip = dst.addr.ip().to_string();
    let dst_port = dst.addr.port().to_string();
    let slot_str = slot.to_string();

    let reply = src_client
        .command(&["SLOTSMGRTTAGSLOT", &dst_ip, &dst_port, "1000", &slot_str])
        .await;
    assert_pair(&reply, 2, 1);

    let reply = src_client
        .command(&["SLOTSMGRTTAGSLOT", &dst_ip, &dst_port, "1000", &slot_str])
        .await;
    assert_pair(&reply, 0, 0);

    assert_nil(&src_client.command(&["GET", "{grp}x"]).await);
    assert_nil(&src_client.command(&["GET", "{grp}y"]).await);
    assert_bulk(&dst_client.command(&["GET", "{grp}x"]).await, "1");
    assert_bulk(&dst_client.command(&["GET", "{grp}y"]).await, "2");
}
