// tests/integration/role_test.rs

//! `ROLE`, `INFO`, and `SLAVEOF` role transitions, including the read-only
//! enforcement while acting as a slave (`spec.md` §8, scenario 6; §4.5).

use super::test_helpers::{TestServer, assert_bulk, assert_ok};
use foliokv::core::protocol::RespValue;

#[tokio::test]
async fn role_starts_as_master_with_no_slaves() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["ROLE"]).await {
        RespValue::Array(items) => {
            assert_eq!(items.len(), 2);
            assert_bulk(&items[0], "master");
            assert_eq!(items[1], RespValue::Array(Vec::new()));
        }
        other => panic!("expected an array, got {other:?}"),
    }
}

#[tokio::test]
async fn info_reports_master_role_and_port() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["INFO"]).await {
        RespValue::BulkString(Some(body)) => {
            let body = String::from_utf8(body.to_vec()).unwrap();
            assert!(body.contains("role:master"), "body was: {body}");
            assert!(body.contains("connected_slaves:0"), "body was: {body}");
        }
        other => panic!("expected a bulk string, got {other:?}"),
    }
}

#[tokio::test]
async fn slaveof_switches_role_and_rejects_writes() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    // Point at an address nothing is listening on; the role flips
    // immediately regardless of whether the sync connection ever succeeds.
    assert_ok(&client.command(&["SLAVEOF", "127.0.0.1", "1"]).await);

    match client.command(&["ROLE"]).await {
        RespValue::Array(items) => assert_bulk(&items[0], "slave"),
        other => panic!("expected an array, got {other:?}"),
    }

    match client.command(&["SET", "k", "v"]).await {
        RespValue::Error(msg) => {
            assert!(
                msg.starts_with(b"READONLY"),
                "expected a READONLY error, got {msg:?}"
            );
        }
        other => panic!("expected a READONLY error, got {other:?}"),
    }

    // Reads are still allowed while a slave.
    match client.command(&["GET", "k"]).await {
        RespValue::BulkString(None) => {}
        other => panic!("expected nil, got {other:?}"),
    }

    assert_ok(&client.command(&["SLAVEOF", "NO", "ONE"]).await);
    match client.command(&["ROLE"]).await {
        RespValue::Array(items) => assert_bulk(&items[0], "master"),
        other => panic!("expected an array, got {other:?}"),
    }
    assert_ok(&client.command(&["SET", "k", "v"]).await);
}

#[tokio::test]
async fn slaveof_wrong_argument_count_is_an_error() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["SLAVEOF", "onlyhost"]).await {
        RespValue::Error(_) => {}
        other => panic!("expected an error, got {other:?}"),
    }
}
