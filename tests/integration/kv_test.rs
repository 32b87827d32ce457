// tests/integration/kv_test.rs

//! Basic key/value round-trip and administrative commands (`spec.md` §8,
//! scenario 1).

use super::test_helpers::{TestServer, assert_bulk, assert_nil, assert_ok};
use foliokv::core::protocol::RespValue;

#[tokio::test]
async fn set_get_del_round_trip() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "greeting", "hello"]).await);
    assert_bulk(&client.command(&["GET", "greeting"]).await, "hello");

    let deleted = client.command(&["DEL", "greeting"]).await;
    assert_eq!(deleted, RespValue::Integer(1));

    assert_nil(&client.command(&["GET", "greeting"]).await);
}

#[tokio::test]
async fn get_of_missing_key_is_nil() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;
    assert_nil(&client.command(&["GET", "nope"]).await);
}

#[tokio::test]
async fn set_overwrites_existing_value() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "k", "v1"]).await);
    assert_ok(&client.command(&["SET", "k", "v2"]).await);
    assert_bulk(&client.command(&["GET", "k"]).await, "v2");
}

#[tokio::test]
async fn del_of_multiple_keys_counts_only_existing_ones() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "a", "1"]).await);
    assert_ok(&client.command(&["SET", "b", "2"]).await);

    let deleted = client.command(&["DEL", "a", "b", "missing"]).await;
    assert_eq!(deleted, RespValue::Integer(2));
}

#[tokio::test]
async fn wrong_argument_count_is_an_error() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["GET"]).await {
        RespValue::Error(_) => {}
        other => panic!("expected an error reply, got {other:?}"),
    }
    match client.command(&["SET", "onlykey"]).await {
        RespValue::Error(_) => {}
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_command_is_an_error() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;
    match client.command(&["NOSUCHCOMMAND", "x"]).await {
        RespValue::Error(_) => {}
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn flushall_clears_every_key() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "a", "1"]).await);
    assert_ok(&client.command(&["SET", "b", "2"]).await);
    assert_ok(&client.command(&["FLUSHALL"]).await);

    assert_nil(&client.command(&["GET", "a"]).await);
    assert_nil(&client.command(&["GET", "b"]).await);
}

#[tokio::test]
async fn merge_returns_ok_without_blocking_further_commands() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    assert_ok(&client.command(&["SET", "a", "1"]).await);
    assert_ok(&client.command(&["MERGE"]).await);
    assert_bulk(&client.command(&["GET", "a"]).await, "1");
}

#[tokio::test]
async fn command_and_ping_reply() {
    let server = TestServer::start(|_| {}).await;
    let mut client = server.connect().await;

    match client.command(&["COMMAND"]).await {
        RespValue::Array(items) => assert!(items.is_empty()),
        other => panic!("expected an empty array, got {other:?}"),
    }
}
