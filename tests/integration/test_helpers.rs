// tests/integration/test_helpers.rs

//! Shared harness for the end-to-end tests: a real server bound to an
//! ephemeral port, driven over an actual `TcpStream`, speaking RESP exactly
//! as a real client would (`spec.md` §8).

use bytes::{Bytes, BytesMut};
use foliokv::config::Config;
use foliokv::core::protocol::{RespValue, encode_to, read_value};
use foliokv::server;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpStream;

/// A running server instance, bound to an ephemeral port in a scratch data
/// directory. Dropping this does not stop the server; tests are short-lived
/// processes, so the background task is simply left to the process exit.
pub struct TestServer {
    pub addr: SocketAddr,
    _data_dir: TempDir,
}

impl TestServer {
    /// Starts a server with default config plus the given overrides, bound to
    /// `127.0.0.1:0` so concurrently-running tests never collide on a port.
    pub async fn start(configure: impl FnOnce(&mut Config)) -> Self {
        let data_dir = TempDir::new().expect("failed to create scratch data dir");
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.data_dir = data_dir.path().to_string_lossy().to_string();
        configure(&mut config);

        let ctx = server::build(config).await.expect("failed to build server");
        let addr = ctx.listener.local_addr().expect("listener has no local addr");
        tokio::spawn(server::serve(ctx));

        Self { addr, _data_dir: data_dir }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("failed to connect to test server");
        TestClient { stream, buf: BytesMut::new() }
    }
}

/// A bare RESP client: sends an array of bulk strings, reads back one value.
pub struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl TestClient {
    pub async fn command(&mut self, args: &[&str]) -> RespValue {
        let request = RespValue::Array(
            args.iter()
                .map(|a| RespValue::bulk(Bytes::copy_from_slice(a.as_bytes())))
                .collect(),
        );
        let mut out = BytesMut::new();
        encode_to(&request, &mut out);
        use tokio::io::AsyncWriteExt;
        self.stream.write_all(&out).await.expect("write failed");

        read_value(&mut self.stream, &mut self.buf)
            .await
            .expect("read failed")
            .expect("connection closed before a reply arrived")
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// Asserts a reply is `+OK`.
pub fn assert_ok(value: &RespValue) {
    assert_eq!(value, &RespValue::ok(), "expected +OK, got {value:?}");
}

/// Asserts a bulk string reply equals `expected`.
pub fn assert_bulk(value: &RespValue, expected: &str) {
    match value {
        RespValue::BulkString(Some(b)) => assert_eq!(b.as_ref(), expected.as_bytes()),
        other => panic!("expected bulk string {expected:?}, got {other:?}"),
    }
}

/// Asserts a reply is the nil bulk string.
pub fn assert_nil(value: &RespValue) {
    assert_eq!(value, &RespValue::nil(), "expected nil, got {value:?}");
}
