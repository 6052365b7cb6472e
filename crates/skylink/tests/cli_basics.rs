#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::net::UdpSocket;
use std::process::{Command, Stdio};

// 7-byte header + payload, size field covering both.
fn frame(ty: u8, id: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
    let total = 7 + payload.len();
    let mut wire = vec![ty, id, seq];
    wire.extend_from_slice(&(total as u32).to_le_bytes());
    wire.extend_from_slice(payload);
    wire
}

#[test]
fn version_prints_and_exits_zero() {
    let out = Command::new(env!("CARGO_BIN_EXE_skylink"))
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).expect("utf-8 output");
    assert!(stdout.starts_with("skylink "));
}

#[test]
fn listen_prints_one_received_frame_as_json() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_skylink"))
        .args([
            "--log-level",
            "error",
            "--format",
            "json",
            "listen",
            "0",
            "--count",
            "1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    // the bound port is announced on stderr before the receive loop starts
    let stderr = child.stderr.take().expect("stderr should be piped");
    let mut line = String::new();
    BufReader::new(stderr)
        .read_line(&mut line)
        .expect("port announcement should arrive");
    let port: u16 = line
        .trim()
        .rsplit(' ')
        .next()
        .and_then(|word| word.parse().ok())
        .unwrap_or_else(|| panic!("unexpected announcement: {line:?}"));

    let sock = UdpSocket::bind("127.0.0.1:0").expect("test socket should bind");
    sock.send_to(&frame(2, 127, 1, b"hello"), ("127.0.0.1", port))
        .expect("datagram should send");

    let out = child.wait_with_output().expect("listen should exit");
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).expect("utf-8 output");
    let parsed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("frame output should be JSON");
    assert_eq!(parsed["channel"], 127);
    assert_eq!(parsed["channel_name"], "D2C_CMD_NOACK");
    assert_eq!(parsed["seq"], 1);
    assert_eq!(parsed["payload"], "hello");
}

#[test]
fn send_reaches_a_local_peer() {
    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer socket should bind");
    peer.set_read_timeout(Some(std::time::Duration::from_secs(3)))
        .expect("timeout should set");
    let port = peer.local_addr().expect("local addr").port();

    let out = Command::new(env!("CARGO_BIN_EXE_skylink"))
        .args([
            "--log-level",
            "error",
            "--format",
            "json",
            "send",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--channel",
            "10",
            "--seq",
            "42",
            "--data",
            "ping",
        ])
        .output()
        .expect("send command should run");
    assert!(out.status.success());

    let mut buf = [0u8; 64];
    let (len, _) = peer.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(&buf[..len], &frame(2, 10, 42, b"ping"));
}
