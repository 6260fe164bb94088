use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use oscdeck_bridge::{BridgeConfig, PresetServer, RelayServer};
use oscdeck_core::{encode, OscArg};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The handshake returns before the server registers the client, so give
/// the bridge a moment before counting on the fan-out set
const SETTLE: Duration = Duration::from_millis(150);

fn relay_config() -> BridgeConfig {
    BridgeConfig::new()
        .with_feedback_port(0)
        .with_script_feedback_port(0)
        .with_ws_port(0)
}

async fn ws_connect(addr: SocketAddr) -> WsClient {
    let (client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    client
}

async fn next_binary(client: &mut WsClient) -> Vec<u8> {
    loop {
        let frame = timeout(Duration::from_secs(3), client.next())
            .await
            .expect("no frame within 3s")
            .expect("connection ended")
            .unwrap();
        if let Message::Binary(data) = frame {
            return data.to_vec();
        }
    }
}

async fn recv_udp(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 65536];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf))
        .await
        .expect("no datagram within 3s")
        .unwrap();
    buf.truncate(len);
    buf
}

async fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(3), stream.read_to_end(&mut response))
        .await
        .expect("no response within 3s")
        .unwrap();
    let text = String::from_utf8_lossy(&response).to_string();
    let status = text
        .split_whitespace()
        .nth(1)
        .expect("malformed status line")
        .parse()
        .unwrap();
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn test_feedback_is_broadcast_to_every_client_byte_exact() {
    let relay = RelayServer::new(relay_config()).bind().await.unwrap();
    let feedback_addr = relay.feedback_addr().unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client_a = ws_connect(ws_addr).await;
    let mut client_b = ws_connect(ws_addr).await;
    tokio::time::sleep(SETTLE).await;

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = encode("/Track/3/Volume", &OscArg::Float(0.42)).unwrap();
    device.send_to(&bytes, feedback_addr).await.unwrap();

    assert_eq!(next_binary(&mut client_a).await, bytes);
    assert_eq!(next_binary(&mut client_b).await, bytes);
}

#[tokio::test]
async fn test_script_feedback_port_broadcasts_too() {
    let relay = RelayServer::new(relay_config()).bind().await.unwrap();
    let script_addr = relay.script_feedback_addr().unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client = ws_connect(ws_addr).await;
    tokio::time::sleep(SETTLE).await;

    let script = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = encode("/Script/Status", &OscArg::Text("ready".to_string())).unwrap();
    script.send_to(&bytes, script_addr).await.unwrap();

    assert_eq!(next_binary(&mut client).await, bytes);
}

#[tokio::test]
async fn test_late_joiners_never_see_old_feedback() {
    let relay = RelayServer::new(relay_config()).bind().await.unwrap();
    let feedback_addr = relay.feedback_addr().unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();
    tokio::time::sleep(SETTLE).await;

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let missed = encode("/Missed", &OscArg::Float(1.0)).unwrap();
    device.send_to(&missed, feedback_addr).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    // Connect after the fact; only the next datagram arrives
    let mut client = ws_connect(ws_addr).await;
    tokio::time::sleep(SETTLE).await;
    let seen = encode("/Seen", &OscArg::Float(2.0)).unwrap();
    device.send_to(&seen, feedback_addr).await.unwrap();

    assert_eq!(next_binary(&mut client).await, seen);
}

#[tokio::test]
async fn test_client_frames_reach_both_udp_destinations() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let script = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = relay_config()
        .with_control_destination(control.local_addr().unwrap().to_string())
        .with_script_destination(script.local_addr().unwrap().to_string());

    let relay = RelayServer::new(config).bind().await.unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client = ws_connect(ws_addr).await;
    let bytes = encode("/Track/1/Mute", &OscArg::Float(1.0)).unwrap();
    client.send(Message::binary(bytes.clone())).await.unwrap();

    assert_eq!(recv_udp(&control).await, bytes);
    assert_eq!(recv_udp(&script).await, bytes);
}

#[tokio::test]
async fn test_dead_first_destination_does_not_block_the_second() {
    // Bind then drop, so the control port is known dead
    let dead = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    let script = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let config = relay_config()
        .with_control_destination(dead_addr.to_string())
        .with_script_destination(script.local_addr().unwrap().to_string());
    let relay = RelayServer::new(config).bind().await.unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client = ws_connect(ws_addr).await;
    let bytes = encode("/Play", &OscArg::Float(1.0)).unwrap();
    client.send(Message::binary(bytes.clone())).await.unwrap();

    assert_eq!(recv_udp(&script).await, bytes);
}

#[tokio::test]
async fn test_unsendable_first_destination_still_reaches_the_second() {
    // An IPv6 control destination on the IPv4 outbound socket makes every
    // control send fail outright; script delivery must keep flowing
    let script = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = relay_config()
        .with_control_destination("[::1]:1")
        .with_script_destination(script.local_addr().unwrap().to_string());
    let relay = RelayServer::new(config).bind().await.unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client = ws_connect(ws_addr).await;
    let first = encode("/Record", &OscArg::Float(1.0)).unwrap();
    let second = encode("/Record", &OscArg::Float(0.0)).unwrap();
    client.send(Message::binary(first.clone())).await.unwrap();
    client.send(Message::binary(second.clone())).await.unwrap();

    assert_eq!(recv_udp(&script).await, first);
    assert_eq!(recv_udp(&script).await, second);
}

#[tokio::test]
async fn test_text_frames_are_forwarded_as_utf8_bytes() {
    let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let script = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = relay_config()
        .with_control_destination(control.local_addr().unwrap().to_string())
        .with_script_destination(script.local_addr().unwrap().to_string());
    let relay = RelayServer::new(config).bind().await.unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut client = ws_connect(ws_addr).await;
    client.send(Message::text("raw command")).await.unwrap();

    assert_eq!(recv_udp(&control).await, b"raw command");
    assert_eq!(recv_udp(&script).await, b"raw command");
}

#[tokio::test]
async fn test_disconnected_client_leaves_the_rest_working() {
    let relay = RelayServer::new(relay_config()).bind().await.unwrap();
    let feedback_addr = relay.feedback_addr().unwrap();
    let ws_addr = relay.ws_addr().unwrap();
    let _task = relay.spawn();

    let mut leaver = ws_connect(ws_addr).await;
    let mut stayer = ws_connect(ws_addr).await;
    tokio::time::sleep(SETTLE).await;

    leaver.close(None).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = encode("/Still/Here", &OscArg::Float(1.0)).unwrap();
    device.send_to(&bytes, feedback_addr).await.unwrap();

    assert_eq!(next_binary(&mut stayer).await, bytes);
}

#[tokio::test]
async fn test_preset_round_trip_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::new()
        .with_http_port(0)
        .with_presets_dir(dir.path());
    let server = PresetServer::new(config).bind().await.unwrap();
    let addr = server.addr().unwrap();
    let _task = server.spawn();

    let (status, _) = http_request(addr, "GET", "/presets/deck", None).await;
    assert_eq!(status, 404);

    let (status, _) = http_request(addr, "POST", "/presets/deck", Some(r#"{"rows":2}"#)).await;
    assert_eq!(status, 200);

    let (status, body) = http_request(addr, "GET", "/presets/deck", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"rows":2}"#);
    assert!(dir.path().join("deck.json").exists());
}

#[tokio::test]
async fn test_preset_preflight_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::new()
        .with_http_port(0)
        .with_presets_dir(dir.path());
    let server = PresetServer::new(config).bind().await.unwrap();
    let addr = server.addr().unwrap();
    let _task = server.spawn();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "OPTIONS /presets/deck HTTP/1.1\r\nHost: {addr}\r\nOrigin: http://editor.local\r\nAccess-Control-Request-Method: POST\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(3), stream.read_to_end(&mut response))
        .await
        .expect("no response within 3s")
        .unwrap();
    let text = String::from_utf8_lossy(&response).to_lowercase();

    assert!(text.starts_with("http/1.1 200"), "unexpected response: {text}");
    assert!(text.contains("access-control-allow-origin: *"), "missing CORS header: {text}");
}

#[tokio::test]
async fn test_preset_role_names_are_sanitized() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::new()
        .with_http_port(0)
        .with_presets_dir(dir.path());
    let server = PresetServer::new(config).bind().await.unwrap();
    let addr = server.addr().unwrap();
    let _task = server.spawn();

    // "de ck" (encoded space) writes the same file as "deck"
    let (status, _) = http_request(addr, "POST", "/presets/de%20ck", Some("{}")).await;
    assert_eq!(status, 200);
    let (status, body) = http_request(addr, "GET", "/presets/deck", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "{}");

    // Traversal attempts cannot leave the preset directory
    let (status, _) =
        http_request(addr, "POST", "/presets/..%2F..%2Fescape", Some("{}")).await;
    assert_eq!(status, 200);
    assert!(dir.path().join("escape.json").exists());
    assert!(!dir.path().parent().unwrap().join("escape.json").exists());
}
