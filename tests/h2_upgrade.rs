//! The `Upgrade: h2c` path (§3.2, §4.3): a request carried over from an
//! (imagined) HTTP/1.1 upgrade is re-delivered as stream 1, already
//! half-closed remote, and answered exactly like an ordinary h2 stream.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use corehttp::h2::frame::{self, frame_type, FrameHeader, CONNECTION_PREFACE};
use corehttp::h2::validation::Request;
use corehttp::h2::{serve_upgraded, Handle};
use corehttp::upgrade::Http2Upgrade;
use corehttp::{Config, PeerAddr, RequestView, ResponseBody, ResponseSpec, Scheme};

async fn read_one_frame<IO: tokio::io::AsyncRead + Unpin>(io: &mut IO) -> (FrameHeader, Vec<u8>) {
    let mut header_bytes = [0u8; frame::FRAME_HEADER_LEN];
    io.read_exact(&mut header_bytes).await.unwrap();
    let header = FrameHeader::parse(&header_bytes).unwrap();
    let mut payload = vec![0u8; header.length as usize];
    if !payload.is_empty() {
        io.read_exact(&mut payload).await.unwrap();
    }
    (header, payload)
}

#[tokio::test]
async fn upgraded_request_is_answered_as_stream_one() {
    let (mut client, server) = tokio::io::duplex(16 * 1024);
    let config = Config::new().done();
    let date = corehttp::date::spawn();
    let peer = PeerAddr::Tcp("127.0.0.1:1".parse().unwrap());
    let local = PeerAddr::Tcp("127.0.0.1:2".parse().unwrap());

    let request = Request {
        method: "GET".to_string(),
        scheme: "http".to_string(),
        authority: Some("example.com".to_string()),
        path: "/upgraded".to_string(),
        headers: vec![],
    };
    let upgrade = Http2Upgrade { settings: vec![] };

    let server_task = tokio::spawn(async move {
        serve_upgraded(server, config, date, peer, local, upgrade, request, |view: RequestView, mut handle: Handle| {
            Box::pin(async move {
                assert_eq!(view.method, "GET");
                assert_eq!(view.path, "/upgraded");
                handle
                    .send_response(ResponseSpec::new(200, ResponseBody::FullBody(Bytes::from_static(b"ok"))))
                    .await
                    .unwrap();
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .await
    });

    // the client still sends the regular connection preface after a 101
    client.write_all(CONNECTION_PREFACE).await.unwrap();
    let mut settings_frame = Vec::new();
    frame::encode_settings(&mut settings_frame, &[]);
    client.write_all(&settings_frame).await.unwrap();

    // server's own initial SETTINGS, then its ack of the client's
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert!(!header.is_ack());
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert!(header.is_ack());

    // response HEADERS + DATA for the upgraded request, stream 1
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::HEADERS);
    assert_eq!(header.stream_id, 1);
    let (header, payload) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(header.stream_id, 1);
    assert!(header.is_end_stream());
    assert_eq!(payload, b"ok");

    drop(client.shutdown().await);
    server_task.await.unwrap().unwrap();
}
