//! Stream-level flow control: a response body larger than the peer's
//! advertised window gets split across multiple DATA frames, resumes once
//! a WINDOW_UPDATE arrives, and the frames sum back to the full body.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use corehttp::h2::frame::{self, frame_type, FrameHeader, CONNECTION_PREFACE};
use corehttp::h2::hpack::Encoder;
use corehttp::h2::{read_preface, serve};
use corehttp::{Config, PeerAddr, ResponseBody, ResponseSpec, Scheme};

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
async fn large_body_is_split_by_window_and_resumes_after_update() {
    const BODY: &[u8] = &[b'x'; 25];
    const INITIAL_STREAM_WINDOW: u32 = 10;

    let (mut client, mut server) = tokio::io::duplex(16 * 1024);
    let config = Config::new().done();
    let date = corehttp::date::spawn();
    let peer = PeerAddr::Tcp("127.0.0.1:1".parse().unwrap());
    let local = PeerAddr::Tcp("127.0.0.1:2".parse().unwrap());

    let server_task = tokio::spawn(async move {
        let seed = read_preface(&mut server, b"").await?;
        serve(server, seed, config, date, peer, local, Scheme::Http, |_view, mut handle| {
            Box::pin(async move {
                handle
                    .send_response(ResponseSpec::new(200, ResponseBody::FullBody(Bytes::from_static(BODY))))
                    .await
                    .unwrap();
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .await
    });

    client.write_all(CONNECTION_PREFACE).await.unwrap();
    let mut settings_frame = Vec::new();
    frame::encode_settings(&mut settings_frame, &[(frame::settings_id::INITIAL_WINDOW_SIZE, INITIAL_STREAM_WINDOW)]);
    client.write_all(&settings_frame).await.unwrap();

    let mut enc = Encoder::new();
    let block = enc.encode(&[
        (":method".to_string(), b"GET".to_vec()),
        (":scheme".to_string(), b"http".to_vec()),
        (":path".to_string(), b"/big".to_vec()),
        (":authority".to_string(), b"example.com".to_vec()),
    ]);
    let mut headers_frame = Vec::new();
    frame::encode_headers(&mut headers_frame, 1, &block, true, true);
    client.write_all(&headers_frame).await.unwrap();

    // server's initial SETTINGS, then its ack of ours
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert!(!header.is_ack());
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::SETTINGS);
    assert!(header.is_ack());

    // response HEADERS
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::HEADERS);

    // first DATA frame: capped at the advertised stream window, not yet END_STREAM
    let (header, payload) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::DATA);
    assert_eq!(payload.len(), INITIAL_STREAM_WINDOW as usize);
    assert!(!header.is_end_stream());
    let mut received = payload;

    // unblock the rest of the body
    let mut window_update = Vec::new();
    frame::encode_window_update(&mut window_update, 1, (BODY.len() - received.len()) as u32);
    client.write_all(&window_update).await.unwrap();

    // second DATA frame: the remainder, with END_STREAM set
    let (header, payload) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::DATA);
    assert!(header.is_end_stream());
    received.extend_from_slice(&payload);

    assert_eq!(received, BODY);

    drop(client.shutdown().await);
    server_task.await.unwrap().unwrap();
}
