//! A header block that fails HPACK decompression is connection-fatal: the
//! transport answers with GOAWAY(COMPRESSION_ERROR) and tears the
//! connection down, rather than trying to recover the dynamic table.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use corehttp::h2::frame::{self, error_code, frame_type, FrameHeader, CONNECTION_PREFACE};
use corehttp::h2::{read_preface, serve};
use corehttp::{Config, PeerAddr, Scheme};

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
async fn garbage_header_block_triggers_goaway_compression_error() {
    let (mut client, mut server) = tokio::io::duplex(16 * 1024);
    let config = Config::new().done();
    let date = corehttp::date::spawn();
    let peer = PeerAddr::Tcp("127.0.0.1:1".parse().unwrap());
    let local = PeerAddr::Tcp("127.0.0.1:2".parse().unwrap());

    let server_task = tokio::spawn(async move {
        let seed = read_preface(&mut server, b"").await?;
        serve(server, seed, config, date, peer, local, Scheme::Http, |_view, _handle| {
            Box::pin(async move {}) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .await
    });

    client.write_all(CONNECTION_PREFACE).await.unwrap();

    // A HEADERS frame whose payload is not a valid HPACK block at all
    // (0xff is a continued integer prefix with no following continuation
    // byte that ever terminates it within the frame).
    let garbage = [0xffu8; 16];
    let mut headers_frame = Vec::new();
    frame::encode_headers(&mut headers_frame, 1, &garbage, true, true);
    client.write_all(&headers_frame).await.unwrap();

    // server's initial SETTINGS
    let (header, _) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::SETTINGS);

    // GOAWAY with COMPRESSION_ERROR
    let (header, payload) = read_one_frame(&mut client).await;
    assert_eq!(header.frame_type, frame_type::GOAWAY);
    assert_eq!(payload.len(), 8);
    let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    assert_eq!(code, error_code::COMPRESSION_ERROR);

    let result = server_task.await.unwrap();
    assert!(result.is_err());
}
