//! End-to-end HTTP/1 request parsing: a GET with no body and a POST with a
//! `Content-Length` body, each driven through the real `h1::serve` loop over
//! an in-memory duplex stream.

use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use corehttp::adapter::{ReadOutcome, ResponseBody, ResponseSpec};
use corehttp::{h1, Config, PeerAddr, RequestView, Scheme};

async fn roundtrip<F>(request: &[u8], handler: F) -> Vec<u8>
where
    F: for<'h> Fn(RequestView, &'h mut h1::Handle<'h, tokio::io::DuplexStream>) -> Pin<Box<dyn std::future::Future<Output = ()> + Send + 'h>>
        + Send
        + 'static,
{
    let (mut client, server) = tokio::io::duplex(8192);
    client.write_all(request).await.unwrap();

    let config = Config::new().done();
    let date = corehttp::date::spawn();
    let peer = PeerAddr::Tcp("127.0.0.1:1".parse().unwrap());
    let local = PeerAddr::Tcp("127.0.0.1:2".parse().unwrap());

    let serve_task =
        tokio::spawn(async move { h1::serve(server, config, date, peer, local, Scheme::Http, handler).await });

    let mut response = Vec::new();
    // Drop the client's write half once the request is fully sent, so the
    // server's next `read_head` sees a clean EOF and `serve` returns.
    drop(client.shutdown().await);
    client.read_to_end(&mut response).await.unwrap();
    serve_task.await.unwrap().unwrap();
    response
}

#[tokio::test]
async fn get_with_no_body_replies_ok() {
    let request = b"GET /ok HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let response = roundtrip(request, |view, handle| {
        Box::pin(async move {
            assert_eq!(view.method, "GET");
            assert_eq!(view.path, "/ok");
            handle
                .send_response(ResponseSpec::new(200, ResponseBody::FullBody(Bytes::from_static(b"OK"))))
                .await
                .unwrap();
        })
    })
    .await;

    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("content-length: 2\r\n"), "{text}");
    assert!(text.ends_with("\r\n\r\nOK"), "{text}");
}

#[tokio::test]
async fn post_with_content_length_echoes_body() {
    let request = b"POST /echo HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";
    let response = roundtrip(request, |_view, handle| {
        Box::pin(async move {
            let mut body = Vec::new();
            loop {
                match handle.read_body().await.unwrap() {
                    ReadOutcome::More(chunk) => body.extend_from_slice(&chunk),
                    ReadOutcome::End(chunk) => {
                        body.extend_from_slice(&chunk);
                        break;
                    }
                }
            }
            assert_eq!(body, b"hello");
            handle
                .send_response(ResponseSpec::new(200, ResponseBody::FullBody(Bytes::from(body))))
                .await
                .unwrap();
        })
    })
    .await;

    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("content-length: 5\r\n"), "{text}");
    assert!(text.ends_with("\r\n\r\nhello"), "{text}");
}

#[tokio::test]
async fn request_line_over_the_limit_is_rejected() {
    let mut cfg = Config::new();
    cfg.max_request_line_length(16);
    let config = cfg.done();
    let date = corehttp::date::spawn();
    let peer = PeerAddr::Tcp("127.0.0.1:1".parse().unwrap());
    let local = PeerAddr::Tcp("127.0.0.1:2".parse().unwrap());

    let (mut client, server) = tokio::io::duplex(8192);
    client.write_all(b"GET /this-is-a-very-long-path-indeed HTTP/1.1\r\n\r\n").await.unwrap();
    drop(client.shutdown().await);

    let handler = |_view, handle: &'_ mut h1::Handle<'_, tokio::io::DuplexStream>| {
        Box::pin(async move {
            let _ = handle.close_requested();
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>>
    };
    let serve_task =
        tokio::spawn(async move { h1::serve(server, config, date, peer, local, Scheme::Http, handler).await });

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let result = serve_task.await.unwrap();
    assert!(result.is_err());

    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 414 URI Too Long\r\n"), "{text}");
}
