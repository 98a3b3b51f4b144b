//! A small httpbin-like server for the integration tests.
//!
//! Routes:
//! - `/bytes/{n}`: `n` bytes of `application/octet-stream`, written in pieces
//! - `/stream/{n}`: `n` newline-delimited JSON objects, chunked
//! - `/status/{code}`: an empty response with that status, `401` carries a challenge
//! - `/headers`: the request headers as a JSON object
//! - `/xml`: an `application/xml` body delimited by closing the connection
//! - `/drip`: one byte of a ten byte body, then silence

#![allow(dead_code, reason = "every test binary uses its own subset of helpers")]

use micro_stream::{Completion, StreamEvent};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub struct TestServer {
    address: SocketAddr,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream));
            }
        });
        Self { address }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }
}

async fn serve(mut stream: TcpStream) {
    let Some((path, headers)) = read_head(&mut stream).await else {
        return;
    };

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let _ = match segments.as_slice() {
        ["bytes", n] => bytes(&mut stream, n.parse().unwrap_or(0)).await,
        ["stream", n] => json_lines(&mut stream, &path, n.parse().unwrap_or(0)).await,
        ["status", code] => status(&mut stream, code.parse().unwrap_or(500)).await,
        ["headers"] => echo_headers(&mut stream, &headers).await,
        ["xml"] => xml(&mut stream).await,
        ["drip"] => drip(&mut stream).await,
        _ => status(&mut stream, 404).await,
    };
}

async fn read_head(stream: &mut TcpStream) -> Option<(String, BTreeMap<String, String>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).into_owned();
    let mut lines = head.split("\r\n");
    let path = lines.next()?.split(' ').nth(1)?.to_owned();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned()))
        .collect();
    Some((path, headers))
}

async fn bytes(stream: &mut TcpStream, n: usize) -> std::io::Result<()> {
    let body: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
    let head = format!("HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {n}\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    for piece in body.chunks(512) {
        stream.write_all(piece).await?;
        stream.flush().await?;
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn json_lines(stream: &mut TcpStream, path: &str, n: usize) -> std::io::Result<()> {
    stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n").await?;
    for id in 0..n {
        let line = format!("{}\n", json!({ "url": path, "id": id }));
        stream.write_all(format!("{:x}\r\n{line}\r\n", line.len()).as_bytes()).await?;
        stream.flush().await?;
    }
    stream.write_all(b"0\r\n\r\n").await
}

async fn status(stream: &mut TcpStream, code: u16) -> std::io::Result<()> {
    let challenge = if code == 401 { "WWW-Authenticate: Basic realm=\"Fake Realm\"\r\n" } else { "" };
    let head = format!("HTTP/1.1 {code} Status\r\n{challenge}Content-Length: 0\r\n\r\n");
    stream.write_all(head.as_bytes()).await
}

async fn echo_headers(stream: &mut TcpStream, headers: &BTreeMap<String, String>) -> std::io::Result<()> {
    let body = json!({ "headers": headers }).to_string();
    let head = format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n", body.len());
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await
}

async fn xml(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/xml\r\nConnection: close\r\n\r\n").await?;
    stream.write_all(b"<?xml version=\"1.0\"?>\n<slideshow title=\"Sample\">").await?;
    stream.flush().await?;
    stream.write_all(b"</slideshow>\n").await?;
    stream.shutdown().await
}

async fn drip(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 10\r\n\r\n*").await?;
    stream.flush().await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(())
}

/// Forwards every event a handler receives to a channel.
pub fn events<T: Send + 'static, E: Send + 'static>() -> (impl FnMut(StreamEvent<T, E>) + Send + 'static, Events<T, E>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handler = move |event: StreamEvent<T, E>| {
        let _ = sender.send(event);
    };
    (handler, Events { receiver })
}

pub struct Events<T, E> {
    receiver: mpsc::UnboundedReceiver<StreamEvent<T, E>>,
}

impl<T, E> Events<T, E> {
    pub async fn next(&mut self) -> StreamEvent<T, E> {
        tokio::time::timeout(Duration::from_secs(10), self.receiver.recv())
            .await
            .expect("no event in time")
            .expect("handler dropped before Complete")
    }

    /// Collects the remaining values up to `Complete`, checking nothing follows it.
    pub async fn collect(mut self) -> (Vec<Result<T, E>>, Completion) {
        let mut values = Vec::new();
        loop {
            match self.next().await {
                StreamEvent::Stream(value) => values.push(value),
                StreamEvent::Complete(completion) => {
                    let trailing = tokio::time::timeout(Duration::from_secs(10), self.receiver.recv()).await.expect("handler was not released");
                    assert!(trailing.is_none(), "event delivered after Complete");
                    return (values, completion);
                }
            }
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
