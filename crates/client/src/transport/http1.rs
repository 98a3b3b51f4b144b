use crate::error::TransportError;
use crate::transport::{AuthChallenge, TaskMetrics, Transport, TransportEvent, TransportTask, TransportTaskHandle};
use http::header::{CACHE_CONTROL, CONNECTION};
use http::uri::Scheme;
use http::{HeaderValue, Method, StatusCode, Uri};
use micro_stream_http::connection::HttpConnection;
use micro_stream_http::protocol::{HttpRequest, Message, PayloadItem, ResponseHeader};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Plain-TCP HTTP/1.1 transport. Every task uses its own connection, closed
/// once the response has been read.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    connect_timeout: Option<Duration>,
    channel_capacity: usize,
}

#[derive(Debug)]
pub struct HttpTransportBuilder {
    connect_timeout: Option<Duration>,
    channel_capacity: usize,
}

impl HttpTransportBuilder {
    fn new() -> Self {
        Self { connect_timeout: None, channel_capacity: DEFAULT_CHANNEL_CAPACITY }
    }

    /// Fails a task with [`TransportError::TimedOut`] when connecting takes longer.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How many events may be buffered before the connection stops reading.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> HttpTransport {
        HttpTransport { connect_timeout: self.connect_timeout, channel_capacity: self.channel_capacity }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransportBuilder::new().build()
    }
}

impl HttpTransport {
    /// A builder without connect timeout and with a buffer of 8 events.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    async fn run(self, request: HttpRequest, mut handle: TransportTaskHandle) {
        let token = handle.cancellation_token();
        let mut metrics = TaskMetrics::start(handle.id());
        metrics.request_body_bytes = request.body_bytes().len() as u64;

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(TransportError::Cancelled),
            result = self.exchange(&request, &mut handle, &mut metrics) => result,
        };

        if let Err(e) = &result {
            warn!(task = %handle.id(), uri = %request.uri(), cause = %e, "transport task failed");
        }

        handle.send(TransportEvent::Metrics(metrics.finish())).await;
        handle.send(TransportEvent::Completed(result.err())).await;
    }

    async fn exchange(
        &self,
        request: &HttpRequest,
        handle: &mut TransportTaskHandle,
        metrics: &mut TaskMetrics,
    ) -> Result<(), TransportError> {
        let address = socket_address(request.uri())?;
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&address)).await.map_err(|_elapsed| TransportError::TimedOut)??,
            None => TcpStream::connect(&address).await?,
        };
        trace!(task = %handle.id(), %address, "connected");

        let (reader, writer) = stream.into_split();
        let mut connection = HttpConnection::new(reader, writer);

        let mut request = request.clone();
        if !request.headers().contains_key(CONNECTION) {
            request.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        }
        connection.send_request(&request).await?;

        let mut will_cache = false;
        loop {
            match connection.read_message().await? {
                Message::Header((header, payload_size)) => {
                    debug!(task = %handle.id(), status = %header.status(), ?payload_size, "received response head");
                    metrics.status = Some(header.status());
                    if header.status() == StatusCode::UNAUTHORIZED {
                        if let Some(challenge) = AuthChallenge::from_headers(header.headers()) {
                            send(handle, TransportEvent::Challenge(challenge)).await?;
                        }
                    }
                    will_cache = is_cacheable(&request, &header);
                    send(handle, TransportEvent::HeadersReceived(header)).await?;
                }
                Message::Payload(PayloadItem::Chunk(bytes)) => {
                    metrics.response_body_bytes += bytes.len() as u64;
                    send(handle, TransportEvent::Data(bytes)).await?;
                }
                Message::Payload(PayloadItem::Eof) => {
                    if will_cache {
                        send(handle, TransportEvent::WillCacheResponse).await?;
                    }
                    return Ok(());
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: HttpRequest) -> TransportTask {
        let (handle, task) = TransportTask::channel(self.channel_capacity);
        tokio::spawn(self.clone().run(request, handle));
        task
    }
}

async fn send(handle: &mut TransportTaskHandle, event: TransportEvent) -> Result<(), TransportError> {
    if handle.send(event).await { Ok(()) } else { Err(TransportError::Cancelled) }
}

fn socket_address(uri: &Uri) -> Result<String, TransportError> {
    match uri.scheme() {
        Some(scheme) if *scheme == Scheme::HTTP => {}
        Some(scheme) => return Err(TransportError::UnsupportedScheme { scheme: scheme.to_string() }),
        None => return Err(TransportError::invalid_uri(format!("{uri} has no scheme"))),
    }

    let host = uri.host().ok_or_else(|| TransportError::invalid_uri(format!("{uri} has no host")))?;
    let port = uri.port_u16().unwrap_or(80);
    Ok(format!("{host}:{port}"))
}

fn is_cacheable(request: &HttpRequest, header: &ResponseHeader) -> bool {
    if *request.method() != Method::GET || header.status() != StatusCode::OK {
        return false;
    }

    let no_store = |value: &HeaderValue| value.to_str().is_ok_and(|v| v.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-store")));
    !request.headers().get_all(CACHE_CONTROL).iter().any(no_store) && !header.headers().get_all(CACHE_CONTROL).iter().any(no_store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{address}")
    }

    async fn collect(mut task: TransportTask) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = task.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn streams_chunked_response() {
        let base = serve_once(indoc! {"
            HTTP/1.1 200 OK\r
            Content-Type: text/plain\r
            Transfer-Encoding: chunked\r
            \r
            5\r
            hello\r
            6\r
             world\r
            0\r
            \r
            "})
        .await;

        let task = HttpTransport::default().execute(HttpRequest::get(format!("{base}/stream")).unwrap());
        let events = collect(task).await;

        assert!(matches!(&events[0], TransportEvent::HeadersReceived(header) if header.status() == StatusCode::OK));
        let body: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Data(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(body, b"hello world");
        assert!(events.iter().any(|event| matches!(event, TransportEvent::WillCacheResponse)));
        assert!(matches!(&events[events.len() - 2], TransportEvent::Metrics(metrics) if metrics.response_body_bytes == 11));
        assert!(matches!(events.last(), Some(TransportEvent::Completed(None))));
    }

    #[tokio::test]
    async fn reports_challenge() {
        let base = serve_once(indoc! {"
            HTTP/1.1 401 Unauthorized\r
            WWW-Authenticate: Basic realm=\"Fake Realm\"\r
            Content-Length: 0\r
            \r
            "})
        .await;

        let events = collect(HttpTransport::default().execute(HttpRequest::get(format!("{base}/basic-auth")).unwrap())).await;

        assert!(matches!(&events[0], TransportEvent::Challenge(challenge) if challenge.scheme == "Basic"));
        assert!(matches!(&events[1], TransportEvent::HeadersReceived(header) if header.status() == StatusCode::UNAUTHORIZED));
        assert!(!events.iter().any(|event| matches!(event, TransportEvent::WillCacheResponse)));
        assert!(matches!(events.last(), Some(TransportEvent::Completed(None))));
    }

    #[tokio::test]
    async fn truncated_body_fails_task() {
        let base = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello").await;

        let events = collect(HttpTransport::default().execute(HttpRequest::get(format!("{base}/bytes/10")).unwrap())).await;

        assert!(matches!(events.last(), Some(TransportEvent::Completed(Some(TransportError::Http { .. })))));
    }

    #[tokio::test]
    async fn rejects_https() {
        let events = collect(HttpTransport::default().execute(HttpRequest::get("https://localhost/").unwrap())).await;

        assert!(matches!(events.last(), Some(TransportEvent::Completed(Some(TransportError::UnsupportedScheme { .. })))));
    }

    #[tokio::test]
    async fn refused_connection_fails_with_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let events = collect(HttpTransport::default().execute(HttpRequest::get(format!("http://{address}/")).unwrap())).await;

        match events.last() {
            Some(TransportEvent::Completed(Some(error))) => assert!(error.io_error().is_some()),
            other => panic!("unexpected last event: {other:?}"),
        }
    }

    #[test]
    fn no_store_disables_caching() {
        let request = HttpRequest::get("http://localhost/").unwrap();
        let header = ResponseHeader::from(http::Response::builder().status(200).header(CACHE_CONTROL, "private, no-store").body(()).unwrap());
        assert!(!is_cacheable(&request, &header));

        let header = ResponseHeader::from(http::Response::builder().status(200).body(()).unwrap());
        assert!(is_cacheable(&request, &header));
        assert!(!is_cacheable(&HttpRequest::post("http://localhost/").unwrap(), &header));
    }
}
