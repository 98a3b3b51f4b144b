use micro_stream::interceptor::RetryPolicy;
use micro_stream::monitor::LoggingEventMonitor;
use micro_stream::{HttpRequest, Session, StreamEvent};
use serde::Deserialize;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
pub struct Line {
    url: String,
    id: u64,
}

// run against any server producing newline-delimited json, e.g. `httpbin`:
// cargo run --example stream_lines -- http://127.0.0.1:8080/stream/20
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let url = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/stream/20".to_owned());

    let session = Session::builder().interceptor(RetryPolicy::default()).event_monitor(LoggingEventMonitor).build()?;

    let request = session
        .stream_request(HttpRequest::get(url)?.header("accept", "application/json")?)
        .validate()
        .on_stream_decodable(|event: StreamEvent<Line, _>| match event {
            StreamEvent::Stream(Ok(line)) => info!(id = line.id, url = %line.url, "received line"),
            StreamEvent::Stream(Err(e)) => warn!(cause = %e, "skipping undecodable line"),
            StreamEvent::Complete(completion) => match completion.error {
                Some(e) => warn!(cause = %e, "stream failed"),
                None => info!(status = ?completion.response.map(|response| response.status()), "stream finished"),
            },
        });

    request.finished().await;
    Ok(())
}
