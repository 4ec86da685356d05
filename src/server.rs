//! Statistics polling endpoint
//!
//! A line-oriented TCP interface onto the attribute namespace: one request
//! line per connection, one response, then the connection closes. Only the
//! read-only attribute interface is ever reached from here; store-style
//! requests are refused without touching any counter.
//!
//! Requests:
//!   `list`             names of all published nodes, one per line
//!   `<node>/<attr>`    rendered attribute value
//!   `<node>/<attr> v`  store attempt, always refused

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::stats::StatsRegistry;

/// Upper bound on a request line; anything longer is malformed.
const MAX_REQUEST_LINE: u64 = 256;

/// Accept poll connections until the listener fails or the task is dropped.
pub async fn serve(listener: TcpListener, namespace: Arc<StatsRegistry>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "statistics endpoint listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let namespace = Arc::clone(&namespace);
        tokio::spawn(async move {
            if let Err(e) = handle_poll(stream, &namespace).await {
                debug!(%peer, "poll connection error: {e}");
            }
        });
    }
}

async fn handle_poll(stream: TcpStream, namespace: &StatsRegistry) -> Result<()> {
    let (reader, mut writer) = stream.into_split();

    let mut line = String::new();
    BufReader::new(reader)
        .take(MAX_REQUEST_LINE)
        .read_line(&mut line)
        .await?;

    let response = respond(line.trim(), namespace);
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Compute the response for one request line.
fn respond(request: &str, namespace: &StatsRegistry) -> String {
    if request.is_empty() {
        return "ERR empty request\n".to_string();
    }

    if request == "list" {
        let mut out = String::new();
        for name in namespace.names() {
            out.push_str(&name);
            out.push('\n');
        }
        return out;
    }

    // A second whitespace-separated token makes this a store attempt.
    let (path, store_value) = match request.split_once(char::is_whitespace) {
        Some((path, rest)) => (path, Some(rest.trim())),
        None => (request, None),
    };

    let Some((node_name, attr_name)) = path.split_once('/') else {
        return "ERR malformed request\n".to_string();
    };

    let Some(node) = namespace.lookup(node_name) else {
        return format!("ERR no such node '{node_name}'\n");
    };

    let Ok(attr) = attr_name.parse() else {
        return format!("ERR no such attribute '{attr_name}'\n");
    };

    match store_value {
        Some(value) => match node.store(attr, value) {
            Ok(()) => "OK\n".to_string(),
            Err(_) => "ERR not supported\n".to_string(),
        },
        None => node.render(attr),
    }
}
