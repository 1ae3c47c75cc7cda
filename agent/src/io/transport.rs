use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handler::dispatch::Dispatcher;
use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest};

/// Maximum accepted line length.
const MAX_LINE_SIZE: usize = 1_048_576;

/// Run the NDJSON transport loop over arbitrary async reader/writer.
///
/// Reads JSON-RPC messages from `reader` (one per line) and writes
/// responses to `writer`. The loop exits when the reader reaches EOF,
/// the cancellation token is triggered, or an I/O error occurs.
pub async fn run_transport_loop<R, W>(
    reader: &mut R,
    writer: &mut W,
    dispatcher: &mut Dispatcher,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Shutdown signal received, exiting transport loop");
                break;
            }

            result = reader.read_line(&mut line) => {
                if result? == 0 {
                    debug!("Reader closed (EOF), exiting transport loop");
                    break;
                }
                if let Some(response) = handle_line(line.trim(), dispatcher).await {
                    debug!("Sending: {}", response);
                    write_json(writer, &response).await?;
                }
            }
        }
    }

    Ok(())
}

/// Turn one input line into the response to send, if any.
async fn handle_line(line: &str, dispatcher: &mut Dispatcher) -> Option<Value> {
    if line.is_empty() {
        return None;
    }

    if line.len() > MAX_LINE_SIZE {
        warn!("Message exceeds 1 MiB limit ({} bytes)", line.len());
        return Some(reject(
            Value::Null,
            errors::PARSE_ERROR,
            "Message exceeds 1 MiB size limit".to_string(),
        ));
    }

    debug!("Received: {}", line);

    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to parse JSON-RPC request: {e}");
            return Some(reject(
                Value::Null,
                errors::PARSE_ERROR,
                format!("Parse error: {e}"),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(reject(
            request.id,
            errors::INVALID_REQUEST,
            "Invalid JSON-RPC version (must be \"2.0\")".to_string(),
        ));
    }

    Some(dispatcher.dispatch(request).await.to_json())
}

fn reject(id: Value, code: i64, message: String) -> Value {
    serde_json::to_value(JsonRpcErrorResponse::new(id, code, message)).unwrap_or_default()
}

/// Write a JSON value as an NDJSON line to the writer.
pub async fn write_json<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
