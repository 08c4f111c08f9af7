//! Capped stdout collection on top of [`Executor`]

use tokio::sync::mpsc;

use super::abort::AbortController;
use super::executor::{Executor, InvocationRequest};
use crate::error::CliError;

/// Default cap for reads that have no better bound
pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;

const SINK_CAPACITY: usize = 32;

/// Run `request` and collect its stdout
///
/// If stdout grows past `max_bytes` the invocation is aborted and
/// `BufferOverflow` returned; truncated output is never handed back. A
/// `NonZeroExit` carries whatever stdout was captured.
pub async fn read_to_buffer(
    executor: &Executor,
    request: InvocationRequest,
    max_bytes: usize,
) -> Result<Vec<u8>, CliError> {
    let command = request.command();
    let controller = AbortController::child_of(request.signal.as_ref());
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(SINK_CAPACITY);
    let request = request.stdout(tx).signal(controller.signal());

    let collect = async {
        let mut buf = Vec::new();
        while let Some(chunk) = rx.recv().await {
            if buf.len() + chunk.len() > max_bytes {
                controller.abort();
                rx.close();
                return (buf, true);
            }
            buf.extend_from_slice(&chunk);
        }
        (buf, false)
    };

    let ((buf, overflowed), result) = tokio::join!(collect, executor.execute(request));

    // Overflow is reported even though the abort surfaces as Cancelled
    if overflowed {
        log::debug!("git {} output exceeded {} bytes", command, max_bytes);
        return Err(CliError::BufferOverflow {
            command,
            limit: max_bytes,
        });
    }

    match result {
        Ok(_) => Ok(buf),
        Err(err) => Err(err.with_stdout(&buf)),
    }
}

/// [`read_to_buffer`] decoded as UTF-8, replacing invalid sequences
pub async fn read_to_string(
    executor: &Executor,
    request: InvocationRequest,
    max_bytes: usize,
) -> Result<String, CliError> {
    let buf = read_to_buffer(executor, request, max_bytes).await?;
    Ok(match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
