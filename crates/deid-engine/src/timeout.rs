use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::error::CallError;

/// Run `call`, giving up after `limit`.
///
/// With a limit the call runs on its own thread; on expiry that thread is
/// left to finish in the background and its result is discarded. Without a
/// limit the call runs inline.
pub fn call_with_timeout<T, E, F>(limit: Option<Duration>, call: F) -> Result<T, CallError<E>>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let Some(limit) = limit else {
        return call().map_err(CallError::Failed);
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("deid-call".to_string())
        .spawn(move || {
            // The receiver is gone when the caller already timed out.
            let _ = tx.send(call());
        })
        .map_err(CallError::Spawn)?;

    match rx.recv_timeout(limit) {
        Ok(result) => result.map_err(CallError::Failed),
        Err(RecvTimeoutError::Timeout) => Err(CallError::TimedOut(limit)),
        Err(RecvTimeoutError::Disconnected) => Err(CallError::Panicked),
    }
}
