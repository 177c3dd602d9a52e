//! The single reader loop.
//!
//! The dispatcher is the only consumer of the transport's read half. Each
//! line is classified and either resolves the in-flight command or is folded
//! into the guiding state. Nothing here blocks on callers: resolution is a
//! channel send and reduction is a pointer swap.


use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, trace, warn};

use crate::correlator::Correlator;
use crate::errors::{ProtocolDecodeWarning, TransportError};
use crate::protocol::InboundMessage;
use crate::state::{GuideEvent, StateStore, apply_response, connected, disconnected, reduce};
use crate::transport::{LineSink, LineSource};

pub(crate) const DISPATCH_TARGET: &str = "phd2_client::dispatch";

const THREAD_NAME: &str = "phd2-dispatch";

/// Marks the session connected and starts the reader thread.
pub(crate) fn spawn<R, S>(
    source: R,
    correlator: Arc<Correlator<S>>,
    store: Arc<StateStore>,
) -> io::Result<JoinHandle<()>>
where
    R: LineSource + Send + 'static,
    S: LineSink + Send + 'static,
{
    store.apply(|_| connected());
    let thread_store = Arc::clone(&store);
    thread::Builder::new()
        .name(THREAD_NAME.to_owned())
        .spawn(move || run(source, &correlator, &thread_store))
        .inspect_err(|_| {
            store.apply(disconnected);
        })
}

/// Reads until the transport fails, then marks the session disconnected and
/// fails the in-flight command.
pub(crate) fn run<R, S>(mut source: R, correlator: &Correlator<S>, store: &StateStore)
where
    R: LineSource,
    S: LineSink,
{
    loop {
        match source.read_line() {
            Ok(line) => dispatch_line(&line, correlator, store),
            Err(failure) => {
                match &failure {
                    TransportError::Closed => {
                        info!(target: DISPATCH_TARGET, "connection closed");
                    }
                    TransportError::Io(_) => {
                        error!(target: DISPATCH_TARGET, error = %failure, "connection lost");
                    }
                }
                store.apply(disconnected);
                correlator.fail_all();
                return;
            }
        }
    }
}

fn dispatch_line<S: LineSink>(line: &[u8], correlator: &Correlator<S>, store: &StateStore) {
    match InboundMessage::classify(line) {
        Ok(InboundMessage::Response(response)) => {
            correlator.resolve(response, |method, params, result| {
                store.apply(|state| apply_response(state, method, params, result));
            });
        }
        Ok(InboundMessage::Event(message)) => GuideEvent::decode(message).map_or_else(
            |warning| discard(line, &warning),
            |event| {
                trace!(target: DISPATCH_TARGET, event = %event.kind(), "reducing event");
                store.apply(|state| reduce(state, &event));
            },
        ),
        Err(warning) => discard(line, &warning),
    }
}

fn discard(line: &[u8], warning: &ProtocolDecodeWarning) {
    warn!(
        target: DISPATCH_TARGET,
        line = %String::from_utf8_lossy(line),
        %warning,
        "discarding inbound line"
    );
}
