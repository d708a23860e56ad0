//! The write loop shared by the request pipelines.

use callkit_core::CallError;
use callkit_transport::MessageSink;
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

/// Write every item of `requests` to `sink`, then complete the sink.
///
/// Each write is awaited before the next item is pulled. The sink is
/// completed exactly once: after the last item, or after the first failure
/// of the request stream or of a write. In the failure case the original
/// error is returned and a failure to complete is only logged.
pub async fn write_all<K, S>(mut sink: K, requests: S) -> Result<(), CallError>
where
    K: MessageSink,
    S: Stream<Item = Result<K::Item, CallError>>,
{
    futures::pin_mut!(requests);
    let mut written: u64 = 0;

    let failure = loop {
        match requests.next().await {
            Some(Ok(item)) => {
                if let Err(err) = sink.write(item).await {
                    break Some(err);
                }
                written += 1;
            }
            Some(Err(err)) => break Some(err),
            None => break None,
        }
    };

    match failure {
        None => {
            trace!(written, "Request stream finished");
            sink.complete().await
        }
        Some(err) => {
            debug!(written, error = %err, "Write loop failed");
            if let Err(complete_err) = sink.complete().await {
                debug!(error = %complete_err, "Completing the request stream failed after a write failure");
            }
            Err(err)
        }
    }
}
