use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::hardware::{AdvertisementStream, HardwareClient};
use super::model::ScanResult;
use crate::error::DeskError;

const SCAN_RESULT_BUFFER: usize = 32;

/// Starts advertisement scans that report each address once.
pub struct UniqueScanner;

impl UniqueScanner {
    /// Starts a scan and returns its deduplicated result stream.
    ///
    /// Cancelling `cancel` (or calling [`UniqueScan::cancel`]) stops the radio scan
    /// once and closes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be enabled or the scan cannot start.
    #[instrument(skip_all, level = "debug")]
    pub async fn start(
        client: Arc<dyn HardwareClient>,
        cancel: CancellationToken,
    ) -> Result<UniqueScan, DeskError> {
        let advertisements = client.start_scan().await?;
        let cancel = cancel.child_token();
        let (sender, receiver) = mpsc::channel(SCAN_RESULT_BUFFER);
        let task = tokio::spawn(forward_unique(client, advertisements, sender, cancel.clone()));

        Ok(UniqueScan {
            results: ReceiverStream::new(receiver),
            cancel,
            task,
        })
    }
}

async fn forward_unique(
    client: Arc<dyn HardwareClient>,
    mut advertisements: AdvertisementStream,
    sender: mpsc::Sender<ScanResult>,
    cancel: CancellationToken,
) {
    let mut seen = HashSet::new();
    loop {
        let advertisement = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = advertisements.next() => match next {
                Some(advertisement) => advertisement,
                None => break,
            },
        };

        if !seen.insert(advertisement.address().to_string()) {
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }

        let result = ScanResult::from(advertisement);
        debug!(address = result.address(), name = ?result.name(), "desk candidate discovered");
        if sender.send(result).await.is_err() {
            break;
        }
    }

    if let Err(error) = client.stop_scan().await {
        warn!(?error, "failed to stop scan cleanly");
    }
}

/// A running deduplicated scan.
///
/// Yields each peripheral address the first time it is seen. The stream ends after
/// cancellation, or if the radio stops reporting. Dropping the scan cancels it.
#[derive(Debug)]
pub struct UniqueScan {
    results: ReceiverStream<ScanResult>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UniqueScan {
    /// Stops the scan. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns whether the scan was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the scan and waits until the radio scan has been stopped.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(error) = (&mut self.task).await {
            warn!(?error, "scan task ended abnormally");
        }
    }
}

impl Drop for UniqueScan {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for UniqueScan {
    type Item = ScanResult;

    fn poll_next(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            self.results.close();
            return Poll::Ready(None);
        }
        Pin::new(&mut self.results).poll_next(context)
    }
}
