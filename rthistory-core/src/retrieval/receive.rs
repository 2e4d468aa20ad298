//! Inbound side of a move: the listener that accepts records pushed by the
//! archive, persists them, and buffers them for the task that asked.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rthistory_model::ClinicalRecord;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, RetrievalError};

use super::ports::{ReceiveEndpoint, RecordSink};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Records accepted since the last clear. Appended by the listener, read and
/// cleared by the scheduler.
#[derive(Clone, Default, Debug)]
pub struct ReceiveBuffer {
    inner: Arc<Mutex<Vec<ClinicalRecord>>>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: ClinicalRecord) {
        let mut guard = self.inner.lock().await;
        guard.push(record);
    }

    pub async fn snapshot(&self) -> Vec<ClinicalRecord> {
        let guard = self.inner.lock().await;
        guard.clone()
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[async_trait]
impl ReceiveEndpoint for ReceiveBuffer {
    async fn received(&self) -> Vec<ClinicalRecord> {
        self.snapshot().await
    }

    async fn clear(&self) {
        ReceiveBuffer::clear(self).await;
    }
}

/// Listener verdict for one pushed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryAck {
    Stored(PathBuf),
    Rejected(String),
}

impl DeliveryAck {
    pub fn is_stored(&self) -> bool {
        matches!(self, DeliveryAck::Stored(_))
    }
}

#[derive(Debug)]
struct Delivery {
    record: ClinicalRecord,
    ack: oneshot::Sender<DeliveryAck>,
}

/// Sending half handed to transports. `deliver` returns only after the
/// listener has persisted and buffered the record (or rejected it).
#[derive(Clone, Debug)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<Delivery>,
}

impl DeliveryHandle {
    pub async fn deliver(&self, record: ClinicalRecord) -> Result<DeliveryAck> {
        let (ack, verdict) = oneshot::channel();
        self.tx
            .send(Delivery { record, ack })
            .await
            .map_err(|_| {
                RetrievalError::Endpoint("receive listener is not running".into())
            })?;
        verdict.await.map_err(|_| {
            RetrievalError::Endpoint(
                "receive listener dropped the delivery without acknowledging"
                    .into(),
            )
        })
    }
}

/// Receiving endpoint started once per run.
pub struct StoreEndpoint {
    buffer: ReceiveBuffer,
    handle: DeliveryHandle,
    shutdown: CancellationToken,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for StoreEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreEndpoint")
            .field("buffer", &self.buffer)
            .field("sink", &"RecordSink")
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl StoreEndpoint {
    /// Spawns the listener on the current tokio runtime.
    pub fn start(sink: Arc<dyn RecordSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let buffer = ReceiveBuffer::new();
        let shutdown = CancellationToken::new();

        let listener = tokio::spawn(listen(
            rx,
            sink,
            buffer.clone(),
            shutdown.child_token(),
        ));
        info!(target: "retrieval::receive", capacity, "receive endpoint started");

        Self {
            buffer,
            handle: DeliveryHandle { tx },
            shutdown,
            listener: std::sync::Mutex::new(Some(listener)),
        }
    }

    pub fn delivery_handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    /// Stops the listener. Deliveries still queued are dropped, which their
    /// senders observe as an endpoint error.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let listener = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(listener) = listener
            && let Err(err) = listener.await
        {
            warn!(target: "retrieval::receive", error = %err, "receive listener ended abnormally");
        }
        info!(target: "retrieval::receive", "receive endpoint stopped");
    }
}

#[async_trait]
impl ReceiveEndpoint for StoreEndpoint {
    async fn received(&self) -> Vec<ClinicalRecord> {
        self.buffer.snapshot().await
    }

    async fn clear(&self) {
        self.buffer.clear().await;
    }
}

async fn listen(
    mut rx: mpsc::Receiver<Delivery>,
    sink: Arc<dyn RecordSink>,
    buffer: ReceiveBuffer,
    shutdown: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };
        accept(delivery, sink.as_ref(), &buffer).await;
    }
    debug!(target: "retrieval::receive", "receive listener exiting");
}

async fn accept(delivery: Delivery, sink: &dyn RecordSink, buffer: &ReceiveBuffer) {
    let Delivery { record, ack } = delivery;
    let verdict = match sink.store(&record).await {
        Ok(path) => {
            info!(
                target: "retrieval::receive",
                patient = %record.patient_id,
                modality = %record.modality,
                instance = %record.instance_uid,
                path = %path.display(),
                "stored received record"
            );
            buffer.push(record).await;
            DeliveryAck::Stored(path)
        }
        Err(err) => {
            error!(
                target: "retrieval::receive",
                patient = %record.patient_id,
                instance = %record.instance_uid,
                error = %err,
                "failed to persist received record"
            );
            DeliveryAck::Rejected(err.to_string())
        }
    };

    if ack.send(verdict).is_err() {
        debug!(target: "retrieval::receive", "sender stopped waiting for acknowledgement");
    }
}
