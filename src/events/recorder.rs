use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventSink, FactoryEvent};

/// Fire-and-forget handle for recording events.
///
/// Cloning is cheap. A handle built with [`EventLog::disabled`] drops every
/// event without counting it.
#[derive(Clone)]
pub struct EventLog {
    sender: Option<mpsc::Sender<FactoryEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventLog {
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queues an event for the recorder without waiting.
    pub fn record(&self, event: FactoryEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(unit_id = event.unit().id(), "Event log full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(unit_id = event.unit().id(), "Event recorder stopped, event dropped");
            }
        }
    }

    /// Events that never reached the recorder.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Actor that owns the sink and writes events in arrival order.
pub struct EventRecorder<S: EventSink> {
    receiver: mpsc::Receiver<FactoryEvent>,
    sink: S,
    written: u64,
}

impl<S: EventSink> EventRecorder<S> {
    /// Creates the recorder and the handle producers use to reach it.
    ///
    /// `buffer` bounds the events in flight; beyond it [`EventLog::record`]
    /// drops instead of waiting.
    pub fn new(buffer: usize, sink: S) -> (Self, EventLog) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let recorder = Self {
            receiver,
            sink,
            written: 0,
        };
        let log = EventLog {
            sender: Some(sender),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (recorder, log)
    }

    /// Runs until every [`EventLog`] is dropped or `cancel` fires. On
    /// cancellation, events already queued are still written.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        info!("Event recorder started");

        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => self.write(event).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    self.receiver.close();
                    while let Some(event) = self.receiver.recv().await {
                        self.write(event).await;
                    }
                    break;
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            warn!(error = %e, "Event sink flush failed");
        }
        info!(written = self.written, "Event recorder stopped");
        self.written
    }

    async fn write(&mut self, event: FactoryEvent) {
        match self.sink.write(&event).await {
            Ok(()) => self.written += 1,
            Err(e) => warn!(error = %e, %event, "Event sink write failed"),
        }
    }
}
