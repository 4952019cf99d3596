use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{EventChannel, FactoryEvent};

/// Destination the [`EventRecorder`](super::EventRecorder) writes to.
#[async_trait]
pub trait EventSink: Send + 'static {
    async fn write(&mut self, event: &FactoryEvent) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Appends one JSON line per event to a log file per [`EventChannel`].
///
/// Files are opened lazily in append mode, so existing records survive a
/// restart.
pub struct FileSink {
    dir: PathBuf,
    files: HashMap<EventChannel, File>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn file(&mut self, channel: EventChannel) -> io::Result<&mut File> {
        if !self.files.contains_key(&channel) {
            tokio::fs::create_dir_all(&self.dir).await?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(channel.file_name()))
                .await?;
            self.files.insert(channel, file);
        }
        self.files
            .get_mut(&channel)
            .ok_or_else(|| io::Error::other("log file vanished"))
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn write(&mut self, event: &FactoryEvent) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let file = self.file(event.channel()).await?;
        file.write_all(&line).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        for file in self.files.values_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and demos.
pub struct MemorySink {
    events: MemoryEvents,
}

/// Read side of a [`MemorySink`].
#[derive(Clone, Default)]
pub struct MemoryEvents {
    inner: Arc<Mutex<Vec<FactoryEvent>>>,
}

impl MemorySink {
    pub fn new() -> (Self, MemoryEvents) {
        let events = MemoryEvents::default();
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

impl MemoryEvents {
    pub fn snapshot(&self) -> Vec<FactoryEvent> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn write(&mut self, event: &FactoryEvent) -> io::Result<()> {
        self.events
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
