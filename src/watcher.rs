use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Change notification for a followed trace file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Data was written or the file was recreated
    Modified,
    Error(String),
}

/// Watches a trace file so follow mode can load what gets appended
pub struct TraceWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<FileEvent>,
}

impl TraceWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (tx, rx) = channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event)
                    if matches!(
                        event.kind,
                        notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                    ) =>
                {
                    FileEvent::Modified
                }
                Ok(_) => return,
                Err(e) => FileEvent::Error(e.to_string()),
            };
            let _ = tx.send(event);
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", path.display()))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Pending event, if any (non-blocking)
    pub fn try_recv(&self) -> Option<FileEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for an event, then drain the burst that follows it.
    ///
    /// A burst of writes collapses into one `Modified`; an error wins over it.
    pub fn wait(&self, timeout: Duration) -> Option<FileEvent> {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        };

        let mut result = first;
        while let Some(event) = self.try_recv() {
            if matches!(event, FileEvent::Error(_)) {
                result = event;
            }
        }
        Some(result)
    }
}
