//! The per-station ring of exclusive assembly tools.
//!
//! Worker `i` of a station with `n` workers assembles with tools `i` (left)
//! and `(i + 1) % n` (right). Because the tools form a cycle, taking the left
//! tool first everywhere lets every worker hold one tool while waiting forever
//! for its neighbour's. [`AcquireOrder::LowerIndexFirst`] breaks the cycle by
//! ranking tools by index: worker `n - 1` reaches for tool `0` before tool
//! `n - 1`, so at least one worker can always finish.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::ProductionError;

/// Order in which a worker reaches for its two tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireOrder {
    /// Global ranking: always the lower-indexed tool first. Deadlock-free.
    #[default]
    LowerIndexFirst,
    /// Left tool, then right tool, for every worker. Admits the circular wait.
    LeftFirst,
}

impl AcquireOrder {
    /// Returns `(first, second)` tool indices for `worker` in a ring of `size`.
    pub fn sequence(self, worker: usize, size: usize) -> (usize, usize) {
        let (left, right) = neighbours(worker, size);
        match self {
            AcquireOrder::LeftFirst => (left, right),
            AcquireOrder::LowerIndexFirst => (left.min(right), left.max(right)),
        }
    }
}

fn neighbours(worker: usize, size: usize) -> (usize, usize) {
    (worker, (worker + 1) % size)
}

struct Tool {
    lock: Semaphore,
    holders: AtomicUsize,
}

pub struct ToolRing {
    station_id: usize,
    tools: Vec<Tool>,
}

/// Exclusive hold on one tool; released on drop.
pub struct ToolGuard<'a> {
    index: usize,
    tool: &'a Tool,
    _permit: SemaphorePermit<'a>,
}

impl ToolGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for ToolGuard<'_> {
    fn drop(&mut self) {
        self.tool.holders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The two tools a worker needs for one assembly.
pub struct ToolPair<'a> {
    left: Option<ToolGuard<'a>>,
    right: Option<ToolGuard<'a>>,
}

impl ToolPair<'_> {
    pub fn left(&self) -> Option<usize> {
        self.left.as_ref().map(ToolGuard::index)
    }

    pub fn right(&self) -> Option<usize> {
        self.right.as_ref().map(ToolGuard::index)
    }

    /// Puts the right tool down, then the left one.
    pub fn release(mut self) {
        drop(self.right.take());
        drop(self.left.take());
    }
}

impl Drop for ToolPair<'_> {
    fn drop(&mut self) {
        drop(self.right.take());
        drop(self.left.take());
    }
}

impl ToolRing {
    /// Creates a ring of `size` free tools for `station_id`.
    ///
    /// # Errors
    /// [`ProductionError::RingTooSmall`] if `size < 2`.
    pub fn new(station_id: usize, size: usize) -> Result<Self, ProductionError> {
        if size < 2 {
            return Err(ProductionError::RingTooSmall(size));
        }
        let tools = (0..size)
            .map(|_| Tool {
                lock: Semaphore::new(1),
                holders: AtomicUsize::new(0),
            })
            .collect();
        Ok(Self { station_id, tools })
    }

    pub fn station_id(&self) -> usize {
        self.station_id
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Takes one tool exclusively, waiting while another worker holds it.
    pub async fn acquire_tool(
        &self,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<ToolGuard<'_>, ProductionError> {
        let tool = self.tools.get(index).ok_or(ProductionError::UnknownTool {
            tool: index,
            tools: self.tools.len(),
        })?;
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProductionError::Cancelled),
            permit = tool.lock.acquire() => permit,
        };
        let permit = permit.map_err(|_| ProductionError::ResourceClosed("tool"))?;

        tool.holders.fetch_add(1, Ordering::SeqCst);
        trace!(station = self.station_id, tool = index, "Tool taken");
        Ok(ToolGuard {
            index,
            tool,
            _permit: permit,
        })
    }

    /// Takes both tools of `worker` in the given order.
    ///
    /// If cancelled between the two acquisitions the first tool is put back
    /// before returning.
    pub async fn acquire_pair(
        &self,
        worker: usize,
        order: AcquireOrder,
        cancel: &CancellationToken,
    ) -> Result<ToolPair<'_>, ProductionError> {
        if worker >= self.tools.len() {
            return Err(ProductionError::UnknownWorker {
                worker,
                workers: self.tools.len(),
            });
        }
        let (left, _) = neighbours(worker, self.tools.len());
        let (first, second) = order.sequence(worker, self.tools.len());

        let first = self.acquire_tool(first, cancel).await?;
        let second = self.acquire_tool(second, cancel).await?;

        let (left, right) = if first.index() == left {
            (first, second)
        } else {
            (second, first)
        };
        Ok(ToolPair {
            left: Some(left),
            right: Some(right),
        })
    }

    /// Number of workers holding tool `index` right now.
    pub fn holders(&self, index: usize) -> usize {
        self.tools
            .get(index)
            .map_or(0, |tool| tool.holders.load(Ordering::SeqCst))
    }
}
