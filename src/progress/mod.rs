//! Weighted unit-of-work tree for composing progress of independent sub-tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Node of a progress tree.
///
/// Cloning yields another handle to the same node, so a child can be handed
/// to a worker thread while the parent is read elsewhere.
#[derive(Clone, Debug)]
pub struct ProgressNode {
    inner: Arc<NodeInner>,
}

#[derive(Debug)]
struct NodeInner {
    /// Units this node represents, including those delegated to children.
    total: u64,
    /// Units reported directly on this node.
    completed: AtomicU64,
    /// Children with the parent units they account for when finished.
    children: Mutex<Vec<(u64, ProgressNode)>>,
}

impl ProgressNode {
    /// Root node with `total` units and nothing completed.
    pub fn new(total: u64) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                total,
                completed: AtomicU64::new(0),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attach a child that counts for `weight` of this node's units once it
    /// finishes. The child's own `total` is independent of the weight.
    pub fn child(&self, weight: u64, total: u64) -> ProgressNode {
        let child = ProgressNode::new(total);
        self.inner
            .children
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push((weight, child.clone()));
        child
    }

    /// Report `delta` units done on this node, clamped to its total.
    ///
    /// Returns the completed count after the update.
    pub fn increment(&self, delta: u64) -> u64 {
        let total = self.inner.total;
        let previous = self
            .inner
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(delta).min(total))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_add(delta).min(total)
    }

    /// Units reported directly on this node.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.inner.total
    }

    /// Completed share in `[0, 1]`, including weighted child contributions.
    ///
    /// A node without units reads as finished.
    pub fn fraction(&self) -> f64 {
        let total = self.inner.total;
        if total == 0 {
            return 1.0;
        }
        let children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let delegated: f64 = children
            .iter()
            .map(|(weight, child)| child.fraction() * *weight as f64)
            .sum();
        let done = self.completed() as f64 + delegated;
        (done / total as f64).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.fraction() >= 1.0
    }
}
