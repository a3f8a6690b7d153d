//! Change history, watchers and the event queue.
//!
//! [`ChangeMonitor`] keeps an append-only log of [`ChangeEvent`]s per node,
//! runs watcher callbacks registered for a node, and publishes typed
//! [`GraphEvent`]s to subscribers.
//!
//! Delivery: every subscriber owns an unbounded channel, so an event is
//! delivered as long as its receiver is alive. Events carry a per-project
//! sequence number and are published by the single writer holding the
//! project lock, which keeps them ordered for every node.

mod alerts;
mod events;

pub use alerts::{Alert, AlertKind, AlertSeverity, check_health};
pub use events::{ChangeEvent, DependentUpdate, EventEnvelope, GraphEvent, changed_fields};

use crate::domain::{DependencyEdge, NodeId, ProjectId};
use crate::error::Result;
use crate::graph::GraphStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default number of entries returned by [`ChangeMonitor::recent_changes`]
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Error type watchers may return
pub type WatcherError = Box<dyn std::error::Error + Send + Sync>;

type WatcherFn = Arc<dyn Fn(&ChangeEvent) -> std::result::Result<(), WatcherError> + Send + Sync>;

/// Handle for unregistering a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WatcherId(u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher-{}", self.0)
    }
}

struct Watcher {
    id: WatcherId,
    node_id: NodeId,
    callback: WatcherFn,
}

/// What happened when a change was delivered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Watchers that ran successfully
    pub watchers_notified: usize,
    /// Watchers that failed or panicked
    pub watcher_failures: usize,
    /// Dependent notices published
    pub dependents_notified: usize,
}

/// Per-project change log and notification hub
pub struct ChangeMonitor {
    project: ProjectId,
    /// Oldest first per node
    history: HashMap<NodeId, Vec<ChangeEvent>>,
    watchers: Vec<Watcher>,
    subscribers: Vec<mpsc::UnboundedSender<EventEnvelope>>,
    next_seq: u64,
    next_watcher: u64,
}

impl fmt::Debug for ChangeMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeMonitor")
            .field("project", &self.project)
            .field("nodes_with_history", &self.history.len())
            .field("watchers", &self.watchers.len())
            .field("subscribers", &self.subscribers.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl ChangeMonitor {
    /// Create a monitor for `project`
    #[must_use]
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            history: HashMap::new(),
            watchers: Vec::new(),
            subscribers: Vec::new(),
            next_seq: 1,
            next_watcher: 1,
        }
    }

    /// Append an event to its node's log
    pub fn record(&mut self, event: ChangeEvent) {
        self.history
            .entry(event.node_id.clone())
            .or_default()
            .push(event);
    }

    /// Full log of a node, oldest first
    #[must_use]
    pub fn history(&self, node_id: &NodeId) -> &[ChangeEvent] {
        self.history.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Up to `limit` most recent changes of a node, newest first
    #[must_use]
    pub fn recent_changes(&self, node_id: &NodeId, limit: usize) -> Vec<&ChangeEvent> {
        self.history(node_id).iter().rev().take(limit).collect()
    }

    /// Up to `limit` most recent changes across all nodes, newest first
    #[must_use]
    pub fn recent_activity(&self, limit: usize) -> Vec<&ChangeEvent> {
        let mut all: Vec<&ChangeEvent> = self.history.values().flatten().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all.truncate(limit);
        all
    }

    /// Invoke `callback` on every future change to `node_id`
    pub fn register_watcher<F>(&mut self, node_id: NodeId, callback: F) -> WatcherId
    where
        F: Fn(&ChangeEvent) -> std::result::Result<(), WatcherError> + Send + Sync + 'static,
    {
        let id = WatcherId(self.next_watcher);
        self.next_watcher += 1;
        debug!(watcher = %id, node = %node_id, "Registered watcher");
        self.watchers.push(Watcher {
            id,
            node_id,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove one watcher; returns whether it existed
    pub fn unregister_watcher(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|w| w.id != id);
        self.watchers.len() != before
    }

    /// Remove every watcher of `node_id`, or every watcher when `None`
    pub fn unregister_all(&mut self, node_id: Option<&NodeId>) -> usize {
        let before = self.watchers.len();
        match node_id {
            Some(node_id) => self.watchers.retain(|w| &w.node_id != node_id),
            None => self.watchers.clear(),
        }
        before - self.watchers.len()
    }

    /// Number of watchers registered for `node_id`
    #[must_use]
    pub fn watcher_count(&self, node_id: &NodeId) -> usize {
        self.watchers.iter().filter(|w| &w.node_id == node_id).count()
    }

    /// Receive every event published from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publish an event to every live subscriber; returns its sequence number
    pub fn publish(&mut self, event: GraphEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let envelope = EventEnvelope {
            seq,
            project: self.project.clone(),
            event,
        };
        self.subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        seq
    }

    /// Record a committed change and deliver it.
    ///
    /// `dependents` are the edges pointing at the node when the change was
    /// made; each one gets a `dependent_needs_update` notice.
    pub fn deliver(&mut self, event: ChangeEvent, dependents: &[DependencyEdge]) -> DeliveryReport {
        self.record(event.clone());
        let mut report = self.run_watchers(&event);
        self.publish(GraphEvent::NodeChanged(event.clone()));
        report.dependents_notified = self.emit_dependent_updates(&event, dependents);
        report
    }

    /// Notify the current dependents of `node_id` about `event`.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::NodeNotFound`] if the node is not in `store`.
    pub fn cascade(
        &mut self,
        store: &GraphStore,
        node_id: &NodeId,
        event: &ChangeEvent,
    ) -> Result<usize> {
        let dependents = store.dependents(node_id)?;
        Ok(self.emit_dependent_updates(event, &dependents))
    }

    fn emit_dependent_updates(
        &mut self,
        event: &ChangeEvent,
        dependents: &[DependencyEdge],
    ) -> usize {
        for edge in dependents {
            self.publish(GraphEvent::DependentNeedsUpdate(DependentUpdate {
                dependent_node_id: edge.from.clone(),
                source_node_id: event.node_id.clone(),
                dependency_type: edge.dep_type.clone(),
                source_change: event.change_kind,
                changed_fields: event.changed_fields.clone(),
                requires_update: true,
                timestamp: Utc::now(),
            }));
        }
        if !dependents.is_empty() {
            debug!(
                node = %event.node_id,
                dependents = dependents.len(),
                "Cascaded change to dependents"
            );
        }
        dependents.len()
    }

    fn run_watchers(&self, event: &ChangeEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for watcher in self.watchers.iter().filter(|w| w.node_id == event.node_id) {
            let callback = Arc::clone(&watcher.callback);
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.watchers_notified += 1,
                Ok(Err(e)) => {
                    warn!(
                        watcher = %watcher.id,
                        node = %event.node_id,
                        error = %e,
                        "Watcher failed"
                    );
                    report.watcher_failures += 1;
                }
                Err(_) => {
                    warn!(watcher = %watcher.id, node = %event.node_id, "Watcher panicked");
                    report.watcher_failures += 1;
                }
            }
        }
        report
    }
}
