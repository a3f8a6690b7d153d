//! Per-project engines and their registry.
//!
//! A [`GraphRegistry`] owns one [`ProjectEngine`] per project. Engines are
//! created on first access by hydrating from the durable store and live until
//! evicted. Each engine guards its graph, rules, snapshots and change monitor
//! with one `RwLock`: queries share it, mutations take it exclusively, so two
//! plans never interleave and readers never see a plan half applied.

use crate::analysis::{ComplexityReport, CouplingReport, DependencyAnalyzer, ImpactResult};
use crate::config::EngineConfig;
use crate::domain::{
    Attributes, ChangeKind, DependencyEdge, DependencyType, EdgeDirection, Node, NodeId, ProjectId,
};
use crate::error::{Error, Result};
use crate::graph::{GraphState, GraphStore};
use crate::monitor::{
    Alert, ChangeEvent, ChangeMonitor, EventEnvelope, GraphEvent, WatcherError, WatcherId,
    check_health,
};
use crate::persistence::{ArchitectureStore, Hydrated, HydrationWarning, hydrate};
use crate::plan::{
    AppliedChange, ExecuteOptions, Executed, Plan, PlanExecutor, PlanOperation, PlanOutcome,
    SyncWarning, changes_from_diff, write_through,
};
use crate::rules::{Rule, RuleEngine, RuleReport, RuleScope};
use crate::simulation::{ChangeSimulator, Simulation};
use crate::versioning::{GraphDiff, SnapshotMeta, VersionManager};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct EngineState {
    store: GraphStore,
    rules: RuleEngine,
    versions: VersionManager,
    monitor: ChangeMonitor,
    hydration_warnings: Vec<HydrationWarning>,
    needs_reconciliation: bool,
}

impl EngineState {
    fn deliver(&mut self, changes: &[AppliedChange], actor: Option<&str>) {
        for change in changes {
            if let Some((event, dependents)) = change.change_event(actor) {
                self.monitor.deliver(event, dependents);
            }
        }
    }
}

/// Result of an explicit rollback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackOutcome {
    /// The restored snapshot
    pub snapshot: SnapshotMeta,
    /// Number of store calls needed to bring the durable store along
    pub changes: usize,
    /// Write-through failures
    pub sync_warnings: Vec<SyncWarning>,
}

/// The graph engine of one project
pub struct ProjectEngine {
    project: ProjectId,
    backend: Arc<dyn ArchitectureStore>,
    config: EngineConfig,
    state: RwLock<EngineState>,
}

impl std::fmt::Debug for ProjectEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectEngine")
            .field("project", &self.project)
            .field("backend", &"<dyn ArchitectureStore>")
            .finish_non_exhaustive()
    }
}

impl ProjectEngine {
    /// Build an engine from a hydrated project
    #[must_use]
    pub fn new(
        project: ProjectId,
        backend: Arc<dyn ArchitectureStore>,
        config: EngineConfig,
        hydrated: Hydrated,
    ) -> Self {
        let state = EngineState {
            store: hydrated.store,
            rules: hydrated.rules,
            versions: VersionManager::new(config.versioning.max_snapshots),
            monitor: ChangeMonitor::new(project.clone()),
            hydration_warnings: hydrated.warnings,
            needs_reconciliation: false,
        };
        Self {
            project,
            backend,
            config,
            state: RwLock::new(state),
        }
    }

    /// Project this engine serves
    #[must_use]
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Engine settings
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ===== Queries =====

    /// Every node, ordered by id
    pub async fn all_nodes(&self) -> Vec<Node> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state.store.all_nodes().into_iter().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// One node.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn get_node(&self, id: &NodeId) -> Result<Node> {
        self.state.read().await.store.node(id).cloned()
    }

    /// Edges of a node on one side.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn get_dependencies(
        &self,
        id: &NodeId,
        direction: EdgeDirection,
    ) -> Result<Vec<DependencyEdge>> {
        self.state.read().await.store.get_edges(id, direction)
    }

    /// Node and edge counts
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.store.node_count(), state.store.edge_count())
    }

    /// Deep copy of the current nodes and edges
    pub async fn graph_state(&self) -> GraphState {
        self.state.read().await.store.state()
    }

    /// Every cycle in the graph
    pub async fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let state = self.state.read().await;
        DependencyAnalyzer::new(&state.store, &self.config.analysis).detect_cycles()
    }

    /// Cycles formed by edges of one type
    pub async fn detect_cycles_of(&self, dep_type: &DependencyType) -> Vec<Vec<NodeId>> {
        let state = self.state.read().await;
        DependencyAnalyzer::new(&state.store, &self.config.analysis)
            .detect_cycles_by(|t| t == dep_type)
    }

    /// Impact of a change on the node's dependents.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn impact_analysis(
        &self,
        id: &NodeId,
        change_kind: ChangeKind,
    ) -> Result<ImpactResult> {
        let state = self.state.read().await;
        DependencyAnalyzer::new(&state.store, &self.config.analysis)
            .impact_analysis(id, change_kind)
    }

    /// Dependent chains; `max_depth` defaults to the configured propagation depth.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn propagation_paths(
        &self,
        id: &NodeId,
        max_depth: Option<usize>,
    ) -> Result<Vec<Vec<NodeId>>> {
        let state = self.state.read().await;
        let depth = max_depth.unwrap_or(self.config.analysis.propagation_depth);
        DependencyAnalyzer::new(&state.store, &self.config.analysis).propagation_paths(id, depth)
    }

    /// Dependency chains; `max_depth` defaults to the configured chain depth.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn dependency_chains(
        &self,
        id: &NodeId,
        max_depth: Option<usize>,
    ) -> Result<Vec<Vec<NodeId>>> {
        let state = self.state.read().await;
        let depth = max_depth.unwrap_or(self.config.analysis.chain_depth);
        DependencyAnalyzer::new(&state.store, &self.config.analysis).dependency_chains(id, depth)
    }

    /// Coupling metrics of one node.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn coupling(&self, id: &NodeId) -> Result<CouplingReport> {
        let state = self.state.read().await;
        DependencyAnalyzer::new(&state.store, &self.config.analysis).coupling(id)
    }

    /// Complexity metrics of the whole graph
    pub async fn complexity(&self) -> ComplexityReport {
        let state = self.state.read().await;
        DependencyAnalyzer::new(&state.store, &self.config.analysis).complexity()
    }

    /// Simulate a change without applying it.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] for unknown ids.
    pub async fn simulate(
        &self,
        id: &NodeId,
        change_kind: ChangeKind,
        proposed: Attributes,
    ) -> Result<Simulation> {
        let state = self.state.read().await;
        ChangeSimulator::new(&state.store, &state.rules, &self.config.analysis)
            .simulate(id, change_kind, proposed)
    }

    /// Check the current graph against every rule
    pub async fn validate_rules(&self) -> RuleReport {
        let state = self.state.read().await;
        state.rules.validate_all(&state.store)
    }

    /// Registered rules, highest priority first
    pub async fn rules(&self) -> Vec<Rule> {
        self.state.read().await.rules.rules().to_vec()
    }

    /// Records skipped when the project was loaded
    pub async fn hydration_warnings(&self) -> Vec<HydrationWarning> {
        self.state.read().await.hydration_warnings.clone()
    }

    /// Whether a write-through failed since the last reload
    pub async fn needs_reconciliation(&self) -> bool {
        self.state.read().await.needs_reconciliation
    }

    // ===== Mutations =====

    /// Execute a plan, then record and publish its changes and write them
    /// through to the durable store.
    ///
    /// # Errors
    ///
    /// Internal failures only; rejections are reported in the outcome.
    pub async fn execute_plan(&self, plan: &Plan, options: &ExecuteOptions) -> Result<PlanOutcome> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Executed {
            mut outcome,
            changes,
        } = PlanExecutor::new(
            &mut state.store,
            &state.rules,
            &mut state.versions,
            &self.config.analysis,
        )
        .execute(plan, options)?;

        if changes.is_empty() {
            return Ok(outcome);
        }

        state.deliver(&changes, options.actor.as_deref());
        outcome.sync_warnings = self.sync(state, &changes).await;
        Ok(outcome)
    }

    /// Create one node through a single-step plan
    ///
    /// # Errors
    ///
    /// See [`Self::execute_plan`].
    pub async fn create_node(&self, data: Attributes, actor: Option<&str>) -> Result<PlanOutcome> {
        self.single_step(PlanOperation::create_node(data), actor).await
    }

    /// Merge attributes into one node through a single-step plan
    ///
    /// # Errors
    ///
    /// See [`Self::execute_plan`].
    pub async fn update_node(
        &self,
        id: &NodeId,
        data: Attributes,
        actor: Option<&str>,
    ) -> Result<PlanOutcome> {
        self.single_step(PlanOperation::update_node(id.clone(), data), actor)
            .await
    }

    /// Delete one node through a single-step plan
    ///
    /// # Errors
    ///
    /// See [`Self::execute_plan`].
    pub async fn delete_node(&self, id: &NodeId, actor: Option<&str>) -> Result<PlanOutcome> {
        self.single_step(PlanOperation::delete_node(id.clone()), actor)
            .await
    }

    /// Add one dependency through a single-step plan
    ///
    /// # Errors
    ///
    /// See [`Self::execute_plan`].
    pub async fn create_dependency(
        &self,
        from: &NodeId,
        to: &NodeId,
        dep_type: DependencyType,
        actor: Option<&str>,
    ) -> Result<PlanOutcome> {
        self.single_step(
            PlanOperation::create_dependency(from.as_str(), to.as_str(), dep_type),
            actor,
        )
        .await
    }

    async fn single_step(&self, op: PlanOperation, actor: Option<&str>) -> Result<PlanOutcome> {
        let options = ExecuteOptions {
            create_snapshot: false,
            actor: actor.map(str::to_string),
            ..ExecuteOptions::default()
        };
        self.execute_plan(&Plan::new(vec![op]), &options).await
    }

    /// Capture the current graph.
    ///
    /// # Errors
    ///
    /// Id generation failures.
    pub async fn create_snapshot(&self, name: &str, description: &str) -> Result<String> {
        let mut state = self.state.write().await;
        let EngineState {
            store, versions, ..
        } = &mut *state;
        versions.create_snapshot(store, name, description)
    }

    /// Restore a snapshot and bring the durable store along.
    ///
    /// # Errors
    ///
    /// [`Error::SnapshotNotFound`] for unknown ids; the graph is left as is.
    pub async fn rollback(&self, snapshot_id: &str) -> Result<RollbackOutcome> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let previous = state.store.clone();
        let snapshot = state.versions.rollback(snapshot_id, &mut state.store)?;
        let changes = changes_from_diff(&previous, GraphDiff::between(&previous, &state.store));

        state.deliver(&changes, None);
        let sync_warnings = self.sync(state, &changes).await;
        Ok(RollbackOutcome {
            snapshot: snapshot.meta().clone(),
            changes: changes.len(),
            sync_warnings,
        })
    }

    /// Metadata of retained snapshots, oldest first
    pub async fn list_snapshots(&self) -> Vec<SnapshotMeta> {
        self.state.read().await.versions.list_snapshots()
    }

    /// Add or replace a rule
    pub async fn register_rule(&self, scope: RuleScope, rule: Rule) {
        self.state.write().await.rules.register(scope, rule);
    }

    /// Remove a rule by name
    pub async fn unregister_rule(&self, name: &str) -> Option<Rule> {
        self.state.write().await.rules.unregister(name)
    }

    /// Write `changes` through while the durable store is marked stale, so a
    /// caller dropping this future mid-write still leaves the flag set.
    async fn sync(
        &self,
        state: &mut EngineState,
        changes: &[AppliedChange],
    ) -> Vec<SyncWarning> {
        let pending = state.needs_reconciliation;
        state.needs_reconciliation = true;
        let warnings = self.write_through(changes).await;
        state.needs_reconciliation = pending || !warnings.is_empty();
        warnings
    }

    async fn write_through(&self, changes: &[AppliedChange]) -> Vec<SyncWarning> {
        write_through(
            self.backend.as_ref(),
            &self.project,
            changes,
            self.config.persistence.write_timeout(),
        )
        .await
    }

    /// Re-hydrate graph and rules from the durable store.
    ///
    /// Snapshots, history, watchers and subscribers are kept.
    ///
    /// # Errors
    ///
    /// Store errors and [`Error::Timeout`].
    pub async fn reload(&self) -> Result<()> {
        let hydrated = load(self.backend.as_ref(), &self.project, &self.config).await?;
        let mut state = self.state.write().await;
        state.store = hydrated.store;
        state.rules = hydrated.rules;
        state.hydration_warnings = hydrated.warnings;
        state.needs_reconciliation = false;
        info!(project = %self.project, nodes = state.store.node_count(), "Reloaded project");
        Ok(())
    }

    // ===== Notifications =====

    /// Invoke `callback` on every future change to `node_id`.
    ///
    /// # Errors
    ///
    /// [`Error::NodeNotFound`] if the node is not in the graph.
    pub async fn register_watcher<F>(&self, node_id: NodeId, callback: F) -> Result<WatcherId>
    where
        F: Fn(&ChangeEvent) -> std::result::Result<(), WatcherError> + Send + Sync + 'static,
    {
        let mut state = self.state.write().await;
        state.store.node(&node_id)?;
        Ok(state.monitor.register_watcher(node_id, callback))
    }

    /// Remove one watcher
    pub async fn unregister_watcher(&self, id: WatcherId) -> bool {
        self.state.write().await.monitor.unregister_watcher(id)
    }

    /// Remove the watchers of one node, or all of them
    pub async fn unregister_watchers(&self, node_id: Option<&NodeId>) -> usize {
        self.state.write().await.monitor.unregister_all(node_id)
    }

    /// Receive every event published from now on
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        self.state.write().await.monitor.subscribe()
    }

    /// Up to `limit` most recent changes of a node, newest first
    pub async fn recent_changes(&self, node_id: &NodeId, limit: usize) -> Vec<ChangeEvent> {
        self.state
            .read()
            .await
            .monitor
            .recent_changes(node_id, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Up to `limit` most recent changes across the project, newest first
    pub async fn recent_activity(&self, limit: usize) -> Vec<ChangeEvent> {
        self.state
            .read()
            .await
            .monitor
            .recent_activity(limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Run the health checks and publish an `alert` event per finding
    pub async fn check_health(&self) -> Vec<Alert> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let alerts = check_health(
            &state.store,
            &state.rules,
            &self.config,
            &state.hydration_warnings,
        );
        for alert in &alerts {
            state.monitor.publish(GraphEvent::Alert(alert.clone()));
        }
        if !alerts.is_empty() {
            debug!(project = %self.project, alerts = alerts.len(), "Health check raised alerts");
        }
        alerts
    }

    /// Run [`Self::check_health`] periodically until the engine is dropped
    #[must_use]
    pub fn spawn_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let period = Duration::from_secs(self.config.monitoring.health_check_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.check_health().await;
            }
        })
    }
}

async fn load(
    backend: &dyn ArchitectureStore,
    project: &ProjectId,
    config: &EngineConfig,
) -> Result<Hydrated> {
    let deadline = config.persistence.hydrate_timeout();
    tokio::time::timeout(deadline, hydrate(backend, project))
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("hydrate {project}"),
            millis: config.persistence.hydrate_timeout_ms,
        })?
}

type EngineSlot = Arc<OnceCell<Arc<ProjectEngine>>>;

/// Owns one engine per project
pub struct GraphRegistry {
    backend: Arc<dyn ArchitectureStore>,
    config: EngineConfig,
    engines: Mutex<HashMap<ProjectId, EngineSlot>>,
}

impl std::fmt::Debug for GraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRegistry")
            .field("backend", &"<dyn ArchitectureStore>")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GraphRegistry {
    /// Create a registry over a durable store
    #[must_use]
    pub fn new(backend: Arc<dyn ArchitectureStore>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// The engine of `project`, hydrating it on first access.
    ///
    /// Concurrent first calls converge on a single engine. A failed
    /// hydration leaves nothing behind, so the next call tries again.
    ///
    /// # Errors
    ///
    /// Store errors and [`Error::Timeout`].
    pub async fn engine(&self, project: &ProjectId) -> Result<Arc<ProjectEngine>> {
        let slot = {
            let mut engines = self.engines.lock().await;
            Arc::clone(engines.entry(project.clone()).or_default())
        };

        let engine = slot
            .get_or_try_init(|| async {
                let hydrated = load(self.backend.as_ref(), project, &self.config).await?;
                if !hydrated.warnings.is_empty() {
                    warn!(
                        project = %project,
                        warnings = hydrated.warnings.len(),
                        "Project hydrated with skipped records"
                    );
                }
                info!(
                    project = %project,
                    nodes = hydrated.store.node_count(),
                    edges = hydrated.store.edge_count(),
                    rules = hydrated.rules.len(),
                    "Created project engine"
                );
                Ok::<_, Error>(Arc::new(ProjectEngine::new(
                    project.clone(),
                    Arc::clone(&self.backend),
                    self.config.clone(),
                    hydrated,
                )))
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    /// Re-hydrate a project from the durable store, loading it if needed.
    ///
    /// # Errors
    ///
    /// Store errors and [`Error::Timeout`].
    pub async fn reload(&self, project: &ProjectId) -> Result<Arc<ProjectEngine>> {
        let loaded = self
            .engines
            .lock()
            .await
            .get(project)
            .and_then(|slot| slot.get().cloned());
        match loaded {
            Some(engine) => {
                engine.reload().await?;
                Ok(engine)
            }
            None => self.engine(project).await,
        }
    }

    /// Drop a project's engine; returns whether one was loaded
    pub async fn evict(&self, project: &ProjectId) -> bool {
        let removed = self.engines.lock().await.remove(project);
        let evicted = removed.is_some_and(|slot| slot.initialized());
        if evicted {
            info!(project = %project, "Evicted project engine");
        }
        evicted
    }

    /// Drop every engine; returns how many were loaded
    pub async fn evict_all(&self) -> usize {
        let drained: Vec<EngineSlot> = self.engines.lock().await.drain().map(|(_, s)| s).collect();
        let count = drained.iter().filter(|slot| slot.initialized()).count();
        info!(count, "Evicted all project engines");
        count
    }

    /// Projects with a loaded engine, sorted
    pub async fn projects(&self) -> Vec<ProjectId> {
        let engines = self.engines.lock().await;
        let mut projects: Vec<ProjectId> = engines
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        projects.sort();
        projects
    }
}
