//! Graph construction executor.
//!
//! A run has three phases separated by hard barriers:
//! 1. declare a uniqueness constraint per entity identifier (after an optional
//!    clear),
//! 2. upsert entity nodes, one group per entity type, optionally several
//!    groups at once,
//! 3. upsert relationships, only once every entity group has finished.
//!
//! Each group is written in batches. A rejected batch is rolled back and, by
//! default, replayed one row per transaction so that only the offending rows
//! are reported. Cancellation is checked between batches; committed batches
//! are never undone.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;

use insight_core::{
    ConstructionReport, EntityType, GraphMappingModel, RelationshipType, RunStatus, Table,
    ValidatedModel, Value, ValueKey,
};
use insight_graph::{
    GraphMutator, GraphStatistics, MergeOutcome, MutationBatch, NodeRef, Properties, StoreError,
};

use crate::config::BuildConfig;
use crate::error::{ConstructionError, Result};

// ── Cancellation ─────────────────────────────────────────────────

/// Handle for cancelling a running construction.
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a new cancellation handle and receiver.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel_tx: tx }, rx)
    }

    /// Request cancellation. Takes effect at the next batch boundary.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new().0
    }
}

// ── Planned Writes ───────────────────────────────────────────────

enum WriteOp<'m> {
    Node {
        entity: &'m EntityType,
        id: Value,
        attributes: Properties,
    },
    Edge {
        rel: &'m RelationshipType,
        source: &'m EntityType,
        target: &'m EntityType,
        source_id: Value,
        target_id: Value,
        attributes: Properties,
    },
}

/// One merge, tagged with the source row it came from.
struct PlannedWrite<'m> {
    row_index: usize,
    op: WriteOp<'m>,
}

impl PlannedWrite<'_> {
    async fn apply(
        &self,
        batch: &mut dyn MutationBatch,
    ) -> std::result::Result<MergeOutcome, StoreError> {
        match &self.op {
            WriteOp::Node {
                entity,
                id,
                attributes,
            } => {
                batch
                    .merge_node(&entity.name, &entity.identifier_column, id, attributes)
                    .await
            }
            WriteOp::Edge {
                rel,
                source,
                target,
                source_id,
                target_id,
                attributes,
            } => {
                batch
                    .merge_relationship(
                        &rel.name,
                        NodeRef::new(&source.name, &source.identifier_column, source_id),
                        NodeRef::new(&target.name, &target.identifier_column, target_id),
                        attributes,
                    )
                    .await
            }
        }
    }

    fn missing_endpoint_reason(&self) -> String {
        match &self.op {
            WriteOp::Edge {
                source,
                target,
                source_id,
                target_id,
                ..
            } => format!(
                "missing endpoint: {}({} = {}) -> {}({} = {})",
                source.name,
                source.identifier_column,
                source_id,
                target.name,
                target.identifier_column,
                target_id
            ),
            WriteOp::Node { entity, id, .. } => {
                format!("store reported a missing endpoint for node {}({id})", entity.name)
            }
        }
    }
}

/// All writes for one entity or relationship type.
struct WriteGroup<'m> {
    source: &'m str,
    writes: Vec<PlannedWrite<'m>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

/// Report plus post-build statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub report: ConstructionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<GraphStatistics>,
}

// ── Executor ─────────────────────────────────────────────────────

/// Writes a validated mapping and its tables into a graph store.
pub struct ConstructionExecutor<'s> {
    store: &'s dyn GraphMutator,
    config: BuildConfig,
    cancel_rx: watch::Receiver<bool>,
}

impl<'s> ConstructionExecutor<'s> {
    pub fn new(store: &'s dyn GraphMutator, config: BuildConfig) -> Self {
        let (_, cancel_rx) = watch::channel(false);
        Self {
            store,
            config,
            cancel_rx,
        }
    }

    /// Stop at the next batch boundary once the handle is cancelled.
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Run a full construction.
    ///
    /// Row-level failures land in the report. Only an unreachable store, a
    /// store that refuses preparation, or a mapping that does not fit the
    /// tables produce an error.
    pub async fn execute(&self, model: &ValidatedModel, tables: &[Table]) -> Result<BuildOutcome> {
        let violations = model.validate_against(tables);
        if !violations.is_empty() {
            return Err(ConstructionError::InvalidSources(violations));
        }
        let mut report = ConstructionReport::begin(model.fingerprint());
        let model: &GraphMappingModel = model.model();
        let tables: HashMap<&str, &Table> = tables.iter().map(|t| (t.name.as_str(), t)).collect();

        tracing::info!(
            run_id = %report.run_id,
            fingerprint = %report.model_fingerprint,
            entity_types = model.entity_types.len(),
            relationship_types = model.relationship_types.len(),
            "Starting graph construction"
        );

        if let Err(e) = self.prepare(model).await {
            return Err(if e.is_unavailable() {
                connectivity_failure(report, e)
            } else {
                ConstructionError::Preparation {
                    report: Box::new(report.finish(RunStatus::Incomplete)),
                    source: e,
                }
            });
        }

        // ── Entities ──
        let groups: Vec<WriteGroup<'_>> = model
            .entity_types
            .iter()
            .filter_map(|entity| {
                let table = tables.get(entity.source_table.as_str())?;
                Some(plan_entity(entity, table, &mut report))
            })
            .collect();
        let concurrency = if self.config.parallel_entities {
            self.config.max_concurrent_entities
        } else {
            1
        };

        let (partial, flow) = self.write_groups(&groups, concurrency).await;
        report.merge(partial);
        match flow {
            Err(e) => return Err(connectivity_failure(report, e)),
            Ok(Flow::Cancelled) => return Ok(self.cancelled(report)),
            Ok(Flow::Continue) => {}
        }
        tracing::info!(
            nodes_created = report.nodes_created,
            nodes_merged = report.nodes_merged,
            "Entity phase complete"
        );

        // ── Relationships ──
        let groups: Vec<WriteGroup<'_>> = model
            .relationship_types
            .iter()
            .filter_map(|rel| plan_relationship(model, rel, &tables))
            .collect();

        let (partial, flow) = self.write_groups(&groups, 1).await;
        report.merge(partial);
        match flow {
            Err(e) => return Err(connectivity_failure(report, e)),
            Ok(Flow::Cancelled) => return Ok(self.cancelled(report)),
            Ok(Flow::Continue) => {}
        }

        let report = report.finish(RunStatus::Completed);
        tracing::info!(
            run_id = %report.run_id,
            nodes_created = report.nodes_created,
            nodes_merged = report.nodes_merged,
            relationships_created = report.relationships_created,
            relationships_merged = report.relationships_merged,
            batches = report.batches_committed,
            row_errors = report.errors.len(),
            "Graph construction complete"
        );

        let statistics = self.collect_statistics().await;
        Ok(BuildOutcome { report, statistics })
    }

    async fn prepare(&self, model: &GraphMappingModel) -> std::result::Result<(), StoreError> {
        if self.config.clear_before_build {
            let deleted = self.store.clear().await?;
            tracing::info!(deleted, "Cleared graph before build");
        }
        for entity in &model.entity_types {
            self.store
                .declare_unique_constraint(&entity.name, &entity.identifier_column)
                .await?;
        }
        tracing::info!(
            constraints = model.entity_types.len(),
            "Declared uniqueness constraints"
        );
        Ok(())
    }

    fn cancelled(&self, report: ConstructionReport) -> BuildOutcome {
        let report = report.finish(RunStatus::Cancelled);
        tracing::warn!(
            run_id = %report.run_id,
            batches = report.batches_committed,
            "Graph construction cancelled"
        );
        BuildOutcome {
            report,
            statistics: None,
        }
    }

    async fn collect_statistics(&self) -> Option<GraphStatistics> {
        if !self.config.collect_statistics {
            return None;
        }
        match self.store.statistics().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Could not collect graph statistics");
                None
            }
        }
    }

    // ── Batching ─────────────────────────────────────────────────

    /// Write several groups with bounded concurrency. Partial reports are
    /// merged in group order so the result does not depend on scheduling.
    async fn write_groups(
        &self,
        groups: &[WriteGroup<'_>],
        concurrency: usize,
    ) -> (ConstructionReport, std::result::Result<Flow, StoreError>) {
        let mut results: Vec<_> = stream::iter(groups.iter().enumerate())
            .map(|(index, group)| async move {
                let mut partial = ConstructionReport::begin(String::new());
                let flow = self.write_group(group, &mut partial).await;
                (index, partial, flow)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut total = ConstructionReport::begin(String::new());
        let mut outcome: std::result::Result<Flow, StoreError> = Ok(Flow::Continue);
        for (_, partial, flow) in results {
            total.merge(partial);
            match flow {
                Err(e) if outcome.is_ok() => outcome = Err(e),
                Ok(Flow::Cancelled) if outcome == Ok(Flow::Continue) => {
                    outcome = Ok(Flow::Cancelled)
                }
                _ => {}
            }
        }
        (total, outcome)
    }

    async fn write_group(
        &self,
        group: &WriteGroup<'_>,
        report: &mut ConstructionReport,
    ) -> std::result::Result<Flow, StoreError> {
        tracing::info!(source = group.source, writes = group.writes.len(), "Writing group");

        for chunk in group.writes.chunks(self.config.effective_batch_size()) {
            if self.is_cancelled() {
                tracing::info!(source = group.source, "Cancellation requested, stopping");
                return Ok(Flow::Cancelled);
            }

            match self.commit_batch(chunk).await {
                Ok(outcomes) => {
                    report.batches_committed += 1;
                    for (write, outcome) in chunk.iter().zip(outcomes) {
                        tally(report, group.source, write, outcome);
                    }
                    tracing::debug!(source = group.source, rows = chunk.len(), "Batch committed");
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        source = group.source,
                        rows = chunk.len(),
                        error = %e,
                        "Batch rejected and rolled back"
                    );
                    if self.config.isolate_failed_batches && chunk.len() > 1 {
                        self.replay_rows(group.source, chunk, report).await?;
                    } else {
                        for write in chunk {
                            record_error(report, group.source, write.row_index, e.to_string());
                        }
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Retry each row of a rejected batch in its own transaction.
    async fn replay_rows(
        &self,
        source: &str,
        chunk: &[PlannedWrite<'_>],
        report: &mut ConstructionReport,
    ) -> std::result::Result<(), StoreError> {
        for write in chunk {
            match self.commit_batch(std::slice::from_ref(write)).await {
                Ok(outcomes) => {
                    report.batches_committed += 1;
                    for outcome in outcomes {
                        tally(report, source, write, outcome);
                    }
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => record_error(report, source, write.row_index, e.to_string()),
            }
        }
        Ok(())
    }

    /// Apply writes in one transaction; roll back on the first failure.
    async fn commit_batch(
        &self,
        writes: &[PlannedWrite<'_>],
    ) -> std::result::Result<Vec<MergeOutcome>, StoreError> {
        let mut batch = self.store.begin_batch().await?;
        let mut outcomes = Vec::with_capacity(writes.len());

        for write in writes {
            match write.apply(batch.as_mut()).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    if let Err(rollback_err) = batch.rollback().await {
                        tracing::warn!(error = %rollback_err, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }

        batch.commit().await?;
        Ok(outcomes)
    }
}

fn connectivity_failure(report: ConstructionReport, source: StoreError) -> ConstructionError {
    tracing::error!(
        error = %source,
        batches = report.batches_committed,
        "Graph store unreachable, construction incomplete"
    );
    ConstructionError::Connectivity {
        report: Box::new(report.finish(RunStatus::Incomplete)),
        source,
    }
}

fn tally(
    report: &mut ConstructionReport,
    source: &str,
    write: &PlannedWrite<'_>,
    outcome: MergeOutcome,
) {
    match (outcome, &write.op) {
        (MergeOutcome::Created, WriteOp::Node { .. }) => report.nodes_created += 1,
        (MergeOutcome::Merged, WriteOp::Node { .. }) => report.nodes_merged += 1,
        (MergeOutcome::Created, WriteOp::Edge { .. }) => report.relationships_created += 1,
        (MergeOutcome::Merged, WriteOp::Edge { .. }) => report.relationships_merged += 1,
        (MergeOutcome::MissingEndpoint, _) => {
            record_error(report, source, write.row_index, write.missing_endpoint_reason())
        }
    }
}

fn record_error(report: &mut ConstructionReport, source: &str, row_index: usize, reason: String) {
    tracing::warn!(source, row_index, reason = %reason, "Row not written");
    report.record_row_error(row_index, source, reason);
}

// ── Planning ─────────────────────────────────────────────────────

/// One node write per distinct identifier; the last row wins.
fn plan_entity<'m>(
    entity: &'m EntityType,
    table: &Table,
    report: &mut ConstructionReport,
) -> WriteGroup<'m> {
    let mut positions: HashMap<ValueKey, usize> = HashMap::new();
    let mut writes = Vec::new();

    for (row_index, row) in table.rows.iter().enumerate() {
        let id_column = &entity.identifier_column;
        let id = entity.coerce(id_column, Table::cell(row, id_column));
        let Some(key) = id.key() else {
            record_error(
                report,
                &entity.name,
                row_index,
                format!("null identifier '{}'", entity.identifier_column),
            );
            continue;
        };

        let attributes = entity
            .attribute_columns
            .iter()
            .map(|column| {
                let value = entity.coerce(column, Table::cell(row, column));
                (column.clone(), value)
            })
            .collect();
        let write = PlannedWrite {
            row_index,
            op: WriteOp::Node {
                entity,
                id,
                attributes,
            },
        };

        match positions.get(&key) {
            Some(&position) => writes[position] = write,
            None => {
                positions.insert(key, writes.len());
                writes.push(write);
            }
        }
    }

    WriteGroup {
        source: &entity.name,
        writes,
    }
}

/// One edge write per distinct (source id, target id); the last row wins.
/// Rows with a null source id were already reported by the entity phase and
/// rows with a null foreign key have no edge.
fn plan_relationship<'m>(
    model: &'m GraphMappingModel,
    rel: &'m RelationshipType,
    tables: &HashMap<&str, &Table>,
) -> Option<WriteGroup<'m>> {
    let source = model.entity(&rel.source_entity)?;
    let target = model.entity(&rel.target_entity)?;
    let table = tables.get(source.source_table.as_str())?;

    let mut positions: HashMap<(ValueKey, ValueKey), usize> = HashMap::new();
    let mut writes = Vec::new();

    for (row_index, row) in table.rows.iter().enumerate() {
        let source_column = &source.identifier_column;
        let source_id = source.coerce(source_column, Table::cell(row, source_column));
        // Foreign keys take the type of the identifier they point at.
        let target_id = target.coerce(
            &target.identifier_column,
            Table::cell(row, &rel.source_key_column),
        );
        let (Some(source_key), Some(target_key)) = (source_id.key(), target_id.key()) else {
            continue;
        };

        let attributes = rel
            .attribute_columns
            .iter()
            .map(|column| {
                let value = source.coerce(column, Table::cell(row, column));
                (column.clone(), value)
            })
            .collect();
        let write = PlannedWrite {
            row_index,
            op: WriteOp::Edge {
                rel,
                source,
                target,
                source_id,
                target_id,
                attributes,
            },
        };

        match positions.get(&(source_key.clone(), target_key.clone())) {
            Some(&position) => writes[position] = write,
            None => {
                positions.insert((source_key, target_key), writes.len());
                writes.push(write);
            }
        }
    }

    Some(WriteGroup {
        source: &rel.name,
        writes,
    })
}
