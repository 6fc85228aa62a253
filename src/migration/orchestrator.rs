//! Dependency resolution and run orchestration.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::MigrationConfig;
use super::context::{Backends, ImportContext};
use super::dependency::{Dependency, DependencyKind};
use super::error::{MigrationError, Result};
use super::importer::Importer;
use super::registry::ImporterRegistry;
use super::reporter::Reporter;
use super::result::MigrationResult;

/// Orders importers by their declared dependencies.
pub struct DependencyResolver<'a> {
    registry: &'a ImporterRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a ImporterRegistry) -> Self {
        Self { registry }
    }

    /// Every hard dependency must name a registered importer, and hard
    /// dependencies must not form a cycle.
    pub fn validate(&self) -> Result<()> {
        for importer in self.registry.iter() {
            for dep in importer.dependencies() {
                if self.registry.get(dep.entity).is_none() {
                    if dep.kind == DependencyKind::RequiredPre {
                        return Err(MigrationError::UnknownDependency {
                            entity: importer.entity_name().to_string(),
                            dependency: dep.entity.to_string(),
                        });
                    }
                    debug!(
                        "{} has a soft dependency on unregistered '{}'",
                        importer.entity_name(),
                        dep.entity
                    );
                }
            }
        }

        let names = self.registry.names();
        if let Some(cycle) = self.required_cycle(&names) {
            return Err(MigrationError::DependencyCycle {
                entities: cycle.into_iter().map(str::to_string).collect(),
            });
        }
        Ok(())
    }

    fn deps_of(&self, name: &str) -> Vec<Dependency> {
        self.registry
            .get(name)
            .map(|i| i.dependencies())
            .unwrap_or_default()
    }

    /// A cycle among RequiredPre edges, as a closed path, if one exists.
    fn required_cycle(&self, names: &[&'static str]) -> Option<Vec<&'static str>> {
        let required: HashMap<&str, Vec<&'static str>> = names
            .iter()
            .map(|name| {
                let deps = self
                    .deps_of(name)
                    .into_iter()
                    .filter(|d| d.kind == DependencyKind::RequiredPre && names.contains(&d.entity))
                    .map(|d| d.entity)
                    .collect();
                (*name, deps)
            })
            .collect();

        // Peel off nodes whose hard dependencies are all resolved; whatever
        // is left sits on or behind a cycle.
        let mut resolved: HashSet<&str> = HashSet::new();
        loop {
            let before = resolved.len();
            for name in names {
                if !resolved.contains(name) && required[name].iter().all(|d| resolved.contains(d)) {
                    resolved.insert(*name);
                }
            }
            if resolved.len() == before {
                break;
            }
        }

        let start = names.iter().find(|n| !resolved.contains(*n))?;
        let mut path = vec![*start];
        let mut current = *start;
        loop {
            let next = required[&current]
                .iter()
                .copied()
                .find(|d| !resolved.contains(d))?;
            if let Some(pos) = path.iter().position(|p| *p == next) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            path.push(next);
            current = next;
        }
    }

    /// Execution order for `selection` (all importers when empty).
    ///
    /// Kahn's algorithm over RequiredPre and OptionalPre edges between
    /// selected importers, breaking ties by registration order. A cycle that
    /// involves soft edges is broken by dropping them.
    pub fn resolve(&self, selection: &[String]) -> Result<Vec<&'static str>> {
        self.validate()?;

        let selected: Vec<&'static str> = if selection.is_empty() {
            self.registry.names()
        } else {
            let mut picked = BTreeSet::new();
            for name in selection {
                let idx = self
                    .registry
                    .index_of(name)
                    .ok_or_else(|| MigrationError::UnknownEntity(name.clone()))?;
                picked.insert(idx);
            }
            let names = self.registry.names();
            picked.into_iter().map(|idx| names[idx]).collect()
        };

        // Remaining (unplaced) upstreams per selected importer.
        let mut pending: HashMap<&'static str, Vec<Dependency>> = selected
            .iter()
            .map(|name| {
                let deps = self
                    .deps_of(name)
                    .into_iter()
                    .filter(|d| d.kind.orders_main_pass() && selected.contains(&d.entity))
                    .collect();
                (*name, deps)
            })
            .collect();

        let mut order: Vec<&'static str> = Vec::with_capacity(selected.len());
        while order.len() < selected.len() {
            let ready = selected
                .iter()
                .find(|name| !order.contains(*name) && pending[*name].is_empty());

            let next = match ready {
                Some(name) => *name,
                None => {
                    let name = *selected
                        .iter()
                        .find(|name| {
                            !order.contains(*name)
                                && pending[*name]
                                    .iter()
                                    .all(|d| d.kind != DependencyKind::RequiredPre)
                        })
                        .ok_or_else(|| MigrationError::DependencyCycle {
                            entities: selected
                                .iter()
                                .filter(|n| !order.contains(*n))
                                .map(|n| n.to_string())
                                .collect(),
                        })?;
                    warn!(
                        "Breaking soft dependency cycle: running {} before {:?}",
                        name,
                        pending[name].iter().map(|d| d.entity).collect::<Vec<_>>()
                    );
                    name
                }
            };

            order.push(next);
            for deps in pending.values_mut() {
                deps.retain(|d| d.entity != next);
            }
            if let Some(deps) = pending.get_mut(next) {
                deps.clear();
            }
        }

        Ok(order)
    }
}

/// What happened to one entity in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// The window reached the end of the source; marked completed.
    Completed { processed: u64 },
    /// A limited window stopped before the end of the source.
    Partial { processed: u64, total: u64 },
    /// Marked completed by an earlier run; not re-run.
    AlreadyCompleted,
    /// A required upstream has not completed.
    Blocked { dependency: String },
    Failed { error: String },
}

impl EntityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EntityStatus::Completed { .. } => "completed",
            EntityStatus::Partial { .. } => "partial",
            EntityStatus::AlreadyCompleted => "skipped (already completed)",
            EntityStatus::Blocked { .. } => "blocked",
            EntityStatus::Failed { .. } => "failed",
        }
    }

    /// Whether the main pass ran in this run.
    pub fn ran(&self) -> bool {
        matches!(
            self,
            EntityStatus::Completed { .. } | EntityStatus::Partial { .. }
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EntityStatus::Blocked { .. } | EntityStatus::Failed { .. })
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityStatus::Completed { processed } => write!(f, "completed ({} rows)", processed),
            EntityStatus::Partial { processed, total } => {
                write!(f, "partial ({} rows of {})", processed, total)
            }
            EntityStatus::AlreadyCompleted => f.write_str(self.label()),
            EntityStatus::Blocked { dependency } => write!(f, "blocked by {}", dependency),
            EntityStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Outcome of one secondary pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryPass {
    pub entity: String,
    pub updated: u64,
    pub error: Option<String>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub plan: Vec<&'static str>,
    pub statuses: Vec<(String, EntityStatus)>,
    pub secondary: Vec<SecondaryPass>,
    pub result: MigrationResult,
    pub dry_run: bool,
}

impl RunReport {
    pub fn status(&self, entity: &str) -> Option<&EntityStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, s)| s)
    }

    /// False when any entity was blocked or failed outright. Row-level
    /// failures are reported in `result` and do not count.
    pub fn is_success(&self) -> bool {
        !self.statuses.iter().any(|(_, s)| s.is_error())
            && self.secondary.iter().all(|p| p.error.is_none())
    }
}

/// Persisted progress of one importer, for `status` displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    pub entity: &'static str,
    pub completed: bool,
    pub source_rows: u64,
    /// Live mappings per namespace.
    pub mappings: Vec<(&'static str, u64)>,
}

/// Runs importers in dependency order.
pub struct Orchestrator {
    registry: ImporterRegistry,
}

impl Orchestrator {
    pub fn new(registry: ImporterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ImporterRegistry {
        &self.registry
    }

    pub fn resolve(&self, selection: &[String]) -> Result<Vec<&'static str>> {
        DependencyResolver::new(&self.registry).resolve(selection)
    }

    fn importer(&self, name: &str) -> Result<&Arc<dyn Importer>> {
        self.registry
            .get(name)
            .ok_or_else(|| MigrationError::UnknownEntity(name.to_string()))
    }

    /// Run the selected importers (all when empty).
    ///
    /// Configuration and graph errors abort before anything runs. After
    /// that, an entity that is blocked or fails does not stop its siblings.
    pub async fn run(
        &self,
        backends: &Backends,
        config: &MigrationConfig,
        selection: &[String],
        reporter: &dyn Reporter,
    ) -> Result<RunReport> {
        config.validate()?;
        let plan = self.resolve(selection)?;
        info!("Migration plan: {}", plan.join(" -> "));

        let ctx = ImportContext::open(backends, config);
        let mut result = MigrationResult::from_config(config);
        let mut statuses: Vec<(String, EntityStatus)> = Vec::with_capacity(plan.len());

        for name in &plan {
            let importer = self.importer(name)?;
            let status = match self
                .run_entity(&ctx, importer.as_ref(), config, &mut result, reporter)
                .await
            {
                Ok(status) => status,
                Err(MigrationError::UnmetDependency {
                    entity,
                    dependency,
                    reason,
                }) => {
                    let e = MigrationError::UnmetDependency {
                        entity,
                        dependency: dependency.clone(),
                        reason,
                    };
                    error!("{}", e);
                    reporter.error(&e.to_string());
                    EntityStatus::Blocked { dependency }
                }
                Err(e) => {
                    error!("Importer {} failed: {}", name, e);
                    reporter.error(&format!("{} failed: {}", name, e));
                    EntityStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            statuses.push((name.to_string(), status));
        }

        let secondary = self
            .run_secondary_passes(&ctx, &plan, &statuses, config, reporter)
            .await;

        ctx.close().await?;

        Ok(RunReport {
            plan,
            statuses,
            secondary,
            result,
            dry_run: config.dry_run,
        })
    }

    async fn run_entity(
        &self,
        ctx: &ImportContext,
        importer: &dyn Importer,
        config: &MigrationConfig,
        result: &mut MigrationResult,
        reporter: &dyn Reporter,
    ) -> Result<EntityStatus> {
        let name = importer.entity_name();

        for dep in importer.dependencies() {
            if dep.kind != DependencyKind::RequiredPre {
                continue;
            }
            let upstream = self.importer(dep.entity)?;
            if !upstream.is_completed(ctx).await? {
                return Err(MigrationError::UnmetDependency {
                    entity: name.to_string(),
                    dependency: dep.entity.to_string(),
                    reason: dep.reason.to_string(),
                });
            }
        }

        if !config.force && importer.is_completed(ctx).await? {
            reporter.info(&format!("{} already completed; skipping", name));
            result.touch(name);
            return Ok(EntityStatus::AlreadyCompleted);
        }

        reporter.info(&format!("Importing {}", name));
        let total = importer.total_count(ctx, config).await?;
        let cursor = ctx.ids.cursor(name).await?;
        let processed = importer.import(ctx, config, result, reporter).await?;

        // A run scoped to one user never covers the whole table, and a window
        // past the cursor leaves earlier rows unvisited.
        let contiguous = config.user_id_filter.is_none() && config.continues_from(cursor);
        if contiguous {
            ctx.ids
                .advance_cursor(name, config.window_end(processed))
                .await?;
        }

        if contiguous && config.reaches_end(processed, total) {
            importer.mark_completed(ctx).await?;
            info!("{} completed ({} rows)", name, processed);
            Ok(EntityStatus::Completed { processed })
        } else {
            info!(
                "{} processed {} rows from offset {} of {} (resume cursor {}); not marked completed",
                name, processed, config.offset, total, cursor
            );
            Ok(EntityStatus::Partial { processed, total })
        }
    }

    /// Deferred passes, in plan order, for importers with OptionalPost
    /// edges whose own main pass or one of whose post targets ran.
    async fn run_secondary_passes(
        &self,
        ctx: &ImportContext,
        plan: &[&'static str],
        statuses: &[(String, EntityStatus)],
        config: &MigrationConfig,
        reporter: &dyn Reporter,
    ) -> Vec<SecondaryPass> {
        let ran: HashSet<&str> = statuses
            .iter()
            .filter(|(_, s)| s.ran())
            .map(|(n, _)| n.as_str())
            .collect();
        let errored: HashSet<&str> = statuses
            .iter()
            .filter(|(_, s)| s.is_error())
            .map(|(n, _)| n.as_str())
            .collect();

        let mut passes = Vec::new();
        for name in plan {
            let Some(importer) = self.registry.get(name) else {
                continue;
            };
            let post: Vec<Dependency> = importer
                .dependencies()
                .into_iter()
                .filter(|d| d.kind == DependencyKind::OptionalPost)
                .collect();
            if post.is_empty() || errored.contains(name) {
                continue;
            }
            if !ran.contains(name) && !post.iter().any(|d| ran.contains(d.entity)) {
                continue;
            }

            reporter.info(&format!("Secondary pass for {}", name));
            let pass = match importer.import_secondary(ctx, config, reporter).await {
                Ok(updated) => {
                    info!("{} secondary pass updated {} entities", name, updated);
                    SecondaryPass {
                        entity: name.to_string(),
                        updated,
                        error: None,
                    }
                }
                Err(e) => {
                    error!("{} secondary pass failed: {}", name, e);
                    reporter.error(&format!("{} secondary pass failed: {}", name, e));
                    SecondaryPass {
                        entity: name.to_string(),
                        updated: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            passes.push(pass);
        }
        passes
    }

    /// Clear an entity's completion marker, and with `mappings` every mapping
    /// it wrote. Returns the number of mapping entries removed.
    pub async fn reset(&self, backends: &Backends, entity: &str, mappings: bool) -> Result<u64> {
        let importer = self.importer(entity)?;
        let ctx = ImportContext::open(backends, &MigrationConfig::default());
        let removed = if mappings {
            importer.cleanup(&ctx).await?
        } else {
            ctx.ids.clear_completed(importer.entity_name()).await?;
            0
        };
        ctx.close().await?;
        Ok(removed)
    }

    /// Persisted progress of every registered importer.
    pub async fn status(&self, backends: &Backends) -> Result<Vec<EntityState>> {
        let config = MigrationConfig::default();
        let ctx = ImportContext::open(backends, &config);
        let mut states = Vec::with_capacity(self.registry.len());
        for importer in self.registry.iter() {
            let mut mappings = Vec::new();
            for namespace in importer.namespaces() {
                mappings.push((namespace, ctx.ids.count(namespace).await?));
            }
            states.push(EntityState {
                entity: importer.entity_name(),
                completed: importer.is_completed(&ctx).await?,
                source_rows: importer.total_count(&ctx, &config).await?,
                mappings,
            });
        }
        ctx.close().await?;
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MemoryMappingStore;
    use crate::migration::{RecordOutcome, TracingReporter};
    use crate::source::{MemorySource, SourceQuery, SourceRecord};
    use crate::target::MemoryTargetRepository;
    use async_trait::async_trait;
    use serde_json::json;

    struct Stub {
        name: &'static str,
        deps: Vec<Dependency>,
    }

    #[async_trait]
    impl Importer for Stub {
        fn entity_name(&self) -> &'static str {
            self.name
        }

        fn dependencies(&self) -> Vec<Dependency> {
            self.deps.clone()
        }

        fn source_query(&self, _config: &MigrationConfig) -> SourceQuery {
            SourceQuery::table(self.name, "id")
        }

        async fn import_record(
            &self,
            _ctx: &ImportContext,
            _config: &MigrationConfig,
            record: &SourceRecord,
        ) -> Result<RecordOutcome> {
            let id = record.id("id")?;
            Ok(RecordOutcome::migrated(id, format!("{} {}", self.name, id)))
        }
    }

    fn stub(name: &'static str, deps: Vec<Dependency>) -> Arc<dyn Importer> {
        Arc::new(Stub { name, deps })
    }

    fn registry(importers: Vec<Arc<dyn Importer>>) -> ImporterRegistry {
        let mut registry = ImporterRegistry::new();
        for importer in importers {
            registry.register(importer).unwrap();
        }
        registry
    }

    #[test]
    fn test_resolve_orders_by_dependencies_then_registration() {
        let registry = registry(vec![
            stub(
                "topics",
                vec![
                    Dependency::required("users", "author"),
                    Dependency::required("forums", "container"),
                ],
            ),
            stub("forums", vec![Dependency::optional("groups", "owner group")]),
            stub("groups", vec![Dependency::required("users", "owner")]),
            stub("users", vec![Dependency::post("groups", "primary group")]),
        ]);

        let order = DependencyResolver::new(&registry).resolve(&[]).unwrap();
        assert_eq!(order, vec!["users", "groups", "forums", "topics"]);

        // Selection keeps only the named importers, still ordered.
        let order = DependencyResolver::new(&registry)
            .resolve(&["topics".to_string(), "users".to_string()])
            .unwrap();
        assert_eq!(order, vec!["users", "topics"]);
    }

    #[test]
    fn test_required_cycle_is_fatal() {
        let registry = registry(vec![
            stub("a", vec![Dependency::required("b", "x")]),
            stub("b", vec![Dependency::required("c", "x")]),
            stub("c", vec![Dependency::required("a", "x")]),
            stub("d", vec![]),
        ]);

        match DependencyResolver::new(&registry).resolve(&[]) {
            Err(MigrationError::DependencyCycle { entities }) => {
                assert_eq!(entities, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_soft_cycle_is_broken() {
        let registry = registry(vec![
            stub("a", vec![Dependency::optional("b", "x")]),
            stub("b", vec![Dependency::optional("a", "x")]),
        ]);
        let order = DependencyResolver::new(&registry).resolve(&[]).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_names() {
        let registry = registry(vec![stub("a", vec![Dependency::required("zzz", "x")])]);
        assert!(matches!(
            DependencyResolver::new(&registry).resolve(&[]),
            Err(MigrationError::UnknownDependency { .. })
        ));

        let registry = self::registry(vec![stub("a", vec![Dependency::optional("zzz", "x")])]);
        assert!(DependencyResolver::new(&registry).resolve(&[]).is_ok());
        assert!(matches!(
            DependencyResolver::new(&registry).resolve(&["nope".to_string()]),
            Err(MigrationError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ImporterRegistry::new();
        registry.register(stub("a", vec![])).unwrap();
        assert!(matches!(
            registry.register(stub("a", vec![])),
            Err(MigrationError::DuplicateImporter(_))
        ));
    }

    async fn backends() -> Backends {
        let source = MemorySource::new();
        for table in ["users", "topics"] {
            for id in 1..=3 {
                source
                    .insert(table, SourceRecord::new().with("id", json!(id)))
                    .await;
            }
        }
        Backends::new(
            Arc::new(source),
            Arc::new(MemoryTargetRepository::new()),
            Arc::new(MemoryMappingStore::new()),
        )
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(registry(vec![
            stub("users", vec![]),
            stub("topics", vec![Dependency::required("users", "author")]),
        ]))
    }

    #[tokio::test]
    async fn test_unmet_dependency_blocks_only_the_dependent() {
        let backends = backends().await;
        let orchestrator = orchestrator();
        let reporter = TracingReporter::new();

        let report = orchestrator
            .run(
                &backends,
                &MigrationConfig::default(),
                &["topics".to_string()],
                &reporter,
            )
            .await
            .unwrap();
        assert_eq!(
            report.status("topics"),
            Some(&EntityStatus::Blocked {
                dependency: "users".to_string()
            })
        );
        assert!(!report.is_success());
        assert_eq!(report.result.counters("topics").attempted(), 0);

        let report = orchestrator
            .run(&backends, &MigrationConfig::default(), &[], &reporter)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(
            report.status("topics"),
            Some(&EntityStatus::Completed { processed: 3 })
        );

        let report = orchestrator
            .run(&backends, &MigrationConfig::default(), &[], &reporter)
            .await
            .unwrap();
        assert_eq!(report.status("users"), Some(&EntityStatus::AlreadyCompleted));
    }

    #[tokio::test]
    async fn test_partial_window_is_not_completed() {
        let backends = backends().await;
        let orchestrator = orchestrator();
        let reporter = TracingReporter::new();
        let config = MigrationConfig {
            limit: Some(2),
            ..Default::default()
        };

        let report = orchestrator
            .run(&backends, &config, &["users".to_string()], &reporter)
            .await
            .unwrap();
        assert_eq!(
            report.status("users"),
            Some(&EntityStatus::Partial {
                processed: 2,
                total: 3
            })
        );

        let config = MigrationConfig {
            offset: 2,
            limit: Some(2),
            ..Default::default()
        };
        let report = orchestrator
            .run(&backends, &config, &["users".to_string()], &reporter)
            .await
            .unwrap();
        assert_eq!(
            report.status("users"),
            Some(&EntityStatus::Completed { processed: 1 })
        );

        orchestrator.reset(&backends, "users", false).await.unwrap();
        let states = orchestrator.status(&backends).await.unwrap();
        assert!(!states[0].completed);
        assert_eq!(states[0].source_rows, 3);
    }

    #[tokio::test]
    async fn test_window_past_unvisited_rows_is_not_completed() {
        let backends = backends().await;
        let orchestrator = orchestrator();
        let reporter = TracingReporter::new();
        let selection = ["users".to_string()];

        // Rows [0, 2) were never visited, so reaching the end is not enough.
        let tail = MigrationConfig {
            offset: 2,
            ..Default::default()
        };
        let report = orchestrator
            .run(&backends, &tail, &selection, &reporter)
            .await
            .unwrap();
        assert_eq!(
            report.status("users"),
            Some(&EntityStatus::Partial {
                processed: 1,
                total: 3
            })
        );
        let ids = backends.identifier_map();
        assert!(!ids.is_completed("users").await.unwrap());
        assert_eq!(ids.cursor("users").await.unwrap(), 0);

        let report = orchestrator
            .run(&backends, &MigrationConfig::default(), &selection, &reporter)
            .await
            .unwrap();
        assert_eq!(
            report.status("users"),
            Some(&EntityStatus::Completed { processed: 3 })
        );
        assert_eq!(ids.cursor("users").await.unwrap(), 3);
    }
}
