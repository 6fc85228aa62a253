//! Fixtures shared by unit tests.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::mapping::MemoryMappingStore;
use crate::migration::{
    Backends, ImportContext, Importer, MigrationConfig, MigrationResult, Reporter,
    TracingReporter,
};
use crate::source::{MemorySource, SourceRecord};
use crate::target::MemoryTargetRepository;

/// In-memory backends around `source`, with handles to the concrete stores.
pub struct Fixture {
    pub backends: Backends,
    pub target: Arc<MemoryTargetRepository>,
    pub mappings: Arc<MemoryMappingStore>,
}

pub fn fixture(source: MemorySource) -> Fixture {
    let target = Arc::new(MemoryTargetRepository::new());
    let mappings = Arc::new(MemoryMappingStore::new());
    let backends = Backends::new(Arc::new(source), target.clone(), mappings.clone());
    Fixture {
        backends,
        target,
        mappings,
    }
}

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> SourceRecord {
    match value {
        Value::Object(map) => SourceRecord::from_map(map),
        other => panic!("row fixture must be an object, got {}", other),
    }
}

/// Reporter that keeps every message for assertions.
#[derive(Default)]
pub struct RecordingReporter {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub advanced: Mutex<u64>,
}

impl RecordingReporter {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, _total: u64) {}

    fn advance(&self) {
        *self.advanced.lock().unwrap() += 1;
    }
}

/// Run one importer's main and secondary passes outside the orchestrator.
pub async fn run_importer(
    importer: &dyn Importer,
    backends: &Backends,
    config: &MigrationConfig,
) -> MigrationResult {
    let reporter = TracingReporter::new();
    let ctx = ImportContext::open(backends, config);
    let mut result = MigrationResult::from_config(config);
    importer
        .import(&ctx, config, &mut result, &reporter)
        .await
        .unwrap();
    importer
        .import_secondary(&ctx, config, &reporter)
        .await
        .unwrap();
    ctx.close().await.unwrap();
    result
}
