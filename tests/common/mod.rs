#![allow(dead_code)]

use std::io::Write;

use batchdag::config::{NodeHardware, OptionValue};
use batchdag::fs::MockFileSystem;
use batchdag::provenance::ProvenanceStore;
use batchdag_test_utils::builders::{PipelineBuilder, StageBuilder};
use batchdag_test_utils::{memory_store, node};
use tempfile::NamedTempFile;

pub const ROOT: &str = "/scratch/out";
pub const PROJECT: &str = "demo";
pub const SITE: &str = "testsite";

/// Write a pipeline file to a temp file.
pub fn pipeline_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

/// Store for project `demo` under `/scratch/out`, in memory.
pub fn mock_store() -> (MockFileSystem, ProvenanceStore) {
    memory_store(ROOT, PROJECT)
}

pub fn hardware(cores: u32) -> NodeHardware {
    node(cores)
}

/// fetch -> process -> report, with `process` carrying `lmax`.
pub fn fetch_process_report(lmax: i64) -> PipelineBuilder {
    PipelineBuilder::new(ROOT)
        .with_stage("fetch", StageBuilder::new("fetch.py").threads(32))
        .with_stage(
            "process",
            StageBuilder::new("process.py")
                .after("fetch")
                .option("lmax", OptionValue::Int(lmax))
                .threads(32),
        )
        .with_stage(
            "report",
            StageBuilder::new("report.py").after("process").threads(32),
        )
}
