//! Remote collaborators of the pipeline.
//!
//! Every call the pipeline makes outside this process goes through one of the
//! traits below. The binary wires them to the JSON-RPC services in
//! [`kbase`]; tests wire them to in-memory doubles.

pub mod kbase;
pub mod rpc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::defs::PipelineError;

/// Metadata of one versioned object in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub reference: String,
    pub name: String,
    pub type_tag: String,
}

impl ObjectInfo {
    /// `Module.Type-1.0` -> `Module.Type`
    pub fn type_name(&self) -> &str {
        self.type_tag.split('-').next().unwrap_or(&self.type_tag)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadsFiles {
    pub fwd: PathBuf,
    pub rev: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentUpload {
    pub file_path: PathBuf,
    pub destination_ref: String,
    pub read_library_ref: String,
    pub assembly_or_genome_ref: String,
    pub aligned_using: String,
    pub aligner_version: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentSetSave {
    pub workspace: String,
    pub output_object_name: String,
    pub description: String,
    pub items: Vec<SetItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QcReport {
    pub shock_id: String,
    pub index_html_file_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shock_id: Option<String>,
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedObject {
    #[serde(rename = "ref")]
    pub reference: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRequest {
    pub message: String,
    pub workspace_name: String,
    pub file_links: Vec<FileLink>,
    pub html_links: Vec<FileLink>,
    pub objects_created: Vec<CreatedObject>,
    pub direct_html_link_index: usize,
    pub html_window_height: u32,
    pub report_object_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportInfo {
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn get_object_info(&self, reference: &str) -> Result<ObjectInfo, PipelineError>;
    async fn get_object_data(&self, reference: &str) -> Result<Value, PipelineError>;
}

#[async_trait]
pub trait GenomeIndexService: Send + Sync {
    /// Builds (or fetches a cached) Bowtie2 index into `output_dir` and
    /// returns the directory that actually holds the index files.
    async fn get_bowtie2_index(
        &self,
        genome_ref: &str,
        output_dir: &Path,
        ws_for_cache: &str,
    ) -> Result<PathBuf, PipelineError>;
}

#[async_trait]
pub trait ReadsService: Send + Sync {
    async fn download_reads(&self, library_ref: &str) -> Result<ReadsFiles, PipelineError>;
}

#[async_trait]
pub trait AlignmentService: Send + Sync {
    async fn upload_alignment(&self, upload: &AlignmentUpload) -> Result<String, PipelineError>;
}

#[async_trait]
pub trait SetService: Send + Sync {
    /// Items of a reads set, each resolved to a loadable reference path.
    async fn get_reads_set_items(&self, set_ref: &str) -> Result<Vec<SetItem>, PipelineError>;
    async fn save_alignment_set(&self, save: &AlignmentSetSave) -> Result<String, PipelineError>;
}

#[async_trait]
pub trait QcService: Send + Sync {
    async fn run_bamqc(&self, alignment_ref: &str) -> Result<QcReport, PipelineError>;
}

#[async_trait]
pub trait ReportService: Send + Sync {
    async fn create_extended_report(&self, request: &ReportRequest) -> Result<ReportInfo, PipelineError>;
}

#[derive(Clone)]
pub struct Services {
    pub workspace: Arc<dyn WorkspaceService>,
    pub genome_index: Arc<dyn GenomeIndexService>,
    pub reads: Arc<dyn ReadsService>,
    pub alignment: Arc<dyn AlignmentService>,
    pub sets: Arc<dyn SetService>,
    pub qc: Arc<dyn QcService>,
    pub report: Arc<dyn ReportService>,
}
