//! JSON-RPC implementations of the collaborator traits.
//!
//! Workspace calls go straight to the workspace URL, SetAPI is a dynamic
//! service located through the service wizard, everything else is reached
//! through the SDK callback server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::config::defs::PipelineError;
use crate::services::rpc::JsonRpcClient;
use crate::services::{
    AlignmentService, AlignmentSetSave, AlignmentUpload, GenomeIndexService, ObjectInfo, QcReport,
    QcService, ReadsFiles, ReadsService, ReportInfo, ReportRequest, ReportService, Services,
    SetItem, SetService, WorkspaceService,
};

const SET_API_MODULE: &str = "SetAPI";

fn malformed(service: &str, what: &str) -> PipelineError {
    PipelineError::Service {
        service: service.to_string(),
        error: format!("malformed reply: {}", what),
    }
}

pub struct KBaseWorkspace {
    rpc: JsonRpcClient,
}

impl KBaseWorkspace {
    pub fn new(rpc: JsonRpcClient) -> Self {
        KBaseWorkspace { rpc }
    }
}

#[derive(Deserialize)]
struct ObjectInfos {
    infos: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ObjectData {
    data: Vec<ObjectDataItem>,
}

#[derive(Deserialize)]
struct ObjectDataItem {
    data: Value,
}

/// Object info tuple: name at index 1, type at index 2.
fn object_info_from_tuple(reference: &str, tuple: &[Value]) -> Option<ObjectInfo> {
    let name = tuple.get(1)?.as_str()?.to_string();
    let type_tag = tuple.get(2)?.as_str()?.to_string();
    Some(ObjectInfo {
        reference: reference.to_string(),
        name,
        type_tag,
    })
}

#[async_trait]
impl WorkspaceService for KBaseWorkspace {
    async fn get_object_info(&self, reference: &str) -> Result<ObjectInfo, PipelineError> {
        const METHOD: &str = "Workspace.get_object_info3";
        let reply: ObjectInfos = self
            .rpc
            .call(METHOD, &json!({"objects": [{"ref": reference}]}))
            .await?;
        reply
            .infos
            .first()
            .and_then(|tuple| object_info_from_tuple(reference, tuple))
            .ok_or_else(|| malformed(METHOD, "object info tuple"))
    }

    async fn get_object_data(&self, reference: &str) -> Result<Value, PipelineError> {
        const METHOD: &str = "Workspace.get_objects2";
        let reply: ObjectData = self
            .rpc
            .call(METHOD, &json!({"objects": [{"ref": reference}]}))
            .await?;
        reply
            .data
            .into_iter()
            .next()
            .map(|item| item.data)
            .ok_or_else(|| malformed(METHOD, "empty object list"))
    }
}

/// Services reached through the SDK callback server.
pub struct CallbackServices {
    rpc: JsonRpcClient,
}

impl CallbackServices {
    pub fn new(rpc: JsonRpcClient) -> Self {
        CallbackServices { rpc }
    }
}

#[derive(Deserialize)]
struct IndexReply {
    output_dir: PathBuf,
}

#[derive(Deserialize)]
struct DownloadReply {
    files: HashMap<String, DownloadedLibrary>,
}

#[derive(Deserialize)]
struct DownloadedLibrary {
    files: DownloadedFiles,
}

#[derive(Deserialize)]
struct DownloadedFiles {
    fwd: PathBuf,
    #[serde(default)]
    rev: Option<PathBuf>,
}

#[derive(Deserialize)]
struct UploadReply {
    obj_ref: String,
}

#[derive(Deserialize)]
struct BamQcReply {
    qc_result_zip_info: QcReport,
}

#[async_trait]
impl GenomeIndexService for CallbackServices {
    async fn get_bowtie2_index(
        &self,
        genome_ref: &str,
        output_dir: &Path,
        ws_for_cache: &str,
    ) -> Result<PathBuf, PipelineError> {
        let reply: IndexReply = self
            .rpc
            .call(
                "kb_Bowtie2.get_bowtie2_index",
                &json!({
                    "ref": genome_ref,
                    "output_dir": output_dir.to_string_lossy(),
                    "ws_for_cache": ws_for_cache,
                }),
            )
            .await?;
        Ok(reply.output_dir)
    }
}

#[async_trait]
impl ReadsService for CallbackServices {
    async fn download_reads(&self, library_ref: &str) -> Result<ReadsFiles, PipelineError> {
        const METHOD: &str = "ReadsUtils.download_reads";
        let mut reply: DownloadReply = self
            .rpc
            .call(
                METHOD,
                &json!({
                    "read_libraries": [library_ref],
                    "interleaved": "false",
                    "gzipped": null,
                }),
            )
            .await?;
        let library = reply
            .files
            .remove(library_ref)
            .ok_or_else(|| malformed(METHOD, "requested library missing from reply"))?;
        Ok(ReadsFiles {
            fwd: library.files.fwd,
            rev: library.files.rev,
        })
    }
}

#[async_trait]
impl AlignmentService for CallbackServices {
    async fn upload_alignment(&self, upload: &AlignmentUpload) -> Result<String, PipelineError> {
        let reply: UploadReply = self
            .rpc
            .call("ReadsAlignmentUtils.upload_alignment", upload)
            .await?;
        Ok(reply.obj_ref)
    }
}

#[async_trait]
impl QcService for CallbackServices {
    async fn run_bamqc(&self, alignment_ref: &str) -> Result<QcReport, PipelineError> {
        let reply: BamQcReply = self
            .rpc
            .call("kb_QualiMap.run_bamqc", &json!({"input_ref": alignment_ref}))
            .await?;
        Ok(reply.qc_result_zip_info)
    }
}

#[async_trait]
impl ReportService for CallbackServices {
    async fn create_extended_report(&self, request: &ReportRequest) -> Result<ReportInfo, PipelineError> {
        self.rpc.call("KBaseReport.create_extended_report", request).await
    }
}

/// SetAPI client; the endpoint is looked up in the service wizard on first use.
pub struct KBaseSetApi {
    wizard: JsonRpcClient,
    http: reqwest::Client,
    token: Option<String>,
    endpoint: OnceCell<JsonRpcClient>,
}

#[derive(Deserialize)]
struct ServiceStatus {
    url: String,
}

#[derive(Deserialize)]
struct ReadsSetReply {
    data: ReadsSetData,
}

#[derive(Deserialize)]
struct ReadsSetData {
    items: Vec<ReadsSetItem>,
}

#[derive(Deserialize)]
struct ReadsSetItem {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    ref_path: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct SaveSetReply {
    set_ref: String,
}

impl KBaseSetApi {
    pub fn new(wizard: JsonRpcClient, http: reqwest::Client, token: Option<String>) -> Self {
        KBaseSetApi {
            wizard,
            http,
            token,
            endpoint: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&JsonRpcClient, PipelineError> {
        self.endpoint
            .get_or_try_init(|| async {
                let status: ServiceStatus = self
                    .wizard
                    .call(
                        "ServiceWizard.get_service_status",
                        &json!({"module_name": SET_API_MODULE, "version": "release"}),
                    )
                    .await?;
                debug!("{} located at {}", SET_API_MODULE, status.url);
                Ok(JsonRpcClient::new(self.http.clone(), &status.url, self.token.clone()))
            })
            .await
    }
}

#[async_trait]
impl SetService for KBaseSetApi {
    async fn get_reads_set_items(&self, set_ref: &str) -> Result<Vec<SetItem>, PipelineError> {
        let reply: ReadsSetReply = self
            .client()
            .await?
            .call(
                "SetAPI.get_reads_set_v1",
                &json!({
                    "ref": set_ref,
                    "include_item_info": 0,
                    "include_set_item_ref_paths": 1,
                }),
            )
            .await?;
        Ok(reply
            .data
            .items
            .into_iter()
            .map(|item| SetItem {
                reference: item.ref_path.unwrap_or(item.reference),
                label: item.label,
            })
            .collect())
    }

    async fn save_alignment_set(&self, save: &AlignmentSetSave) -> Result<String, PipelineError> {
        let reply: SaveSetReply = self
            .client()
            .await?
            .call(
                "SetAPI.save_reads_alignment_set_v1",
                &json!({
                    "workspace": save.workspace,
                    "output_object_name": save.output_object_name,
                    "data": {
                        "description": save.description,
                        "items": save.items,
                    },
                }),
            )
            .await?;
        Ok(reply.set_ref)
    }
}

impl Services {
    /// Wires every collaborator to its KBase endpoint.
    pub fn kbase(
        workspace_url: &str,
        callback_url: &str,
        srv_wiz_url: &str,
        token: Option<String>,
    ) -> Result<Services, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Service {
                service: "http".to_string(),
                error: format!("Failed to create HTTP client: {}", e),
            })?;

        let workspace = Arc::new(KBaseWorkspace::new(JsonRpcClient::new(
            http.clone(),
            workspace_url,
            token.clone(),
        )));
        let callback = Arc::new(CallbackServices::new(JsonRpcClient::new(
            http.clone(),
            callback_url,
            token.clone(),
        )));
        let sets = Arc::new(KBaseSetApi::new(
            JsonRpcClient::new(http.clone(), srv_wiz_url, token.clone()),
            http,
            token,
        ));

        Ok(Services {
            workspace,
            genome_index: callback.clone(),
            reads: callback.clone(),
            alignment: callback.clone(),
            sets,
            qc: callback.clone(),
            report: callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_info_tuple() {
        let tuple = vec![
            json!(7),
            json!("my_reads"),
            json!("KBaseFile.SingleEndLibrary-2.2"),
            json!("2024-01-01T00:00:00+0000"),
            json!(1),
        ];
        let info = object_info_from_tuple("1/7/1", &tuple).unwrap();
        assert_eq!(info.name, "my_reads");
        assert_eq!(info.type_name(), "KBaseFile.SingleEndLibrary");
        assert_eq!(info.reference, "1/7/1");
    }

    #[test]
    fn test_short_tuple_is_rejected() {
        let tuple = vec![json!(7), json!("only_name")];
        assert!(object_info_from_tuple("1/7/1", &tuple).is_none());
    }

    #[test]
    fn test_download_reply_shape() {
        let reply: DownloadReply = serde_json::from_value(json!({
            "files": {"1/2/3": {"ref": "1/2/3", "files": {"fwd": "/s/a.fq", "rev": null, "type": "single"}}}
        }))
        .unwrap();
        let library = &reply.files["1/2/3"];
        assert_eq!(library.files.fwd, PathBuf::from("/s/a.fq"));
        assert!(library.files.rev.is_none());
    }
}
