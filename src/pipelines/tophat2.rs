use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::defs::{INDEX_DIR_PREFIX, PipelineError, RunConfig, SAMTOOLS_TAG, TOPHAT_TAG};
use crate::config::params::TopHatParams;
use crate::pipelines::fanout::run_collection;
use crate::pipelines::input::{InputObject, classify_input};
use crate::pipelines::report::{generate_set_report, generate_single_report, save_alignment_collection};
use crate::pipelines::single::process_library;
use crate::utils::command::check_version;
use crate::utils::file::genome_index_prefix;
use crate::utils::system::worker_count;

/// What a run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopHatOutput {
    pub result_directory: PathBuf,
    pub reads_alignment_object_ref: String,
    pub report_name: String,
    pub report_ref: String,
}

async fn check_tools(config: &RunConfig) {
    for (tag, bin) in [(TOPHAT_TAG, &config.tophat_bin), (SAMTOOLS_TAG, &config.samtools_bin)] {
        match check_version(bin).await {
            Ok(version) => info!("{} version: {}", tag, version),
            Err(e) => warn!("{} not usable at {}: {}", tag, bin.display(), e),
        }
    }
}

async fn prepare_index(
    config: &RunConfig,
    params: &TopHatParams,
    result_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let output_dir = result_dir.join(format!("{}{}", INDEX_DIR_PREFIX, Uuid::new_v4()));
    info!("Fetching Bowtie2 index for {}", params.assembly_or_genome_ref);
    let index_dir = config
        .services
        .genome_index
        .get_bowtie2_index(&params.assembly_or_genome_ref, &output_dir, &params.workspace_name)
        .await?;
    let index_base = genome_index_prefix(&index_dir)?;
    info!("Using Bowtie2 index {}", index_base.display());
    Ok(index_base)
}

/// Runs TopHat2 over the object named by `input_ref`.
///
/// # Arguments
///
/// * `config` - run configuration and service clients
/// * `raw_params` - parameter record as received
///
/// # Returns
/// TopHatOutput naming the stored alignment (or alignment set) and report.
pub async fn run(config: Arc<RunConfig>, raw_params: Value) -> Result<TopHatOutput, PipelineError> {
    info!("\n-------------\n TopHat2\n-------------\n");
    let params = TopHatParams::from_value(raw_params)?;
    info!("Input reads: {}, genome: {}", params.input_ref, params.assembly_or_genome_ref);

    let result_dir = config.scratch.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&result_dir).await?;
    info!("Working in {}", result_dir.display());

    check_tools(&config).await;

    let input = classify_input(&config.services, &params.input_ref).await?;
    info!("{} runs as {:?}", params.input_ref, input.run_mode());

    let (alignment_ref, report) = match input {
        InputObject::Library(library) => {
            let index_base = prepare_index(&config, &params, &result_dir).await?;
            let result = process_library(&config, &library, &index_base, &result_dir, &params).await?;
            let report = generate_single_report(&config, &result, &result_dir, &params.workspace_name).await?;
            (result.alignment_ref, report)
        }
        InputObject::Collection(collection) => {
            let set_name = format!("{}{}", collection.info().name, params.alignment_set_suffix()?);
            let members = collection.expand(&config.services).await?;
            if members.is_empty() {
                return Err(PipelineError::DataIntegrity(format!(
                    "{} has no members",
                    collection.info().reference
                )));
            }
            let index_base = prepare_index(&config, &params, &result_dir).await?;
            let workers = worker_count(params.thread_count(), config.host_cores);
            let results = run_collection(
                Arc::clone(&config),
                members,
                workers,
                index_base,
                result_dir.clone(),
                &params,
            )
            .await?;
            let stored =
                save_alignment_collection(&config, results, &params.workspace_name, &set_name).await?;
            let report = generate_set_report(&config, &stored, &result_dir, &params.workspace_name).await?;
            (stored.set_ref, report)
        }
    };

    Ok(TopHatOutput {
        result_directory: result_dir,
        reads_alignment_object_ref: alignment_ref,
        report_name: report.name,
        report_ref: report.reference,
    })
}
