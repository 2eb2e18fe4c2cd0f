use std::path::{Path, PathBuf};

use log::info;
use uuid::Uuid;

use crate::config::defs::{
    ACCEPTED_HITS_BAM, ALIGNER_NAME, ALIGNER_VERSION, BamOutput, MERGED_HITS_BAM, PE_FWD_READS_FASTQ,
    PE_REV_READS_FASTQ, PipelineError, READS_DIR_PREFIX, RESULT_DIR_PREFIX, RunConfig, SE_READS_FASTQ,
    UNMAPPED_BAM,
};
use crate::config::params::TopHatParams;
use crate::pipelines::input::{LibraryDescriptor, LibraryLayout};
use crate::services::AlignmentUpload;
use crate::utils::command::{CommandLine, run_command, samtools, tophat};
use crate::utils::file::{make_unique_dir, relocate_file};
use crate::utils::summary::{AlignmentStats, read_align_summary};

/// Outcome of aligning one library.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    pub alignment_ref: String,
    pub library_ref: String,
    pub library_name: String,
    pub condition: String,
    pub result_dir: PathBuf,
    pub stats: Option<AlignmentStats>,
}

/// Downloads the library's reads into a fresh `reads_file_<uuid>` directory
/// under the canonical FASTQ names.
///
/// # Returns
/// One path for single-end, forward then reverse for paired-end.
pub async fn fetch_reads(
    config: &RunConfig,
    library: &LibraryDescriptor,
    result_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    info!("Downloading reads for {} ({})", library.name, library.reference);
    let files = config.services.reads.download_reads(&library.reference).await?;
    let reads_dir = make_unique_dir(result_dir, READS_DIR_PREFIX)?;

    match library.layout {
        LibraryLayout::SingleEnd => {
            let fwd = reads_dir.join(SE_READS_FASTQ);
            relocate_file(&files.fwd, &fwd).await?;
            Ok(vec![fwd])
        }
        LibraryLayout::PairedEnd => {
            let rev_src = files.rev.ok_or_else(|| {
                PipelineError::DataIntegrity(format!(
                    "paired-end library {} downloaded without a reverse file",
                    library.reference
                ))
            })?;
            let fwd = reads_dir.join(PE_FWD_READS_FASTQ);
            let rev = reads_dir.join(PE_REV_READS_FASTQ);
            relocate_file(&files.fwd, &fwd).await?;
            relocate_file(&rev_src, &rev).await?;
            Ok(vec![fwd, rev])
        }
    }
}

fn require_file(path: PathBuf) -> Result<PathBuf, PipelineError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::DataIntegrity(format!(
            "expected tophat output {} is missing",
            path.display()
        )))
    }
}

/// Picks the BAM to upload from a finished tophat run, merging mapped and
/// unmapped hits when configured to.
pub async fn collect_bam(config: &RunConfig, tophat_out: &Path) -> Result<PathBuf, PipelineError> {
    let accepted = require_file(tophat_out.join(ACCEPTED_HITS_BAM))?;

    match config.bam_output {
        BamOutput::MappedOnly => Ok(accepted),
        BamOutput::Merged => {
            let unmapped = require_file(tophat_out.join(UNMAPPED_BAM))?;
            let merged = tophat_out.join(MERGED_HITS_BAM);
            let cmd = CommandLine::new(
                &config.samtools_bin,
                samtools::merge_args(&merged, &[accepted.as_path(), unmapped.as_path()]),
            );
            run_command(&cmd, config.command_timeout).await?;
            require_file(merged)
        }
    }
}

/// Aligns one reads library and uploads the alignment.
///
/// # Arguments
///
/// * `config` - run configuration and services
/// * `library` - classified single library
/// * `index_base` - Bowtie2 index prefix
/// * `result_dir` - per-run scratch directory shared by all members
/// * `params` - run parameters, `reads_condition` already set for collection members
///
/// # Returns
/// AlignmentResult naming the stored alignment.
pub async fn process_library(
    config: &RunConfig,
    library: &LibraryDescriptor,
    index_base: &Path,
    result_dir: &Path,
    params: &TopHatParams,
) -> Result<AlignmentResult, PipelineError> {
    let reads = fetch_reads(config, library, result_dir).await?;

    let tophat_out = result_dir.join(format!("{}{}_{}", RESULT_DIR_PREFIX, library.name, Uuid::new_v4()));
    let cmd = CommandLine::new(
        &config.tophat_bin,
        tophat::arg_generator(params, index_base, &reads, &tophat_out),
    );
    info!("Running TopHat2 on {}", library.name);
    run_command(&cmd, config.command_timeout).await?;

    let bam = collect_bam(config, &tophat_out).await?;
    let stats = read_align_summary(&tophat_out);

    let upload = AlignmentUpload {
        file_path: bam,
        destination_ref: format!("{}/{}{}", params.workspace_name, library.name, params.alignment_suffix),
        read_library_ref: library.reference.clone(),
        assembly_or_genome_ref: params.assembly_or_genome_ref.clone(),
        aligned_using: ALIGNER_NAME.to_string(),
        aligner_version: ALIGNER_VERSION.to_string(),
        condition: params.condition().to_string(),
    };
    info!("Uploading alignment to {}", upload.destination_ref);
    let alignment_ref = config.services.alignment.upload_alignment(&upload).await?;
    info!("Stored alignment {} for {}", alignment_ref, library.reference);

    Ok(AlignmentResult {
        alignment_ref,
        library_ref: library.reference.clone(),
        library_name: library.name.clone(),
        condition: upload.condition,
        result_dir: tophat_out,
        stats,
    })
}
