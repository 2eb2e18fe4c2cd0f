use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

use crate::services::Services;

// External software
pub const TOPHAT_TAG: &str = "tophat";
pub const SAMTOOLS_TAG: &str = "samtools";

pub const ALIGNER_NAME: &str = "tophat2";
pub const ALIGNER_VERSION: &str = "2.1.1";

// Static Filenames
pub const ACCEPTED_HITS_BAM: &str = "accepted_hits.bam";
pub const UNMAPPED_BAM: &str = "unmapped.bam";
pub const MERGED_HITS_BAM: &str = "merged_hits.bam";
pub const ALIGN_SUMMARY: &str = "align_summary.txt";
pub const SE_READS_FASTQ: &str = "SE_reads.fastq";
pub const PE_FWD_READS_FASTQ: &str = "PE_reads_1.fastq";
pub const PE_REV_READS_FASTQ: &str = "PE_reads_2.fastq";
pub const SINGLE_RESULT_ZIP: &str = "TopHat2_result.zip";
pub const SUMMARY_HTML: &str = "summary.html";

// Scratch subdirectory prefixes
pub const INDEX_DIR_PREFIX: &str = "bowtie2_index_";
pub const READS_DIR_PREFIX: &str = "reads_file_";
pub const RESULT_DIR_PREFIX: &str = "tophat2_result_";
pub const REPORT_DIR_PREFIX: &str = "report_";

pub const REPORT_OBJECT_PREFIX: &str = "kb_tophat2_report_";
pub const REPORT_HTML_WINDOW_HEIGHT: u32 = 333;
pub const ALIGNMENT_DESCRIPTION: &str = "Alignment generated by TopHat2";
pub const ALIGNMENT_SET_DESCRIPTION: &str = "AlignmentSet generated by TopHat2";
pub const ALIGNMENT_SET_DATA_DESCRIPTION: &str = "Alignments using TopHat2";
pub const RESULT_FILE_DESCRIPTION: &str = "File generated by TopHat2 App";

pub const DEFAULT_CONDITION: &str = "unspecified";

// Object type names (version suffix stripped)
pub const SINGLE_LIBRARY_TYPES: &[&str] = &[
    "KBaseAssembly.PairedEndLibrary",
    "KBaseAssembly.SingleEndLibrary",
    "KBaseFile.PairedEndLibrary",
    "KBaseFile.SingleEndLibrary",
];
pub const READS_SET_TYPE: &str = "KBaseSets.ReadsSet";
pub const SAMPLE_SET_TYPE: &str = "KBaseRNASeq.RNASeqSampleSet";

/// Which BAM the single-item pipeline hands to the alignment uploader.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum BamOutput {
    /// `samtools merge` of accepted_hits.bam and unmapped.bam
    #[default]
    Merged,
    /// accepted_hits.bam only
    MappedOnly,
}

pub struct RunConfig {
    pub scratch: PathBuf,
    pub tophat_bin: PathBuf,
    pub samtools_bin: PathBuf,
    pub bam_output: BamOutput,
    pub command_timeout: Option<Duration>,
    pub host_cores: usize,
    pub services: Services,
}

/// One failed member of a fanned-out collection run.
#[derive(Debug)]
pub struct MemberFailure {
    pub index: usize,
    pub library_ref: String,
    pub error: PipelineError,
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member {} ({}): {}", self.index + 1, self.library_ref, self.error)
    }
}

fn format_failures(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Object type of input_ref is not valid: {reference} is a {type_tag}")]
    UnsupportedInputType { reference: String, type_tag: String },

    #[error("Error running command:\n{command}\nExit Code: {}\nOutput:\n{output}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandExecutionFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Command timed out after {seconds}s:\n{command}")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Data integrity fault: {0}")]
    DataIntegrity(String),

    #[error("Caught exception in {} of {total} worker(s)\n{}", failures.len(), format_failures(failures))]
    MemberPipelineFailed {
        total: usize,
        failures: Vec<MemberFailure>,
    },

    #[error("worker task aborted: {0}")]
    WorkerAborted(String),

    #[error("{service} call failed: {error}")]
    Service { service: String, error: String },

    #[error("I/O error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_failure_message_lists_every_member() {
        let err = PipelineError::MemberPipelineFailed {
            total: 3,
            failures: vec![MemberFailure {
                index: 1,
                library_ref: "1/2/3".to_string(),
                error: PipelineError::DataIntegrity("accepted_hits.bam missing".to_string()),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 of 3"));
        assert!(msg.contains("member 2 (1/2/3)"));
        assert!(msg.contains("accepted_hits.bam missing"));
    }

    #[test]
    fn test_command_failure_carries_exit_code_and_output() {
        let err = PipelineError::CommandExecutionFailed {
            command: "tophat -o out idx r.fq".to_string(),
            exit_code: Some(2),
            output: "segfault".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Exit Code: 2"));
        assert!(msg.contains("segfault"));
    }

    #[test]
    fn test_command_failure_without_exit_code() {
        let err = PipelineError::CommandExecutionFailed {
            command: "/opt/missing/tophat --version".to_string(),
            exit_code: None,
            output: "Failed to spawn /opt/missing/tophat".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Exit Code: none"));
        assert!(!msg.contains("signal"));
    }
}
