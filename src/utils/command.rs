/// Functions and structs for building and running external command lines

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info};
use tokio::process::Command;

use crate::config::defs::PipelineError;

/// A fully formed invocation: program plus its argument vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: &Path, args: Vec<String>) -> Self {
        CommandLine {
            program: program.to_path_buf(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

pub mod tophat {
    use std::path::{Path, PathBuf};

    use crate::config::params::TopHatParams;

    /// Numeric tuning knobs, in the order they are emitted.
    pub fn value_options(params: &TopHatParams) -> [(&'static str, Option<i64>); 6] {
        [
            ("--read-mismatches", params.read_mismatches),
            ("--read-gap-length", params.read_gap_length),
            ("--read-edit-dist", params.read_edit_dist),
            ("--min-intron-length", params.min_intron_length),
            ("--max-intron-length", params.max_intron_length),
            ("--min-anchor-length", params.min_anchor_length),
        ]
    }

    pub fn flag_options(params: &TopHatParams) -> [(&'static str, Option<bool>); 2] {
        [
            ("--report-secondary-alignments", params.report_secondary_alignments),
            ("--no-coverage-search", params.no_coverage_search),
        ]
    }

    /// Builds the tophat argument vector.
    ///
    /// # Arguments
    ///
    /// * `params` - run parameters carrying the tuning options
    /// * `index_base` - Bowtie2 index prefix (`<dir>/<prefix>`)
    /// * `reads` - one FASTQ (single-end) or forward then reverse (paired-end)
    /// * `out_dir` - tophat result directory
    ///
    /// # Returns
    /// Vec of arguments, index prefix and reads last.
    pub fn arg_generator(
        params: &TopHatParams,
        index_base: &Path,
        reads: &[PathBuf],
        out_dir: &Path,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-o".to_string());
        args_vec.push(out_dir.to_string_lossy().to_string());

        for (flag, value) in value_options(params) {
            if let Some(value) = value {
                args_vec.push(flag.to_string());
                args_vec.push(value.to_string());
            }
        }

        for (flag, enabled) in flag_options(params) {
            if enabled == Some(true) {
                args_vec.push(flag.to_string());
            }
        }

        if let Some(library_type) = params.library_type {
            args_vec.push("--library-type".to_string());
            args_vec.push(library_type.as_str().to_string());
        }

        if let Some(threads) = params.num_threads.filter(|n| *n > 0) {
            args_vec.push("--num-threads".to_string());
            args_vec.push(threads.to_string());
        }

        if let Some(preset) = params.preset_options {
            args_vec.push(format!("--{}", preset.as_str()));
        }

        args_vec.push(index_base.to_string_lossy().to_string());
        for read_file in reads {
            args_vec.push(read_file.to_string_lossy().to_string());
        }

        args_vec
    }
}

pub mod samtools {
    use std::path::Path;

    pub fn merge_args(out_bam: &Path, inputs: &[&Path]) -> Vec<String> {
        let mut args_vec: Vec<String> = vec!["merge".to_string(), "-f".to_string()];
        args_vec.push(out_bam.to_string_lossy().to_string());
        for input in inputs {
            args_vec.push(input.to_string_lossy().to_string());
        }
        args_vec
    }
}

/// Runs a command to completion and captures its combined output.
///
/// # Arguments
///
/// * `cmd` - program and arguments
/// * `timeout` - optional wall-clock limit; the child is killed when it expires
///
/// # Returns
/// stdout followed by stderr on a zero exit status, otherwise
/// `CommandExecutionFailed` carrying the exit code and the same output.
pub async fn run_command(cmd: &CommandLine, timeout: Option<Duration>) -> Result<String, PipelineError> {
    let command_str = cmd.to_string();
    info!("start executing command:\n{}", command_str);

    let child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::CommandExecutionFailed {
            command: command_str.clone(),
            exit_code: None,
            output: format!("Failed to spawn {}: {}", cmd.program.display(), e),
        })?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::CommandTimeout {
                command: command_str.clone(),
                seconds: limit.as_secs(),
            })??,
        None => child.wait_with_output().await?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        info!("Executed command:\n{}\nExit Code: 0\nOutput:\n{}", command_str, combined);
        Ok(combined)
    } else {
        Err(PipelineError::CommandExecutionFailed {
            command: command_str,
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// Runs `<tool> --version` and returns the first non-empty output line.
pub async fn check_version(tool: &Path) -> Result<String, PipelineError> {
    let command = format!("{} --version", tool.display());
    let output = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::CommandExecutionFailed {
            command: command.clone(),
            exit_code: None,
            output: format!("Failed to spawn {}: {}. Is it installed?", tool.display(), e),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first_line = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| PipelineError::CommandExecutionFailed {
            command,
            exit_code: output.status.code(),
            output: "no version output".to_string(),
        })?
        .to_string();
    debug!("{} reports {}", tool.display(), first_line);
    Ok(first_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::params::{LibraryType, Preset, TopHatParams};
    use anyhow::Result;
    use proptest::prelude::*;
    use serde_json::json;

    fn base_params() -> TopHatParams {
        TopHatParams::from_value(json!({
            "input_ref": "1/2/3",
            "assembly_or_genome_ref": "1/4/1",
            "workspace_name": "ws",
            "alignment_suffix": "_alignment",
        }))
        .unwrap()
    }

    fn generate(params: &TopHatParams, reads: &[PathBuf]) -> Vec<String> {
        tophat::arg_generator(params, Path::new("/idx/genome"), reads, Path::new("/out"))
    }

    #[test]
    fn test_library_type_only() {
        let mut params = base_params();
        params.library_type = Some(LibraryType::FrUnstranded);
        let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);
        assert_eq!(
            args,
            vec![
                "-o",
                "/out",
                "--library-type",
                "fr-unstranded",
                "/idx/genome",
                "/r/SE_reads.fastq"
            ]
        );
    }

    #[test]
    fn test_boolean_flag_has_no_value() {
        let mut params = base_params();
        params.report_secondary_alignments = Some(true);
        let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);
        let pos = args
            .iter()
            .position(|a| a == "--report-secondary-alignments")
            .unwrap();
        assert_eq!(args[pos + 1], "/idx/genome");

        params.report_secondary_alignments = Some(false);
        let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);
        assert!(!args.iter().any(|a| a == "--report-secondary-alignments"));

        params.report_secondary_alignments = None;
        let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);
        assert!(!args.iter().any(|a| a == "--report-secondary-alignments"));
    }

    #[test]
    fn test_paired_reads_forward_before_reverse() {
        let mut params = base_params();
        params.preset_options = Some(Preset::B2Sensitive);
        params.num_threads = Some(4);
        let reads = [PathBuf::from("/r/PE_reads_1.fastq"), PathBuf::from("/r/PE_reads_2.fastq")];
        let args = generate(&params, &reads);
        let n = args.len();
        assert_eq!(args[n - 3], "/idx/genome");
        assert_eq!(args[n - 2], "/r/PE_reads_1.fastq");
        assert_eq!(args[n - 1], "/r/PE_reads_2.fastq");
        assert!(args.contains(&"--b2-sensitive".to_string()));
        let threads = args.iter().position(|a| a == "--num-threads").unwrap();
        assert_eq!(args[threads + 1], "4");
    }

    #[test]
    fn test_non_positive_threads_are_omitted() {
        let mut params = base_params();
        params.num_threads = Some(0);
        let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);
        assert!(!args.iter().any(|a| a == "--num-threads"));
    }

    #[test]
    fn test_samtools_merge_args() {
        let args = samtools::merge_args(
            Path::new("/out/merged_hits.bam"),
            &[Path::new("/out/accepted_hits.bam"), Path::new("/out/unmapped.bam")],
        );
        assert_eq!(
            args,
            vec!["merge", "-f", "/out/merged_hits.bam", "/out/accepted_hits.bam", "/out/unmapped.bam"]
        );
    }

    #[test]
    fn test_command_line_display() {
        let cmd = CommandLine::new(Path::new("/bin/tophat"), vec!["-o".to_string(), "/out".to_string()]);
        assert_eq!(cmd.to_string(), "/bin/tophat -o /out");
    }

    proptest! {
        #[test]
        fn prop_each_value_option_maps_to_one_flag(
            mismatches in proptest::option::of(0i64..10),
            gap in proptest::option::of(0i64..10),
            max_intron in proptest::option::of(1000i64..500_000),
        ) {
            let mut params = base_params();
            params.read_mismatches = mismatches;
            params.read_gap_length = gap;
            params.max_intron_length = max_intron;
            let args = generate(&params, &[PathBuf::from("/r/SE_reads.fastq")]);

            for (flag, value) in [
                ("--read-mismatches", mismatches),
                ("--read-gap-length", gap),
                ("--max-intron-length", max_intron),
            ] {
                let hits: Vec<usize> = args.iter().enumerate().filter(|(_, a)| *a == flag).map(|(i, _)| i).collect();
                match value {
                    Some(v) => {
                        prop_assert_eq!(hits.len(), 1);
                        prop_assert_eq!(&args[hits[0] + 1], &v.to_string());
                    }
                    None => prop_assert!(hits.is_empty()),
                }
            }
            prop_assert_eq!(args.last().unwrap(), "/r/SE_reads.fastq");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_success_captures_output() -> Result<()> {
        let cmd = CommandLine::new(Path::new("sh"), vec!["-c".to_string(), "echo hello; echo oops 1>&2".to_string()]);
        let output = run_command(&cmd, None).await?;
        assert!(output.contains("hello"));
        assert!(output.contains("oops"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_failure_carries_exit_code() -> Result<()> {
        let cmd = CommandLine::new(Path::new("sh"), vec!["-c".to_string(), "echo broken; exit 3".to_string()]);
        match run_command(&cmd, None).await {
            Err(PipelineError::CommandExecutionFailed { exit_code, output, .. }) => {
                assert_eq!(exit_code, Some(3));
                assert!(output.contains("broken"));
            }
            other => panic!("expected command failure, got {:?}", other),
        }
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_timeout() -> Result<()> {
        let cmd = CommandLine::new(Path::new("sh"), vec!["-c".to_string(), "sleep 5".to_string()]);
        let result = run_command(&cmd, Some(Duration::from_millis(100))).await;
        assert!(matches!(result, Err(PipelineError::CommandTimeout { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_command_missing_program() -> Result<()> {
        let cmd = CommandLine::new(Path::new("/definitely/not/a/tool"), vec![]);
        let result = run_command(&cmd, None).await;
        assert!(matches!(
            result,
            Err(PipelineError::CommandExecutionFailed { exit_code: None, .. })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_version_reports_first_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = dir.path().join("fake_tool");
        std::fs::write(&tool, "#!/bin/sh\necho\necho 'fake_tool 1.2.3'\n")?;
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))?;
        }
        assert_eq!(check_version(&tool).await?, "fake_tool 1.2.3");
        Ok(())
    }

    #[tokio::test]
    async fn test_check_version_missing_tool() {
        match check_version(Path::new("/definitely/not/a/tool")).await {
            Err(PipelineError::CommandExecutionFailed { command, exit_code, output }) => {
                assert_eq!(command, "/definitely/not/a/tool --version");
                assert_eq!(exit_code, None);
                assert!(output.contains("Is it installed?"));
            }
            other => panic!("expected spawn failure, got {:?}", other),
        }
    }
}
