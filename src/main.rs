use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use env_logger::Builder;
use log::{LevelFilter, debug, error, info};
use serde_json::Value;

use tophat2_runner::cli::{Arguments, parse};
use tophat2_runner::config::defs::RunConfig;
use tophat2_runner::pipelines::tophat2;
use tophat2_runner::services::Services;
use tophat2_runner::utils::system::detect_cores;

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let raw = std::fs::read_to_string(&args.params)
        .with_context(|| format!("Cannot read parameter file {}", args.params.display()))?;
    let params: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Parameter file {} is not valid JSON", args.params.display()))?;

    let run_config = Arc::new(build_config(&args)?);
    debug!("Scratch root {}; {} host core(s)", run_config.scratch.display(), run_config.host_cores);

    match tophat2::run(run_config, params).await {
        Ok(output) => {
            let json = serde_json::to_string_pretty(&output)?;
            if let Some(path) = &args.output {
                std::fs::write(path, &json)
                    .with_context(|| format!("Cannot write result to {}", path.display()))?;
            }
            println!("{}", json);
            info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            std::process::exit(1);
        }
    }
}

/// Assembles the run configuration from command-line arguments.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// # Returns
/// RunConfig with live service clients.
fn build_config(args: &Arguments) -> Result<RunConfig> {
    let scratch = args.scratch.clone().unwrap_or_else(std::env::temp_dir);
    let scratch = if scratch.is_absolute() {
        scratch
    } else {
        std::env::current_dir()?.join(scratch)
    };
    info!("The scratch directory is {:?}", scratch);

    let services = Services::kbase(
        &args.workspace_url,
        &args.callback_url,
        &args.srv_wiz_url,
        args.token.clone(),
    )?;

    Ok(RunConfig {
        scratch,
        tophat_bin: args.tophat_bin.clone(),
        samtools_bin: args.samtools_bin.clone(),
        bam_output: args.bam_output,
        command_timeout: args.command_timeout.map(Duration::from_secs),
        host_cores: detect_cores(),
        services,
    })
}
