use std::path::PathBuf;

use clap::Parser;

use crate::config::defs::BamOutput;

#[derive(Parser, Debug, Clone)]
#[command(name = "tophat2-runner", version, about = "Run TopHat2 over a reads library or reads set and upload the alignments")]
pub struct Arguments {

    #[arg(short = 'p', long = "params", help = "JSON file holding the run_tophat2_app parameter record")]
    pub params: PathBuf,

    #[arg(short = 'o', long = "output", help = "Write the result record to this JSON file as well as stdout")]
    pub output: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long, env = "KB_SCRATCH", help = "Scratch root; defaults to the system temp dir")]
    pub scratch: Option<PathBuf>,

    #[arg(long, env = "KB_WORKSPACE_URL")]
    pub workspace_url: String,

    #[arg(long, env = "SDK_CALLBACK_URL")]
    pub callback_url: String,

    #[arg(long, env = "KB_SRV_WIZ_URL")]
    pub srv_wiz_url: String,

    #[arg(long, env = "KB_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, default_value = "/kb/deployment/bin/TopHat2/tophat")]
    pub tophat_bin: PathBuf,

    #[arg(long, default_value = "samtools")]
    pub samtools_bin: PathBuf,

    #[arg(long, default_value = "merged", value_enum, help = "BAM handed to the alignment uploader")]
    pub bam_output: BamOutput,

    #[arg(long, help = "Kill tophat/samtools after this many seconds")]
    pub command_timeout: Option<u64>,
}
