//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cpdbatch")]
#[command(
    version,
    about = "Run DataStage quality jobs of a Cloud Pak for Data project",
    long_about = None
)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run jobs and write a summary report
    Run(RunArgs),

    /// Build the rule -> flow -> job matrix without running anything
    Matrix(MatrixArgs),
}

/// Where configuration comes from.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Config file (TOML or JSON); environment variables are used otherwise
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Env file applied before reading the environment
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Directory for report files
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Job to run; repeat for several jobs
    #[arg(long = "job-id", value_name = "ID")]
    pub job_ids: Vec<String>,

    /// Run every job found in the project matrix
    #[arg(long)]
    pub discover: bool,

    /// With --discover, create jobs for flows that have none
    #[arg(long, requires = "discover")]
    pub create_missing_jobs: bool,

    /// Override the worker cap
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_workers: Option<u16>,
}

#[derive(Debug, Clone, Args)]
pub struct MatrixArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Create jobs for flows that have none
    #[arg(long)]
    pub create_missing_jobs: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_job_ids() {
        let cli = Cli::try_parse_from([
            "cpdbatch",
            "run",
            "--job-id",
            "a",
            "--job-id",
            "b",
            "--max-workers",
            "4",
            "--json-logs",
        ])
        .unwrap();
        assert!(cli.json_logs);
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.job_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(args.max_workers, Some(4));
        assert_eq!(args.config.output, PathBuf::from("out"));
    }

    #[test]
    fn create_missing_jobs_requires_discover() {
        assert!(Cli::try_parse_from(["cpdbatch", "run", "--create-missing-jobs"]).is_err());
        let discovering = ["cpdbatch", "run", "--discover", "--create-missing-jobs"];
        assert!(Cli::try_parse_from(discovering).is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let args = ["cpdbatch", "run", "--job-id", "a", "--max-workers", "0"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
