use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde_json::{json, Value};
use tsnprobe_experiment::config::{GENERAL, PROFILES, SYSTEM, TALKER};
use tsnprobe_experiment::{ConfigDocument, ExperimentConfig};

use crate::exit::{config_error, CliResult};
use crate::output::OutputFormat;

pub mod doctor;
pub mod plan;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare this host and run the experiment as talker or listener.
    Run(RunArgs),
    /// Print the talker's parameter sweep without touching the host.
    Plan(PlanArgs),
    /// Check privileges and required external tools.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Plan(args) => plan::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// The configuration file and command-line overrides of its values.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Experiment configuration (JSON).
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
    /// Override `General Setup.Mode`.
    #[arg(long, value_name = "ROLE", value_parser = ["talker", "listener"])]
    pub mode: Option<String>,
    /// Override `General Setup.Platform`.
    #[arg(long, value_parser = ["i210", "stmmac"])]
    pub platform: Option<String>,
    /// Override `General Setup.Socket Type`.
    #[arg(long, value_name = "FAMILY", value_parser = ["AF_PACKET", "AF_XDP"])]
    pub socket_type: Option<String>,
    /// Override `System Setup.TSN Interface`.
    #[arg(long, short = 'i', value_name = "IFACE")]
    pub interface: Option<String>,
    /// Override `Talker Setup.Iterations` (packet count or `<N>s`).
    #[arg(long, short = 'n', value_name = "N")]
    pub iterations: Option<String>,
    /// Override `Talker Setup.Experiment profile`.
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,
    /// Read the named profile from this CSV instead of the configured path.
    #[arg(long, value_name = "FILE", requires = "profile")]
    pub profile_path: Option<PathBuf>,
    /// Force `General Setup.Intermediate latency` on.
    #[arg(long)]
    pub intermediate_latency: bool,
    /// Force `General Setup.Stress CPUs` on.
    #[arg(long)]
    pub stress_cpus: bool,
    /// Force `General Setup.Collect system log` on.
    #[arg(long)]
    pub collect_system_log: bool,
}

impl ConfigArgs {
    /// Load the file and apply every override given on the command line.
    pub fn document(&self) -> CliResult<ConfigDocument> {
        let mut doc = ConfigDocument::load(&self.config)
            .map_err(|e| config_error("loading configuration", e))?;
        for (path, value) in self.overrides() {
            tracing::debug!(key = %path.join("."), %value, "configuration override");
            doc.set(&path, value);
        }
        self.apply_profile_entry(&mut doc);
        Ok(doc)
    }

    /// Typed configuration after overrides.
    pub fn experiment(&self) -> CliResult<ExperimentConfig> {
        self.document()?
            .experiment()
            .map_err(|e| config_error(&format!("configuration {}", self.config.display()), e))
    }

    fn overrides(&self) -> Vec<([&'static str; 2], Value)> {
        let mut out = Vec::new();
        let text = |path: [&'static str; 2], value: &Option<String>, out: &mut Vec<_>| {
            if let Some(value) = value {
                out.push((path, json!(value)));
            }
        };
        text([GENERAL, "Mode"], &self.mode, &mut out);
        text([GENERAL, "Platform"], &self.platform, &mut out);
        text([GENERAL, "Socket Type"], &self.socket_type, &mut out);
        text([SYSTEM, "TSN Interface"], &self.interface, &mut out);
        text([TALKER, "Iterations"], &self.iterations, &mut out);
        text([TALKER, "Experiment profile"], &self.profile, &mut out);

        let flags = [
            ([GENERAL, "Intermediate latency"], self.intermediate_latency),
            ([GENERAL, "Stress CPUs"], self.stress_cpus),
            ([GENERAL, "Collect system log"], self.collect_system_log),
        ];
        for (path, set) in flags {
            if set {
                out.push((path, Value::Bool(true)));
            }
        }
        out
    }

    fn profile_entry(&self) -> Option<(&str, &Path)> {
        Some((self.profile.as_deref()?, self.profile_path.as_deref()?))
    }

    /// Register `--profile-path` under `Experiment Profiles`.
    fn apply_profile_entry(&self, doc: &mut ConfigDocument) {
        if let Some((name, path)) = self.profile_entry() {
            doc.set(&[PROFILES, name], json!(path.display().to_string()));
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Directory for results and logs. Default: `results/<role>-<unix time>`.
    #[arg(long, short = 'r', value_name = "DIR")]
    pub results_dir: Option<PathBuf>,
    /// Directory holding the perf post-processing scripts.
    #[arg(long, value_name = "DIR", env = "TSNPROBE_PERF_SCRIPTS", default_value = ".")]
    pub perf_scripts: PathBuf,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
