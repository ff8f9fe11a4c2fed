use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tsnprobe_experiment::{
    Driver, ExperimentConfig, IterationReport, LinuxPlatform, RunSummary, SystemRunner, ToolRunner,
};

use crate::cmd::RunArgs;
use crate::exit::{experiment_error, io_error, CliError, CliResult, PERMISSION_DENIED, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct IterationOutput<'a> {
    index: usize,
    payload_size: Option<&'a str>,
    transmission_interval: Option<&'a str>,
    suspect: bool,
    results_file: Option<String>,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    role: String,
    results_dir: String,
    system_log: Option<String>,
    suspect: usize,
    iterations: Vec<IterationOutput<'a>>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.config.experiment()?;
    require_root()?;

    let results_dir = args
        .results_dir
        .clone()
        .unwrap_or_else(|| default_results_dir(&config));
    std::fs::create_dir_all(&results_dir)
        .map_err(|e| io_error(&format!("creating {}", results_dir.display()), e))?;

    let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner);
    let platform = LinuxPlatform::from_config(runner.clone(), &config);
    let summary = Driver::new(config, platform, runner, &results_dir)
        .with_perf_scripts(&args.perf_scripts)
        .run()
        .map_err(|e| experiment_error("experiment failed", e))?;

    print_summary(&summary, format);
    Ok(SUCCESS)
}

/// Platform setup rewrites NIC, VLAN and qdisc state.
fn require_root() -> CliResult<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(CliError::new(
            PERMISSION_DENIED,
            "tsnprobe run must be started as root",
        ));
    }
    Ok(())
}

fn default_results_dir(config: &ExperimentConfig) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    Path::new("results").join(format!("{}-{stamp}", config.role))
}

fn iteration_output(report: &IterationReport) -> IterationOutput<'_> {
    IterationOutput {
        index: report.index,
        payload_size: report.factors.get(tsnprobe_control::message::PAYLOAD_SIZE),
        transmission_interval: report
            .factors
            .get(tsnprobe_control::message::TRANSMISSION_INTERVAL),
        suspect: report.outcome.suspect,
        results_file: report
            .outcome
            .results_file
            .as_ref()
            .map(|p| p.display().to_string()),
    }
}

fn print_summary(summary: &RunSummary, format: OutputFormat) {
    let out = RunOutput {
        role: summary.role.to_string(),
        results_dir: summary.results_dir.display().to_string(),
        system_log: summary.system_log.as_ref().map(|p| p.display().to_string()),
        suspect: summary.suspect(),
        iterations: summary.iterations.iter().map(iteration_output).collect(),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut t = table(vec!["#", "PAYLOAD", "INTERVAL", "SUSPECT", "RESULTS"]);
            for it in &out.iterations {
                t.add_row(vec![
                    (it.index + 1).to_string(),
                    it.payload_size.unwrap_or("-").to_string(),
                    it.transmission_interval.unwrap_or("-").to_string(),
                    if it.suspect { "yes" } else { "no" }.to_string(),
                    it.results_file.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{t}");
            println!("{} results in {}", out.role, out.results_dir);
        }
        OutputFormat::Pretty => {
            println!(
                "{} completed {} iterations ({} suspect); results in {}",
                out.role,
                out.iterations.len(),
                out.suspect,
                out.results_dir
            );
            if let Some(log) = &out.system_log {
                println!("system log: {log}");
            }
        }
        OutputFormat::Raw => {
            for it in &out.iterations {
                if let Some(path) = &it.results_file {
                    println!("{path}");
                }
            }
        }
    }
}
