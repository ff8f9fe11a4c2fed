use serde::Serialize;
use tsnprobe_experiment::process::find_on_path;
use tsnprobe_experiment::runner::{LISTENER_BINARY, TALKER_BINARY};

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

/// Tools every run invokes.
const REQUIRED_TOOLS: &[&str] = &[
    "ip", "ethtool", "tc", "ptp4l", "phc2sys", "pmc", "chrt", TALKER_BINARY, LISTENER_BINARY,
];

/// Tools only some configurations invoke, with the setting that needs them.
const OPTIONAL_TOOLS: &[(&str, &str)] = &[
    ("taskset", "Isolate CPU"),
    ("perf", "Intermediate latency"),
    ("stress-ng", "Stress CPUs"),
    ("iperf3", "Network interference"),
    ("journalctl", "Collect system log"),
    ("lspci", "NIC identification"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let mut checks = vec![root_check()];
    checks.extend(REQUIRED_TOOLS.iter().map(|tool| tool_check(tool, None)));
    checks.extend(
        OPTIONAL_TOOLS
            .iter()
            .map(|(tool, setting)| tool_check(tool, Some(setting))),
    );

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = DoctorOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };
    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn root_check() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    CheckResult {
        name: "root".to_string(),
        status: if euid == 0 {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        },
        detail: format!("effective uid {euid}"),
    }
}

/// Missing required tools fail; missing optional ones warn with the setting
/// that needs them.
fn tool_check(tool: &str, needed_by: Option<&str>) -> CheckResult {
    let (status, detail) = match (find_on_path(tool), needed_by) {
        (Some(path), _) => (CheckStatus::Pass, path.display().to_string()),
        (None, None) => (CheckStatus::Fail, "not found on PATH".to_string()),
        (None, Some(setting)) => (
            CheckStatus::Warn,
            format!("not found on PATH; needed for \"{setting}\""),
        ),
    };
    CheckResult {
        name: tool.to_string(),
        status,
        detail,
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            let mut t = table(vec!["CHECK", "STATUS", "DETAIL"]);
            for c in &output.checks {
                t.add_row(vec![
                    c.name.clone(),
                    status_text(c.status).to_string(),
                    c.detail.clone(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            println!("tsnprobe doctor\n");
            for c in &output.checks {
                println!("  [{:>4}] {:<14} {}", status_text(c.status), c.name, c.detail);
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
    }
}
