use serde::Serialize;
use tsnprobe_control::{ExperimentParameters, Factors};
use tsnprobe_experiment::{Iterations, Role};

use crate::cmd::PlanArgs;
use crate::exit::{config_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct PlanOutput {
    profile: String,
    iterations: String,
    factors: Vec<String>,
    rows: Vec<PlanRow>,
}

#[derive(Serialize)]
struct PlanRow {
    values: Vec<String>,
    /// Packets the talker sends for this row; absent when the interval does
    /// not parse.
    packets: Option<u64>,
}

pub fn run(args: PlanArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.config.experiment()?;
    let talker = match (&config.talker, config.role) {
        (Some(talker), Role::Talker) => talker.clone(),
        _ => {
            return Err(CliError::new(
                USAGE,
                "plan needs a talker configuration; only the talker reads experiment profiles",
            ))
        }
    };
    let parameters = config
        .load_parameters()
        .map_err(|e| config_error("loading experiment profile", e))?;

    let out = plan_output(&talker.profile_name, talker.iterations, &parameters);
    print_plan(&out, format);
    Ok(SUCCESS)
}

fn plan_output(profile: &str, iterations: Iterations, parameters: &ExperimentParameters) -> PlanOutput {
    PlanOutput {
        profile: profile.to_string(),
        iterations: iterations.to_string(),
        factors: parameters.factor_names().to_vec(),
        rows: parameters
            .iter()
            .map(|factors| PlanRow {
                values: parameters
                    .factor_names()
                    .iter()
                    .map(|name| factors.get(name).unwrap_or_default().to_string())
                    .collect(),
                packets: packets(iterations, factors),
            })
            .collect(),
    }
}

fn packets(iterations: Iterations, factors: &Factors) -> Option<u64> {
    factors
        .transmission_interval()
        .ok()
        .map(|interval| iterations.packets(interval))
}

fn print_plan(out: &PlanOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut header = vec!["#".to_string()];
            header.extend(out.factors.iter().cloned());
            header.push("PACKETS".to_string());
            let mut t = table(header);
            for (index, row) in out.rows.iter().enumerate() {
                let mut cells = vec![(index + 1).to_string()];
                cells.extend(row.values.iter().cloned());
                cells.push(packet_text(row.packets));
                t.add_row(cells);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            println!(
                "profile {} ({} rows, iterations {})",
                out.profile,
                out.rows.len(),
                out.iterations
            );
            for (index, row) in out.rows.iter().enumerate() {
                let pairs: Vec<String> = out
                    .factors
                    .iter()
                    .zip(&row.values)
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                println!(
                    "  {:>3}. {} packets={}",
                    index + 1,
                    pairs.join(" "),
                    packet_text(row.packets)
                );
            }
        }
        OutputFormat::Raw => {
            println!("{}", out.factors.join(","));
            for row in &out.rows {
                println!("{}", row.values.join(","));
            }
        }
    }
}

fn packet_text(packets: Option<u64>) -> String {
    packets.map_or_else(|| "-".to_string(), |n| n.to_string())
}
