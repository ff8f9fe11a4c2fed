use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("tsnprobe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: tsnprobe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("TSNPROBE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "data_plane: {} / {}",
        tsnprobe_experiment::runner::TALKER_BINARY,
        tsnprobe_experiment::runner::LISTENER_BINARY
    );
    println!(
        "control_port: {}",
        tsnprobe_experiment::PlatformAddresses::default().control_port
    );

    Ok(SUCCESS)
}
