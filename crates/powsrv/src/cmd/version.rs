use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("powsrv {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: powsrv");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol_version: {}", powsrv_frame::VERSION);
    println!(
        "build_target: {}",
        option_env!("POWSRV_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("features: server={}, cli=true", cfg!(feature = "server"));

    Ok(SUCCESS)
}
