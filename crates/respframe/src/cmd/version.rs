use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("respframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: respframe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("RESPFRAME_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: serial={}, async={}, cli=true",
        cfg!(feature = "serial"),
        cfg!(feature = "async")
    );
    println!(
        "defaults: timeout={}ms, chunk_timeout={}ms, buffer={}",
        respframe_engine::DEFAULT_OVERALL_TIMEOUT.as_millis(),
        respframe_engine::DEFAULT_CHUNK_TIMEOUT.as_millis(),
        respframe_engine::DEFAULT_READ_CHUNK_SIZE
    );

    Ok(SUCCESS)
}
