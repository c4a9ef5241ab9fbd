use std::path::PathBuf;
use std::sync::Arc;

use crate::DeviceArgs;

use super::CliResult;

pub fn run(args: &DeviceArgs, host: &str, port: u16, output_dir: PathBuf) -> CliResult {
    let device = Arc::new(super::open_device(args)?);

    let base = format!("http://{host}:{port}");
    println!("hwtrng server v{}", hwtrng_core::VERSION);
    println!("   {base}");
    println!("   test data directory: {}", output_dir.display());
    println!();
    println!("   Endpoints (all GET, under /trng/randomNum):");
    println!("     /init                 Power the generator on");
    println!("     /getRandom            numBits=N&quantity=K hex numbers");
    println!("     /generateTestdata     numBits=N&filetype=txt|bin");
    println!("     /downloadFile         Last generated test data file");
    println!("     /testData             numBits=N randomness battery");
    println!("     /shutdown             Put the generator in standby");
    println!("     /restart              Power cycle the generator");
    println!();
    println!("   Example:");
    println!("     curl {base}/trng/randomNum/init");
    println!("     curl '{base}/trng/randomNum/getRandom?numBits=64&quantity=4'");
    println!();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(hwtrng_server::run_server(
        Arc::clone(&device),
        output_dir,
        host,
        port,
    ))?;

    // Leave the hardware off once the API is gone.
    match device.shutdown() {
        Ok(t) => log::info!("generator shutdown on exit: {t:?}"),
        Err(e) => log::warn!("failed to put the generator in standby on exit: {e}"),
    }
    Ok(())
}
