use std::path::Path;

use hwtrng_core::FileFormat;

use crate::DeviceArgs;

use super::CliResult;

pub fn run(args: &DeviceArgs, num_bits: usize, filetype: &str, output_dir: &Path) -> CliResult {
    let format: FileFormat = filetype.parse()?;
    let cancel = super::cancel_on_ctrlc();
    let device = super::open_device(args)?;

    let path = super::with_generator(&device, |d| {
        d.generate_to_file(
            num_bits,
            format,
            output_dir,
            &d.read_limits().with_cancel(cancel),
        )
    })?;

    println!("Wrote {num_bits} bits to {}", path.display());
    Ok(())
}
