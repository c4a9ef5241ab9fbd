use crate::DeviceArgs;

use super::CliResult;

pub fn run(args: &DeviceArgs, num_bits: usize, quantity: usize, json: bool) -> CliResult {
    let cancel = super::cancel_on_ctrlc();
    let device = super::open_device(args)?;

    let generated = super::with_generator(&device, |d| {
        d.generate_numbers(quantity, num_bits, &d.read_limits().with_cancel(cancel))
    })?;

    if generated.total_failure {
        log::warn!(
            "total failure after {} bits: {} of {quantity} numbers produced",
            generated.bits_acquired,
            generated.numbers.len()
        );
    }

    if json {
        println!("{}", serde_json::to_string(&generated.numbers)?);
    } else {
        for n in &generated.numbers {
            println!("{n}");
        }
    }

    if generated.total_failure {
        return Err("generator total failure detected".into());
    }
    Ok(())
}
