pub mod export;
pub mod generate;
pub mod report;
pub mod server;

use hwtrng_core::sim::{Behavior, SimulatedTrng};
use hwtrng_core::{CancelToken, Device, DeviceConfig, Timings};

use crate::DeviceArgs;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Apply command-line overrides on top of the environment configuration.
pub fn apply_overrides(mut config: DeviceConfig, args: &DeviceArgs) -> DeviceConfig {
    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud_rate {
        config.baud_rate = baud;
    }
    config
}

/// Build the device from env + flags and force the hardware into standby.
pub fn open_device(args: &DeviceArgs) -> hwtrng_core::Result<Device> {
    let config = apply_overrides(DeviceConfig::from_env()?, args);
    let device = if args.simulate {
        log::info!("using the simulated generator");
        let sim = SimulatedTrng::new(Behavior::Healthy);
        Device::new(
            Box::new(sim.connector()),
            Timings::immediate(),
            config.stall_timeout,
        )
        .with_max_bits(config.max_bits)
    } else {
        log::info!(
            "generator on {} at {} baud",
            config.port.as_deref().unwrap_or("<unset>"),
            config.baud_rate
        );
        Device::from_config(&config)?
    };
    device.boot_probe()?;
    log::debug!("boot probe sent, generator in standby");
    Ok(device)
}

/// Token tripped by Ctrl-C.
pub fn cancel_on_ctrlc() -> CancelToken {
    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Ctrl-C will not cancel acquisition: {e}");
    }
    token
}

/// Power the generator on, run `f`, then power it off whatever `f` returned.
pub fn with_generator<T>(
    device: &Device,
    f: impl FnOnce(&Device) -> hwtrng_core::Result<T>,
) -> hwtrng_core::Result<T> {
    device.initialize()?.into_result()?;
    let out = f(device);
    if let Err(e) = device.shutdown() {
        log::warn!("failed to put the generator in standby: {e}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> DeviceArgs {
        DeviceArgs {
            simulate: true,
            ..DeviceArgs::default()
        }
    }

    #[test]
    fn test_flags_override_environment() {
        let env = DeviceConfig {
            port: Some("/dev/ttyUSB0".into()),
            ..DeviceConfig::default()
        };
        let args = DeviceArgs {
            port: Some("/dev/ttyACM1".into()),
            baud_rate: Some(115_200),
            simulate: false,
        };
        let config = apply_overrides(env, &args);
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn test_no_flags_keep_environment() {
        let env = DeviceConfig {
            port: Some("COM3".into()),
            baud_rate: 19_200,
            ..DeviceConfig::default()
        };
        let config = apply_overrides(env.clone(), &DeviceArgs::default());
        assert_eq!(config, env);
    }

    #[test]
    fn test_with_generator_powers_off_afterwards() {
        let device = open_device(&simulated()).unwrap();
        let bits = with_generator(&device, |d| d.acquire_bits(256, &d.read_limits())).unwrap();
        assert_eq!(bits.len(), 256);
        assert!(!device.is_initialized());
    }

    #[test]
    fn test_with_generator_powers_off_after_error() {
        let device = open_device(&simulated()).unwrap();
        let err = with_generator(&device, |d| d.acquire_bits(0, &d.read_limits()));
        assert!(err.is_err());
        assert!(!device.is_initialized());
    }
}
