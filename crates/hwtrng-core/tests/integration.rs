//! Integration tests for hwtrng-core.
//!
//! These drive the full pipeline against the simulated generator:
//! boot probe → initialize → acquisition → slicing / export → shutdown.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use hwtrng_core::sim::{Behavior, SimulatedTrng};
use hwtrng_core::{
    BitString, CancelToken, Device, DeviceState, Error, FileFormat, ReadLimits, Timings,
    Transition,
};

fn simulated_device(sim: &SimulatedTrng) -> Device {
    Device::new(
        Box::new(sim.connector()),
        Timings::immediate(),
        Duration::from_millis(500),
    )
}

#[test]
fn concurrent_initialize_opens_channel_once() {
    const CALLERS: usize = 8;
    let sim = SimulatedTrng::new(Behavior::Healthy);
    let device = Arc::new(simulated_device(&sim));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let device = Arc::clone(&device);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                device.initialize()
            })
        })
        .collect();

    let outcomes: Vec<Transition> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let applied = outcomes.iter().filter(|t| t.is_applied()).count();
    let already_on = outcomes
        .iter()
        .filter(|t| matches!(t.into_result(), Err(Error::AlreadyOn)))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(already_on, CALLERS - 1);
    assert_eq!(device.state(), DeviceState::On);
    assert_eq!(sim.open_count(), 1);
    assert_eq!(device.open_count(), 1);
    assert_eq!(sim.commands().iter().filter(|c| *c == "on").count(), 1);
}

#[test]
fn shutdown_waits_for_in_flight_acquisition() {
    let sim = SimulatedTrng::new(Behavior::Healthy);
    let device = Arc::new(simulated_device(&sim));
    device.boot_probe().unwrap();
    device.initialize().unwrap().into_result().unwrap();

    let reader = {
        let device = Arc::clone(&device);
        thread::spawn(move || device.acquire_bits(200_000, &device.read_limits()))
    };
    let stopper = {
        let device = Arc::clone(&device);
        thread::spawn(move || device.shutdown())
    };

    let stop = stopper.join().unwrap().unwrap();
    let bits = reader.join().unwrap();
    assert_eq!(stop, Transition::Applied);
    // Either the read finished first, or it found the device already off.
    match bits {
        Ok(bits) => assert_eq!(bits.len(), 200_000),
        Err(e) => assert!(matches!(e, Error::NotReady), "unexpected {e:?}"),
    }
    assert_eq!(device.state(), DeviceState::Standby);
}

#[test]
fn cancel_aborts_acquisition_from_another_thread() {
    let sim = SimulatedTrng::new(Behavior::Stall);
    let device = Arc::new(simulated_device(&sim));
    device.initialize().unwrap().into_result().unwrap();

    let cancel = CancelToken::new();
    let limits = ReadLimits::new(Duration::from_secs(30)).with_cancel(cancel.clone());
    let reader = {
        let device = Arc::clone(&device);
        thread::spawn(move || device.acquire_bits(64, &limits))
    };
    thread::sleep(Duration::from_millis(20));
    cancel.cancel();
    assert!(matches!(reader.join().unwrap(), Err(Error::Cancelled)));
    // The device is still usable afterwards.
    assert_eq!(device.state(), DeviceState::On);
}

#[test]
fn full_session_round_trip() {
    let sim = SimulatedTrng::with_seed(Behavior::Healthy, 1234);
    let device = simulated_device(&sim);
    device.boot_probe().unwrap();

    assert!(matches!(
        device.generate_numbers(1, 8, &device.read_limits()),
        Err(Error::NotReady)
    ));

    device.initialize().unwrap().into_result().unwrap();
    let generated = device.generate_numbers(5, 64, &device.read_limits()).unwrap();
    assert_eq!(generated.numbers.len(), 5);
    for n in &generated.numbers {
        assert_eq!(n.len(), 16);
        assert!(n.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    let tmp = tempfile::tempdir().unwrap();
    let path = device
        .generate_to_file(4096, FileFormat::Text, tmp.path(), &device.read_limits())
        .unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    let bits = BitString::parse(&text).unwrap();
    assert_eq!(bits.len(), 4096);

    assert_eq!(device.shutdown().unwrap(), Transition::Applied);
    assert_eq!(device.shutdown().unwrap(), Transition::AlreadyOff);
    assert_eq!(sim.commands().first().map(String::as_str), Some("off"));
}

#[test]
fn generator_failing_mid_request_yields_partial_numbers() {
    let sim = SimulatedTrng::with_seed(Behavior::Healthy, 77);
    let device = simulated_device(&sim);
    device.initialize().unwrap().into_result().unwrap();

    // 7 clean probes (5600 bits), then the generator locks up.
    sim.set_behavior(Behavior::FailAfter { healthy_bytes: 700 });
    let generated = device.generate_numbers(100, 128, &device.read_limits()).unwrap();
    assert!(generated.total_failure);
    assert_eq!(generated.bits_acquired, 5600);
    assert_eq!(generated.numbers.len(), 5600 / 128);
    assert!(generated.numbers.iter().all(|n| n.len() == 32));
}
