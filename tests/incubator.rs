use core::cell::Cell;

use tempeh_temperer::controller::{Phase, POWER_MAX_LIMIT};
use tempeh_temperer::filter::N_AVG;
use tempeh_temperer::incubator::InvalidTarget;
use tempeh_temperer::persistence::{self, RamStorage, Slot, SLOT_STRIDE};
use tempeh_temperer::sensor::ChannelOrder;
use tempeh_temperer::settings::Settings;
use tempeh_temperer::sim::{Plant, SimBus, SimHeater};
use tempeh_temperer::{Fixed, Incubator, SensorFault, SensorMode, Tick};

type Store = RamStorage<32>;
type SimIncubator<'a> = Incubator<SimBus<'a>, SimHeater<'a>, Store>;

fn plant(air: f32, probe: f32) -> Cell<Plant> {
    Cell::new(Plant {
        air,
        probe,
        ..Default::default()
    })
}

fn settings(target: f32, heater_enabled: bool) -> Settings {
    Settings {
        target,
        heater_enabled,
        ..Default::default()
    }
}

fn incubator<'a>(
    plant: &'a Cell<Plant>,
    duty: &'a Cell<u8>,
    sensors: usize,
    storage: Store,
    settings: Settings,
) -> SimIncubator<'a> {
    Incubator::new(
        SimBus::new(plant, sensors),
        SimHeater::new(duty),
        storage,
        settings,
    )
}

fn warm_up(inc: &mut SimIncubator) {
    for _ in 0..N_AVG {
        assert_eq!(inc.tick(), Tick::WarmingUp);
    }
}

fn copy(storage: &mut Store) -> Store {
    let mut copy = Store::new();
    copy.bytes_mut().copy_from_slice(storage.bytes());
    copy
}

#[test]
fn warm_up_keeps_the_heater_off() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0xaa);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(35.0, true));
    assert_eq!(duty.get(), 0);
    assert_eq!(inc.initialize(), Ok(SensorMode::Dual));

    for _ in 0..N_AVG {
        assert_eq!(inc.tick(), Tick::WarmingUp);
        assert_eq!(duty.get(), 0);
        assert_eq!(inc.cascade().probe.phase, Phase::WarmingUp);
        assert_eq!(inc.cascade().air.phase, Phase::WarmingUp);
    }
    assert_eq!(inc.state().measured_air, Fixed::from_int(25));
    assert_eq!(inc.state().measured_probe, Some(Fixed::from_int(30)));
    assert!(matches!(inc.tick(), Tick::Controlled { .. }));
}

#[test]
fn cold_start_saturates_both_loops() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(35.0, true));
    inc.initialize().unwrap();
    warm_up(&mut inc);

    assert_eq!(inc.tick(), Tick::Controlled { duty: 255 });
    assert_eq!(duty.get(), 255);
    assert_eq!(inc.state().target_air, Fixed::from_int(38));
    assert_eq!(inc.state().heater_power, POWER_MAX_LIMIT);
    assert_eq!(inc.cascade().probe.integral(), 17_920);
    assert_eq!(inc.cascade().air.integral(), Fixed::from_bits(8_288));
    assert_eq!(inc.cascade().probe.phase, Phase::SaturatedReset);
    assert_eq!(inc.cascade().air.phase, Phase::SaturatedReset);
}

#[test]
fn heater_starts_disabled() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), Settings::default());
    inc.initialize().unwrap();
    warm_up(&mut inc);

    assert_eq!(inc.tick(), Tick::Controlled { duty: 0 });
    assert_eq!(inc.state().heater_power, POWER_MAX_LIMIT);

    inc.set_heater_enabled(true);
    assert_eq!(inc.tick(), Tick::Controlled { duty: 255 });
    inc.set_heater_enabled(false);
    assert_eq!(duty.get(), 0);
}

#[test]
fn sensor_fault_switches_the_heater_off_until_enabled_again() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(35.0, true));
    inc.initialize().unwrap();
    warm_up(&mut inc);
    assert_eq!(inc.tick(), Tick::Controlled { duty: 255 });

    inc.bus_mut().fault = Some(SensorFault::ReadTimeout);
    assert_eq!(inc.tick(), Tick::Faulted(SensorFault::ReadTimeout));
    assert_eq!(duty.get(), 0);
    assert!(!inc.state().heater_enabled);
    assert_eq!(inc.state().heater_power, Fixed::ZERO);
    assert_eq!(inc.state().fault, Some(SensorFault::ReadTimeout));
    assert_eq!(inc.telemetry().fault, 5);

    // Every tick retries the bus while it stays down.
    assert_eq!(inc.tick(), Tick::Faulted(SensorFault::ReadTimeout));
    assert!(!inc.acquisition().is_linked());

    inc.bus_mut().fault = None;
    assert_eq!(inc.tick(), Tick::Linked(SensorMode::Dual));
    assert_eq!(inc.state().fault, Some(SensorFault::ReadTimeout));
    warm_up(&mut inc);
    assert_eq!(inc.state().fault, None);

    // Recovery does not re-enable the heater.
    assert_eq!(inc.tick(), Tick::Controlled { duty: 0 });
    inc.set_heater_enabled(true);
    assert_eq!(inc.tick(), Tick::Controlled { duty: 255 });
}

#[test]
fn failed_initial_probe_is_retried() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(35.0, true));
    inc.bus_mut().fault = Some(SensorFault::BusAbsent);
    assert_eq!(inc.initialize(), Err(SensorFault::BusAbsent));
    assert_eq!(inc.state().fault, Some(SensorFault::BusAbsent));
    assert_eq!(inc.tick(), Tick::Faulted(SensorFault::BusAbsent));

    inc.bus_mut().fault = None;
    assert_eq!(inc.tick(), Tick::Linked(SensorMode::Dual));
    warm_up(&mut inc);
    assert_eq!(inc.tick(), Tick::Controlled { duty: 0 });
}

#[test]
fn single_sensor_drives_the_air_loop_from_the_probe_set_point() {
    let plant = plant(32.5, 20.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 1, Store::new(), settings(33.0, true));
    assert_eq!(inc.initialize(), Ok(SensorMode::Single));
    assert_eq!(inc.state().target_air, Fixed::from_int(33));

    for _ in 0..N_AVG {
        assert_eq!(inc.tick(), Tick::WarmingUp);
        assert_eq!(inc.state().target_air, inc.state().target_probe);
    }
    assert_eq!(inc.state().measured_probe, None);

    // p = 0.5 * 150, i = 0.25 clamped up to the power floor of 4.
    assert_eq!(inc.tick(), Tick::Controlled { duty: 79 });
    assert_eq!(inc.state().target_air, Fixed::from_int(33));
    assert_eq!(inc.cascade().air.integral(), Fixed::from_int(4));
    assert_eq!(inc.cascade().probe.phase, Phase::WarmingUp);

    inc.set_target_probe(Fixed::from_milli(31_500)).unwrap();
    assert_eq!(inc.state().target_air, Fixed::from_milli(31_500));

    inc.bus_mut().fault = Some(SensorFault::IntegrityCheck);
    inc.tick();
    assert_eq!(inc.state().target_air, inc.state().target_probe);
}

#[test]
fn swapped_channel_order() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let settings = Settings {
        channel_order: ChannelOrder::Swapped,
        ..Default::default()
    };
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings);
    inc.initialize().unwrap();
    warm_up(&mut inc);
    assert_eq!(inc.state().measured_air, Fixed::from_int(30));
    assert_eq!(inc.state().measured_probe, Some(Fixed::from_int(25)));
}

#[test]
fn integrals_are_checkpointed_and_restored() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(35.0, true));
    inc.initialize().unwrap();
    warm_up(&mut inc);

    for _ in 0..599 {
        inc.tick();
    }
    assert_eq!(
        persistence::load(inc.storage_mut(), Slot::OuterIntegral),
        None
    );
    inc.tick();
    assert_eq!(
        persistence::load(inc.storage_mut(), Slot::OuterIntegral),
        Some(17_920)
    );
    assert_eq!(
        persistence::load(inc.storage_mut(), Slot::InnerIntegral),
        Some(8_288)
    );

    // Power loss: a new controller on the same storage.
    let storage = copy(inc.storage_mut());
    let mut inc = incubator(&plant, &duty, 2, storage, settings(35.0, true));
    inc.initialize().unwrap();
    assert_eq!(inc.cascade().probe.integral(), 17_920);
    assert_eq!(inc.cascade().air.integral(), Fixed::from_bits(8_288));
}

#[test]
fn zero_integrals_are_not_checkpointed() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let settings = Settings {
        checkpoint_period: 1,
        ..settings(35.0, true)
    };
    // Single sensor: the outer loop never runs, its slot is never written.
    let mut inc = incubator(&plant, &duty, 1, Store::new(), settings);
    inc.initialize().unwrap();
    warm_up(&mut inc);
    inc.tick();
    assert_eq!(
        persistence::load(inc.storage_mut(), Slot::OuterIntegral),
        None
    );
    assert!(persistence::load(inc.storage_mut(), Slot::InnerIntegral).is_some());
}

#[test]
fn corrupted_slot_falls_back_to_zero() {
    let mut storage = Store::new();
    persistence::save(&mut storage, Slot::OuterIntegral, 17_920).unwrap();
    persistence::save(&mut storage, Slot::InnerIntegral, 8_288).unwrap();
    storage.bytes_mut()[SLOT_STRIDE as usize + 2] ^= 0x10;

    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, storage, Settings::default());
    inc.initialize().unwrap();
    assert_eq!(inc.cascade().probe.integral(), 0);
    assert_eq!(inc.cascade().air.integral(), Fixed::from_bits(8_288));
}

#[test]
fn set_point_is_validated_and_persisted() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), Settings::default());
    inc.initialize().unwrap();
    assert_eq!(inc.state().target_probe, Fixed::from_int(32));

    assert_eq!(inc.set_target_probe(Fixed::from_int(50)), Err(InvalidTarget));
    assert_eq!(inc.set_target_probe(Fixed::ZERO), Err(InvalidTarget));
    assert_eq!(inc.state().target_probe, Fixed::from_int(32));
    assert_eq!(
        persistence::load(inc.storage_mut(), Slot::ProbeSetpoint),
        None
    );

    inc.set_target_probe(Fixed::from_milli(30_500)).unwrap();
    let storage = copy(inc.storage_mut());
    let mut inc = incubator(&plant, &duty, 2, storage, Settings::default());
    inc.initialize().unwrap();
    assert_eq!(inc.state().target_probe, Fixed::from_milli(30_500));
}

#[test]
fn out_of_range_stored_set_point_is_ignored() {
    let mut storage = Store::new();
    persistence::save(&mut storage, Slot::ProbeSetpoint, Fixed::from_int(60).to_bits()).unwrap();

    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, storage, settings(28.0, false));
    inc.initialize().unwrap();
    assert_eq!(inc.state().target_probe, Fixed::from_int(28));
}

#[test]
fn out_of_range_configured_set_point_falls_back_to_default() {
    let settings = Settings::from_json(r#"{"target":100000.0,"heater_enabled":true}"#).unwrap();

    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings);
    inc.initialize().unwrap();
    assert_eq!(inc.state().target_probe, Fixed::from_int(32));

    warm_up(&mut inc);
    assert!(matches!(inc.tick(), Tick::Controlled { .. }));
    assert!(inc.state().target_air <= Fixed::from_int(38));
}

#[test]
fn telemetry_reports_statistics_once() {
    let plant = plant(25.0, 30.0);
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), Settings::default());
    inc.initialize().unwrap();
    warm_up(&mut inc);
    // Drop the samples taken while the filters were filling.
    inc.telemetry();
    inc.tick();

    let telemetry = inc.telemetry();
    assert_eq!(telemetry.mode, Some(SensorMode::Dual));
    assert_eq!(telemetry.air, 25.0);
    assert_eq!(telemetry.probe, Some(30.0));
    assert_eq!(telemetry.fault, 0);
    let statistics = telemetry.statistics.unwrap();
    assert_eq!(statistics.ptp, 0.0);
    assert_eq!(statistics.mean, 30.0);
    assert_eq!(inc.telemetry().statistics, None);
}

#[test]
fn closed_loop_settles_near_the_set_point() {
    let plant = Cell::new(Plant::default());
    let duty = Cell::new(0);
    let mut inc = incubator(&plant, &duty, 2, Store::new(), settings(30.0, true));
    inc.initialize().unwrap();
    for _ in 0..6 * 3600 {
        inc.tick();
        let mut p = plant.get();
        p.step(duty.get(), 1.0);
        plant.set(p);
    }
    let probe = plant.get().probe;
    assert!((probe - 30.0).abs() < 1.0, "probe at {probe}");
}
