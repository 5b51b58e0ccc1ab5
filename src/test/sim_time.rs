use crate::sim::SimTime;

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_secs(1), SimTime(1_000_000_000));
}

#[test]
fn sim_time_unit_conversions_saturate_on_overflow() {
    assert_eq!(SimTime::from_micros(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_millis(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_secs(u64::MAX), SimTime(u64::MAX));
}

#[test]
fn sim_time_from_float_nanos_rounds_and_clamps() {
    assert_eq!(SimTime::from_nanos_f64(1.4), SimTime(1));
    assert_eq!(SimTime::from_nanos_f64(1.5), SimTime(2));
    assert_eq!(SimTime::from_nanos_f64(-3.0), SimTime::ZERO);
    assert_eq!(SimTime::from_nanos_f64(f64::NAN), SimTime::ZERO);
    assert_eq!(SimTime::from_nanos_f64(1e30), SimTime::MAX);
}

#[test]
fn sim_time_saturating_arithmetic() {
    assert_eq!(SimTime(5).saturating_sub(SimTime(9)), SimTime::ZERO);
    assert_eq!(SimTime(9).saturating_sub(SimTime(5)), SimTime(4));
    assert_eq!(SimTime::MAX.saturating_add(SimTime(1)), SimTime::MAX);
    assert_eq!(SimTime::from_millis(3).as_millis_f64(), 3.0);
    assert_eq!(SimTime::from_micros(1500).to_string(), "1.500ms");
}
