use crate::state::State;

/// One-line drawing of the track. Stations are `|`, trains are drawn as
/// their index (mod 10) and listed after the track with their status
/// symbol. Trains sharing a column are drawn as `#`.
pub fn track_string(state: &State, width: usize) -> String {
    let _p = hprof::enter("track_string");
    let width = width.max(2);
    let positions = state
        .stations
        .iter()
        .map(|s| s.position_km)
        .chain(state.trains.iter().map(|t| t.current_position_km));
    let (lo, hi) = positions.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
    if !lo.is_finite() {
        return String::new();
    }
    let span = (hi - lo).max(1.0);
    let column = |x: f64| (((x - lo) / span) * (width - 1) as f64).round() as usize;

    let mut line = vec![b'-'; width];
    for station in state.stations.iter() {
        line[column(station.position_km)] = b'|';
    }
    let mut taken = vec![false; width];
    for (idx, train) in state.trains.iter().enumerate() {
        let x = column(train.current_position_km);
        line[x] = if taken[x] { b'#' } else { b'0' + (idx % 10) as u8 };
        taken[x] = true;
    }

    let mut result = format!("{:>7.1} [{}] {:.1}", lo, String::from_utf8_lossy(&line), hi);
    for (idx, train) in state.trains.iter().enumerate() {
        result.push_str(&format!(
            "  {}:{}{}@{:.1}",
            idx,
            train.id,
            train.status.symbol(),
            train.current_position_km
        ));
    }
    result
}
