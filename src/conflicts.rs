use crate::problem::{Conflict, Destination};
use crate::simulation::ARRIVAL_EPSILON_KM;
use crate::state::State;

/// Straight-line motion of a train toward its destination, valid for
/// `0 <= t <= duration_h`.
struct Trajectory {
    start_km: f64,
    velocity_kmph: f64,
    duration_h: f64,
}

impl Trajectory {
    fn position(&self, t: f64) -> f64 {
        self.start_km + self.velocity_kmph * t
    }
}

/// Derives the conflict registry from the pristine state: every pair of
/// trains whose paths toward their destinations meet (head-on, or a faster
/// train catching up with a slower one) becomes a conflict at the meeting
/// point. Trains already at their destination take no part.
pub fn identify_conflicts(initial: &State, destinations: &[Destination]) -> Vec<Conflict> {
    let trajectories = initial
        .trains
        .iter()
        .zip(destinations.iter())
        .map(|(train, dest)| {
            let distance = dest.position_km - train.current_position_km;
            (distance.abs() >= ARRIVAL_EPSILON_KM && !train.has_arrived()).then(|| Trajectory {
                start_km: train.current_position_km,
                velocity_kmph: distance.signum() * train.speed_kmph,
                duration_h: distance.abs() / train.speed_kmph,
            })
        })
        .collect::<Vec<_>>();

    let mut conflicts = Vec::new();
    for a in 0..trajectories.len() {
        for b in (a + 1)..trajectories.len() {
            let (ta, tb) = match (&trajectories[a], &trajectories[b]) {
                (Some(ta), Some(tb)) => (ta, tb),
                _ => continue,
            };
            if let Some(position_km) = meeting_point(ta, tb) {
                conflicts.push(Conflict {
                    id: format!("C{}", conflicts.len() + 1),
                    train_ids: [initial.trains[a].id.clone(), initial.trains[b].id.clone()],
                    position_km,
                    trains: [a, b],
                });
            }
        }
    }
    conflicts
}

fn meeting_point(a: &Trajectory, b: &Trajectory) -> Option<f64> {
    let closing_speed = a.velocity_kmph - b.velocity_kmph;
    if closing_speed.abs() < f64::EPSILON {
        // Parallel motion never meets unless the trains already share a
        // position, which is a scenario error rather than a conflict.
        return None;
    }
    let t = (b.start_km - a.start_km) / closing_speed;
    (t >= 0.0 && t <= a.duration_h.min(b.duration_h)).then(|| a.position(t))
}
