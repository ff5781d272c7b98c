use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::problem::{Conflict, Problem};
use crate::state::{State, TrainStatus};
use log::*;
use std::fmt;
use std::str::FromStr;

/// One tick is one simulated minute.
pub const TIME_STEP_H: f64 = 1.0 / 60.0;
/// A train closer than this to its destination has arrived.
pub const ARRIVAL_EPSILON_KM: f64 = 1.0;
/// Under a plan, both trains closer than this to a conflict point trigger
/// the priority decision.
pub const PLAN_NEAR_KM: f64 = 10.0;
/// Without a plan, two trains of a conflict closer than this to each other
/// are in conflict.
pub const CONFLICT_DISTANCE_KM: f64 = 5.0;

/// What an unguided tick does once it finds two trains of a conflict too
/// close to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Mark the pair CONFLICT and end the tick for every train. Since the
    /// pair stays in range, the whole network stays frozen from then on.
    FreezeWorld,
    /// Mark every pair in range CONFLICT and let all other trains move on.
    HaltPair,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::FreezeWorld
    }
}

impl FromStr for ConflictPolicy {
    type Err = &'static str;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "freeze-world" => Ok(ConflictPolicy::FreezeWorld),
            "halt-pair" => Ok(ConflictPolicy::HaltPair),
            _ => Err("Could not parse conflict policy (expected freeze-world or halt-pair)."),
        }
    }
}

/// Which clock an arrived train's lateness is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelayMeasure {
    /// Every arrived train is charged the clock at the end of the run.
    RunEnd,
    /// Every arrived train is charged the minute it arrived.
    OwnArrival,
}

impl Default for DelayMeasure {
    fn default() -> Self {
        DelayMeasure::RunEnd
    }
}

impl FromStr for DelayMeasure {
    type Err = &'static str;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "run-end" => Ok(DelayMeasure::RunEnd),
            "own-arrival" => Ok(DelayMeasure::OwnArrival),
            _ => Err("Could not parse delay measure (expected run-end or own-arrival)."),
        }
    }
}

enum Flow {
    Continue,
    EndTick,
}

/// Advances `state` by one tick. With a plan, the non-priority train of
/// every conflict whose two trains are both near the conflict point is
/// halted. Without a plan, conflicts are detected and handled according to
/// the problem's [`ConflictPolicy`].
pub fn step(problem: &Problem, state: &mut State, plan: Option<&Plan>) -> Result<()> {
    if state.trains.len() != problem.num_trains() {
        return Err(Error::StateMismatch {
            expected: problem.num_trains(),
            got: state.trains.len(),
        });
    }
    if let Some(plan) = plan {
        plan.check(problem)?;
    }

    state.simulation_time_minutes += 1;
    let now = state.simulation_time_minutes;

    for idx in 0..state.trains.len() {
        if state.trains[idx].status.is_final() {
            continue;
        }

        let destination_km = problem.destinations[idx].position_km;
        {
            let train = &mut state.trains[idx];
            if (train.current_position_km - destination_km).abs() < ARRIVAL_EPSILON_KM {
                debug!("t={} train {} arrived at {}", now, train.id, problem.destinations[idx].station);
                train.status = TrainStatus::Arrived;
                train.arrived_at_minutes = Some(now);
                continue;
            }
            train.status = TrainStatus::Running;
        }

        match plan {
            Some(plan) => apply_plan(problem, state, plan),
            None => {
                if let Flow::EndTick = detect_conflicts(problem, state) {
                    return Ok(());
                }
            }
        }

        let train = &mut state.trains[idx];
        if train.status == TrainStatus::Running {
            let distance = train.speed_kmph * TIME_STEP_H;
            if train.current_position_km < destination_km {
                train.current_position_km += distance;
            } else {
                train.current_position_km -= distance;
            }
        }
    }

    Ok(())
}

fn is_near(state: &State, train: usize, conflict: &Conflict) -> bool {
    let train = &state.trains[train];
    (train.current_position_km - conflict.position_km).abs() < PLAN_NEAR_KM && !train.has_arrived()
}

fn apply_plan(problem: &Problem, state: &mut State, plan: &Plan) {
    for (conflict, priority) in problem.conflicts.iter().zip(plan.priority.iter()) {
        let [a, b] = conflict.trains;
        if is_near(state, a, conflict) && is_near(state, b, conflict) {
            let halted = conflict.other(*priority);
            trace!(
                "t={} conflict {}: {} has priority, halting {}",
                state.simulation_time_minutes,
                conflict.id,
                state.trains[*priority].id,
                state.trains[halted].id
            );
            state.trains[halted].status = TrainStatus::Halted;
        }
    }
}

fn detect_conflicts(problem: &Problem, state: &mut State) -> Flow {
    for conflict in problem.conflicts.iter() {
        let [a, b] = conflict.trains;
        // A train that has arrived has left the line.
        if state.trains[a].has_arrived() || state.trains[b].has_arrived() {
            continue;
        }
        let separation = (state.trains[a].current_position_km - state.trains[b].current_position_km).abs();
        if separation < CONFLICT_DISTANCE_KM {
            if state.trains[a].status != TrainStatus::Conflict || state.trains[b].status != TrainStatus::Conflict {
                info!(
                    "t={} conflict {}: trains {} and {} are {:.2} km apart",
                    state.simulation_time_minutes, conflict.id, state.trains[a].id, state.trains[b].id, separation
                );
            }
            state.trains[a].status = TrainStatus::Conflict;
            state.trains[b].status = TrainStatus::Conflict;
            if problem.policy == ConflictPolicy::FreezeWorld {
                return Flow::EndTick;
            }
        }
    }
    Flow::Continue
}

/// Steps until every train has arrived or the clock reaches
/// `horizon_minutes`.
pub fn run_to_horizon(problem: &Problem, state: &mut State, plan: Option<&Plan>, horizon_minutes: u64) -> Result<()> {
    while state.simulation_time_minutes < horizon_minutes {
        step(problem, state, plan)?;
        if state.all_arrived() {
            break;
        }
    }
    Ok(())
}

/// Sum over arrived trains of the minutes they are late, by `measure`.
pub fn arrival_delay(problem: &Problem, state: &State, measure: DelayMeasure) -> u64 {
    state
        .trains
        .iter()
        .zip(problem.destinations.iter())
        .filter(|(train, _)| train.has_arrived())
        .map(|(train, dest)| {
            let at = match measure {
                DelayMeasure::RunEnd => state.simulation_time_minutes,
                DelayMeasure::OwnArrival => train.arrived_at_minutes.unwrap_or(state.simulation_time_minutes),
            };
            at.saturating_sub(dest.scheduled_arrival_minutes)
        })
        .sum()
}

/// Summary of a finished (or abandoned) run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub arrived: usize,
    pub in_conflict: usize,
    pub halted: usize,
    pub running: usize,
    pub total_delay_minutes: u64,
    pub finished_at_minutes: u64,
}

impl Outcome {
    pub fn of(problem: &Problem, state: &State, measure: DelayMeasure) -> Outcome {
        Outcome {
            arrived: state.count_status(TrainStatus::Arrived),
            in_conflict: state.count_status(TrainStatus::Conflict),
            halted: state.count_status(TrainStatus::Halted),
            running: state.count_status(TrainStatus::Running),
            total_delay_minutes: arrival_delay(problem, state, measure),
            finished_at_minutes: state.simulation_time_minutes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:02}:{:02}  arrived {}  conflict {}  halted {}  running {}  delay {} min",
            self.finished_at_minutes / 60,
            self.finished_at_minutes % 60,
            self.arrived,
            self.in_conflict,
            self.halted,
            self.running,
            self.total_delay_minutes
        )
    }
}
