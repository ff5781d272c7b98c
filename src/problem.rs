use crate::conflicts::identify_conflicts;
use crate::error::{Error, Result};
use crate::raw_scenario::RawConflict;
use crate::simulation::ConflictPolicy;
use crate::state::{State, StationId, TrainId};
use log::*;
use std::collections::HashSet;

/// A location shared by exactly two trains.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub train_ids: [TrainId; 2],
    pub position_km: f64,
    /// Indices of `train_ids` in the train list of the pristine state.
    #[serde(skip)]
    pub trains: [usize; 2],
}

impl Conflict {
    /// The train that is not `train`. Only meaningful for members.
    pub fn other(&self, train: usize) -> usize {
        if self.trains[0] == train {
            self.trains[1]
        } else {
            self.trains[0]
        }
    }

    pub fn involves(&self, train: usize) -> bool {
        self.trains.contains(&train)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub station: StationId,
    pub position_km: f64,
    pub scheduled_arrival_minutes: u64,
}

/// Everything about a scenario that does not change while it is simulated:
/// where each train is headed, when it is due, and the conflict registry.
///
/// Every state simulated against a `Problem` must be a copy of the pristine
/// state it was built from, since trains are addressed by index.
#[derive(Debug, Clone)]
pub struct Problem {
    pub destinations: Vec<Destination>,
    pub conflicts: Vec<Conflict>,
    pub policy: ConflictPolicy,
}

impl Problem {
    /// Validates the pristine state and builds the conflict registry, either
    /// from the listed conflicts or by deriving it from the trajectories.
    pub fn new(initial: &State, listed_conflicts: Option<&[RawConflict]>) -> Result<Problem> {
        check_unique("train", initial.trains.iter().map(|t| t.id.as_str()))?;
        check_unique("station", initial.stations.iter().map(|s| s.id.as_str()))?;
        for station in initial.stations.iter() {
            check_position("station", &station.id, station.position_km)?;
        }

        let mut destinations = Vec::with_capacity(initial.trains.len());
        for train in initial.trains.iter() {
            if !(train.speed_kmph.is_finite() && train.speed_kmph > 0.0) {
                return Err(Error::InvalidSpeed {
                    train: train.id.clone(),
                    speed: train.speed_kmph,
                });
            }
            check_position("train", &train.id, train.current_position_km)?;

            for entry in train.schedule.iter() {
                if initial.station(&entry.station_id).is_none() {
                    return Err(Error::UnknownStation {
                        train: train.id.clone(),
                        station: entry.station_id.clone(),
                    });
                }
            }

            let last = train.schedule.last().ok_or_else(|| Error::EmptySchedule {
                train: train.id.clone(),
            })?;
            let station = initial
                .station(&last.station_id)
                .ok_or_else(|| Error::UnknownStation {
                    train: train.id.clone(),
                    station: last.station_id.clone(),
                })?;
            let scheduled_arrival_minutes =
                parse_clock(&last.scheduled_arrival).ok_or_else(|| Error::InvalidTime {
                    train: train.id.clone(),
                    value: last.scheduled_arrival.clone(),
                })?;

            destinations.push(Destination {
                station: station.id.clone(),
                position_km: station.position_km,
                scheduled_arrival_minutes,
            });
        }

        let conflicts = match listed_conflicts {
            Some(listed) => listed
                .iter()
                .map(|c| resolve_conflict(initial, c))
                .collect::<Result<Vec<_>>>()?,
            None => {
                let derived = identify_conflicts(initial, &destinations);
                debug!("Derived {} conflicts from trajectories", derived.len());
                derived
            }
        };
        check_unique("conflict", conflicts.iter().map(|c| c.id.as_str()))?;

        for c in conflicts.iter() {
            trace!(
                "Conflict {} at {:.1} km between {} and {}",
                c.id,
                c.position_km,
                c.train_ids[0],
                c.train_ids[1]
            );
        }

        Ok(Problem {
            destinations,
            conflicts,
            policy: ConflictPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Problem {
        self.policy = policy;
        self
    }

    pub fn num_trains(&self) -> usize {
        self.destinations.len()
    }

    pub fn conflict_index(&self, id: &str) -> Option<usize> {
        self.conflicts.iter().position(|c| c.id == id)
    }
}

fn resolve_conflict(state: &State, raw: &RawConflict) -> Result<Conflict> {
    let distinct = raw.train_ids.iter().collect::<HashSet<_>>().len();
    if raw.train_ids.len() != 2 || distinct != 2 {
        return Err(Error::ConflictArity {
            conflict: raw.id.clone(),
            count: raw.train_ids.len().min(distinct),
        });
    }

    let lookup = |id: &String| {
        state.train_index(id).ok_or_else(|| Error::UnknownTrain {
            conflict: raw.id.clone(),
            train: id.clone(),
        })
    };
    let a = lookup(&raw.train_ids[0])?;
    let b = lookup(&raw.train_ids[1])?;
    check_position("conflict", &raw.id, raw.position_km)?;

    Ok(Conflict {
        id: raw.id.clone(),
        train_ids: [raw.train_ids[0].clone(), raw.train_ids[1].clone()],
        position_km: raw.position_km,
        trains: [a, b],
    })
}

fn check_unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn check_position(kind: &'static str, id: &str, position: f64) -> Result<()> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidPosition {
            kind,
            id: id.to_string(),
            position,
        })
    }
}

/// Parses a "HH:MM" time of day into minutes since midnight.
pub fn parse_clock(value: &str) -> Option<u64> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}
