use crate::error::{Error, Result};
use crate::state::{ScheduleEntry, State, Station, Train, TrainStatus};
use serde::Deserialize;
use std::path::Path;

/// Scenario file as written by hand or exported by the dispatcher UI.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub trains: Vec<RawTrain>,
    pub stations: Vec<Station>,
    #[serde(default)]
    pub simulation_time_minutes: u64,
    /// When absent the conflict registry is derived from the trajectories.
    #[serde(default)]
    pub conflicts: Option<Vec<RawConflict>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RawTrain {
    pub id: String,
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub speed_kmph: f64,
    pub current_position_km: f64,
    /// Usually omitted; trains start out running.
    #[serde(default)]
    pub status: Option<TrainStatus>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawConflict {
    pub id: String,
    pub train_ids: Vec<String>,
    pub position_km: f64,
}

fn default_priority() -> u8 {
    2
}

pub fn read_scenario(path: &Path) -> Result<Scenario> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_scenario(&contents)
}

pub fn parse_scenario(json: &str) -> Result<Scenario> {
    Ok(serde_json::from_str(json)?)
}

impl Scenario {
    /// The pristine world state. The clock always starts at zero, whatever
    /// the file says.
    pub fn initial_state(&self) -> State {
        if self.simulation_time_minutes != 0 {
            log::warn!(
                "Scenario clock starts at {} minutes, resetting to 0",
                self.simulation_time_minutes
            );
        }
        State {
            trains: self
                .trains
                .iter()
                .map(|t| Train {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    priority: t.priority,
                    speed_kmph: t.speed_kmph,
                    current_position_km: t.current_position_km,
                    status: t.status.unwrap_or_default(),
                    schedule: t.schedule.clone(),
                    arrived_at_minutes: None,
                })
                .collect(),
            stations: self.stations.clone(),
            simulation_time_minutes: 0,
        }
    }
}
