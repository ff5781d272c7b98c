use serde::{Deserialize, Serialize};

pub type TrainId = String;
pub type StationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainStatus {
    Running,
    Halted,
    Arrived,
    Conflict,
}

impl Default for TrainStatus {
    fn default() -> Self {
        TrainStatus::Running
    }
}

impl TrainStatus {
    /// Arrived and conflicted trains are not processed by the simulation.
    pub fn is_final(self) -> bool {
        matches!(self, TrainStatus::Arrived | TrainStatus::Conflict)
    }

    pub fn symbol(self) -> char {
        match self {
            TrainStatus::Running => '>',
            TrainStatus::Halted => '=',
            TrainStatus::Arrived => '*',
            TrainStatus::Conflict => 'X',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub position_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub station_id: StationId,
    /// Time of day, "HH:MM".
    pub scheduled_arrival: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Train {
    pub id: TrainId,
    pub name: String,
    /// 1 = high, 3 = low.
    pub priority: u8,
    pub speed_kmph: f64,
    pub current_position_km: f64,
    pub status: TrainStatus,
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrived_at_minutes: Option<u64>,
}

impl Train {
    pub fn has_arrived(&self) -> bool {
        self.status == TrainStatus::Arrived
    }
}

/// A snapshot of the world. Cloning it is the deep copy used for
/// resets and fitness evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub trains: Vec<Train>,
    pub stations: Vec<Station>,
    pub simulation_time_minutes: u64,
}

impl State {
    pub fn train_index(&self, id: &str) -> Option<usize> {
        self.trains.iter().position(|t| t.id == id)
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn all_arrived(&self) -> bool {
        self.trains.iter().all(Train::has_arrived)
    }

    pub fn count_status(&self, status: TrainStatus) -> usize {
        self.trains.iter().filter(|t| t.status == status).count()
    }

    /// True when no train will change status or position again under an
    /// unguided run.
    pub fn is_settled(&self) -> bool {
        self.trains.iter().all(|t| t.status.is_final())
    }
}
