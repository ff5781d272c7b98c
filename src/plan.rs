use crate::error::{Error, Result};
use crate::problem::Problem;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

/// One priority decision per registered conflict, in registry order.
/// `priority[i]` is the index of the train that may pass at conflict `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub priority: Vec<usize>,
    /// `None` until the plan has been simulated.
    pub fitness: Option<f64>,
}

impl Plan {
    pub fn new(priority: Vec<usize>) -> Plan {
        Plan {
            priority,
            fitness: None,
        }
    }

    /// The plan for a scenario without conflicts.
    pub fn empty() -> Plan {
        Plan::new(Vec::new())
    }

    pub fn fitness_or_min(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }

    /// Every decision must name one of its conflict's two trains.
    pub fn check(&self, problem: &Problem) -> Result<()> {
        if self.priority.len() != problem.conflicts.len() {
            return Err(Error::PlanMismatch {
                expected: problem.conflicts.len(),
                got: self.priority.len(),
            });
        }
        for (conflict, train) in problem.conflicts.iter().zip(self.priority.iter()) {
            if !conflict.involves(*train) {
                return Err(Error::InvalidDecision {
                    conflict: conflict.id.clone(),
                    train: format!("#{}", train),
                });
            }
        }
        Ok(())
    }

    /// `(conflict id, priority train id)` in registry order.
    pub fn decisions<'a>(&'a self, problem: &'a Problem) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        problem.conflicts.iter().zip(self.priority.iter()).map(move |(c, t)| {
            let slot = if c.trains[0] == *t { 0 } else { 1 };
            (c.id.as_str(), c.train_ids[slot].as_str())
        })
    }

    /// Builds a plan from a conflict id to train id mapping. Every registered
    /// conflict needs a decision naming one of its trains.
    pub fn from_decisions(problem: &Problem, decisions: &HashMap<String, String>) -> Result<Plan> {
        let mut priority = Vec::with_capacity(problem.conflicts.len());
        for conflict in problem.conflicts.iter() {
            let chosen = decisions.get(&conflict.id).ok_or_else(|| Error::MissingDecision {
                conflict: conflict.id.clone(),
            })?;
            let slot = conflict
                .train_ids
                .iter()
                .position(|id| id == chosen)
                .ok_or_else(|| Error::InvalidDecision {
                    conflict: conflict.id.clone(),
                    train: chosen.clone(),
                })?;
            priority.push(conflict.trains[slot]);
        }
        if let Some(unknown) = decisions.keys().find(|id| problem.conflict_index(id).is_none()) {
            log::warn!("Ignoring decision for unknown conflict {}", unknown);
        }
        Ok(Plan::new(priority))
    }
}

pub fn write_plan_json(filename: &Path, plan: &Plan, problem: &Problem) -> Result<()> {
    let contents = serde_json::to_string_pretty(&plan_json(plan, problem))?;
    std::fs::write(filename, contents).map_err(|e| Error::io(filename, e))?;
    Ok(())
}

fn plan_json(plan: &Plan, problem: &Problem) -> serde_json::Value {
    let decisions = plan
        .decisions(problem)
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect::<BTreeMap<String, String>>();
    json!({ "fitness": plan.fitness, "decisions": decisions })
}

#[derive(serde::Deserialize)]
struct PlanFile {
    #[serde(default)]
    fitness: Option<f64>,
    decisions: HashMap<String, String>,
}

pub fn read_plan_json(filename: &Path, problem: &Problem) -> Result<Plan> {
    let contents = std::fs::read_to_string(filename).map_err(|e| Error::io(filename, e))?;
    let file: PlanFile = serde_json::from_str(&contents)?;
    let mut plan = Plan::from_decisions(problem, &file.decisions)?;
    plan.fitness = file.fitness;
    Ok(plan)
}

/// Human-readable plan, one line per conflict decision.
pub fn print_plan(plan: Option<&Plan>, problem: &Problem) -> String {
    let plan = match plan {
        Some(plan) => plan,
        None => return "No plan available: the optimizer has not found one.".to_string(),
    };

    let mut summary = match plan.fitness {
        Some(fitness) => format!("Optimal plan (fitness {:.2}):", fitness),
        None => "Plan (not evaluated):".to_string(),
    };
    if plan.priority.is_empty() {
        summary.push_str("\n  No conflicts to resolve.");
    }
    for (conflict, train) in plan.decisions(problem) {
        summary.push_str(&format!("\n  At conflict {}, give priority to train {}.", conflict, train));
    }
    summary
}
