use crate::error::{Error, Result};
use crate::plan::{print_plan, Plan};
use crate::problem::Problem;
use crate::simulation::{step, Outcome};
use crate::solver_genetic::{optimize, GeneticConfig};
use crate::state::State;
use log::*;
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Tick without a plan.
    Normal,
    /// Optimize, then tick with the resulting plan.
    Optimized,
}

/// Owns the live simulation. The pristine state and the problem are shared
/// read-only; the live state is only touched while holding its lock, and the
/// retained plan is swapped as a whole.
pub struct Controller {
    problem: Arc<Problem>,
    pristine: Arc<State>,
    live: Mutex<State>,
    plan: RwLock<Option<Arc<Plan>>>,
    config: GeneticConfig,
}

impl Controller {
    pub fn new(problem: Problem, pristine: State, config: GeneticConfig) -> Result<Controller> {
        if pristine.trains.len() != problem.num_trains() {
            return Err(Error::StateMismatch {
                expected: problem.num_trains(),
                got: pristine.trains.len(),
            });
        }
        config.validate()?;
        Ok(Controller {
            live: Mutex::new(pristine.clone()),
            problem: Arc::new(problem),
            pristine: Arc::new(pristine),
            plan: RwLock::new(None),
            config,
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    fn live(&self) -> Result<MutexGuard<'_, State>> {
        self.live.lock().map_err(|_| Error::Poisoned)
    }

    pub fn plan(&self) -> Result<Option<Arc<Plan>>> {
        Ok(self.plan.read().map_err(|_| Error::Poisoned)?.clone())
    }

    /// Replaces the retained plan, e.g. with one read from a file.
    pub fn set_plan(&self, plan: Plan) -> Result<()> {
        plan.check(&self.problem)?;
        *self.plan.write().map_err(|_| Error::Poisoned)? = Some(Arc::new(plan));
        Ok(())
    }

    pub fn get_state(&self) -> Result<State> {
        Ok(self.live()?.clone())
    }

    pub fn tick_normal(&self) -> Result<State> {
        let mut live = self.live()?;
        step(&self.problem, &mut live, None)?;
        Ok(live.clone())
    }

    /// Ticks with the last computed plan, or without one if the optimizer
    /// has not run yet.
    pub fn tick_optimized(&self) -> Result<State> {
        let plan = self.plan()?;
        let mut live = self.live()?;
        step(&self.problem, &mut live, plan.as_deref())?;
        Ok(live.clone())
    }

    /// Restores the pristine state. The retained plan is kept.
    pub fn reset(&self) -> Result<State> {
        let mut live = self.live()?;
        *live = (*self.pristine).clone();
        debug!("Live state reset");
        Ok(live.clone())
    }

    /// Runs the optimizer against the pristine state, retains the result and
    /// describes it. The live state is not touched. When the optimizer finds
    /// no plan, none is retained.
    pub fn optimize<R: Rng>(&self, rng: &mut R) -> Result<String> {
        let plan = optimize(&self.problem, &self.pristine, &self.config, rng)?;
        let description = print_plan(plan.as_ref(), &self.problem);
        *self.plan.write().map_err(|_| Error::Poisoned)? = plan.map(Arc::new);
        Ok(description)
    }

    /// Resets, then ticks until every train has arrived or is in conflict,
    /// the clock passes `max_minutes`, or `max_ticks` ticks are done. With
    /// `max_ticks` of zero the outcome is that of the pristine state. In
    /// optimized mode a plan is computed first unless one is already
    /// retained.
    pub fn run<R: Rng>(
        &self,
        mode: RunMode,
        max_minutes: u64,
        max_ticks: Option<u64>,
        rng: &mut R,
        mut on_tick: impl FnMut(&State),
    ) -> Result<Outcome> {
        let _h = hprof::enter("run");
        if mode == RunMode::Optimized && self.plan()?.is_none() {
            let description = self.optimize(rng)?;
            info!("{}", description);
        }

        let mut state = self.reset()?;
        let mut ticks = 0;
        while max_ticks.map_or(true, |max| ticks < max) {
            state = match mode {
                RunMode::Normal => self.tick_normal()?,
                RunMode::Optimized => self.tick_optimized()?,
            };
            ticks += 1;
            on_tick(&state);
            if state.is_settled() || state.simulation_time_minutes > max_minutes {
                break;
            }
        }
        Ok(Outcome::of(&self.problem, &state, self.config.delay_measure))
    }
}
