use log::*;

mod conflicts;
mod controller;
mod error;
mod plan;
mod plot;
mod problem;
mod raw_scenario;
mod simulation;
mod solver_genetic;
mod state;


use controller::{Controller, RunMode};
use error::{Error, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use simulation::{ConflictPolicy, DelayMeasure};
use solver_genetic::GeneticConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug)]
pub enum Mode {
    Normal,
    Optimized,
    OptimizeOnly,
    Compare,
}

impl FromStr for Mode {
    type Err = &'static str;
    fn from_str(mode: &str) -> std::result::Result<Self, Self::Err> {
        match mode {
            "normal" => Ok(Mode::Normal),
            "optimized" => Ok(Mode::Optimized),
            "optimize" => Ok(Mode::OptimizeOnly),
            "compare" => Ok(Mode::Compare),
            _ => Err("Could not parse mode."),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "trainplan", about = "Single-track conflict simulator and priority planner.")]
struct Opt {
    /// Scenario file (JSON)
    #[structopt(name = "FILE")]
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// What to do:
    /// "normal" runs the scenario without a plan, detecting conflicts.
    /// "optimized" computes a priority plan (or uses --plan) and runs with it.
    /// "optimize" only computes and prints the plan.
    /// "compare" runs normal and optimized and reports both outcomes.
    #[structopt(long, default_value = "compare")]
    mode: Mode,

    /// Seed for the optimizer. Without one, runs are not reproducible.
    #[structopt(long)]
    seed: Option<u64>,

    /// Stop a run after this many ticks even if trains are still moving.
    /// Zero reports the scenario as loaded, without ticking.
    #[structopt(long)]
    ticks: Option<u64>,

    /// Stop a run once the clock passes this many minutes.
    #[structopt(long, default_value = "300")]
    max_minutes: u64,

    /// Optimizer configuration (JSON). Command line values override it.
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(long)]
    population: Option<usize>,

    #[structopt(long)]
    generations: Option<usize>,

    #[structopt(long)]
    mutation_rate: Option<f64>,

    #[structopt(long)]
    tournament_size: Option<usize>,

    /// Carry this many best plans unchanged into each new generation.
    #[structopt(long)]
    elitism: Option<usize>,

    /// Evaluate each generation on this many threads.
    #[structopt(long)]
    threads: Option<usize>,

    /// How late an arrived train is: "run-end" charges the clock at the end
    /// of the run, "own-arrival" the minute the train arrived.
    #[structopt(long)]
    delay_measure: Option<DelayMeasure>,

    /// What an unguided tick does with trains in conflict:
    /// "freeze-world" stops every train, "halt-pair" stops only the pair.
    #[structopt(long, default_value = "freeze-world")]
    conflict_policy: ConflictPolicy,

    /// Use this plan (JSON) instead of optimizing.
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    plan: Option<PathBuf>,

    /// Write the plan JSON after optimizing.
    #[structopt(short)]
    #[structopt(parse(from_os_str))]
    planoutputfile: Option<PathBuf>,

    /// Write the final live state JSON.
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    stateoutputfile: Option<PathBuf>,

    /// Activate debug mode
    #[structopt(short, long)]
    verbose: bool,
}

impl Opt {
    fn genetic_config(&self) -> Result<GeneticConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                serde_json::from_str(&contents)?
            }
            None => GeneticConfig::default(),
        };
        if let Some(x) = self.population {
            config.population_size = x;
        }
        if let Some(x) = self.generations {
            config.generations = x;
        }
        if let Some(x) = self.mutation_rate {
            config.mutation_rate = x;
        }
        if let Some(x) = self.tournament_size {
            config.tournament_size = x;
        }
        if let Some(x) = self.elitism {
            config.elitism = x;
        }
        if let Some(x) = self.threads {
            config.threads = x;
        }
        if let Some(x) = self.delay_measure {
            config.delay_measure = x;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let _h1 = hprof::enter("init");

    let opt = Opt::from_args();
    let level = if opt.verbose {
        if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    } else {
        LevelFilter::Error
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not initialize logger: {}", e);
    }
    info!("{:#?}", opt);
    drop(_h1);

    let result = run(&opt);

    hprof::end_frame();
    if opt.verbose {
        hprof::profiler().print_timing();
    }

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("trainplan: {}", e);
        std::process::exit(1);
    }
}

fn load(opt: &Opt) -> Result<Controller> {
    let _h = hprof::enter("load scenario");
    trace!("Loading file {}", opt.file.display());
    let scenario = raw_scenario::read_scenario(&opt.file)?;
    let pristine = scenario.initial_state();
    trace!(
        "Converting scenario with {} trains {} stations",
        pristine.trains.len(),
        pristine.stations.len()
    );
    let problem = problem::Problem::new(&pristine, scenario.conflicts.as_deref())?
        .with_policy(opt.conflict_policy);
    info!(
        "Loaded {} trains, {} stations, {} conflicts",
        pristine.trains.len(),
        pristine.stations.len(),
        problem.conflicts.len()
    );
    let controller = Controller::new(problem, pristine, opt.genetic_config()?)?;

    if let Some(path) = &opt.plan {
        let plan = plan::read_plan_json(path, controller.problem())?;
        info!("Using plan from {}", path.display());
        controller.set_plan(plan)?;
    }
    Ok(controller)
}

fn run(opt: &Opt) -> Result<()> {
    let controller = load(opt)?;
    let mut rng = match opt.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    match opt.mode {
        Mode::OptimizeOnly => {
            let description = controller.optimize(&mut rng)?;
            println!("{}", description);
        }
        Mode::Normal => report(opt, &controller, RunMode::Normal, &mut rng)?,
        Mode::Optimized => report(opt, &controller, RunMode::Optimized, &mut rng)?,
        Mode::Compare => {
            report(opt, &controller, RunMode::Normal, &mut rng)?;
            report(opt, &controller, RunMode::Optimized, &mut rng)?;
        }
    }

    if let Some(f) = &opt.planoutputfile {
        match controller.plan()? {
            Some(plan) => {
                plan::write_plan_json(f, &plan, controller.problem())?;
                info!("Wrote plan to file {}", f.display());
            }
            None => warn!("No plan computed, not writing {}", f.display()),
        }
    }
    if let Some(f) = &opt.stateoutputfile {
        write_state_json(f, &controller.get_state()?)?;
        info!("Wrote state to file {}", f.display());
    }
    Ok(())
}

fn report(opt: &Opt, controller: &Controller, mode: RunMode, rng: &mut ChaCha8Rng) -> Result<()> {
    let outcome = controller.run(mode, opt.max_minutes, opt.ticks, rng, |state| {
        debug!("{}", plot::track_string(state, 60));
    })?;
    if mode == RunMode::Optimized {
        println!("{}", plan::print_plan(controller.plan()?.as_deref(), controller.problem()));
    }
    println!("{:<9} {}", format!("{:?}:", mode).to_lowercase(), outcome);
    Ok(())
}

fn write_state_json(path: &Path, state: &state::State) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json).map_err(|e| Error::io(path, e))
}
