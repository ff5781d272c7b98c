use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::problem::Problem;
use crate::simulation::{arrival_delay, run_to_horizon, DelayMeasure};
use crate::state::State;
use log::*;
use rand::Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// Score for every train that reaches its destination within the horizon.
pub const ARRIVAL_REWARD: f64 = 1000.0;
/// Penalty, in delay minutes, for every train that has not arrived at the
/// horizon, whatever its status.
pub const UNARRIVED_PENALTY: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneticConfig {
    /// An empty population searches nothing; `optimize` then finds no plan.
    pub population_size: usize,
    pub generations: usize,
    /// Per-gene probability of flipping the decision to the other train.
    pub mutation_rate: f64,
    pub tournament_size: usize,
    /// Per-gene probability that a child inherits the first parent's
    /// decision.
    pub crossover_rate: f64,
    /// Simulated minutes each candidate plan is run for.
    pub horizon_minutes: u64,
    /// Number of best individuals copied unchanged into the next generation.
    pub elitism: usize,
    /// Worker threads used to evaluate a generation.
    pub threads: usize,
    pub delay_measure: DelayMeasure,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        GeneticConfig {
            population_size: 50,
            generations: 30,
            mutation_rate: 0.1,
            tournament_size: 5,
            crossover_rate: 0.5,
            horizon_minutes: 240,
            elitism: 0,
            threads: 1,
            delay_measure: DelayMeasure::RunEnd,
        }
    }
}

impl GeneticConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if self.tournament_size == 0 {
            return invalid("tournament size must be at least 1".to_string());
        }
        if self.threads == 0 {
            return invalid("at least one worker thread is needed".to_string());
        }
        for (name, p) in [("mutation rate", self.mutation_rate), ("crossover rate", self.crossover_rate)] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("{} must be within [0, 1] (got {})", name, p));
            }
        }
        if self.elitism > self.population_size {
            return invalid(format!(
                "elitism {} exceeds population size {}",
                self.elitism, self.population_size
            ));
        }
        Ok(())
    }
}

/// `1000 * arrived - (delay of arrived trains + 1000 * unarrived trains)`.
/// Never exceeds `1000 * number of trains`.
pub fn score(problem: &Problem, state: &State, measure: DelayMeasure) -> f64 {
    let arrived = state.trains.iter().filter(|t| t.has_arrived()).count();
    let unarrived = (state.trains.len() - arrived) as u64;
    let total_delay = arrival_delay(problem, state, measure) + UNARRIVED_PENALTY * unarrived;
    ARRIVAL_REWARD * arrived as f64 - total_delay as f64
}

/// Simulates `plan` on a private copy of the pristine state.
pub fn fitness(problem: &Problem, pristine: &State, plan: &Plan, config: &GeneticConfig) -> Result<f64> {
    let mut state = pristine.clone();
    run_to_horizon(problem, &mut state, Some(plan), config.horizon_minutes)?;
    Ok(score(problem, &state, config.delay_measure))
}

/// Searches for the priority plan with the highest fitness. The returned plan
/// is the best of the final generation and carries its fitness. With an
/// empty population there is nothing to pick from and no plan is returned.
pub fn optimize<R: Rng>(
    problem: &Problem,
    pristine: &State,
    config: &GeneticConfig,
    rng: &mut R,
) -> Result<Option<Plan>> {
    config.validate()?;

    if problem.conflicts.is_empty() {
        let mut plan = Plan::empty();
        plan.fitness = Some(fitness(problem, pristine, &plan, config)?);
        info!("No conflicts to resolve (fitness {:.2})", plan.fitness_or_min());
        return Ok(Some(plan));
    }

    if config.population_size == 0 {
        warn!("Population is empty, no plan for {} conflicts", problem.conflicts.len());
        return Ok(None);
    }

    info!(
        "Optimizing {} conflicts: population {}, {} generations",
        problem.conflicts.len(),
        config.population_size,
        config.generations
    );

    let pool = match config.threads {
        1 => None,
        n => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
    };

    let mut population = initial_population(problem, config.population_size, rng);
    for generation in 0..config.generations {
        let _h = hprof::enter("generation");
        evaluate(problem, pristine, config, pool.as_ref(), &mut population)?;
        if log_enabled!(Level::Debug) {
            let mean = population.iter().map(Plan::fitness_or_min).sum::<f64>() / population.len() as f64;
            debug!(
                "Generation {}: best {:.2} mean {:.2}",
                generation,
                best_of(&population).map_or(f64::NEG_INFINITY, Plan::fitness_or_min),
                mean
            );
        }
        population = next_generation(problem, config, &population, rng);
    }

    evaluate(problem, pristine, config, pool.as_ref(), &mut population)?;
    let best = best_of(&population).cloned();
    if let Some(best) = &best {
        info!("Best plan fitness {:.2}", best.fitness_or_min());
    }
    Ok(best)
}

fn initial_population<R: Rng>(problem: &Problem, size: usize, rng: &mut R) -> Vec<Plan> {
    (0..size)
        .map(|_| {
            Plan::new(
                problem
                    .conflicts
                    .iter()
                    .map(|c| c.trains[rng.gen_range(0..2)])
                    .collect(),
            )
        })
        .collect()
}

/// Fills in the fitness of every plan that has none, on `pool` when given.
/// Every result is in before this returns, so the outcome does not depend on
/// the thread count.
fn evaluate(
    problem: &Problem,
    pristine: &State,
    config: &GeneticConfig,
    pool: Option<&ThreadPool>,
    population: &mut [Plan],
) -> Result<()> {
    let evaluate_one = |plan: &mut Plan| -> Result<()> {
        plan.fitness = Some(fitness(problem, pristine, plan, config)?);
        Ok(())
    };

    match pool {
        None => population
            .iter_mut()
            .filter(|p| p.fitness.is_none())
            .try_for_each(evaluate_one),
        Some(pool) => pool.install(|| {
            population
                .par_iter_mut()
                .filter(|p| p.fitness.is_none())
                .try_for_each(evaluate_one)
        }),
    }
}

fn next_generation<R: Rng>(problem: &Problem, config: &GeneticConfig, population: &[Plan], rng: &mut R) -> Vec<Plan> {
    let mut next = Vec::with_capacity(config.population_size);
    if population.is_empty() {
        return next;
    }

    if config.elitism > 0 {
        let mut ranked = population.iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.fitness_or_min().total_cmp(&a.fitness_or_min()));
        next.extend(ranked.into_iter().take(config.elitism).cloned());
    }

    while next.len() < config.population_size {
        let parent1 = tournament(population, config.tournament_size, rng);
        let parent2 = tournament(population, config.tournament_size, rng);
        let mut child = crossover(parent1, parent2, config.crossover_rate, rng);
        mutate(problem, &mut child, config.mutation_rate, rng);
        next.push(child);
    }
    next
}

/// Best of `size` individuals drawn with replacement. Ties go to the
/// earliest draw. `population` must not be empty.
fn tournament<'a, R: Rng>(population: &'a [Plan], size: usize, rng: &mut R) -> &'a Plan {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..size {
        let candidate = &population[rng.gen_range(0..population.len())];
        if candidate.fitness_or_min() > best.fitness_or_min() {
            best = candidate;
        }
    }
    best
}

fn crossover<R: Rng>(parent1: &Plan, parent2: &Plan, rate: f64, rng: &mut R) -> Plan {
    Plan::new(
        parent1
            .priority
            .iter()
            .zip(parent2.priority.iter())
            .map(|(a, b)| if rng.gen_bool(rate) { *a } else { *b })
            .collect(),
    )
}

fn mutate<R: Rng>(problem: &Problem, plan: &mut Plan, rate: f64, rng: &mut R) {
    for (conflict, priority) in problem.conflicts.iter().zip(plan.priority.iter_mut()) {
        if rng.gen_bool(rate) {
            *priority = conflict.other(*priority);
        }
    }
}

/// First individual with the highest fitness.
fn best_of(population: &[Plan]) -> Option<&Plan> {
    let mut best: Option<&Plan> = None;
    for p in population {
        if best.map_or(true, |b| p.fitness_or_min() > b.fitness_or_min()) {
            best = Some(p);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::two_train_problem;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn operators_keep_genes_within_conflict() {
        let (problem, _) = two_train_problem();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let population = initial_population(&problem, 20, &mut rng);
        for _ in 0..50 {
            let a = tournament(&population, 3, &mut rng);
            let b = tournament(&population, 3, &mut rng);
            let mut child = crossover(a, b, 0.5, &mut rng);
            mutate(&problem, &mut child, 0.9, &mut rng);
            assert!(child.check(&problem).is_ok());
        }
    }

    #[test]
    fn tournament_prefers_fitter() {
        let mut weak = Plan::new(vec![1]);
        weak.fitness = Some(-10.0);
        let mut strong = Plan::new(vec![0]);
        strong.fitness = Some(10.0);
        let population = vec![weak, strong];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // With 30 draws from two individuals, the strong one is drawn.
        assert_eq!(tournament(&population, 30, &mut rng).priority, vec![0]);
    }

    #[test]
    fn mutation_rate_bounds() {
        let (problem, _) = two_train_problem();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut plan = Plan::new(vec![0]);
        mutate(&problem, &mut plan, 1.0, &mut rng);
        assert_eq!(plan.priority, vec![1]);
        mutate(&problem, &mut plan, 0.0, &mut rng);
        assert_eq!(plan.priority, vec![1]);
    }

    #[test]
    fn best_of_keeps_first_on_ties() {
        let mut a = Plan::new(vec![0]);
        a.fitness = Some(5.0);
        let mut b = Plan::new(vec![1]);
        b.fitness = Some(5.0);
        assert_eq!(best_of(&[a, b]).unwrap().priority, vec![0]);
        assert!(best_of(&[]).is_none());
    }

    #[test]
    fn config_validation() {
        assert!(GeneticConfig::default().validate().is_ok());
        let empty = GeneticConfig {
            population_size: 0,
            elitism: 0,
            ..Default::default()
        };
        assert!(empty.validate().is_ok());
        let bad = [
            GeneticConfig { tournament_size: 0, ..Default::default() },
            GeneticConfig { mutation_rate: 1.5, ..Default::default() },
            GeneticConfig { elitism: 51, ..Default::default() },
            GeneticConfig { threads: 0, ..Default::default() },
        ];
        for config in bad.iter() {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn parallel_evaluation_matches_sequential() {
        let (problem, state) = two_train_problem();
        let config = GeneticConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut sequential = initial_population(&problem, 16, &mut rng);
        let mut parallel = sequential.clone();

        evaluate(&problem, &state, &config, None, &mut sequential).unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        evaluate(&problem, &state, &config, Some(&pool), &mut parallel).unwrap();
        assert_eq!(sequential, parallel);
        assert!(parallel.iter().all(|p| p.fitness.is_some()));
    }
}
