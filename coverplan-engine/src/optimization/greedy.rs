use super::{model::Problem, Solver, SolverOutput, SolverStatus};
use coverplan_structs::Result;
use std::{cmp::Ordering, collections::BinaryHeap};

/// Weight of the areas `site` would newly cover.
pub(crate) fn marginal_gain(problem: &Problem, covered: &[bool], site: usize) -> f64 {
    problem
        .areas_of(site)
        .iter()
        .filter(|&&area| !covered[area])
        .fold(0.0, |gain, &area| gain + problem.weight(area))
}

// Heap entry. `round` records how many sites were selected when `gain` was
// computed; gains only shrink as coverage grows, so an old gain is an upper
// bound on the current one.
struct Candidate {
    gain: f64,
    site: usize,
    round: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.site.cmp(&self.site))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Candidate {}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Marginal-gain greedy with lazy re-evaluation.
///
/// Picks the same sites, in the same order, as re-scoring every candidate each
/// round and taking the largest gain (smallest site id on ties). Stops at the
/// budget or when no candidate adds positive weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl Greedy {
    pub fn select(problem: &Problem) -> SolverOutput {
        let mut covered = vec![false; problem.num_areas()];
        let mut heap: BinaryHeap<Candidate> = (0..problem.num_sites())
            .map(|site| Candidate {
                gain: marginal_gain(problem, &covered, site),
                site,
                round: 0,
            })
            .collect();

        let mut selected = Vec::with_capacity(problem.budget().min(problem.num_sites()));
        let mut value = 0.0;
        while selected.len() < problem.budget() {
            let Some(top) = heap.pop() else {
                break;
            };
            let round = selected.len();
            if top.round != round {
                heap.push(Candidate {
                    gain: marginal_gain(problem, &covered, top.site),
                    site: top.site,
                    round,
                });
                continue;
            }
            if top.gain <= 0.0 {
                break;
            }
            for &area in problem.areas_of(top.site) {
                covered[area] = true;
            }
            value += top.gain;
            selected.push(top.site);
        }

        SolverOutput {
            selected,
            value,
            status: SolverStatus::Heuristic,
            nodes_explored: 0,
        }
    }
}

impl Solver for Greedy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn solve(&self, problem: &Problem) -> Result<SolverOutput> {
        Ok(Self::select(problem))
    }
}
