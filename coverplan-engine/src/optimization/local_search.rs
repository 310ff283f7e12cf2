use super::{greedy::Greedy, model::Problem, Solver, SolverOutput, SolverStatus};
use coverplan_structs::Result;
use coverplan_utils::improves;

/// Greedy followed by best-improvement 1-for-1 swaps.
///
/// A swap is only kept when it strictly raises the objective, so the result is
/// never worse than plain greedy.
#[derive(Debug, Clone, Copy)]
pub struct SwapSearch {
    max_iterations: usize,
}

impl SwapSearch {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Solver for SwapSearch {
    fn name(&self) -> &'static str {
        "greedy_swap_search"
    }

    fn solve(&self, problem: &Problem) -> Result<SolverOutput> {
        let start = Greedy::select(problem);
        let mut selected = start.selected;
        let mut value = problem.evaluate(&selected);
        let output = |selected: Vec<usize>, value: f64| SolverOutput {
            selected,
            value,
            status: SolverStatus::Heuristic,
            nodes_explored: 0,
        };
        // Greedy only stops short of the budget once nothing uncovered is
        // reachable, and then no swap can help.
        if selected.len() < problem.budget() {
            return Ok(output(selected, value));
        }

        let mut is_selected = vec![false; problem.num_sites()];
        for &site in &selected {
            is_selected[site] = true;
        }

        for _ in 0..self.max_iterations {
            // owner[area] is meaningful only while cover_count[area] == 1.
            let mut cover_count = vec![0u32; problem.num_areas()];
            let mut owner = vec![usize::MAX; problem.num_areas()];
            for &site in &selected {
                for &area in problem.areas_of(site) {
                    cover_count[area] += 1;
                    owner[area] = site;
                }
            }

            let mut positions: Vec<usize> = (0..selected.len()).collect();
            positions.sort_by_key(|&position| selected[position]);

            let mut best_swap: Option<(f64, usize, usize)> = None;
            for position in positions {
                let remove_site = selected[position];
                let loss = problem
                    .areas_of(remove_site)
                    .iter()
                    .filter(|&&area| cover_count[area] == 1)
                    .fold(0.0, |loss, &area| loss + problem.weight(area));

                for new_site in (0..problem.num_sites()).filter(|&site| !is_selected[site]) {
                    let gain = problem
                        .areas_of(new_site)
                        .iter()
                        .filter(|&&area| {
                            cover_count[area] == 0
                                || (cover_count[area] == 1 && owner[area] == remove_site)
                        })
                        .fold(0.0, |gain, &area| gain + problem.weight(area));
                    let delta = gain - loss;
                    if delta > best_swap.map_or(0.0, |(best_delta, _, _)| best_delta) {
                        best_swap = Some((delta, position, new_site));
                    }
                }
            }

            let Some((_, position, new_site)) = best_swap else {
                break;
            };
            let mut candidate = selected.clone();
            candidate[position] = new_site;
            let candidate_value = problem.evaluate(&candidate);
            if !improves(candidate_value, value) {
                break;
            }
            is_selected[selected[position]] = false;
            is_selected[new_site] = true;
            selected = candidate;
            value = candidate_value;
        }

        Ok(output(selected, value))
    }
}
