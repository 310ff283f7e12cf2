use super::{
    greedy::{marginal_gain, Greedy},
    model::Problem,
    FallbackReason, Solver, SolverOutput, SolverStatus,
};
use coverplan_structs::{config::SolveLimits, Result};
use coverplan_utils::improves;
use std::time::Instant;
use tracing::debug;

const TIME_CHECK_INTERVAL: u64 = 256;

#[derive(Clone, Debug)]
struct Node {
    level: usize,
    selected: Vec<usize>,
    value: f64,
}

/// Depth-first branch-and-bound over the binary site variables.
///
/// Each node fixes the decision for one more site in branching order. The
/// bound adds the `budget - |selected|` largest marginal gains of the undecided
/// sites to the node value, which is valid because weighted coverage is
/// submodular. The greedy selection seeds the incumbent.
#[derive(Debug, Clone, Copy)]
pub struct BranchAndBound {
    limits: SolveLimits,
}

impl BranchAndBound {
    pub fn new(limits: SolveLimits) -> Self {
        Self { limits }
    }

    fn covered(problem: &Problem, selected: &[usize]) -> Vec<bool> {
        let mut covered = vec![false; problem.num_areas()];
        for &site in selected {
            for &area in problem.areas_of(site) {
                covered[area] = true;
            }
        }
        covered
    }

    fn bound(problem: &Problem, order: &[usize], node: &Node, covered: &[bool]) -> f64 {
        let slots = problem.budget() - node.selected.len();
        let mut gains: Vec<f64> = order[node.level..]
            .iter()
            .map(|&site| marginal_gain(problem, covered, site))
            .filter(|&gain| gain > 0.0)
            .collect();
        gains.sort_by(|a, b| b.total_cmp(a));
        gains
            .iter()
            .take(slots)
            .fold(node.value, |bound, gain| bound + gain)
    }
}

impl Solver for BranchAndBound {
    fn name(&self) -> &'static str {
        "branch_and_bound"
    }

    fn solve(&self, problem: &Problem) -> Result<SolverOutput> {
        let deadline = Instant::now().checked_add(self.limits.time_limit);
        let budget = problem.budget();

        // Branch on the most valuable sites first; ties keep ascending site order.
        let nothing_covered = vec![false; problem.num_areas()];
        let singleton: Vec<f64> = (0..problem.num_sites())
            .map(|site| marginal_gain(problem, &nothing_covered, site))
            .collect();
        let mut order: Vec<usize> = (0..problem.num_sites()).collect();
        order.sort_by(|&a, &b| singleton[b].total_cmp(&singleton[a]).then(a.cmp(&b)));

        let incumbent = Greedy::select(problem);
        let mut best_value = incumbent.value;
        let mut best = incumbent.selected;

        let mut stack = vec![Node {
            level: 0,
            selected: Vec::new(),
            value: 0.0,
        }];
        let mut nodes = 0u64;
        let mut stopped = None;
        while let Some(node) = stack.pop() {
            nodes += 1;
            if nodes > self.limits.node_limit {
                stopped = Some(FallbackReason::NodeLimit);
                break;
            }
            if nodes % TIME_CHECK_INTERVAL == 1
                && deadline.is_some_and(|deadline| Instant::now() >= deadline)
            {
                stopped = Some(FallbackReason::TimeLimit);
                break;
            }
            if node.level == order.len() || node.selected.len() == budget {
                continue;
            }

            let covered = Self::covered(problem, &node.selected);
            if !improves(Self::bound(problem, &order, &node, &covered), best_value) {
                continue;
            }

            let site = order[node.level];
            let gain = marginal_gain(problem, &covered, site);
            stack.push(Node {
                level: node.level + 1,
                selected: node.selected.clone(),
                value: node.value,
            });
            // A site adding nothing is never worth a slot.
            if gain > 0.0 {
                let mut selected = node.selected;
                selected.push(site);
                let value = node.value + gain;
                if improves(value, best_value) {
                    best_value = value;
                    best = selected.clone();
                }
                // Pushed last so the include branch is explored first.
                stack.push(Node {
                    level: node.level + 1,
                    selected,
                    value,
                });
            }
        }

        debug!(
            "Branch-and-bound explored {} nodes, best value {}",
            nodes, best_value
        );
        Ok(SolverOutput {
            selected: best,
            value: best_value,
            status: match stopped {
                Some(reason) => SolverStatus::LimitReached(reason),
                None => SolverStatus::Optimal,
            },
            nodes_explored: nodes,
        })
    }
}
