//! DAG validation and level computation, via an explicit Kahn's-algorithm
//! level computation so the parallel strategy can execute a whole level as
//! one barrier-bounded batch.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};

use super::types::Plan;

/// Reject plans with duplicate task ids, dependencies that don't resolve
/// within the plan, or a dependency cycle.
pub fn validate(plan: &Plan) -> Result<()> {
    let mut seen = HashSet::new();
    for task in &plan.tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(Error::invalid_plan(format!("duplicate task id: {}", task.id)));
        }
    }

    for task in &plan.tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(Error::invalid_plan(format!(
                    "task '{}' depends on unknown task '{dep}'",
                    task.id
                )));
            }
        }
    }

    levels(plan)?;
    Ok(())
}

/// Partition `plan`'s tasks into dependency levels via Kahn's algorithm:
/// level 0 is every task with no dependencies; level k+1 is every task
/// whose dependencies are all satisfied by levels `<= k`. Returns
/// `Err(InvalidPlan)` if a cycle prevents every task from being assigned a
/// level.
pub fn levels(plan: &Plan) -> Result<Vec<Vec<String>>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for task in &plan.tasks {
        in_degree.entry(task.id.as_str()).or_insert(0);
        for dep in &task.dependencies {
            *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
        }
    }

    let mut frontier: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    // Stable ordering within a level: follow the plan's declared task order.
    let order: Vec<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    let rank = |id: &str| order.iter().position(|o| *o == id).unwrap_or(usize::MAX);
    let mut frontier: Vec<&str> = frontier.drain(..).collect();
    frontier.sort_by_key(|id| rank(id));

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut remaining = in_degree.clone();
    let mut processed = 0usize;

    while !frontier.is_empty() {
        let this_level: Vec<String> = frontier.iter().map(|s| s.to_string()).collect();
        processed += this_level.len();

        let mut next_frontier: Vec<&str> = Vec::new();
        for id in &frontier {
            if let Some(deps) = dependents.get(id) {
                for dependent in deps {
                    let degree = remaining.get_mut(dependent).expect("dependent has a degree entry");
                    *degree -= 1;
                    if *degree == 0 {
                        next_frontier.push(dependent);
                    }
                }
            }
        }
        next_frontier.sort_by_key(|id| rank(id));
        next_frontier.dedup();

        levels.push(this_level);
        frontier = next_frontier;
    }

    if processed != plan.tasks.len() {
        return Err(Error::invalid_plan("dependency cycle detected in plan"));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::types::{Strategy, Task, TaskType};

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, format!("do {id}"), TaskType::Action).depends_on(deps.to_vec())
    }

    #[test]
    fn detects_unknown_dependency() {
        let plan = Plan::new("p", Strategy::Sequential, vec![task("a", &["missing"])]);
        let err = validate(&plan).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidPlan);
    }

    #[test]
    fn detects_duplicate_ids() {
        let plan = Plan::new("p", Strategy::Sequential, vec![task("a", &[]), task("a", &[])]);
        let err = validate(&plan).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidPlan);
    }

    #[test]
    fn detects_cycle() {
        let plan = Plan::new("p", Strategy::Sequential, vec![task("a", &["b"]), task("b", &["a"])]);
        let err = validate(&plan).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidPlan);
    }

    #[test]
    fn computes_levels_for_diamond_dag() {
        let plan = Plan::new(
            "p",
            Strategy::Parallel,
            vec![task("a", &[]), task("b", &["a"]), task("c", &["a"]), task("d", &["b", "c"])],
        );
        let computed = levels(&plan).unwrap();
        assert_eq!(computed.len(), 3);
        assert_eq!(computed[0], vec!["a"]);
        let mut level1 = computed[1].clone();
        level1.sort();
        assert_eq!(level1, vec!["b", "c"]);
        assert_eq!(computed[2], vec!["d"]);
    }

    #[test]
    fn empty_plan_has_no_levels() {
        let plan = Plan::new("p", Strategy::Sequential, vec![]);
        assert!(levels(&plan).unwrap().is_empty());
    }
}
