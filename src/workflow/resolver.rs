//! Dependency graph for step execution ordering.
//!
//! Adjacency is kept in declaration order so that the topological order is
//! deterministic: among steps that are ready at the same time, the one
//! declared first runs first.

use std::collections::{HashMap, HashSet, VecDeque};

use super::definition::WorkflowDefinition;
use crate::error::{PipewrightError, Result};

/// Dependency relationships between the steps of one workflow.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step ids in declaration order.
    steps: Vec<String>,
    /// Step id to its direct dependencies.
    dependencies: HashMap<String, Vec<String>>,
    /// Step id to the steps that depend on it, in declaration order.
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph for a workflow.
    ///
    /// Edges to undefined steps are dropped; use [`validate`] to report them.
    pub fn from_workflow(workflow: &WorkflowDefinition) -> Self {
        Self::from_edges(
            workflow
                .steps
                .iter()
                .map(|s| (s.id.as_str(), s.depends_on.as_slice())),
        )
    }

    /// Build a graph from `(step, dependencies)` pairs in declaration order.
    pub fn from_edges<'s, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (&'s str, &'s [String])>,
    {
        let edges: Vec<_> = edges.into_iter().collect();
        let mut steps = Vec::with_capacity(edges.len());
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for (id, _) in &edges {
            if dependencies.contains_key(*id) {
                continue;
            }
            steps.push(id.to_string());
            dependencies.insert(id.to_string(), Vec::new());
            dependents.insert(id.to_string(), Vec::new());
        }

        for (id, deps) in &edges {
            for dep in deps.iter() {
                if !dependents.contains_key(dep) {
                    continue;
                }
                let list = dependencies.entry(id.to_string()).or_default();
                if list.contains(dep) {
                    continue;
                }
                list.push(dep.clone());
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(id.to_string());
                }
            }
        }

        Self {
            steps,
            dependencies,
            dependents,
        }
    }

    pub fn dependencies_of(&self, step: &str) -> &[String] {
        self.dependencies.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, step: &str) -> &[String] {
        self.dependents.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, step: &str) -> bool {
        self.dependencies.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in topological order (dependencies before dependents).
    ///
    /// Steps left with unresolved in-degree sit on or behind a cycle and
    /// are reported in declaration order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.as_str(), self.dependencies_of(s).len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .steps
            .iter()
            .map(String::as_str)
            .filter(|s| in_degree.get(s) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(step) = queue.pop_front() {
            order.push(step.to_string());
            for dependent in self.dependents_of(step) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.steps.len() {
            let done: HashSet<&str> = order.iter().map(String::as_str).collect();
            let steps = self
                .steps
                .iter()
                .filter(|s| !done.contains(s.as_str()))
                .cloned()
                .collect();
            return Err(PipewrightError::CyclicDependency { steps });
        }

        Ok(order)
    }

    /// Every step the given step depends on, directly or indirectly.
    pub fn transitive_dependencies(&self, step: &str) -> HashSet<String> {
        self.walk(step, |s| self.dependencies_of(s))
    }

    /// Every step that depends on the given step, directly or indirectly.
    pub fn transitive_dependents(&self, step: &str) -> HashSet<String> {
        self.walk(step, |s| self.dependents_of(s))
    }

    fn walk<'a, F>(&'a self, start: &str, next: F) -> HashSet<String>
    where
        F: Fn(&str) -> &'a [String],
    {
        let mut result = HashSet::new();
        let mut to_visit = vec![start.to_string()];
        while let Some(current) = to_visit.pop() {
            for neighbour in next(current.as_str()) {
                if result.insert(neighbour.clone()) {
                    to_visit.push(neighbour.clone());
                }
            }
        }
        result
    }
}

/// Check a workflow's structure, collecting every problem found.
pub fn validate(workflow: &WorkflowDefinition) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("Duplicate step id '{}'", step.id));
        }
    }

    for step in &workflow.steps {
        if step.depends_on.iter().any(|d| d == &step.id) {
            errors.push(format!("Step '{}' depends on itself", step.id));
        }
        for dep in &step.depends_on {
            if !seen.contains(dep.as_str()) {
                errors.push(format!(
                    "Step '{}' depends on non-existent step '{}'",
                    step.id, dep
                ));
            }
        }
    }

    if let Err(e) = DependencyGraph::from_workflow(workflow).topological_order() {
        errors.push(e.to_string());
    }

    errors
}

/// Execution order for a workflow.
///
/// Fails with [`PipewrightError::MissingDependency`] on the first undefined
/// reference, or [`PipewrightError::CyclicDependency`] naming every step
/// that could not be ordered (a self-dependency is a cycle of one).
pub fn order(workflow: &WorkflowDefinition) -> Result<Vec<String>> {
    let ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    if ids.len() != workflow.steps.len() {
        return Err(PipewrightError::Validation {
            errors: validate(workflow),
        });
    }
    for step in &workflow.steps {
        if let Some(dep) = step.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(PipewrightError::MissingDependency {
                step: step.id.clone(),
                dependency: dep.clone(),
            });
        }
    }
    DependencyGraph::from_workflow(workflow).topological_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowStep;

    fn workflow(steps: &[(&str, &[&str])]) -> WorkflowDefinition {
        steps.iter().fold(WorkflowDefinition::new("w", "1.0.0"), |wf, (id, deps)| {
            wf.with_step(WorkflowStep::new(*id, "test.noop").depends_on(deps.iter().copied()))
        })
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|s| s == id).unwrap()
    }

    #[test]
    fn empty_workflow_orders_to_nothing() {
        assert!(order(&workflow(&[])).unwrap().is_empty());
    }

    #[test]
    fn linear_chain() {
        let wf = workflow(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        assert_eq!(order(&wf).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn independent_steps_keep_declaration_order() {
        let wf = workflow(&[("z", &[]), ("m", &[]), ("a", &[])]);
        assert_eq!(order(&wf).unwrap(), vec!["z", "m", "a"]);
    }

    #[test]
    fn diamond_respects_every_edge() {
        let wf = workflow(&[
            ("extraction", &[]),
            ("embedding", &["extraction"]),
            ("clustering", &["embedding"]),
            ("labelling", &["clustering"]),
            ("aggregation", &["extraction", "clustering", "labelling"]),
        ]);
        let result = order(&wf).unwrap();
        assert_eq!(result.len(), 5);
        for step in &wf.steps {
            for dep in &step.depends_on {
                assert!(position(&result, dep) < position(&result, &step.id));
            }
        }
    }

    #[test]
    fn two_step_cycle_names_both() {
        let wf = workflow(&[("a", &["b"]), ("b", &["a"])]);
        match order(&wf) {
            Err(PipewrightError::CyclicDependency { steps }) => {
                assert_eq!(steps, vec!["a", "b"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn steps_behind_a_cycle_are_reported() {
        let wf = workflow(&[("root", &[]), ("a", &["b"]), ("b", &["a"]), ("tail", &["b"])]);
        match order(&wf) {
            Err(PipewrightError::CyclicDependency { steps }) => {
                assert_eq!(steps, vec!["a", "b", "tail"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let wf = workflow(&[("a", &["ghost"])]);
        match order(&wf) {
            Err(PipewrightError::MissingDependency { step, dependency }) => {
                assert_eq!(step, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected missing dependency, got {:?}", other),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle_of_one() {
        let wf = workflow(&[("a", &["a"])]);
        assert!(matches!(
            order(&wf),
            Err(PipewrightError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn validate_accumulates_errors() {
        let wf = workflow(&[("a", &["a", "ghost"]), ("b", &["nothing"])]);
        let errors = validate(&wf);

        assert!(errors.iter().any(|e| e == "Step 'a' depends on itself"));
        assert!(errors.iter().any(|e| e.contains("'ghost'")));
        assert!(errors.iter().any(|e| e.contains("'nothing'")));
        assert!(errors.iter().any(|e| e.contains("Cyclic dependency")));
    }

    #[test]
    fn validate_reports_duplicate_ids() {
        let wf = workflow(&[("a", &[]), ("a", &[])]);
        let errors = validate(&wf);
        assert_eq!(errors, vec!["Duplicate step id 'a'"]);
        assert!(matches!(order(&wf), Err(PipewrightError::Validation { .. })));
    }

    #[test]
    fn valid_workflow_has_no_errors() {
        let wf = workflow(&[("a", &[]), ("b", &["a"])]);
        assert!(validate(&wf).is_empty());
    }

    #[test]
    fn transitive_walks() {
        let wf = workflow(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let graph = DependencyGraph::from_workflow(&wf);

        let deps = graph.transitive_dependencies("c");
        assert!(deps.contains("a") && deps.contains("b"));
        assert_eq!(deps.len(), 2);

        let dependents = graph.transitive_dependents("a");
        assert!(dependents.contains("b") && dependents.contains("c"));
        assert!(!dependents.contains("d"));
    }

    #[test]
    fn graph_accessors() {
        let wf = workflow(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        let graph = DependencyGraph::from_workflow(&wf);

        assert_eq!(graph.len(), 3);
        assert!(graph.contains("a"));
        assert_eq!(graph.dependents_of("a"), ["b".to_string(), "c".to_string()]);
        assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
        assert!(graph.dependencies_of("missing").is_empty());
    }
}
