//! Named-node dependency graph used to order derived fields.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph over named nodes
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Dependency edges: node -> nodes it depends on
    edges: HashMap<String, Vec<String>>,

    /// Reverse edges: node -> nodes that depend on it
    reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.edges.contains_key(&name) {
            return Err(ConfigError::DuplicateDerived(name));
        }

        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        for dep in &dependencies {
            self.reverse_edges
                .entry(dep.clone())
                .or_default()
                .push(name.clone());
        }
        self.edges.insert(name.clone(), dependencies);
        self.insertion_order.push(name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Check that every edge points at a known node and that there are no cycles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.insertion_order {
            for dep in &self.edges[name] {
                if !self.edges.contains_key(dep) {
                    return Err(ConfigError::DependencyNotFound {
                        field: name.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(ConfigError::CircularDependency(cycle.join(" -> ")));
        }

        Ok(())
    }

    pub fn is_cyclic(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Depth-first search with white/gray/black coloring.
    ///
    /// Iterative so that long dependency chains cannot overflow the stack.
    /// Returns the cycle path, first node repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut color: HashMap<&str, Color> = self
            .insertion_order
            .iter()
            .map(|name| (name.as_str(), Color::White))
            .collect();

        for start in &self.insertion_order {
            if color[start.as_str()] != Color::White {
                continue;
            }

            // (node, index of the next edge to follow)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            color.insert(start.as_str(), Color::Gray);

            while let Some(&(node, next_edge)) = stack.last() {
                let deps = &self.edges[node];
                if next_edge == deps.len() {
                    color.insert(node, Color::Black);
                    stack.pop();
                    continue;
                }

                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let dep = deps[next_edge].as_str();
                // Unknown nodes are reported by `validate`, not here.
                match color.get(dep).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        color.insert(dep, Color::Gray);
                        stack.push((dep, 0));
                    }
                    Color::Gray => {
                        let pos = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[pos..].iter().map(|(n, _)| n.to_string()).collect();
                        path.push(dep.to_string());
                        return Some(path);
                    }
                    Color::Black => {}
                }
            }
        }

        None
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Dependencies come before their dependents; nodes with no ordering
    /// constraint between them keep their insertion order.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of nodes, E = number of dependencies
    pub fn evaluation_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut in_degree: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .map(|name| (name.as_str(), self.edges[name].len()))
            .collect();

        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut current: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|name| in_degree[name] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.insertion_order.len());
        let mut seen: HashSet<&str> = HashSet::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &name in &current {
                if !seen.insert(name) {
                    continue;
                }
                order.push(name.to_string());
                for dependent in self.reverse_edges.get(name).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }
            next.sort_by_key(|name| position.get(name).copied().unwrap_or(usize::MAX));
            current = next;
        }

        if order.len() != self.insertion_order.len() {
            return Err(ConfigError::CircularDependency(
                "Unable to complete topological sort (cycle detected)".to_string(),
            ));
        }

        Ok(order)
    }
}
