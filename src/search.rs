// src/search.rs
//! # Navigation Search
//! Breadth-first exploration of the action graph behind an ambiguous page.
//!
//! The perception oracle is both the goal test and the action enumerator; the
//! source adapter's [`Navigator`] applies actions against the live page. States
//! are deduplicated by [`PageSnapshot::state_hash`], which depends on content only.
//!
//! The first goal-satisfying node popped from a FIFO frontier has minimal depth.
//! Running out of frontier is a normal outcome ([`SearchOutcome::Exhausted`]).

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::error::MonitorResult;
use crate::model::{Action, PageSnapshot};
use crate::oracle::DynOracle;
use crate::source::Navigator;

pub const DEFAULT_GOAL: &str =
    "the product is available for purchase (an active Add to Cart, See Details or Buy button)";

/// A node in the explored state graph. Owned by one search run.
#[derive(Debug, Clone)]
pub struct SearchNode {
    pub state: PageSnapshot,
    pub actions: Vec<Action>,
    pub depth: usize,
}

/// Ordering of pending nodes. FIFO gives shortest-path semantics; other orders
/// may be substituted without changing termination.
pub trait Frontier {
    fn push(&mut self, node: SearchNode);
    fn pop(&mut self) -> Option<SearchNode>;
}

#[derive(Debug, Default)]
pub struct FifoFrontier(VecDeque<SearchNode>);

impl Frontier for FifoFrontier {
    fn push(&mut self, node: SearchNode) {
        self.0.push_back(node);
    }

    fn pop(&mut self) -> Option<SearchNode> {
        self.0.pop_front()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Goal satisfied; the path is empty when the start state already satisfied it.
    Reached(Vec<Action>),
    /// Frontier exhausted within the depth limit.
    Exhausted { explored: usize },
}

impl SearchOutcome {
    /// Action path, or an empty slice when the goal was not reached.
    pub fn actions(&self) -> &[Action] {
        match self {
            Self::Reached(path) => path,
            Self::Exhausted { .. } => &[],
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached(_))
    }
}

#[derive(Clone)]
pub struct NavigationSearch {
    oracle: DynOracle,
}

impl NavigationSearch {
    pub fn new(oracle: DynOracle) -> Self {
        Self { oracle }
    }

    pub async fn search(
        &self,
        navigator: &dyn Navigator,
        start: PageSnapshot,
        goal: &str,
        max_depth: usize,
    ) -> MonitorResult<SearchOutcome> {
        self.search_with(FifoFrontier::default(), navigator, start, goal, max_depth)
            .await
    }

    pub async fn search_with<F: Frontier + Send>(
        &self,
        mut frontier: F,
        navigator: &dyn Navigator,
        start: PageSnapshot,
        goal: &str,
        max_depth: usize,
    ) -> MonitorResult<SearchOutcome> {
        let question = goal_question(goal);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.state_hash());
        frontier.push(SearchNode {
            state: start,
            actions: Vec::new(),
            depth: 0,
        });

        let mut explored = 0usize;
        while let Some(node) = frontier.pop() {
            explored += 1;

            let judgment = self.oracle.classify(&node.state, &question).await?;
            if judgment.affirms() {
                debug!(
                    target: "search",
                    depth = node.depth,
                    explored,
                    url = %node.state.url,
                    "goal reached"
                );
                return Ok(SearchOutcome::Reached(node.actions));
            }

            if node.depth >= max_depth {
                continue;
            }

            let actions = self.oracle.enumerate_actions(&node.state).await?;
            for action in actions {
                let next = match navigator.apply(&node.state, &action).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(
                            target: "search",
                            action = %action.label,
                            error = %format!("{e:#}"),
                            "action could not be applied; skipping"
                        );
                        continue;
                    }
                };
                if !visited.insert(next.state_hash()) {
                    continue;
                }
                let mut path = node.actions.clone();
                path.push(action);
                frontier.push(SearchNode {
                    state: next,
                    actions: path,
                    depth: node.depth + 1,
                });
            }
        }

        debug!(target: "search", explored, "frontier exhausted");
        Ok(SearchOutcome::Exhausted { explored })
    }
}

pub fn goal_question(goal: &str) -> String {
    format!("Does this page satisfy the goal: {goal}?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_outcome_exposes_empty_path() {
        let out = SearchOutcome::Exhausted { explored: 4 };
        assert!(out.actions().is_empty());
        assert!(!out.is_reached());

        let reached = SearchOutcome::Reached(vec![Action::new("click")]);
        assert_eq!(reached.actions().len(), 1);
    }

    #[test]
    fn fifo_frontier_pops_in_insertion_order() {
        let mut f = FifoFrontier::default();
        for d in 0..3 {
            f.push(SearchNode {
                state: PageSnapshot::new(format!("u{d}"), ""),
                actions: vec![],
                depth: d,
            });
        }
        let depths: Vec<usize> = std::iter::from_fn(|| f.pop()).map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }
}
