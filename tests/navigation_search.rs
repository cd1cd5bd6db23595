// tests/navigation_search.rs
mod common;

use common::{page, GraphNavigator, GraphOracle, PageGraph};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stock_sentinel::search::{NavigationSearch, SearchOutcome, DEFAULT_GOAL};

fn engine(graph: &PageGraph) -> (NavigationSearch, Arc<GraphOracle>, GraphNavigator) {
    let oracle = Arc::new(GraphOracle::new(graph.clone()));
    (
        NavigationSearch::new(oracle.clone()),
        oracle,
        GraphNavigator::new(graph.clone()),
    )
}

#[tokio::test]
async fn start_already_satisfying_goal_needs_no_enumeration() {
    let graph = PageGraph::default().goal("p");
    let (search, oracle, nav) = engine(&graph);

    let out = search.search(&nav, page("p"), DEFAULT_GOAL, 5).await.unwrap();

    assert_eq!(out, SearchOutcome::Reached(vec![]));
    assert!(out.actions().is_empty());
    assert_eq!(oracle.enumerate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(oracle.classify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_step_path_is_found() {
    // product page -> choose variant -> cart visible
    let graph = PageGraph::default()
        .edge("product", "select Founders Edition", "variant")
        .edge("product", "open reviews", "reviews")
        .edge("variant", "click See Details", "cart")
        .goal("cart");
    let (search, _oracle, nav) = engine(&graph);

    let out = search.search(&nav, page("product"), DEFAULT_GOAL, 5).await.unwrap();

    let labels: Vec<&str> = out.actions().iter().map(|a| a.label.as_str()).collect();
    assert_eq!(labels, vec!["select Founders Edition", "click See Details"]);
}

#[tokio::test]
async fn shortest_path_wins_over_earlier_longer_branch() {
    let graph = PageGraph::default()
        .edge("s", "a", "a1")
        .edge("a1", "a", "a2")
        .edge("a2", "a", "goal")
        .edge("s", "b", "b1")
        .edge("b1", "b", "goal")
        .goal("goal");
    let (search, _oracle, nav) = engine(&graph);

    let out = search.search(&nav, page("s"), DEFAULT_GOAL, 5).await.unwrap();

    assert!(out.is_reached());
    assert_eq!(out.actions().len(), 2);
    assert!(out.actions().iter().all(|a| a.label == "b"));
}

#[tokio::test]
async fn cyclic_graph_without_goal_is_exhausted() {
    let graph = PageGraph::default()
        .edge("s", "next", "x")
        .edge("x", "next", "y")
        .edge("y", "back", "s")
        .edge("y", "self", "y");
    let (search, _oracle, nav) = engine(&graph);

    let out = search.search(&nav, page("s"), DEFAULT_GOAL, 10).await.unwrap();

    // s, x and y are each explored once; revisits are dropped by hash.
    assert_eq!(out, SearchOutcome::Exhausted { explored: 3 });
    assert!(out.actions().is_empty());
}

#[tokio::test]
async fn goal_beyond_max_depth_is_not_reached() {
    let graph = PageGraph::default()
        .edge("s", "1", "d1")
        .edge("d1", "2", "d2")
        .edge("d2", "3", "goal")
        .goal("goal");
    let (search, _oracle, nav) = engine(&graph);

    let shallow = search.search(&nav, page("s"), DEFAULT_GOAL, 2).await.unwrap();
    assert!(!shallow.is_reached());

    let deep = search.search(&nav, page("s"), DEFAULT_GOAL, 3).await.unwrap();
    assert_eq!(deep.actions().len(), 3);
}

#[tokio::test]
async fn unappliable_action_is_skipped() {
    // The oracle lists "ghost" but the navigator has no such element on "s".
    let oracle_graph = PageGraph::default()
        .edge("s", "ghost", "nowhere")
        .edge("s", "real", "goal")
        .goal("goal");
    let nav_graph = PageGraph::default().edge("s", "real", "goal");
    let search = NavigationSearch::new(Arc::new(GraphOracle::new(oracle_graph)));

    let out = search
        .search(&GraphNavigator::new(nav_graph), page("s"), DEFAULT_GOAL, 3)
        .await
        .unwrap();

    assert_eq!(out.actions().len(), 1);
    assert_eq!(out.actions()[0].label, "real");
}

#[tokio::test]
async fn oracle_outage_surfaces_as_error() {
    let search = NavigationSearch::new(Arc::new(GraphOracle::failing()));
    let nav = GraphNavigator::new(PageGraph::default());

    let err = search
        .search(&nav, page("s"), DEFAULT_GOAL, 3)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "oracle_unavailable");
}
