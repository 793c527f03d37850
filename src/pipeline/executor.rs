//! Graph Executor
//!
//! Drives the cyclic research graph as an explicit loop with a
//! `next_node` variable (the state itself never holds cycles):
//!
//! ```text
//! START → plan → [search → scrape → summarize]* → synthesize → END
//! ```
//!
//! Every iteration: shutdown check, stage under timeout, reducer apply,
//! budget/tier evaluation, event append, atomic checkpoint, edge choice.
//! Resume loads the newest valid checkpoint and re-enters at the stage
//! scheduled after the one that produced it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use super::degradation::DegradationController;
use super::shutdown::ShutdownCoordinator;
use super::stages::{self, StageOutcome, StageServices};
use crate::budget::BudgetTracker;
use crate::persist::{CheckpointStore, EventKind, EventLog};
use crate::state::{
    DegradationTier, ResearchState, RunError, StateUpdate, SubtopicStatus, reducer,
};
use crate::types::{FathomError, Result};

// =============================================================================
// Nodes
// =============================================================================

/// Graph nodes. `Start` and `End` carry no stage function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Start,
    Plan,
    Search,
    Scrape,
    Summarize,
    Synthesize,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Plan => "plan",
            Self::Search => "search",
            Self::Scrape => "scrape",
            Self::Summarize => "summarize",
            Self::Synthesize => "synthesize",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry node for a resumed state: the stage scheduled after the one
/// that produced the loaded checkpoint, derived from what the state
/// already contains.
pub fn resume_node(state: &ResearchState) -> Node {
    if state.final_report.is_some() {
        return Node::End;
    }
    if state.subtopics.is_empty() {
        return Node::Plan;
    }
    if !state.has_remaining_subtopics() {
        return Node::Synthesize;
    }

    let current = &state.subtopics[state.current_subtopic_index];
    let has_results = state
        .search_results
        .iter()
        .any(|r| r.subtopic_id == current.id);
    let has_pages = state
        .scraped_pages
        .iter()
        .any(|p| p.subtopic_id == current.id);

    if current.status == SubtopicStatus::Failed || has_pages {
        Node::Summarize
    } else if has_results {
        Node::Scrape
    } else {
        Node::Search
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Ceiling on a single stage invocation
    pub stage_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(600),
        }
    }
}

/// Single-run pipeline executor; the sole mutator of the state.
pub struct Executor {
    services: StageServices,
    shutdown: Arc<ShutdownCoordinator>,
    events: Arc<EventLog>,
    checkpoints: CheckpointStore,
    budget: Arc<BudgetTracker>,
    controller: DegradationController,
    config: ExecutorConfig,
    step: u64,
}

impl Executor {
    pub fn new(
        services: StageServices,
        shutdown: Arc<ShutdownCoordinator>,
        events: Arc<EventLog>,
        checkpoints: CheckpointStore,
        budget: Arc<BudgetTracker>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            services,
            shutdown,
            events,
            checkpoints,
            budget,
            controller: DegradationController::new(DegradationTier::Full),
            config,
            step: 0,
        }
    }

    /// Start a fresh run from the plan stage.
    pub async fn run_fresh(&mut self, state: ResearchState) -> Result<ResearchState> {
        self.services.progress.init(&state.query)?;
        self.run(state, Node::Plan).await
    }

    /// Resume from the newest valid checkpoint in the store.
    pub async fn run_resumed(&mut self) -> Result<ResearchState> {
        let (step, state) = self
            .checkpoints
            .latest_valid()?
            .ok_or_else(|| FathomError::CheckpointMissing(self.checkpoints.dir().to_path_buf()))?;

        self.step = step;
        // Usage already spent before the crash counts against this run
        self.budget
            .add(state.total_cost, state.total_tokens, "resumed");

        let node = resume_node(&state);
        info!(step, node = %node, run_id = %state.run_id, "resuming from checkpoint");
        self.run(state, node).await
    }

    /// The run loop. Returns the final state (report applied) or the
    /// first fatal error.
    pub async fn run(&mut self, mut state: ResearchState, start: Node) -> Result<ResearchState> {
        self.controller = DegradationController::new(state.degradation_tier);
        let mut node = if start == Node::Start { Node::Plan } else { start };

        while node != Node::End {
            // (a) shutdown checks between stages
            if self.shutdown.aborted() {
                warn!("aborting immediately, last checkpoint stands");
                return Err(FathomError::Cancelled);
            }
            if self.shutdown.should_stop() && node != Node::Synthesize {
                info!(from = %node, "drain requested, routing to synthesize");
                node = Node::Synthesize;
            }

            // (b) invoke the stage under a timeout
            let enter_id = self.emit(
                EventKind::NodeEnter,
                node.as_str(),
                None,
                json!({"subtopic_index": state.current_subtopic_index}),
            );
            let started = Instant::now();

            let outcome = match tokio::time::timeout(
                self.config.stage_timeout,
                self.invoke(node, &state, enter_id),
            )
            .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    self.emit(
                        EventKind::Error,
                        node.as_str(),
                        enter_id,
                        json!({"error": err.to_string()}),
                    );
                    return Err(err);
                }
                Err(_) => {
                    let err = FathomError::timeout(node.as_str(), self.config.stage_timeout);
                    self.emit(
                        EventKind::Error,
                        node.as_str(),
                        enter_id,
                        json!({"error": err.to_string()}),
                    );
                    match node {
                        // A planner or synthesizer that cannot finish is fatal
                        Node::Plan | Node::Synthesize => return Err(err),
                        _ => timeout_outcome(node, &state, &err),
                    }
                }
            };

            // Router health feeds the degradation controller
            if outcome.model_exhausted {
                self.controller.record_exhaustion();
                if state.degradation_tier >= DegradationTier::Cached {
                    self.controller.record_all_providers_failed();
                }
            } else if outcome.model_succeeded {
                self.controller.record_success();
            }

            // (c) apply the stage's partial update via reducers
            reducer::apply(&mut state, outcome.update);

            // Mirror router-reported usage into the state's monotonic totals
            let cost_delta = (self.budget.total_cost() - state.total_cost).max(0.0);
            let tokens_delta = self.budget.total_tokens().saturating_sub(state.total_tokens);
            reducer::apply(
                &mut state,
                StateUpdate {
                    cost_spent: cost_delta,
                    tokens_spent: tokens_delta,
                    ..Default::default()
                },
            );
            state.check_invariants()?;

            self.emit(
                EventKind::NodeExit,
                node.as_str(),
                enter_id,
                json!({"ok": true, "duration_ms": started.elapsed().as_millis() as u64}),
            );

            // (d) budget tick and tier transitions
            self.emit(
                EventKind::BudgetTick,
                "budget",
                enter_id,
                self.budget.tick_payload(),
            );
            for change in self.controller.evaluate(self.budget.fraction_used()) {
                self.emit(EventKind::TierChange, "degradation", enter_id, change.payload());
                reducer::apply(
                    &mut state,
                    StateUpdate {
                        degradation_tier: Some(change.to),
                        ..Default::default()
                    },
                );
            }

            // (e) checkpoint after every stage
            self.step += 1;
            self.checkpoints.write(&state, self.step)?;
            self.emit(
                EventKind::CheckpointWritten,
                node.as_str(),
                enter_id,
                json!({"step": self.step}),
            );

            // (f) choose the next edge
            node = self.route(node, &state);
        }

        info!(run_id = %state.run_id, cost_usd = state.total_cost, "run complete");
        Ok(state)
    }

    async fn invoke(
        &self,
        node: Node,
        state: &ResearchState,
        parent_id: Option<u64>,
    ) -> Result<StageOutcome> {
        match node {
            Node::Plan => stages::plan(state, &self.services, parent_id).await,
            Node::Search => Ok(stages::search(state, &self.services, parent_id).await),
            Node::Scrape => Ok(stages::scrape(state, &self.services).await),
            Node::Summarize => Ok(stages::summarize(state, &self.services, parent_id).await),
            Node::Synthesize => stages::synthesize(state, &self.services, parent_id).await,
            Node::Start | Node::End => Ok(StageOutcome::default()),
        }
    }

    /// The conditional transition table.
    fn route(&self, from: Node, state: &ResearchState) -> Node {
        match from {
            Node::Start => Node::Plan,
            Node::Plan => {
                if state.subtopics.is_empty() || self.budget.fraction_used() >= 1.0 {
                    Node::Synthesize
                } else {
                    Node::Search
                }
            }
            Node::Search => Node::Scrape,
            Node::Scrape => Node::Summarize,
            Node::Summarize => {
                let keep_going = state.has_remaining_subtopics()
                    && self.budget.fraction_used() < 1.0
                    && !self.shutdown.should_stop()
                    && state.degradation_tier != DegradationTier::Partial;
                if keep_going { Node::Search } else { Node::Synthesize }
            }
            Node::Synthesize | Node::End => Node::End,
        }
    }

    fn emit(
        &self,
        kind: EventKind,
        node: &str,
        parent_id: Option<u64>,
        payload: serde_json::Value,
    ) -> Option<u64> {
        match self.events.append(kind, node, parent_id, payload) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "failed to append event");
                None
            }
        }
    }
}

/// Recovery update for a timed-out non-fatal stage: record the error and,
/// for summarize, fail the subtopic and move past it.
fn timeout_outcome(node: Node, state: &ResearchState, err: &FathomError) -> StageOutcome {
    let mut update = StateUpdate::default();
    let mut error = RunError::new(node.as_str(), err.to_string());

    if let Some(subtopic) = state.current_subtopic() {
        error = error.subtopic(&subtopic.id);
        if node == Node::Summarize {
            update.subtopic_status = vec![(subtopic.id.clone(), SubtopicStatus::Failed)];
            update.current_subtopic_index = Some(state.current_subtopic_index + 1);
        }
    }
    update.errors.push(error);

    StageOutcome {
        update,
        model_succeeded: false,
        model_exhausted: false,
    }
}

// =============================================================================
// Tests
// =============================================================================
