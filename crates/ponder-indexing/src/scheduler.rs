//! DAG-respecting dispatch of a batch of decoded events across user
//! handlers: independent execution groups run concurrently, conflicting
//! groups run serially in checkpoint order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use ponder_core::dag::DependencyGraph;
use ponder_core::error::{PonderError, SyncPhase};
use ponder_core::handler::{DecodedLog, HandlerRegistry};

/// What the host should do after a batch. Mirrors the
/// `onReloadableError` / `onFatalError` split in the error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerOutcome {
    Completed,
    Reload(String),
    Fatal(String),
}

/// Dispatches `EventBatch`-shaped event lists against a `HandlerRegistry`,
/// respecting the conflict groups computed by a `DependencyGraph`.
pub struct Scheduler<C: Send + Sync> {
    graph: DependencyGraph,
    name_to_group: HashMap<String, usize>,
    registry: Arc<HandlerRegistry<C>>,
    max_concurrency: usize,
}

impl<C: Send + Sync + 'static> Scheduler<C> {
    pub fn new(graph: DependencyGraph, registry: Arc<HandlerRegistry<C>>, max_concurrency: usize) -> Self {
        let name_to_group = (0..graph.len())
            .map(|i| (graph.handler(i).name.clone(), graph.group_of(i)))
            .collect();
        Self { graph, name_to_group, registry, max_concurrency }
    }

    /// Run one batch of already checkpoint-sorted events to completion.
    /// Events for handlers outside the graph (no declared read/write
    /// footprint) are treated as their own singleton group.
    pub async fn run_batch(&self, events: Vec<DecodedLog>, ctx: &C) -> SchedulerOutcome {
        let mut groups: HashMap<usize, Vec<DecodedLog>> = HashMap::new();
        let mut next_ungrouped = self.graph.len();
        for event in events {
            let group = match self.name_to_group.get(&event.schema) {
                Some(g) => *g,
                None => {
                    let g = next_ungrouped;
                    next_ungrouped += 1;
                    g
                }
            };
            groups.entry(group).or_default().push(event);
        }

        let outcomes: Vec<SchedulerOutcome> = stream::iter(groups.into_values().map(|mut batch| {
            batch.sort_by_key(|e| e.checkpoint);
            let registry = self.registry.clone();
            async move {
                for event in &batch {
                    if let Err(e) = registry.dispatch_event(event, ctx).await {
                        return classify(e);
                    }
                }
                SchedulerOutcome::Completed
            }
        }))
        .buffer_unordered(self.max_concurrency.max(1))
        .collect()
        .await;

        outcomes
            .into_iter()
            .find(|o| *o != SchedulerOutcome::Completed)
            .unwrap_or(SchedulerOutcome::Completed)
    }
}

fn classify(e: PonderError) -> SchedulerOutcome {
    // Dispatch only ever runs against already-synced events, well past
    // startup, so RPC errors reaching here are classified steady-state.
    if e.is_reloadable(SyncPhase::SteadyState) {
        SchedulerOutcome::Reload(e.to_string())
    } else {
        // Schema/system errors, and anything the taxonomy doesn't mark
        // reloadable, are treated as fatal: nothing short of a restart
        // fixes state the scheduler can't reason about.
        SchedulerOutcome::Fatal(e.to_string())
    }
}
