//! Dependency graph over handler read/write sets, used by the scheduler
//! to dispatch handlers concurrently without racing on shared tables.
//!
//! Read/write set inference from handler source is an external
//! responsibility (a light static analysis over the host language); this
//! module only consumes the pre-computed sets and builds the DAG.

use std::collections::{BTreeSet, HashMap};

/// Store-method classification, fixed by the spec: `create`/`createMany`
/// are pure writes, `findUnique`/`findMany` are pure reads, and
/// `update`/`updateMany`/`upsert`/`delete` read-then-write (hence a
/// self-loop: an instance of the handler must run serially with itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMethod {
    Create,
    CreateMany,
    FindUnique,
    FindMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
}

impl StoreMethod {
    pub fn is_read_then_write(self) -> bool {
        matches!(
            self,
            StoreMethod::Update | StoreMethod::UpdateMany | StoreMethod::Upsert | StoreMethod::Delete
        )
    }
}

/// One user handler's declared read/write footprint over tables.
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub name: String,
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    /// `true` if any write on this handler is read-then-write
    /// (`update`/`upsert`/`delete`/`updateMany`), forcing a self-loop.
    pub self_loop: bool,
}

impl HandlerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            self_loop: false,
        }
    }

    pub fn reads(mut self, table: impl Into<String>) -> Self {
        self.reads.insert(table.into());
        self
    }

    pub fn writes(mut self, table: impl Into<String>) -> Self {
        self.writes.insert(table.into());
        self
    }

    /// Record that this handler invokes `method` against `table`,
    /// updating reads/writes/self_loop per the fixed store-method
    /// classification.
    pub fn record_call(&mut self, table: impl Into<String>, method: StoreMethod) {
        let table = table.into();
        match method {
            StoreMethod::Create | StoreMethod::CreateMany => {
                self.writes.insert(table);
            }
            StoreMethod::FindUnique | StoreMethod::FindMany => {
                self.reads.insert(table);
            }
            StoreMethod::Update | StoreMethod::UpdateMany | StoreMethod::Upsert | StoreMethod::Delete => {
                self.reads.insert(table.clone());
                self.writes.insert(table);
                self.self_loop = true;
            }
        }
    }
}

/// A dependency DAG over a set of handlers.
///
/// Two handlers conflict — `writes(A) ∩ reads(B) ≠ ∅` or
/// `writes(A) ∩ writes(B) ≠ ∅`, checked in either direction — iff they
/// touch the same table in a way that can race. Conflicting handlers are
/// grouped into one execution group and must be dispatched one at a time,
/// in checkpoint order; handlers in different groups touch disjoint
/// tables and may run fully concurrently.
pub struct DependencyGraph {
    handlers: Vec<HandlerSpec>,
    /// `group[i]` is the id of the execution group handler `i` belongs to.
    group: Vec<usize>,
    group_count: usize,
}

impl DependencyGraph {
    /// Build the graph from a set of handler specs.
    pub fn build(handlers: Vec<HandlerSpec>) -> Self {
        let n = handlers.len();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], x: usize) -> usize {
            if parent[x] != x {
                parent[x] = find(parent, parent[x]);
            }
            parent[x]
        }

        fn union(parent: &mut [usize], a: usize, b: usize) {
            let ra = find(parent, a);
            let rb = find(parent, b);
            if ra != rb {
                parent[ra] = rb;
            }
        }

        for a in 0..n {
            for b in (a + 1)..n {
                let conflicts = handlers[a].writes.iter().any(|t| {
                    handlers[b].reads.contains(t) || handlers[b].writes.contains(t)
                }) || handlers[b].writes.iter().any(|t| handlers[a].reads.contains(t));
                if conflicts {
                    union(&mut parent, a, b);
                }
            }
        }

        let mut group_ids: HashMap<usize, usize> = HashMap::new();
        let mut group = vec![0usize; n];
        for i in 0..n {
            let root = find(&mut parent, i);
            let next_id = group_ids.len();
            let id = *group_ids.entry(root).or_insert(next_id);
            group[i] = id;
        }

        Self {
            handlers,
            group_count: group_ids.len(),
            group,
        }
    }

    pub fn handler(&self, index: usize) -> &HandlerSpec {
        &self.handlers[index]
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// `true` if `self.handlers[index]` must serialize per-instance
    /// (reads-then-writes a table it also writes).
    pub fn has_self_loop(&self, index: usize) -> bool {
        self.handlers[index].self_loop
    }

    /// Partition handlers into execution groups: handlers in the same
    /// group conflict (directly or transitively) and must be dispatched
    /// serially in checkpoint order; distinct groups touch disjoint
    /// tables and may be dispatched fully concurrently. Always succeeds —
    /// conflict is a symmetric relation, so no group can deadlock against
    /// another.
    pub fn topological_layers(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.group_count];
        for (i, &g) in self.group.iter().enumerate() {
            groups[g].push(i);
        }
        groups
    }

    /// `true` if handlers `a` and `b` belong to the same execution group
    /// (conflict directly or transitively through a shared table).
    pub fn same_group(&self, a: usize, b: usize) -> bool {
        self.group[a] == self.group[b]
    }

    /// The execution group id handler `index` belongs to.
    pub fn group_of(&self, index: usize) -> usize {
        self.group[index]
    }
}

/// Map from a declared `HandlerSpec` name -> its precomputed read/write
/// sets, keyed for lookup by the scheduler when dispatching a batch.
pub fn index_by_name(handlers: &[HandlerSpec]) -> HashMap<&str, usize> {
    handlers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.name.as_str(), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_handlers_land_in_separate_groups() {
        let deposit = HandlerSpec::new("Deposit").writes("Balance");
        let withdraw = HandlerSpec::new("Withdraw").writes("Vault");
        let graph = DependencyGraph::build(vec![deposit, withdraw]);
        assert!(!graph.same_group(0, 1));
        assert_eq!(graph.topological_layers().len(), 2);
    }

    #[test]
    fn write_write_conflict_groups_handlers_together() {
        let deposit = HandlerSpec::new("Deposit").writes("Balance");
        let burn = HandlerSpec::new("Burn").writes("Balance");
        let graph = DependencyGraph::build(vec![deposit, burn]);
        assert!(graph.same_group(0, 1));
        assert_eq!(graph.topological_layers().len(), 1);
    }

    #[test]
    fn write_then_read_groups_handlers_together() {
        let deposit = HandlerSpec::new("Deposit").writes("Balance");
        let farm = HandlerSpec::new("Farm").reads("Balance").writes("Reward");
        let graph = DependencyGraph::build(vec![deposit, farm]);
        assert!(graph.same_group(0, 1));
    }

    #[test]
    fn group_of_matches_same_group() {
        let deposit = HandlerSpec::new("Deposit").writes("Balance");
        let withdraw = HandlerSpec::new("Withdraw").writes("Vault");
        let graph = DependencyGraph::build(vec![deposit, withdraw]);
        assert_ne!(graph.group_of(0), graph.group_of(1));
    }

    #[test]
    fn record_call_sets_self_loop_for_update() {
        let mut spec = HandlerSpec::new("Withdraw");
        spec.record_call("Vault", StoreMethod::Update);
        assert!(spec.self_loop);
        assert!(spec.reads.contains("Vault"));
        assert!(spec.writes.contains("Vault"));
    }

    #[test]
    fn record_call_pure_write_has_no_self_loop() {
        let mut spec = HandlerSpec::new("Deposit");
        spec.record_call("Balance", StoreMethod::Create);
        assert!(!spec.self_loop);
        assert!(!spec.reads.contains("Balance"));
    }

    #[test]
    fn deposit_burn_withdraw_farm_scenario_groups_correctly() {
        // Deposit: writes A. Burn: reads A, writes B. Withdraw: reads+writes A
        // (self-loop). Farm: reads+writes C (self-loop, independent table).
        let mut withdraw = HandlerSpec::new("Withdraw");
        withdraw.record_call("A", StoreMethod::Upsert);

        let mut farm = HandlerSpec::new("Farm");
        farm.record_call("C", StoreMethod::Upsert);

        let handlers = vec![
            HandlerSpec::new("Deposit").writes("A"),
            HandlerSpec::new("Burn").reads("A").writes("B"),
            withdraw,
            farm,
        ];
        let graph = DependencyGraph::build(handlers);

        // Deposit, Burn, and Withdraw all touch A transitively -> one group.
        assert!(graph.same_group(0, 1));
        assert!(graph.same_group(0, 2));
        // Farm only touches C -> its own group, free to run concurrently.
        assert!(!graph.same_group(3, 0));
        assert!(graph.has_self_loop(2));
        assert!(graph.has_self_loop(3));
        assert_eq!(graph.topological_layers().len(), 2);
    }
}
