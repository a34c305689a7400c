// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Dependency-based invalidation after mutations
//!
//! Each mutation domain maps to a set of rules producing key prefixes. Key
//! families may additionally derive from one another (the revenue aggregate is
//! computed from invoice lists); those derivation edges are followed
//! transitively up to a maximum depth.

use chrono::{DateTime, Utc};
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use super::domain::MutationDomain;
use super::keys;
use super::query_key::{KeySegment, QueryKey};
use super::store::CacheStore;

/// How a rule turns a mutation into a key prefix
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidationRule {
    /// A fixed key family
    Family(QueryKey),
    /// `base` extended by the mutated entity's id; the whole `base` family
    /// when the id is unknown
    Entity(QueryKey),
    /// `base` extended by the parent entity's id; the whole `base` family
    /// when the parent is unknown
    Parent(QueryKey),
}

/// Identifies the entity a mutation touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationScope {
    pub entity_id: Option<KeySegment>,
    pub parent_id: Option<KeySegment>,
}

impl InvalidationScope {
    /// Scope without an entity, e.g. for creations
    pub fn domain_wide() -> Self {
        Self::default()
    }

    pub fn entity(id: impl Into<KeySegment>) -> Self {
        Self {
            entity_id: Some(id.into()),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<KeySegment>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Result of one invalidation pass
#[derive(Debug, Clone)]
pub struct InvalidationReport {
    pub domain: MutationDomain,
    /// Normalized prefixes that were invalidated
    pub prefixes: Vec<QueryKey>,
    pub entries_invalidated: usize,
    /// Derivation hops followed
    pub cascade_depth: usize,
    pub duration: Duration,
    pub at: DateTime<Utc>,
}

/// Invalidation statistics
#[derive(Debug, Default, Clone)]
pub struct InvalidationStats {
    pub total_runs: u64,
    pub total_entries_invalidated: u64,
    pub cascade_runs: u64,
    pub average_cascade_depth: f64,
}

static CLINIC_RULES: Lazy<Vec<(MutationDomain, InvalidationRule)>> = Lazy::new(|| {
    use InvalidationRule::*;
    use MutationDomain::*;

    vec![
        (Appointments, Family(keys::appointments::lists())),
        (Appointments, Family(keys::appointments::ranges())),
        (Appointments, Entity(keys::appointments::details())),
        (Appointments, Parent(keys::patients::details())),
        (Appointments, Family(keys::dashboard::today_appointments())),
        (Patients, Family(keys::patients::lists())),
        (Patients, Entity(keys::patients::details())),
        (BillingInvoice, Family(keys::invoices::lists())),
        (BillingInvoice, Entity(keys::invoices::details())),
        (BillingPayment, Family(keys::payments::lists())),
        (BillingPayment, Entity(keys::payments::details())),
        (BillingPayment, Parent(keys::invoices::details())),
        (BillingPayment, Parent(keys::payments::all().with("by-invoice"))),
        (StockItem, Family(keys::stock::lists())),
        (StockItem, Entity(keys::stock::details())),
        (StockItem, Family(keys::stock::low_stock())),
        (Staff, Family(keys::staff::lists())),
        (Staff, Entity(keys::staff::details())),
    ]
});

/// `(source, derived)`: when `source` changes, `derived` is out of date too
static CLINIC_DERIVATIONS: Lazy<Vec<(QueryKey, QueryKey)>> = Lazy::new(|| {
    vec![
        // List rows embed the patient's name
        (keys::patients::details(), keys::appointments::lists()),
        (keys::appointments::lists(), keys::dashboard::today_appointments()),
        // Invoice balance and status follow payments
        (keys::payments::lists(), keys::invoices::lists()),
        (keys::invoices::lists(), keys::dashboard::revenue()),
    ]
});

/// Domain-to-key-family invalidation table
pub struct InvalidationGraph {
    rules: HashMap<MutationDomain, Vec<InvalidationRule>>,
    derivations: DiGraph<QueryKey, ()>,
    nodes: HashMap<QueryKey, NodeIndex>,
    max_depth: usize,
    history: RwLock<VecDeque<InvalidationReport>>,
    max_history_size: usize,
    stats: RwLock<InvalidationStats>,
}

impl InvalidationGraph {
    /// Empty table
    pub fn new(max_depth: usize) -> Self {
        Self {
            rules: HashMap::new(),
            derivations: DiGraph::new(),
            nodes: HashMap::new(),
            max_depth,
            history: RwLock::new(VecDeque::new()),
            max_history_size: 64,
            stats: RwLock::new(InvalidationStats::default()),
        }
    }

    /// Table for the clinic domains
    pub fn clinic_defaults(max_depth: usize) -> Self {
        let mut graph = Self::new(max_depth);
        for (domain, rule) in CLINIC_RULES.iter() {
            graph.add_rule(*domain, rule.clone());
        }
        for (source, derived) in CLINIC_DERIVATIONS.iter() {
            graph.add_derivation(source.clone(), derived.clone());
        }
        graph
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size.max(1);
        self
    }

    pub fn add_rule(&mut self, domain: MutationDomain, rule: InvalidationRule) -> &mut Self {
        self.rules.entry(domain).or_default().push(rule);
        self
    }

    /// Declare that `derived` is computed from `source`
    pub fn add_derivation(&mut self, source: QueryKey, derived: QueryKey) -> &mut Self {
        let from = self.node(source);
        let to = self.node(derived);
        if !self.derivations.contains_edge(from, to) {
            self.derivations.add_edge(from, to, ());
        }
        self
    }

    fn node(&mut self, key: QueryKey) -> NodeIndex {
        if let Some(index) = self.nodes.get(&key) {
            return *index;
        }
        let index = self.derivations.add_node(key.clone());
        self.nodes.insert(key, index);
        index
    }

    pub fn rules(&self, domain: MutationDomain) -> &[InvalidationRule] {
        self.rules.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Prefixes a mutation in `domain` invalidates
    pub fn prefixes_for(&self, domain: MutationDomain, scope: &InvalidationScope) -> Vec<QueryKey> {
        self.expand(domain, scope).0
    }

    fn expand(&self, domain: MutationDomain, scope: &InvalidationScope) -> (Vec<QueryKey>, usize) {
        let roots: Vec<QueryKey> = self
            .rules(domain)
            .iter()
            .map(|rule| match rule {
                InvalidationRule::Family(key) => key.clone(),
                InvalidationRule::Entity(base) => match &scope.entity_id {
                    Some(id) => base.clone().with(id.clone()),
                    None => base.clone(),
                },
                InvalidationRule::Parent(base) => match &scope.parent_id {
                    Some(id) => base.clone().with(id.clone()),
                    None => base.clone(),
                },
            })
            .collect();

        let mut prefixes: BTreeSet<QueryKey> = roots.iter().cloned().collect();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut frontier: Vec<NodeIndex> = Vec::new();
        for key in &roots {
            for node in self.touched_by(key) {
                if visited.insert(node) {
                    frontier.push(node);
                }
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() && depth < self.max_depth {
            let mut next = Vec::new();
            for node in frontier {
                for derived in self.derivations.neighbors_directed(node, Direction::Outgoing) {
                    let key = &self.derivations[derived];
                    if prefixes.insert(key.clone()) {
                        debug!(
                            "{} derives from {}, invalidating",
                            key, self.derivations[node]
                        );
                    }
                    for touched in self.touched_by(key) {
                        if visited.insert(touched) {
                            next.push(touched);
                        }
                    }
                }
            }
            if !next.is_empty() {
                depth += 1;
            }
            frontier = next;
        }

        (normalize(prefixes), depth)
    }

    /// Derivation nodes whose family overlaps `key`
    fn touched_by(&self, key: &QueryKey) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .filter(|(node_key, _)| node_key.starts_with(key) || key.starts_with(node_key))
            .map(|(_, index)| *index)
            .collect()
    }

    /// Mark every entry under the domain's prefixes stale
    pub fn invalidate(
        &self,
        store: &CacheStore,
        domain: MutationDomain,
        scope: &InvalidationScope,
    ) -> InvalidationReport {
        let start_time = Instant::now();
        let (prefixes, cascade_depth) = self.expand(domain, scope);
        let entries_invalidated = prefixes.iter().map(|prefix| store.invalidate(prefix)).sum();

        let report = InvalidationReport {
            domain,
            prefixes,
            entries_invalidated,
            cascade_depth,
            duration: start_time.elapsed(),
            at: Utc::now(),
        };

        debug!(
            "Invalidation for {}: {} prefixes, {} entries, depth {}",
            domain,
            report.prefixes.len(),
            report.entries_invalidated,
            report.cascade_depth
        );

        self.record(report.clone());
        report
    }

    fn record(&self, report: InvalidationReport) {
        {
            let mut stats = self.stats.write();
            stats.total_runs += 1;
            stats.total_entries_invalidated += report.entries_invalidated as u64;
            if report.cascade_depth > 0 {
                stats.cascade_runs += 1;
                stats.average_cascade_depth = (stats.average_cascade_depth
                    * (stats.cascade_runs - 1) as f64
                    + report.cascade_depth as f64)
                    / stats.cascade_runs as f64;
            }
        }

        let mut history = self.history.write();
        if history.len() >= self.max_history_size {
            history.pop_front();
        }
        history.push_back(report);
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.read().clone()
    }

    /// Most recent reports, newest first
    pub fn recent(&self, limit: usize) -> Vec<InvalidationReport> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }
}

/// Drop prefixes already covered by a shorter one
fn normalize(prefixes: BTreeSet<QueryKey>) -> Vec<QueryKey> {
    let mut kept: Vec<QueryKey> = Vec::new();
    for key in prefixes {
        if !kept.iter().any(|p| key.starts_with(p)) {
            kept.push(key);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheStatus};
    use crate::query_key;
    use serde_json::json;

    #[test]
    fn test_appointment_prefixes() {
        let graph = InvalidationGraph::clinic_defaults(3);
        let scope = InvalidationScope::entity(7).with_parent(3);
        let prefixes = graph.prefixes_for(MutationDomain::Appointments, &scope);

        assert!(prefixes.contains(&keys::appointments::lists()));
        assert!(prefixes.contains(&keys::appointments::detail(7)));
        assert!(prefixes.contains(&keys::patients::detail(3)));
        assert!(prefixes.contains(&keys::dashboard::today_appointments()));
        assert!(!prefixes.contains(&keys::dashboard::revenue()));
    }

    #[test]
    fn test_payment_reaches_parent_invoice_and_revenue() {
        let graph = InvalidationGraph::clinic_defaults(3);
        let scope = InvalidationScope::entity("PAY-1").with_parent("INV-9");
        let prefixes = graph.prefixes_for(MutationDomain::BillingPayment, &scope);

        assert!(prefixes.contains(&keys::payments::lists()));
        assert!(prefixes.contains(&keys::invoices::detail("INV-9")));
        assert!(prefixes.contains(&keys::payments::by_invoice("INV-9")));
        assert!(prefixes.contains(&keys::invoices::lists()));
        assert!(prefixes.contains(&keys::dashboard::revenue()));
    }

    #[test]
    fn test_cascade_depth_is_bounded() {
        let scope = InvalidationScope::entity(3);

        let deep = InvalidationGraph::clinic_defaults(3);
        let prefixes = deep.prefixes_for(MutationDomain::Patients, &scope);
        assert!(prefixes.contains(&keys::appointments::lists()));
        assert!(prefixes.contains(&keys::dashboard::today_appointments()));

        let shallow = InvalidationGraph::clinic_defaults(1);
        let prefixes = shallow.prefixes_for(MutationDomain::Patients, &scope);
        assert!(prefixes.contains(&keys::appointments::lists()));
        assert!(!prefixes.contains(&keys::dashboard::today_appointments()));
    }

    #[test]
    fn test_missing_entity_falls_back_to_family() {
        let graph = InvalidationGraph::clinic_defaults(3);
        let prefixes = graph.prefixes_for(MutationDomain::Staff, &InvalidationScope::domain_wide());
        assert_eq!(prefixes, vec![keys::staff::details(), keys::staff::lists()]);
    }

    #[test]
    fn test_normalize_drops_covered_prefixes() {
        let set: BTreeSet<QueryKey> = [
            query_key!("appointments", "list", 1),
            query_key!("appointments", "list"),
            query_key!("appointments", "range"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            normalize(set),
            vec![query_key!("appointments", "list"), query_key!("appointments", "range")]
        );
    }

    #[test]
    fn test_invalidate_marks_entries_and_records_history() {
        let store = CacheStore::new(CacheConfig::testing());
        let list = keys::appointments::list([("status", "x")]);
        let unrelated = keys::stock::lists();
        store.set(list.clone(), json!([]), CacheStatus::Fresh);
        store.set(unrelated.clone(), json!([]), CacheStatus::Fresh);

        let graph = InvalidationGraph::clinic_defaults(3).with_history_size(1);
        let report = graph.invalidate(&store, MutationDomain::Appointments, &InvalidationScope::entity(1));
        assert_eq!(report.entries_invalidated, 1);
        assert_eq!(store.peek(&list).unwrap().status, CacheStatus::Stale);
        assert_eq!(store.peek(&unrelated).unwrap().status, CacheStatus::Fresh);

        graph.invalidate(&store, MutationDomain::Staff, &InvalidationScope::domain_wide());
        assert_eq!(graph.recent(10).len(), 1);
        assert_eq!(graph.recent(10)[0].domain, MutationDomain::Staff);
        assert_eq!(graph.stats().total_runs, 2);
        assert_eq!(graph.stats().total_entries_invalidated, 1);
    }
}
