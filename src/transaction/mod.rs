//! Transaction: one application pass over a catalog
//!
//! A run goes through three phases:
//!
//! 1. **Preparation**: declared relationships are resolved into a
//!    [`RelationshipGraph`], `generate` is called on every resource (and on
//!    the resources that produces), and the graph is sorted. A cycle stops
//!    the run here, before anything has been applied.
//! 2. **Prefetching**: resources are grouped by provider and each group is
//!    prefetched once, keyed by system name, on a rayon pool.
//! 3. **Evaluation**: resources are visited in topological order. Each one
//!    is either skipped or converged; its events are routed by the
//!    [`EventManager`] and callbacks queued for it fire at the end of its
//!    turn.
//!
//! Failures while converging are contained: they become failure events,
//! log entries and metrics, and mark the resource failed so that its
//! dependents are skipped.

pub mod event_manager;
pub mod metrics;

use crate::cancel::CancellationToken;
use crate::catalog::{Catalog, ResourceId};
use crate::config::TransactionOptions;
use crate::error::{Error, Result};
use crate::graph::{Edge, RelationshipGraph};
use crate::report::{LogLevel, Report};
use chrono::{Local, NaiveDateTime, Utc};
use declarative::{
    Change, Event, EventStatus, Provider, ResourceExt, ResourceRef, TagList, compute_changes,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub use event_manager::{CallbackQueue, EventManager};
pub use metrics::{ResourceMetrics, TimeMetrics};

/// Log source for messages not tied to a resource
const SOURCE: &str = "steward";

/// Resources sharing one provider, keyed by system name
type PrefetchGroup = (Arc<dyn Provider>, BTreeMap<String, ResourceRef>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Prefetching,
    Evaluating,
    /// Cancelled between two resources
    Stopped,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    Generate,
    EvalGenerate,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => f.write_str("generate"),
            Self::EvalGenerate => f.write_str("eval_generate"),
        }
    }
}

/// Send a message to the `log` facade and record it in the report
fn record(report: &mut Report, level: LogLevel, source: &str, message: String) {
    match level {
        LogLevel::Debug => log::debug!("{source}: {message}"),
        LogLevel::Info | LogLevel::Notice => log::info!("{source}: {message}"),
        LogLevel::Warning => log::warn!("{source}: {message}"),
        LogLevel::Err => log::error!("{source}: {message}"),
    }
    report.log(level, source, message);
}

/// Borrowed view of the transaction handed to the event manager
pub(crate) struct Scope<'a> {
    catalog: &'a Catalog,
    graph: &'a RelationshipGraph,
    report: &'a mut Report,
    metrics: &'a mut ResourceMetrics,
}

impl Scope<'_> {
    fn info(&mut self, source: &ResourceRef, message: String) {
        record(self.report, LogLevel::Info, &source.to_string(), message);
    }

    fn notice(&mut self, source: &ResourceRef, message: String) {
        record(self.report, LogLevel::Notice, &source.to_string(), message);
    }

    fn err(&mut self, source: &ResourceRef, message: String) {
        record(self.report, LogLevel::Err, &source.to_string(), message);
    }
}

/// One application pass over a catalog
///
/// ```
/// use steward::{Catalog, Transaction, TransactionOptions};
///
/// let catalog = Catalog::new("web01");
/// let mut transaction = Transaction::new(catalog, TransactionOptions::default());
/// transaction.evaluate().unwrap();
/// assert!(!transaction.any_failed());
/// ```
#[derive(Debug)]
pub struct Transaction {
    catalog: Catalog,
    options: TransactionOptions,
    tags: TagList,
    cancel: CancellationToken,
    /// Clock used for schedule checks
    now: NaiveDateTime,
    graph: RelationshipGraph,
    event_manager: EventManager,
    report: Report,
    metrics: ResourceMetrics,
    timings: TimeMetrics,
    changes: Vec<Change>,
    /// Changes that synced successfully
    change_count: usize,
    failed: HashSet<ResourceId>,
    /// Resources skipped because a dependency failed
    dependency_failed: HashSet<ResourceId>,
    state: TransactionState,
}

impl Transaction {
    pub fn new(catalog: Catalog, options: TransactionOptions) -> Self {
        let report = Report::new(catalog.name());
        let metrics = ResourceMetrics::new(catalog.len());
        Self {
            tags: options.tags.clone(),
            catalog,
            options,
            cancel: CancellationToken::new(),
            now: Local::now().naive_local(),
            graph: RelationshipGraph::new(),
            event_manager: EventManager::new(),
            report,
            metrics,
            timings: TimeMetrics::default(),
            changes: Vec::new(),
            change_count: 0,
            failed: HashSet::new(),
            dependency_failed: HashSet::new(),
            state: TransactionState::Pending,
        }
    }

    /// Stop at the next resource boundary once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Evaluate schedules against `now` instead of the local clock
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Give the catalog back, e.g. to run it again
    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    /// Replace the tag filter; strings are split on commas
    pub fn set_tags(&mut self, tags: impl Into<TagList>) {
        self.tags = tags.into();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop_processing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn metrics(&self) -> &ResourceMetrics {
        &self.metrics
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.event_manager
    }

    /// Every event produced during the run, in order
    pub fn events(&self) -> &[Event] {
        self.event_manager.events()
    }

    /// Every change that was attempted, in order
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn any_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn failed(&self, id: ResourceId) -> bool {
        self.failed.contains(&id)
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Run the transaction
    ///
    /// Only a broken relationship graph is returned as an error, and it is
    /// detected before any resource is touched.
    pub fn evaluate(&mut self) -> Result<()> {
        let order = self.prepare()?;

        if let Some(version) = self.catalog.version().map(str::to_string) {
            self.log(
                LogLevel::Info,
                SOURCE,
                format!("Applying configuration version '{version}'"),
            );
        }

        self.state = TransactionState::Evaluating;
        for (n, &id) in order.iter().enumerate() {
            if self.stop_processing() {
                let message = format!(
                    "Stopping evaluation; {} resources were not evaluated",
                    order.len() - n
                );
                self.log(LogLevel::Notice, SOURCE, message);
                self.state = TransactionState::Stopped;
                return Ok(());
            }

            let started = Instant::now();
            self.eval_resource(id, None);

            if self.options.evaltrace {
                let source = self.catalog.reference(id).to_string();
                let message = format!(
                    "Evaluated in {:.2} seconds",
                    started.elapsed().as_secs_f64()
                );
                self.log(LogLevel::Info, &source, message);
            }
        }

        self.state = TransactionState::Completed;
        Ok(())
    }

    /// Build the graph, generate resources, sort and prefetch
    fn prepare(&mut self) -> Result<Vec<ResourceId>> {
        self.graph = RelationshipGraph::from_catalog(&self.catalog)?;

        let mut pending: VecDeque<ResourceId> = self.catalog.ids().collect();
        while let Some(id) = pending.pop_front() {
            let children = self.generate_additional_resources(id, Generation::Generate);
            pending.extend(children);
        }

        let order = self.graph.topological_order(&self.catalog)?;
        log::debug!("Evaluation order has {} resources", order.len());

        self.state = TransactionState::Prefetching;
        self.prefetch();
        Ok(order)
    }

    /// Insert the children `parent` generates and link them to it
    ///
    /// Children inherit the parent's tags and are finished on insertion. A
    /// child colliding with an existing resource is dropped unfinished.
    fn generate_additional_resources(
        &mut self,
        parent: ResourceId,
        phase: Generation,
    ) -> Vec<ResourceId> {
        let resource = self.catalog.resource(parent);
        let generated = match phase {
            Generation::Generate => resource.generate(),
            Generation::EvalGenerate => resource.eval_generate(),
        };
        let depth_first = resource.depth_first();
        let tags: Vec<String> = resource.tags().iter().map(str::to_string).collect();
        let parent_source = self.catalog.reference(parent).to_string();

        let children = match generated {
            Ok(children) => children,
            Err(e) => {
                let message =
                    format!("Failed to generate additional resources using '{phase}': {e:#}");
                self.log(LogLevel::Err, &parent_source, message);
                return Vec::new();
            }
        };

        let mut added = Vec::with_capacity(children.len());
        for child in children {
            let inserted = self.catalog.add_resource_with(child, |child| {
                child.tags_mut().extend(tags.iter().map(String::as_str))?;
                child.finish()
            });

            match inserted {
                Ok(id) => {
                    self.metrics.total += 1;
                    let (first, second) = if depth_first { (id, parent) } else { (parent, id) };
                    self.graph.add_vertex(id);
                    if !self.graph.has_edge(second, first) {
                        self.graph.add_edge(Edge::ordering(first, second));
                    }
                    added.push(id);
                }
                Err(Error::DuplicateResource { reference, .. }) => {
                    self.log(
                        LogLevel::Notice,
                        &reference.to_string(),
                        "Duplicate generated resource; skipping".to_string(),
                    );
                }
                Err(e) => self.log(LogLevel::Err, &parent_source, e.to_string()),
            }
        }

        if !added.is_empty() {
            log::debug!("{parent_source}: {phase} added {} resources", added.len());
        }
        added
    }

    /// Prefetch every provider group once
    fn prefetch(&mut self) {
        let mut groups: BTreeMap<(String, String), PrefetchGroup> = BTreeMap::new();
        for (_, resource) in self.catalog.resources() {
            let Some(provider) = resource.provider() else {
                continue;
            };
            if !provider.supports_prefetch() {
                continue;
            }
            let key = (
                provider.resource_type().to_string(),
                provider.name().to_string(),
            );
            groups
                .entry(key)
                .or_insert_with(|| (Arc::clone(&provider), BTreeMap::new()))
                .1
                .entry(resource.name())
                .or_insert_with(|| resource.reference());
        }

        if groups.is_empty() {
            return;
        }

        let groups: Vec<PrefetchGroup> = groups.into_values().collect();
        for (label, e) in self.run_prefetch(&groups) {
            self.log(
                LogLevel::Err,
                SOURCE,
                format!("Could not prefetch {label}: {e:#}"),
            );
        }
    }

    fn run_prefetch(&self, groups: &[PrefetchGroup]) -> Vec<(String, anyhow::Error)> {
        let prefetch_one = |(provider, resources): &PrefetchGroup| {
            log::debug!(
                "Prefetching {} resources for {} provider '{}'",
                resources.len(),
                provider.resource_type(),
                provider.name()
            );
            provider.prefetch(resources).err().map(|e| {
                let label = format!("{} provider '{}'", provider.resource_type(), provider.name());
                (label, e)
            })
        };

        if self.options.jobs > 1 && groups.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.jobs)
                .build()
            {
                Ok(pool) => {
                    return pool.install(|| groups.par_iter().filter_map(prefetch_one).collect());
                }
                Err(e) => log::warn!("Could not start prefetch pool, prefetching sequentially: {e}"),
            }
        }

        groups.iter().filter_map(prefetch_one).collect()
    }

    /// Skip or converge one resource, then fire its queued callbacks
    fn eval_resource(&mut self, id: ResourceId, ancestor: Option<ResourceId>) {
        if self.skip(id) {
            self.metrics.skipped += 1;
            return;
        }
        self.eval_children_and_apply_resource(id, ancestor);
    }

    /// Converge a resource together with the children it generates now
    ///
    /// Depth-first children are converged before the parent and are never
    /// skipped. Other children follow the parent and go through [`skip`].
    /// Events from children are routed as if the outermost parent raised
    /// them.
    ///
    /// [`skip`]: Self::skip
    fn eval_children_and_apply_resource(&mut self, id: ResourceId, ancestor: Option<ResourceId>) {
        self.metrics.scheduled += 1;

        let children = self.generate_additional_resources(id, Generation::EvalGenerate);
        let depth_first = self.catalog.resource(id).depth_first();
        let child_ancestor = Some(ancestor.unwrap_or(id));

        if depth_first {
            for &child in &children {
                self.eval_children_and_apply_resource(child, child_ancestor);
            }
        }

        self.apply(id, ancestor);

        if !depth_first {
            for &child in &children {
                self.eval_resource(child, child_ancestor);
            }
        }

        self.process_events(id);
    }

    /// Whether `id` must not be applied in this run
    ///
    /// A resource skipped for failed dependencies is remembered so its own
    /// dependents are skipped too.
    fn skip(&mut self, id: ResourceId) -> bool {
        let source = self.catalog.reference(id).to_string();

        if self.missing_tags(id) {
            let message = format!("Not tagged with {}", self.tags.as_slice().join(", "));
            self.log(LogLevel::Debug, &source, message);
            true
        } else if !self.scheduled(id) {
            self.log(LogLevel::Debug, &source, "Not scheduled".to_string());
            true
        } else if self.failed_dependencies(id) {
            self.dependency_failed.insert(id);
            true
        } else if self.catalog.resource(id).is_virtual() {
            self.log(LogLevel::Debug, &source, "Skipping because virtual".to_string());
            true
        } else {
            false
        }
    }

    /// A tag filter is active and `id` carries none of its tags
    ///
    /// Filters only apply to host catalogs, and an empty filter admits
    /// everything.
    pub fn missing_tags(&self, id: ResourceId) -> bool {
        if !self.catalog.host_config() || self.tags.is_empty() {
            return false;
        }
        !self.catalog.resource(id).tagged(self.tags.as_slice())
    }

    pub fn scheduled(&self, id: ResourceId) -> bool {
        self.options.ignore_schedules || self.catalog.resource(id).scheduled_at(self.now)
    }

    /// Whether a direct dependency failed or was itself skipped for that
    fn failed_dependencies(&mut self, id: ResourceId) -> bool {
        let source = self.catalog.reference(id).to_string();
        let failed: Vec<ResourceId> = self
            .graph
            .dependencies(id)
            .into_iter()
            .filter(|dep| self.failed.contains(dep) || self.dependency_failed.contains(dep))
            .collect();

        for dep in &failed {
            let message = format!("Dependency {} has failures: true", self.catalog.reference(*dep));
            self.log(LogLevel::Notice, &source, message);
        }
        !failed.is_empty()
    }

    /// Compute and apply the changes of a single resource
    fn apply(&mut self, id: ResourceId, ancestor: Option<ResourceId>) {
        let started = Instant::now();
        let reference = self.catalog.reference(id);

        match compute_changes(self.catalog.resource(id)) {
            Ok(changes) if changes.is_empty() => {}
            Ok(changes) => {
                self.metrics.out_of_sync += 1;
                if self.allow_processing(id) {
                    self.apply_changes(id, ancestor, changes);
                }
            }
            Err(e) => {
                self.log(
                    LogLevel::Err,
                    &reference.to_string(),
                    format!("Could not evaluate: {e:#}"),
                );
                self.mark_failed(id);
            }
        }

        self.timings.record(&reference.type_name, started.elapsed());
    }

    /// A purged resource is kept while anything not being deleted depends on it
    fn allow_processing(&mut self, id: ResourceId) -> bool {
        let resource = self.catalog.resource(id);
        if !(resource.purging() && resource.deleting()) {
            return true;
        }

        let blockers: Vec<String> = self
            .graph
            .dependents(id)
            .into_iter()
            .filter(|&dep| !self.catalog.resource(dep).deleting())
            .map(|dep| self.catalog.reference(dep).to_string())
            .collect();
        if blockers.is_empty() {
            return true;
        }

        let verb = if blockers.len() == 1 { "depends" } else { "depend" };
        let message = format!("{} still {verb} on me -- not purging", blockers.join(", "));
        let source = self.catalog.reference(id).to_string();
        self.log(LogLevel::Warning, &source, message);
        false
    }

    /// Apply `changes` in order, queueing one event per change
    fn apply_changes(&mut self, id: ResourceId, ancestor: Option<ResourceId>, changes: Vec<Change>) {
        let source = self.catalog.reference(id).to_string();
        let noop = self.options.noop || self.catalog.resource(id).noop();
        let mut failed = false;
        let mut synced = false;

        for mut change in changes {
            let event = change.apply(self.catalog.resource(id), noop);
            match event.status {
                EventStatus::Success => {
                    synced = true;
                    self.change_count += 1;
                    self.log(LogLevel::Notice, &source, event.message.clone());
                }
                EventStatus::Noop => self.log(LogLevel::Notice, &source, event.message.clone()),
                EventStatus::Failure => {
                    failed = true;
                    self.log(LogLevel::Err, &source, event.message.clone());
                }
            }
            self.changes.push(change);
            self.queue_event(ancestor.unwrap_or(id), event);
        }
        self.metrics.applied += 1;

        if synced && let Err(e) = self.catalog.resource(id).flush() {
            self.log(LogLevel::Err, &source, format!("Could not flush: {e:#}"));
            failed = true;
        }

        if failed {
            self.mark_failed(id);
        }
    }

    fn mark_failed(&mut self, id: ResourceId) {
        if self.failed.insert(id) {
            self.metrics.failed += 1;
        }
    }

    fn queue_event(&mut self, id: ResourceId, event: Event) {
        let mut scope = Scope {
            catalog: &self.catalog,
            graph: &self.graph,
            report: &mut self.report,
            metrics: &mut self.metrics,
        };
        self.event_manager.queue_event(&mut scope, id, event);
    }

    fn process_events(&mut self, id: ResourceId) {
        let mut scope = Scope {
            catalog: &self.catalog,
            graph: &self.graph,
            report: &mut self.report,
            metrics: &mut self.metrics,
        };
        self.event_manager.process_events(&mut scope, id);
    }

    fn log(&mut self, level: LogLevel, source: &str, message: String) {
        record(&mut self.report, level, source, message);
    }

    /// Publish resource, time and change metrics and stamp the report
    pub fn add_metrics_to_report(&self, report: &mut Report) {
        report.newmetric("resources", self.metrics.values());
        report.newmetric("time", self.timings.values());
        report.newmetric("changes", [("total", self.change_count as f64)]);
        report.set_time(Utc::now());
    }

    /// Add metrics to the transaction's own report and return it
    pub fn generate_report(&mut self) -> &Report {
        let mut report = std::mem::take(&mut self.report);
        self.add_metrics_to_report(&mut report);
        self.report = report;
        &self.report
    }
}
