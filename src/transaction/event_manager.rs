//! Event routing between resources
//!
//! Events are matched against the relationship graph when they are queued.
//! Each matching edge with a callback the target supports queues the event
//! under (target, callback). The target drains its queue on its own turn;
//! evaluation follows a topological order of the same graph, so by then
//! every upstream event that could trigger it has already been queued.

use super::Scope;
use crate::catalog::ResourceId;
use crate::graph::REFRESH;
use declarative::{Event, EventStatus, NOOP_RESTART, RESTARTED};
use std::collections::{HashMap, HashSet};

/// Events waiting to trigger one callback on one resource
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackQueue {
    pub callback: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct EventManager {
    events: Vec<Event>,
    queues: HashMap<ResourceId, Vec<CallbackQueue>>,
    /// Resources whose queue has been drained
    processed: HashSet<ResourceId>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event queued during the run, in order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Callbacks currently queued for `resource`
    pub fn queued_events(&self, resource: ResourceId) -> &[CallbackQueue] {
        self.queues.get(&resource).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record an event from `resource` and queue it for every subscriber
    pub(crate) fn queue_event(&mut self, scope: &mut Scope<'_>, resource: ResourceId, event: Event) {
        self.events.push(event.clone());
        scope.report.register_event(event.clone());

        let targets: Vec<(ResourceId, String)> = scope
            .graph
            .matching_edges(&event, resource)
            .into_iter()
            .filter_map(|edge| {
                let callback = edge.callback.as_ref()?;
                scope
                    .catalog
                    .resource(edge.target)
                    .supports(callback)
                    .then(|| (edge.target, callback.clone()))
            })
            .collect();

        for (target, callback) in targets {
            self.queue_event_for_resource(scope, resource, target, &callback, event.clone());
        }

        let source = scope.catalog.resource(resource);
        let refresh_self = source.self_refresh() && !source.deleting();
        if refresh_self {
            self.queue_event_for_resource(scope, resource, resource, REFRESH, event);
        }
    }

    pub(crate) fn queue_event_for_resource(
        &mut self,
        scope: &mut Scope<'_>,
        source: ResourceId,
        target: ResourceId,
        callback: &str,
        event: Event,
    ) {
        let source_ref = scope.catalog.reference(source);
        let target_ref = scope.catalog.reference(target);

        if self.processed.contains(&target) {
            log::debug!(
                "{source_ref}: Not scheduling {callback} of {target_ref}; it was already evaluated"
            );
            return;
        }

        scope.info(&source_ref, format!("Scheduling {callback} of {target_ref}"));

        let queues = self.queues.entry(target).or_default();
        match queues.iter_mut().find(|q| q.callback == callback) {
            Some(queue) => queue.events.push(event),
            None => queues.push(CallbackQueue {
                callback: callback.to_string(),
                events: vec![event],
            }),
        }
    }

    /// Drain and respond to the events queued for `resource`
    pub(crate) fn process_events(&mut self, scope: &mut Scope<'_>, resource: ResourceId) {
        self.processed.insert(resource);
        let Some(queues) = self.queues.remove(&resource) else {
            return;
        };

        let mut restarted = false;
        for queue in queues {
            restarted |= self.process_callback(scope, resource, &queue.callback, &queue.events);
        }

        if restarted {
            let reference = scope.catalog.reference(resource);
            let event = Event::new(reference, RESTARTED, EventStatus::Success)
                .with_message("restarted");
            self.queue_event(scope, resource, event);
            scope.metrics.restarted += 1;
        }
    }

    /// Run one callback; returns whether it actually ran and succeeded
    fn process_callback(
        &mut self,
        scope: &mut Scope<'_>,
        resource: ResourceId,
        callback: &str,
        events: &[Event],
    ) -> bool {
        if events.iter().all(Event::is_noop) {
            self.process_noop_events(scope, resource, callback, events);
            return false;
        }

        let reference = scope.catalog.reference(resource);
        let result = scope.catalog.resource(resource).invoke(callback);
        match result {
            Ok(()) => {
                scope.notice(
                    &reference,
                    format!("Triggered '{callback}' from {} events", events.len()),
                );
                true
            }
            Err(e) => {
                scope.err(&reference, format!("Failed to call {callback}: {e:#}"));
                scope.metrics.failed_restarts += 1;
                false
            }
        }
    }

    fn process_noop_events(
        &mut self,
        scope: &mut Scope<'_>,
        resource: ResourceId,
        callback: &str,
        events: &[Event],
    ) {
        let reference = scope.catalog.reference(resource);
        scope.notice(
            &reference,
            format!("Would have triggered '{callback}' from {} events", events.len()),
        );

        let event = Event::new(reference, NOOP_RESTART, EventStatus::Noop)
            .with_message(format!("would have triggered '{callback}'"));
        self.queue_event(scope, resource, event);
    }
}
