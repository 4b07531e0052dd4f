//! Scripted resources and providers for unit tests

use crate::cancel::CancellationToken;
use anyhow::{Result, bail};
use declarative::{
    BoxedResource, Provider, Resource, ResourceRef, Schedule, TagSet, Value,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type Recorder<T> = Arc<Mutex<Vec<T>>>;

#[derive(Debug, Default)]
pub struct TestResource {
    reference: ResourceRef,
    name: Option<String>,
    tags: TagSet,
    current: Mutex<Vec<(String, Value)>>,
    desired: Vec<(String, Value)>,
    callbacks: Vec<&'static str>,
    invocations: Recorder<String>,
    synced: Recorder<(String, Value)>,
    finished: Arc<AtomicBool>,
    children: Mutex<Vec<TestResource>>,
    eval_children: Mutex<Vec<TestResource>>,
    provider: Option<Arc<dyn Provider>>,
    schedule: Option<Schedule>,
    cancel_on_sync: Option<CancellationToken>,
    fail_sync: bool,
    fail_retrieve: bool,
    fail_callbacks: bool,
    fail_flush: bool,
    fail_finish: bool,
    is_virtual: bool,
    self_refresh: bool,
    deleting: bool,
    purging: bool,
    noop: bool,
    depth_first: bool,
}

impl TestResource {
    pub fn new(type_name: &str, title: &str) -> Self {
        let mut tags = TagSet::new();
        tags.insert(type_name).unwrap();
        Self {
            reference: ResourceRef::new(type_name, title),
            tags,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().copied()).unwrap();
        self
    }

    /// Declare `property` with observed value `is` and desired value `should`
    pub fn with_property(mut self, property: &str, is: Value, should: Value) -> Self {
        if !is.is_absent() {
            self.current
                .get_mut()
                .unwrap()
                .push((property.to_string(), is));
        }
        self.desired.push((property.to_string(), should));
        self
    }

    /// Shorthand for a property that must change
    pub fn out_of_sync(self, property: &str) -> Self {
        self.with_property(property, Value::from("old"), Value::from("new"))
    }

    /// Shorthand for a property that is already correct
    pub fn in_sync(self, property: &str) -> Self {
        self.with_property(property, Value::from("same"), Value::from("same"))
    }

    pub fn with_callbacks(mut self, callbacks: &[&'static str]) -> Self {
        self.callbacks = callbacks.to_vec();
        self
    }

    pub fn refreshable(self) -> Self {
        self.with_callbacks(&["refresh"])
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn generating(self, children: Vec<TestResource>) -> Self {
        *self.children.lock().unwrap() = children;
        self
    }

    pub fn eval_generating(self, children: Vec<TestResource>) -> Self {
        *self.eval_children.lock().unwrap() = children;
        self
    }

    /// Cancel `token` once this resource has synced a property
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_sync = Some(token);
        self
    }

    pub fn failing_sync(mut self) -> Self {
        self.fail_sync = true;
        self
    }

    pub fn failing_retrieve(mut self) -> Self {
        self.fail_retrieve = true;
        self
    }

    pub fn failing_callbacks(mut self) -> Self {
        self.fail_callbacks = true;
        self
    }

    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    pub fn virtual_only(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn self_refreshing(mut self) -> Self {
        self.self_refresh = true;
        self.refreshable()
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn purging(mut self) -> Self {
        self.purging = true;
        self
    }

    pub fn noop(mut self) -> Self {
        self.noop = true;
        self
    }

    pub fn depth_first(mut self) -> Self {
        self.depth_first = true;
        self
    }

    pub fn invocations(&self) -> Recorder<String> {
        Arc::clone(&self.invocations)
    }

    pub fn synced(&self) -> Recorder<(String, Value)> {
        Arc::clone(&self.synced)
    }

    pub fn finished(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }
}

impl Resource for TestResource {
    fn reference(&self) -> ResourceRef {
        self.reference.clone()
    }

    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.reference.title.clone())
    }

    fn tags(&self) -> &TagSet {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut TagSet {
        &mut self.tags
    }

    fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn self_refresh(&self) -> bool {
        self.self_refresh
    }

    fn deleting(&self) -> bool {
        self.deleting
    }

    fn purging(&self) -> bool {
        self.purging
    }

    fn noop(&self) -> bool {
        self.noop
    }

    fn depth_first(&self) -> bool {
        self.depth_first
    }

    fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.provider.clone()
    }

    fn retrieve(&self) -> Result<Vec<(String, Value)>> {
        if self.fail_retrieve {
            bail!("permission denied");
        }
        Ok(self.current.lock().unwrap().clone())
    }

    fn desired(&self) -> Vec<(String, Value)> {
        self.desired.clone()
    }

    fn sync(&self, property: &str, should: &Value) -> Result<()> {
        if self.fail_sync {
            bail!("provider refused {property}");
        }
        let mut current = self.current.lock().unwrap();
        current.retain(|(p, _)| p != property);
        current.push((property.to_string(), should.clone()));
        self.synced
            .lock()
            .unwrap()
            .push((property.to_string(), should.clone()));
        if let Some(token) = &self.cancel_on_sync {
            token.cancel();
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if self.fail_flush {
            bail!("flush failed");
        }
        Ok(())
    }

    fn callbacks(&self) -> &[&'static str] {
        &self.callbacks
    }

    fn invoke(&self, callback: &str) -> Result<()> {
        if self.fail_callbacks {
            bail!("{callback} exited with status 1");
        }
        self.invocations.lock().unwrap().push(callback.to_string());
        Ok(())
    }

    fn generate(&self) -> Result<Vec<BoxedResource>> {
        Ok(self
            .children
            .lock()
            .unwrap()
            .drain(..)
            .map(|c| Box::new(c) as BoxedResource)
            .collect())
    }

    fn eval_generate(&self) -> Result<Vec<BoxedResource>> {
        Ok(self
            .eval_children
            .lock()
            .unwrap()
            .drain(..)
            .map(|c| Box::new(c) as BoxedResource)
            .collect())
    }

    fn finish(&mut self) -> Result<()> {
        if self.fail_finish {
            bail!("missing required parameter");
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct TestProvider {
    name: &'static str,
    resource_type: &'static str,
    fail: bool,
    pub prefetched: Recorder<BTreeMap<String, ResourceRef>>,
}

impl TestProvider {
    pub fn new(name: &'static str, resource_type: &'static str) -> Self {
        Self {
            name,
            resource_type,
            fail: false,
            prefetched: Arc::default(),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Provider for TestProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn resource_type(&self) -> &str {
        self.resource_type
    }

    fn supports_prefetch(&self) -> bool {
        true
    }

    fn prefetch(&self, resources: &BTreeMap<String, ResourceRef>) -> Result<()> {
        if self.fail {
            bail!("command not found");
        }
        self.prefetched.lock().unwrap().push(resources.clone());
        Ok(())
    }
}
