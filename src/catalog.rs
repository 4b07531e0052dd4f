//! Catalog - the compiled set of resources and relationships for one run
//!
//! Resources live in an arena and are addressed by [`ResourceId`], which
//! stays valid for the catalog's lifetime. Insertion only ever appends, so
//! resources generated during a run get fresh ids without disturbing the
//! ones already ordered.

use crate::error::{Error, Result};
use crate::graph::Relationship;
use declarative::{BoxedResource, Resource, ResourceRef};
use std::collections::HashMap;
use std::fmt;

/// Stable arena key for a catalog resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Catalog {
    name: String,
    version: Option<String>,
    host_config: bool,
    resources: Vec<BoxedResource>,
    by_ref: HashMap<ResourceRef, ResourceId>,
    /// (type, system name) aliases
    by_name: HashMap<(String, String), ResourceId>,
    relationships: Vec<Relationship>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            host_config: true,
            resources: Vec::new(),
            by_ref: HashMap::new(),
            by_name: HashMap::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Mark whether this catalog describes a real host
    ///
    /// Tag filters only apply to host catalogs.
    pub fn with_host_config(mut self, host_config: bool) -> Self {
        self.host_config = host_config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn host_config(&self) -> bool {
        self.host_config
    }

    /// Add a resource, rejecting a collision on title or name within its type
    pub fn add_resource(&mut self, resource: BoxedResource) -> Result<ResourceId> {
        self.add_resource_with(resource, |_| Ok(()))
    }

    /// Add a resource, running `on_insert` only once the collision check passed
    ///
    /// If `on_insert` fails the resource is discarded.
    pub fn add_resource_with<F>(&mut self, mut resource: BoxedResource, on_insert: F) -> Result<ResourceId>
    where
        F: FnOnce(&mut dyn Resource) -> anyhow::Result<()>,
    {
        let reference = resource.reference();
        let alias = (reference.type_name.clone(), resource.name());

        // Titles and names share one namespace per type
        let existing = self
            .by_ref
            .get(&reference)
            .or_else(|| self.by_name.get(&alias))
            .or_else(|| {
                self.by_ref
                    .get(&ResourceRef::new(reference.type_name.clone(), alias.1.clone()))
            })
            .or_else(|| {
                self.by_name
                    .get(&(reference.type_name.clone(), reference.title.clone()))
            })
            .copied();
        if let Some(existing) = existing {
            return Err(Error::DuplicateResource {
                reference,
                existing: self.resources[existing.0].reference(),
            });
        }

        on_insert(resource.as_mut()).map_err(|e| Error::FinishFailed {
            reference: reference.clone(),
            message: format!("{e:#}"),
        })?;

        let id = ResourceId(self.resources.len());
        self.resources.push(resource);
        self.by_ref.insert(reference, id);
        self.by_name.insert(alias, id);
        Ok(id)
    }

    /// Look up a resource by reference, falling back to its system name
    pub fn find_resource(&self, reference: &ResourceRef) -> Option<ResourceId> {
        self.by_ref.get(reference).copied().or_else(|| {
            self.by_name
                .get(&(reference.type_name.clone(), reference.title.clone()))
                .copied()
        })
    }

    /// Borrow a resource by id
    ///
    /// Ids are only minted by this catalog, so indexing cannot go out of bounds.
    pub fn resource(&self, id: ResourceId) -> &dyn Resource {
        self.resources[id.0].as_ref()
    }

    pub fn reference(&self, id: ResourceId) -> ResourceRef {
        self.resource(id).reference()
    }

    /// All resource ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + use<> {
        (0..self.resources.len()).map(ResourceId)
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &dyn Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceId(i), r.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("resources", &self.resources.len())
            .field("relationships", &self.relationships.len())
            .finish()
    }
}
