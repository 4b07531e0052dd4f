//! Change computation for resources

use crate::change::Change;
use crate::resource::Resource;
use crate::types::Value;
use anyhow::Result;
use std::collections::HashMap;

/// Name of the property that controls existence
pub const ENSURE: &str = "ensure";

/// Compute the out-of-sync changes for a resource, in declaration order
///
/// Existence dominates: when `ensure` is out of sync only the `ensure`
/// change is returned, and a resource that is correctly absent yields no
/// changes at all.
pub fn compute_changes(resource: &dyn Resource) -> Result<Vec<Change>> {
    let current: HashMap<String, Value> = resource.retrieve()?.into_iter().collect();
    let desired = resource.desired();
    let reference = resource.reference();

    let is_of = |property: &str| current.get(property).cloned().unwrap_or(Value::Absent);

    if let Some((_, should)) = desired.iter().find(|(p, _)| p == ENSURE) {
        let is = is_of(ENSURE);
        if !resource.insync(ENSURE, &is, should) {
            return Ok(vec![Change::new(reference, ENSURE, is, should.clone())]);
        }
        if is.is_absent() {
            return Ok(Vec::new());
        }
    }

    Ok(desired
        .into_iter()
        .filter(|(property, _)| property != ENSURE)
        .filter_map(|(property, should)| {
            let is = is_of(&property);
            if resource.insync(&property, &is, &should) {
                None
            } else {
                Some(Change::new(reference.clone(), property, is, should))
            }
        })
        .collect())
}
