//! Resolves name-or-ID references to DefectDojo numeric IDs.

use tracing::{debug, warn};

use crate::models::defectdojo::{NamedResource, Reference, ResourceKind};
use crate::services::defectdojo_client::DefectDojoApi;

/// How a named reference was matched against a resource list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Case-insensitive exact name match
    Exact(i64),
    /// No match; first listed resource used instead
    Fallback(i64),
}

/// Pick the resource matching `name`, or the first one when nothing matches.
/// `None` only for an empty list.
pub fn select(resources: &[NamedResource], name: &str) -> Option<Selection> {
    let wanted = name.to_lowercase();
    if let Some(found) = resources.iter().find(|r| r.name.to_lowercase() == wanted) {
        return Some(Selection::Exact(found.id));
    }
    resources.first().map(|r| Selection::Fallback(r.id))
}

pub struct IdentifierResolver<'a, A: DefectDojoApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: DefectDojoApi + ?Sized> IdentifierResolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Resolve a reference to a numeric ID.
    ///
    /// Numeric references are returned without any lookup. Named references
    /// that match nothing fall back to the first listed resource so that a
    /// drifting environment name does not block a pipeline. Returns `None`
    /// when the resource list is empty.
    pub async fn resolve(&self, kind: ResourceKind, reference: &Reference) -> Option<i64> {
        let name = match reference {
            Reference::Numeric(id) => return Some(*id),
            Reference::Named(name) => name,
        };

        let resources = self.api.list_resource(kind).await;
        match select(&resources, name) {
            Some(Selection::Exact(id)) => {
                debug!(kind = kind.label(), name = %name, id, "Resolved reference");
                Some(id)
            }
            Some(Selection::Fallback(id)) => {
                let first = &resources[0];
                warn!(
                    "{} '{}' not found. Using first available {}: {} (ID: {})",
                    kind.label(),
                    name,
                    kind.label(),
                    first.name,
                    id
                );
                Some(id)
            }
            None => {
                warn!(kind = kind.label(), reference = %reference, "No resources available to resolve against");
                None
            }
        }
    }
}
