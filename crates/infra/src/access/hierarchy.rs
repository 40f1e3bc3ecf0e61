//! Subtree resolution over the organization tree.

use std::collections::BTreeSet;

use tracing::instrument;

use deskhive_core::OrgId;

use crate::error::{AccessError, AccessResult};
use crate::store::DirectoryStore;

/// `root` plus every organization reachable through child links.
///
/// Walks the tree one level at a time (one `child_org_ids` call per level), so
/// the rows read are O(descendants) regardless of depth. Fails with `NotFound`
/// when `root` does not exist. Ids already visited are not expanded again.
#[instrument(skip(store), fields(root = %root))]
pub async fn resolve_descendants(store: &dyn DirectoryStore, root: OrgId) -> AccessResult<BTreeSet<OrgId>> {
    if store.get_org(root).await?.is_none() {
        return Err(AccessError::not_found(format!("organization {root}")));
    }

    let mut visited = BTreeSet::from([root]);
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let children = store.child_org_ids(&frontier).await?;
        frontier = children.into_iter().filter(|id| visited.insert(*id)).collect();
    }

    tracing::debug!(descendants = visited.len(), "subtree resolved");
    Ok(visited)
}
