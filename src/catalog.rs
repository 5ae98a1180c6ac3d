//! Catalog Index
//!
//! Category ancestry lookups consumed by the scope resolver. The category
//! tree itself is owned elsewhere (catalog administration); the engine only
//! ever asks "this category and all of its ancestors".

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;

/// Guard against malformed parent links; a real category tree is shallow.
const MAX_ANCESTRY_DEPTH: usize = 64;

/// Resolves a category to its ancestor chain.
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    /// The category itself followed by its ancestors, root last.
    /// Unknown categories resolve to just themselves.
    async fn category_ancestors(&self, category_id: Uuid) -> Result<Vec<Uuid>>;
}

/// Prefetched ancestor chains for the categories of one order.
///
/// Built by the orchestrator so the scope resolver stays a pure function
/// over already-fetched data.
#[derive(Clone, Debug, Default)]
pub struct CategoryAncestry {
    chains: HashMap<Uuid, Vec<Uuid>>,
}

impl CategoryAncestry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category_id: Uuid, chain: Vec<Uuid>) {
        self.chains.insert(category_id, chain);
    }

    /// The prefetched chain for a category, empty when none was fetched.
    /// `any_in` still checks the category itself either way.
    pub fn lineage(&self, category_id: Uuid) -> &[Uuid] {
        self.chains
            .get(&category_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the category or any of its ancestors is in `set`.
    pub fn any_in(&self, category_id: Uuid, set: &std::collections::HashSet<Uuid>) -> bool {
        if set.contains(&category_id) {
            return true;
        }
        self.lineage(category_id).iter().any(|c| set.contains(c))
    }
}

/// In-memory adjacency catalog, used by tests and the in-memory backend.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    parents: HashMap<Uuid, Option<Uuid>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category_id: Uuid, parent_id: Option<Uuid>) {
        self.parents.insert(category_id, parent_id);
    }

    pub fn with_edge(mut self, category_id: Uuid, parent_id: Option<Uuid>) -> Self {
        self.insert(category_id, parent_id);
        self
    }

    fn walk(&self, category_id: Uuid) -> Vec<Uuid> {
        let mut chain = vec![category_id];
        let mut cursor = category_id;
        while let Some(Some(parent)) = self.parents.get(&cursor) {
            if chain.len() >= MAX_ANCESTRY_DEPTH || chain.contains(parent) {
                tracing::warn!(category = %category_id, "category ancestry walk aborted");
                break;
            }
            chain.push(*parent);
            cursor = *parent;
        }
        chain
    }
}

#[async_trait]
impl CatalogIndex for StaticCatalog {
    async fn category_ancestors(&self, category_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.walk(category_id))
    }
}
