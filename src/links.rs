//! Root link discovery.
//!
//! The API root document maps every entity type to its collection path. The
//! table is fetched once per resolver and reused; when the server's link set
//! changes the caller refreshes it explicitly with [`LinkResolver::refresh_links`].

use crate::error::{FlairError, Result};
use crate::rest::ApiContext;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument};

/// Path of the root discovery document
pub const ROOT_PATH: &str = "/api/";

/// Link descriptor of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLink")]
pub struct LinkEntry {
    /// Collection path, e.g. `/api/vents`
    #[serde(rename = "self")]
    pub self_path: String,
}

/// Links come either as `{"self": path}` objects or as bare path strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLink {
    Object {
        #[serde(rename = "self")]
        self_path: String,
    },
    Path(String),
}

impl From<RawLink> for LinkEntry {
    fn from(raw: RawLink) -> Self {
        match raw {
            RawLink::Object { self_path } | RawLink::Path(self_path) => LinkEntry { self_path },
        }
    }
}

/// Mapping from entity type name to its link descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkTable {
    links: BTreeMap<String, LinkEntry>,
}

impl LinkTable {
    /// Create a table from already parsed entries
    pub fn new(links: BTreeMap<String, LinkEntry>) -> Self {
        LinkTable { links }
    }

    /// Build a table from the `links` member of a root document, skipping
    /// members that carry no collection path
    pub fn from_links(links: &serde_json::Map<String, Value>) -> Self {
        let links = links
            .iter()
            .filter_map(|(entity_type, raw)| match LinkEntry::deserialize(raw) {
                Ok(entry) => Some((entity_type.clone(), entry)),
                Err(_) => {
                    debug!(%entity_type, "skipping link without a collection path");
                    None
                }
            })
            .collect();
        LinkTable { links }
    }

    /// Look up the descriptor of an entity type
    pub fn get(&self, entity_type: &str) -> Option<&LinkEntry> {
        self.links.get(entity_type)
    }

    /// All entity types in the table, in name order
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Resolve an entity type, and optionally one entity of it, to a request path
    pub fn resolve_path(&self, entity_type: &str, entity_id: Option<&str>) -> Result<String> {
        let entry = self
            .get(entity_type)
            .ok_or_else(|| FlairError::UnknownEntityType(entity_type.to_string()))?;

        Ok(match entity_id {
            Some(id) => format!("{}/{}", entry.self_path, id),
            None => entry.self_path.clone(),
        })
    }
}

/// LinkResolver fetches the root link table once and resolves entity paths
/// against the cached copy.
pub struct LinkResolver {
    ctx: Arc<ApiContext>,
    cache: Mutex<Option<Arc<LinkTable>>>,
}

impl LinkResolver {
    pub fn new(ctx: Arc<ApiContext>) -> Self {
        LinkResolver {
            ctx,
            cache: Mutex::new(None),
        }
    }

    /// Return the link table, fetching it on the first call only.
    /// Concurrent first callers wait for a single discovery request.
    pub fn discover_links(&self) -> Result<Arc<LinkTable>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = cache.as_ref() {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(self.fetch_links()?);
        *cache = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Fetch the link table again, replacing the cached copy on success.
    /// On failure the previous table stays in place.
    pub fn refresh_links(&self) -> Result<Arc<LinkTable>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let table = Arc::new(self.fetch_links()?);
        *cache = Some(Arc::clone(&table));
        Ok(table)
    }

    /// The cached table, if discovery already happened
    pub fn cached(&self) -> Option<Arc<LinkTable>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Resolve an entity type, and optionally an id, to a request path.
    /// An unknown type does not trigger re-discovery.
    pub fn resolve_path(&self, entity_type: &str, entity_id: Option<&str>) -> Result<String> {
        self.discover_links()?.resolve_path(entity_type, entity_id)
    }

    #[instrument(skip(self))]
    fn fetch_links(&self) -> Result<LinkTable> {
        let request = self
            .ctx
            .request(Method::GET, ROOT_PATH)?
            .header(CONTENT_TYPE, "application/json");

        let response = self.ctx.send(request)?;
        if !response.status.is_success() {
            return Err(FlairError::Discovery {
                status: Some(response.status.as_u16()),
                reason: response.text(),
            });
        }

        let root: Value = serde_json::from_slice(&response.body)?;
        let links = root
            .get("links")
            .and_then(Value::as_object)
            .ok_or_else(|| FlairError::Discovery {
                status: Some(response.status.as_u16()),
                reason: "root document has no links".to_string(),
            })?;

        let table = LinkTable::from_links(links);
        debug!(entity_types = table.len(), "discovered API links");
        Ok(table)
    }
}
