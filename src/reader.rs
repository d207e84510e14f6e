use crate::error::{FlairError, Result};
use crate::links::LinkResolver;
use crate::response::Document;
use crate::rest::ApiContext;
use crate::snapshot::{SnapshotEntry, SnapshotStore};
use crate::token::{Token, TokenProvider};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Entity type holding the system-wide controller mode
pub const STRUCTURES: &str = "structures";

/// EntityReader performs authenticated collection reads and keeps the
/// snapshot store current.
#[derive(Clone)]
pub struct EntityReader {
    ctx: Arc<ApiContext>,
    tokens: Arc<TokenProvider>,
    links: Arc<LinkResolver>,
    snapshots: Arc<SnapshotStore>,
}

impl EntityReader {
    pub fn new(
        ctx: Arc<ApiContext>,
        tokens: Arc<TokenProvider>,
        links: Arc<LinkResolver>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        EntityReader {
            ctx,
            tokens,
            links,
            snapshots,
        }
    }

    /// Fetch the whole collection of `entity_type` with the session token and
    /// store it as the type's snapshot
    #[instrument(skip(self))]
    pub fn fetch(&self, entity_type: &str) -> Result<Document> {
        self.fetch_locked(entity_type, || self.tokens.bearer())
    }

    /// Fetch the whole collection of `entity_type` with a caller-supplied token
    #[instrument(skip(self, token))]
    pub fn fetch_with_token(&self, entity_type: &str, token: &Token) -> Result<Document> {
        self.fetch_locked(entity_type, || Ok(token.clone()))
    }

    /// Fetch a single entity. The snapshot is left alone.
    #[instrument(skip(self))]
    pub fn fetch_entity(&self, entity_type: &str, entity_id: &str) -> Result<Document> {
        let path = self.links.resolve_path(entity_type, Some(entity_id))?;
        let token = self.tokens.bearer()?;
        self.get(&path, &token)
    }

    /// Fetch every entity type in the link table, stopping at the first failure.
    /// Returns the types fetched.
    pub fn fetch_all(&self) -> Result<Vec<String>> {
        let table = self.links.discover_links()?;
        let mut fetched = Vec::with_capacity(table.len());

        for entity_type in table.entity_types() {
            self.fetch(entity_type)?;
            fetched.push(entity_type.to_string());
        }

        Ok(fetched)
    }

    /// Fetch the structures and report whether the controller runs in "auto"
    /// mode. Controlling vents is pointless while it does, but nothing here
    /// prevents it.
    pub fn is_auto_mode_enabled(&self) -> Result<bool> {
        let document = self.fetch(STRUCTURES)?;
        let mode = structure_mode(&document)?;
        debug!(mode, "structure mode");
        Ok(mode == "auto")
    }

    fn fetch_locked(
        &self,
        entity_type: &str,
        token: impl FnOnce() -> Result<Token>,
    ) -> Result<Document> {
        self.snapshots.with_entry(entity_type, |entry| {
            let path = self.links.resolve_path(entity_type, None)?;
            let token = token()?;
            let document = self.get(&path, &token)?;

            *entry = Some(SnapshotEntry::new(document.clone()));
            Ok(document)
        })
    }

    fn get(&self, path: &str, token: &Token) -> Result<Document> {
        let request = self.ctx.authorized(Method::GET, path, &token.access_token)?;
        self.ctx.execute(request).map_err(|e| {
            self.tokens.invalidate_on_unauthorized(token, &e);
            e
        })
    }
}

/// Read `mode` from the first structure, either directly on the resource or
/// from its attributes
fn structure_mode(document: &Document) -> Result<&str> {
    let prefix = if document.is_collection() { "0/" } else { "" };

    document
        .get(&format!("{}mode", prefix))
        .or_else(|| document.get(&format!("{}attributes/mode", prefix)))
        .and_then(Value::as_str)
        .ok_or_else(|| FlairError::schema("structure has no mode"))
}
