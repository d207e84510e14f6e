use crate::config::Config;
use crate::controller::{EntityController, Target};
use crate::error::Result;
use crate::links::{LinkResolver, LinkTable};
use crate::reader::EntityReader;
use crate::response::Document;
use crate::rest::ApiContext;
use crate::snapshot::{SnapshotFile, SnapshotStore};
use crate::token::{Credentials, Token, TokenProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Client is a single Flair API session: one credential, one token cache, one
/// link table and one snapshot store, shared by the reader and the controller.
///
/// Cloning is cheap and every clone shares the same session state, so a
/// client can be handed to several threads.
#[derive(Clone)]
pub struct Client {
    ctx: Arc<ApiContext>,
    tokens: Arc<TokenProvider>,
    links: Arc<LinkResolver>,
    snapshots: Arc<SnapshotStore>,
    reader: EntityReader,
    controller: EntityController,
}

impl Client {
    /// Create a session against the production API
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, Config::default())
    }

    /// Create a session with custom configuration
    pub fn with_config(credentials: Credentials, config: Config) -> Result<Self> {
        let ctx = Arc::new(ApiContext::new(config)?);
        let tokens = Arc::new(TokenProvider::new(Arc::clone(&ctx), credentials));
        Ok(Self::assemble(ctx, tokens))
    }

    /// Create a session around a pre-obtained token. The session cannot renew
    /// the token once it expires.
    pub fn with_token(token: Token, config: Config) -> Result<Self> {
        let ctx = Arc::new(ApiContext::new(config)?);
        let tokens = Arc::new(TokenProvider::from_token(Arc::clone(&ctx), token));
        Ok(Self::assemble(ctx, tokens))
    }

    fn assemble(ctx: Arc<ApiContext>, tokens: Arc<TokenProvider>) -> Self {
        let links = Arc::new(LinkResolver::new(Arc::clone(&ctx)));
        let snapshots = Arc::new(SnapshotStore::new());
        let reader = EntityReader::new(
            Arc::clone(&ctx),
            Arc::clone(&tokens),
            Arc::clone(&links),
            Arc::clone(&snapshots),
        );
        let controller = EntityController::new(
            Arc::clone(&ctx),
            Arc::clone(&tokens),
            Arc::clone(&links),
            Arc::clone(&snapshots),
        );

        Client {
            ctx,
            tokens,
            links,
            snapshots,
            reader,
            controller,
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    pub fn links(&self) -> &LinkResolver {
        &self.links
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn reader(&self) -> &EntityReader {
        &self.reader
    }

    pub fn controller(&self) -> &EntityController {
        &self.controller
    }

    /// Exchange the credentials for a fresh token
    pub fn acquire_token(&self) -> Result<Token> {
        self.tokens.acquire()
    }

    /// The link table, discovered on first use
    pub fn discover_links(&self) -> Result<Arc<LinkTable>> {
        self.links.discover_links()
    }

    /// Discover the link table again
    pub fn refresh_links(&self) -> Result<Arc<LinkTable>> {
        self.links.refresh_links()
    }

    /// Fetch a whole collection and store it as the type's snapshot
    pub fn fetch(&self, entity_type: &str) -> Result<Document> {
        self.reader.fetch(entity_type)
    }

    /// Fetch a single entity
    pub fn fetch_entity(&self, entity_type: &str, entity_id: &str) -> Result<Document> {
        self.reader.fetch_entity(entity_type, entity_id)
    }

    /// Fetch every entity type the API exposes
    pub fn fetch_all(&self) -> Result<Vec<String>> {
        self.reader.fetch_all()
    }

    /// Whether the system-wide controller runs in automatic mode
    pub fn is_auto_mode_enabled(&self) -> Result<bool> {
        self.reader.is_auto_mode_enabled()
    }

    /// Update the attributes of one entity
    pub fn set_attributes<A>(
        &self,
        entity_type: &str,
        attributes: A,
        target: Target,
    ) -> Result<Document>
    where
        A: Serialize,
    {
        self.controller.set_attributes(entity_type, attributes, target)
    }

    /// The latest snapshot of an entity type
    pub fn snapshot(&self, entity_type: &str) -> Option<Document> {
        self.snapshots.get(entity_type)
    }

    /// Write every stored snapshot to `path`
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        self.snapshots.to_file().save(path)
    }

    /// Replace the stored snapshots with the contents of `path`, returning when
    /// the file was created
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<DateTime<Utc>> {
        let file = SnapshotFile::load(path)?;
        let creation_time = file.creation_time;
        self.snapshots.restore(file);
        Ok(creation_time)
    }
}
