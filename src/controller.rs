//! Entity control.
//!
//! A control PATCHes the attributes of one entity, addressed either by id or
//! by its `attributes.name` in the latest snapshot of its type. Every call
//! runs under the snapshot lock of its entity type and moves through
//! [`ControlPhase`]s; only an `Applied` control writes to the snapshot.

use crate::error::{FlairError, Result};
use crate::links::LinkResolver;
use crate::response::Document;
use crate::rest::ApiContext;
use crate::snapshot::{apply_update, SnapshotEntry, SnapshotStore};
use crate::token::TokenProvider;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{instrument, trace};

/// The entity a control addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    ById(String),
    /// Looked up in the latest snapshot of the entity type
    ByName(String),
}

impl Target {
    pub fn id(id: impl Into<String>) -> Self {
        Target::ById(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Target::ByName(name.into())
    }
}

/// Progress of a single control call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    Idle,
    ResolvingTarget,
    BuildingRequest,
    AwaitingResponse,
    Applied,
    Failed,
}

impl fmt::Display for ControlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlPhase::Idle => "idle",
            ControlPhase::ResolvingTarget => "resolving-target",
            ControlPhase::BuildingRequest => "building-request",
            ControlPhase::AwaitingResponse => "awaiting-response",
            ControlPhase::Applied => "applied",
            ControlPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn advance(phase: &mut ControlPhase, next: ControlPhase) {
    trace!(from = %phase, to = %next, "control phase");
    *phase = next;
}

/// Build the JSON:API patch body for an attribute update
pub fn patch_body(entity_type: &str, attributes: Value) -> Value {
    json!({
        "data": {
            "type": entity_type,
            "attributes": attributes,
        }
    })
}

/// Find the id of the single resource named `name`.
/// Zero matches and several matches are both errors.
pub fn resolve_name(document: &Document, entity_type: &str, name: &str) -> Result<String> {
    let mut matches = Vec::new();
    for resource in document.resources()? {
        if resource.name()? == name {
            matches.push(resource.id);
        }
    }

    match matches.len() {
        0 => Err(FlairError::NameNotFound {
            entity_type: entity_type.to_string(),
            name: name.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(FlairError::AmbiguousName {
            entity_type: entity_type.to_string(),
            name: name.to_string(),
            count,
        }),
    }
}

/// EntityController issues authenticated attribute updates
#[derive(Clone)]
pub struct EntityController {
    ctx: Arc<ApiContext>,
    tokens: Arc<TokenProvider>,
    links: Arc<LinkResolver>,
    snapshots: Arc<SnapshotStore>,
}

impl EntityController {
    pub fn new(
        ctx: Arc<ApiContext>,
        tokens: Arc<TokenProvider>,
        links: Arc<LinkResolver>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        EntityController {
            ctx,
            tokens,
            links,
            snapshots,
        }
    }

    /// Update the attributes of one entity and return the server's
    /// representation of it. `attributes` must serialize to a JSON object.
    ///
    /// On success the snapshot of `entity_type` reflects the update; on any
    /// failure it is left exactly as it was.
    #[instrument(skip(self, attributes))]
    pub fn set_attributes<A>(
        &self,
        entity_type: &str,
        attributes: A,
        target: Target,
    ) -> Result<Document>
    where
        A: Serialize,
    {
        let attributes =
            serde_json::to_value(attributes).map_err(|e| FlairError::RequestBuild(e.to_string()))?;
        if !attributes.is_object() {
            return Err(FlairError::RequestBuild(
                "attributes must serialize to a JSON object".to_string(),
            ));
        }

        self.snapshots.with_entry(entity_type, |entry| {
            let mut phase = ControlPhase::Idle;
            let result = self.control(entity_type, attributes, &target, entry, &mut phase);
            let outcome = if result.is_ok() {
                ControlPhase::Applied
            } else {
                ControlPhase::Failed
            };
            advance(&mut phase, outcome);
            result
        })
    }

    fn control(
        &self,
        entity_type: &str,
        attributes: Value,
        target: &Target,
        entry: &mut Option<SnapshotEntry>,
        phase: &mut ControlPhase,
    ) -> Result<Document> {
        advance(phase, ControlPhase::ResolvingTarget);
        let id = match target {
            Target::ById(id) => id.clone(),
            Target::ByName(name) => {
                let current = entry
                    .as_ref()
                    .ok_or_else(|| FlairError::StalePrecondition(entity_type.to_string()))?;
                resolve_name(&current.document, entity_type, name)?
            }
        };
        let path = self.links.resolve_path(entity_type, Some(&id))?;
        let token = self.tokens.bearer()?;

        advance(phase, ControlPhase::BuildingRequest);
        let request = self
            .ctx
            .authorized(Method::PATCH, &path, &token.access_token)?
            .json(&patch_body(entity_type, attributes));

        advance(phase, ControlPhase::AwaitingResponse);
        let document = self.ctx.execute(request).map_err(|e| {
            self.tokens.invalidate_on_unauthorized(&token, &e);
            e
        })?;

        apply_update(entry, &document);
        Ok(document)
    }
}
