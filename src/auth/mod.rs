//! Inter-subsystem authorization via the attribute service.
//!
//! The attribute service owns API-key profiles; this module builds the
//! authorization event, forwards it and checks the resolved allowed-method
//! set. Profile contents and lookup mechanics stay behind the
//! [`AttributeService`] seam.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::{Event, META_AUTH, META_DISPATCHERS, OPT_CONTEXT, OPT_SUBSYS};

/// Request field carrying the API key on authorization events.
pub const API_KEY_FIELD: &str = "ApiKey";
/// Reply field carrying the `;`-separated allowed-method set.
pub const API_METHODS_FIELD: &str = "ApiMethods";

/// Attribute-service collaborator: processes an authorization event and
/// returns the altered event (with [`API_METHODS_FIELD`] populated).
/// `NOT_FOUND` means the API key has no backing profile.
#[async_trait]
pub trait AttributeService: Send + Sync {
    async fn process_event(
        &self,
        ctx: &CallContext,
        ev: &Event,
    ) -> Result<Event, DispatchError>;
}

/// Shared attribute-service handle.
pub type SharedAttributes = Arc<dyn AttributeService>;

/// Parse a `;`-separated string set (e.g. an allowed-method list).
pub fn parse_string_set(s: &str) -> HashSet<String> {
    s.split(';')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Authorize `method` for the given API key.
///
/// Fails with `MANDATORY_IE_MISSING: [ApiKey]` when the key is absent,
/// `UNKNOWN_API_KEY` when the attribute service has no profile for it and
/// `UNAUTHORIZED_API` when the method is not in the resolved allowed set.
pub async fn authorize(
    attributes: &dyn AttributeService,
    ctx: &CallContext,
    method: &str,
    tenant: &str,
    api_key: Option<&str>,
) -> Result<(), DispatchError> {
    let api_key = match api_key {
        Some(key) if !key.is_empty() => key,
        _ => return Err(DispatchError::MandatoryIeMissing(API_KEY_FIELD.into())),
    };

    let mut ev = Event::new(tenant);
    ev.payload
        .insert(API_KEY_FIELD.into(), Value::String(api_key.into()));
    ev.opts
        .insert(OPT_SUBSYS.into(), Value::String(META_DISPATCHERS.into()));
    ev.opts
        .insert(OPT_CONTEXT.into(), Value::String(META_AUTH.into()));

    let reply = match attributes.process_event(ctx, &ev).await {
        Ok(reply) => reply,
        Err(DispatchError::NotFound) => return Err(DispatchError::UnknownApiKey),
        Err(err) => return Err(err),
    };

    let methods = match reply.payload.get(API_METHODS_FIELD) {
        Some(Value::String(s)) => parse_string_set(s),
        _ => return Err(DispatchError::NotFound),
    };
    if !methods.contains(method) {
        return Err(DispatchError::UnauthorizedApi);
    }
    Ok(())
}
