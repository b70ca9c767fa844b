//! Filter/index engine collaborator seam.
//!
//! Matching internals (string/prefix/suffix/existence indexes, filter
//! expression evaluation) live behind [`FilterEngine`]; the dispatch core
//! only needs candidate profile IDs for an event and pass/fail answers for
//! filter ID lists. [`StaticFilterEngine`] is a map-backed implementation
//! for tests and simple embeddings.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::{EventView, META_REQ};

/// Filter/index engine consumed by profile resolution and host selection.
#[async_trait]
pub trait FilterEngine: Send + Sync {
    /// Profile IDs whose indexed fields are compatible with the event,
    /// under the given index key (`tenant:subsystem`). Empty when none.
    async fn matching_ids(
        &self,
        ctx: &CallContext,
        tenant: &str,
        index_key: &str,
        ev: &EventView,
    ) -> Result<HashSet<String>, DispatchError>;

    /// Whether every filter in `filter_ids` passes for the event.
    /// An empty list passes; an unknown filter ID is `NOT_FOUND`.
    async fn pass(
        &self,
        ctx: &CallContext,
        tenant: &str,
        filter_ids: &[String],
        ev: &EventView,
    ) -> Result<bool, DispatchError>;
}

/// Shared filter engine handle.
pub type SharedFilters = Arc<dyn FilterEngine>;

/// Matching condition of a [`FilterRule`].
#[derive(Debug, Clone)]
pub enum FilterKind {
    /// Always passes.
    Any,
    /// Field equals the given value.
    Equals(String),
    /// Field starts with the given prefix.
    Prefix(String),
    /// Field ends with the given suffix.
    Suffix(String),
    /// Field is present.
    Exists,
}

/// A single registered filter: a field path plus a condition.
#[derive(Debug, Clone)]
pub struct FilterRule {
    /// View section holding the field (`*req`, `*opts`, `*vars`).
    pub section: String,
    /// Field name within the section.
    pub field: String,
    /// Condition applied to the field value.
    pub kind: FilterKind,
}

impl FilterRule {
    /// Equality rule over a request field.
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            section: META_REQ.to_string(),
            field: field.into(),
            kind: FilterKind::Equals(value.into()),
        }
    }

    /// Prefix rule over a request field.
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            section: META_REQ.to_string(),
            field: field.into(),
            kind: FilterKind::Prefix(prefix.into()),
        }
    }

    fn matches(&self, ev: &EventView) -> bool {
        let value = ev.field_as_str(&self.section, &self.field);
        match (&self.kind, value) {
            (FilterKind::Any, _) => true,
            (FilterKind::Exists, v) => v.is_some(),
            (FilterKind::Equals(want), Some(v)) => v == *want,
            (FilterKind::Prefix(p), Some(v)) => v.starts_with(p),
            (FilterKind::Suffix(s), Some(v)) => v.ends_with(s),
            _ => false,
        }
    }
}

/// Map-backed filter engine: explicit index entries plus named rules.
#[derive(Default)]
pub struct StaticFilterEngine {
    indexes: RwLock<HashMap<String, HashSet<String>>>,
    rules: RwLock<HashMap<String, FilterRule>>,
}

impl StaticFilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile ID under an index key (`tenant:subsystem`).
    pub fn index(&self, index_key: &str, profile_id: &str) {
        self.indexes
            .write()
            .unwrap()
            .entry(index_key.to_string())
            .or_default()
            .insert(profile_id.to_string());
    }

    /// Register a named filter rule for a tenant.
    pub fn rule(&self, tenant: &str, filter_id: &str, rule: FilterRule) {
        self.rules
            .write()
            .unwrap()
            .insert(format!("{tenant}:{filter_id}"), rule);
    }
}

#[async_trait]
impl FilterEngine for StaticFilterEngine {
    async fn matching_ids(
        &self,
        _ctx: &CallContext,
        _tenant: &str,
        index_key: &str,
        _ev: &EventView,
    ) -> Result<HashSet<String>, DispatchError> {
        Ok(self
            .indexes
            .read()
            .unwrap()
            .get(index_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn pass(
        &self,
        _ctx: &CallContext,
        tenant: &str,
        filter_ids: &[String],
        ev: &EventView,
    ) -> Result<bool, DispatchError> {
        let rules = self.rules.read().unwrap();
        for id in filter_ids {
            let rule = rules
                .get(&format!("{tenant}:{id}"))
                .ok_or(DispatchError::NotFound)?;
            if !rule.matches(ev) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde_json::json;

    fn view(account: &str) -> EventView {
        let mut ev = Event::new("cgrates.org");
        ev.payload.insert("Account".into(), json!(account));
        EventView::new(&ev, "attributes", "AttributeSv1.ProcessEvent")
    }

    #[tokio::test]
    async fn test_matching_ids() {
        let engine = StaticFilterEngine::new();
        engine.index("cgrates.org:attributes", "P1");
        engine.index("cgrates.org:attributes", "P2");

        let ctx = CallContext::background();
        let ids = engine
            .matching_ids(&ctx, "cgrates.org", "cgrates.org:attributes", &view("1001"))
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let none = engine
            .matching_ids(&ctx, "cgrates.org", "cgrates.org:sessions", &view("1001"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_rule_kinds() {
        let ctx = CallContext::background();
        let engine = StaticFilterEngine::new();
        engine.rule("t", "prefix", FilterRule::prefix("Account", "10"));
        engine.rule(
            "t",
            "exists",
            FilterRule {
                section: META_REQ.into(),
                field: "Account".into(),
                kind: FilterKind::Exists,
            },
        );
        engine.rule(
            "t",
            "suffix",
            FilterRule {
                section: META_REQ.into(),
                field: "Account".into(),
                kind: FilterKind::Suffix("01".into()),
            },
        );

        let ids: Vec<String> = vec!["prefix".into(), "exists".into(), "suffix".into()];
        assert!(engine.pass(&ctx, "t", &ids, &view("1001")).await.unwrap());
        assert!(!engine.pass(&ctx, "t", &ids, &view("2002")).await.unwrap());

        let mut ev = Event::new("t");
        ev.payload.remove("Account");
        let empty_view = EventView::new(&ev, "attributes", "Ping");
        let exists = vec!["exists".to_string()];
        assert!(!engine.pass(&ctx, "t", &exists, &empty_view).await.unwrap());
    }

    #[tokio::test]
    async fn test_pass_rules() {
        let engine = StaticFilterEngine::new();
        engine.rule(
            "cgrates.org",
            "FLTR_ACC",
            FilterRule::equals("Account", "1001"),
        );

        let ctx = CallContext::background();
        let ids = vec!["FLTR_ACC".to_string()];
        assert!(engine
            .pass(&ctx, "cgrates.org", &ids, &view("1001"))
            .await
            .unwrap());
        assert!(!engine
            .pass(&ctx, "cgrates.org", &ids, &view("1002"))
            .await
            .unwrap());

        // empty filter list always passes
        assert!(engine
            .pass(&ctx, "cgrates.org", &[], &view("1002"))
            .await
            .unwrap());

        // unknown filter is an error, not a non-match
        let missing = vec!["FLTR_MISSING".to_string()];
        assert_eq!(
            engine
                .pass(&ctx, "cgrates.org", &missing, &view("1001"))
                .await
                .unwrap_err(),
            DispatchError::NotFound
        );
    }
}
