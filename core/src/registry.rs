use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::tool::ToolDefinition;

/// What `define` does when a name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Reject the second definition with `DuplicateTool`.
    #[default]
    Strict,
    /// Replace the existing definition in place.
    Overwrite,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(DuplicatePolicy::Strict),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            other => Err(format!("expected 'strict' or 'overwrite', got '{}'", other)),
        }
    }
}

/// Outcome of a best-effort batch registration.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<String>,
    pub rejected: Vec<(String, EngineError)>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Default)]
struct Entries {
    order: Vec<Arc<ToolDefinition>>,
    index: HashMap<String, usize>,
}

/// The catalogue of callable tools.
///
/// Lookups and registrations may interleave freely. A definition is fully built
/// before it is inserted, so readers only ever see whole entries.
#[derive(Default)]
pub struct ToolRegistry {
    policy: DuplicatePolicy,
    entries: RwLock<Entries>,
}

impl ToolRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn define(&self, tool: ToolDefinition) -> Result<(), EngineError> {
        let mut entries = self.write();
        let tool = Arc::new(tool);

        if let Some(&slot) = entries.index.get(&tool.name) {
            if self.policy == DuplicatePolicy::Strict {
                return Err(EngineError::DuplicateTool(tool.name.clone()));
            }
            warn!("Tool '{}' redefined; replacing previous definition", tool.name);
            entries.order[slot] = tool;
            return Ok(());
        }

        debug!("Registered tool '{}' ({})", tool.name, tool.kind.as_str());
        let slot = entries.order.len();
        entries.index.insert(tool.name.clone(), slot);
        entries.order.push(tool);
        Ok(())
    }

    /// Registers each tool independently; failures are collected, not fatal.
    pub fn define_many<I>(&self, tools: I) -> RegistrationReport
    where
        I: IntoIterator<Item = ToolDefinition>,
    {
        let mut report = RegistrationReport::default();
        for tool in tools {
            let name = tool.name.clone();
            match self.define(tool) {
                Ok(()) => report.registered.push(name),
                Err(err) => {
                    warn!("Skipping tool '{}': {}", name, err);
                    report.rejected.push((name, err));
                }
            }
        }
        report
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDefinition>, EngineError> {
        let entries = self.read();
        entries
            .index
            .get(name)
            .map(|&slot| Arc::clone(&entries.order[slot]))
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    /// Iterates a snapshot of the registry in registration order.
    ///
    /// With tags, yields only tools carrying at least one of them.
    pub fn list(&self, filter_tags: &[&str]) -> impl Iterator<Item = Arc<ToolDefinition>> {
        let snapshot = self.read().order.clone();
        let wanted: Vec<String> = filter_tags.iter().map(|t| t.to_string()).collect();
        snapshot
            .into_iter()
            .filter(move |tool| wanted.is_empty() || wanted.iter().any(|t| tool.has_tag(t)))
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking writer can only have poisoned the lock between whole-entry
    // updates, so the data behind it is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, reply: &'static str) -> ToolDefinition {
        ToolDefinition::handler(name, "test tool", move |_, _| async move { Ok(json!(reply)) })
            .build()
            .unwrap()
    }

    fn tagged(name: &str, tag: &str) -> ToolDefinition {
        ToolDefinition::handler(name, "", |args, _| async move { Ok(args) })
            .tag(tag)
            .build()
            .unwrap()
    }

    async fn reply_of(registry: &ToolRegistry, name: &str) -> serde_json::Value {
        let tool = registry.resolve(name).unwrap();
        match &tool.kind {
            crate::tool::ToolKind::Handler(h) => h(json!({}), Default::default()).await.unwrap(),
            crate::tool::ToolKind::Plan(_) => panic!("expected handler"),
        }
    }

    #[test]
    fn strict_policy_rejects_duplicates() {
        let registry = ToolRegistry::new(DuplicatePolicy::Strict);
        registry.define(tool("a", "first")).unwrap();
        let err = registry.define(tool("a", "second")).unwrap_err();
        assert_eq!(err, EngineError::DuplicateTool("a".into()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn overwrite_policy_keeps_the_last_definition() {
        let registry = ToolRegistry::new(DuplicatePolicy::Overwrite);
        registry.define(tool("a", "first")).unwrap();
        registry.define(tool("b", "other")).unwrap();
        registry.define(tool("a", "second")).unwrap();

        assert_eq!(reply_of(&registry, "a").await, json!("second"));
        let names: Vec<String> = registry.list(&[]).map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let registry = ToolRegistry::default();
        assert_eq!(
            registry.resolve("ghost").unwrap_err(),
            EngineError::NotFound("ghost".into())
        );
    }

    #[test]
    fn define_many_reports_rejections_under_strict() {
        let registry = ToolRegistry::new(DuplicatePolicy::Strict);
        let report = registry.define_many(vec![tool("a", "1"), tool("b", "2"), tool("a", "3")]);
        assert_eq!(report.registered, vec!["a", "b"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "a");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn define_many_overwrites_under_overwrite() {
        let registry = ToolRegistry::new(DuplicatePolicy::Overwrite);
        let report = registry.define_many(vec![tool("a", "1"), tool("a", "2")]);
        assert!(report.is_clean());
        assert_eq!(registry.len(), 1);
        assert_eq!(reply_of(&registry, "a").await, json!("2"));
    }

    #[test]
    fn list_filters_by_tag_in_insertion_order() {
        let registry = ToolRegistry::default();
        registry.define(tagged("z-last", "tasks")).unwrap();
        registry.define(tagged("middle", "git")).unwrap();
        registry.define(tagged("a-first", "tasks")).unwrap();

        let names: Vec<String> = registry.list(&["tasks"]).map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["z-last", "a-first"]);
        assert_eq!(registry.list(&["fs"]).count(), 0);
    }

    #[test]
    fn list_is_a_snapshot() {
        let registry = ToolRegistry::default();
        registry.define(tagged("one", "x")).unwrap();
        let listing = registry.list(&[]);
        registry.define(tagged("two", "x")).unwrap();
        assert_eq!(listing.count(), 1);
    }
}
