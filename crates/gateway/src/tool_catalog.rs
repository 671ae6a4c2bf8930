//! Maps an MCP tool name to the actor route it dispatches to.
//!
//! Parsing a full tool-definition format (descriptions, JSON Schemas,
//! versioning) is out of scope here: operators hand the gateway a compact
//! `GATEWAY_TOOLS` mapping, and any name not listed there is assumed to
//! name a single actor directly, so a one-hop tool needs no configuration
//! at all.

use std::collections::HashMap;
use std::env;

use asya_mcp::ToolInfo;
use serde_json::json;

#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    /// tool name -> ordered actor route
    routes: HashMap<String, Vec<String>>,
    descriptions: HashMap<String, String>,
}

impl ToolCatalog {
    /// Parses `GATEWAY_TOOLS`, a `;`-separated list of
    /// `name=actor1|actor2|...` entries. Unset or empty is a valid, empty
    /// catalog.
    pub fn from_env() -> Self {
        let raw = env::var("GATEWAY_TOOLS").unwrap_or_default();
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Self {
        let mut routes = HashMap::new();
        let mut descriptions = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((name, actors)) = entry.split_once('=') else { continue };
            let name = name.trim().to_string();
            let actors: Vec<String> = actors.split('|').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
            if actors.is_empty() {
                continue;
            }
            descriptions.insert(name.clone(), format!("invokes the {} actor route", actors.join(" -> ")));
            routes.insert(name, actors);
        }
        Self { routes, descriptions }
    }

    /// The route a tool call with this name should be dispatched on. Falls
    /// back to a single-hop route addressed to an actor of the same name
    /// when `name` isn't in the configured catalog.
    pub fn route_for(&self, name: &str) -> Vec<String> {
        self.routes.get(name).cloned().unwrap_or_else(|| vec![name.to_string()])
    }

    /// Tools advertised over `tools/list`. Only the explicitly configured
    /// entries are listed — the same-name fallback in [`Self::route_for`]
    /// still accepts calls for anything else, it's just not advertised.
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .routes
            .keys()
            .map(|name| ToolInfo {
                name: name.clone(),
                description: self.descriptions.get(name).cloned().unwrap_or_default(),
                input_schema: json!({"type": "object"}),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_entries() {
        let catalog = ToolCatalog::parse("ingest=validate|store;notify=notify-actor");
        assert_eq!(catalog.route_for("ingest"), vec!["validate", "store"]);
        assert_eq!(catalog.route_for("notify"), vec!["notify-actor"]);
    }

    #[test]
    fn unknown_tool_falls_back_to_same_name_actor() {
        let catalog = ToolCatalog::parse("");
        assert_eq!(catalog.route_for("ad-hoc-actor"), vec!["ad-hoc-actor"]);
    }

    #[test]
    fn blank_and_malformed_entries_are_skipped() {
        let catalog = ToolCatalog::parse(" ; ingest=validate ; malformed ; empty=");
        assert_eq!(catalog.list().len(), 1);
        assert_eq!(catalog.list()[0].name, "ingest");
    }
}
