//! Route manifest loaded from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use serde::{Deserialize, Serialize};
use tandem_core::TandemError;

use crate::route::{Page, Route};
use crate::table::RouteTable;

/// Configuration for a single route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route pattern (e.g., "/items/:id").
    pub pattern: String,
    /// Page handler name.
    pub handler: String,
    /// HTTP methods this route accepts.
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

impl RouteConfig {
    /// Create a new route configuration.
    pub fn new(pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler: handler.into(),
            methods: default_methods(),
        }
    }

    /// Set allowed HTTP methods.
    pub fn with_methods(mut self, methods: Vec<&str>) -> Self {
        self.methods = methods.into_iter().map(String::from).collect();
        self
    }

    fn parsed_methods(&self) -> Result<Vec<Method>, TandemError> {
        self.methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| TandemError::Config(format!("invalid method '{}'", m)))
            })
            .collect()
    }
}

/// Ordered list of routes, as written in `[[routes]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteManifest {
    /// Routes in match order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl RouteManifest {
    /// Parse a manifest from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self, TandemError> {
        toml::from_str(source).map_err(|e| TandemError::Config(e.to_string()))
    }

    /// Build a route table, resolving handler names through `pages`.
    pub fn into_table(
        self,
        pages: &HashMap<String, Arc<dyn Page>>,
    ) -> Result<RouteTable, TandemError> {
        let mut table = RouteTable::new();
        for config in self.routes {
            let page = pages.get(&config.handler).cloned().ok_or_else(|| {
                TandemError::Config(format!("unknown handler '{}'", config.handler))
            })?;
            let methods = config.parsed_methods()?;
            table.route(
                Route::new(config.pattern)
                    .methods(methods)
                    .name(config.handler)
                    .page(SharedPage(page)),
            )?;
        }
        Ok(table)
    }
}

struct SharedPage(Arc<dyn Page>);

impl Page for SharedPage {
    fn render(&self, cx: &tandem_core::RequestContext) -> tandem_core::Node {
        self.0.render(cx)
    }
}
