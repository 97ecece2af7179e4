//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; reload builds a new Router
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Stable sort: equal priorities keep declaration order

use axum::http::{HeaderMap, Uri};

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub upstream: String,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    fn from_config(config: RouteConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Self {
            name: config.name,
            upstream: config.upstream,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        }
    }
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs.into_iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(count = routes.len(), "Routes compiled");
        Self { routes }
    }

    /// First route, by priority, whose conditions all hold.
    pub fn match_request(&self, uri: &Uri, headers: &HeaderMap) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(uri, headers))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
