//! Message and query routing.
//!
//! Routes are registered once while a protocol version loads and never change
//! afterwards. Every message route declares the store keys its handler may
//! touch; the transaction pipeline scopes the handler's context to exactly
//! those keys.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hub_modules::{Handler, Querier};
use hub_store::{StoreKey, StoreKeyRegistry};

use crate::error::RouterError;

fn check_name(name: &str) -> Result<(), RouterError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RouterError::InvalidRouteName(name.to_string()));
    }
    Ok(())
}

/// One message route.
pub struct Route {
    name: String,
    required_keys: Vec<StoreKey>,
    handler: Handler,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store keys the handler's context is limited to.
    pub fn required_keys(&self) -> &[StoreKey] {
        &self.required_keys
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("required_keys", &self.required_keys)
            .finish()
    }
}

/// Route name to handler plus permitted store keys.
pub struct Router {
    registry: Arc<StoreKeyRegistry>,
    routes: BTreeMap<String, Route>,
}

impl Router {
    pub fn new(registry: Arc<StoreKeyRegistry>) -> Self {
        Self {
            registry,
            routes: BTreeMap::new(),
        }
    }

    /// Register a route. Chainable with `?`.
    pub fn add_route(
        mut self,
        name: &str,
        required_keys: Vec<StoreKey>,
        handler: Handler,
    ) -> Result<Self, RouterError> {
        check_name(name)?;
        if self.routes.contains_key(name) {
            return Err(RouterError::DuplicateRoute(name.to_string()));
        }
        if let Some(foreign) = required_keys.iter().find(|k| !self.registry.contains(k)) {
            return Err(RouterError::UnknownStoreKey {
                route: name.to_string(),
                key: foreign.name().to_string(),
            });
        }
        tracing::debug!(
            route = name,
            keys = ?required_keys.iter().map(StoreKey::name).collect::<Vec<_>>(),
            "message route registered"
        );
        self.routes.insert(
            name.to_string(),
            Route {
                name: name.to_string(),
                required_keys,
                handler,
            },
        );
        Ok(self)
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_names())
            .finish()
    }
}

/// Route name to read-only querier.
#[derive(Default)]
pub struct QueryRouter {
    routes: BTreeMap<String, Querier>,
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(mut self, name: &str, querier: Querier) -> Result<Self, RouterError> {
        check_name(name)?;
        if self.routes.contains_key(name) {
            return Err(RouterError::DuplicateRoute(name.to_string()));
        }
        tracing::debug!(route = name, "query route registered");
        self.routes.insert(name.to_string(), querier);
        Ok(self)
    }

    pub fn route(&self, name: &str) -> Option<&Querier> {
        self.routes.get(name)
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for QueryRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRouter")
            .field("routes", &self.route_names())
            .finish()
    }
}
