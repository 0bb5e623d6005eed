use std::{collections::HashMap, net::SocketAddr};

use tokio::sync::RwLock;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where the ingress router sends traffic for one routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// The name of the sandbox serving the route.
    pub sandbox: String,

    /// The backend address inside the sandbox network.
    pub addr: SocketAddr,
}

/// Routing keys of hostname-addressed sandboxes and the backends they resolve to.
///
/// Shared between the lifecycle controller, which writes it, and the ingress router, which only
/// reads it.
///
/// A key is either routed or claimed. A claim reserves a key for a sandbox that is still being
/// created, so two creates can never both end up serving the same key.
#[derive(Debug, Default)]
pub struct RouteTable {
    state: RwLock<RouteState>,
}

#[derive(Debug, Default)]
struct RouteState {
    routes: HashMap<String, Route>,

    /// Keys reserved by in-flight creates, mapped to the reserving sandbox.
    claims: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the backend address for `key`.
    pub async fn resolve(&self, key: &str) -> Option<SocketAddr> {
        self.state.read().await.routes.get(key).map(|route| route.addr)
    }

    /// Returns the full route registered under `key`.
    pub async fn get(&self, key: &str) -> Option<Route> {
        self.state.read().await.routes.get(key).cloned()
    }

    /// Reserves `key` for `sandbox` until it is routed or released.
    ///
    /// Returns whether this call made the reservation, which is false when `sandbox` already
    /// holds the key. Fails with the holder's name when another sandbox routes or claims `key`.
    pub async fn claim(&self, key: &str, sandbox: &str) -> Result<bool, String> {
        let mut state = self.state.write().await;
        if let Some(holder) = state.holder_of(key) {
            return if holder == sandbox {
                Ok(false)
            } else {
                Err(holder.to_string())
            };
        }

        state.claims.insert(key.to_string(), sandbox.to_string());
        tracing::debug!("claimed {} for {}", key, sandbox);
        Ok(true)
    }

    /// Drops the reservation of `key` if `sandbox` holds it. Routes are left alone.
    pub async fn release_claim(&self, key: &str, sandbox: &str) {
        let mut state = self.state.write().await;
        if state.claims.get(key).is_some_and(|holder| holder == sandbox) {
            state.claims.remove(key);
            tracing::debug!("released claim on {} ({})", key, sandbox);
        }
    }

    /// Routes `key` to `route`, turning the sandbox's claim into a route.
    ///
    /// Fails with the holder's name, leaving the table untouched, when another sandbox routes or
    /// claims `key`.
    pub async fn insert_claimed(&self, key: &str, route: Route) -> Result<(), String> {
        let mut state = self.state.write().await;
        if let Some(holder) = state.holder_of(key) {
            if holder != route.sandbox {
                return Err(holder.to_string());
            }
        }

        state.claims.remove(key);
        tracing::debug!("routing {} to {} ({})", key, route.addr, route.sandbox);
        state.routes.insert(key.to_string(), route);
        Ok(())
    }

    /// Registers `key`, replacing any previous route under the same key.
    pub async fn insert(&self, key: impl Into<String>, route: Route) {
        let key = key.into();
        tracing::debug!("routing {} to {} ({})", key, route.addr, route.sandbox);
        self.state.write().await.routes.insert(key, route);
    }

    /// Removes every route served by `sandbox` and returns the removed keys.
    ///
    /// Claims are kept; they belong to creates that have not finished yet.
    pub async fn remove_sandbox(&self, sandbox: &str) -> Vec<String> {
        let mut state = self.state.write().await;
        let keys: Vec<String> = state
            .routes
            .iter()
            .filter(|(_, route)| route.sandbox == sandbox)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            state.routes.remove(key);
            tracing::debug!("unrouted {} ({})", key, sandbox);
        }

        keys
    }

    /// Replaces every route. Outstanding claims survive.
    pub async fn replace_all(&self, routes: HashMap<String, Route>) {
        self.state.write().await.routes = routes;
    }

    /// The routing key served by `sandbox`, if any.
    pub async fn key_of(&self, sandbox: &str) -> Option<String> {
        self.state
            .read()
            .await
            .routes
            .iter()
            .find(|(_, route)| route.sandbox == sandbox)
            .map(|(key, _)| key.clone())
    }

    /// The number of registered routes.
    pub async fn len(&self) -> usize {
        self.state.read().await.routes.len()
    }

    /// Whether no route is registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.routes.is_empty()
    }
}

impl RouteState {
    fn holder_of(&self, key: &str) -> Option<&str> {
        self.routes
            .get(key)
            .map(|route| route.sandbox.as_str())
            .or_else(|| self.claims.get(key).map(String::as_str))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
