//! Token to application table

use crate::error::IngestError;
use crate::token::extract_token;
use alerting::AppIdentity;
use http::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Immutable lookup from app token to app identity.
///
/// Built once at startup; shared read-only between concurrent requests.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<String, Arc<AppIdentity>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app, returning the previous owner of the token if any
    pub fn insert(&mut self, token: impl Into<String>, app: AppIdentity) -> Option<Arc<AppIdentity>> {
        self.apps.insert(token.into(), Arc::new(app))
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn resolve(&self, token: &str) -> Option<Arc<AppIdentity>> {
        self.apps.get(token).cloned()
    }

    /// Resolve the calling app from request headers and the raw query string
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<Arc<AppIdentity>, IngestError> {
        let token = extract_token(headers, query).ok_or(IngestError::Unauthenticated)?;
        self.resolve(&token).ok_or_else(|| {
            debug!("Rejected unknown token (len={})", token.len());
            IngestError::Unauthenticated
        })
    }
}

impl FromIterator<(String, AppIdentity)> for AppRegistry {
    fn from_iter<T: IntoIterator<Item = (String, AppIdentity)>>(iter: T) -> Self {
        let mut registry = Self::new();
        for (token, app) in iter {
            registry.insert(token, app);
        }
        registry
    }
}

// Tokens are secrets; only app names are printed.
impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.apps.values().map(|app| app.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("AppRegistry").field("apps", &names).finish()
    }
}
