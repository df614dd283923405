use std::sync::Arc;

use hub_store::Context;
use hub_types::Tags;

use crate::error::ModuleResult;
use crate::msg::Msg;

/// Outcome of a successfully handled message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerResult {
    pub tags: Tags,
    pub log: String,
}

impl HandlerResult {
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            tags,
            log: String::new(),
        }
    }
}

/// Transaction handler for one route.
pub type Handler = Arc<dyn Fn(&mut Context<'_>, &Msg) -> ModuleResult<HandlerResult> + Send + Sync>;

/// Read-only querier for one route. Receives the path segments after the
/// route name and the raw request data.
pub type Querier = Arc<dyn Fn(&Context<'_>, &[&str], &[u8]) -> ModuleResult<Vec<u8>> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(&mut Context<'_>, &Msg) -> ModuleResult<HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`Querier`].
pub fn querier_fn<F>(f: F) -> Querier
where
    F: Fn(&Context<'_>, &[&str], &[u8]) -> ModuleResult<Vec<u8>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Encode a query response as JSON.
pub(crate) fn json_response<T: serde::Serialize>(value: &T) -> ModuleResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| crate::error::ModuleError::Corrupt(e.to_string()))
}
