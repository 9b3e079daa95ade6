// Route handlers, one module per resource.

pub mod health;
pub mod jobs;
pub mod moderate;

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::pipeline::ModerateOptions;

/// Optional fields every moderation request may carry.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub require_all_signals: Option<bool>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl From<RequestOptions> for ModerateOptions {
    fn from(o: RequestOptions) -> Self {
        ModerateOptions {
            require_all_signals: o.require_all_signals,
            metadata: o.metadata,
        }
    }
}
