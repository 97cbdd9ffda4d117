//! Public compile context
//!
//! The public context is the set of values known while compiling: the build
//! environment and the host OS. Placeholders that only reference these names
//! are folded into constants.

use crate::eval::Bindings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Values visible to placeholders at compile time
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PublicContext {
    /// Build-time information
    #[serde(default)]
    pub build: BuildContext,
}

/// The `build` entry of the public context
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BuildContext {
    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Target platform attributes
    #[serde(default)]
    pub os: BTreeMap<String, String>,
}

impl PublicContext {
    /// Create an empty context (`build.env` and `build.os` both empty)
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the context from the running process
    ///
    /// Variables from a `.env` file in the working directory are loaded first.
    pub fn detect() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", path.display());
        }

        let os = [
            ("platform", env::consts::OS),
            ("arch", env::consts::ARCH),
            ("family", env::consts::FAMILY),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        PublicContext {
            build: BuildContext {
                env: env::vars().collect(),
                os,
            },
        }
    }

    /// Set a single environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build.env.insert(key.into(), value.into());
        self
    }

    /// Set a single OS attribute
    pub fn with_os(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build.os.insert(key.into(), value.into());
        self
    }

    /// Top-level bindings handed to the expression evaluator
    pub fn to_bindings(&self) -> Bindings {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Bindings::new(),
        }
    }
}
