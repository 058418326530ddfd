//! Plugin-based connector registry
//!
//! Connector crates register a factory under a type name; the daemon then
//! builds connectors from configuration without knowing any platform.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use adsync_core::registry::ConnectorRegistry;
//!
//! let registry = ConnectorRegistry::new();
//! adsync_connector_google::register(&registry);
//! adsync_connector_facebook::register(&registry);
//!
//! let connectors = registry.build_set(&config.connectors)?;
//! ```
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In adsync-connector-google
//! pub fn register(registry: &ConnectorRegistry) {
//!     registry.register_connector("google", Box::new(GoogleAdsFactory));
//! }
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::ConnectorConfig;
use crate::credentials::TokenRefresher;
use crate::error::{Error, Result};
use crate::model::{Credential, Platform};
use crate::traits::{ConnectorFactory, PlatformConnector};

/// Registry of connector factories keyed by type name
///
/// Uses interior mutability, so registration works through a shared reference.
#[derive(Default)]
pub struct ConnectorRegistry {
    factories: RwLock<HashMap<String, Box<dyn ConnectorFactory>>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector factory
    ///
    /// # Parameters
    ///
    /// - `name`: connector type name, matching [`ConnectorConfig::type_name`]
    /// - `factory`: factory used to build instances
    pub fn register_connector(&self, name: impl Into<String>, factory: Box<dyn ConnectorFactory>) {
        let name = name.into();
        tracing::debug!(connector = %name, "Connector factory registered");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, factory);
    }

    /// Create a connector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(connector)`: the created connector
    /// - `Err(Error::Config)`: unknown type, invalid config, or a connector
    ///   that serves a different platform than configured
    pub fn create_connector(&self, config: &ConnectorConfig) -> Result<Arc<dyn PlatformConnector>> {
        config.validate()?;
        let type_name = config.type_name();
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);

        let factory = factories
            .get(type_name)
            .ok_or_else(|| Error::config(format!("Unknown connector type: {}", type_name)))?;

        let connector = factory.create(config)?;
        if connector.platform() != config.platform() {
            return Err(Error::config(format!(
                "Connector type {} serves {}, configured for {}",
                type_name,
                connector.platform(),
                config.platform()
            )));
        }
        Ok(connector)
    }

    /// Create every configured connector
    pub fn build_set(&self, configs: &[ConnectorConfig]) -> Result<ConnectorSet> {
        let mut set = ConnectorSet::new();
        for config in configs {
            set.insert(self.create_connector(config)?);
        }
        Ok(set)
    }

    /// List all registered connector types
    pub fn list_connectors(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a connector type is registered
    pub fn has_connector(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

/// Live connectors keyed by platform tag
///
/// Also acts as the credential cache's [`TokenRefresher`], dispatching each
/// refresh to the connector of the credential's platform.
#[derive(Clone, Default)]
pub struct ConnectorSet {
    connectors: BTreeMap<Platform, Arc<dyn PlatformConnector>>,
}

impl ConnectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connector, replacing any previous one for its platform
    pub fn insert(&mut self, connector: Arc<dyn PlatformConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, connector: Arc<dyn PlatformConnector>) -> Self {
        self.insert(connector);
        self
    }

    /// Connector for a platform
    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformConnector>> {
        self.connectors
            .get(&platform)
            .cloned()
            .ok_or_else(|| Error::config(format!("No connector configured for {}", platform)))
    }

    /// Platforms with a connector, in order
    pub fn platforms(&self) -> Vec<Platform> {
        self.connectors.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorSet")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[async_trait]
impl TokenRefresher for ConnectorSet {
    async fn refresh(&self, previous: &Credential) -> Result<Credential> {
        self.get(previous.platform)?
            .refresh_credential(previous)
            .await
    }
}
