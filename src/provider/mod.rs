//! Provider lifecycle shared by the mail and storage facades.
//!
//! A backend moves through `Unconfigured -> Configured -> Connected -> Ready`:
//! [`Configure::configure`] validates its options without side effects,
//! [`Lifecycle::connect`] performs the handshake, and [`ProviderSlot::install`] makes the
//! connected instance the active one. A failure at any step discards the new instance
//! and leaves the previously active one in place.

pub(crate) mod http;
mod registry;

pub use registry::ProviderRegistry;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Short backend name reported in results (`"fs"`, `"sendgrid"`).
    fn name(&self) -> &'static str;

    /// Handshake or credential exchange. Default: nothing to do.
    async fn connect(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Construction from a closed option schema.
pub trait Configure: Sized {
    type Options: DeserializeOwned;
    const NAME: &'static str;

    fn configure(options: Self::Options) -> Result<Self, ProviderError>;

    /// Deserialize `options` (`null` counts as `{}`) and configure.
    fn from_value(options: Value) -> Result<Self, ProviderError> {
        let options = match options {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let options = serde_json::from_value(options).map_err(|e| ProviderError::InvalidOptions {
            provider: Self::NAME,
            message: e.to_string(),
        })?;
        Self::configure(options)
    }
}

/// Boxes a concrete backend as the trait object of its family.
pub trait IntoProvider<P: ?Sized> {
    fn into_provider(self) -> Box<P>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderState {
    Unconfigured,
    Configured,
    Connected,
    /// Installed as the active backend of a facade.
    Ready,
}

/// A configured backend and where it is in its lifecycle.
pub struct ProviderInstance<P: ?Sized> {
    key: String,
    state: ProviderState,
    provider: Box<P>,
}

impl<P: ?Sized + Lifecycle> ProviderInstance<P> {
    pub fn configure(registry: &ProviderRegistry<P>, key: &str, options: Value) -> Result<Self, ProviderError>
    where
        P: 'static,
    {
        let provider = registry.build(key, options)?;
        Ok(ProviderInstance {
            key: key.to_uppercase(),
            state: ProviderState::Configured,
            provider,
        })
    }

    pub async fn connect(&mut self) -> Result<(), ProviderError> {
        self.provider.connect().await?;
        self.state = ProviderState::Connected;
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// The active backend of a facade, swapped atomically.
pub struct ProviderSlot<P: ?Sized> {
    registry: Arc<ProviderRegistry<P>>,
    active: Option<ProviderInstance<P>>,
}

impl<P: ?Sized + Lifecycle + 'static> ProviderSlot<P> {
    pub fn new(registry: Arc<ProviderRegistry<P>>) -> Self {
        ProviderSlot { registry, active: None }
    }

    pub fn registry(&self) -> &ProviderRegistry<P> {
        &self.registry
    }

    /// Configure and connect the backend registered under `key`, then make it active.
    /// On failure the previous backend stays active.
    pub async fn install(&mut self, key: &str, options: Value) -> Result<(), ProviderError> {
        let mut instance = ProviderInstance::configure(&self.registry, key, options)?;
        instance.connect().await?;
        instance.state = ProviderState::Ready;
        let previous = self.active.replace(instance);
        tracing::info!(
            provider = key,
            replaced = ?previous.as_ref().map(|p| p.key()),
            "provider installed"
        );
        Ok(())
    }

    pub fn active(&self) -> Result<&P, ProviderError> {
        self.active
            .as_ref()
            .map(ProviderInstance::provider)
            .ok_or(ProviderError::NoProviderConfigured)
    }

    pub fn active_key(&self) -> Option<&str> {
        self.active.as_ref().map(ProviderInstance::key)
    }

    pub fn state(&self) -> ProviderState {
        self.active
            .as_ref()
            .map_or(ProviderState::Unconfigured, ProviderInstance::state)
    }
}

impl<P: ?Sized> fmt::Debug for ProviderSlot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("registry", &self.registry)
            .field("active", &self.active.as_ref().map(|a| &a.key))
            .finish()
    }
}
