//! Plugin registration
//!
//! A plugin is a named unit of behavior that attaches taps to the client's
//! hooks during [`Plugin::setup`]. Names are unique per client: registering a
//! second plugin under an existing name is skipped with a warning.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{BoxError, Result, SdkError};
use crate::hooks::Hooks;

/// Core plugin trait
pub trait Plugin: Send + Sync {
    /// Unique identifier for this plugin within a client
    fn name(&self) -> &str;

    /// Attach taps and capture state; called exactly once at registration
    ///
    /// Returning an error fails registration and detaches any taps the
    /// plugin attached before failing.
    fn setup(&self, context: &PluginContext) -> std::result::Result<(), BoxError>;

    /// Detach whatever the plugin installed outside the client
    ///
    /// Never called by the client itself; hosts call it at teardown.
    fn cleanup(&self) {}
}

/// What a plugin sees during setup
///
/// Plugins that keep a handle to the client past setup should hold the
/// [`Weak`] from [`PluginContext::downgrade`], otherwise the client and the
/// plugin keep each other alive.
#[derive(Clone)]
pub struct PluginContext {
    client: Arc<Client>,
}

impl PluginContext {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn hooks(&self) -> &Hooks {
        self.client.hooks()
    }

    pub fn downgrade(&self) -> Weak<Client> {
        Arc::downgrade(&self.client)
    }
}

/// Owns the hooks and the registered plugins of one client
pub struct PluginManager {
    pub hooks: Hooks,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            hooks: Hooks::new(),
            plugins: RwLock::new(Vec::new()),
        }
    }

    /// Register a plugin and run its setup
    ///
    /// Returns `Ok(false)` when a plugin with the same name is already
    /// registered; the new plugin's setup is not run.
    pub fn register(&self, plugin: Arc<dyn Plugin>, context: &PluginContext) -> Result<bool> {
        let name = plugin.name().to_string();
        {
            let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
            if plugins.iter().any(|existing| existing.name() == name) {
                warn!(plugin = %name, "Plugin already registered, skipping");
                return Ok(false);
            }
            plugins.push(plugin.clone());
        }

        debug!("Registering plugin: {}", name);
        if let Err(source) = plugin.setup(context) {
            self.plugins
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|existing| !Arc::ptr_eq(existing, &plugin));
            let removed = self.hooks.untap_all(&name);
            warn!(plugin = %name, taps_removed = removed, error = %source, "Plugin setup failed");
            return Err(SdkError::PluginSetup {
                plugin: name,
                source,
            });
        }

        debug!("Successfully registered plugin: {}", name);
        Ok(true)
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
    }

    /// Registered plugins in registration order
    pub fn get_all_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Unregister a plugin and detach its taps
    ///
    /// The plugin's `cleanup` is left to the caller.
    pub fn remove_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let removed = {
            let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
            let index = plugins.iter().position(|plugin| plugin.name() == name)?;
            plugins.remove(index)
        };
        let taps = self.hooks.untap_all(name);
        debug!(plugin = %name, taps_removed = taps, "Removed plugin");
        Some(removed)
    }
}
