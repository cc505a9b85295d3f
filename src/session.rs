//! Session context
//!
//! Everything that outlives a single command lives here: the default
//! region, the connection registry, the per-region zone cache, the
//! resource-id cache feeding tab completion, and the persisted config.
//! The session is constructed at startup and passed explicitly to every
//! command handler; invalidation (credential or region change) happens
//! through its methods, never as a side effect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::aws::{AwsCredentials, ConnectionRegistry};
use crate::cache::ResourceCache;
use crate::config::Config;
use crate::error::CmdError;

pub struct Session {
    region: String,
    pub debug: bool,
    registry: ConnectionRegistry,
    // Key: region-name, Value: zone-name list
    zones: HashMap<String, Vec<String>>,
    cache: Arc<Mutex<ResourceCache>>,
    config: Config,
}

impl Session {
    pub fn new(creds: AwsCredentials, region: String, debug: bool, config: Config) -> Self {
        Self::with_registry(ConnectionRegistry::new(creds), region, debug, config)
    }

    /// Point every service client at a custom endpoint (localstack,
    /// integration tests).
    pub fn with_endpoint_url(
        creds: AwsCredentials,
        region: String,
        debug: bool,
        config: Config,
        endpoint_url: impl Into<String>,
    ) -> Self {
        Self::with_registry(
            ConnectionRegistry::with_endpoint_url(creds, endpoint_url),
            region,
            debug,
            config,
        )
    }

    fn with_registry(
        registry: ConnectionRegistry,
        region: String,
        debug: bool,
        config: Config,
    ) -> Self {
        Self {
            region,
            debug,
            registry,
            zones: HashMap::new(),
            cache: Arc::new(Mutex::new(ResourceCache::new())),
            config,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Per-invocation region override (`-r`) or the session default.
    pub fn resolve_region<'a>(&'a self, region: Option<&'a str>) -> &'a str {
        region.unwrap_or(&self.region)
    }

    /// Change the default region. Cached resource ids are region-scoped
    /// and become stale, so the cache is cleared. The choice persists
    /// across sessions.
    pub fn set_region(&mut self, region: &str) {
        self.region = region.to_string();
        self.cache.lock().unwrap().clear(None);
        if let Err(err) = self.config.set_region(region) {
            tracing::warn!("failed to persist region: {err}");
        }
    }

    pub fn credentials(&self) -> &AwsCredentials {
        self.registry.credentials()
    }

    /// Swap credentials: every cached connection and resource id belongs
    /// to the old account and is dropped.
    pub fn set_credentials(&mut self, creds: AwsCredentials) {
        self.registry.set_credentials(creds);
        self.zones.clear();
        self.cache.lock().unwrap().clear(None);
    }

    pub fn set_credentials_name(&mut self, name: Option<String>) {
        self.registry.set_credentials_name(name);
    }

    pub async fn region_names(&mut self) -> Vec<String> {
        self.registry.region_names().await
    }

    pub async fn ec2(&mut self, region: Option<&str>) -> Result<aws_sdk_ec2::Client, CmdError> {
        let region = region.unwrap_or(&self.region).to_string();
        self.registry.ec2(&region).await
    }

    pub async fn iam(&mut self, region: Option<&str>) -> Result<aws_sdk_iam::Client, CmdError> {
        let region = region.unwrap_or(&self.region).to_string();
        self.registry.iam(&region).await
    }

    pub async fn rds(&mut self, region: Option<&str>) -> Result<aws_sdk_rds::Client, CmdError> {
        let region = region.unwrap_or(&self.region).to_string();
        self.registry.rds(&region).await
    }

    pub async fn elb(
        &mut self,
        region: Option<&str>,
    ) -> Result<aws_sdk_elasticloadbalancing::Client, CmdError> {
        let region = region.unwrap_or(&self.region).to_string();
        self.registry.elb(&region).await
    }

    /// Shared handle for the completer.
    pub fn cache(&self) -> Arc<Mutex<ResourceCache>> {
        Arc::clone(&self.cache)
    }

    pub fn cache_insert<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cache.lock().unwrap().insert(ids);
    }

    pub fn cache_remove<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cache.lock().unwrap().remove(ids);
    }

    /// Zone names of a region, fetched once and cached.
    pub async fn zone_names(&mut self, region: Option<&str>) -> Result<Vec<String>, CmdError> {
        let region = region.unwrap_or(&self.region).to_string();
        if let Some(zones) = self.zones.get(&region) {
            return Ok(zones.clone());
        }
        let ec2 = self.registry.ec2(&region).await?;
        let output = ec2
            .describe_availability_zones()
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        let zones: Vec<String> = output
            .availability_zones()
            .iter()
            .filter_map(|zone| zone.zone_name().map(str::to_string))
            .collect();
        self.zones.insert(region, zones.clone());
        Ok(zones)
    }

    pub async fn is_valid_zone(
        &mut self,
        region: Option<&str>,
        zone: &str,
    ) -> Result<bool, CmdError> {
        Ok(self.zone_names(region).await?.iter().any(|z| z == zone))
    }

    /// The zone command refreshes the cache whenever it lists a region's
    /// full zone set.
    pub fn update_zone_cache(&mut self, region: &str, zones: Vec<String>) {
        self.zones.insert(region.to_string(), zones);
    }
}
