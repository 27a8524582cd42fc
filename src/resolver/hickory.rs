use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::{debug, warn};

use super::AddressResolver;
use crate::error::{Error, Result};

/// Resolves peer addresses through the system DNS configuration.
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryResolver {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!(
                "Failed to load system resolv.conf: {}. Falling back to default upstreams.",
                e
            );
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for HickoryResolver {
    async fn resolve(&self, address: &str) -> Result<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        let lookup = self
            .resolver
            .lookup_ip(address)
            .await
            .map_err(|e| Error::Resolve {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        let ip = lookup.iter().next().ok_or_else(|| Error::Resolve {
            address: address.to_string(),
            reason: "no records".into(),
        })?;
        debug!("Resolved {} -> {}", address, ip);
        Ok(ip)
    }
}
