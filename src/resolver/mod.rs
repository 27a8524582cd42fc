use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub mod hickory;
pub use hickory::HickoryResolver;

#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Turn a peer's `private-address` into an IP. IP literals are
    /// returned unchanged.
    async fn resolve(&self, address: &str) -> Result<IpAddr>;
}

/// Fixed name table, for tests and for deployments without DNS.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: impl Into<String>, ip: IpAddr) -> Self {
        self.hosts.insert(name.into(), ip);
        self
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, address: &str) -> Result<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        self.hosts
            .get(address)
            .copied()
            .ok_or_else(|| Error::Resolve {
                address: address.to_string(),
                reason: "unknown host".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver =
            StaticResolver::new().with_host("datanode-0", "10.0.0.7".parse().unwrap());
        assert_eq!(
            resolver.resolve("datanode-0").await.unwrap(),
            "10.0.0.7".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolver.resolve("192.168.1.4").await.unwrap(),
            "192.168.1.4".parse::<IpAddr>().unwrap()
        );
        assert!(matches!(
            resolver.resolve("nowhere").await,
            Err(Error::Resolve { .. })
        ));
    }
}
