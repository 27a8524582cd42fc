use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which side of the link this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Coordinator,
    Datanode,
    Secondary,
    Client,
}

/// How a peer judges spec compatibility before `set-spec` was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingSpecPolicy {
    /// An unset or empty local spec has no keys, so it matches anything.
    #[default]
    Vacuous,
    /// Spec match stays false until a non-empty local spec is set.
    RequireLocal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub role: Role,
    pub relation_name: String,
    pub unit_hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_address: Option<String>,
    pub missing_local_spec: MissingSpecPolicy,
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Client,
            relation_name: "hdfs".into(),
            unit_hostname: std::env::var("HOSTNAME").unwrap_or_default(),
            private_address: None,
            missing_local_spec: MissingSpecPolicy::default(),
            channel_capacity: 128,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("hdfs-link.toml"))
            .merge(Json::file("hdfs-link.json"))
            .merge(Env::prefixed("HDFS_LINK_"));
        let mut config = Self::from_figment(figment)?;

        // The hostname can also come from a mounted file
        if let Ok(hostname_file) = std::env::var("HDFS_LINK_UNIT_HOSTNAME_FILE") {
            config.unit_hostname = std::fs::read_to_string(hostname_file)?.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        // Must match hosts-map entries exactly
        config.unit_hostname = config.unit_hostname.trim().to_string();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_hostname.trim().is_empty() {
            return Err(Error::Config(
                "unit_hostname is empty; set HDFS_LINK_UNIT_HOSTNAME or HOSTNAME".into(),
            ));
        }
        if self.relation_name.is_empty() || self.relation_name.contains('.') {
            return Err(Error::Config(format!(
                "relation_name {:?} must be non-empty and contain no dots",
                self.relation_name
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Address published to the remote side; the hostname when unset.
    pub fn advertised_address(&self) -> &str {
        self.private_address
            .as_deref()
            .unwrap_or(&self.unit_hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn jailed_figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("hdfs-link.toml"))
            .merge(Env::prefixed("HDFS_LINK_"))
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hdfs-link.toml",
                r#"
                role = "datanode"
                unit_hostname = "datanode-0"
                missing_local_spec = "require-local"
                "#,
            )?;
            jail.set_env("HDFS_LINK_PRIVATE_ADDRESS", "10.0.0.9");

            let config = Config::from_figment(jailed_figment()).unwrap();
            assert_eq!(config.role, Role::Datanode);
            assert_eq!(config.unit_hostname, "datanode-0");
            assert_eq!(config.missing_local_spec, MissingSpecPolicy::RequireLocal);
            assert_eq!(config.advertised_address(), "10.0.0.9");
            assert_eq!(config.relation_name, "hdfs");
            Ok(())
        });
    }

    #[test]
    fn test_env_hostname_is_trimmed() {
        Jail::expect_with(|jail| {
            jail.set_env("HDFS_LINK_UNIT_HOSTNAME", " datanode-2\n");

            let config = Config::from_figment(jailed_figment()).unwrap();
            assert_eq!(config.unit_hostname, "datanode-2");
            assert_eq!(config.advertised_address(), "datanode-2");
            Ok(())
        });
    }

    #[test]
    fn test_validation() {
        let mut config = Config {
            unit_hostname: "namenode-0".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.advertised_address(), "namenode-0");

        config.relation_name = "hdfs.bad".into();
        assert!(config.validate().is_err());

        config.relation_name = "hdfs".into();
        config.unit_hostname = "  ".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
