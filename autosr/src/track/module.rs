//! Site modules and host resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::target::Target;
use crate::utils::url::link_host;
use crate::{Error, Result};

/// Site-specific logic that creates and manages targets for a set of hosts.
#[async_trait]
pub trait Module: Send + Sync {
    /// Module name, for logs.
    fn name(&self) -> &str;

    /// Hosts this module is responsible for.
    fn hosts(&self) -> Vec<String>;

    /// Create (or return the existing) target for `link`.
    async fn add_target(&self, ctx: &CancellationToken, link: &str) -> Result<Arc<dyn Target>>;

    /// Forget the target for `link`, returning it.
    async fn remove_target(&self, ctx: &CancellationToken, link: &str)
    -> Result<Arc<dyn Target>>;
}

/// Host name → module table, built once at startup.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    by_host: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` for every host it claims.
    ///
    /// A later registration for the same host replaces the earlier one.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        for host in module.hosts() {
            let host = host.trim().to_ascii_lowercase();
            if host.is_empty() {
                continue;
            }
            if let Some(previous) = self.by_host.insert(host.clone(), Arc::clone(&module)) {
                warn!(
                    host = %host,
                    previous = previous.name(),
                    module = module.name(),
                    "Host claimed by more than one module"
                );
            } else {
                debug!(host = %host, module = module.name(), "Registered module");
            }
        }
    }

    pub fn with_module(mut self, module: Arc<dyn Module>) -> Self {
        self.register(module);
        self
    }

    /// Module responsible for `host`.
    pub fn find(&self, host: &str) -> Result<Arc<dyn Module>> {
        self.by_host
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::NoModuleForHost(host.to_string()))
    }

    /// Module responsible for the host of `link`, together with that host.
    pub fn find_for_link(&self, link: &str) -> Result<(String, Arc<dyn Module>)> {
        let host = link_host(link)?;
        let module = self.find(&host)?;
        Ok((host, module))
    }

    /// Registered hosts, sorted.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.by_host.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedModule {
        name: &'static str,
        hosts: Vec<String>,
    }

    #[async_trait]
    impl Module for NamedModule {
        fn name(&self) -> &str {
            self.name
        }

        fn hosts(&self) -> Vec<String> {
            self.hosts.clone()
        }

        async fn add_target(&self, _: &CancellationToken, link: &str) -> Result<Arc<dyn Target>> {
            Err(Error::module(self.name, format!("cannot add {link}")))
        }

        async fn remove_target(
            &self,
            _: &CancellationToken,
            link: &str,
        ) -> Result<Arc<dyn Target>> {
            Err(Error::module(self.name, format!("cannot remove {link}")))
        }
    }

    fn module(name: &'static str, hosts: &[&str]) -> Arc<dyn Module> {
        Arc::new(NamedModule {
            name,
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        })
    }

    #[test]
    fn test_find_by_host() {
        let registry = ModuleRegistry::new()
            .with_module(module("one", &["one.tv", "www.one.tv"]))
            .with_module(module("two", &["Two.TV"]));

        assert_eq!(registry.find("one.tv").unwrap().name(), "one");
        assert_eq!(registry.find("www.one.tv").unwrap().name(), "one");
        assert_eq!(registry.find("two.tv").unwrap().name(), "two");
        assert_eq!(registry.hosts(), vec!["one.tv", "two.tv", "www.one.tv"]);
    }

    #[test]
    fn test_unknown_host_fails() {
        let registry = ModuleRegistry::new().with_module(module("one", &["one.tv"]));
        assert!(matches!(
            registry.find("three.tv"),
            Err(Error::NoModuleForHost(h)) if h == "three.tv"
        ));
    }

    #[test]
    fn test_find_for_link() {
        let registry = ModuleRegistry::new().with_module(module("one", &["one.tv"]));
        let (host, m) = registry.find_for_link("https://ONE.tv/alice").unwrap();
        assert_eq!(host, "one.tv");
        assert_eq!(m.name(), "one");

        assert!(matches!(
            registry.find_for_link("https://other.tv/alice"),
            Err(Error::NoModuleForHost(_))
        ));
        assert!(matches!(
            registry.find_for_link("not a link"),
            Err(Error::InvalidLink { .. })
        ));
    }

    #[test]
    fn test_blank_hosts_are_ignored() {
        let registry = ModuleRegistry::new().with_module(module("one", &["", "  "]));
        assert!(registry.is_empty());
    }
}
