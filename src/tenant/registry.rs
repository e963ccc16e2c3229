use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use pingora::{Error, ErrorType::*, Result};

use crate::config::{Config, TenantConfig};

/// A registered restaurant and its menu.
#[derive(Debug)]
pub struct Tenant {
    /// the tenant config record
    pub inner: TenantConfig,
}

/// Global map of tenants keyed by case-folded subdomain slug, initialized
/// lazily and populated once at startup.
pub static TENANT_MAP: Lazy<DashMap<String, Arc<Tenant>>> = Lazy::new(DashMap::new);

/// Loads tenants from static configuration.
///
/// The subdomain slug is uniqueness-constrained; a duplicate aborts startup.
pub fn load_static_tenants(config: &Config) -> Result<()> {
    for tenant_cfg in config.res_menu.tenants.iter() {
        let slug = tenant_cfg.slug();
        let tenant = Arc::new(Tenant {
            inner: tenant_cfg.clone(),
        });
        if TENANT_MAP.insert(slug.clone(), tenant).is_some() {
            return Error::e_explain(ReadError, format!("Duplicate tenant subdomain '{slug}'"));
        }
        log::info!(
            "Loaded tenant '{}' under subdomain '{slug}'",
            tenant_cfg.name
        );
    }
    Ok(())
}

/// Fetches a tenant by its subdomain slug, case-insensitively.
///
/// `None` means "no matching tenant record"; the caller maps that to a
/// client-visible not-found, never a server error.
pub fn tenant_fetch(subdomain: &str) -> Option<Arc<Tenant>> {
    match TENANT_MAP.get(&subdomain.to_lowercase()) {
        Some(tenant) => Some(tenant.value().clone()),
        None => {
            log::warn!("Tenant with subdomain '{subdomain}' not found");
            None
        }
    }
}

#[cfg(test)]
fn config_with_tenants(tenants: Vec<TenantConfig>) -> Config {
    let mut config = Config::default();
    config.res_menu.tenants = tenants;
    config
}

#[test]
fn load_static_tenants_then_fetch_is_case_insensitive() {
    let config = config_with_tenants(vec![TenantConfig {
        name: "Sushi Corner".to_string(),
        subdomain: "SushiCorner".to_string(),
        ..Default::default()
    }]);
    load_static_tenants(&config).unwrap();

    let tenant = tenant_fetch("sushicorner").unwrap();
    assert_eq!(tenant.inner.name, "Sushi Corner");
    assert!(tenant_fetch("SUSHICORNER").is_some());
    assert!(tenant_fetch("unknown-slug").is_none());
}

#[test]
fn load_static_tenants_rejects_duplicate_slugs() {
    let config = config_with_tenants(vec![
        TenantConfig {
            name: "First".to_string(),
            subdomain: "dupe-slug".to_string(),
            ..Default::default()
        },
        TenantConfig {
            name: "Second".to_string(),
            subdomain: "DUPE-SLUG".to_string(),
            ..Default::default()
        },
    ]);
    assert!(load_static_tenants(&config).is_err());
}
