use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use pingora::server::configuration::{Opt, ServerConf};
use pingora::{ErrorType::*, OrErr, Result};

pub mod tenant;
pub use tenant::{MenuItemConfig, TenantConfig};

pub const SERVER_NAME: &str = "res_menu";

/// Query parameter carrying an explicit tenant identifier.
pub const SUBDOMAIN_QUERY_PARAM: &str = "subdomain";
/// Request-scoped store key under which the resolved identifier is published.
pub const SUBDOMAIN_VAR: &str = "Subdomain";
/// Header used to forward the resolved identifier to the upstream app.
pub const SUBDOMAIN_HEADER: &str = "X-Subdomain";

/// Canonical menu route prefix; tenant-host requests are rewritten beneath it.
pub const MENU_ROUTE_PREFIX: &str = "/Menu";
/// Order pages keep their original path; only the identifier is attached.
pub const ORDER_ROUTE_PREFIX: &str = "/Order";

/// Leading host label that never names a tenant.
pub const WWW_LABEL: &str = "www";

/// Path prefixes served as static assets. Asset requests are never rewritten.
pub const STATIC_PATH_PREFIXES: &[&str] = &[
    "/lib/",
    "/css/",
    "/js/",
    "/images/",
    "/uploads/",
    "/favicon.ico",
];

/// Path suffixes served as static assets.
pub const STATIC_PATH_SUFFIXES: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot",
];

static BASE_DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?$").unwrap());

#[derive(Default, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,
    pub res_menu: GatewayConfig,
}

// Config file load and validation
impl Config {
    // Does not have to be async until we want runtime reload
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        log::debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.pingora.merge_with_opt(opt);
            Ok(conf)
        } else {
            pingora::Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        log::trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        // A missing or malformed base domain is fatal here, never per-request.
        conf.res_menu
            .validate()
            .or_err_with(ReadError, || "Invalid gateway configuration")?;

        log::trace!("Loaded conf: {conf:?}");
        Ok(conf)
    }
}

/// Gateway section of the config file.
#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Public base domain suffix, e.g. `res-menu.example.org`. Tenant hosts
    /// are `<slug>.<base_domain>`.
    #[validate(custom(function = GatewayConfig::validate_base_domain))]
    pub base_domain: String,
    #[validate(length(min = 1))]
    pub listeners: Vec<Listener>,
    /// Shared page-handler application behind the gateway.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    #[validate(nested)]
    pub tenants: Vec<TenantConfig>,
    pub prometheus: Option<Prometheus>,
    pub sentry: Option<Sentry>,
}

impl GatewayConfig {
    fn validate_base_domain(domain: &str) -> std::result::Result<(), ValidationError> {
        if domain.trim().is_empty() {
            return Err(ValidationError::new("base_domain_empty"));
        }
        if domain.contains("://") || domain.contains('/') || domain.contains(':') {
            return Err(ValidationError::new("base_domain_must_be_bare_host"));
        }
        if !BASE_DOMAIN_RE.is_match(domain) {
            return Err(ValidationError::new("base_domain_invalid"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listener {
    pub address: SocketAddr,
    #[serde(default)]
    pub offer_h2c: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub ip: String,
    pub port: u16,
    /// Extra headers to set on every proxied request.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

impl UpstreamConfig {
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn get_headers(&self) -> HashMap<String, String> {
        self.headers.clone().unwrap_or_default()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8090,
            headers: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sentry {
    pub dsn: String,
}

#[test]
fn from_yaml_minimal_config_parses_and_validates() {
    let conf = Config::from_yaml(
        r#"
res_menu:
  base_domain: res-menu.example.org
  listeners:
    - address: "0.0.0.0:8080"
  tenants:
    - name: "Pizza Palace"
      subdomain: pizza
      menu:
        - name: Margherita
          price: 9.5
"#,
    )
    .unwrap();
    assert_eq!(conf.res_menu.base_domain, "res-menu.example.org");
    assert_eq!(conf.res_menu.tenants.len(), 1);
    assert_eq!(conf.res_menu.upstream.get_addr(), "127.0.0.1:8090");
}

#[test]
fn from_yaml_missing_base_domain_is_rejected() {
    let res = Config::from_yaml(
        r#"
res_menu:
  base_domain: ""
  listeners:
    - address: "0.0.0.0:8080"
"#,
    );
    assert!(res.is_err());
}

#[test]
fn from_yaml_base_domain_with_scheme_is_rejected() {
    let res = Config::from_yaml(
        r#"
res_menu:
  base_domain: "https://res-menu.example.org"
  listeners:
    - address: "0.0.0.0:8080"
"#,
    );
    assert!(res.is_err());
}

#[test]
fn from_yaml_invalid_tenant_slug_is_rejected() {
    let res = Config::from_yaml(
        r#"
res_menu:
  base_domain: res-menu.example.org
  listeners:
    - address: "0.0.0.0:8080"
  tenants:
    - name: "Bad Slug"
      subdomain: "no spaces allowed"
"#,
    );
    assert!(res.is_err());
}
