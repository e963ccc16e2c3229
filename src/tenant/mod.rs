//! Subdomain-based tenant resolution and request-rewrite policy.
//!
//! The resolver decides, from host, path and query string alone, which
//! tenant an inbound request targets. It performs no I/O and never fails a
//! request: ambiguous input degrades to "no tenant resolved".

pub mod registry;

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use once_cell::sync::Lazy;

use crate::config::{MENU_ROUTE_PREFIX, ORDER_ROUTE_PREFIX, WWW_LABEL};
use crate::utils::request::is_static_asset;

/// Networks whose literals are local-development hosts, never tenant hosts.
static LOCAL_NETWORKS: Lazy<Vec<Ipv4Network>> = Lazy::new(|| {
    vec![
        "127.0.0.0/8".parse().unwrap(),
        "10.0.0.0/8".parse().unwrap(),
        "192.168.0.0/16".parse().unwrap(),
        "172.0.0.0/8".parse().unwrap(),
    ]
});

/// How a request host classifies against the configured base domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostClass {
    /// Loopback or private-network literal (local development).
    Local,
    /// The bare application domain.
    Base,
    /// `<label>.<base-domain>` with a usable leading label.
    TenantLabel(String),
    /// Foreign domain, `www`-prefixed host, or malformed host.
    Other,
}

/// Which resolution rule produced the identifier. The source decides the
/// rewrite policy: only host-derived identifiers canonicalize the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Explicit `subdomain` query parameter.
    Query,
    /// Leading label of a tenant host.
    Host,
    /// `/Menu/<slug>` path segment on a local or base-domain host.
    MenuPath,
}

impl ResolvedFrom {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedFrom::Query => "query",
            ResolvedFrom::Host => "host",
            ResolvedFrom::MenuPath => "menu_path",
        }
    }
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Identifier as the client sent it; casing preserved for display.
    pub subdomain: String,
    pub source: ResolvedFrom,
}

impl Resolution {
    /// Case-folded identifier used for tenant lookup.
    pub fn slug(&self) -> String {
        self.subdomain.to_lowercase()
    }

    /// Canonical menu path for this tenant.
    pub fn menu_path(&self) -> String {
        format!("{MENU_ROUTE_PREFIX}/{}", self.subdomain)
    }

    /// Returns the canonicalized path, or `None` when the path must stay
    /// untouched.
    ///
    /// Only host-derived resolutions rewrite: explicit-parameter and
    /// path-derived requests are already addressable as-is. Static assets
    /// and non-menu tenant-scoped routes (order pages) keep their path; the
    /// identifier still travels through the request-scoped store and the
    /// query string.
    pub fn rewrite_path(&self, path: &str) -> Option<String> {
        if self.source != ResolvedFrom::Host {
            return None;
        }
        if is_static_asset(path) {
            return None;
        }
        let lower = path.to_lowercase();
        if lower.starts_with(&ORDER_ROUTE_PREFIX.to_lowercase()) {
            return None;
        }
        if lower == self.menu_path().to_lowercase() {
            return None;
        }
        Some(self.menu_path())
    }
}

/// One host-classification rule. Rules are evaluated top to bottom; the
/// first matching predicate wins.
struct HostRule {
    matches: fn(host: &str, base: &str) -> bool,
    classify: fn(host: &str, base: &str) -> HostClass,
}

const HOST_RULES: &[HostRule] = &[
    HostRule {
        matches: host_is_local,
        classify: |_, _| HostClass::Local,
    },
    HostRule {
        matches: host_is_base,
        classify: |_, _| HostClass::Base,
    },
    HostRule {
        matches: host_has_tenant_label,
        classify: classify_tenant_label,
    },
];

fn host_is_local(host: &str, _base: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<Ipv4Addr>()
        .map(|ip| LOCAL_NETWORKS.iter().any(|net| net.contains(ip)))
        .unwrap_or(false)
}

fn host_is_base(host: &str, base: &str) -> bool {
    host == base
}

fn host_has_tenant_label(host: &str, base: &str) -> bool {
    match leading_label(host, base) {
        Some(label) => !label.is_empty() && label != WWW_LABEL,
        None => false,
    }
}

fn classify_tenant_label(host: &str, base: &str) -> HostClass {
    // The predicate already guaranteed a usable label.
    match leading_label(host, base) {
        Some(label) => HostClass::TenantLabel(label.to_string()),
        None => HostClass::Other,
    }
}

/// Leading DNS label of `host` when it is a subdomain of `base`.
fn leading_label<'a>(host: &'a str, base: &str) -> Option<&'a str> {
    let prefix = host.strip_suffix(base)?.strip_suffix('.')?;
    prefix.split('.').next()
}

/// Resolves the tenant a request targets.
///
/// Construction happens once at startup from validated configuration; per
/// request the resolver only reads its own arguments.
pub struct TenantResolver {
    base_domain: String,
}

impl TenantResolver {
    pub fn new(base_domain: &str) -> Self {
        Self {
            base_domain: base_domain.to_lowercase(),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Classifies a host against the ordered rule table.
    pub fn classify_host(&self, host: &str) -> HostClass {
        let host = host.to_lowercase();
        let host = host.trim_end_matches('.');
        for rule in HOST_RULES {
            if (rule.matches)(host, &self.base_domain) {
                return (rule.classify)(host, &self.base_domain);
            }
        }
        HostClass::Other
    }

    /// Resolution precedence, first match wins:
    ///
    /// 1. non-empty `subdomain` query parameter, verbatim;
    /// 2. leading label of a tenant host;
    /// 3. `/Menu/<slug>` path segment, only on a local or base-domain host.
    pub fn resolve(
        &self,
        host: Option<&str>,
        path: &str,
        subdomain_param: Option<&str>,
    ) -> Option<Resolution> {
        if let Some(param) = subdomain_param {
            let param = param.trim();
            if !param.is_empty() {
                return Some(Resolution {
                    subdomain: param.to_string(),
                    source: ResolvedFrom::Query,
                });
            }
        }

        let class = match host {
            Some(host) => self.classify_host(host),
            None => HostClass::Other,
        };
        log::debug!("host {host:?} classified as {class:?}");

        match class {
            HostClass::TenantLabel(label) => Some(Resolution {
                subdomain: label,
                source: ResolvedFrom::Host,
            }),
            HostClass::Local | HostClass::Base => {
                menu_path_slug(path).map(|slug| Resolution {
                    subdomain: slug.to_string(),
                    source: ResolvedFrom::MenuPath,
                })
            }
            HostClass::Other => None,
        }
    }
}

/// Extracts `<slug>` from a `/Menu/<slug>` path, case-insensitive on the
/// route prefix.
fn menu_path_slug(path: &str) -> Option<&str> {
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next()?;
    if !first.eq_ignore_ascii_case(MENU_ROUTE_PREFIX.trim_start_matches('/')) {
        return None;
    }
    match segments.next() {
        Some(slug) if !slug.is_empty() => Some(slug),
        _ => None,
    }
}

#[cfg(test)]
fn resolver() -> TenantResolver {
    TenantResolver::new("res-menu.example.org")
}

#[test]
fn tenant_label_host_resolves_to_leading_label() {
    let res = resolver().resolve(Some("pizza.res-menu.example.org"), "/", None);
    assert_eq!(
        res,
        Some(Resolution {
            subdomain: "pizza".to_string(),
            source: ResolvedFrom::Host,
        })
    );
}

#[test]
fn base_domain_host_produces_no_tenant() {
    assert_eq!(resolver().resolve(Some("res-menu.example.org"), "/", None), None);
}

#[test]
fn www_host_produces_no_tenant() {
    assert_eq!(
        resolver().resolve(Some("www.res-menu.example.org"), "/", None),
        None
    );
}

#[test]
fn local_and_private_hosts_produce_no_host_tenant() {
    let r = resolver();
    for host in ["localhost", "127.0.0.1", "192.168.1.7", "10.0.0.5", "172.16.3.4"] {
        assert_eq!(r.resolve(Some(host), "/", None), None, "host {host}");
        assert_eq!(r.classify_host(host), HostClass::Local, "host {host}");
    }
}

#[test]
fn foreign_host_produces_no_tenant_and_no_path_fallback() {
    let r = resolver();
    assert_eq!(r.resolve(Some("evil.example.com"), "/Menu/pizza", None), None);
    assert_eq!(r.classify_host("evil.example.com"), HostClass::Other);
}

#[test]
fn query_parameter_takes_precedence_over_host_label() {
    let res = resolver().resolve(
        Some("tenanta.res-menu.example.org"),
        "/Menu",
        Some("tenantB"),
    );
    assert_eq!(
        res,
        Some(Resolution {
            subdomain: "tenantB".to_string(),
            source: ResolvedFrom::Query,
        })
    );
}

#[test]
fn empty_query_parameter_falls_through_to_host() {
    let res = resolver().resolve(Some("pizza.res-menu.example.org"), "/", Some("  "));
    assert_eq!(res.unwrap().subdomain, "pizza");
}

#[test]
fn menu_path_on_localhost_resolves_slug() {
    let res = resolver().resolve(Some("localhost"), "/Menu/pizza", None);
    assert_eq!(
        res,
        Some(Resolution {
            subdomain: "pizza".to_string(),
            source: ResolvedFrom::MenuPath,
        })
    );
}

#[test]
fn menu_path_without_slug_produces_no_tenant() {
    assert_eq!(resolver().resolve(Some("localhost"), "/Menu", None), None);
    assert_eq!(resolver().resolve(Some("localhost"), "/Menu/", None), None);
}

#[test]
fn host_classification_is_case_insensitive_and_slug_folds() {
    let res = resolver()
        .resolve(Some("TenantA.Res-Menu.Example.Org"), "/", None)
        .unwrap();
    // matching is case-folded, display casing preserved by host lowering
    assert_eq!(res.slug(), "tenanta");
}

#[test]
fn query_resolution_preserves_display_casing() {
    let res = resolver()
        .resolve(Some("localhost"), "/Menu", Some("PizzaPalace"))
        .unwrap();
    assert_eq!(res.subdomain, "PizzaPalace");
    assert_eq!(res.slug(), "pizzapalace");
}

#[test]
fn nested_label_host_uses_leading_label_only() {
    let res = resolver()
        .resolve(Some("a.b.res-menu.example.org"), "/", None)
        .unwrap();
    assert_eq!(res.subdomain, "a");
}

#[test]
fn host_rewrite_canonicalizes_root_path_to_menu_route() {
    let res = Resolution {
        subdomain: "pizza".to_string(),
        source: ResolvedFrom::Host,
    };
    assert_eq!(res.rewrite_path("/"), Some("/Menu/pizza".to_string()));
    assert_eq!(res.rewrite_path("/About"), Some("/Menu/pizza".to_string()));
    assert_eq!(res.rewrite_path("/menu"), Some("/Menu/pizza".to_string()));
}

#[test]
fn host_rewrite_is_idempotent_on_canonical_menu_path() {
    let res = Resolution {
        subdomain: "pizza".to_string(),
        source: ResolvedFrom::Host,
    };
    assert_eq!(res.rewrite_path("/Menu/pizza"), None);
    assert_eq!(res.rewrite_path("/menu/pizza"), None);
}

#[test]
fn host_rewrite_leaves_order_routes_untouched() {
    let res = Resolution {
        subdomain: "pizza".to_string(),
        source: ResolvedFrom::Host,
    };
    assert_eq!(res.rewrite_path("/Order/Status"), None);
    assert_eq!(res.rewrite_path("/order/status"), None);
}

#[test]
fn host_rewrite_leaves_static_assets_untouched() {
    let res = Resolution {
        subdomain: "pizza".to_string(),
        source: ResolvedFrom::Host,
    };
    assert_eq!(res.rewrite_path("/css/site.css"), None);
    assert_eq!(res.rewrite_path("/images/logo.png"), None);
}

#[test]
fn query_and_path_resolutions_never_rewrite_the_path() {
    for source in [ResolvedFrom::Query, ResolvedFrom::MenuPath] {
        let res = Resolution {
            subdomain: "pizza".to_string(),
            source,
        };
        assert_eq!(res.rewrite_path("/Menu"), None);
        assert_eq!(res.rewrite_path("/"), None);
    }
}
