//! Gateway proxy service.
//!
//! Runs the tenant resolver strictly before any tenant-aware handling,
//! applies the rewrite side effects, answers canonical menu routes
//! in-gateway, and proxies everything else to the shared page-handler
//! application.

use std::collections::HashMap;

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_error::Result;
use pingora_http::RequestHeader;
use pingora_proxy::{ProxyHttp, Session};
use uuid::Uuid;

use crate::{
    config::{GatewayConfig, UpstreamConfig, SUBDOMAIN_HEADER, SUBDOMAIN_QUERY_PARAM, SUBDOMAIN_VAR},
    metrics,
    service::endpoint::{self, Endpoint},
    tenant::TenantResolver,
    utils::request::{
        get_client_ip, get_query_param, get_request_host, rewrite_uri, upsert_query_param,
    },
};

/// Request-scoped store. Created at the start of request processing,
/// discarded at the end; never shared across requests.
pub struct GatewayContext {
    /// Correlation id for log lines belonging to one request.
    pub request_id: String,
    /// Key/value store downstream phases read, keyed by e.g. `"Subdomain"`.
    pub vars: HashMap<String, String>,
}

impl Default for GatewayContext {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            vars: HashMap::new(),
        }
    }
}

/// Proxy service.
///
/// Holds the per-process resolver and the upstream the gateway forwards
/// non-menu traffic to.
pub struct MenuProxyService {
    resolver: TenantResolver,
    upstream: UpstreamConfig,
}

impl MenuProxyService {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            resolver: TenantResolver::new(&config.base_domain),
            upstream: config.upstream.clone(),
        }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }
}

#[async_trait]
impl ProxyHttp for MenuProxyService {
    type CTX = GatewayContext;

    /// Creates a new context for each request
    fn new_ctx(&self) -> Self::CTX {
        Self::CTX::default()
    }

    /// Resolves the tenant and rewrites the request before anything else
    /// sees it.
    ///
    /// Returns `Ok(true)` when the gateway answered the request itself;
    /// `Ok(false)` lets the proxy continue to the upstream.
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let client_ip = get_client_ip(session);
        let header = session.req_header();
        let host = get_request_host(header).map(str::to_string);
        let path = header.uri.path().to_string();
        let query = header.uri.query().unwrap_or_default().to_string();
        let param = get_query_param(header, SUBDOMAIN_QUERY_PARAM).map(str::to_string);

        let resolution = self.resolver.resolve(host.as_deref(), &path, param.as_deref());

        if let Some(resolution) = &resolution {
            metrics::TENANT_RESOLUTIONS
                .with_label_values(&[resolution.source.as_str()])
                .inc();

            // Downstream handlers read the identifier from the store and
            // from the query string; keep both channels populated.
            ctx.vars
                .insert(SUBDOMAIN_VAR.to_string(), resolution.subdomain.clone());

            let new_path = resolution.rewrite_path(&path);
            let query_is_current = param.as_deref() == Some(resolution.subdomain.as_str());
            if new_path.is_some() || !query_is_current {
                let new_query =
                    upsert_query_param(&query, SUBDOMAIN_QUERY_PARAM, &resolution.subdomain);
                let target = new_path.as_deref().unwrap_or(&path);
                rewrite_uri(session.req_header_mut(), target, &new_query)?;
            }
            if let Some(target) = &new_path {
                metrics::PATH_REWRITES.inc();
                log::info!(
                    "request {} ({client_ip}): tenant '{}' via {}, path {path} -> {target}",
                    ctx.request_id,
                    resolution.subdomain,
                    resolution.source.as_str()
                );
            } else {
                log::debug!(
                    "request {}: tenant '{}' via {}, path untouched",
                    ctx.request_id,
                    resolution.subdomain,
                    resolution.source.as_str()
                );
            }
        } else {
            // Normal state: the upstream renders the landing page.
            log::debug!(
                "request {}: no tenant resolved for host {host:?} path {path}",
                ctx.request_id
            );
        }

        // Canonical menu routes are answered in-gateway.
        let final_path = session.req_header().uri.path().to_string();
        if let Some((Endpoint::Menu, route_slug)) = endpoint::match_endpoint(&final_path) {
            return endpoint::handle_menu_endpoint(ctx, self, session, route_slug.as_deref())
                .await;
        }

        Ok(false)
    }

    /// Selects the shared page-handler application as the upstream peer.
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let peer = Box::new(HttpPeer::new(
            self.upstream.get_addr(),
            false,
            self.upstream.ip.clone(),
        ));
        ctx.vars
            .insert("upstream".to_string(), peer._address.to_string());
        log::debug!("request {}: upstream peer {}", ctx.request_id, peer);
        Ok(peer)
    }

    /// Forwards the resolved identifier and any configured headers to the
    /// upstream.
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        if let Some(subdomain) = ctx.vars.get(SUBDOMAIN_VAR) {
            upstream_request.insert_header(SUBDOMAIN_HEADER, subdomain.as_str())?;
        }
        for (name, value) in self.upstream.get_headers() {
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            upstream_request.insert_header(name, value.as_str())?;
        }
        Ok(())
    }
}

#[test]
fn gateway_context_starts_empty_with_a_request_id() {
    let ctx = GatewayContext::default();
    assert!(!ctx.request_id.is_empty());
    assert!(ctx.vars.is_empty());
    assert_ne!(ctx.request_id, GatewayContext::default().request_id);
}
