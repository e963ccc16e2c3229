use http::StatusCode;
use matchit::Router;
use once_cell::sync::Lazy;
use pingora::{ErrorType::*, OrErr};
use pingora_error::Result;
use pingora_proxy::Session;
use serde::Serialize;

use crate::{
    config::{SUBDOMAIN_QUERY_PARAM, SUBDOMAIN_VAR},
    metrics,
    proxy::{GatewayContext, MenuProxyService},
    service::response::ResponseBuilder,
    tenant::registry::{tenant_fetch, Tenant},
    tenant::HostClass,
    utils::request::{get_query_param, get_request_host},
};

/// Routes the gateway answers itself instead of proxying upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Menu,
}

/// Dispatch table over the case-folded request path.
static ENDPOINT_ROUTER: Lazy<Router<Endpoint>> = Lazy::new(|| {
    let mut router = Router::new();
    router.insert("/menu", Endpoint::Menu).unwrap();
    router.insert("/menu/{subdomain}", Endpoint::Menu).unwrap();
    router
});

/// Matches a path against the in-gateway endpoints.
///
/// The returned route parameter is case-folded along with the path; tenant
/// lookup is case-insensitive so nothing is lost.
pub fn match_endpoint(path: &str) -> Option<(Endpoint, Option<String>)> {
    let lower = path.to_lowercase();
    ENDPOINT_ROUTER.at(&lower).ok().map(|m| {
        (
            *m.value,
            m.params.get("subdomain").map(|s| s.to_string()),
        )
    })
}

#[derive(Serialize)]
struct MenuView<'a> {
    name: &'a str,
    subdomain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_family: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accent_color: Option<&'a str>,
    items: Vec<MenuItemView<'a>>,
}

#[derive(Serialize)]
struct MenuItemView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

/// Renders a tenant's menu: available items only, sorted by name.
fn render_menu(tenant: &Tenant) -> MenuView<'_> {
    let cfg = &tenant.inner;
    let mut items: Vec<MenuItemView<'_>> = cfg
        .menu
        .iter()
        .filter(|item| item.is_available)
        .map(|item| MenuItemView {
            name: &item.name,
            description: item.description.as_deref(),
            price: item.price,
            image_url: item.image_url.as_deref(),
            category: item.category.as_deref(),
        })
        .collect();
    items.sort_by(|a, b| a.name.cmp(b.name));

    MenuView {
        name: &cfg.name,
        subdomain: &cfg.subdomain,
        description: cfg.description.as_deref(),
        logo_url: cfg.logo_url.as_deref(),
        font_family: cfg.font_family.as_deref(),
        accent_color: cfg.accent_color.as_deref(),
        items,
    }
}

/// Identifier lookup precedence for the menu handler: explicit route or
/// query parameter, then the request-scoped store, then re-derivation from
/// the host as a last resort.
fn effective_slug(
    route_slug: Option<&str>,
    query_slug: Option<&str>,
    stored: Option<&str>,
    host_label: Option<String>,
) -> Option<String> {
    route_slug
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| query_slug.filter(|s| !s.is_empty()).map(str::to_string))
        .or_else(|| stored.filter(|s| !s.is_empty()).map(str::to_string))
        .or(host_label)
}

/// Serves the shared menu page for whichever tenant the request resolved to.
///
/// Menu browsing is anonymous. An unresolved identifier or an identifier
/// with no matching tenant record is a client error, never a server error.
pub async fn handle_menu_endpoint(
    ctx: &GatewayContext,
    gateway: &MenuProxyService,
    session: &mut Session,
    route_slug: Option<&str>,
) -> Result<bool> {
    let header = session.req_header();
    let query_slug = get_query_param(header, SUBDOMAIN_QUERY_PARAM).map(str::to_string);
    let stored = ctx.vars.get(SUBDOMAIN_VAR).cloned();
    let host_label =
        get_request_host(header).and_then(|host| match gateway.resolver().classify_host(host) {
            HostClass::TenantLabel(label) => Some(label),
            _ => None,
        });

    let slug = effective_slug(
        route_slug,
        query_slug.as_deref(),
        stored.as_deref(),
        host_label,
    );

    let Some(slug) = slug else {
        log::debug!("menu request {} without a tenant identifier", ctx.request_id);
        metrics::MENU_RESPONSES.with_label_values(&["no_tenant"]).inc();
        return ResponseBuilder::send_not_found(session, "No restaurant selected.").await;
    };

    match tenant_fetch(&slug) {
        Some(tenant) => {
            let body = serde_json::to_string(&render_menu(&tenant))
                .or_err_with(InternalError, || "Failed to serialize menu")?;
            metrics::MENU_RESPONSES.with_label_values(&["ok"]).inc();
            ResponseBuilder::send_json(session, StatusCode::OK, body).await
        }
        None => {
            metrics::MENU_RESPONSES
                .with_label_values(&["not_found"])
                .inc();
            ResponseBuilder::send_not_found(session, "Restaurant not found.").await
        }
    }
}

#[test]
fn match_endpoint_matches_menu_routes_case_insensitively() {
    assert_eq!(match_endpoint("/Menu"), Some((Endpoint::Menu, None)));
    assert_eq!(
        match_endpoint("/Menu/Pizza"),
        Some((Endpoint::Menu, Some("pizza".to_string())))
    );
    assert_eq!(
        match_endpoint("/menu/sushi"),
        Some((Endpoint::Menu, Some("sushi".to_string())))
    );
    assert_eq!(match_endpoint("/Order/Status"), None);
    assert_eq!(match_endpoint("/"), None);
    assert_eq!(match_endpoint("/css/site.css"), None);
}

#[test]
fn effective_slug_prefers_route_then_query_then_store_then_host() {
    assert_eq!(
        effective_slug(Some("route"), Some("query"), Some("store"), Some("host".into())),
        Some("route".to_string())
    );
    assert_eq!(
        effective_slug(None, Some("query"), Some("store"), Some("host".into())),
        Some("query".to_string())
    );
    assert_eq!(
        effective_slug(None, None, Some("store"), Some("host".into())),
        Some("store".to_string())
    );
    assert_eq!(
        effective_slug(None, None, None, Some("host".into())),
        Some("host".to_string())
    );
    assert_eq!(effective_slug(None, None, None, None), None);
}

#[test]
fn effective_slug_skips_empty_values() {
    assert_eq!(
        effective_slug(Some(""), Some(""), Some("store"), None),
        Some("store".to_string())
    );
}

#[test]
fn render_menu_filters_unavailable_items_and_sorts_by_name() {
    use crate::config::{MenuItemConfig, TenantConfig};

    let tenant = Tenant {
        inner: TenantConfig {
            name: "Pizza Palace".to_string(),
            subdomain: "pizza".to_string(),
            menu: vec![
                MenuItemConfig {
                    name: "Zucchini Fritti".to_string(),
                    price: 6.0,
                    ..Default::default()
                },
                MenuItemConfig {
                    name: "Margherita".to_string(),
                    price: 9.5,
                    ..Default::default()
                },
                MenuItemConfig {
                    name: "Seasonal Special".to_string(),
                    price: 12.0,
                    is_available: false,
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
    };

    let view = render_menu(&tenant);
    let names: Vec<&str> = view.items.iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["Margherita", "Zucchini Fritti"]);
    assert_eq!(view.subdomain, "pizza");
}
