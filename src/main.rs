use pingora::services::listening::Service;
use pingora_core::{
    apps::HttpServerOptions,
    server::{configuration::Opt, Server},
};
use pingora_proxy::{http_proxy_service_with_name, HttpProxy};
use sentry::IntoDsn;

use res_menu::config::{self, Config, SERVER_NAME};
use res_menu::proxy::MenuProxyService;
use res_menu::tenant::registry::load_static_tenants;

fn main() {
    // Load configuration and command-line arguments
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,pingora_core=warn");
    }
    env_logger::init();

    let cli_options = Opt::parse_args();
    let config =
        Config::load_yaml_with_opt_override(&cli_options).expect("Failed to load configuration");

    log::info!(
        "Base domain: {}, tenant hosts are <subdomain>.{}",
        config.res_menu.base_domain,
        config.res_menu.base_domain
    );

    log::info!("Loading tenants...");
    load_static_tenants(&config).expect("Failed to load static tenants");

    // Create the server instance
    let mut gateway_server = Server::new_with_opt_and_conf(Some(cli_options), config.pingora);

    let mut http_service: Service<HttpProxy<MenuProxyService>> = http_proxy_service_with_name(
        &gateway_server.configuration,
        MenuProxyService::new(&config.res_menu),
        SERVER_NAME,
    );

    log::info!("Adding listeners...");
    add_listeners(&mut http_service, &config.res_menu);

    add_optional_services(&mut gateway_server, &config.res_menu);

    log::info!("Bootstrapping...");
    gateway_server.bootstrap();
    log::info!("Bootstrapped. Adding services...");
    gateway_server.add_service(http_service);

    log::info!("Starting server...");
    for list_cfg in config.res_menu.listeners.iter() {
        println!("Listening on: {}", list_cfg.address);
    }

    gateway_server.run_forever();
}

fn add_listeners(
    http_service: &mut Service<HttpProxy<MenuProxyService>>,
    cfg: &config::GatewayConfig,
) {
    for list_cfg in cfg.listeners.iter() {
        if list_cfg.offer_h2c {
            let http_logic = http_service.app_logic_mut().unwrap();
            let mut http_server_options = HttpServerOptions::default();
            http_server_options.h2c = true;
            http_logic.server_options = Some(http_server_options);
        }
        http_service.add_tcp(&list_cfg.address.to_string());
    }
}

// Optional services: Sentry error reporting and a Prometheus scrape endpoint.
fn add_optional_services(server: &mut Server, cfg: &config::GatewayConfig) {
    if let Some(sentry_cfg) = &cfg.sentry {
        log::info!("Adding Sentry config...");
        server.sentry = Some(sentry::ClientOptions {
            dsn: sentry_cfg
                .dsn
                .clone()
                .into_dsn()
                .expect("Invalid Sentry DSN"),
            ..Default::default()
        });
    }

    if let Some(prometheus_cfg) = &cfg.prometheus {
        log::info!("Adding Prometheus service...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }
}
