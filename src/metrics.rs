use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

/// Requests with a resolved tenant identifier, by resolution source.
pub static TENANT_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "res_menu_tenant_resolutions_total",
        "Requests with a resolved tenant identifier, by resolution source",
        &["source"]
    )
    .unwrap()
});

/// Requests whose path was rewritten to the canonical menu route.
pub static PATH_REWRITES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "res_menu_path_rewrites_total",
        "Requests whose path was rewritten to the canonical menu route"
    )
    .unwrap()
});

/// Menu endpoint responses, by outcome.
pub static MENU_RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "res_menu_menu_responses_total",
        "Menu endpoint responses, by outcome",
        &["outcome"]
    )
    .unwrap()
});
