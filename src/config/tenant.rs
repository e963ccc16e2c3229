use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Subdomain slugs may only contain letters, numbers, and hyphens.
static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").unwrap());

/// Accent colors are hex codes like `#FF5733`.
static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

/// One restaurant account, uniquely identified by its subdomain slug.
///
/// The slug is matched case-insensitively against request hosts; the
/// original casing is kept for display.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct TenantConfig {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50),
        custom(function = TenantConfig::validate_slug)
    )]
    pub subdomain: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub logo_url: Option<String>,
    #[validate(length(max = 50))]
    pub font_family: Option<String>,
    #[validate(custom(function = TenantConfig::validate_accent_color))]
    pub accent_color: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub menu: Vec<MenuItemConfig>,
}

impl TenantConfig {
    /// Case-folded slug used for lookup; the configured casing is display-only.
    pub fn slug(&self) -> String {
        self.subdomain.to_lowercase()
    }

    fn validate_slug(subdomain: &str) -> Result<(), ValidationError> {
        if SLUG_RE.is_match(subdomain) {
            Ok(())
        } else {
            let mut err = ValidationError::new("invalid_subdomain_slug");
            err.add_param("subdomain".into(), &subdomain);
            Err(err)
        }
    }

    fn validate_accent_color(color: &str) -> Result<(), ValidationError> {
        if HEX_COLOR_RE.is_match(color) {
            Ok(())
        } else {
            Err(ValidationError::new("invalid_accent_color"))
        }
    }
}

/// One dish on a tenant's menu.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct MenuItemConfig {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, max = 10000.0))]
    pub price: f64,
    pub image_url: Option<String>,
    #[serde(default = "MenuItemConfig::default_available")]
    pub is_available: bool,
    pub category: Option<String>,
}

impl MenuItemConfig {
    fn default_available() -> bool {
        true
    }
}

impl Default for MenuItemConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            price: 0.0,
            image_url: None,
            is_available: true,
            category: None,
        }
    }
}

#[test]
fn tenant_config_hyphenated_slug_is_accepted() {
    let tenant = TenantConfig {
        name: "La Bella".to_string(),
        subdomain: "la-bella-2".to_string(),
        ..Default::default()
    };
    assert!(tenant.validate().is_ok());
    assert_eq!(tenant.slug(), "la-bella-2");
}

#[test]
fn tenant_config_slug_with_dot_is_rejected() {
    let tenant = TenantConfig {
        name: "Dotty".to_string(),
        subdomain: "a.b".to_string(),
        ..Default::default()
    };
    assert!(tenant.validate().is_err());
}

#[test]
fn tenant_config_mixed_case_slug_folds_for_lookup() {
    let tenant = TenantConfig {
        name: "Pizza".to_string(),
        subdomain: "PizzaPalace".to_string(),
        ..Default::default()
    };
    assert!(tenant.validate().is_ok());
    assert_eq!(tenant.slug(), "pizzapalace");
}

#[test]
fn tenant_config_bad_accent_color_is_rejected() {
    let tenant = TenantConfig {
        name: "Color".to_string(),
        subdomain: "color".to_string(),
        accent_color: Some("red".to_string()),
        ..Default::default()
    };
    assert!(tenant.validate().is_err());
}

#[test]
fn menu_item_out_of_range_price_is_rejected() {
    let item = MenuItemConfig {
        name: "Gold Leaf Burger".to_string(),
        price: 20000.0,
        ..Default::default()
    };
    assert!(item.validate().is_err());
}
