use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

pub mod proposal;
pub mod user_request;

pub use proposal::{ProposalItem, StyleProposal};
pub use user_request::{Mode, UserRequest};

/// Identifier of a catalog product
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id for records exported without one, built from the key the export
    /// deduplicates on: name, category and color
    pub fn derive(name: Option<&str>, category: &str, color: &str) -> Self {
        let parts = [slug(name.unwrap_or("unnamed-product")), slug(category), slug(color)];
        let parts: Vec<&str> = parts.iter().map(String::as_str).filter(|p| !p.is_empty()).collect();
        Self(parts.join("--"))
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// `"Men's Navy  Blue Tee"` -> `"mens-navy-blue-tee"`
fn slug(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .to_string()
}

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for ProductId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn default_master_category() -> String {
    "Apparel".to_string()
}

fn default_currency() -> String {
    "PLN".to_string()
}

/// A tagged catalog record, read-only once the catalog is loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Missing in the tagging pipeline output; derived at load time
    #[serde(default)]
    pub id: ProductId,
    /// Display name (`product_name` in the tagging pipeline output)
    #[serde(default, alias = "product_name")]
    pub name: Option<String>,
    /// Article type, e.g. "Tshirts" or "Casual Shoes"
    pub category: String,
    #[serde(default = "default_master_category")]
    pub master_category: String,
    #[serde(default)]
    pub sub_category: Option<String>,
    pub gender: String,
    #[serde(alias = "base_color")]
    pub color: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub image_url: String,
    pub purchase_link: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    /// "Casual", "Formal", "Sports", ...
    #[serde(default)]
    pub usage_type: Option<String>,
    #[serde(default)]
    pub collection_year: Option<i32>,
    /// Tags are mandatory keys, but may be empty
    pub occasion_tags: Vec<String>,
    pub style_tags: Vec<String>,
}

impl Product {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Outfit role implied by the product category, if recognisable
    pub fn role(&self) -> Option<Role> {
        Role::from_category(&self.category)
    }

    pub fn is_apparel(&self) -> bool {
        self.master_category.eq_ignore_ascii_case("apparel")
    }

    pub fn is_unisex(&self) -> bool {
        self.gender.eq_ignore_ascii_case("unisex")
    }

    pub fn has_occasion(&self, tag: &str) -> bool {
        self.occasion_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn has_style(&self, tag: &str) -> bool {
        self.style_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Slot a product fills in a full outfit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Top,
    Bottom,
    Footwear,
    Outerwear,
    Accessory,
}

// Checked in order: "Capris" is a bottom before it is a cap.
const ROLE_KEYWORDS: &[(Role, &[&str])] = &[
    (
        Role::Footwear,
        &["shoe", "sandal", "flip flop", "heel", "flats", "boot", "sneaker", "slipper"],
    ),
    (
        Role::Outerwear,
        &["jacket", "blazer", "coat", "shrug", "waistcoat", "cardigan"],
    ),
    (
        Role::Bottom,
        &[
            "jean", "trouser", "short", "skirt", "pant", "legging", "capri", "palazzo",
            "salwar", "churidar", "jogger", "jegging",
        ],
    ),
    (
        Role::Accessory,
        &["belt", "cap", "hat", "scarf", "scarves", "tie", "stole", "sock", "glove"],
    ),
    (
        Role::Top,
        &[
            "shirt", "top", "kurta", "kurti", "tunic", "sweater", "blouse", "polo", "tank",
            "camisole", "hoodie",
        ],
    ),
];

impl Role {
    pub const REQUIRED: [Role; 3] = [Role::Top, Role::Bottom, Role::Footwear];
    pub const OPTIONAL: [Role; 2] = [Role::Outerwear, Role::Accessory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Top => "top",
            Role::Bottom => "bottom",
            Role::Footwear => "footwear",
            Role::Outerwear => "outerwear",
            Role::Accessory => "accessory",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn from_category(category: &str) -> Option<Role> {
        let category = category.to_lowercase();
        ROLE_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| category.contains(k)))
            .map(|(role, _)| *role)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top" => Ok(Role::Top),
            "bottom" => Ok(Role::Bottom),
            "footwear" | "shoes" => Ok(Role::Footwear),
            "outerwear" => Ok(Role::Outerwear),
            "accessory" => Ok(Role::Accessory),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

/// Lowercases and trims a tag; empty tags are dropped by callers
pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
