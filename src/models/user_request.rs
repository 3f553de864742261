use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::normalize_tag;

/// What the user is asking for
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One product, each candidate priced within the budget
    #[default]
    SingleItem,
    /// One product per role, the total priced within the budget
    FullOutfit,
}

/// A single recommendation request, as submitted from the form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserRequest {
    /// Free-text occasion; commas separate multiple occasions
    #[serde(default)]
    pub occasion: Option<String>,
    /// Free-text style preference; commas separate multiple styles
    #[serde(default)]
    pub style: Option<String>,
    /// Occasion tags picked from the catalog vocabulary
    #[serde(default)]
    pub occasion_tags: Vec<String>,
    /// Style tags picked from the catalog vocabulary
    #[serde(default)]
    pub style_tags: Vec<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Article type; only honoured in single-item mode
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub mode: Mode,
}

impl UserRequest {
    pub fn single_item() -> Self {
        Self::default()
    }

    pub fn full_outfit(budget: Decimal) -> Self {
        Self {
            mode: Mode::FullOutfit,
            budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn with_occasion(mut self, occasion: &str) -> Self {
        self.occasion = Some(occasion.to_string());
        self
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }

    pub fn with_budget(mut self, budget: Decimal) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_gender(mut self, gender: &str) -> Self {
        self.gender = Some(gender.to_string());
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Rejects requests the engine cannot answer meaningfully
    pub fn validate(&self) -> Result<(), String> {
        match (self.mode, self.budget) {
            (Mode::FullOutfit, None) => {
                Err("a budget is required for full-outfit requests".to_string())
            }
            (_, Some(budget)) if budget < Decimal::ZERO => {
                Err(format!("budget must not be negative, got {}", budget))
            }
            _ => Ok(()),
        }
    }

    /// Occasion tags from the free text and the picked tags, normalised and deduplicated
    pub fn requested_occasions(&self) -> Vec<String> {
        collect_tags(self.occasion.as_deref(), &self.occasion_tags)
    }

    /// Style tags from the free text and the picked tags, normalised and deduplicated
    pub fn requested_styles(&self) -> Vec<String> {
        collect_tags(self.style.as_deref(), &self.style_tags)
    }

    /// Gender filter, `None` when any gender is acceptable
    pub fn gender_filter(&self) -> Option<String> {
        non_wildcard(self.gender.as_deref(), &["any"])
    }

    pub fn color_filter(&self) -> Option<String> {
        non_wildcard(self.color.as_deref(), &["any"])
    }

    /// Category filter; full-outfit requests span categories by definition
    pub fn category_filter(&self) -> Option<String> {
        match self.mode {
            Mode::SingleItem => non_wildcard(self.category.as_deref(), &["any", "full outfit"]),
            Mode::FullOutfit => None,
        }
    }
}

fn collect_tags(free_text: Option<&str>, picked: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let from_text = free_text.into_iter().flat_map(|text| text.split(','));
    for tag in from_text.chain(picked.iter().map(String::as_str)) {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn non_wildcard(value: Option<&str>, wildcards: &[&str]) -> Option<String> {
    let value = normalize_tag(value?);
    if value.is_empty() || wildcards.contains(&value.as_str()) {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_requested_tags_merge_free_text_and_picked() {
        let mut request = UserRequest::single_item().with_occasion("Work, Date Night ");
        request.occasion_tags = vec!["work".to_string(), "Party".to_string()];

        assert_eq!(
            request.requested_occasions(),
            vec!["work".to_string(), "date night".to_string(), "party".to_string()]
        );
        assert!(request.requested_styles().is_empty());
    }

    #[test]
    fn test_wildcards_disable_filters() {
        let request = UserRequest::single_item()
            .with_gender("Any")
            .with_color("  ")
            .with_category("Full outfit");

        assert_eq!(request.gender_filter(), None);
        assert_eq!(request.color_filter(), None);
        assert_eq!(request.category_filter(), None);
    }

    #[test]
    fn test_category_ignored_for_full_outfit() {
        let request = UserRequest::full_outfit(dec("300")).with_category("Jeans");
        assert_eq!(request.category_filter(), None);

        let request = UserRequest::single_item().with_category("Jeans");
        assert_eq!(request.category_filter(), Some("jeans".to_string()));
    }

    #[test]
    fn test_full_outfit_requires_budget() {
        let mut request = UserRequest::full_outfit(dec("150"));
        assert!(request.validate().is_ok());

        request.budget = None;
        assert!(request.validate().unwrap_err().contains("budget is required"));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let request = UserRequest::single_item().with_budget(dec("-1"));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_deserialize_form_payload() {
        let json = r#"{
            "occasion": "work",
            "budget": 100,
            "mode": "full_outfit",
            "gender": "Women"
        }"#;

        let request: UserRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, Mode::FullOutfit);
        assert_eq!(request.budget, Some(dec("100")));
        assert_eq!(request.gender_filter(), Some("women".to_string()));
    }
}
