use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;

use crate::{
    models::{Mode, ProductId, ProposalItem, Role, StyleProposal, UserRequest},
    services::candidates::CandidateSet,
};

/// Why a model answer was rejected
///
/// These never reach the user; the retry controller folds them into the
/// next prompt, or wraps the last one into a terminal failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("response does not match the required schema: {0}")]
    Schema(String),

    #[error("incomplete outfit: {0}")]
    IncompleteOutfit(String),

    #[error("product `{product_id}` is not in the candidate list")]
    UngroundedReference { product_id: String },

    #[error("total price {total} exceeds the budget of {budget}")]
    BudgetExceeded { total: Decimal, budget: Decimal },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Schema(_) => "schema",
            ValidationError::IncompleteOutfit(_) => "incomplete_outfit",
            ValidationError::UngroundedReference { .. } => "ungrounded_reference",
            ValidationError::BudgetExceeded { .. } => "budget_exceeded",
        }
    }

    /// Instruction for the model describing what to change
    pub fn corrective_feedback(&self) -> String {
        match self {
            ValidationError::Schema(detail) => format!(
                "Your answer could not be read as the required JSON object ({}). Reply with \
                 the JSON object only, exactly in the format described above.",
                detail
            ),
            ValidationError::IncompleteOutfit(detail) => format!(
                "Your selection had the wrong shape: {}. Follow the role rules exactly.",
                detail
            ),
            ValidationError::UngroundedReference { product_id } => format!(
                "You referenced product `{}`, which is not in the candidate list. Use only \
                 ids copied exactly from the candidate list.",
                product_id
            ),
            ValidationError::BudgetExceeded { total, budget } => format!(
                "Your outfit costs {} in total, which is over the budget of {} by {}. Choose \
                 cheaper products so the total is at most {}.",
                total,
                budget,
                total - budget,
                budget
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(default, alias = "overall_styling_proposal")]
    explanation: Option<String>,
    #[serde(default, alias = "suggested_products")]
    items: Option<Vec<RawItem>>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, alias = "id")]
    product_id: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Checks a raw model answer against the candidates it was shown
///
/// Pure function of its inputs. Checks run in order and stop at the first
/// failure: schema, mode shape, grounding, then the outfit budget.
pub fn validate(
    raw: &str,
    candidates: &CandidateSet<'_>,
    request: &UserRequest,
) -> Result<StyleProposal, ValidationError> {
    let (explanation, items) = parse_schema(raw, request.mode)?;

    check_shape(&items, candidates, request.mode)?;

    let mut total = Decimal::ZERO;
    for item in &items {
        let product = candidates.get(item.product_id.as_str()).ok_or_else(|| {
            ValidationError::UngroundedReference {
                product_id: item.product_id.to_string(),
            }
        })?;
        total += product.price;
    }

    if request.mode == Mode::FullOutfit {
        if let Some(budget) = request.budget {
            if total > budget {
                return Err(ValidationError::BudgetExceeded { total, budget });
            }
        }
    }

    Ok(StyleProposal {
        explanation,
        items,
        total_price: total,
    })
}

fn parse_schema(raw: &str, mode: Mode) -> Result<(String, Vec<ProposalItem>), ValidationError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ValidationError::Schema("no JSON object found".to_string()))?;

    let parsed: RawProposal =
        serde_json::from_str(json).map_err(|e| ValidationError::Schema(e.to_string()))?;

    let explanation = parsed
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ValidationError::Schema("missing or empty `explanation`".to_string()))?;

    let raw_items = parsed
        .items
        .ok_or_else(|| ValidationError::Schema("missing `items` array".to_string()))?;

    let mut items = Vec::with_capacity(raw_items.len());
    for (position, item) in raw_items.into_iter().enumerate() {
        let number = position + 1;
        // Identifiers are kept verbatim; padding makes them ungrounded
        let product_id = item
            .product_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ValidationError::Schema(format!("item {} is missing `product_id`", number))
            })?;

        let role = match item.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(label) => Some(label.parse::<Role>().map_err(|e| {
                ValidationError::Schema(format!("item {}: {}", number, e))
            })?),
            None if mode == Mode::FullOutfit => {
                return Err(ValidationError::Schema(format!(
                    "item {} is missing `role`",
                    number
                )))
            }
            None => None,
        };

        items.push(ProposalItem {
            product_id: ProductId::new(product_id),
            role,
        });
    }

    Ok((explanation, items))
}

fn check_shape(
    items: &[ProposalItem],
    candidates: &CandidateSet<'_>,
    mode: Mode,
) -> Result<(), ValidationError> {
    match mode {
        Mode::SingleItem => {
            if items.len() != 1 {
                return Err(ValidationError::IncompleteOutfit(format!(
                    "expected exactly one product, got {}",
                    items.len()
                )));
            }
        }
        Mode::FullOutfit => {
            let mut seen_products = HashSet::new();
            let mut seen_roles = HashSet::new();

            for item in items {
                if !seen_products.insert(item.product_id.as_str()) {
                    return Err(ValidationError::IncompleteOutfit(format!(
                        "product `{}` is used more than once",
                        item.product_id
                    )));
                }

                // Roles are guaranteed present by the schema check in this mode
                let Some(role) = item.role else { continue };
                if !seen_roles.insert(role) {
                    return Err(ValidationError::IncompleteOutfit(format!(
                        "role `{}` is filled more than once",
                        role
                    )));
                }

                // Ungrounded ids are reported by the grounding check
                if let Some(implied) = candidates
                    .get(item.product_id.as_str())
                    .and_then(|p| p.role())
                {
                    if implied != role {
                        return Err(ValidationError::IncompleteOutfit(format!(
                            "product `{}` is a {} but was labelled {}",
                            item.product_id, implied, role
                        )));
                    }
                }
            }

            let missing: Vec<&str> = Role::REQUIRED
                .iter()
                .filter(|role| !seen_roles.contains(*role))
                .map(|role| role.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(ValidationError::IncompleteOutfit(format!(
                    "missing required role(s): {}",
                    missing.join(", ")
                )));
            }
        }
    }

    Ok(())
}

/// Finds the JSON object in a model answer, tolerating markdown fences and prose
fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start <= end).then(|| &unfenced[start..=end])
}
