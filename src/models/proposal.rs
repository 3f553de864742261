use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ProductId, Role};

/// One product picked by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalItem {
    pub product_id: ProductId,
    /// Present for every item of a full outfit
    pub role: Option<Role>,
}

/// A model answer that passed validation against its candidate set
///
/// Items reference products by identifier only; prices, images and links are
/// resolved from the catalog snapshot that produced the candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleProposal {
    pub explanation: String,
    pub items: Vec<ProposalItem>,
    /// Sum of the referenced catalog prices
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

impl StyleProposal {
    pub fn item_for_role(&self, role: Role) -> Option<&ProposalItem> {
        self.items.iter().find(|item| item.role == Some(role))
    }
}
