use crate::{
    catalog::Catalog,
    models::{Mode, Product, Role, UserRequest},
};

/// Default cap on how many products are shown to the model
pub const DEFAULT_MAX_CANDIDATES: usize = 30;

/// Raised when the filtered catalog cannot satisfy the request
///
/// Either nothing passed the filters, or a full outfit has no candidate for
/// some required role. The selector never relaxes constraints on its own;
/// the caller decides whether to ask the user for a broader search.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error(
    "no catalog products match the request ({considered} products considered){}",
    missing_suffix(.missing_roles)
)]
pub struct NoCandidatesError {
    pub considered: usize,
    /// Required outfit roles with no candidate; empty when nothing matched at all
    pub missing_roles: Vec<Role>,
}

impl NoCandidatesError {
    pub fn nothing_matched(considered: usize) -> Self {
        Self {
            considered,
            missing_roles: Vec::new(),
        }
    }
}

fn missing_suffix(roles: &[Role]) -> String {
    if roles.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
    format!("; nothing for {}", names.join(", "))
}

/// How closely a product matches the requested tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    /// Every requested occasion and style tag present, color equal
    Exact,
    /// Passed the filters, but only some requested tags matched
    Partial,
}

/// Products shown to the model for one request, best match first
///
/// Borrows from the catalog snapshot the request started with.
#[derive(Debug, Clone)]
pub struct CandidateSet<'a> {
    products: Vec<&'a Product>,
}

impl<'a> CandidateSet<'a> {
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Product> + '_ {
        self.products.iter().copied()
    }

    /// Exact identifier lookup within the set
    pub fn get(&self, id: &str) -> Option<&'a Product> {
        self.products.iter().copied().find(|p| p.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// Filters and ranks the catalog for `request`, keeping at most `max_candidates`
pub fn select_candidates<'a>(
    request: &UserRequest,
    catalog: &'a Catalog,
    max_candidates: usize,
) -> Result<CandidateSet<'a>, NoCandidatesError> {
    let criteria = Criteria::from_request(request);

    let mut ranked: Vec<(MatchRank, &'a Product)> = catalog
        .all()
        .iter()
        .filter_map(|product| criteria.rank(product).map(|rank| (rank, product)))
        .collect();

    if ranked.is_empty() {
        tracing::info!(
            considered = catalog.len(),
            mode = ?request.mode,
            "No candidates matched request"
        );
        return Err(NoCandidatesError::nothing_matched(catalog.len()));
    }

    // Stable sort: equal ranks keep catalog order
    ranked.sort_by_key(|(rank, _)| *rank);
    let matched = ranked.len();

    let products = truncate(ranked, max_candidates.max(1), request.mode);

    if request.mode == Mode::FullOutfit {
        let missing: Vec<Role> = Role::REQUIRED
            .into_iter()
            .filter(|role| !products.iter().any(|p| p.role() == Some(*role)))
            .collect();
        // No answer could ever validate, so the model is never asked
        if !missing.is_empty() {
            tracing::info!(missing = ?missing, "Candidate set lacks required outfit roles");
            return Err(NoCandidatesError {
                considered: catalog.len(),
                missing_roles: missing,
            });
        }
    }

    tracing::debug!(
        matched,
        selected = products.len(),
        exact = products
            .iter()
            .filter(|p| criteria.rank(p) == Some(MatchRank::Exact))
            .count(),
        "Candidates selected"
    );

    Ok(CandidateSet { products })
}

/// Keeps the best `max` products; full outfits reserve a slot per required role first
fn truncate<'a>(ranked: Vec<(MatchRank, &'a Product)>, max: usize, mode: Mode) -> Vec<&'a Product> {
    if ranked.len() <= max {
        return ranked.into_iter().map(|(_, p)| p).collect();
    }

    let mut keep = vec![false; ranked.len()];
    let mut slots = max;

    if mode == Mode::FullOutfit {
        for role in Role::REQUIRED {
            if slots == 0 {
                break;
            }
            if let Some(position) = ranked.iter().position(|(_, p)| p.role() == Some(role)) {
                keep[position] = true;
                slots -= 1;
            }
        }
    }

    for kept in keep.iter_mut() {
        if slots == 0 {
            break;
        }
        if !*kept {
            *kept = true;
            slots -= 1;
        }
    }

    ranked
        .into_iter()
        .zip(keep)
        .filter_map(|((_, product), kept)| kept.then_some(product))
        .collect()
}

/// Request filters, normalised once per selection
struct Criteria {
    mode: Mode,
    occasions: Vec<String>,
    styles: Vec<String>,
    gender: Option<String>,
    color: Option<String>,
    category: Option<String>,
    budget: Option<rust_decimal::Decimal>,
}

impl Criteria {
    fn from_request(request: &UserRequest) -> Self {
        Self {
            mode: request.mode,
            occasions: request.requested_occasions(),
            styles: request.requested_styles(),
            gender: request.gender_filter(),
            color: request.color_filter(),
            category: request.category_filter(),
            budget: request.budget,
        }
    }

    /// `None` when a hard filter rejects the product
    fn rank(&self, product: &Product) -> Option<MatchRank> {
        if !product.is_apparel() {
            return None;
        }

        if let Some(gender) = &self.gender {
            if !product.is_unisex() && !product.gender.eq_ignore_ascii_case(gender) {
                return None;
            }
        }

        // A full outfit is bounded on its total, so only items that alone blow
        // the budget are excluded; a single item must fit by itself. Both
        // reduce to the same per-item check.
        if let Some(budget) = self.budget {
            if product.price > budget {
                return None;
            }
        }

        if self.mode == Mode::SingleItem {
            if let Some(category) = &self.category {
                if !product.category.eq_ignore_ascii_case(category) {
                    return None;
                }
            }
        }

        let product_color = product.color.to_lowercase();
        let exact_color = match &self.color {
            Some(color) if !product_color.contains(color.as_str()) => return None,
            Some(color) => product_color == *color,
            None => true,
        };

        let occasion_hits = self.occasions.iter().filter(|t| product.has_occasion(t)).count();
        if !self.occasions.is_empty() && occasion_hits == 0 {
            return None;
        }

        let style_hits = self.styles.iter().filter(|t| product.has_style(t)).count();
        if !self.styles.is_empty() && style_hits == 0 {
            return None;
        }

        let exact = exact_color
            && occasion_hits == self.occasions.len()
            && style_hits == self.styles.len();

        Some(if exact {
            MatchRank::Exact
        } else {
            MatchRank::Partial
        })
    }
}
