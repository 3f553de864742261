use crate::{
    models::{Mode, Role, UserRequest},
    services::{candidates::CandidateSet, validator::ValidationError},
};

/// Rendered prompt for one model attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    /// 1-based attempt number within the recommendation cycle
    pub attempt: u32,
}

/// Renders the grounding prompt
///
/// Only the candidate set is described to the model, reduced to the fields
/// it needs to choose (no image URLs, links or descriptions). The output
/// schema is restated on every attempt; from the second attempt on, the
/// previous validation failure is appended as corrective feedback.
pub fn compose(
    request: &UserRequest,
    candidates: &CandidateSet<'_>,
    attempt: u32,
    feedback: Option<&ValidationError>,
) -> Prompt {
    let mut text = String::new();

    text.push_str(
        "You are a fashion style advisor. Propose a styling for the user using ONLY \
         products from the candidate list below. Never invent products and never \
         reference an id that is not listed.\n\n",
    );

    text.push_str("## User request\n");
    text.push_str(&render_request(request));

    text.push_str("\n## Candidate products\n");
    for product in candidates.iter() {
        let role = product.role().map(|r| r.as_str()).unwrap_or("unspecified");
        let usage = product
            .usage_type
            .as_deref()
            .map(|usage| format!(" | usage: {}", usage))
            .unwrap_or_default();
        text.push_str(&format!(
            "- id: {} | name: {} | category: {} | role: {} | color: {} | price: {} {}{} | occasions: {} | styles: {}\n",
            product.id,
            product.display_name(),
            product.category,
            role,
            product.color,
            product.price,
            product.currency,
            usage,
            join_or_none(&product.occasion_tags),
            join_or_none(&product.style_tags),
        ));
    }

    text.push_str("\n## Task\n");
    text.push_str(&render_task(request));

    text.push_str("\n## Response format\n");
    text.push_str(&render_schema(request, candidates));

    if let Some(error) = feedback {
        text.push_str("\n## Your previous answer was rejected\n");
        text.push_str(&error.corrective_feedback());
        text.push_str("\nFix this problem and answer again with the full JSON object.\n");
    }

    Prompt { text, attempt }
}

fn render_request(request: &UserRequest) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: Option<&str>| {
        out.push_str(&format!("- {}: {}\n", label, value.unwrap_or("not specified")));
    };

    let mode = match request.mode {
        Mode::SingleItem => "single item",
        Mode::FullOutfit => "full outfit",
    };
    let budget = request.budget.map(|b| b.to_string());

    line("Mode", Some(mode));
    line("Occasion", request.occasion.as_deref());
    line("Style", request.style.as_deref());
    line("Budget", budget.as_deref());
    line("Gender", request.gender.as_deref());
    line("Color", request.color.as_deref());
    if request.mode == Mode::SingleItem {
        line("Clothing type", request.category.as_deref());
    }
    line("Additional keywords", request.keywords.as_deref());

    let occasion_tags = join_or_none(&request.occasion_tags);
    let style_tags = join_or_none(&request.style_tags);
    line("Preferred occasion tags", Some(occasion_tags.as_str()));
    line("Preferred style tags", Some(style_tags.as_str()));

    out
}

fn render_task(request: &UserRequest) -> String {
    match (request.mode, request.budget) {
        (Mode::FullOutfit, Some(budget)) => format!(
            "Compose one complete outfit. Pick exactly one product for each of the roles {} \
             and optionally at most one for each of {}. Use each product at most once and \
             only in the role listed for it. The TOTAL price of all picked products MUST NOT \
             EXCEED {}. Explain why the pieces work together.\n",
            role_list(&Role::REQUIRED),
            role_list(&Role::OPTIONAL),
            budget,
        ),
        (Mode::FullOutfit, None) => format!(
            "Compose one complete outfit with exactly one product for each of the roles {}.\n",
            role_list(&Role::REQUIRED),
        ),
        (Mode::SingleItem, Some(budget)) => format!(
            "Pick exactly one product that best fits the request; it must cost at most {}. \
             Explain why it fits.\n",
            budget
        ),
        (Mode::SingleItem, None) => {
            "Pick exactly one product that best fits the request. Explain why it fits.\n"
                .to_string()
        }
    }
}

fn render_schema(request: &UserRequest, candidates: &CandidateSet<'_>) -> String {
    let allowed: Vec<&str> = candidates.iter().map(|p| p.id.as_str()).collect();
    let role_rule = match request.mode {
        Mode::FullOutfit => format!(
            "\"role\" is REQUIRED on every item and must be one of: {}.",
            role_list(&[Role::REQUIRED.as_slice(), Role::OPTIONAL.as_slice()].concat())
        ),
        Mode::SingleItem => "\"role\" may be omitted.".to_string(),
    };

    format!(
        "Answer with a single JSON object and nothing else:\n\
         {{\n  \"explanation\": \"<why this styling works>\",\n  \"items\": [\n    \
         {{ \"product_id\": \"<id from the candidate list>\", \"role\": \"<role>\" }}\n  ]\n}}\n\
         Rules:\n\
         - \"explanation\" is a non-empty string.\n\
         - \"product_id\" must be copied exactly from this list: {}.\n\
         - {}\n",
        allowed.join(", "),
        role_rule,
    )
}

fn role_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}
