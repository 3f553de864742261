use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    catalog::{Catalog, CatalogHandle},
    error::RecommendError,
    models::{Product, Role, StyleProposal, UserRequest},
    services::{
        candidates::{select_candidates, DEFAULT_MAX_CANDIDATES},
        prompt::{compose, Prompt},
        providers::{GenerationConfig, GenerativeModel, ModelError},
        validator::{validate, ValidationError},
    },
};

/// Explicit engine configuration; see `Config::engine_settings`
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_candidates: usize,
    /// Prompt/validate rounds before giving up
    pub max_attempts: u32,
    /// Transport tries per round
    pub model_call_attempts: u32,
    pub model_timeout: Duration,
    /// First backoff delay; doubles on every further transport failure
    pub backoff: Duration,
    pub generation: GenerationConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_attempts: 3,
            model_call_attempts: 3,
            model_timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(500),
            generation: GenerationConfig::default(),
        }
    }
}

/// Where a recommendation cycle currently is
///
/// Each state owns the data the next transition needs, so the loop below
/// cannot reach a state without its inputs.
#[derive(Debug)]
enum CycleState {
    Composing {
        attempt: u32,
        feedback: Option<ValidationError>,
    },
    AwaitingModel {
        prompt: Prompt,
    },
    Validating {
        attempt: u32,
        raw: String,
    },
    Succeeded {
        attempt: u32,
        proposal: StyleProposal,
    },
    Retrying {
        attempt: u32,
        error: ValidationError,
    },
    Failed(RecommendError),
}

impl CycleState {
    fn name(&self) -> &'static str {
        match self {
            CycleState::Composing { .. } => "composing",
            CycleState::AwaitingModel { .. } => "awaiting_model",
            CycleState::Validating { .. } => "validating",
            CycleState::Succeeded { .. } => "succeeded",
            CycleState::Retrying { .. } => "retrying",
            CycleState::Failed(_) => "failed",
        }
    }
}

/// A validated proposal together with the snapshot its ids resolve against
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub proposal: StyleProposal,
    pub attempts: u32,
    pub generated_at: DateTime<Utc>,
    snapshot: Arc<Catalog>,
}

impl Recommendation {
    /// Proposal items resolved to catalog products, in proposal order
    pub fn items(&self) -> impl Iterator<Item = (Option<Role>, &Product)> + '_ {
        self.proposal.items.iter().filter_map(move |item| {
            self.snapshot
                .lookup(item.product_id.as_str())
                .map(|product| (item.role, product))
        })
    }

    /// Currency of the recommended products
    pub fn currency(&self) -> Option<&str> {
        self.items().next().map(|(_, p)| p.currency.as_str())
    }
}

/// Runs select → compose → generate → validate, retrying with feedback
pub struct RecommendationEngine {
    catalog: CatalogHandle,
    model: Arc<dyn GenerativeModel>,
    settings: EngineSettings,
}

impl RecommendationEngine {
    pub fn new(
        catalog: CatalogHandle,
        model: Arc<dyn GenerativeModel>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            model,
            settings,
        }
    }

    pub async fn recommend(&self, request: &UserRequest) -> Result<Recommendation, RecommendError> {
        self.recommend_until(request, std::future::pending()).await
    }

    /// Like `recommend`, but gives up with `Cancelled` as soon as `cancel` completes
    ///
    /// Cancellation is observed while waiting on the model or backing off;
    /// nothing is written anywhere, so aborting leaves no trace.
    pub async fn recommend_until<F>(
        &self,
        request: &UserRequest,
        cancel: F,
    ) -> Result<Recommendation, RecommendError>
    where
        F: Future<Output = ()>,
    {
        request.validate().map_err(RecommendError::InvalidRequest)?;

        let snapshot = self.catalog.snapshot().await;
        let candidates = select_candidates(request, &snapshot, self.settings.max_candidates)?;

        tracing::info!(
            mode = ?request.mode,
            candidates = candidates.len(),
            model = self.model.name(),
            "Starting recommendation cycle"
        );

        tokio::pin!(cancel);
        let max_attempts = self.settings.max_attempts.max(1);

        let mut state = CycleState::Composing {
            attempt: 1,
            feedback: None,
        };

        loop {
            let from = state.name();

            state = match state {
                CycleState::Composing { attempt, feedback } => {
                    let prompt = compose(request, &candidates, attempt, feedback.as_ref());
                    CycleState::AwaitingModel { prompt }
                }
                CycleState::AwaitingModel { prompt } => {
                    match self.call_model(&prompt, &mut cancel).await {
                        Ok(raw) => CycleState::Validating {
                            attempt: prompt.attempt,
                            raw,
                        },
                        Err(err) => CycleState::Failed(err),
                    }
                }
                CycleState::Validating { attempt, raw } => {
                    match validate(&raw, &candidates, request) {
                        Ok(proposal) => CycleState::Succeeded { attempt, proposal },
                        Err(error) => {
                            tracing::warn!(
                                attempt,
                                kind = error.kind(),
                                error = %error,
                                "Model answer rejected"
                            );
                            CycleState::Retrying { attempt, error }
                        }
                    }
                }
                CycleState::Retrying { attempt, error } if attempt >= max_attempts => {
                    CycleState::Failed(RecommendError::RecommendationFailed {
                        attempts: attempt,
                        last_error: error,
                    })
                }
                CycleState::Retrying { attempt, error } => CycleState::Composing {
                    attempt: attempt + 1,
                    feedback: Some(error),
                },
                CycleState::Succeeded { attempt, proposal } => {
                    tracing::info!(
                        attempts = attempt,
                        items = proposal.items.len(),
                        total_price = %proposal.total_price,
                        "Recommendation accepted"
                    );
                    return Ok(Recommendation {
                        proposal,
                        attempts: attempt,
                        generated_at: Utc::now(),
                        snapshot,
                    });
                }
                CycleState::Failed(err) => {
                    tracing::warn!(kind = err.kind(), error = %err, "Recommendation failed");
                    return Err(err);
                }
            };

            tracing::debug!(from, to = state.name(), "Cycle transition");
        }
    }

    /// One model round: retries transport failures and timeouts with backoff
    async fn call_model<F>(
        &self,
        prompt: &Prompt,
        cancel: &mut Pin<&mut F>,
    ) -> Result<String, RecommendError>
    where
        F: Future<Output = ()>,
    {
        let attempts = self.settings.model_call_attempts.max(1);
        let mut last_error = String::new();

        for call in 1..=attempts {
            let outcome = tokio::select! {
                _ = cancel.as_mut() => {
                    tracing::info!(attempt = prompt.attempt, "Recommendation cancelled");
                    return Err(RecommendError::Cancelled);
                }
                outcome = tokio::time::timeout(
                    self.settings.model_timeout,
                    self.model.generate(prompt, &self.settings.generation),
                ) => outcome,
            };

            let error = match outcome {
                Ok(Ok(raw)) => return Ok(raw),
                Ok(Err(error)) => error,
                Err(_) => ModelError::Timeout(self.settings.model_timeout),
            };

            tracing::warn!(
                call,
                max_calls = attempts,
                error = %error,
                "Model call failed"
            );
            last_error = error.to_string();

            if call < attempts {
                let delay = self.settings.backoff.saturating_mul(1 << (call - 1).min(16));
                tokio::select! {
                    _ = cancel.as_mut() => return Err(RecommendError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(RecommendError::ModelUnavailable {
            attempts,
            reason: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::fixtures::product,
        services::providers::MockGenerativeModel,
    };
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            backoff: Duration::ZERO,
            model_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        }
    }

    fn outfit_catalog() -> CatalogHandle {
        let mut work = product("top-60", "Tshirts", "60");
        work.occasion_tags = vec!["work".to_string()];
        CatalogHandle::new(
            Catalog::from_products(vec![
                work,
                product("jeans-70", "Jeans", "70"),
                product("jeans-50", "Jeans", "50"),
                product("shoes-30", "Casual Shoes", "30"),
            ])
            .unwrap(),
        )
    }

    fn outfit_json(top: &str, bottom: &str, shoes: &str) -> String {
        serde_json::json!({
            "explanation": "Clean lines for the office.",
            "items": [
                { "product_id": top, "role": "top" },
                { "product_id": bottom, "role": "bottom" },
                { "product_id": shoes, "role": "footwear" }
            ]
        })
        .to_string()
    }

    fn engine(model: MockGenerativeModel, settings: EngineSettings) -> RecommendationEngine {
        RecommendationEngine::new(outfit_catalog(), Arc::new(model), settings)
    }

    #[tokio::test]
    async fn test_budget_feedback_repairs_outfit_on_retry() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_generate()
            .withf(|prompt, _| prompt.attempt == 1)
            .times(1)
            .returning(|_, _| Ok(outfit_json("top-60", "jeans-70", "shoes-30")));
        model
            .expect_generate()
            .withf(|prompt, _| {
                prompt.attempt == 2 && prompt.text.contains("over the budget of 150")
            })
            .times(1)
            .returning(|_, _| Ok(outfit_json("top-60", "jeans-50", "shoes-30")));

        let engine = engine(model, settings());
        let recommendation = engine
            .recommend(&UserRequest::full_outfit(dec("150")))
            .await
            .unwrap();

        assert_eq!(recommendation.attempts, 2);
        assert_eq!(recommendation.proposal.total_price, dec("140"));
        let ids: Vec<&str> = recommendation.items().map(|(_, p)| p.id.as_str()).collect();
        assert_eq!(ids, vec!["top-60", "jeans-50", "shoes-30"]);
        assert_eq!(recommendation.currency(), Some("PLN"));
    }

    #[tokio::test]
    async fn test_retry_loop_stops_at_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model.expect_generate().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("not json at all".to_string())
        });

        let engine = engine(model, settings());
        let err = engine
            .recommend(&UserRequest::full_outfit(dec("150")))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            RecommendError::RecommendationFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.kind(), "schema");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failures_exhaust_into_model_unavailable() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_generate()
            .times(3)
            .returning(|_, _| Err(ModelError::Http("connection reset".to_string())));

        let engine = engine(model, settings());
        let err = engine
            .recommend(&UserRequest::full_outfit(dec("150")))
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::ModelUnavailable { attempts: 3, .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        let mut sequence = mockall::Sequence::new();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| {
                Err(ModelError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                })
            });
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok(outfit_json("top-60", "jeans-50", "shoes-30")));

        let engine = engine(model, settings());
        let recommendation = assert_ok!(
            engine
                .recommend(&UserRequest::full_outfit(dec("150")))
                .await
        );
        // Transport retries do not consume validation attempts
        assert_eq!(recommendation.attempts, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_model() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model.expect_generate().never();

        let engine = engine(model, settings());
        let mut request = UserRequest::full_outfit(dec("150"));
        request.budget = None;

        let err = assert_err!(engine.recommend(&request).await);
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_no_candidates_never_reaches_model() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model.expect_generate().never();

        let engine = engine(model, settings());
        let request = UserRequest::single_item().with_occasion("wedding");

        let err = engine.recommend(&request).await.unwrap_err();
        assert!(matches!(err, RecommendError::NoCandidates(_)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_during_backoff() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(ModelError::Http("down".to_string())));

        let engine = engine(
            model,
            EngineSettings {
                backoff: Duration::from_secs(60),
                ..settings()
            },
        );

        // Fires while the engine sleeps before its second call
        let cancel = tokio::time::sleep(Duration::from_millis(50));

        let err = engine
            .recommend_until(&UserRequest::full_outfit(dec("150")), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::Cancelled));
    }

    #[tokio::test]
    async fn test_outfit_missing_a_role_never_reaches_model() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model.expect_generate().never();

        let catalog = CatalogHandle::new(
            Catalog::from_products(vec![
                product("top-60", "Tshirts", "60"),
                product("jeans-40", "Jeans", "40"),
            ])
            .unwrap(),
        );
        let engine = RecommendationEngine::new(catalog, Arc::new(model), settings());

        let err = engine
            .recommend(&UserRequest::full_outfit(dec("100")))
            .await
            .unwrap_err();

        match err {
            RecommendError::NoCandidates(err) => {
                assert_eq!(err.missing_roles, vec![Role::Footwear])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Never answers within the test's lifetime
    struct StalledModel;

    #[async_trait::async_trait]
    impl GenerativeModel for StalledModel {
        async fn generate(
            &self,
            _prompt: &Prompt,
            _config: &GenerationConfig,
        ) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_model_call() {
        let engine = RecommendationEngine::new(outfit_catalog(), Arc::new(StalledModel), settings());

        let started = std::time::Instant::now();
        let err = engine
            .recommend_until(
                &UserRequest::full_outfit(dec("150")),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::Cancelled));
        // Well before both the stalled call and the 5s model timeout
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_single_item_work_request() {
        let mut model = MockGenerativeModel::new();
        model.expect_name().return_const("mock");
        model
            .expect_generate()
            .withf(|prompt, config| {
                config.structured_output
                    && prompt.text.contains("id: top-60")
                    && !prompt.text.contains("id: jeans-50")
            })
            .returning(|_, _| {
                Ok(r#"{"explanation": "Crisp tee for the office.", "items": [{"product_id": "top-60"}]}"#
                    .to_string())
            });

        let engine = engine(model, settings());
        let request = UserRequest::single_item()
            .with_occasion("work")
            .with_category("Tshirts")
            .with_budget(dec("100"));

        let recommendation = engine.recommend(&request).await.unwrap();
        assert_eq!(recommendation.proposal.items.len(), 1);
        assert_eq!(recommendation.proposal.total_price, dec("60"));
    }
}
