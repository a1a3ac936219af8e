use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use rig::completion::{CompletionError, CompletionModel, CompletionRequest, CompletionResponse};
use tracing::{Instrument, debug_span, info_span};

/// A completion model that waits for its limiter before every request
#[derive(Clone)]
pub struct RateLimitedCompletionModel<M: CompletionModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedCompletionModel<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: CompletionModel> CompletionModel for RateLimitedCompletionModel<M> {
    type Response = M::Response;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        self.model
            .completion(completion_request)
            .instrument(info_span!("completion"))
            .await
    }
}
