use crate::context::Context;
use crate::registry::Status;
use crate::render;
use crate::scanner::Item;

/// What became of one analysis attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rate limiting is active; the item stays unseen.
    Deferred,
    Classified(Status),
    /// The attempt failed and the item is unseen again.
    Failed,
}

/// Classifies one newly discovered item.
///
/// Failures never escape: the registry entry is dropped so a later cycle
/// can try again.
pub async fn analyze(ctx: &Context, item: &Item) -> Outcome {
    if ctx.limiter.borrow().is_active() {
        tracing::debug!(id = %item.id, "rate limited, deferring analysis");
        return Outcome::Deferred;
    }

    tracing::debug!(id = %item.id, author = %item.author, "analyzing item");
    ctx.registry
        .borrow_mut()
        .set(item.id.clone(), Status::Checking);
    render::reconcile(&ctx.page, &ctx.flags, Some(Status::Checking), &item.element);

    match ctx
        .api
        .fetch_likers(&item.id, &ctx.credentials, &ctx.limiter)
        .await
    {
        Ok(likers) => {
            let status = if likers.iter().any(|handle| *handle == item.author) {
                tracing::info!(id = %item.id, author = %item.author, "author liked their own post");
                Status::SelfLiked
            } else {
                Status::NotSelfLiked
            };
            ctx.registry.borrow_mut().set(item.id.clone(), status);
            ctx.backoff.borrow_mut().clear(&item.id);
            render::reconcile(&ctx.page, &ctx.flags, Some(status), &item.element);
            Outcome::Classified(status)
        }
        Err(err) => {
            ctx.registry.borrow_mut().remove(&item.id);
            ctx.backoff
                .borrow_mut()
                .record_failure(item.id.clone(), ctx.now());
            render::reconcile(&ctx.page, &ctx.flags, None, &item.element);
            tracing::warn!(id = %item.id, error = %err, "analysis failed");
            Outcome::Failed
        }
    }
}
