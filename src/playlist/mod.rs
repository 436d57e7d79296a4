mod reference;

pub use reference::{BaseContext, MediaRef, RefKind, scan};

use crate::error::ApiError;
use crate::signer::UrlSigner;
use futures::StreamExt as _;
use futures::TryStreamExt as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on in-flight signing work for one document, so a
/// pathological playlist cannot fan out without limit.
const MAX_SIGN_FANOUT: usize = 256;

/// Per-request rewrite parameters derived from the inbound request.
pub struct RewriteContext {
    pub base: BaseContext,
    /// Reconstructed signing parameters (no leading `?`), appended to every
    /// manifest reference. Empty when the caller forwarded none.
    pub forwarded_params: String,
    pub segment_ttl: Duration,
    pub sign_manifests: bool,
}

/// Rewrites playlist documents so every reference they contain is servable
/// through the delivery host: segments signed, manifests query-augmented.
pub struct PlaylistRewriter {
    signer: Arc<dyn UrlSigner>,
}

enum Replacement {
    Sign(String),
    Plain(String),
}

impl PlaylistRewriter {
    pub fn new(signer: Arc<dyn UrlSigner>) -> Self {
        PlaylistRewriter { signer }
    }

    /// Rewrite every media reference in `body`.
    ///
    /// Three passes: collect matches in document order, compute each
    /// replacement (signing fans out onto the blocking pool, bounded, with
    /// the match index as the correlation key), then splice the results
    /// back between the untouched spans. One failed signing call fails the
    /// whole document; a partial playlist is never produced.
    pub async fn rewrite(&self, body: &str, ctx: &RewriteContext) -> Result<String, ApiError> {
        let refs = scan(body);
        if refs.is_empty() {
            return Ok(body.to_string());
        }
        debug!(matches = refs.len(), "Rewriting playlist references");

        let resource = format!("{}://{}/*", ctx.base.protocol, ctx.base.host);

        let plans: Vec<Replacement> = refs
            .iter()
            .map(|media_ref| {
                let target = media_ref.absolute_target(&ctx.base);
                if media_ref.kind == RefKind::Segment || ctx.sign_manifests {
                    Replacement::Sign(target)
                } else {
                    Replacement::Plain(append_params(&target, &ctx.forwarded_params))
                }
            })
            .collect();

        let replacements: Vec<String> = futures::stream::iter(plans.into_iter().map(|plan| {
            let signer = Arc::clone(&self.signer);
            let resource = resource.clone();
            let ttl = ctx.segment_ttl;

            async move {
                match plan {
                    Replacement::Plain(text) => Ok(text),
                    Replacement::Sign(url) => {
                        let signed = tokio::task::spawn_blocking(move || {
                            signer.sign(&url, ttl, Some(&resource))
                        })
                        .await
                        .map_err(|err| ApiError::Upstream(format!("signing task failed: {err}")))??;
                        Ok::<String, ApiError>(signed)
                    }
                }
            }
        }))
        .buffered(MAX_SIGN_FANOUT)
        .try_collect()
        .await?;

        Ok(splice(body, &refs, &replacements))
    }
}

/// Join `params` onto `target`, picking the separator by whether the target
/// already carries a query string.
fn append_params(target: &str, params: &str) -> String {
    if params.is_empty() {
        return target.to_string();
    }
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}{params}")
}

fn splice(body: &str, refs: &[MediaRef], replacements: &[String]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;

    for (media_ref, replacement) in refs.iter().zip(replacements) {
        out.push_str(&body[cursor..media_ref.span.start]);
        out.push_str(replacement);
        cursor = media_ref.span.end;
    }
    out.push_str(&body[cursor..]);
    out
}
