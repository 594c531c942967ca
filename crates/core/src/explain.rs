use crate::domain::recommendation::Explanation;
use crate::error::Result;
use crate::similarity::SimilarityMatrix;
use std::collections::BTreeSet;

/// Similarity a holding must exceed to count as a reason for a recommendation.
pub const SIGNIFICANT_SIMILARITY: f64 = 0.7;

/// Held instruments whose similarity to `recommended_id` exceeds [`SIGNIFICANT_SIMILARITY`],
/// most similar first.
///
/// An empty result means no holding explains the recommendation. Held ids outside the universe
/// are skipped; an unknown `recommended_id` is an error.
pub fn explain<'a>(
    similarity: &SimilarityMatrix,
    recommended_id: &str,
    held_ids: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Explanation>> {
    let target = similarity.require_position(recommended_id)?;
    let held: BTreeSet<&str> = held_ids.into_iter().collect();

    let mut out = Vec::new();
    for held_id in held {
        let Some(pos) = similarity.index().position(held_id) else {
            tracing::debug!(%held_id, "held instrument not in universe; skipped");
            continue;
        };
        let value = similarity.at(pos, target);
        if value > SIGNIFICANT_SIMILARITY {
            out.push(Explanation {
                held_instrument_id: held_id.to_string(),
                similarity: value,
            });
        }
    }

    out.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.held_instrument_id.cmp(&b.held_instrument_id))
    });
    Ok(out)
}
