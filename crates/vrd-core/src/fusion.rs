//! Reciprocal Rank Fusion.
//!
//! ```text
//! RRF(d) = Σ 1 / (k + rank_i(d))
//! ```
//!
//! summed over the ranked lists that contain `d` (1-based ranks). A list that
//! does not contain `d` contributes nothing. Only ranks matter, so BM25 and
//! cosine scores never have to be calibrated against each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{VrdError, VrdResult};
use crate::index::{IndexKind, SearchResult};
use crate::report::ReportId;

/// Where a fused candidate was found, and how it ranked there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRank {
    pub source: IndexKind,
    pub rank: usize,
    pub score: f32,
}

/// A candidate after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedCandidate {
    pub report_id: ReportId,
    /// 1-based position in the fused list.
    pub fused_rank: usize,
    pub fused_score: f32,
    /// One entry per contributing list, in input order.
    pub provenance: Vec<SourceRank>,
}

impl FusedCandidate {
    pub fn rank_in(&self, source: IndexKind) -> Option<usize> {
        self.provenance
            .iter()
            .find(|p| p.source == source)
            .map(|p| p.rank)
    }

    pub fn score_in(&self, source: IndexKind) -> Option<f32> {
        self.provenance
            .iter()
            .find(|p| p.source == source)
            .map(|p| p.score)
    }
}

/// Fuse ranked lists with RRF.
///
/// Output is sorted by fused score descending, ties broken by report id
/// ascending, and contains exactly the union of the input ids. An id listed
/// twice in one list counts at its best rank.
///
/// # Errors
///
/// `InvalidConfiguration` when `k` is not a positive finite number.
pub fn fuse(lists: &[&[SearchResult]], k: f32) -> VrdResult<Vec<FusedCandidate>> {
    if !k.is_finite() || k <= 0.0 {
        return Err(VrdError::InvalidConfiguration {
            message: "retrieval.hybrid.rrfK must be positive for RRF fusion".to_string(),
            hint: "Set rrfK to a positive value (recommended: 60)".to_string(),
        });
    }

    let mut acc: BTreeMap<&ReportId, (f32, Vec<SourceRank>)> = BTreeMap::new();
    for list in lists {
        let mut best_in_list: BTreeMap<&ReportId, &SearchResult> = BTreeMap::new();
        for hit in list.iter() {
            best_in_list
                .entry(&hit.report_id)
                .and_modify(|current| {
                    if hit.rank < current.rank {
                        *current = hit;
                    }
                })
                .or_insert(hit);
        }

        for (id, hit) in best_in_list {
            let entry = acc.entry(id).or_insert_with(|| (0.0, Vec::new()));
            entry.0 += 1.0 / (k + hit.rank as f32);
            entry.1.push(SourceRank {
                source: hit.source,
                rank: hit.rank,
                score: hit.score,
            });
        }
    }

    let mut fused: Vec<(ReportId, f32, Vec<SourceRank>)> = acc
        .into_iter()
        .map(|(id, (score, provenance))| (id.clone(), score, provenance))
        .collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(fused
        .into_iter()
        .enumerate()
        .map(|(i, (report_id, fused_score, provenance))| FusedCandidate {
            report_id,
            fused_rank: i + 1,
            fused_score,
            provenance,
        })
        .collect())
}
