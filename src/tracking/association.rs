// src/tracking/association.rs
//
// Frame-to-frame association of detections to predicted track boxes.
//
// Cost = 1 − IoU, solved globally with the Hungarian method, then gated: a
// proposed pair below the IoU threshold is split back into one unmatched
// track and one unmatched detection. Empty inputs never reach the solver.

use nalgebra::DMatrix;
use tracing::trace;

use super::assignment;
use super::geometry::{iou, BBox};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// (track index, detection index)
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

pub fn iou_cost_matrix(predicted: &[BBox], detections: &[BBox]) -> DMatrix<f32> {
    DMatrix::from_fn(predicted.len(), detections.len(), |i, j| {
        let cost = 1.0 - iou(&predicted[i], &detections[j]);
        if cost.is_finite() {
            cost
        } else {
            1.0
        }
    })
}

/// Associate `detections` with `predicted` track boxes.
pub fn associate(predicted: &[BBox], detections: &[BBox], iou_threshold: f32) -> Association {
    let (m, n) = (predicted.len(), detections.len());
    if m == 0 || n == 0 {
        return Association {
            matches: Vec::new(),
            unmatched_tracks: (0..m).collect(),
            unmatched_detections: (0..n).collect(),
        };
    }

    let cost = iou_cost_matrix(predicted, detections);
    let mut track_matched = vec![false; m];
    let mut det_matched = vec![false; n];
    let mut matches = Vec::with_capacity(m.min(n));

    for (ti, di) in assignment::solve(&cost) {
        let overlap = 1.0 - cost[(ti, di)];
        if overlap < iou_threshold {
            trace!(
                "Rejected pair track#{} ↔ det#{} (IoU {:.3} < {:.2})",
                ti,
                di,
                overlap,
                iou_threshold
            );
            continue;
        }
        track_matched[ti] = true;
        det_matched[di] = true;
        matches.push((ti, di));
    }

    Association {
        matches,
        unmatched_tracks: (0..m).filter(|&i| !track_matched[i]).collect(),
        unmatched_detections: (0..n).filter(|&j| !det_matched[j]).collect(),
    }
}
