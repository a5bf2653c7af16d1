// src/tracking/geometry.rs
//
// Box representation helpers shared by the filter, the association engine
// and the approach heuristic. Pure functions, no state.
//
// Corner form:  [x1, y1, x2, y2] in pixels
// Center form:  [cx, cy, s, r] where s = w*h (area) and r = w/h

/// Smallest width/height a box is allowed to have in any transform.
pub const MIN_SIDE_PX: f32 = 1.0;

/// Floor applied to area and aspect ratio before recovering the width.
pub const MIN_SCALE: f32 = 1e-3;

/// Largest absolute pixel coordinate accepted from a detector.
pub const MAX_COORD_PX: f32 = 1e5;

const IOU_EPS: f32 = 1e-6;

pub type BBox = [f32; 4];

/// Corner form → center form. Inverted or empty boxes are clamped to 1px sides.
pub fn to_center_form(b: &BBox) -> [f32; 4] {
    let w = (b[2] - b[0]).max(MIN_SIDE_PX);
    let h = (b[3] - b[1]).max(MIN_SIDE_PX);
    [b[0] + w / 2.0, b[1] + h / 2.0, w * h, w / h]
}

/// Center form → corner form. Only the first four components are read, so a
/// full filter state can be passed directly.
pub fn to_corner_form(x: &[f32]) -> BBox {
    let (cx, cy) = (x[0], x[1]);
    let s = x[2].max(MIN_SCALE);
    let r = x[3].max(MIN_SCALE);
    let w = (s * r).sqrt();
    let h = s / w;
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Area with the same 1px side floor used by `to_center_form`.
pub fn box_area(b: &BBox) -> f32 {
    (b[2] - b[0]).max(MIN_SIDE_PX) * (b[3] - b[1]).max(MIN_SIDE_PX)
}

pub fn is_finite_box(b: &BBox) -> bool {
    b.iter().all(|v| v.is_finite())
}

/// Finite, within `MAX_COORD_PX` on every coordinate, and with a finite area.
pub fn is_bounded_box(b: &BBox) -> bool {
    is_finite_box(b) && b.iter().all(|v| v.abs() <= MAX_COORD_PX) && box_area(b).is_finite()
}

/// Intersection over union in [0, 1].
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = ((a[2] - a[0]) * (a[3] - a[1])).max(0.0);
    let area_b = ((b[2] - b[0]) * (b[3] - b[1])).max(0.0);
    let ratio = inter / (area_a + area_b - inter + IOU_EPS);
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
