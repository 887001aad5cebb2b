use crate::pipeline::types::Point;

/// Angle in degrees at vertex `b` between the arms `b -> a` and `b -> c`.
///
/// Always in [0, 180] and symmetric in `a` and `c`.
pub fn angle(a: Point, b: Point, c: Point) -> f64 {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let (cx, cy) = (c.x as f64, c.y as f64);

    let radians = (cy - by).atan2(cx - bx) - (ay - by).atan2(ax - bx);
    let degrees = radians.abs().to_degrees();

    let folded = if degrees > 180.0 {
        360.0 - degrees
    } else {
        degrees
    };
    folded.clamp(0.0, 180.0)
}

/// Knee drifts inward of both hip and ankle by more than `margin` (x axis).
pub fn knees_caving_in(hip: Point, knee: Point, ankle: Point, margin: f32) -> bool {
    knee.x < hip.x - margin && knee.x < ankle.x - margin
}
