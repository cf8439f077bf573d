/// Zero a rate whose magnitude is below `threshold`; pass anything else through.
///
/// Applied per axis, never to the vector magnitude. NaN compares false and
/// passes through unchanged.
#[inline]
pub fn apply(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}
