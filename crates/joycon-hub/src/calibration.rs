//! Turns raw 12-bit stick values into calibrated [-1, 1] coordinates.

use cgmath::{vec2, InnerSpace, Vector2, Zero};
use joycon_wire::spi::{AxisCalibration, StickCalibration};

/// Scales one axis against its calibrated neutral point and travel. The two
/// half-ranges are scaled independently: real sticks are not centered.
fn normalize_axis(calib: &AxisCalibration, raw: u16) -> f64 {
    if raw >= calib.center {
        let travel = calib.max.saturating_sub(calib.center).max(1);
        (f64::from(raw - calib.center) / f64::from(travel)).min(1.0)
    } else {
        let travel = calib.center.saturating_sub(calib.min).max(1);
        -(f64::from(calib.center - raw) / f64::from(travel)).min(1.0)
    }
}

/// Applies calibration and a radial deadzone. Inside the deadzone the stick
/// reads as exactly zero; outside, the remaining range is rescaled so the
/// output still reaches magnitude 1.
pub fn normalize_stick(
    calib: &StickCalibration,
    raw_x: u16,
    raw_y: u16,
    deadzone: f64,
) -> Vector2<f64> {
    let v = vec2(
        normalize_axis(&calib.x, raw_x),
        normalize_axis(&calib.y, raw_y),
    );
    if deadzone <= 0.0 {
        return v;
    }
    let magnitude = v.magnitude();
    if magnitude < deadzone {
        Vector2::zero()
    } else {
        let scale = ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0);
        v / magnitude * scale
    }
}
