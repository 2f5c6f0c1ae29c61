//! Raw tick <-> millimeter conversion.
//!
//! The desk reports positions as tenths of a millimeter above its lowest
//! physical position and speeds as hundredths of a millimeter per second.
//! Absolute heights only make sense relative to the configured base height
//! (tabletop above ground at the lowest position).

/// Stateless conversion between raw desk units and millimeters.
#[derive(Debug, Clone, Copy)]
pub struct UnitConverter {
    base_height: i32,
}

impl UnitConverter {
    pub fn new(base_height: i32) -> Self {
        Self { base_height }
    }

    /// Absolute height in mm to raw ticks. Negative when the requested
    /// height lies below the base height.
    pub fn mm_to_raw(&self, mm: i32) -> i32 {
        (mm - self.base_height) * 10
    }

    /// Raw ticks to absolute height in mm.
    pub fn raw_to_mm(&self, raw: i32) -> f64 {
        f64::from(raw) / 10.0 + f64::from(self.base_height)
    }

    /// Raw speed value to mm/s.
    pub fn raw_to_speed(raw: i16) -> f64 {
        f64::from(raw) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_millimeter_positions() {
        let converter = UnitConverter::new(620);
        for raw in [0, 10, 50, 250, 6500] {
            let mm = converter.raw_to_mm(raw);
            assert_eq!(converter.mm_to_raw(mm as i32), raw);
        }
    }

    #[test]
    fn round_trip_error_stays_within_mm_rounding() {
        // Heights are whole millimeters, so a tick survives the round trip
        // only up to the 10-ticks-per-mm quantization.
        let converter = UnitConverter::new(620);
        for raw in [7, 255, 3333, 6499] {
            let mm = converter.raw_to_mm(raw).round() as i32;
            let back = converter.mm_to_raw(mm);
            assert!((back - raw).abs() <= 5);
        }
    }

    #[test]
    fn monotonic_in_raw() {
        let converter = UnitConverter::new(620);
        let mut last = f64::MIN;
        for raw in (0..=6500).step_by(130) {
            let mm = converter.raw_to_mm(raw);
            assert!(mm > last);
            last = mm;
        }
    }

    #[test]
    fn heights_below_base_go_negative() {
        let converter = UnitConverter::new(620);
        assert_eq!(converter.mm_to_raw(100), -5200);
        assert_eq!(converter.mm_to_raw(620), 0);
        assert_eq!(converter.mm_to_raw(1270), 6500);
    }

    #[test]
    fn speed_is_hundredths() {
        assert_eq!(UnitConverter::raw_to_speed(100), 1.0);
        assert_eq!(UnitConverter::raw_to_speed(-250), -2.5);
        assert_eq!(UnitConverter::raw_to_speed(0), 0.0);
    }
}
