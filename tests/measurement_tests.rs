//! # Measurement Parsing Tests
//!
//! Annotation detection and unit normalization over recognized text.

#[cfg(test)]
mod tests {
    use scale_calibrator::measurement::{find_measurement_in_text, LengthUnit, MeasurementParser};

    #[test]
    fn test_millimeters_with_space() {
        let m = find_measurement_in_text("4200 mm").unwrap();
        assert_eq!(m.value_in_meters, 4.2);
        assert_eq!(m.unit, LengthUnit::Millimeter);
        assert_eq!(m.display_text, "4200.0 mm");
    }

    #[test]
    fn test_comma_decimal_without_space() {
        let m = find_measurement_in_text("3,5m").unwrap();
        assert_eq!(m.value_in_meters, 3.5);
        assert_eq!(m.display_text, "3.5 m");
    }

    #[test]
    fn test_millimeters_without_space() {
        let m = find_measurement_in_text("1200mm").unwrap();
        assert_eq!(m.value_in_meters, 1.2);
    }

    #[test]
    fn test_centimeters() {
        let m = find_measurement_in_text("12cm").unwrap();
        assert_eq!(m.unit, LengthUnit::Centimeter);
        assert_eq!(m.value_in_meters, 0.12);
    }

    #[test]
    fn test_no_annotation() {
        assert!(find_measurement_in_text("hello world").is_none());
        assert!(find_measurement_in_text("").is_none());
        // Units are case-sensitive
        assert!(find_measurement_in_text("42 M").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let parser = MeasurementParser::new();
        let m = parser.parse("Room A 2 m, Room B 5 m").unwrap();
        assert_eq!(m.value_in_meters, 2.0);

        let found = parser.find_first("width: 300 cm then 2 m").unwrap();
        assert_eq!(found.numeral, "300");
        assert_eq!(found.start_pos, 7);
    }

    #[test]
    fn test_noisy_ocr_text() {
        let text = "FLOOR PLAN\nScale: 4.2 m\nkitchen 12";
        let m = find_measurement_in_text(text).unwrap();
        assert_eq!(m.value_in_meters, 4.2);
        assert_eq!(m.display_text, "4.2 m");
    }

    #[test]
    fn test_zero_is_found_but_unusable() {
        let m = find_measurement_in_text("0 m").unwrap();
        assert_eq!(m.value_in_meters, 0.0);
        assert!(!m.is_usable());
    }

    #[test]
    fn test_custom_pattern_requires_named_groups() {
        assert!(MeasurementParser::with_pattern(r"([0-9]+)\s*(m)").is_err());
        assert!(MeasurementParser::with_pattern(r"(?P<value>[0-9]+").is_err());

        let parser =
            MeasurementParser::with_pattern(r"scale\s*(?P<value>[0-9]+)\s*(?P<unit>cm)").unwrap();
        assert!(parser.parse("12 cm").is_none());
        assert_eq!(parser.parse("scale 250 cm").unwrap().value_in_meters, 2.5);
    }
}
