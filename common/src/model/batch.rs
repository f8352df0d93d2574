use serde::{Deserialize, Serialize};

/// Options a client sends alongside the images of one batch.
///
/// Lengths are in millimetres and converted to device pixels with `dpi`
/// on the server. None of the geometry values has a built-in default:
/// different print jobs use different page sizes, diameters and margins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSettings {
    /// Device pixels per inch.
    #[serde(alias = "dpiOrEquivalentScale")]
    pub dpi: f64,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    /// Diameter of the outer edge of the circle, border included.
    pub outer_diameter_mm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_thickness_mm: Option<f64>,
    /// White gap between the border and the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_margin_mm: Option<f64>,
    /// Maximum number of images processed at the same time.
    ///
    /// Unsigned, so a negative value is already a deserialization error and
    /// never reaches the pool. Zero parses and is rejected as an invalid limit.
    pub concurrency_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_payload_with_optional_fields_missing() {
        let json = r#"{
            "dpiOrEquivalentScale": 600,
            "pageWidthMm": 210,
            "pageHeightMm": 297,
            "outerDiameterMm": 180,
            "concurrencyLimit": 4
        }"#;
        let settings: BatchSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.dpi, 600.0);
        assert_eq!(settings.outer_diameter_mm, 180.0);
        assert_eq!(settings.border_thickness_mm, None);
        assert_eq!(settings.inner_margin_mm, None);
        assert_eq!(settings.concurrency_limit, 4);
    }

    #[test]
    fn rejects_payload_without_concurrency_limit() {
        let json = r#"{"dpi":300,"pageWidthMm":100,"pageHeightMm":100,"outerDiameterMm":50}"#;
        assert!(serde_json::from_str::<BatchSettings>(json).is_err());
    }

    #[test]
    fn negative_concurrency_limit_does_not_parse() {
        let json = r#"{"dpi":300,"pageWidthMm":100,"pageHeightMm":100,"outerDiameterMm":50,"concurrencyLimit":-1}"#;
        assert!(serde_json::from_str::<BatchSettings>(json).is_err());
    }
}
