//! Tests for config module

#[cfg(test)]
mod tests {
    use crate::config::*;
    use crate::MetricType;
    use std::io::Write;

    // ========================================================================
    // Default tests
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = SegmentConfig::default();

        // Assert
        assert_eq!(config.column.chunk_rows, 32_768);
        assert_eq!(config.sealed.timestamp_slice_rows, 8_192);
        assert!(!config.growing_index.enabled);
        assert_eq!(config.growing_index.kind, "brute_force");
        assert_eq!(config.growing_index.metric, MetricType::L2);
        assert_eq!(config.limits.max_topk, 16_384);
        assert_eq!(config.limits.max_queries, 16_384);
    }

    // ========================================================================
    // TOML parsing tests
    // ========================================================================

    #[test]
    fn test_config_from_toml_minimal() {
        // Arrange
        let toml = r#"
[column]
chunk_rows = 1024
"#;

        // Act
        let config = SegmentConfig::from_toml(toml).expect("parse");

        // Assert
        assert_eq!(config.column.chunk_rows, 1024);
        // Other values should be defaults
        assert_eq!(config.sealed.timestamp_slice_rows, 8_192);
        assert!(!config.growing_index.enabled);
    }

    #[test]
    fn test_config_from_toml_full() {
        // Arrange
        let toml = r#"
[column]
chunk_rows = 4096

[sealed]
timestamp_slice_rows = 2048

[growing_index]
enabled = true
kind = "brute_force"
metric = "ip"

[limits]
max_topk = 1000
max_queries = 64
"#;

        // Act
        let config = SegmentConfig::from_toml(toml).expect("parse");

        // Assert
        assert_eq!(config.column.chunk_rows, 4096);
        assert_eq!(config.sealed.timestamp_slice_rows, 2048);
        assert!(config.growing_index.enabled);
        assert_eq!(config.limits.max_topk, 1000);
        assert_eq!(config.limits.max_queries, 64);
    }

    #[test]
    fn test_config_from_toml_invalid_type() {
        // Arrange
        let toml = r#"
[column]
chunk_rows = "lots"
"#;

        // Act
        let result = SegmentConfig::from_toml(toml);

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[column]\nchunk_rows = 128").expect("write");

        // Act
        let config = SegmentConfig::load_from_path(file.path()).expect("load");

        // Assert
        assert_eq!(config.column.chunk_rows, 128);
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        // Arrange & Act
        let config = SegmentConfig::load_from_path("does_not_exist.toml").expect("load");

        // Assert
        assert_eq!(config.column.chunk_rows, 32_768);
    }

    // ========================================================================
    // Validation tests
    // ========================================================================

    #[test]
    fn test_config_validate_success() {
        // Arrange
        let config = SegmentConfig::default();

        // Act
        let result = config.validate();

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_validate_chunk_rows_too_low() {
        // Arrange
        let mut config = SegmentConfig::default();
        config.column.chunk_rows = 8;

        // Act
        let result = config.validate();

        // Assert
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("column.chunk_rows"));
    }

    #[test]
    fn test_config_validate_zero_topk() {
        // Arrange
        let mut config = SegmentConfig::default();
        config.limits.max_topk = 0;

        // Act
        let result = config.validate();

        // Assert
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("limits.max_topk"));
    }

    #[test]
    fn test_config_validate_empty_index_kind() {
        // Arrange
        let mut config = SegmentConfig::default();
        config.growing_index.kind = String::new();

        // Act
        let result = config.validate();

        // Assert
        assert!(result.is_err());
    }

    // ========================================================================
    // Round-trip tests
    // ========================================================================

    #[test]
    fn test_config_toml_round_trip() {
        // Arrange
        let mut config = SegmentConfig::default();
        config.column.chunk_rows = 512;
        config.growing_index.enabled = true;

        // Act
        let toml = config.to_toml().expect("serialize");
        let parsed = SegmentConfig::from_toml(&toml).expect("parse");

        // Assert
        assert_eq!(parsed.column.chunk_rows, 512);
        assert!(parsed.growing_index.enabled);
    }
}
