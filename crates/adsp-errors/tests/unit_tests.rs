//! Unit tests for all error variants.
//!
//! Tests Display implementations, classification and From conversions.

use adsp_errors::{
    AdspError, ErrorCategory, ErrorSeverity, Result, StreamError, ValidationError,
};

mod stream_error_tests {
    use super::*;

    fn all_variants() -> Vec<StreamError> {
        vec![
            StreamError::Duplicate(0x0100),
            StreamError::NotFound(0x0100),
            StreamError::illegal("pause", "Prepared"),
            StreamError::Busy {
                session: 0x0100,
                pending: "start",
            },
            StreamError::timeout(0x0100, "start", 1500),
            StreamError::peer_failure(0x0100, "start", 5),
            StreamError::aborted(0x0100, "drain"),
            StreamError::NotAttached(0x0100),
            StreamError::InsufficientSpace {
                session: 0x0100,
                free: 0,
            },
            StreamError::ResourceExhausted(64),
            StreamError::NotIdle {
                session: 0x0100,
                state: "Running",
            },
        ]
    }

    #[test]
    fn test_all_variants_display() -> Result<()> {
        for variant in all_variants() {
            assert!(!variant.to_string().is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_std_error_impl() -> Result<()> {
        let err = StreamError::NotFound(0x0901);
        let _: &dyn std::error::Error = &err;
        Ok(())
    }

    #[test]
    fn test_peer_failure_reports_code() -> Result<()> {
        let err = StreamError::peer_failure(0x0901, "stop", 17);
        let msg = err.to_string();
        assert!(msg.contains("0x0901"));
        assert!(msg.contains("stop"));
        assert!(msg.contains("17"));
        Ok(())
    }

    #[test]
    fn test_no_stream_error_is_critical() -> Result<()> {
        for variant in all_variants() {
            assert!(variant.severity() < ErrorSeverity::Critical, "{variant}");
        }
        Ok(())
    }
}

mod validation_error_tests {
    use super::*;

    #[test]
    fn test_payload_too_large_display() -> Result<()> {
        let err = ValidationError::PayloadTooLarge { len: 80, max: 56 };
        assert_eq!(
            err.to_string(),
            "Payload of 80 bytes exceeds the frame limit of 56"
        );
        Ok(())
    }

    #[test]
    fn test_unsupported_by_scene_display() -> Result<()> {
        let err = ValidationError::UnsupportedByScene {
            scene: "NormalPlay",
            op: "set_mute",
        };
        assert!(err.to_string().contains("NormalPlay"));
        assert!(err.to_string().contains("set_mute"));
        Ok(())
    }

    #[test]
    fn test_required_display() -> Result<()> {
        let err = ValidationError::required("message_channel");
        assert_eq!(err.to_string(), "Required field 'message_channel' is missing");
        Ok(())
    }
}

mod adsp_error_tests {
    use super::*;

    #[test]
    fn test_from_stream_error() -> Result<()> {
        let err: AdspError = StreamError::Duplicate(0x0200).into();
        assert!(matches!(err, AdspError::Stream(StreamError::Duplicate(0x0200))));
        assert_eq!(err.category(), ErrorCategory::InvalidArgument);
        Ok(())
    }

    #[test]
    fn test_from_validation_error() -> Result<()> {
        let err: AdspError = ValidationError::invalid_session_id(0x4000, "unknown").into();
        assert_eq!(err.category(), ErrorCategory::InvalidArgument);
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        Ok(())
    }

    #[test]
    fn test_question_mark_conversion() -> Result<()> {
        fn inner() -> Result<()> {
            Err(StreamError::aborted(0x0901, "start"))?;
            Ok(())
        }
        let err = inner().err();
        assert!(matches!(
            err,
            Some(AdspError::Stream(StreamError::Aborted { session: 0x0901, .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_recovery_failure_is_critical() -> Result<()> {
        let err = AdspError::Recovery("repair service timed out".into());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
        Ok(())
    }

    #[test]
    fn test_config_error() -> Result<()> {
        let err = AdspError::config("op_timeout must be non-zero");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(err.to_string().contains("op_timeout"));
        Ok(())
    }
}

mod snapshot_tests {
    use super::*;

    #[test]
    fn test_timeout_message_snapshot() {
        let err: AdspError = StreamError::timeout(0x0901, "start", 1500).into();
        insta::assert_snapshot!(err.to_string(), @"Stream error: 'start' on session 0x0901 timed out after 1500ms");
    }
}
