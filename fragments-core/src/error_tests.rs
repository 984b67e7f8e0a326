/*!
Tests for error construction, display and classification.
*/

#[cfg(test)]
mod tests {
    use crate::error::FragmentsError;
    use std::io;

    #[test]
    fn test_fragments_error_display() {
        let error = FragmentsError::validation("ownerId is required");
        assert_eq!(error.to_string(), "Validation error: ownerId is required");

        let error = FragmentsError::unsupported_type("audio/mpeg");
        assert_eq!(error.to_string(), "Unsupported type: audio/mpeg");

        let error = FragmentsError::Storage("disk full".to_string());
        assert_eq!(error.to_string(), "Storage error: disk full");

        let error = FragmentsError::unsupported_conversion("text/plain", "application/json");
        assert_eq!(
            error.to_string(),
            "Unsupported conversion from text/plain to application/json"
        );
    }

    #[test]
    fn test_data_unavailable_carries_id_and_reason() {
        let error = FragmentsError::data_unavailable("frag-1", "no data stored");
        let message = error.to_string();
        assert!(message.contains("frag-1"));
        assert!(message.contains("no data stored"));
    }

    #[test]
    fn test_fragments_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        let error = FragmentsError::from(io_error);

        match error {
            FragmentsError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_fragments_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = FragmentsError::from(json_error);

        match error {
            FragmentsError::Json(_) => {}
            _ => panic!("Expected Json error variant"),
        }
    }

    #[test]
    fn test_client_error_classification() {
        let client = [
            FragmentsError::validation("x"),
            FragmentsError::invalid_key("x"),
            FragmentsError::not_found("x"),
            FragmentsError::unsupported_type("x"),
            FragmentsError::unsupported_conversion("a", "b"),
            FragmentsError::invalid_payload("x"),
        ];
        for error in &client {
            assert!(error.is_client_error(), "{error}");
        }

        let server = [
            FragmentsError::storage("x"),
            FragmentsError::data_unavailable("id", "x"),
            FragmentsError::from(io::Error::new(io::ErrorKind::Other, "x")),
        ];
        for error in &server {
            assert!(!error.is_client_error(), "{error}");
        }
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<FragmentsError>();
        assert_sync::<FragmentsError>();
    }

    #[test]
    fn test_error_source_chain() {
        let error = FragmentsError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let source = std::error::Error::source(&error);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("gone"));
    }
}
