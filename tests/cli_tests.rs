#[cfg(test)]
mod tests {
    use clap::Parser;
    use midibridge::cli::{parse_hex_message, validate_destination, Args};
    use midibridge::ReconcileStrategy;
    use std::path::PathBuf;

    fn destinations() -> Vec<String> {
        vec!["Mock Device 1".to_string(), "Mock Device 2".to_string()]
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["test"]);
        assert!(!args.list);
        assert!(!args.monitor);
        assert!(!args.log_stderr);
        assert_eq!(args.send, None);
        assert_eq!(args.strategy, None);
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_args_send_with_destination() {
        let args = Args::parse_from([
            "test",
            "--send",
            "90 40 7F",
            "--destination",
            "Mock Device 2",
            "--strategy",
            "reset",
            "--config",
            "bridge.toml",
        ]);
        assert_eq!(args.send.as_deref(), Some("90 40 7F"));
        assert_eq!(args.destination.as_deref(), Some("Mock Device 2"));
        assert_eq!(args.strategy, Some(ReconcileStrategy::Reset));
        assert_eq!(args.config, Some(PathBuf::from("bridge.toml")));
    }

    #[test]
    fn test_destination_requires_send() {
        assert!(Args::try_parse_from(["test", "--destination", "Mock Device 1"]).is_err());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(Args::try_parse_from(["test", "--strategy", "sometimes"]).is_err());
    }

    #[test]
    fn test_parse_hex_message() {
        assert_eq!(parse_hex_message("90 40 7F"), Ok((0x90, 0x40, 0x7F)));
        assert_eq!(parse_hex_message("0xC0,0x05"), Ok((0xC0, 0x05, 0)));
        assert_eq!(parse_hex_message("f8"), Ok((0xF8, 0, 0)));
        assert!(parse_hex_message("").is_err());
        assert!(parse_hex_message("40 40").is_err());
        assert!(parse_hex_message("90 zz").is_err());
        assert!(parse_hex_message("90 40 7F 00").is_err());
    }

    #[test]
    fn test_valid_destination() {
        assert!(validate_destination("Mock Device 2", &destinations()).is_ok());
        assert!(validate_destination("Device 1", &destinations()).is_ok());
    }

    #[test]
    fn test_invalid_destination() {
        let result = validate_destination("Nonexistent", &destinations());
        let error_msg = result.unwrap_err();
        assert!(error_msg.contains("Nonexistent"));
        assert!(error_msg.contains("  - Mock Device 1"));
        assert!(error_msg.contains("  - Mock Device 2"));
    }
}
