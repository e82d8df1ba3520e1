//! Tests for message types and identifiers.

use super::*;

mod queue_name_validation {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        for name in ["abc", "task-pending", "q1", "a-b-c-1-2-3"] {
            assert!(
                QueueName::new(name.to_string()).is_ok(),
                "{} should be valid",
                name
            );
        }

        let longest = "a".repeat(63);
        assert!(QueueName::new(longest).is_ok());
    }

    #[test]
    fn test_queue_name_length_limits() {
        assert!(matches!(
            QueueName::new("ab".to_string()),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            QueueName::new("a".repeat(64)),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_queue_name_rejects_invalid_characters() {
        for name in ["Upper", "under_score", "dot.ted", "spa ce"] {
            assert!(
                matches!(
                    QueueName::new(name.to_string()),
                    Err(ValidationError::InvalidFormat { .. })
                ),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_queue_name_hyphen_rules() {
        for name in ["-abc", "abc-", "ab--cd"] {
            assert!(QueueName::new(name.to_string()).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_queue_name_from_str_and_display() {
        let name: QueueName = "jobs".parse().unwrap();
        assert_eq!(name.as_str(), "jobs");
        assert_eq!(name.to_string(), "jobs");
    }

    #[test]
    fn test_queue_name_deserialization_validates() {
        let ok: Result<QueueName, _> = serde_json::from_str("\"jobs\"");
        assert!(ok.is_ok());

        let bad: Result<QueueName, _> = serde_json::from_str("\"NOT_VALID\"");
        assert!(bad.is_err());
    }
}

mod identifiers {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let first = MessageId::new();
        let second = MessageId::new();
        assert_ne!(first, second);
        assert!(!first.as_str().is_empty());
    }

    #[test]
    fn test_message_id_parse_rejects_empty() {
        assert!("".parse::<MessageId>().is_err());
        let parsed: MessageId = "abc".parse().unwrap();
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn test_pop_receipts_are_unique() {
        let first = PopReceipt::new();
        let second = PopReceipt::new();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
    }

    #[test]
    fn test_pop_receipt_parse_rejects_empty() {
        assert!(matches!(
            "".parse::<PopReceipt>(),
            Err(ValidationError::Required { .. })
        ));
    }
}

mod timestamps {
    use super::*;

    #[test]
    fn test_millis_round_trip_preserves_millisecond_precision() {
        let ts = Timestamp::from_millis(1_700_000_000_123).unwrap();
        assert_eq!(ts.as_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_plus_offsets_forward_and_back() {
        let start = Timestamp::from_millis(10_000).unwrap();
        assert_eq!(start.plus(Duration::seconds(5)).as_millis(), 15_000);
        assert_eq!(start.plus(Duration::seconds(-5)).as_millis(), 5_000);
        assert!(start.plus(Duration::milliseconds(1)) > start);
    }

    #[test]
    fn test_checked_plus_rejects_out_of_range_offsets() {
        let start = Timestamp::from_millis(1_700_000_000_000).unwrap();
        let huge = Duration::seconds(9_000_000_000_000);

        assert!(start.checked_plus(huge).is_none());
        assert!(start.checked_plus(-huge).is_none());
        assert_eq!(
            start.checked_plus(Duration::days(7)),
            Some(start.plus(Duration::days(7)))
        );
    }

    #[test]
    fn test_plus_clamps_instead_of_overflowing() {
        let start = Timestamp::from_millis(1_700_000_000_000).unwrap();
        let huge = Duration::seconds(9_000_000_000_000);

        assert!(start.plus(huge) > start.plus(Duration::days(365 * 1000)));
        assert!(start.plus(-huge) < Timestamp::from_millis(0).unwrap());
    }

    #[test]
    fn test_trunc_millis_drops_sub_millisecond_part() {
        let start = Timestamp::from_millis(1_700_000_000_000).unwrap();
        let precise = start.plus(Duration::microseconds(1_999));
        assert_eq!(precise.trunc_millis(), start.plus(Duration::milliseconds(1)));
    }

    #[test]
    fn test_now_has_millisecond_precision() {
        let now = Timestamp::now();
        assert_eq!(Timestamp::from_millis(now.as_millis()), Some(now));
    }

    #[test]
    fn test_display_and_parse() {
        let ts = Timestamp::from_millis(0).unwrap();
        let text = ts.to_string();
        assert_eq!(text, "1970-01-01T00:00:00.000Z");
        assert_eq!(text.parse::<Timestamp>().unwrap(), ts);
    }
}

mod options {
    use super::*;

    #[test]
    fn test_put_options_defaults() {
        let options = PutOptions::new();
        assert_eq!(options.visibility_timeout, Duration::zero());
        assert_eq!(options.time_to_live, Duration::days(7));
    }

    #[test]
    fn test_put_options_builder() {
        let options = PutOptions::new()
            .with_visibility_timeout(Duration::seconds(10))
            .with_time_to_live(Duration::seconds(60));
        assert_eq!(options.visibility_timeout, Duration::seconds(10));
        assert_eq!(options.time_to_live, Duration::seconds(60));
    }

    #[test]
    fn test_lease_options_builder() {
        let options = LeaseOptions::new()
            .with_visibility_timeout(Duration::seconds(45))
            .with_max_messages(16);
        assert_eq!(options.visibility_timeout, Duration::seconds(45));
        assert_eq!(options.max_messages, 16);
        assert_eq!(LeaseOptions::default().max_messages, 1);
    }

    #[test]
    fn test_leased_message_text() {
        let now = Timestamp::now();
        let message = LeasedMessage {
            message_id: MessageId::new(),
            body: Bytes::from_static(b"hello"),
            pop_receipt: PopReceipt::new(),
            dequeue_count: 1,
            inserted_at: now,
            expires_at: now,
            next_visible_at: now,
        };
        assert_eq!(message.text(), Some("hello"));

        let binary = LeasedMessage {
            body: Bytes::from_static(&[0xff, 0xfe]),
            ..message
        };
        assert_eq!(binary.text(), None);
    }
}
