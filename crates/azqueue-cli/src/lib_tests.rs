//! Tests for the azqueue CLI library module.

use super::*;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

async fn run(database: &std::path::Path, args: &[&str]) -> Result<String, CliError> {
    let db = database.to_str().unwrap();
    let mut argv = vec!["azqueue", "--database", db];
    argv.extend_from_slice(args);

    let mut out = Vec::new();
    execute(parse(&argv), &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

mod parsing {
    use super::*;

    #[test]
    fn test_put_parsing() {
        let cli = parse(&["azqueue", "put", "jobs", "hello", "--ttl", "60"]);
        match cli.command {
            Commands::Put {
                queue,
                body,
                visibility_timeout,
                ttl,
            } => {
                assert_eq!(queue, "jobs");
                assert_eq!(body, "hello");
                assert_eq!(visibility_timeout, 0);
                assert_eq!(ttl, Some(60));
            }
            other => panic!("Expected Put command, got {:?}", other),
        }
    }

    #[test]
    fn test_lease_defaults() {
        let cli = parse(&["azqueue", "lease", "jobs"]);
        match cli.command {
            Commands::Lease {
                visibility_timeout,
                max_messages,
                format,
                ..
            } => {
                assert_eq!(visibility_timeout, None);
                assert_eq!(max_messages, 1);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("Expected Lease command, got {:?}", other),
        }
        assert_eq!(cli.log_level, "warn");
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_extend_requires_receipt() {
        assert!(Cli::try_parse_from(["azqueue", "extend", "jobs", "some-id"]).is_err());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["azqueue", "lease", "jobs", "--format", "xml"]).is_err());
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_exit_codes_by_family() {
        let cases = [
            (
                CliError::from(ConfigurationError::Missing {
                    key: "ledger.path".to_string(),
                }),
                1,
            ),
            (
                CliError::from(QueueError::Storage {
                    message: "disk I/O error".to_string(),
                }),
                2,
            ),
            (
                CliError::from(QueueError::LeaseMismatch {
                    message_id: "abc".to_string(),
                }),
                3,
            ),
            (
                CliError::from(QueueError::Validation(ValidationError::OutOfRange {
                    field: "max_messages".to_string(),
                    message: "must be 1-32".to_string(),
                })),
                4,
            ),
            (
                CliError::from(std::io::Error::new(std::io::ErrorKind::Other, "closed")),
                5,
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.exit_code(), code, "{}", error);
        }
    }

    #[test]
    fn test_validation_error_names_the_field() {
        let error = CliError::from(ValidationError::OutOfRange {
            field: "time_to_live".to_string(),
            message: "must be greater than zero".to_string(),
        });
        match error {
            CliError::InvalidArgument { arg, .. } => assert_eq!(arg, "time_to_live"),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn test_put_lease_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        let id = run(&db, &["put", "jobs", "hello", "--ttl", "60"])
            .await
            .unwrap();
        let id = id.trim().to_string();

        let leased = run(&db, &["lease", "jobs", "--visibility-timeout", "30"])
            .await
            .unwrap();
        let fields: Vec<&str> = leased.trim_end().split('\t').collect();
        assert_eq!(fields[0], id);
        assert_eq!(fields[2], "1");
        assert_eq!(fields[3], "hello");

        assert_eq!(run(&db, &["lease", "jobs"]).await.unwrap(), "");

        run(&db, &["delete", "jobs", &id, fields[1]]).await.unwrap();
        assert_eq!(run(&db, &["count", "jobs"]).await.unwrap().trim(), "0");
    }

    #[tokio::test]
    async fn test_lease_text_output_escapes_body_separators() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        run(&db, &["put", "jobs", "a\tb\nc\\d"]).await.unwrap();

        let leased = run(&db, &["lease", "jobs"]).await.unwrap();
        assert_eq!(leased.lines().count(), 1);
        let fields: Vec<&str> = leased.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[3], "a\\tb\\nc\\\\d");
    }

    #[tokio::test]
    async fn test_unrepresentable_visibility_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        run(&db, &["put", "jobs", "hello"]).await.unwrap();

        let result = run(
            &db,
            &["lease", "jobs", "--visibility-timeout", "9000000000000"],
        )
        .await;
        assert!(result.is_err());
        assert_eq!(run(&db, &["count", "jobs"]).await.unwrap().trim(), "1");
    }

    #[tokio::test]
    async fn test_lease_json_output() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        run(&db, &["put", "jobs", "first"]).await.unwrap();
        run(&db, &["put", "jobs", "second"]).await.unwrap();

        let output = run(&db, &["lease", "jobs", "-m", "5", "--format", "json"])
            .await
            .unwrap();
        let messages: serde_json::Value = serde_json::from_str(&output).unwrap();

        let messages = messages.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message_text"], "first");
        assert_eq!(messages[1]["message_text"], "second");
        assert_eq!(messages[0]["dequeue_count"], 1);
    }

    #[tokio::test]
    async fn test_extend_returns_new_receipt() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        let id = run(&db, &["put", "jobs", "work"]).await.unwrap();
        let id = id.trim().to_string();
        let leased = run(&db, &["lease", "jobs"]).await.unwrap();
        let old_receipt = leased.split('\t').nth(1).unwrap().to_string();

        let renewed = run(
            &db,
            &["extend", "jobs", &id, &old_receipt, "--body", "more work"],
        )
        .await
        .unwrap();
        let new_receipt = renewed.split('\t').next().unwrap().to_string();
        assert_ne!(new_receipt, old_receipt);

        let stale = run(&db, &["delete", "jobs", &id, &old_receipt]).await;
        assert!(matches!(stale, Err(CliError::LeaseMismatch { .. })));

        run(&db, &["delete", "jobs", &id, &new_receipt])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_queue_name_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        let result = run(&db, &["count", "Not_A_Queue"]).await;
        match result {
            Err(CliError::InvalidArgument { arg, .. }) => assert_eq!(arg, "queue"),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_ttl_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        let result = run(&db, &["put", "jobs", "x", "--ttl", "0"]).await;
        assert!(matches!(result, Err(CliError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_purge_reports_removed_rows() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        run(&db, &["put", "jobs", "x"]).await.unwrap();
        assert_eq!(run(&db, &["purge"]).await.unwrap().trim(), "0");
    }

    #[tokio::test]
    async fn test_queue_commands_need_a_database() {
        let cli = parse(&["azqueue", "count", "jobs"]);
        let mut out = Vec::new();

        if std::env::var_os("AZQUEUE_DATABASE").is_none() {
            let result = execute(cli, &mut out).await;
            assert!(matches!(result, Err(CliError::Configuration(_))));
        }
    }

    #[tokio::test]
    async fn test_config_show_prints_resolved_ledger() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("queue.db");

        let output = run(&db, &["config", "--show", "--format", "json"])
            .await
            .unwrap();
        let config: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(config["ledger"]["kind"], "sqlite");
        assert_eq!(config["max_messages_per_lease"], 32);
        assert!(!db.exists(), "config command must not open the ledger");
    }
}
