//! # Pipeline Tests Module
//!
//! End-to-end behaviour of the extraction pipeline against scripted
//! providers: early acceptance, exhaustion, timeouts, retries and the
//! synthetic fallback.


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chat_ocr::ocr_config::{
        PipelineConfig, FALLBACK_CONFIDENCE, FALLBACK_SOURCE_ID, LOW_CONFIDENCE_FLOOR,
    };
    use chat_ocr::ocr_errors::ProviderError;
    use chat_ocr::pipeline::{
        extract_text, run_pipeline_detailed, run_pipeline_with_registry, PipelineOutcome,
        TextExtractor, TIMED_OUT,
    };
    use chat_ocr::providers::ProviderRegistry;

    use super::test_helpers::{
        fast_config, registry_of, sample_image, LogBuffer, ScriptedProvider, Step,
    };

    /// Wait until a detached provider task has seen its token fire
    async fn wait_for_cancellations(provider: &ScriptedProvider, expected: usize) -> usize {
        for _ in 0..100 {
            if provider.cancellations() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        provider.cancellations()
    }

    /// Primary meets the threshold with meaningful text: fallbacks never run
    #[tokio::test]
    async fn test_early_acceptance_skips_fallbacks() {
        let primary = Arc::new(ScriptedProvider::text("primary", "Hello there  friend!!", 0.9));
        let fallback = Arc::new(ScriptedProvider::text("fallback", "unused text", 0.9));
        let registry = registry_of(&[primary.clone(), fallback.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(3)).await;

        assert_eq!(report.outcome, PipelineOutcome::Accepted);
        assert_eq!(report.result.source_id, "primary");
        assert_eq!(report.result.text, "Hello there friend!");
        assert_eq!(report.result.confidence, 0.9);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(report.attempts.len(), 1);
    }

    /// No attempt reaches the threshold: the highest confidence wins
    #[tokio::test]
    async fn test_exhaustion_selects_max_confidence() {
        let providers = [
            Arc::new(ScriptedProvider::text("a", "first reading", 0.2)),
            Arc::new(ScriptedProvider::text("b", "second reading", 0.5)),
            Arc::new(ScriptedProvider::text("c", "third reading", 0.3)),
        ];
        let registry = registry_of(&providers);
        let mut config = fast_config(3);
        config.confidence_threshold = 0.9;

        let report = run_pipeline_detailed(&sample_image(), &registry, &config).await;

        assert_eq!(report.outcome, PipelineOutcome::LowConfidence);
        assert_eq!(report.result.source_id, "b");
        assert_eq!(report.result.text, "second reading");
        assert_eq!(report.result.confidence, 0.5);
        assert_eq!(report.attempts.len(), 3);
        assert!(providers.iter().all(|p| p.calls() == 1));
    }

    /// Equal confidence: the earlier attempt is kept
    #[tokio::test]
    async fn test_tie_break_prefers_earliest() {
        let registry = registry_of(&[
            Arc::new(ScriptedProvider::text("first", "same quality one", 0.4)),
            Arc::new(ScriptedProvider::text("second", "same quality two", 0.4)),
        ]);
        let mut config = fast_config(2);
        config.confidence_threshold = 0.8;

        let result = run_pipeline_with_registry(&sample_image(), &registry, Some(&config)).await;
        assert_eq!(result.source_id, "first");
        assert_eq!(result.text, "same quality one");
    }

    /// A slow provider is abandoned and the next one is tried
    #[tokio::test]
    async fn test_timeout_moves_to_next_provider() {
        let slow = Arc::new(ScriptedProvider::hanging("slow"));
        let fast = Arc::new(ScriptedProvider::text("fast", "Hey how are you??", 0.7));
        let registry = registry_of(&[slow.clone(), fast.clone()]);
        let config = fast_config(2);

        let start = Instant::now();
        let report = run_pipeline_detailed(&sample_image(), &registry, &config).await;
        let elapsed = start.elapsed();

        assert_eq!(report.result.source_id, "fast");
        assert_eq!(report.result.text, "Hey how are you?");
        assert_eq!(report.attempts[0].source_id, "slow");
        assert_eq!(report.attempts[0].error.as_deref(), Some(TIMED_OUT));
        assert_eq!(report.attempts[0].confidence, 0.0);
        assert_eq!(slow.calls(), 1);

        let ceiling =
            Duration::from_millis(u64::from(config.max_attempts) * config.per_attempt_timeout_ms);
        assert!(
            elapsed < ceiling + Duration::from_millis(500),
            "run took {elapsed:?}"
        );
    }

    /// With no providers the generator still yields text
    #[tokio::test]
    async fn test_fallback_when_no_providers() {
        let registry = ProviderRegistry::empty();
        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(1)).await;

        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
        assert!(report.attempts.is_empty());
        assert_eq!(report.result.source_id, FALLBACK_SOURCE_ID);
        assert_eq!(report.result.confidence, FALLBACK_CONFIDENCE);
        assert!(report.result.error.is_none());
        assert!(report.result.text.contains("8x4 px"));
        assert!(report.result.text.contains("image/png"));
    }

    /// Every provider failing ends in synthetic text, never an error
    #[tokio::test]
    async fn test_fallback_when_all_providers_fail() {
        let registry = registry_of(&[
            Arc::new(ScriptedProvider::failing(
                "a",
                ProviderError::Format("unsupported".to_string()),
            )),
            Arc::new(ScriptedProvider::failing(
                "b",
                ProviderError::Payload("garbled".to_string()),
            )),
        ]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(3)).await;

        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts.iter().all(|a| a.error.is_some()));
        assert!(report.result.error.is_none());
        assert!(!report.result.text.is_empty());
    }

    /// Low-quality primary, good fallback: the fallback's cleaned text wins
    #[tokio::test]
    async fn test_end_to_end_fallback_provider() {
        let registry = registry_of(&[
            Arc::new(ScriptedProvider::text("primary", "Hy hw r u??", 0.2)),
            Arc::new(ScriptedProvider::text("fallback", "Hey how are you??", 0.6)),
        ]);
        let mut config = fast_config(3);
        config.confidence_threshold = 0.3;

        let result = run_pipeline_with_registry(&sample_image(), &registry, Some(&config)).await;
        assert_eq!(result.text, "Hey how are you?");
        assert_eq!(result.source_id, "fallback");
        assert_eq!(result.confidence, 0.6);
    }

    /// Confident but meaningless text is not accepted early
    #[tokio::test]
    async fn test_gate_blocks_confident_noise() {
        let noise = Arc::new(ScriptedProvider::text("noise", "#@! %^&", 0.95));
        let real = Arc::new(ScriptedProvider::text("real", "see you at noon", 0.5));
        let registry = registry_of(&[noise.clone(), real.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;
        assert_eq!(report.result.source_id, "real");
        assert_eq!(report.outcome, PipelineOutcome::Accepted);
        assert_eq!(real.calls(), 1);
    }

    /// A transient failure is retried once when budget remains
    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        let flaky = Arc::new(
            ScriptedProvider::failing(
                "flaky",
                ProviderError::Transport("connection reset".to_string()),
            )
            .then(Step::Text("Are we still on for tonight?".to_string(), 0.8)),
        );
        let registry = registry_of(&[flaky.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;

        assert_eq!(flaky.calls(), 2);
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts[0].is_failure());
        assert_eq!(report.outcome, PipelineOutcome::Accepted);
        assert_eq!(report.result.text, "Are we still on for tonight?");
    }

    /// A timed-out provider counts as transient and gets its retry
    #[tokio::test]
    async fn test_timed_out_provider_is_retried() {
        let sluggish = Arc::new(
            ScriptedProvider::hanging("sluggish")
                .then(Step::Text("Running late, sorry".to_string(), 0.7)),
        );
        let registry = registry_of(&[sluggish.clone()]);

        let config = fast_config(2);
        let result = run_pipeline_with_registry(&sample_image(), &registry, Some(&config)).await;
        assert_eq!(sluggish.calls(), 2);
        assert_eq!(result.text, "Running late, sorry");
    }

    /// Low confidence and format errors are not retried
    #[tokio::test]
    async fn test_deterministic_outcomes_are_not_retried() {
        let weak = Arc::new(ScriptedProvider::text("weak", "maybe this says hi", 0.2));
        let picky = Arc::new(ScriptedProvider::failing(
            "picky",
            ProviderError::Format("svg not supported".to_string()),
        ));
        let registry = registry_of(&[weak.clone(), picky.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(5)).await;

        assert_eq!(weak.calls(), 1);
        assert_eq!(picky.calls(), 1);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.outcome, PipelineOutcome::LowConfidence);
        assert_eq!(report.result.source_id, "weak");
    }

    /// Status 503 is transient, 400 is not
    #[tokio::test]
    async fn test_retry_depends_on_status_code() {
        let unavailable = Arc::new(ScriptedProvider::failing(
            "unavailable",
            ProviderError::Status {
                code: 503,
                body: "busy".to_string(),
            },
        ));
        let bad_request = Arc::new(ScriptedProvider::failing(
            "bad_request",
            ProviderError::Status {
                code: 400,
                body: "bad image".to_string(),
            },
        ));
        let registry = registry_of(&[unavailable.clone(), bad_request.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(4)).await;

        assert_eq!(unavailable.calls(), 2);
        assert_eq!(bad_request.calls(), 1);
        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
    }

    /// The budget caps total attempts even with providers left
    #[tokio::test]
    async fn test_budget_limits_attempts() {
        let providers = [
            Arc::new(ScriptedProvider::text("a", "barely legible words", 0.1)),
            Arc::new(ScriptedProvider::text("b", "unused", 0.9)),
        ];
        let registry = registry_of(&providers);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(1)).await;

        assert_eq!(providers[0].calls(), 1);
        assert_eq!(providers[1].calls(), 0);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.result.source_id, "a");
    }

    /// Best effort is raised to the floor confidence
    #[tokio::test]
    async fn test_low_confidence_result_gets_floor() {
        let registry = registry_of(&[Arc::new(ScriptedProvider::text(
            "dim",
            "faint   text here",
            0.03,
        ))]);

        let config = fast_config(2);
        let result = run_pipeline_with_registry(&sample_image(), &registry, Some(&config)).await;
        assert_eq!(result.confidence, LOW_CONFIDENCE_FLOOR);
        assert_eq!(result.text, "faint text here");
        assert_eq!(result.source_id, "dim");
    }

    /// Best effort that cleans to nothing falls through to the generator
    #[tokio::test]
    async fn test_best_effort_cleaned_to_nothing_uses_generator() {
        let registry =
            registry_of(&[Arc::new(ScriptedProvider::text("emoji", "☺☺☺ ☺☺", 0.5))]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;
        assert_eq!(report.outcome, PipelineOutcome::Synthetic);
        assert_eq!(report.result.source_id, FALLBACK_SOURCE_ID);
    }

    /// A panicking provider becomes a failed attempt
    #[tokio::test]
    async fn test_provider_panic_is_contained() {
        let registry = registry_of(&[
            Arc::new(ScriptedProvider::new("broken", Step::Panic)),
            Arc::new(ScriptedProvider::text("steady", "All good here", 0.6)),
        ]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;

        assert!(report.attempts[0].is_failure());
        assert_eq!(report.result.source_id, "steady");
    }

    /// Independent images share the registry without interfering
    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let provider = Arc::new(ScriptedProvider::text("shared", "Good morning everyone", 0.8));
        let extractor = TextExtractor::new(registry_of(&[provider.clone()]), fast_config(2));

        let image_a = sample_image();
        let image_b = sample_image();
        let (first, second) = tokio::join!(
            extractor.run_detailed(&image_a),
            extractor.run_detailed(&image_b)
        );

        assert_eq!(provider.calls(), 2);
        assert_eq!(first.attempts.len(), 1);
        assert_eq!(second.attempts.len(), 1);
        assert_eq!(first.result.text, second.result.text);
    }

    #[tokio::test]
    async fn test_report_serializes_for_cli() {
        let extractor = TextExtractor::new(
            registry_of(&[Arc::new(ScriptedProvider::text("p", "Lunch at one?", 0.9))]),
            fast_config(2),
        );
        let report = extractor.run_detailed(&sample_image()).await;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["outcome"], "accepted");
        assert_eq!(json["result"]["sourceId"], "p");
        assert_eq!(json["attempts"].as_array().map(Vec::len), Some(1));
    }

    /// Retry backoff is charged to the retried attempt's slot, so the run
    /// stays within `max_attempts` timeouts even with the default delays
    #[tokio::test]
    async fn test_retry_backoff_stays_within_attempt_slots() {
        let stuck = Arc::new(ScriptedProvider::hanging("stuck"));
        let registry = registry_of(&[stuck.clone()]);
        let config = PipelineConfig {
            max_attempts: 2,
            per_attempt_timeout_ms: 100,
            ..PipelineConfig::default()
        };
        assert!(config.base_retry_delay_ms > config.per_attempt_timeout_ms);

        let start = Instant::now();
        let report = run_pipeline_detailed(&sample_image(), &registry, &config).await;
        let elapsed = start.elapsed();

        assert_eq!(stuck.calls(), 2);
        assert_eq!(report.attempts.len(), 2);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.error.as_deref() == Some(TIMED_OUT)));
        let ceiling = Duration::from_millis(200);
        assert!(
            elapsed < ceiling + Duration::from_millis(100),
            "run took {elapsed:?}"
        );
    }

    /// Without an explicit configuration the budget covers every provider
    #[tokio::test]
    async fn test_omitted_config_tries_every_provider() {
        let providers = [
            Arc::new(ScriptedProvider::text("a", "blurry words one", 0.1)),
            Arc::new(ScriptedProvider::text("b", "blurry words two", 0.2)),
            Arc::new(ScriptedProvider::text("c", "blurry words three", 0.15)),
        ];
        let registry = registry_of(&providers);

        let result = run_pipeline_with_registry(&sample_image(), &registry, None).await;

        assert!(providers.iter().all(|p| p.calls() == 1));
        assert_eq!(result.source_id, "b");
        assert_eq!(result.text, "blurry words two");
    }

    /// A timed-out provider sees its cancellation token fire
    #[tokio::test]
    async fn test_timed_out_provider_is_signalled() {
        let slow = Arc::new(
            ScriptedProvider::text("slow", "Hello there friend", 0.9)
                .with_delay(Duration::from_secs(5)),
        );
        let fast = Arc::new(ScriptedProvider::text("fast", "See you soon", 0.7));
        let registry = registry_of(&[slow.clone(), fast.clone()]);

        let report = run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;

        assert_eq!(report.result.source_id, "fast");
        assert_eq!(report.attempts[0].error.as_deref(), Some(TIMED_OUT));
        assert_eq!(wait_for_cancellations(&slow, 1).await, 1);
    }

    #[tokio::test]
    async fn test_hanging_provider_is_signalled_on_each_timeout() {
        let stuck = Arc::new(ScriptedProvider::hanging("stuck"));
        let registry = registry_of(&[stuck.clone()]);

        run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;

        assert_eq!(stuck.calls(), 2);
        assert_eq!(wait_for_cancellations(&stuck, 2).await, 2);
    }

    /// Rejected images and malformed payloads are provider failures, logged
    /// at error level like transport failures
    #[tokio::test]
    async fn test_permanent_provider_failures_log_at_error() {
        let logs = LogBuffer::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let registry = registry_of(&[
            Arc::new(ScriptedProvider::failing(
                "picky",
                ProviderError::Status {
                    code: 400,
                    body: "bad image".to_string(),
                },
            )),
            Arc::new(ScriptedProvider::failing(
                "garbled",
                ProviderError::Payload("unexpected body".to_string()),
            )),
        ]);
        run_pipeline_detailed(&sample_image(), &registry, &fast_config(2)).await;

        let output = logs.contents();
        for marker in ["[PROVIDER_STATUS]", "[PROVIDER_PAYLOAD]"] {
            let line = output
                .lines()
                .find(|line| line.contains(marker))
                .unwrap_or_else(|| panic!("no log line for {marker} in:\n{output}"));
            assert!(line.contains("ERROR"), "not logged at error: {line}");
        }
    }

    /// The default extractor always yields text
    #[tokio::test]
    async fn test_extract_text_never_empty() {
        let text = extract_text(&sample_image()).await;
        assert!(!text.is_empty());
    }
}
