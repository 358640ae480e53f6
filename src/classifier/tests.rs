//! Tests for classifier module

#[cfg(test)]
mod tests {
    use super::super::schema::{extract_json, parse_signal, parse_trend};
    use super::super::*;
    use crate::config::ClassificationMode;
    use crate::error::IndicatorError;
    use crate::types::{MediaRef, Post, Trend};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request() -> ClassificationRequest {
        let post = Post {
            id: "1870000000000000001".to_string(),
            author_id: "3696215239".to_string(),
            author_screen_name: "Nebraskangooner".to_string(),
            text: "$BTC bull flag on the 4h, targeting 100k".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 10, 15, 30, 0).unwrap(),
            media: vec![MediaRef {
                url: "https://pbs.twimg.com/media/chart.jpg".to_string(),
            }],
            processed: false,
        };
        ClassificationRequest::for_post(&post, Some(dec!(94000)))
    }

    fn chat_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    fn classifier(server: &MockServer, mode: ClassificationMode) -> LlmClassifier {
        LlmClassifier::new(
            LlmProvider::Compatible {
                api_key: Some("sk-test".to_string()),
                model: "vision-test".to_string(),
                base_url: server.uri(),
            },
            mode,
        )
        .with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    #[test]
    fn test_request_targets_three_following_days() {
        let req = request();
        assert_eq!(
            req.target_dates,
            vec![date(2025, 1, 11), date(2025, 1, 12), date(2025, 1, 13)]
        );
        assert_eq!(req.media_urls.len(), 1);
        assert_eq!(req.reference_price, Some(dec!(94000)));
    }

    #[test]
    fn test_extract_json_strips_fences() {
        let raw = "```json\n{\"relevant\": false}\n```";
        assert_eq!(extract_json(raw).unwrap(), "{\"relevant\": false}");
        assert_err!(extract_json("no json here"));
    }

    #[test]
    fn test_parse_trend_orders_by_request() {
        let raw = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-13", "trend": null},
            {"date": "2025-01-11", "trend": "up"},
            {"date": "2025-01-12", "trend": "DOWN"}
        ]}"#;
        let parsed = parse_trend(raw, &request()).unwrap();

        assert!(parsed.relevant);
        assert_eq!(parsed.days.len(), 3);
        assert_eq!(parsed.days[0].date, date(2025, 1, 11));
        assert_eq!(parsed.days[0].call, DayCall::Call(Trend::Up));
        assert_eq!(parsed.days[1].call, DayCall::Call(Trend::Down));
        assert_eq!(parsed.days[2].call, DayCall::NoCall);
    }

    #[test]
    fn test_parse_trend_irrelevant_without_dates() {
        let parsed = parse_trend(r#"{"relevant": false}"#, &request()).unwrap();
        assert!(!parsed.relevant);
        assert!(parsed.days.is_empty());
    }

    #[test]
    fn test_parse_trend_rejects_mismatched_dates() {
        let missing = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-11", "trend": "up"},
            {"date": "2025-01-12", "trend": "up"}
        ]}"#;
        assert!(matches!(
            parse_trend(missing, &request()),
            Err(IndicatorError::ClassificationParse(_))
        ));

        let extra = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-11", "trend": "up"},
            {"date": "2025-01-12", "trend": "up"},
            {"date": "2025-01-13", "trend": "up"},
            {"date": "2025-01-14", "trend": "up"}
        ]}"#;
        assert!(matches!(
            parse_trend(extra, &request()),
            Err(IndicatorError::ClassificationParse(_))
        ));

        let duplicate = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-11", "trend": "up"},
            {"date": "2025-01-11", "trend": "down"},
            {"date": "2025-01-12", "trend": "up"},
            {"date": "2025-01-13", "trend": "up"}
        ]}"#;
        assert_err!(parse_trend(duplicate, &request()));
    }

    #[test]
    fn test_parse_trend_keeps_unrecognized_label() {
        let raw = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-11", "trend": "sideways"},
            {"date": "2025-01-12", "trend": null},
            {"date": "2025-01-13", "trend": null}
        ]}"#;
        let parsed = parse_trend(raw, &request()).unwrap();
        assert_eq!(
            parsed.days[0].call,
            DayCall::Unrecognized("sideways".to_string())
        );
    }

    #[test]
    fn test_parse_trend_rejects_wrong_shape() {
        assert_err!(parse_trend(r#"{"predictions": []}"#, &request()));
        assert_err!(parse_trend(r#"{"relevant": "yes"}"#, &request()));
    }

    fn signal_json(confidence: f64, stop_loss: Option<f64>) -> String {
        json!({
            "isTradeRelated": true,
            "type": "long",
            "entry": 93500,
            "takeProfit": 95000,
            "stopLoss": stop_loss,
            "timeframe": { "type": "medium", "duration": { "value": 2, "unit": "day" } },
            "confidence": confidence,
            "reasoning": "Clear support at 93.5k"
        })
        .to_string()
    }

    #[test]
    fn test_signal_accepted_when_complete_and_confident() {
        let verdict =
            parse_signal(&signal_json(0.85, Some(92000.0)), &request(), dec!(0.70), Utc::now())
                .unwrap();

        let SignalVerdict::Accepted(signal) = verdict else {
            panic!("expected accepted signal");
        };
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.entry, dec!(93500));
        assert_eq!(signal.stop_loss, dec!(92000));
        assert_eq!(signal.covered_days(3), 2);
        assert_eq!(
            signal.target_dates(&request().target_dates),
            vec![date(2025, 1, 11), date(2025, 1, 12)]
        );
    }

    #[test]
    fn test_signal_confidence_gate_is_inclusive() {
        let verdict =
            parse_signal(&signal_json(0.7, Some(92000.0)), &request(), dec!(0.70), Utc::now())
                .unwrap();
        assert!(matches!(verdict, SignalVerdict::Accepted(_)));

        let verdict =
            parse_signal(&signal_json(0.69, Some(92000.0)), &request(), dec!(0.70), Utc::now())
                .unwrap();
        assert!(matches!(verdict, SignalVerdict::NotASignal { .. }));
    }

    #[test]
    fn test_signal_missing_field_is_not_a_signal() {
        let verdict =
            parse_signal(&signal_json(0.9, None), &request(), dec!(0.70), Utc::now()).unwrap();
        assert!(matches!(verdict, SignalVerdict::NotASignal { .. }));
    }

    #[test]
    fn test_signal_not_trade_related() {
        let raw = r#"{"isTradeRelated": false, "type": null, "confidence": 0.2, "reasoning": "hash rate"}"#;
        let verdict = parse_signal(raw, &request(), dec!(0.70), Utc::now()).unwrap();
        assert!(matches!(verdict, SignalVerdict::NotASignal { .. }));
    }

    #[test]
    fn test_signal_confidence_out_of_range_is_parse_error() {
        let raw = signal_json(85.0, Some(92000.0));
        assert!(matches!(
            parse_signal(&raw, &request(), dec!(0.70), Utc::now()),
            Err(IndicatorError::ClassificationParse(_))
        ));
    }

    #[test]
    fn test_covered_days_by_unit() {
        let signal = |duration: Option<SignalDuration>| TradingSignal {
            post_id: "p".to_string(),
            direction: Direction::Short,
            entry: dec!(1),
            take_profit: dec!(1),
            stop_loss: dec!(1),
            confidence: dec!(0.9),
            timeframe: Some(Timeframe {
                horizon: None,
                duration,
            }),
            reasoning: String::new(),
            indicated_at: Utc::now(),
        };

        let hours = SignalDuration { value: dec!(12), unit: DurationUnit::Hour };
        let days = SignalDuration { value: dec!(1.5), unit: DurationUnit::Day };
        let many_days = SignalDuration { value: dec!(10), unit: DurationUnit::Day };
        let weeks = SignalDuration { value: dec!(1), unit: DurationUnit::Week };

        assert_eq!(signal(Some(hours)).covered_days(3), 1);
        assert_eq!(signal(Some(days)).covered_days(3), 2);
        assert_eq!(signal(Some(many_days)).covered_days(3), 3);
        assert_eq!(signal(Some(weeks)).covered_days(3), 3);
        assert_eq!(signal(None).covered_days(3), 3);
        assert_eq!(Direction::Short.trend(), Trend::Down);

        let two_days_of_hours = SignalDuration { value: dec!(48), unit: DurationUnit::Hour };
        let past_a_day = SignalDuration { value: dec!(25), unit: DurationUnit::Hour };
        let negative = SignalDuration { value: dec!(-2), unit: DurationUnit::Day };
        let zero_weeks = SignalDuration { value: dec!(0), unit: DurationUnit::Week };

        assert_eq!(signal(Some(two_days_of_hours)).covered_days(3), 2);
        assert_eq!(signal(Some(past_a_day)).covered_days(3), 2);
        assert_eq!(signal(Some(negative)).covered_days(3), 1);
        assert_eq!(signal(Some(zero_weeks)).covered_days(3), 1);
    }

    #[tokio::test]
    async fn test_llm_trend_classification() {
        let server = MockServer::start().await;
        let content = r#"{"relevant": true, "predictions": [
            {"date": "2025-01-11", "trend": "up"},
            {"date": "2025-01-12", "trend": "up"},
            {"date": "2025-01-13", "trend": null}
        ]}"#;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "vision-test",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(content)))
            .expect(1)
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Trend)
            .classify(&request())
            .await
            .unwrap();

        let Classification::Trend(trend) = result else {
            panic!("expected trend classification");
        };
        assert!(trend.relevant);
        assert_eq!(trend.days[1].call, DayCall::Call(Trend::Up));
    }

    #[tokio::test]
    async fn test_llm_sends_images_as_separate_inputs() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    { "role": "system" },
                    { "role": "user" },
                    {
                        "role": "user",
                        "content": [{
                            "type": "image_url",
                            "image_url": { "url": "https://pbs.twimg.com/media/chart.jpg" }
                        }]
                    }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body(r#"{"relevant": false}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Trend)
            .classify(&request())
            .await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_llm_retries_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body(r#"{"relevant": false}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Trend)
            .classify(&request())
            .await;
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_llm_three_failures_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .expect(3)
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Trend)
            .classify(&request())
            .await;

        match result {
            Err(IndicatorError::ClassificationUnavailable { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_llm_malformed_answer_is_parse_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("I cannot help with that")),
            )
            .expect(3)
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Trend)
            .classify(&request())
            .await;
        assert!(matches!(result, Err(IndicatorError::ClassificationParse(_))));
    }

    #[tokio::test]
    async fn test_llm_signal_mode() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body(&signal_json(0.9, Some(92000.0)))),
            )
            .mount(&server)
            .await;

        let result = classifier(&server, ClassificationMode::Signal)
            .with_min_confidence(dec!(0.95))
            .classify(&request())
            .await
            .unwrap();

        assert!(matches!(
            result,
            Classification::Signal(SignalVerdict::NotASignal { .. })
        ));
    }

    #[test]
    fn test_provider_from_config() {
        let config = crate::config::LlmConfig {
            provider: "deepseek".to_string(),
            api_key: "k".to_string(),
            model: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 1000,
            timeout_secs: 60,
        };
        let provider = LlmProvider::from_config(&config).unwrap();
        assert_eq!(provider.model(), "deepseek-chat");

        let unknown = crate::config::LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..config.clone()
        };
        assert!(matches!(
            LlmProvider::from_config(&unknown),
            Err(IndicatorError::Config(_))
        ));

        let compatible = crate::config::LlmConfig {
            provider: "compatible".to_string(),
            ..config
        };
        assert_err!(LlmProvider::from_config(&compatible));
    }
}
