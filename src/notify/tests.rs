//! Tests for notify module

#[cfg(test)]
mod tests {
    use super::super::{format_signal, Notifier};
    use crate::classifier::{Direction, DurationUnit, SignalDuration, Timeframe, TradingSignal};
    use crate::config::TelegramConfig;
    use crate::types::Post;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post() -> Post {
        Post {
            id: "p1".to_string(),
            author_id: "44196397".to_string(),
            author_screen_name: "crypto_chartist".to_string(),
            text: "BTC long".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
            media: Vec::new(),
            processed: false,
        }
    }

    fn signal(direction: Direction) -> TradingSignal {
        TradingSignal {
            post_id: "p1".to_string(),
            direction,
            entry: dec!(94000),
            take_profit: dec!(99000),
            stop_loss: dec!(91500),
            confidence: dec!(0.82),
            timeframe: Some(Timeframe {
                horizon: Some("short".to_string()),
                duration: Some(SignalDuration {
                    value: dec!(2),
                    unit: DurationUnit::Day,
                }),
            }),
            reasoning: "reclaim of <range> high".to_string(),
            indicated_at: Utc.with_ymd_and_hms(2025, 1, 10, 9, 5, 0).unwrap(),
        }
    }

    #[test]
    fn test_from_config_requires_token_and_chat() {
        assert!(!Notifier::from_config(None).is_enabled());

        let blank = TelegramConfig {
            bot_token: String::new(),
            chat_id: "-100".to_string(),
        };
        assert!(!Notifier::from_config(Some(&blank)).is_enabled());

        let full = TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-100".to_string(),
        };
        assert!(Notifier::from_config(Some(&full)).is_enabled());
    }

    #[test]
    fn test_format_long_signal() {
        let text = format_signal(&post(), &signal(Direction::Long));

        assert!(text.contains("LONG"));
        assert!(text.contains("@crypto_chartist"));
        assert!(text.contains("<code>94000</code>"));
        assert!(text.contains("<code>82%</code>"));
        assert!(text.contains("short"));
        // Reasoning is escaped for HTML parse mode
        assert!(text.contains("&lt;range&gt;"));
    }

    #[test]
    fn test_format_short_signal_falls_back_to_author_id() {
        let mut p = post();
        p.author_screen_name.clear();
        let text = format_signal(&p, &signal(Direction::Short));

        assert!(text.contains("SHORT"));
        assert!(text.contains("44196397"));
    }

    #[test]
    fn test_format_signal_truncates_long_reasoning() {
        let mut s = signal(Direction::Long);
        s.reasoning = "é".repeat(400);
        let text = format_signal(&post(), &s);

        assert!(text.ends_with(&format!("{}...", "é".repeat(300))));
        assert!(!text.contains(&"é".repeat(301)));
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = Notifier::disabled().with_api_base(server.uri());
        assert!(notifier.send("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_signal_posts_to_bot_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "-100", "parse_mode": "HTML" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            Notifier::new("123:abc".to_string(), "-100".to_string()).with_api_base(server.uri());
        let result = notifier
            .signal_accepted(&post(), &signal(Direction::Long))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_message_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
            .mount(&server)
            .await;

        let notifier =
            Notifier::new("123:abc".to_string(), "-1".to_string()).with_api_base(server.uri());
        let err = notifier.error("sweep", "store offline").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
