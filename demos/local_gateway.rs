//! Run the gateway against an in-process translator.
//!
//! Reads `LINGUA_*` variables, so pointing `LINGUA_REDIS_URL` at a Redis
//! instance switches the demo to shared state.
//!
//! ```text
//! RUST_LOG=lingua_gate=debug cargo run --example local_gateway
//! ```

use async_trait::async_trait;
use lingua_gate::{
    init_tracing, ClientIdentity, GatewayBuilder, GatewayConfig, LogFormat, SessionId, Style,
    TranslateCall, Translation, TranslationRequest, Translator, TranslatorError,
};
use std::sync::Arc;
use std::time::Duration;

/// Reverses words, slowly.
#[derive(Debug)]
struct ReversingTranslator;

#[async_trait]
impl Translator for ReversingTranslator {
    async fn translate(&self, call: TranslateCall<'_>) -> Result<Translation, TranslatorError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let reversed: Vec<&str> = call.text.split_whitespace().rev().collect();
        Ok(Translation {
            translated_text: format!("[{}/{}] {}", call.target_lang, call.style, reversed.join(" ")),
            confidence: 0.5,
            model_used: "reverser-v1".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info", LogFormat::Text)?;

    let config = GatewayConfig {
        rate_limit: 5,
        ..GatewayConfig::from_env()?
    };
    let runtime = GatewayBuilder::new(config)
        .with_translator(Arc::new(ReversingTranslator))
        .build()
        .await?;
    println!("backing mode: {}", runtime.mode());

    let client = ClientIdentity::new("127.0.0.1");
    let session = SessionId::new("demo");
    let lines = [
        "good morning everyone",
        "how are you today",
        "Good   Morning everyone",
        "see you tomorrow",
    ];

    for line in lines {
        let request = TranslationRequest::new(client.clone(), line, "es")
            .with_style(Style::Casual)
            .with_session(session.clone(), false);
        match runtime.gateway().handle(request).await {
            Ok(response) => println!(
                "{:<28} -> {:<40} {:?} in {:?}",
                line, response.translated_text, response.origin, response.elapsed
            ),
            Err(e) => println!("{:<28} -> error {}: {}", line, e.status_code(), e),
        }
    }

    // Exceed the limit
    for i in 0..3 {
        let request = TranslationRequest::new(client.clone(), format!("extra {}", i), "fr");
        if let Err(e) = runtime.gateway().handle(request).await {
            println!("extra {} -> error {}: {}", i, e.status_code(), e);
        }
    }

    let stats = runtime.metrics().snapshot();
    println!(
        "admitted={} denied={} hit_rate={:.2} translations={}",
        stats.requests_admitted,
        stats.requests_denied,
        stats.cache_hit_rate(),
        stats.translations_started
    );

    runtime.shutdown().await?;
    Ok(())
}
