//! Integration tests for the quote analysis and quoting flows.
//!
//! These drive `PriceChecker` end to end against a scripted gateway:
//! 1. Extract candidates from document text
//! 2. Reconcile against the validator
//! 3. Research market ranges
//! 4. Classify, with a supplementary search for incomplete ranges

use std::collections::HashMap;
use std::sync::Arc;

use price_check::{
    parse_json, testing::MockGateway, AgentRequest, AnalysisSummary, GatewayFailure,
    LimitedGateway, MarketStatus, PipelineConfig, PipelineError, PriceChecker, RetryConfig,
    RetryingGateway, Stage,
};

const DOCUMENT: &str = r#"ORÇAMENTO 0423/2026
1. Cimento Portland CP II E-32 (saco 50kg) ........ R$ 35,50
2. Areia média lavada (m³) ........................ R$ 140,00
3. Bomba de recalque 1cv ........................... R$ 19.860,00
4. Gerador de Ozônio .............................. 5.795,00 R$
"#;

const CLEAN_REPORT: &str = r#"{"missing_items": [], "hallucinated_items": []}"#;

const DATE: &str = "2026-10-18";

/// Answer a search request by echoing each entry's id with a known range.
fn market_handler(
    ranges: Vec<(&'static str, Option<f64>, Option<f64>)>,
) -> impl Fn(&AgentRequest) -> Result<String, GatewayFailure> + Send + Sync + 'static {
    let ranges: HashMap<String, (Option<f64>, Option<f64>)> = ranges
        .into_iter()
        .map(|(name, high, low)| (name.to_lowercase(), (high, low)))
        .collect();

    move |request: &AgentRequest| {
        let entries = parse_json(&request.input)
            .map_err(|e| GatewayFailure::other(e.to_string()))?;
        let answers: Vec<serde_json::Value> = entries
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                let material = entry["material"].as_str().unwrap_or_default().to_string();
                let (high, low) = ranges
                    .get(&material.to_lowercase())
                    .copied()
                    .unwrap_or((None, None));
                serde_json::json!({
                    "id": entry["id"],
                    "material": material,
                    "quoted_price": entry["unit_price"],
                    "highest_price": high,
                    "lowest_price": low,
                    "lowest_price_links": high.map(|_| vec!["https://www.leroymerlin.com.br/p/1"]),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(answers).to_string())
    }
}

fn extraction_answer() -> &'static str {
    r#"```json
[
    {"material": "Cimento Portland CP II E-32 (saco 50kg)", "unit_price": 35.50},
    {"material": "Areia média lavada (m³)", "unit_price": 140.00},
    {"material": "Bomba de recalque 1cv", "unit_price": "R$ 19.860,00"},
    {"material": "Piscina olímpica", "unit_price": 1000.00}
]
```"#
}

#[tokio::test]
async fn test_full_quote_analysis() {
    let gateway = MockGateway::new()
        .with_response(Stage::Extraction, extraction_answer())
        .with_response(
            Stage::Validation,
            r#"{"missing_items": ["Gerador de Ozônio"], "hallucinated_items": ["Piscina olímpica"]}"#,
        )
        .with_response(
            Stage::FindMissing,
            r#"[{"material": "Gerador de Ozônio", "unit_price": 5795.00}]"#,
        )
        .with_response(Stage::Validation, CLEAN_REPORT)
        .with_handler(
            Stage::MarketSearch,
            market_handler(vec![
                ("Cimento Portland CP II E-32 (saco 50kg)", Some(70.0), Some(30.0)),
                ("Areia média lavada (m³)", Some(70.0), Some(62.0)),
                ("Bomba de recalque 1cv", None, None),
                ("Gerador de Ozônio", Some(6000.0), Some(5500.0)),
            ]),
        )
        .with_handler(
            Stage::SupplementarySearch,
            market_handler(vec![("Bomba de recalque 1cv", Some(21000.0), Some(18000.0))]),
        );
    let checker = PriceChecker::new(gateway);

    let items = checker.analyze_quote(DOCUMENT, DATE).await.unwrap();

    let names: Vec<&str> = items.iter().map(|i| i.material.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Cimento Portland CP II E-32 (saco 50kg)",
            "Areia média lavada (m³)",
            "Bomba de recalque 1cv",
            "Gerador de Ozônio",
        ]
    );

    assert_eq!(items[0].status, MarketStatus::WithinMarket);
    assert_eq!(items[0].percentage_variation, Some(-29.0));
    assert_eq!(items[1].status, MarketStatus::AboveMarket);
    assert_eq!(items[2].status, MarketStatus::WithinMarket);
    assert_eq!(items[2].quoted_price, Some(19860.0));
    assert_eq!(items[3].status, MarketStatus::WithinMarket);

    let summary = AnalysisSummary::from_items(&items);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.above_market, 1);
    assert_eq!(summary.flagged.len(), 1);

    // One session for every call in the run.
    let calls = checker.gateway().calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.iter().all(|c| c.session_id == calls[0].session_id));
    assert_eq!(calls[0].agent, "extractor_agent");
    assert!(calls
        .iter()
        .filter(|c| matches!(c.stage, Stage::MarketSearch | Stage::SupplementarySearch))
        .all(|c| c.tools.contains(&price_check::ToolCapability::WebSearch)));
}

#[tokio::test]
async fn test_each_run_gets_its_own_session() {
    let gateway = MockGateway::new()
        .with_default_response(Stage::Extraction, "[]")
        .with_default_response(Stage::Validation, CLEAN_REPORT);
    let checker = PriceChecker::new(gateway);

    checker.analyze_quote("doc one", DATE).await.unwrap();
    checker.analyze_quote("doc two", DATE).await.unwrap();

    let calls = checker.gateway().calls();
    assert_eq!(calls.len(), 4);
    assert_ne!(calls[0].session_id, calls[2].session_id);
}

#[tokio::test]
async fn test_search_dropping_an_item_is_fatal() {
    let gateway = MockGateway::new()
        .with_response(
            Stage::Extraction,
            r#"[{"material": "Cimento", "unit_price": 35.5}, {"material": "Areia", "unit_price": 80.0}]"#,
        )
        .with_response(Stage::Validation, CLEAN_REPORT)
        .with_response(
            Stage::MarketSearch,
            r#"[{"material": "Cimento", "highest_price": 70.0, "lowest_price": 30.0}]"#,
        );
    let checker = PriceChecker::new(gateway);

    let err = checker.analyze_quote(DOCUMENT, DATE).await.unwrap_err();

    match err {
        PipelineError::CorrespondenceMismatch { missing, .. } => {
            assert_eq!(missing, vec!["Areia".to_string()]);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_overload_surfaces_with_stage() {
    let gateway = MockGateway::new()
        .with_response(Stage::Extraction, r#"[{"material": "Cimento", "unit_price": 35.5}]"#)
        .with_response(Stage::Validation, CLEAN_REPORT)
        .with_failure(Stage::MarketSearch, GatewayFailure::overloaded("503: Model overloaded"));
    let checker = PriceChecker::new(gateway);

    let err = checker.analyze_quote(DOCUMENT, DATE).await.unwrap_err();

    assert!(err.is_overloaded());
    assert_eq!(err.stage(), Some(Stage::MarketSearch));
}

#[tokio::test]
async fn test_retrying_gateway_absorbs_overload() {
    let mock = MockGateway::new()
        .with_failure(Stage::Extraction, GatewayFailure::overloaded("503 UNAVAILABLE"))
        .with_response(Stage::Extraction, "[]")
        .with_response(Stage::Validation, CLEAN_REPORT);
    let retry = RetryConfig::default()
        .with_base_delay(std::time::Duration::from_millis(1))
        .with_max_delay(std::time::Duration::from_millis(2));
    let checker = PriceChecker::new(RetryingGateway::with_config(mock, retry));

    let items = checker.analyze_quote(DOCUMENT, DATE).await.unwrap();

    assert!(items.is_empty());
    assert_eq!(checker.gateway().inner().calls_for(Stage::Extraction), 2);
}

#[tokio::test]
async fn test_exhausted_reconciliation_stops_the_run() {
    let gateway = MockGateway::new()
        .with_response(Stage::Extraction, r#"[{"material": "Cimento", "unit_price": 35.5}]"#)
        .with_default_response(
            Stage::Validation,
            r#"{"missing_items": ["Gerador de Ozônio"], "hallucinated_items": []}"#,
        )
        .with_default_response(Stage::FindMissing, "[]");
    let checker = PriceChecker::new(gateway);

    let err = checker.analyze_quote(DOCUMENT, DATE).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ReconciliationExhausted { rounds: 3, .. }
    ));
    assert_eq!(checker.gateway().calls_for(Stage::MarketSearch), 0);
}

#[tokio::test]
async fn test_analyze_many_keeps_order_and_isolates_failures() {
    let gateway = MockGateway::new()
        .with_handler(Stage::Extraction, |request| {
            if request.input.contains("broken") {
                Ok("no materials here".to_string())
            } else {
                Ok("[]".to_string())
            }
        })
        .with_default_response(Stage::Validation, CLEAN_REPORT);
    let checker = PriceChecker::with_config(
        LimitedGateway::new(gateway, 2),
        PipelineConfig::default().with_max_concurrent_runs(2),
    );
    let documents = vec![
        "first".to_string(),
        "broken".to_string(),
        "third".to_string(),
    ];

    let results = checker.analyze_many(&documents, DATE).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(PipelineError::Parse {
            stage: Stage::Extraction,
            ..
        })
    ));
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn test_quote_material_flow() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_response(
                Stage::Quoting,
                r#"{"material": "Cimento CP II 50kg", "links": ["https://a.com.br/1", "https://b.com.br/2", "https://c.com.br/3"]}"#,
            )
            .with_response(
                Stage::QuoteRevision,
                r#"{"material": "Cimento CP II 50kg", "research_results": [
                    {"price": 38.90, "link": "https://a.com.br/1"},
                    {"price": 32.50, "link": "https://b.com.br/2"},
                    {"price": 0.0, "link": "broken"}
                ]}"#,
            ),
    );
    let checker = PriceChecker::new(gateway.clone());

    let quotation = checker
        .quote_material("Cimento CP II 50kg", DATE, 3)
        .await
        .unwrap();

    assert_eq!(quotation.material, "Cimento CP II 50kg");
    assert_eq!(quotation.highest_price, Some(38.9));
    assert_eq!(quotation.lowest_price, Some(32.5));
    assert_eq!(quotation.research_results.len(), 2);
    assert_eq!(gateway.calls().len(), 2);

    let json = serde_json::to_value(&quotation).unwrap();
    assert!(json["research_results"].is_array());
}
