//! Pipeline stages and the orchestrator that chains them.

pub mod analyze;
pub mod call;
pub mod checker;
pub mod extract;
pub mod prompts;
pub mod quoting;
pub mod reconcile;
pub mod response;
pub mod search;

pub use analyze::{analyze_prices, classify, percentage_variation};
pub use call::RunContext;
pub use checker::PriceChecker;
pub use extract::{extract_candidates, parse_brl};
pub use quoting::quote_material;
pub use reconcile::{merge_candidates, reconcile, remove_hallucinated};
pub use response::{parse_json, parse_json_as};
pub use search::{match_quotes, search_market_prices};
