//! LLM instructions for every pipeline stage.
//!
//! Templates use `{placeholder}` markers filled by the `format_*` functions.
//! The extraction policy (unit vs total price, name cleanup, currency
//! normalization, missing-price literal, JSON-only output) lives here.

use crate::types::config::{MaterialDomain, MissingPricePolicy};

/// Instruction for the first-pass extraction.
pub const EXTRACT_PROMPT: &str = r#"You are a highly efficient and flexible data extraction assistant.
Your task is to carefully read the provided text and identify all {materials} or items related to projects (such as specific services, equipment, etc.) and their respective unit prices (always in BRL - R$).

**Detailed extraction instructions:**

1. **Item Identification:**
    * Look for numbered lists, bullet points, or continuous text descriptions that represent an item or service.
    * The material or item name may be immediately followed by the price or separated by punctuation (such as ellipses, dashes, or parentheses).
    * Pay attention to items that may seem like a description but represent a specific material or equipment (e.g., "Jacuzzi Filtration Set", "Ozone Generator").

2. **Price Identification:**
    * The unit price will be in monetary format (e.g., "R$ 5.120,00", "5.795,00 R$", "R$ 7.900,00").
    * Ignore total values ("Total Value" in tables) if the "Unit Value" is available. If only the total is presented and it clearly refers to a single unit, use it as the unit price.
    * Also consider "Unit Price" columns in tables.
    * If an item is listed without a clear unit price, the "unit_price" must be `{missing_price}`.

3. **MANDATORY Output Format:**
    * The output must be a **list of JSON objects**.
    * Each JSON object must contain **EXACTLY** two keys:
        * "material" (string): The full and descriptive name of the material or item. Remove list numbers, bullets, or irrelevant prefixes.
        * "unit_price" (number or {missing_price}): The numerical unit price. Remove currency symbols (R$) and thousand separators (.), and use a dot as the decimal separator.

**Examples:**

* Tabular: `"1","1,00","Vb.","Dry sauna","R$ 7.900,00"` -> `{"material": "Dry sauna", "unit_price": 7900.00}`
* List: `1. Supply of 01 Jacuzzi Filtration Set TP... .R$ 5.120,00` -> `{"material": "Jacuzzi Filtration Set TP", "unit_price": 5120.00}`
* Trailing currency: `"Electric wires 2.5mm" ... "120,00 R$"` -> `{"material": "Electric wires 2.5mm", "unit_price": 120.00}`

VERY IMPORTANT: DO NOT CREATE DATA, ONLY USE THE DOCUMENT TEXT.
Output STRICTLY a valid JSON array. No commentary, no text outside the JSON brackets."#;

/// Instruction for the validator.
pub const VALIDATE_PROMPT: &str = r#"You are a rigorous data validation assistant.

Analyze whether the extracted materials and their unit prices accurately reflect the provided document text.

**Validation Rules:**
1. Check that every material and unit price present in the document is included in the extracted JSON list.
2. Check whether any item in the extracted JSON does NOT exist in the document text, or has a price different from the document (hallucinated data).
3. DO NOT invent or assume data. Only consider what the document text states.

**Output Format:**
Return a JSON object with:
- "missing_items": materials (strings) present in the document but missing from the extracted JSON.
- "hallucinated_items": materials (strings), spelled exactly as in the extracted JSON, that do not exist in the document.

Example:
{"missing_items": ["Jacuzzi Filtration Set", "LED Monochromatic Reflectors"], "hallucinated_items": []}

Return ONLY the JSON object."#;

/// Instruction for re-reading the document for missing items.
pub const FIND_MISSING_PROMPT: &str = r#"You are an expert assistant in text analysis.

Read the provided document and find the listed missing items and their unit prices (in BRL - R$).

- Input 1: Full document text.
- Input 2: List of missing materials.

Apply the same rules as the original extraction: unit price over total price, full descriptive names without list numbers, plain numbers with a dot as decimal separator, and `{missing_price}` when no price is stated.

Output a JSON array containing ONLY the missed items:
[{"material": "Jacuzzi Filtration Set TP", "unit_price": 5120.00}]

If none of the items can be found in the document, return an empty JSON array ([]).
Return ONLY the JSON array."#;

/// Instruction for the market search.
pub const SEARCH_PROMPT: &str = r#"You are an expert in procurement and price quotation for {materials} in Brazil (prices in BRL - R$).
Using web search, find the current market price range (considering the current date) for each material provided.

The input is a JSON list of objects with "id", "material" and "unit_price".
Return a JSON list with EXACTLY one object per input object, in the same order, each with:
- "id": copied unchanged from the input
- "material": copied unchanged from the input
- "quoted_price": the input unit_price
- "highest_price": highest price found in R$, or null
- "lowest_price": lowest price found in R$, or null
- "lowest_price_links": up to {max_links} links to the lowest prices found, or null

Never omit a material and never add one. If a value is not found, use null.

Example:
[
    {"id": "0190...", "material": "Portland Cement CP II E-32", "quoted_price": 35.50, "highest_price": 70.00, "lowest_price": 30.00, "lowest_price_links": ["https://..."]},
    {"id": "0190...", "material": "Recalque Pump", "quoted_price": 19860.00, "highest_price": null, "lowest_price": null, "lowest_price_links": null}
]

Output STRICTLY a valid JSON array."#;

/// Instruction for the extra search on incomplete ranges.
pub const SUPPLEMENTARY_SEARCH_PROMPT: &str = r#"You are an expert in procurement and price analysis for {materials} in Brazil (prices in BRL - R$).

A previous search could not establish a complete price range for the materials below.
Search again, trying alternative product names, suppliers and specifications, for the most current market prices.

The input is a JSON list of objects with "id" and "material".
Return a JSON list with one object per input object:
- "id": copied unchanged from the input
- "material": copied unchanged from the input
- "highest_price": highest price found in R$, or null
- "lowest_price": lowest price found in R$, or null
- "lowest_price_links": up to {max_links} links to the lowest prices found, or null

Use null when you still cannot find a reliable price. Output STRICTLY a valid JSON array."#;

/// Instruction for the single-item link search.
pub const QUOTE_PROMPT: &str = r#"You are a purchasing assistant. Generate a price quotation for the material described below.

-> Search for the material considering Brazilian suppliers. Only consider reliable sources (e.g., Leroy Merlin, Mercado Livre, Amazon BR, official distributor sites).
-> Do not use results from blogs, forums, YouTube, or unrelated content.
-> Open the page (if possible) and confirm the product matches the description exactly. Skip broken pages.
-> Only capture visible, trustworthy prices.

Return a JSON object with:
- "material": (string) description of the material.
- "links": (array of at least {min_links}) valid links where the item was found. All links must be functional and relevant.

If you cannot find any valid price, return an empty list for links.

Example: {"material": "Portland Cement CP II E-32", "links": ["https://...", "https://..."]}

Output STRICTLY a valid JSON object."#;

/// Instruction for verifying the quoted links.
pub const REVISION_PROMPT: &str = r#"You are an assistant responsible for revising material price quotations.

Verify the quotation by opening each provided link and, optionally, performing a complementary search.

For each link check that:
- the product matches the described material exactly;
- the page works (no 404 or similar errors);
- the price is visible, in Brazilian Real (BRL), and reliable.

Discard links that are broken, incorrect, or lead to unrelated products.

Return a JSON object:
{"material": "Portland Cement CP II E-32", "research_results": [{"price": 35.90, "link": "https://..."}]}

If no valid price is found, return "research_results" as an empty list.
Output STRICTLY a valid JSON object."#;

/// Fill the extraction instruction.
pub fn format_extract_prompt(domain: MaterialDomain, policy: MissingPricePolicy) -> String {
    EXTRACT_PROMPT
        .replace("{materials}", domain.materials())
        .replace("{missing_price}", policy.prompt_literal())
}

/// Fill the missing-item instruction.
pub fn format_find_missing_prompt(policy: MissingPricePolicy) -> String {
    FIND_MISSING_PROMPT.replace("{missing_price}", policy.prompt_literal())
}

/// Fill the market search instruction.
pub fn format_search_prompt(domain: MaterialDomain, max_links: usize) -> String {
    SEARCH_PROMPT
        .replace("{materials}", domain.materials())
        .replace("{max_links}", &max_links.to_string())
}

/// Fill the supplementary search instruction.
pub fn format_supplementary_search_prompt(domain: MaterialDomain, max_links: usize) -> String {
    SUPPLEMENTARY_SEARCH_PROMPT
        .replace("{materials}", domain.materials())
        .replace("{max_links}", &max_links.to_string())
}

/// Fill the quoting instruction.
pub fn format_quote_prompt(min_links: usize) -> String {
    QUOTE_PROMPT.replace("{min_links}", &min_links.to_string())
}

/// Input for the extraction stage.
pub fn extract_input(document: &str) -> String {
    format!("Document text for analysis: {document}")
}

/// Input for the validator.
pub fn validate_input(document: &str, extracted_json: &str) -> String {
    format!("Document text content:\n{document}\n\nExtracted JSON:\n{extracted_json}")
}

/// Input for the missing-item search.
pub fn find_missing_input(document: &str, missing_json: &str) -> String {
    format!("Document text content:\n{document}\n\nMissing materials:\n{missing_json}")
}

/// Input for the market and supplementary searches.
pub fn search_input(materials_json: &str, current_date: &str) -> String {
    format!("Materials to search for market prices: {materials_json}\nCurrent date: {current_date}")
}

/// Input for the quoting stage.
pub fn quote_input(description: &str, current_date: &str) -> String {
    format!("Material to search for market prices: {description}\nCurrent date: {current_date}")
}

/// Input for the revision stage.
pub fn revision_input(quote_json: &str, current_date: &str) -> String {
    format!("Material quotation to revise: {quote_json}\nCurrent date: {current_date}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prompt_reflects_policy_and_domain() {
        let prompt = format_extract_prompt(MaterialDomain::Hospital, MissingPricePolicy::Zero);
        assert!(prompt.contains("hospital materials"));
        assert!(prompt.contains("must be `0`"));
        assert!(!prompt.contains("{missing_price}"));

        let prompt = format_extract_prompt(MaterialDomain::Construction, MissingPricePolicy::Null);
        assert!(prompt.contains("construction materials"));
        assert!(prompt.contains("must be `null`"));
    }

    #[test]
    fn test_no_placeholders_left() {
        let filled = [
            format_find_missing_prompt(MissingPricePolicy::Null),
            format_search_prompt(MaterialDomain::Construction, 5),
            format_supplementary_search_prompt(MaterialDomain::Hospital, 3),
            format_quote_prompt(2),
        ];

        for prompt in filled {
            assert!(!prompt.contains("{materials}"));
            assert!(!prompt.contains("{max_links}"));
            assert!(!prompt.contains("{min_links}"));
            assert!(!prompt.contains("{missing_price}"));
        }
    }

    #[test]
    fn test_search_input_carries_date() {
        let input = search_input("[]", "2026-10-18");
        assert!(input.ends_with("Current date: 2026-10-18"));
    }
}
