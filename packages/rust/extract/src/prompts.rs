//! Prompt text for court extraction.
//!
//! The output contract is generated from the record field tables so the model
//! is always asked for exactly the fields the store and exporter understand.

use std::fmt::Write;

use courtscout_shared::{COURT_FIELDS, FieldSpec, Location, UNIT_FIELDS, prompted_fields};

/// Placeholder used in the per-round summary when a court has no name.
pub const MISSING_NAME: &str = "N/A";

fn describe_fields(out: &mut String, title: &str, schema: &'static [FieldSpec]) {
    let _ = writeln!(out, "# {title} fields");
    out.push_str("{\n");
    for spec in prompted_fields(schema) {
        let _ = writeln!(
            out,
            "  {}: {}, // {}",
            spec.name,
            spec.kind.type_hint(),
            spec.description
        );
    }
    out.push_str("}\n\n");
}

/// The fixed output-schema contract shared by every extraction prompt.
pub fn schema_contract() -> String {
    let mut out = String::new();
    describe_fields(&mut out, "basketball_court", COURT_FIELDS);
    describe_fields(&mut out, "court_units", UNIT_FIELDS);
    out.push_str(
        "# Output format\n\
         [\n\
         \x20 {\n\
         \x20   \"success\": whether this court was extracted successfully, true/false,\n\
         \x20   \"basketball_court\": {basketball_court fields...},\n\
         \x20   \"court_units\": [ {court_units fields...}, ... ]\n\
         \x20 }, ...\n\
         ]\n\n\
         # Rules\n\
         1. Output only the JSON above, nothing else.\n\
         2. Field names, types and structure must match the definitions exactly.\n\
         3. One input may describe several courts, each with several units. If the number \
         of units cannot be told apart, assume one full court.\n\
         4. Set every field you could not find to an empty string.\n\
         5. Never invent information.\n",
    );
    out
}

// ---------------------------------------------------------------------------
// Conversational mode
// ---------------------------------------------------------------------------

pub fn conversation_system_prompt() -> String {
    "You are a basketball court search assistant. Your task is to find free public \
     basketball courts in the requested area by searching the web."
        .to_string()
}

/// First user turn: target area, query, batch size, the schema contract and the stop rule.
pub fn conversation_initial_prompt(
    location: &Location,
    query: &str,
    batch_hint: u32,
    termination_phrase: &str,
) -> String {
    format!(
        "Search the web for free basketball courts in {area}.\n\
         Search keywords: {query}\n\
         Return at most {batch_hint} courts per reply.\n\n\
         {contract}\n\
         If there is no more information, reply exactly: {termination_phrase}",
        area = location.label(),
        contract = schema_contract(),
    )
}

/// Compact assistant turn that stands in for a whole round's reply.
pub fn round_summary<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names
        .into_iter()
        .map(|n| if n.trim().is_empty() { MISSING_NAME } else { n })
        .collect();
    format!(
        "This round found the following {} courts: {}",
        names.len(),
        names.join(", ")
    )
}

pub fn continue_prompt(location: &Location, termination_phrase: &str) -> String {
    format!(
        "Continue searching for more free basketball courts in {}. \
         If there is no more information, reply exactly: {termination_phrase}",
        location.label()
    )
}

// ---------------------------------------------------------------------------
// Page mode
// ---------------------------------------------------------------------------

pub fn page_system_prompt() -> String {
    "You extract basketball court information from web page text into structured JSON."
        .to_string()
}

/// Single-shot prompt for one page's (already truncated) text.
pub fn page_extraction_prompt(content: &str) -> String {
    format!(
        "Extract every basketball court and its units described in the input below.\n\n\
         {contract}\n\
         # Input\n\
         {content}\n",
        contract = schema_contract(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_lists_prompted_fields_only() {
        let contract = schema_contract();
        assert!(contract.contains("  name: str, // venue name"));
        assert!(contract.contains("  is_free: int,"));
        assert!(contract.contains("  latitude: float,"));
        assert!(contract.contains("  rim_height_cm: int,"));
        assert!(!contract.contains("gmt_create"));
        assert!(!contract.contains("creator_id"));
        assert!(contract.contains("\"court_units\""));
    }

    #[test]
    fn initial_prompt_carries_stop_rule() {
        let loc = Location::new("浙江省", "杭州市", "临平区");
        let prompt = conversation_initial_prompt(&loc, "临平区免费篮球场", 5, "没有了");
        assert!(prompt.contains("浙江省杭州市临平区"));
        assert!(prompt.contains("at most 5 courts"));
        assert!(prompt.trim_end().ends_with("没有了"));
    }

    #[test]
    fn summary_lists_names_with_placeholder() {
        let summary = round_summary(["A场", "", "公园球场"]);
        assert_eq!(
            summary,
            "This round found the following 3 courts: A场, N/A, 公园球场"
        );
        assert_eq!(
            round_summary(std::iter::empty()),
            "This round found the following 0 courts: "
        );
    }
}
