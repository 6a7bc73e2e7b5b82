//! Lenient recovery of the candidate-group array from model output.

use courtscout_shared::{CandidateGroup, CourtScoutError, Result};
use serde_json::Value;

/// Slice from the first `[` to the last `]`, inclusive.
///
/// No bracket balancing: the model is expected to wrap its answer in at most
/// one array per reply.
pub fn locate_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse every element of the located array into a [`CandidateGroup`].
///
/// Returns [`CourtScoutError::MalformedResponse`] when no array can be located
/// or the slice is not valid JSON; callers treat that as zero groups.
pub fn parse_candidate_groups(text: &str) -> Result<Vec<CandidateGroup>> {
    let slice = locate_array(text)
        .ok_or_else(|| CourtScoutError::malformed("no array markers in response"))?;

    let value: Value = serde_json::from_str(slice)
        .map_err(|e| CourtScoutError::malformed(format!("array is not valid JSON: {e}")))?;

    match value {
        Value::Array(elements) => Ok(elements.iter().map(CandidateGroup::from_json).collect()),
        _ => Err(CourtScoutError::malformed("located payload is not an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_array_inside_prose() {
        let text = "Here you go:\n```json\n[{\"success\": true}]\n```\nDone.";
        assert_eq!(locate_array(text), Some("[{\"success\": true}]"));
    }

    #[test]
    fn no_markers_or_reversed_markers() {
        assert_eq!(locate_array("no array here"), None);
        assert_eq!(locate_array("] before ["), None);
        assert_eq!(locate_array("only [ open"), None);
    }

    #[test]
    fn parses_groups_from_wrapped_object() {
        let text = r#"{"courts": [
            {"success": true, "basketball_court": {"name": "A"}, "court_units": [{"unit_name": "1"}]},
            {"success": false, "basketball_court": {"name": "B"}}
        ]}"#;
        let groups = parse_candidate_groups(text).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].success);
        assert_eq!(groups[0].children.len(), 1);
        assert!(!groups[1].success);
    }

    #[test]
    fn malformed_text_is_an_error_not_a_panic() {
        for text in ["", "nothing", "[{\"success\": tru", "[1, 2,]"] {
            let err = parse_candidate_groups(text).unwrap_err();
            assert!(
                matches!(err, CourtScoutError::MalformedResponse { .. }),
                "{text:?}"
            );
        }
    }

    #[test]
    fn first_to_last_slice_spans_two_arrays() {
        // Two separate arrays produce an invalid slice rather than the first array.
        let text = "[{\"success\": true}] and also [{\"success\": true}]";
        assert!(parse_candidate_groups(text).is_err());
    }

    #[test]
    fn every_element_yields_a_group() {
        let groups = parse_candidate_groups("[1, \"x\", {\"success\": true}]").unwrap();
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| !g.success));
    }

    #[test]
    fn empty_array_is_zero_groups() {
        assert!(parse_candidate_groups("[]").unwrap().is_empty());
    }
}
