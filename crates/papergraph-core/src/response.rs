//! Parsing of the model's raw reply into an [`Extraction`].

use thiserror::Error;

use crate::Extraction;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("response is not valid extraction JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Strip a surrounding triple-backtick fence and an optional `json` tag.
///
/// Text that does not start with a fence is returned trimmed but otherwise
/// unchanged. Only the content between the first two fences is kept.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = rest.split("```").next().unwrap_or("");
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

/// Parse a raw model reply. A missing `node` object is a parse failure.
pub fn parse_extraction(raw: &str) -> Result<Extraction, ParseError> {
    Ok(serde_json::from_str(strip_code_fence(raw))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "node": {"arxiv_id": "2401.00001", "title": "Graph Things", "year": 2023,
                 "methods": ["GNN"], "datasets": [], "metrics": ["F1"]},
        "edges": [{"target_arxiv_id": "paper_2", "relationship_type": "CITES", "reasoning": "ref [3]"}],
        "metadata": {"citation_count": 4}
    }"#;

    #[test]
    fn unfenced_passes_through() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn fenced_with_and_without_tag_match_unfenced() {
        let plain = parse_extraction(BODY).unwrap();
        let tagged = parse_extraction(&format!("```json\n{BODY}\n```")).unwrap();
        let untagged = parse_extraction(&format!("```\n{BODY}\n```")).unwrap();
        assert_eq!(plain, tagged);
        assert_eq!(plain, untagged);
        assert_eq!(plain.node.title, "Graph Things");
        assert_eq!(plain.edges.len(), 1);
        assert_eq!(plain.metadata.citation_count, 4);
    }

    #[test]
    fn trailing_chatter_after_fence_is_dropped() {
        let raw = format!("```json\n{BODY}\n```\nHope this helps!");
        assert_eq!(parse_extraction(&raw).unwrap().node.year, 2023);
    }

    #[test]
    fn missing_sections_default() {
        let extraction = parse_extraction(r#"{"node": {"title": "Only a title"}}"#).unwrap();
        assert_eq!(extraction.node.title, "Only a title");
        assert_eq!(extraction.node.authors, "");
        assert_eq!(extraction.node.year, 0);
        assert!(extraction.edges.is_empty());
        assert_eq!(extraction.metadata.citation_count, 0);
    }

    #[test]
    fn quoted_numbers_in_fenced_reply() {
        let reply = "```json\n{\"node\": {\"year\": \"2023\"}, \
                     \"edges\": [{\"target_arxiv_id\": 2401.00001}], \
                     \"metadata\": {\"citation_count\": \"n/a\"}}\n```";
        let extraction = parse_extraction(reply).unwrap();
        assert_eq!(extraction.node.year, 2023);
        assert_eq!(extraction.edges[0].target(), Some("2401.00001"));
        assert_eq!(extraction.metadata.citation_count, 0);
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(parse_extraction("Sorry, I cannot help with that.").is_err());
        assert!(parse_extraction("```json\n{\"node\": {\n```").is_err());
    }

    #[test]
    fn missing_node_is_error() {
        assert!(parse_extraction(r#"{"edges": []}"#).is_err());
    }
}
