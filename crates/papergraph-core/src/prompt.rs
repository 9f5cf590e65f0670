//! Fixed extraction prompt.

/// Number of leading document characters embedded in the prompt.
pub const MAX_PROMPT_CHARS: usize = 15_000;

/// Return the first `max_chars` characters of `text` (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build the extraction prompt for one paper.
///
/// The JSON example echoes `arxiv_id` back to the model, but whatever it
/// returns there is discarded at persistence time.
pub fn build_prompt(arxiv_id: &str, text: &str, max_chars: usize) -> String {
    let excerpt = truncate_chars(text, max_chars);
    format!(
        r#"
Extract information from this research paper and return ONLY valid JSON (no markdown):

{{
  "node": {{
    "arxiv_id": "{arxiv_id}",
    "title": "paper title",
    "authors": "author names",
    "year": 2024,
    "summary": "brief summary (1-2 sentences)",
    "methods": ["method1", "method2"],
    "datasets": ["dataset1"],
    "metrics": ["metric1"],
    "project_page": "",
    "pdf_link": ""
  }},
  "edges": [
    {{"target_arxiv_id": "related_paper_id", "relationship_type": "CITES", "reasoning": "why"}},
    {{"target_arxiv_id": "another_paper_id", "relationship_type": "BUILDS_ON", "reasoning": "explanation"}}
  ],
  "metadata": {{"citation_count": 0}}
}}

Paper text (first {max_chars} chars):
{excerpt}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn prompt_embeds_id_and_excerpt() {
        let text = "x".repeat(20_000);
        let prompt = build_prompt("paper_7", &text, MAX_PROMPT_CHARS);
        assert!(prompt.contains(r#""arxiv_id": "paper_7""#));
        assert!(prompt.contains("Paper text (first 15000 chars):"));
        assert!(prompt.contains(&"x".repeat(MAX_PROMPT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_PROMPT_CHARS + 1)));
    }

    #[test]
    fn example_shape_is_valid_json_template() {
        let prompt = build_prompt("paper_1", "", MAX_PROMPT_CHARS);
        let start = prompt.find('{').unwrap();
        let end = prompt.rfind('}').unwrap();
        let example: serde_json::Value = serde_json::from_str(&prompt[start..=end]).unwrap();
        assert_eq!(example["node"]["arxiv_id"], "paper_1");
        assert_eq!(example["edges"][1]["relationship_type"], "BUILDS_ON");
        assert_eq!(example["metadata"]["citation_count"], 0);
    }
}
