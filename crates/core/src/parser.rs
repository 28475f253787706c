//! Response parsing against a prompt's output contract.
//!
//! The default parser extracts `<tag>...</tag>` blocks, level-1 fenced
//! ```` ```tag ... ``` ```` blocks, and `<SIGNAL>` markers from a response.
//! Any missing tag fails the parse with a single error listing every problem.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

/// A parser turns response text into structured output or a contract violation.
///
/// The second argument carries per-call parser arguments supplied by the caller.
pub type ResponseParser =
    Arc<dyn Fn(&str, &Map<String, Value>) -> Result<Map<String, Value>, ParseError> + Send + Sync>;

/// Tag sets driving the default parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagParser {
    #[serde(default)]
    pub xml_tags: Vec<String>,
    #[serde(default)]
    pub md_tags: Vec<String>,
    #[serde(default)]
    pub signal_tags: Vec<String>,
    #[serde(default)]
    pub required_xml_tags: Vec<String>,
    #[serde(default)]
    pub required_md_tags: Vec<String>,
}

impl TagParser {
    /// True when no tag is declared, i.e. parsing would accept anything.
    pub fn is_empty(&self) -> bool {
        self.xml_tags.is_empty()
            && self.md_tags.is_empty()
            && self.signal_tags.is_empty()
            && self.required_xml_tags.is_empty()
            && self.required_md_tags.is_empty()
    }

    pub fn parse(&self, text: &str) -> Result<Map<String, Value>, ParseError> {
        let mut errors = Vec::new();
        let mut xml_blocks = Map::new();
        let mut md_blocks = Map::new();

        for tag in &self.xml_tags {
            let found = find_xml_blocks(text, tag);
            if found.is_empty() {
                errors.push(format!(
                    "No {tag} tags found, it should be provided as <{tag}>...</{tag}>"
                ));
            }
            xml_blocks.insert(tag.clone(), strings(found));
        }
        for tag in &self.md_tags {
            let found = find_md_blocks(text, tag);
            if found.is_empty() {
                errors.push(format!(
                    "No {tag} tags found, it should be provided as ```{tag} ... ```"
                ));
            }
            md_blocks.insert(tag.clone(), strings(found));
        }
        for tag in &self.required_xml_tags {
            if xml_blocks.contains_key(tag) {
                continue;
            }
            let found = find_xml_blocks(text, tag);
            if found.is_empty() {
                errors.push(format!(
                    "Required {tag} tag not found, it should be provided as <{tag}>...</{tag}>"
                ));
            }
            xml_blocks.insert(tag.clone(), strings(found));
        }
        for tag in &self.required_md_tags {
            if md_blocks.contains_key(tag) {
                continue;
            }
            let found = find_md_blocks(text, tag);
            if found.is_empty() {
                errors.push(format!(
                    "Required {tag} tag not found, it should be provided as ```{tag} ... ```"
                ));
            }
            md_blocks.insert(tag.clone(), strings(found));
        }

        if !errors.is_empty() {
            return Err(ParseError(format!("Parsing errors:\n{}", errors.join("\n"))));
        }

        let mut parsed = Map::new();
        parsed.insert("raw".into(), Value::String(text.to_string()));
        parsed.insert("xml_tags".into(), Value::Object(xml_blocks));
        parsed.insert("md_tags".into(), Value::Object(md_blocks));
        for tag in &self.signal_tags {
            parsed.insert(tag.clone(), Value::Bool(text.contains(&format!("<{tag}>"))));
        }
        Ok(parsed)
    }

    /// Wrap this tag set as a [`ResponseParser`].
    pub fn into_parser(self) -> ResponseParser {
        Arc::new(move |text: &str, _: &Map<String, Value>| self.parse(text))
    }
}

fn strings(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

/// All `<tag>...</tag>` block bodies, in order of appearance.
pub fn find_xml_blocks(text: &str, tag: &str) -> Vec<String> {
    let tag = regex_lite::escape(tag);
    let pattern = format!("(?s)<{tag}>(.*?)</{tag}>");
    let Ok(re) = regex_lite::Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Bodies of level-1 fenced blocks opened with ```` ```tag ````, trimmed.
pub fn find_md_blocks(text: &str, tag: &str) -> Vec<String> {
    let opener = format!("```{tag}");
    find_level1_blocks(text)
        .into_iter()
        .filter(|block| block.starts_with(&opener))
        .map(|block| block[opener.len()..block.len() - 3].trim().to_string())
        .collect()
}

/// Outermost fenced blocks, from their opening fence through the closing fence.
///
/// An opening fence is ```` ``` ```` immediately followed by a non-space label; a
/// closing fence is a bare ```` ``` ```` followed by whitespace or end of text.
/// Nested labelled fences are matched as a stack, so only outermost blocks are kept.
pub fn find_level1_blocks(text: &str) -> Vec<&str> {
    let mut opens = Vec::new();
    let mut closes = Vec::new();
    for (pos, _) in text.match_indices("```") {
        let rest = &text[pos + 3..];
        match rest.chars().next() {
            None => closes.push(pos),
            Some(c) if c.is_whitespace() => closes.push(pos),
            Some('`') => {}
            Some(_) => opens.push(pos),
        }
    }

    let mut blocks: Vec<(usize, usize)> = Vec::new();
    let mut stack = Vec::new();
    let (mut i, mut j) = (0, 0);
    let mut last_end: Option<usize> = None;
    while i < opens.len() || j < closes.len() {
        if i < opens.len() && (j >= closes.len() || opens[i] < closes[j]) {
            stack.push(opens[i]);
            i += 1;
            continue;
        }
        if let Some(start) = stack.pop() {
            if stack.is_empty() {
                let end = closes[j] + 3;
                if last_end.is_none_or(|last| start > last) {
                    blocks.push((start, end));
                    last_end = Some(end);
                }
            }
        }
        j += 1;
    }
    blocks.into_iter().map(|(s, e)| &text[s..e]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_blocks_are_found_in_order() {
        let text = "<answer>one</answer> noise <answer>\ntwo\n</answer>";
        assert_eq!(find_xml_blocks(text, "answer"), vec!["one", "\ntwo\n"]);
        assert!(find_xml_blocks(text, "other").is_empty());
    }

    #[test]
    fn md_blocks_only_level_one() {
        let text = "intro\n```json\n{\"a\": 1}\n```\nthen\n```python\nprint(1)\n```\n";
        assert_eq!(find_md_blocks(text, "json"), vec!["{\"a\": 1}"]);
        assert_eq!(find_md_blocks(text, "python"), vec!["print(1)"]);
    }

    #[test]
    fn nested_fences_keep_outer_block() {
        let text = "```markdown\nouter\n```python\ninner\n```\nstill outer\n```\n";
        let blocks = find_level1_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].starts_with("```markdown"));
        assert!(blocks[0].contains("still outer"));
    }

    #[test]
    fn closing_fence_at_end_of_text() {
        let text = "```json\n[1]\n```";
        assert_eq!(find_md_blocks(text, "json"), vec!["[1]"]);
    }

    #[test]
    fn parse_collects_all_missing_tags() {
        let parser = TagParser {
            xml_tags: vec!["plan".into()],
            md_tags: vec!["json".into()],
            ..Default::default()
        };
        let err = parser.parse("nothing here").unwrap_err();
        assert!(err.0.starts_with("Parsing errors:\n"));
        assert!(err.0.contains("No plan tags found, it should be provided as <plan>...</plan>"));
        assert!(err.0.contains("No json tags found, it should be provided as ```json ... ```"));
    }

    #[test]
    fn parse_success_shape_and_signals() {
        let parser = TagParser {
            xml_tags: vec!["plan".into()],
            signal_tags: vec!["DONE".into(), "ABORT".into()],
            ..Default::default()
        };
        let parsed = parser.parse("<plan>step</plan> <DONE>").unwrap();
        assert_eq!(parsed["raw"], "<plan>step</plan> <DONE>");
        assert_eq!(parsed["xml_tags"]["plan"][0], "step");
        assert_eq!(parsed["DONE"], true);
        assert_eq!(parsed["ABORT"], false);
    }

    #[test]
    fn required_tags_outside_declared_set() {
        let parser = TagParser {
            required_xml_tags: vec!["final".into()],
            ..Default::default()
        };
        assert!(parser.parse("<final>x</final>").is_ok());
        let err = parser.parse("no final").unwrap_err();
        assert!(err.0.contains("Required final tag not found"));
    }

    #[test]
    fn empty_parser_accepts_anything() {
        let parser = TagParser::default();
        assert!(parser.is_empty());
        let parsed = parser.into_parser()("free text", &Map::new()).unwrap();
        assert_eq!(parsed["raw"], "free text");
    }
}
