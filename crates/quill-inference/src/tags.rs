//! Tag prompt construction and response parsing.
//!
//! The tagging model sees numbered note previews and must answer with a
//! JSON object mapping each number back to 1–3 short topic tags. Numeric
//! indices are used instead of UUIDs; small models garble long opaque
//! identifiers far more often than small integers.

use serde::Deserialize;

use quill_core::{Error, NotePreview, Result, TagAssignment};

/// System prompt for the tagging model.
pub const TAG_SYSTEM_PROMPT: &str = "You are a note-tagging assistant. \
For each numbered note, assign 1 to 3 short topic tags (one or two words each) \
that describe what the note is about. Reply with JSON only, in the form \
{\"notes\":[{\"index\":0,\"tags\":[\"tag\"]}]} with one entry per input note.";

/// Build the user prompt listing each preview with its index.
pub fn build_tag_prompt(previews: &[NotePreview]) -> String {
    let mut prompt = String::from("Assign topic tags to these notes:\n\n");
    for (index, preview) in previews.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index, preview.preview.replace('\n', " ")));
    }
    prompt
}

#[derive(Deserialize)]
struct TagResponse {
    notes: Vec<TagResponseEntry>,
}

#[derive(Deserialize)]
struct TagResponseEntry {
    index: usize,
    tags: Vec<String>,
}

/// Parse a tagging model response into one assignment per input preview.
///
/// Any structural defect is an [`Error::Parse`]: unparseable JSON, an index
/// out of range, a note with no entry, or an entry with no tags. Callers
/// treat a parse failure as a failed batch and retry the whole batch.
pub fn parse_tag_response(body: &str, previews: &[NotePreview]) -> Result<Vec<TagAssignment>> {
    let json = extract_json_object(body)
        .ok_or_else(|| Error::Parse("Tag response contains no JSON object".into()))?;

    let response: TagResponse = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("Malformed tag response: {}", e)))?;

    let mut tags_by_index: Vec<Option<Vec<String>>> = vec![None; previews.len()];
    for entry in response.notes {
        if entry.index >= previews.len() {
            return Err(Error::Parse(format!(
                "Tag response index {} out of range ({} notes)",
                entry.index,
                previews.len()
            )));
        }
        let tags: Vec<String> = entry
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(3)
            .collect();
        if tags.is_empty() {
            return Err(Error::Parse(format!(
                "Tag response assigned no tags to note {}",
                entry.index
            )));
        }
        tags_by_index[entry.index] = Some(tags);
    }

    previews
        .iter()
        .zip(tags_by_index)
        .map(|(preview, tags)| match tags {
            Some(tags) => Ok(TagAssignment {
                note_id: preview.id,
                tags,
            }),
            None => Err(Error::Parse(format!(
                "Tag response missing an entry for note {}",
                preview.id
            ))),
        })
        .collect()
}

/// Slice out the outermost JSON object, tolerating code fences and prose
/// around it.
fn extract_json_object(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn previews(n: usize) -> Vec<NotePreview> {
        (0..n)
            .map(|i| NotePreview {
                id: Uuid::new_v4(),
                preview: format!("note {}", i),
            })
            .collect()
    }

    #[test]
    fn test_prompt_numbers_notes() {
        let prompt = build_tag_prompt(&previews(2));
        assert!(prompt.contains("0. note 0"));
        assert!(prompt.contains("1. note 1"));
    }

    #[test]
    fn test_prompt_flattens_newlines() {
        let p = vec![NotePreview {
            id: Uuid::new_v4(),
            preview: "line one\nline two".into(),
        }];
        let prompt = build_tag_prompt(&p);
        assert!(prompt.contains("line one line two"));
    }

    #[test]
    fn test_parse_valid_response() {
        let previews = previews(2);
        let body = r#"{"notes":[{"index":0,"tags":["cooking"]},{"index":1,"tags":["travel","planning"]}]}"#;

        let assignments = parse_tag_response(body, &previews).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].note_id, previews[0].id);
        assert_eq!(assignments[0].tags, vec!["cooking"]);
        assert_eq!(assignments[1].tags, vec!["travel", "planning"]);
    }

    #[test]
    fn test_parse_tolerates_code_fences() {
        let previews = previews(1);
        let body = "```json\n{\"notes\":[{\"index\":0,\"tags\":[\"x\"]}]}\n```";
        assert!(parse_tag_response(body, &previews).is_ok());
    }

    #[test]
    fn test_parse_caps_tags_at_three() {
        let previews = previews(1);
        let body = r#"{"notes":[{"index":0,"tags":["a","b","c","d","e"]}]}"#;
        let assignments = parse_tag_response(body, &previews).unwrap();
        assert_eq!(assignments[0].tags.len(), 3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let previews = previews(1);
        assert!(matches!(
            parse_tag_response("no json here", &previews),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_tag_response("{not valid", &previews),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_note() {
        let previews = previews(2);
        let body = r#"{"notes":[{"index":0,"tags":["only one"]}]}"#;
        assert!(matches!(
            parse_tag_response(body, &previews),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_out_of_range_index() {
        let previews = previews(1);
        let body = r#"{"notes":[{"index":5,"tags":["x"]}]}"#;
        assert!(matches!(
            parse_tag_response(body, &previews),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_tags() {
        let previews = previews(1);
        let body = r#"{"notes":[{"index":0,"tags":["  "]}]}"#;
        assert!(matches!(
            parse_tag_response(body, &previews),
            Err(Error::Parse(_))
        ));
    }
}
