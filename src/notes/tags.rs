use super::{NoteTagSpan, TagTable};

const MARKER: char = '#';

fn ends_tag(c: char) -> bool {
    c == ' ' || c == MARKER
}

/// Extracts tag spans from `text`.
///
/// A tag starts at every `#` and runs until the next space, the next `#` or the end of the text.
/// A label ending in punctuation is looked up as written first; when that is unknown the trailing
/// punctuation is dropped (`#billing.` resolves `billing`). Offsets are character offsets into
/// the text with every `#` removed, so each marker shifts everything after it one position left.
/// Labels missing from `table` are skipped.
pub fn extract_tags(text: &str, table: &TagTable) -> Vec<NoteTagSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = vec![];
    let mut markers = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != MARKER {
            i += 1;
            continue;
        }
        markers += 1;
        let label_start = i + 1;
        let mut label_end = label_start;
        while label_end < chars.len() && !ends_tag(chars[label_end]) {
            label_end += 1;
        }
        let next = label_end;

        let full: String = chars[label_start..label_end].iter().collect();
        let resolved = match table.resolve(&full) {
            Some(key) => Some(key),
            None => {
                while label_end > label_start && chars[label_end - 1].is_ascii_punctuation() {
                    label_end -= 1;
                }
                let trimmed: String = chars[label_start..label_end].iter().collect();
                table.resolve(&trimmed)
            }
        };
        if let Some(key) = resolved.filter(|_| label_end > label_start) {
            spans.push(NoteTagSpan {
                start: label_start - markers,
                end: label_end - markers,
                tag_key: key.clone(),
            });
        }
        i = next;
    }

    spans
}

pub fn strip_markers(text: &str) -> String {
    text.chars().filter(|c| *c != MARKER).collect()
}

#[cfg(test)]
mod tests {
    use crate::notes::{NoteTagSpan, Tag, TagKey, TagTable};

    use super::{extract_tags, strip_markers};

    fn table(entries: &[(&str, &str)]) -> TagTable {
        entries
            .iter()
            .map(|(label, key)| Tag {
                key: TagKey(key.to_string()),
                label: label.to_string(),
            })
            .collect()
    }

    fn span(start: usize, end: usize, key: &str) -> NoteTagSpan {
        NoteTagSpan {
            start,
            end,
            tag_key: TagKey(key.into()),
        }
    }

    #[test]
    fn two_tags_in_order() {
        let table = table(&[("client1", "k1"), ("billing", "k2")]);
        let text = "Met with #client1 about #billing.";
        let spans = extract_tags(text, &table);
        assert_eq!(spans, vec![span(9, 16, "k1"), span(23, 30, "k2")]);

        let stripped = strip_markers(text);
        assert_eq!(stripped, "Met with client1 about billing.");
        assert_eq!(&stripped[9..16], "client1");
        assert_eq!(&stripped[23..30], "billing");
    }

    #[test]
    fn no_tags() {
        let table = table(&[("client1", "k1")]);
        assert!(extract_tags("no tags here", &table).is_empty());
        assert!(extract_tags("", &table).is_empty());
    }

    #[test]
    fn unknown_labels_still_shift_offsets() {
        let table = table(&[("known", "k")]);
        let spans = extract_tags("#unknown then #known", &table);
        assert_eq!(spans, vec![span(13, 18, "k")]);
    }

    #[test]
    fn tag_at_end_of_text() {
        let table = table(&[("done", "d")]);
        assert_eq!(extract_tags("work #done", &table), vec![span(5, 9, "d")]);
    }

    #[test]
    fn adjacent_markers_split_tags() {
        let table = table(&[("a", "ka"), ("b", "kb")]);
        assert_eq!(
            extract_tags("#a#b", &table),
            vec![span(0, 1, "ka"), span(1, 2, "kb")]
        );
    }

    #[test]
    fn lone_marker_is_ignored() {
        let table = table(&[("", "empty")]);
        assert!(extract_tags("price # 5", &table).is_empty());
    }

    #[test]
    fn labels_ending_in_punctuation_are_matched_as_written() {
        let table = table(&[("c", "kc"), ("c++", "kcpp"), ("v1.", "kv")]);
        assert_eq!(
            extract_tags("learning #c++ today", &table),
            vec![span(9, 12, "kcpp")]
        );
        assert_eq!(extract_tags("release #v1.", &table), vec![span(8, 11, "kv")]);
    }

    #[test]
    fn trailing_punctuation_is_dropped_for_unknown_labels() {
        let table = table(&[("c", "kc")]);
        assert_eq!(extract_tags("learning #c++ today", &table), vec![span(9, 10, "kc")]);
    }

    #[test]
    fn offsets_count_characters() {
        let table = table(&[("café", "c")]);
        assert_eq!(extract_tags("über #café", &table), vec![span(5, 9, "c")]);
    }
}
