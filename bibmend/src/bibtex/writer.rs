//! Canonical BibTeX writer
//!
//! Entries are emitted in input order, fields one per line with a tab
//! indent, braced values, and a trailing comma after every field. `title`
//! and `author` lead, the remaining fields follow alphabetically. Changed
//! entries can carry a leading `% `-prefixed annotation naming the source
//! of each new field value.

use super::{Bibliography, Block};
use bibmend_common::{Entry, FieldName};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Render a bibliography back to text. `annotations` maps entry positions
/// (in input order, duplicate keys included) to the comment placed above
/// that entry (without the `% ` prefix).
pub fn render(bibliography: &Bibliography, annotations: &BTreeMap<usize, String>) -> String {
    let mut rendered: Vec<String> = Vec::with_capacity(bibliography.blocks.len());
    let mut position = 0usize;
    for block in &bibliography.blocks {
        match block {
            Block::Opaque(text) => rendered.push(text.clone()),
            Block::Entry(entry) => {
                rendered.push(render_entry(entry, annotations.get(&position)));
                position += 1;
            }
        }
    }
    let mut output = rendered.join("\n\n");
    output.push('\n');
    output
}

fn render_entry(entry: &Entry, annotation: Option<&String>) -> String {
    let mut out = String::new();
    if let Some(annotation) = annotation {
        for line in annotation.lines() {
            if line.starts_with('%') {
                let _ = writeln!(out, "{}", line);
            } else {
                let _ = writeln!(out, "% {}", line);
            }
        }
    }
    let _ = writeln!(out, "@{}{{{},", entry.entry_type, entry.key);
    for (name, value) in ordered_fields(entry) {
        let _ = writeln!(out, "\t{} = {{{}}},", name, value);
    }
    out.push('}');
    out
}

/// `title` and `author` first, then every other field alphabetically,
/// recognized and extra fields interleaved.
fn ordered_fields(entry: &Entry) -> Vec<(&str, &str)> {
    let mut fields: Vec<(&str, &str)> = Vec::new();
    for name in [FieldName::Title, FieldName::Author] {
        if let Some(value) = entry.fields.get(name) {
            fields.push((name.as_str(), value));
        }
    }
    let mut rest: Vec<(&str, &str)> = entry
        .fields
        .iter()
        .filter(|(name, _)| *name != FieldName::Title && *name != FieldName::Author)
        .map(|(name, value)| (name.as_str(), value))
        .chain(
            entry
                .extra
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        )
        .collect();
    rest.sort_unstable_by(|a, b| a.0.cmp(b.0));
    fields.extend(rest);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bibtex::parse;

    fn no_annotations() -> BTreeMap<usize, String> {
        BTreeMap::new()
    }

    #[test]
    fn writes_the_canonical_layout() {
        let bibliography = parse(
            "@article{a1, doi = {10.1/x}, title = {A Title}, year = 1999, author = {Doe, Jane}}",
        )
        .expect("parse failure");
        let expected = "@article{a1,\n\ttitle = {A Title},\n\tauthor = {Doe, Jane},\n\tdoi = {10.1/x},\n\tyear = {1999},\n}\n";
        assert_eq!(render(&bibliography, &no_annotations()), expected);
    }

    #[test]
    fn extra_fields_interleave_alphabetically() {
        let bibliography = parse(
            "@article{a1, title = {T}, volume = {3}, keywords = {pde}, archiveprefix = {arXiv}}",
        )
        .expect("parse failure");
        let output = render(&bibliography, &no_annotations());
        let archive = output.find("archiveprefix").expect("archiveprefix");
        let keywords = output.find("keywords").expect("keywords");
        let volume = output.find("volume").expect("volume");
        assert!(archive < keywords && keywords < volume);
    }

    #[test]
    fn annotations_are_comment_prefixed() {
        let bibliography = parse("@article{a1, title = {T}}").expect("parse failure");
        let mut annotations = BTreeMap::new();
        annotations.insert(
            0,
            "bibmend: doi from crossref, pages from zbmath".to_string(),
        );
        let output = render(&bibliography, &annotations);
        assert!(output.starts_with("% bibmend: doi from crossref, pages from zbmath\n@article{a1,"));
    }

    #[test]
    fn annotations_attach_by_position_even_for_duplicate_keys() {
        let bibliography = parse(
            "@misc{dup, title = {One}}\n\n% divider\n\n@misc{dup, title = {Two}}",
        )
        .expect("parse failure");
        let mut annotations = BTreeMap::new();
        annotations.insert(0, "bibmend: doi from crossref".to_string());
        annotations.insert(1, "bibmend: pages from dblp".to_string());
        let output = render(&bibliography, &annotations);
        let first = output
            .find("% bibmend: doi from crossref\n@misc{dup,\n\ttitle = {One},")
            .expect("first annotation above the first entry");
        let second = output
            .find("% bibmend: pages from dblp\n@misc{dup,\n\ttitle = {Two},")
            .expect("second annotation above the second entry");
        assert!(first < second);
    }

    #[test]
    fn entry_order_and_opaque_blocks_survive() {
        let input = "% hand-maintained\n\n@misc{first, title = {1}}\n\n@comment{keep me}\n\n@misc{second, title = {2}}";
        let bibliography = parse(input).expect("parse failure");
        let output = render(&bibliography, &no_annotations());
        let first = output.find("@misc{first").expect("first entry");
        let comment = output.find("@comment{keep me}").expect("comment");
        let second = output.find("@misc{second").expect("second entry");
        assert!(output.starts_with("% hand-maintained"));
        assert!(first < comment && comment < second);
        assert!(output.ends_with("}\n"));
    }

    #[test]
    fn rendered_output_reparses_to_the_same_entries() {
        let input = r#"@string{jmfm = "J. Math. Fluid Mech."}
@article{abels07,
    title = {On the notion of generalized solutions},
    author = {Abels, Helmut},
    journal = jmfm,
    volume = {9},
    year = {2007},
    localfile = {papers/abels07.pdf},
}"#;
        let first_pass = parse(input).expect("parse failure");
        let output = render(&first_pass, &no_annotations());
        let second_pass = parse(&output).expect("re-parse failure");
        let original: Vec<&Entry> = first_pass.entries().collect();
        let rewritten: Vec<&Entry> = second_pass.entries().collect();
        assert_eq!(original, rewritten);
        assert_eq!(render(&second_pass, &no_annotations()), output);
    }
}
