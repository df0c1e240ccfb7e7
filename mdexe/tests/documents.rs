use mdexe::{
    Document, FenceStyle, Language, MissingPolicy, Parser, Resolution, ResolveError, Resolver,
    SnippetId,
};

fn parse(source: &str) -> Document {
    Parser::new(source.to_string(), 0).parse()
}

fn parse_commonmark(source: &str) -> Document {
    Parser::new(source.to_string(), 0)
        .with_style(FenceStyle::CommonMark)
        .parse()
}

fn id(n: u32) -> Option<SnippetId> {
    SnippetId::new(n)
}

#[test]
fn untagged_fence_is_not_a_snippet() {
    assert!(parse("\n```\nthis is not a snippet.\n```\n    ").is_empty());
    assert!(parse("\n````\nthis is a fenced block.\n````\n").is_empty());
}

#[test]
fn single_python_fence() {
    let doc = parse("\n```python\nthis is a python snippet.\n```\n    ");
    assert_eq!(doc.snippets.len(), 1);
    let snippet = &doc.snippets[0];
    assert_eq!(snippet.id.map(|i| i.to_string()), Some("1".to_string()));
    assert_eq!(snippet.language, Language::Python("python".into()));
    assert_eq!(snippet.raw_text().collect::<Vec<_>>(), ["this is a python snippet."]);
    assert_eq!(snippet.resolution, Resolution::Unvisited);
}

#[test]
fn four_backticks_open_like_three() {
    let doc = parse("\n````python\nthis is a python snippet.\n````\n");
    assert_eq!(doc.snippets.len(), 1);
    assert_eq!(doc.snippets[0].id, id(1));
    assert_eq!(doc.snippets[0].language.tag(), "python");
}

#[test]
fn tags_are_canonicalized() {
    let doc = parse("```js\n1\n```\n```py\n2\n```\n```gawk\n3\n```\n");
    let tags: Vec<_> = doc.snippets.iter().map(|s| s.language.tag()).collect();
    assert_eq!(tags, ["node", "python", "gawk"]);
}

// The compat scanner never compares fence lengths. An untagged outer fence is
// inert, so the inner tagged fence opens a snippet and the inner closer ends
// it: one snippet where a CommonMark renderer shows none.
#[test]
fn nested_fence_inside_untagged_block_is_captured() {
    let source = "\n````\n```python\nthis is a fenced block, not a python snippet,\n```\n````\n";
    let doc = parse(source);
    assert_eq!(doc.snippets.len(), 1);
    assert_eq!(
        doc.snippets[0].raw_text().collect::<Vec<_>>(),
        ["this is a fenced block, not a python snippet,"]
    );

    assert!(parse_commonmark(source).is_empty());
}

#[test]
fn shorter_closer_still_closes() {
    let source = "\n```\n````python\nthis is a fenced block, not a python snippet,\n````\n```\n";
    assert_eq!(parse(source).snippets.len(), 1);
    assert!(parse_commonmark(source).is_empty());

    // A three-backtick line closes a four-backtick snippet early; the rest of
    // the intended body becomes prose.
    let doc = parse("````sh\necho one\n```\necho two\n````\n");
    assert_eq!(doc.snippets.len(), 1);
    assert_eq!(doc.snippets[0].raw_text().collect::<Vec<_>>(), ["echo one"]);

    let doc = parse_commonmark("````sh\necho one\n```\necho two\n````\n");
    assert_eq!(
        doc.snippets[0].raw_text().collect::<Vec<_>>(),
        ["echo one", "```", "echo two"]
    );
}

#[test]
fn library_gets_no_id_and_is_not_counted() {
    let source = "
```python
#%inc: third

if __name__ == \"__main__\":
    sample_three()

#%name:main
```

```python
#%lib
#%name:third
def sample_three():
    print(\"three\")
```

```sh
echo after
```
";
    let doc = parse(source);
    assert_eq!(doc.snippets.len(), 3);

    let main = &doc.snippets[0];
    assert_eq!(main.id, id(1));
    assert_eq!(main.name.as_deref(), Some("main"));
    assert!(!main.is_library);

    let third = &doc.snippets[1];
    assert_eq!(third.id, None);
    assert_eq!(third.name.as_deref(), Some("third"));
    assert!(third.is_library);

    assert_eq!(doc.snippets[2].id, id(2));
    assert_eq!(doc.ids(), vec![SnippetId::new(1).unwrap(), SnippetId::new(2).unwrap()]);
    assert_eq!(doc.libraries().count(), 1);
    assert_eq!(doc.find("third").map(|s| s.is_library), Some(true));
}

#[test]
fn directive_lines_are_removed_but_inc_is_kept() {
    let doc = parse("```sh\n#%name:x\n#%lib:alias\n#%inc:y\necho\n```\n");
    let snippet = &doc.snippets[0];
    assert_eq!(snippet.name.as_deref(), Some("x"));
    assert_eq!(snippet.alias.as_deref(), Some("alias"));
    assert_eq!(snippet.raw_text().collect::<Vec<_>>(), ["#%inc:y", "echo"]);
}

#[test]
fn unknown_language_is_dropped_with_warning() {
    let doc = parse("```rust\nfn main() {}\n```\n```sh\necho ok\n```\n");
    assert_eq!(doc.snippets.len(), 1);
    assert_eq!(doc.snippets[0].id, id(1));
    assert_eq!(doc.notices.len(), 1);
    assert!(doc.notices[0].is_warning());
    assert!(doc.notices[0].message.contains("rust"));
    assert_eq!(doc.notices[0].span, 0..7);
}

#[test]
fn unknown_language_body_is_skipped() {
    // The tagged line inside the ignored block does not open a snippet.
    let doc = parse("```text\n```python\n```\nprint(1)\n```\n");
    assert!(doc.is_empty());
}

#[test]
fn unterminated_fence_is_dropped() {
    let doc = parse("```sh\necho never closed\n");
    assert!(doc.is_empty());
    assert_eq!(doc.notices.len(), 1);
    assert!(doc.notices[0].message.contains("unterminated"));
}

#[test]
fn crlf_documents() {
    let doc = parse("```sh\r\necho a\r\n```\r\n");
    assert_eq!(doc.snippets[0].raw_text().collect::<Vec<_>>(), ["echo a"]);
}

#[test]
fn commonmark_style_reads_tilde_fences_and_directives() {
    let doc = parse_commonmark(
        "~~~sh\n#%lib:greet\necho hi\n~~~\n\n```bash\n#%inc: greet\necho bye\n```\n",
    );
    assert_eq!(doc.snippets.len(), 2);
    assert!(doc.snippets[0].is_library);
    assert_eq!(doc.snippets[0].alias.as_deref(), Some("greet"));
    assert_eq!(doc.snippets[1].id, id(1));

    let mut doc = doc;
    let mut resolver = Resolver::new(&mut doc, MissingPolicy::Strict);
    assert_eq!(resolver.resolve(SnippetId::new(1).unwrap()).unwrap(), ["echo hi", "echo bye"]);
}

#[test]
fn commonmark_body_spans_point_at_source() {
    let source = "# Title\n\n```sh\necho a\necho b\n```\n";
    let doc = parse_commonmark(source);
    let lines = &doc.snippets[0].raw_lines;
    assert_eq!(lines.len(), 2);
    assert_eq!(&source[lines[1].span.clone()], "echo b");
}

#[test]
fn resolving_whole_document_in_strict_mode_stops_at_missing_name() {
    let mut doc = parse("```sh\necho ok\n```\n```sh\n#%inc: missing\n```\n");
    let err = Resolver::new(&mut doc, MissingPolicy::Strict)
        .resolve_all()
        .unwrap_err();
    assert!(matches!(err, ResolveError::MissingReference { .. }));
    assert!(doc.snippets[0].is_resolved());
    assert!(!doc.snippets[1].is_resolved());
}

#[test]
fn cycle_terminates_and_is_reported_every_time() {
    let source = "```sh\n#%name:a\n#%inc:b\n```\n```sh\n#%name:b\n#%inc:a\n```\n";
    let mut doc = parse(source);
    let mut resolver = Resolver::new(&mut doc, MissingPolicy::Lenient);
    for _ in 0..2 {
        assert!(matches!(
            resolver.resolve("b"),
            Err(ResolveError::CyclicReference { .. })
        ));
    }
}
