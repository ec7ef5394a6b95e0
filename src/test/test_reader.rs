use crate::error::FnErrorKind;
use crate::reader::{parse_string, StrTable};

fn parse(src: &str) -> Result<Vec<crate::reader::Node>, crate::error::FnError> {
    let mut strtab = StrTable::new();
    parse_string(src, "<test>", &mut strtab)
}

#[test]
fn empty_input_parses_to_no_forms() {
    let forms = parse("").unwrap();
    assert!(forms.is_empty());
}

#[test]
fn unterminated_list_is_a_resumable_parse_error() {
    let err = parse("(+ 1 2").unwrap_err();
    assert_eq!(err.kind, FnErrorKind::ParseResumable);
    assert!(err.is_resumable());
}

#[test]
fn unterminated_string_at_eof_is_a_lex_error() {
    let err = parse("\"abc").unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Lex);
}

#[test]
fn mismatched_closing_delimiter_is_a_parse_error() {
    let err = parse("(+ 1 2]").unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Parse);
    assert!(!err.is_resumable());
}

#[test]
fn short_hex_escape_is_a_lex_error() {
    let err = parse(r#""\x4""#).unwrap_err();
    assert_eq!(err.kind, FnErrorKind::Lex);
}

#[test]
fn multiple_top_level_forms_parse_in_order() {
    let forms = parse("1 2 3").unwrap();
    assert_eq!(forms.len(), 3);
}
