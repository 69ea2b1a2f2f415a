// tests/lexer_tests.rs

use jexl::lexer::Lexer;
use jexl::{Error, Grammar, TemplatePart, Token, TokenKind, Value};

fn lex(input: &str) -> Vec<Token> {
    let grammar = Grammar::default();
    Lexer::new(&grammar, input).tokenize().unwrap()
}

fn kinds(input: &str) -> Vec<TokenKind> {
    lex(input).into_iter().map(|t| t.kind).collect()
}

fn lex_err(input: &str) -> Error {
    let grammar = Grammar::default();
    Lexer::new(&grammar, input).tokenize().unwrap_err()
}

fn num(n: f64) -> TokenKind {
    TokenKind::Literal(Value::Number(n))
}

fn string(s: &str) -> TokenKind {
    TokenKind::Literal(Value::String(s.to_string()))
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

fn binop(op: &str) -> TokenKind {
    TokenKind::BinaryOp(op.to_string())
}

// ============================================================================
// Punctuation and operators
// ============================================================================

#[test]
fn test_punctuation_tokens() {
    let cases = vec![
        (".", TokenKind::Dot),
        ("[", TokenKind::OpenBracket),
        ("]", TokenKind::CloseBracket),
        ("|", TokenKind::Pipe),
        ("{", TokenKind::OpenCurl),
        ("}", TokenKind::CloseCurl),
        (":", TokenKind::Colon),
        (",", TokenKind::Comma),
        ("(", TokenKind::OpenParen),
        (")", TokenKind::CloseParen),
        ("?", TokenKind::Question),
        (";", TokenKind::Semicolon),
    ];
    for (input, expected) in cases {
        assert_eq!(kinds(input), vec![expected], "failed for input: {}", input);
    }
}

#[test]
fn test_single_char_operators() {
    assert_eq!(kinds("+"), vec![binop("+")]);
    assert_eq!(kinds("*"), vec![binop("*")]);
    assert_eq!(kinds("/"), vec![binop("/")]);
    assert_eq!(kinds("%"), vec![binop("%")]);
    assert_eq!(kinds("^"), vec![binop("^")]);
    assert_eq!(kinds("<"), vec![binop("<")]);
    assert_eq!(kinds(">"), vec![binop(">")]);
    assert_eq!(kinds("="), vec![binop("=")]);
    assert_eq!(kinds("!"), vec![TokenKind::UnaryOp("!".to_string())]);
}

#[test]
fn test_multi_char_operators() {
    assert_eq!(kinds("=="), vec![binop("==")]);
    assert_eq!(kinds("!="), vec![binop("!=")]);
    assert_eq!(kinds("<="), vec![binop("<=")]);
    assert_eq!(kinds(">="), vec![binop(">=")]);
    assert_eq!(kinds("&&"), vec![binop("&&")]);
    assert_eq!(kinds("||"), vec![binop("||")]);
    assert_eq!(kinds("//"), vec![binop("//")]);
}

#[test]
fn test_longest_match_wins() {
    assert_eq!(kinds("a<=b"), vec![ident("a"), binop("<="), ident("b")]);
    assert_eq!(kinds("a<b"), vec![ident("a"), binop("<"), ident("b")]);
    assert_eq!(
        kinds("a==-1"),
        vec![ident("a"), binop("=="), num(-1.0)],
    );
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn test_integers_and_floats() {
    assert_eq!(kinds("42"), vec![num(42.0)]);
    assert_eq!(kinds("3.14"), vec![num(3.14)]);
    assert_eq!(kinds("0.5"), vec![num(0.5)]);
}

#[test]
fn test_dot_after_number_is_not_a_fraction() {
    // "5." is a number followed by a traversal dot
    assert_eq!(kinds("5."), vec![num(5.0), TokenKind::Dot]);
    assert_eq!(kinds("5.x"), vec![num(5.0), TokenKind::Dot, ident("x")]);
}

#[test]
fn test_negative_number_at_start() {
    assert_eq!(kinds("-3"), vec![num(-3.0)]);
    assert_eq!(kinds("-3.5"), vec![num(-3.5)]);
}

#[test]
fn test_minus_after_operand_is_subtraction() {
    assert_eq!(kinds("5 - 3"), vec![num(5.0), binop("-"), num(3.0)]);
    assert_eq!(kinds("a -3"), vec![ident("a"), binop("-"), num(3.0)]);
}

#[test]
fn test_minus_absorbed_after_operators_and_openers() {
    assert_eq!(kinds("1--2"), vec![num(1.0), binop("-"), num(-2.0)]);
    assert_eq!(
        kinds("(-3)"),
        vec![TokenKind::OpenParen, num(-3.0), TokenKind::CloseParen],
    );
    assert_eq!(
        kinds("[-1,-2]"),
        vec![
            TokenKind::OpenBracket,
            num(-1.0),
            TokenKind::Comma,
            num(-2.0),
            TokenKind::CloseBracket,
        ],
    );
    assert_eq!(
        kinds("a ? -1 : -2"),
        vec![
            ident("a"),
            TokenKind::Question,
            num(-1.0),
            TokenKind::Colon,
            num(-2.0),
        ],
    );
    assert_eq!(kinds("x = -5"), vec![ident("x"), binop("="), num(-5.0)]);
    assert_eq!(
        kinds("1; -2"),
        vec![num(1.0), TokenKind::Semicolon, num(-2.0)],
    );
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_double_and_single_quoted_strings() {
    assert_eq!(kinds("\"hello\""), vec![string("hello")]);
    assert_eq!(kinds("'hello'"), vec![string("hello")]);
    assert_eq!(kinds("'it\"s'"), vec![string("it\"s")]);
}

#[test]
fn test_string_escapes() {
    assert_eq!(kinds("\"say \\\"hi\\\"\""), vec![string("say \"hi\"")]);
    assert_eq!(kinds("'don\\'t'"), vec![string("don't")]);
    assert_eq!(kinds("\"back\\\\slash\""), vec![string("back\\slash")]);
    // backslash escapes any character to itself
    assert_eq!(kinds("\"a\\qb\""), vec![string("aqb")]);
}

#[test]
fn test_unterminated_string() {
    assert_eq!(lex_err("\"oops"), Error::UnclosedLiteral("string literal"));
    assert_eq!(lex_err("'oops"), Error::UnclosedLiteral("string literal"));
}

// ============================================================================
// Identifiers and keywords
// ============================================================================

#[test]
fn test_identifiers() {
    assert_eq!(kinds("foo"), vec![ident("foo")]);
    assert_eq!(kinds("_bar"), vec![ident("_bar")]);
    assert_eq!(kinds("$value"), vec![ident("$value")]);
    assert_eq!(kinds("x2"), vec![ident("x2")]);
}

#[test]
fn test_unicode_identifiers() {
    assert_eq!(kinds("café"), vec![ident("café")]);
    assert_eq!(kinds("привет"), vec![ident("привет")]);
    assert_eq!(
        kinds("año.возраст"),
        vec![ident("año"), TokenKind::Dot, ident("возраст")],
    );
}

#[test]
fn test_boolean_and_null_literals() {
    assert_eq!(kinds("true"), vec![TokenKind::Literal(Value::Bool(true))]);
    assert_eq!(kinds("false"), vec![TokenKind::Literal(Value::Bool(false))]);
    assert_eq!(kinds("null"), vec![TokenKind::Literal(Value::Null)]);
}

#[test]
fn test_word_operator_reclassification() {
    assert_eq!(
        kinds("a in b"),
        vec![ident("a"), binop("in"), ident("b")],
    );
    // only the exact spelling re-classifies
    assert_eq!(kinds("inn"), vec![ident("inn")]);
    assert_eq!(kinds("IN"), vec![ident("IN")]);
}

// ============================================================================
// Raw text
// ============================================================================

#[test]
fn test_raw_preserves_whitespace_and_spelling() {
    let tokens = lex("  foo  == 'a b'");
    assert_eq!(tokens[0].raw, "  foo");
    assert_eq!(tokens[1].raw, "  ==");
    assert_eq!(tokens[2].raw, " 'a b'");
}

// ============================================================================
// Template strings
// ============================================================================

#[test]
fn test_template_static_only() {
    assert_eq!(
        kinds("`hello`"),
        vec![TokenKind::TemplateString(vec![TemplatePart::Static(
            "hello".to_string()
        )])],
    );
    assert_eq!(kinds("``"), vec![TokenKind::TemplateString(vec![])]);
}

#[test]
fn test_template_interpolation_parts() {
    assert_eq!(
        kinds("`a${x}b`"),
        vec![TokenKind::TemplateString(vec![
            TemplatePart::Static("a".to_string()),
            TemplatePart::Interpolation("x".to_string()),
            TemplatePart::Static("b".to_string()),
        ])],
    );
    assert_eq!(
        kinds("`${x}${y}`"),
        vec![TokenKind::TemplateString(vec![
            TemplatePart::Interpolation("x".to_string()),
            TemplatePart::Interpolation("y".to_string()),
        ])],
    );
}

#[test]
fn test_template_interpolation_tracks_brace_depth() {
    assert_eq!(
        kinds("`${ {a: 1} }`"),
        vec![TokenKind::TemplateString(vec![TemplatePart::Interpolation(
            " {a: 1} ".to_string()
        )])],
    );
}

#[test]
fn test_template_interpolation_ignores_braces_in_strings() {
    assert_eq!(
        kinds("`${x['}']}`"),
        vec![TokenKind::TemplateString(vec![TemplatePart::Interpolation(
            "x['}']".to_string()
        )])],
    );
}

#[test]
fn test_template_escapes_stay_verbatim() {
    // \` and \$ remain two-character sequences in the static text
    assert_eq!(
        kinds("`a\\`b`"),
        vec![TokenKind::TemplateString(vec![TemplatePart::Static(
            "a\\`b".to_string()
        )])],
    );
    assert_eq!(
        kinds("`\\${x}`"),
        vec![TokenKind::TemplateString(vec![TemplatePart::Static(
            "\\${x}".to_string()
        )])],
    );
}

#[test]
fn test_unterminated_template() {
    assert_eq!(lex_err("`oops"), Error::UnclosedLiteral("template literal"));
    assert_eq!(lex_err("`${x"), Error::UnclosedLiteral("interpolation"));
}

// ============================================================================
// Invalid input
// ============================================================================

#[test]
fn test_invalid_tokens() {
    assert_eq!(lex_err("&"), Error::InvalidToken("&".to_string()));
    assert_eq!(lex_err("2 @ 3"), Error::InvalidToken("@".to_string()));
    assert_eq!(lex_err("#"), Error::InvalidToken("#".to_string()));
}
