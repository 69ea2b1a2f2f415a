// tests/grammar_tests.rs
//
// The registration contract: operators, functions, and transforms are
// plain grammar data, and changing them changes how source tokenizes,
// parses, and evaluates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jexl::{parser, Context, Error, Evaluator, ExpressionFn, Grammar, Value};

fn eval_in(grammar: &Grammar, src: &str) -> Value {
    let ast = parser::parse(grammar, src).unwrap();
    Evaluator::new(grammar, &mut Context::new())
        .evaluate(&ast)
        .unwrap()
}

fn num(n: f64) -> Value {
    Value::Number(n)
}

// ============================================================================
// Custom binary operators
// ============================================================================

#[test]
fn test_custom_binary_op() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op("_=", 20, |l, r| {
        Ok(Value::Bool(
            l.to_display_string().to_lowercase() == r.to_display_string().to_lowercase(),
        ))
    });
    assert_eq!(eval_in(&grammar, "'FoO' _= 'foo'"), Value::Bool(true));
    assert_eq!(eval_in(&grammar, "'FoO' _= 'bar'"), Value::Bool(false));
}

#[test]
fn test_custom_op_precedence() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op("cat", 5, |l, r| {
        Ok(Value::String(format!(
            "{}{}",
            l.to_display_string(),
            r.to_display_string(),
        )))
    });
    // lower precedence than +, so the sums fold first
    assert_eq!(
        eval_in(&grammar, "1 + 2 cat 3"),
        Value::String("33".to_string()),
    );
    assert_eq!(
        eval_in(&grammar, "1 cat 2 + 3"),
        Value::String("15".to_string()),
    );
}

#[test]
fn test_word_shaped_operator_reclassifies_identifier() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op("has", 20, |l, r| match l {
        Value::Array(items) => Ok(Value::Bool(items.contains(r))),
        _ => Ok(Value::Bool(false)),
    });
    assert_eq!(eval_in(&grammar, "[1, 2, 3] has 2"), Value::Bool(true));
    assert_eq!(eval_in(&grammar, "[1, 2, 3] has 9"), Value::Bool(false));
}

#[test]
fn test_multi_char_custom_op_lexes_longest_match() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op("**", 50, |l, r| {
        Ok(Value::Number(l.to_number().powf(r.to_number())))
    });
    // "**" must win over two "*" tokens
    assert_eq!(eval_in(&grammar, "2 ** 8"), num(256.0));
    assert_eq!(eval_in(&grammar, "2 * 8"), num(16.0));
}

// ============================================================================
// On-demand operators
// ============================================================================

#[test]
fn test_on_demand_operator_short_circuits() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op_on_demand("??", 10, |left, right| match left()? {
        Value::Null | Value::Undefined => right(),
        v => Ok(v),
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    grammar.add_function("bump", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Number(99.0))
    });

    assert_eq!(eval_in(&grammar, "5 ?? bump()"), num(5.0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(eval_in(&grammar, "missing ?? bump()"), num(99.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(eval_in(&grammar, "null ?? 7"), num(7.0));
}

#[test]
fn test_question_still_ternary_with_coalesce_registered() {
    let mut grammar = Grammar::default();
    grammar.add_binary_op_on_demand("??", 10, |left, right| match left()? {
        Value::Null | Value::Undefined => right(),
        v => Ok(v),
    });
    assert_eq!(
        eval_in(&grammar, "1 ? 'a' : 'b'"),
        Value::String("a".to_string()),
    );
}

// ============================================================================
// Custom unary operators
// ============================================================================

#[test]
fn test_custom_unary_op() {
    let mut grammar = Grammar::default();
    grammar.add_unary_op("~", |v| Ok(Value::Number(v.to_number().floor())));
    assert_eq!(eval_in(&grammar, "~5.7"), num(5.0));
    assert_eq!(eval_in(&grammar, "~5.7 + 1"), num(6.0));
}

// ============================================================================
// Removing operators
// ============================================================================

#[test]
fn test_removed_op_no_longer_tokenizes() {
    let mut grammar = Grammar::default();
    grammar.remove_op("+");
    let err = parser::parse(&grammar, "1 + 2").unwrap_err();
    assert_eq!(err, Error::InvalidToken("+".to_string()));
}

#[test]
fn test_removed_word_op_becomes_identifier() {
    let mut grammar = Grammar::default();
    grammar.remove_op("in");
    // "in" now lexes as a plain identifier, so this is two operands
    assert!(parser::parse(&grammar, "1 in [1]").is_err());
    assert!(parser::parse(&grammar, "in").is_ok());
}

#[test]
fn test_punctuation_is_not_removable() {
    let mut grammar = Grammar::default();
    grammar.remove_op(",");
    assert_eq!(
        eval_in(&grammar, "[1, 2]"),
        Value::Array(vec![num(1.0), num(2.0)]),
    );
}

#[test]
fn test_removing_assignment_disables_it() {
    let mut grammar = Grammar::default();
    grammar.remove_op("=");
    assert_eq!(
        parser::parse(&grammar, "x = 1").unwrap_err(),
        Error::InvalidToken("=".to_string()),
    );
}

// ============================================================================
// Function and transform registries
// ============================================================================

#[test]
fn test_bulk_registration() {
    let mut grammar = Grammar::default();
    let one: ExpressionFn = Arc::new(|_args: &[Value]| Ok(Value::Number(1.0)));
    let two: ExpressionFn = Arc::new(|_args: &[Value]| Ok(Value::Number(2.0)));
    grammar.add_functions(vec![("one".to_string(), one), ("two".to_string(), two)]);

    let upper: ExpressionFn = Arc::new(|args: &[Value]| {
        Ok(Value::String(args[0].to_display_string().to_uppercase()))
    });
    grammar.add_transforms(vec![("upper".to_string(), upper)]);

    assert!(grammar.get_function("one").is_some());
    assert!(grammar.get_function("three").is_none());
    assert!(grammar.get_transform("upper").is_some());

    assert_eq!(eval_in(&grammar, "one() + two()"), num(3.0));
    assert_eq!(
        eval_in(&grammar, "'hi' | upper"),
        Value::String("HI".to_string()),
    );
}

#[test]
fn test_registration_overwrites() {
    let mut grammar = Grammar::default();
    grammar.add_function("f", |_| Ok(Value::Number(1.0)));
    grammar.add_function("f", |_| Ok(Value::Number(2.0)));
    assert_eq!(eval_in(&grammar, "f()"), num(2.0));
}

// ============================================================================
// Sharing
// ============================================================================

#[test]
fn test_grammar_shared_across_threads() {
    let mut grammar = Grammar::default();
    grammar.add_transform("double", |args| Ok(Value::Number(args[0].to_number() * 2.0)));

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let g = &grammar;
                s.spawn(move || {
                    let ast = parser::parse(g, "n | double").unwrap();
                    let mut context = Context::new();
                    context.insert("n".to_string(), Value::Number(i as f64));
                    Evaluator::new(g, &mut context).evaluate(&ast).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), num(i as f64 * 2.0));
        }
    });
}
