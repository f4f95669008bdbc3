use super::*;
use crate::value::ValueMap;

fn case_file() -> Value {
    let order = ValueMap::new()
        .with("Amount", 250i64)
        .with("Status", "open")
        .with(
            "Lines",
            vec![
                Value::Map(ValueMap::new().with("Sku", "A-1")),
                Value::Map(ValueMap::new().with("Sku", "B-2")),
            ],
        );
    Value::Map(ValueMap::new().with("Order", order).with("Approved", true))
}

fn eval(expression: &str) -> Result<Value, ExpressionError> {
    let file = case_file();
    SimpleExpressionEvaluator.evaluate(expression, &EvaluationContext::new(&file))
}

fn holds(expression: &str) -> bool {
    let file = case_file();
    SimpleExpressionEvaluator
        .evaluate_condition(expression, &EvaluationContext::new(&file))
        .expect("condition")
}

#[test]
fn test_empty_expression_holds() {
    assert_eq!(eval("").expect("empty"), Value::Bool(true));
    assert!(holds("   "));
}

#[test]
fn test_paths_resolve_with_slash_dot_and_index() {
    assert_eq!(eval("Order/Status").expect("slash"), Value::from("open"));
    assert_eq!(eval("Order.Status").expect("dot"), Value::from("open"));
    assert_eq!(eval("Order/Lines[1]/Sku").expect("index"), Value::from("B-2"));
    assert_eq!(eval("Order/Missing").expect("missing"), Value::Null);
    assert_eq!(eval("Order/Lines[7]/Sku").expect("out of range"), Value::Null);
}

#[test]
fn test_comparisons() {
    assert!(holds("Order/Amount > 100"));
    assert!(holds("Order/Amount >= 250"));
    assert!(!holds("Order/Amount < 250"));
    assert!(holds("Order/Amount == 250.0"));
    assert!(holds("Order/Status == 'open'"));
    assert!(holds("Order/Status != \"closed\""));
}

#[test]
fn test_boolean_operators_and_grouping() {
    assert!(holds("Approved && Order/Amount > 100"));
    assert!(holds("!Approved || Order/Status == 'open'"));
    assert!(!holds("!(Approved && true)"));
    assert!(holds("false || (null == Order/Nothing)"));
}

#[test]
fn test_user_resolves_to_caller() {
    let file = case_file();
    let user = UserIdentity::new("alice");
    let context = EvaluationContext::new(&file).for_user(&user);
    assert!(SimpleExpressionEvaluator
        .evaluate_condition("user == 'alice'", &context)
        .expect("user"));
    assert_eq!(eval("user").expect("no user"), Value::Null);
}

#[test]
fn test_malformed_expressions_fail() {
    assert!(eval("(Approved").is_err());
    assert!(eval("Approved Approved").is_err());
    assert!(eval("Order/Status > 5").is_err());
    assert!(eval("#").is_err());
}

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("PT1H").expect("hour"), Duration::hours(1));
    assert_eq!(
        parse_duration("P1DT2H30M").expect("mixed"),
        Duration::days(1) + Duration::hours(2) + Duration::minutes(30)
    );
    assert_eq!(parse_duration("P2W").expect("weeks"), Duration::weeks(2));
    assert_eq!(parse_duration("PT0.5S").expect("fraction"), Duration::milliseconds(500));
}

#[test]
fn test_parse_duration_rejects_garbage() {
    for text in ["", "P", "PT", "1H", "P1H", "PT-1S", "soon"] {
        assert!(parse_duration(text).is_err(), "{text} should be rejected");
    }
}
