#[cfg(test)]
mod tests {
    use crate::eval::{EvalError, Interpreter, Scope, Value, ValuesScope};
    use crate::expr::{parse_expression, parse_program};

    fn scope(values: &[(&str, Value)]) -> ValuesScope {
        ValuesScope::new(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn eval(src: &str, scope: &ValuesScope) -> Result<Value, EvalError> {
        let expr = parse_expression(src)?;
        Interpreter::new(scope).eval(&expr)
    }

    fn run(src: &str, scope: &ValuesScope) -> Result<Value, EvalError> {
        let program = parse_program(src)?;
        Interpreter::new(scope).run(&program)
    }

    fn user() -> Value {
        Value::object([("name", Value::from("Ada")), ("age", Value::from(36))])
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        let s = scope(&[]);
        assert_eq!(eval("1 + 2 * 3", &s).unwrap(), Value::from(7));
        assert_eq!(eval("(1 + 2) * 3", &s).unwrap(), Value::from(9));
        assert_eq!(eval("10 % 4", &s).unwrap(), Value::from(2));
        assert_eq!(eval("2 - -1", &s).unwrap(), Value::from(3));
        assert_eq!(eval("1 / 0", &s).unwrap(), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_string_concatenation_and_templates() {
        let s = scope(&[("a", Value::from("x")), ("b", Value::from(1))]);
        assert_eq!(eval(r#""a" + 1"#, &s).unwrap(), Value::from("a1"));
        assert_eq!(eval(r#"1 + 2 + "x""#, &s).unwrap(), Value::from("3x"));
        assert_eq!(eval("`${a}-${b + 1}`", &s).unwrap(), Value::from("x-2"));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let s = scope(&[]);
        assert_eq!(eval(r#"null ?? "d""#, &s).unwrap(), Value::from("d"));
        assert_eq!(eval("0 ?? 5", &s).unwrap(), Value::from(0));
        assert_eq!(eval("0 || 5", &s).unwrap(), Value::from(5));
        // `missing` is never evaluated.
        assert_eq!(eval(r#""" && missing"#, &s).unwrap(), Value::from(""));
    }

    #[test]
    fn test_equality_and_typeof() {
        let s = scope(&[]);
        assert_eq!(eval(r#"1 == "1""#, &s).unwrap(), Value::Bool(true));
        assert_eq!(eval(r#"1 === "1""#, &s).unwrap(), Value::Bool(false));
        assert_eq!(eval("null == undefined", &s).unwrap(), Value::Bool(true));
        assert_eq!(eval("typeof missing", &s).unwrap(), Value::from("undefined"));
        assert_eq!(eval("typeof [1]", &s).unwrap(), Value::from("object"));
    }

    #[test]
    fn test_conditional() {
        let s = scope(&[("n", Value::from(3))]);
        assert_eq!(
            eval(r#"n > 2 ? "big" : "small""#, &s).unwrap(),
            Value::from("big")
        );
    }

    #[test]
    fn test_statements_and_block_scoping() {
        let s = scope(&[]);
        let result = run(
            "let x = 1; if (x > 0) { x += 2; let y = 5 } else { x = 0 } return x * 10;",
            &s,
        )
        .unwrap();
        assert_eq!(result, Value::from(30));
        assert!(run("{ let y = 1 } return y;", &s).is_err());
    }

    #[test]
    fn test_newlines_terminate_statements() {
        let s = scope(&[]);
        assert_eq!(
            run("let a = 1\nlet b = a + 1\nreturn b", &s).unwrap(),
            Value::from(2)
        );
    }

    #[test]
    fn test_assignment_writes_through_scope() {
        let s = scope(&[("count", Value::from(1))]);
        run("count++", &s).unwrap();
        assert_eq!(s.lookup("count"), Some(Value::from(2)));
        run("this.count += 5", &s).unwrap();
        assert_eq!(s.lookup("count"), Some(Value::from(7)));
        assert_eq!(eval("count--", &s).unwrap(), Value::from(7));
        assert_eq!(eval("--count", &s).unwrap(), Value::from(5));
    }

    #[test]
    fn test_nested_mutation() {
        let s = scope(&[
            ("items", Value::Array(vec![Value::from(1), Value::from(2)])),
            ("user", user()),
        ]);
        assert_eq!(run("items.push(3); return items.length", &s).unwrap(), Value::from(3));
        run(r#"user.name = "Bo"; this.user.age += 1"#, &s).unwrap();
        let updated = s.lookup("user").unwrap();
        assert_eq!(updated.get("name"), Some(&Value::from("Bo")));
        assert_eq!(updated.get("age"), Some(&Value::from(37)));
        run("items[0] = 10", &s).unwrap();
        assert_eq!(eval("items.join()", &s).unwrap(), Value::from("10,2,3"));
    }

    #[test]
    fn test_locals_shadow_data() {
        let s = scope(&[("count", Value::from(1))]);
        run("let count = 100; count = 5", &s).unwrap();
        assert_eq!(s.lookup("count"), Some(Value::from(1)));
    }

    #[test]
    fn test_reference_errors() {
        let s = scope(&[]);
        assert_eq!(
            run("ghost = 1", &s).unwrap_err(),
            EvalError::Reference("ghost".to_string())
        );
        assert_eq!(
            eval("ghost + 1", &s).unwrap_err().to_string(),
            "ghost is not defined"
        );
    }

    #[test]
    fn test_nullish_property_access() {
        let s = scope(&[("user", user())]);
        assert_eq!(
            eval("user.address.city", &s).unwrap_err().to_string(),
            "Cannot read properties of undefined (reading 'city')"
        );
        assert_eq!(eval("user?.address?.city", &s).unwrap(), Value::Undefined);
        assert_eq!(eval(r#"user["name"]"#, &s).unwrap(), Value::from("Ada"));
    }

    #[test]
    fn test_builtins() {
        let s = scope(&[]);
        assert_eq!(eval("Math.max(1, 5, 3)", &s).unwrap(), Value::from(5));
        assert_eq!(eval("Math.round(2.5)", &s).unwrap(), Value::from(3));
        assert_eq!(eval("Math.floor(Math.PI)", &s).unwrap(), Value::from(3));
        assert_eq!(eval(r#"parseInt("42px")"#, &s).unwrap(), Value::from(42));
        assert_eq!(eval("String(12)", &s).unwrap(), Value::from("12"));
        assert_eq!(eval(r#"Number("x")"#, &s).unwrap().to_number().is_nan(), true);
        assert_eq!(
            eval(r#"JSON.stringify({a: [1, "x"]})"#, &s).unwrap(),
            Value::from(r#"{"a":[1,"x"]}"#)
        );
        assert_eq!(eval(r#"console.log("hi", 1)"#, &s).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_value_methods() {
        let s = scope(&[]);
        assert_eq!(eval(r#""  Hi ".trim().toUpperCase()"#, &s).unwrap(), Value::from("HI"));
        assert_eq!(eval(r#""abc".slice(-2)"#, &s).unwrap(), Value::from("bc"));
        assert_eq!(eval(r#"[1, 2, 3].join("-")"#, &s).unwrap(), Value::from("1-2-3"));
        assert_eq!(eval("[1, 2, 3].includes(2)", &s).unwrap(), Value::Bool(true));
        assert_eq!(eval(r#""a,b".split(",").length"#, &s).unwrap(), Value::from(2));
        assert_eq!(eval("(1.005).toFixed(1)", &s).unwrap(), Value::from("1.0"));
        assert!(matches!(
            eval("(1).nope()", &s),
            Err(EvalError::NotCallable(_))
        ));
    }

    #[test]
    fn test_oversized_collections_are_errors() {
        let s = scope(&[
            ("s", Value::from("ab")),
            ("items", Value::Array(vec![Value::from(1)])),
        ]);
        assert!(matches!(
            run("s = s.repeat(Infinity)", &s),
            Err(EvalError::Type(_))
        ));
        assert!(matches!(run("s = s.repeat(1e12)", &s), Err(EvalError::Type(_))));
        assert!(matches!(run("items.length = 1e12", &s), Err(EvalError::Type(_))));
        assert!(matches!(run("items[1e12] = 1", &s), Err(EvalError::Type(_))));
        assert_eq!(s.lookup("s"), Some(Value::from("ab")));
        assert_eq!(s.lookup("items"), Some(Value::Array(vec![Value::from(1)])));

        assert_eq!(eval("s.repeat(3)", &s).unwrap(), Value::from("ababab"));
        run("items.length = 3", &s).unwrap();
        assert_eq!(eval("items.length", &s).unwrap(), Value::from(3));
    }

    #[test]
    fn test_unsupported_syntax_is_rejected() {
        assert!(parse_program("while (true) {}").is_err());
        assert!(parse_expression("x => x").is_err());
        assert!(parse_expression("new Date()").is_err());
        assert!(parse_program("function f() {}").is_err());
        assert!(parse_expression("1 +").is_err());
    }
}
