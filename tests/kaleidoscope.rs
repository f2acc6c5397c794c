use kaleidoscope::toplevel::{Item, Session};

struct Outcome {
    items: Vec<Item>,
    out: String,
    err: String,
}

impl Outcome {
    fn values(&self) -> Vec<f64> {
        self.items
            .iter()
            .filter_map(|i| match i {
                Item::Expression(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<&str> {
        self.err.lines().collect()
    }
}

fn run(source: &str) -> Outcome {
    let mut session = Session::new(Vec::new(), Vec::new());
    let items = session.run(source).expect("in-memory sinks never fail");
    let (out, err) = session.into_streams();
    Outcome {
        items,
        out: String::from_utf8(out).unwrap(),
        err: String::from_utf8(err).unwrap(),
    }
}

fn eval(source: &str) -> f64 {
    let outcome = run(source);
    assert!(outcome.err.is_empty(), "unexpected errors: {}", outcome.err);
    *outcome.values().last().expect("no top-level expression")
}

#[test]
fn arithmetic_respects_precedence() {
    assert_eq!(eval("1+2*3"), 7.0);
    assert_eq!(eval("(1+2)*3"), 9.0);
    assert_eq!(eval("2*3-4*5"), -14.0);
    assert_eq!(eval("1 < 2"), 1.0);
    assert_eq!(eval("2 < 1"), 0.0);
    assert_eq!(eval("1 + 2 < 2 + 2"), 1.0);
}

#[test]
fn equal_precedence_is_left_associative() {
    assert_eq!(eval("def f(a b c) a-b-c; f(10, 3, 2)"), 5.0);
    assert_eq!(eval("10-3-2"), 5.0);
}

#[test]
fn redefinition_is_rejected_and_first_body_kept() {
    let outcome = run("def f(x) x*2; def f(x) x*3; f(5)");
    assert_eq!(outcome.errors(), vec!["Error: Function 'f' cannot be redefined."]);
    assert_eq!(outcome.values(), vec![10.0]);
}

#[test]
fn var_initializer_sees_outer_binding() {
    assert_eq!(eval("var x = 5 in var x = x + 1 in x"), 6.0);
    assert_eq!(eval("var a = 1, b in a + b"), 1.0);
    assert_eq!(eval("def f(x) var x = x * 10 in x; f(3)"), 30.0);
}

#[test]
fn for_loop_iterations_and_value() {
    let outcome = run("extern printd(x); for i = 1, i < 5, 1 in printd(i)");
    assert!(outcome.err.is_empty(), "{}", outcome.err);
    assert_eq!(
        outcome.out,
        "1.000000\n2.000000\n3.000000\n4.000000\nEvaluated to 0\n"
    );
    assert_eq!(outcome.values(), vec![0.0]);

    assert_eq!(eval("for i = 1, i < 5 in i"), 0.0);
}

#[test]
fn for_loop_counts_with_mutation() {
    let src = "
        def count(n)
          var total = 0 in
            (for i = 0, i < n in total = total + 1) + total;
        count(7)";
    assert_eq!(eval(src), 7.0);
}

#[test]
fn for_loop_variable_shadows_outer() {
    assert_eq!(eval("def f(i) (for i = 0, i < 3 in 0) + i; f(42)"), 42.0);
}

#[test]
fn user_binary_operator_precedence() {
    let src = "
        def mod(a b) if a < b then a else mod(a - b, b);
        def binary% 10 (a b) mod(a, b);
        10 % 3";
    assert_eq!(eval(src), 1.0);

    // % binds looser than +, so this is (4 + 6) % 3.
    let src = "
        def mod(a b) if a < b then a else mod(a - b, b);
        def binary% 10 (a b) mod(a, b);
        4 + 6 % 3";
    assert_eq!(eval(src), 1.0);
}

#[test]
fn user_binary_operator_default_precedence() {
    let mut session = Session::new(Vec::new(), Vec::new());
    session.run("def binary& (a b) if a then b else 0").unwrap();
    assert_eq!(session.operators().precedence('&'), Some(30));

    // 30 sits between '+' (20) and '*' (40): 1 + 2 & 0 * 5 == 1 + (2 & (0 * 5))
    assert_eq!(
        session.run("1 + 2 & 0 * 5").unwrap(),
        vec![Item::Expression(1.0)]
    );
}

#[test]
fn user_unary_operator() {
    let src = "
        def unary!(v) if v then 0 else 1;
        def unary-(v) 0 - v;
        !0 + -3";
    assert_eq!(eval(src), -2.0);
}

#[test]
fn extern_redeclaration_is_idempotent() {
    let outcome = run("extern foo(a); extern foo(a)");
    assert!(outcome.err.is_empty(), "{}", outcome.err);
    assert_eq!(
        outcome.items,
        vec![Item::Extern("foo".to_owned()), Item::Extern("foo".to_owned())]
    );
}

#[test]
fn malformed_input_reports_once_and_continues() {
    let outcome = run("(1 + 2; 4");
    assert_eq!(outcome.errors(), vec!["Error: expected ')'"]);
    assert_eq!(outcome.values(), vec![4.0]);
}

#[test]
fn failed_operator_definition_rolls_back() {
    let mut session = Session::new(Vec::new(), Vec::new());
    session.run("def binary| 5 (a b) undefined(a)").unwrap();
    assert_eq!(session.operators().precedence('|'), None);
    assert!(session.module().get_function("binary|").is_none());

    let (_, err) = session.into_streams();
    assert_eq!(
        String::from_utf8(err).unwrap(),
        "Error: Unknown function referenced: 'undefined'\n"
    );
}

#[test]
fn recursion_and_conditionals() {
    let src = "
        def fib(x) if x < 3 then 1 else fib(x-1)+fib(x-2);
        fib(10)";
    assert_eq!(eval(src), 55.0);
}

#[test]
fn putchard_writes_characters() {
    let outcome = run("extern putchard(c); putchard(72) + putchard(105)");
    assert_eq!(outcome.out, "HiEvaluated to 0\n");
}

#[test]
fn unresolved_extern_fails_at_evaluation() {
    let outcome = run("extern sin(x); sin(1); 2");
    assert_eq!(
        outcome.errors(),
        vec!["Error: Unresolved external function 'sin'"]
    );
    assert_eq!(outcome.values(), vec![2.0]);
}

#[test]
fn comments_and_separators_are_ignored() {
    let src = "
        # leading comment
        ;;
        def id(x) x; # trailing comment
        id(3)";
    assert_eq!(eval(src), 3.0);
}

#[test]
fn long_operator_chain_is_rejected_not_fatal() {
    let outcome = run(&format!("1{}", "+1".repeat(20_000)));
    assert!(!outcome.errors().is_empty());
    assert!(outcome
        .errors()
        .iter()
        .all(|e| *e == "Error: expression nested too deeply"));

    // a chain well inside the bound still evaluates
    assert_eq!(eval(&format!("1{}", "+1".repeat(199))), 200.0);
}

#[test]
fn definition_may_change_extern_arity() {
    let src = "
        extern f(a);
        def f(a b) if a < 1 then b else f(a-1, b);
        f(3, 9)";
    let outcome = run(src);
    assert!(outcome.err.is_empty(), "{}", outcome.err);
    assert_eq!(outcome.values(), vec![9.0]);
    assert_eq!(outcome.out, "Evaluated to 9\n");
}

#[test]
fn branches_that_open_new_blocks() {
    assert_eq!(eval("if 1 then (if 0 then 5 else 6) else 7"), 6.0);
    assert_eq!(eval("if 0 then 1 else (for i = 0, i < 2 in 0)"), 0.0);
    assert_eq!(eval("if 0 then 1 else var a = 2 in if a < 3 then a * 4 else a"), 8.0);
    assert_eq!(
        eval("def f(x) (if x then for i = 0, i < 1 in 0 else 0) + x; f(3)"),
        3.0
    );
}

#[test]
fn deep_recursion_evaluates() {
    let src = "
        def down(n) if n < 1 then 0 else down(n-1);
        down(600)";
    assert_eq!(eval(src), 0.0);

    let src = "
        def count(n) if n < 1 then 0 else 1 + count(n-1);
        count(5000)";
    assert_eq!(eval(src), 5000.0);
}

#[test]
fn runaway_recursion_is_reported() {
    let outcome = run("def forever(x) forever(x); forever(1); 2");
    assert_eq!(outcome.errors(), vec!["Error: call stack exhausted"]);
    assert_eq!(outcome.values(), vec![2.0]);
}
