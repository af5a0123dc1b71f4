#![expect(clippy::unwrap_used)] // test code OK

use lispy::ast::Value;
use lispy::reader::read_all;
use lispy::{Config, Error, Interpreter, SymbolTable, SyntaxErrorKind};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Output sink shared between the interpreter and the test
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn interpreter_with_output() -> (Interpreter, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let interp = Interpreter::new()
        .unwrap()
        .with_output(Box::new(buffer.clone()));
    (interp, buffer)
}

/// Evaluate `input` and render the result with the printer
fn eval_text(interp: &mut Interpreter, input: &str) -> Result<String, Error> {
    let value = interp.eval_str(input)?;
    Ok(interp.to_string(&value))
}

/// Test result variants for end-to-end cases
#[derive(Debug)]
enum TestResult {
    Success(&'static str),     // Evaluation should print as this text
    SpecificError(&'static str), // Evaluation should fail with an error containing this text
    Error,                     // Evaluation should fail (any error)
}
use TestResult::*;

fn run_cases(interp: &mut Interpreter, cases: Vec<(&str, TestResult)>) {
    for (i, (input, expected)) in cases.into_iter().enumerate() {
        let result = eval_text(interp, input);
        match (&result, &expected) {
            (Ok(actual), Success(text)) => {
                assert_eq!(actual, text, "case #{} `{input}`", i + 1);
            }
            (Err(e), SpecificError(fragment)) => {
                assert!(
                    e.to_string().contains(fragment),
                    "case #{} `{input}`: error {e} does not mention {fragment:?}",
                    i + 1
                );
            }
            (Err(_), Error) => {}
            _ => panic!(
                "case #{} `{input}`: expected {expected:?}, got {result:?}",
                i + 1
            ),
        }
    }
}

#[test]
fn test_printed_values_reread_to_equal_structure() {
    let sources = [
        "42",
        "-7",
        "3.25",
        "1e300",
        "-0.5",
        "#t",
        "#f",
        "\"plain\"",
        "\"quote \\\" and backslash \\\\ and newline \\n\"",
        "symbol",
        "list->vector",
        "()",
        "(a (b (c ())) \"s\" 1 2.0 #f)",
        "'x",
        "`(a ,b ,@c)",
    ];

    let mut symbols = SymbolTable::new();
    for source in sources {
        let first = read_all(source, &mut symbols).unwrap();
        let printed: Vec<String> = first
            .iter()
            .map(|v| v.display(&symbols).to_string())
            .collect();
        let second = read_all(&printed.join(" "), &mut symbols).unwrap();
        assert_eq!(first, second, "round trip of {source} via {printed:?}");
    }
}

#[test]
fn test_tail_calls_run_in_constant_stack() {
    let mut interp = Interpreter::new().unwrap();
    interp
        .eval_str(
            "(define (count-up n acc) (if (= n 0) acc (count-up (- n 1) (+ acc 1))))
             (define (even? n) (if (= n 0) #t (odd? (- n 1))))
             (define (odd? n) (if (= n 0) #f (even? (- n 1))))
             (define (loop-cond n) (cond ((= n 0) 'done) (else (loop-cond (- n 1)))))
             (define (loop-begin n) (begin 1 (if (= n 0) 'done (loop-begin (- n 1)))))",
        )
        .unwrap();

    run_cases(
        &mut interp,
        vec![
            ("(count-up 200000 0)", Success("200000")),
            ("(even? 100001)", Success("#f")),
            ("(loop-cond 100000)", Success("done")),
            ("(loop-begin 100000)", Success("done")),
            ("(let loop-free ((n 3)) n)", Error),
        ],
    );
}

#[test]
fn test_deeply_nested_runtime_lists() {
    let mut interp = Interpreter::new().unwrap();
    interp
        .eval_str("(define (nest n acc) (if (= n 0) acc (nest (- n 1) (list acc))))")
        .unwrap();

    run_cases(
        &mut interp,
        vec![
            ("(begin (nest 200000 '()) 'dropped)", Success("dropped")),
            ("(define d (nest 200000 '()))", Success("#<unspecified>")),
            ("(define e (nest 200000 '()))", Success("#<unspecified>")),
            ("(equal? d d)", Success("#t")),
            ("(equal? d e)", Success("#t")),
            ("(equal? d (car e))", Success("#f")),
            ("(eq? d e)", Success("#f")),
            ("(length (car d))", Success("1")),
        ],
    );

    let d = interp.eval_str("d").unwrap();
    let printed = interp.to_string(&d);
    assert_eq!(printed.len(), 2 * 200_000 + 2);
    assert!(printed.starts_with("((((") && printed.ends_with("))))"));
    drop(d);

    // rebinding releases the only references
    interp.eval_str("(set! d 0) (set! e 0)").unwrap();
    assert_eq!(interp.eval_str("(+ d e)").unwrap(), Value::from(0));
}

#[test]
fn test_non_tail_recursion_over_long_lists() {
    let mut interp = Interpreter::new().unwrap();
    interp
        .eval_str(
            "(define (iota n acc) (if (= n 0) acc (iota (- n 1) (cons n acc))))
             (define (len xs) (if (null? xs) 0 (+ 1 (len (cdr xs)))))
             (define (build n) (if (= n 0) '() (cons n (build (- n 1)))))
             (define (sum xs) (cond ((null? xs) 0) (else (+ (car xs) (sum (cdr xs))))))",
        )
        .unwrap();

    run_cases(
        &mut interp,
        vec![
            ("(len (iota 500 '()))", Success("500")),
            ("(len (iota 5000 '()))", Success("5000")),
            ("(length (build 5000))", Success("5000")),
            ("(sum (build 3000))", Success("4501500")),
        ],
    );
}

#[test]
fn test_long_quasiquote_templates() {
    let mut interp = Interpreter::new().unwrap();
    let numbers = |n: usize| (1..=n).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");

    let value = interp.eval_str(&format!("(length `({}))", numbers(400))).unwrap();
    assert_eq!(value, Value::from(400));

    let value = interp
        .eval_str(&format!(
            "(let ((xs '(a b))) (length `({} ,@xs ,(car xs))))",
            numbers(1000)
        ))
        .unwrap();
    assert_eq!(value, Value::from(1003));
}

#[test]
fn test_quoting() {
    let mut interp = Interpreter::new().unwrap();
    run_cases(
        &mut interp,
        vec![
            ("(quote (a b c))", Success("(a b c)")),
            ("'(a b c)", Success("(a b c)")),
            ("(length '(a b c))", Success("3")),
            ("''a", Success("(quote a)")),
            ("`(1 ,(+ 1 1) ,@(list 3 4))", Success("(1 2 3 4)")),
            ("`(nested (list ,(* 3 3)))", Success("(nested (list 9))")),
            ("(quote)", SpecificError("quote")),
        ],
    );
}

#[test]
fn test_scoping() {
    let mut interp = Interpreter::new().unwrap();
    run_cases(
        &mut interp,
        vec![
            ("(define x 1)", Success("#<unspecified>")),
            ("(define (shadow) (define x 2) x)", Success("#<unspecified>")),
            ("(shadow)", Success("2")),
            ("x", Success("1")),
            ("(define y 1)", Success("#<unspecified>")),
            ("(define (bump!) (set! y (+ y 10)))", Success("#<unspecified>")),
            ("(bump!)", Success("#<unspecified>")),
            ("y", Success("11")),
            (
                "(define (make-counter) (let ((n 0)) (lambda () (set! n (+ n 1)) n)))",
                Success("#<unspecified>"),
            ),
            ("(define c1 (make-counter))", Success("#<unspecified>")),
            ("(define c2 (make-counter))", Success("#<unspecified>")),
            ("(begin (c1) (c1) (c2) (list (c1) (c2)))", Success("(3 2)")),
            ("(set! never-defined 1)", SpecificError("never-defined")),
        ],
    );
}

#[test]
fn test_arity_checking() {
    let mut interp = Interpreter::new().unwrap();
    interp
        .eval_str("(define (two a b) (list a b)) (define any (lambda args args))")
        .unwrap();

    assert!(matches!(
        interp.eval_str("(two 1)"),
        Err(Error::ArityError {
            expected: 2,
            got: 1,
            ..
        })
    ));
    assert!(matches!(
        interp.eval_str("(two 1 2 3)"),
        Err(Error::ArityError {
            expected: 2,
            got: 3,
            ..
        })
    ));

    run_cases(
        &mut interp,
        vec![
            ("(two 1 2)", Success("(1 2)")),
            ("(any)", Success("()")),
            ("(any 1)", Success("(1)")),
            ("(any 1 \"two\" 'three)", Success("(1 \"two\" three)")),
            ("((lambda args (length args)) 1 2 3 4 5)", Success("5")),
        ],
    );
}

#[test]
fn test_macro_expansion() {
    let mut interp = Interpreter::new().unwrap();

    let form = interp
        .parse(&mut lispy::InputPort::from_source("(and 1 2 3)"))
        .unwrap()
        .unwrap();
    assert_eq!(interp.to_string(&form), "(if 1 (if 2 3 #f) #f)");

    run_cases(
        &mut interp,
        vec![
            ("(and 1 2 3)", Success("3")),
            ("(and)", Success("#t")),
            ("(and 1 #f 3)", Success("#f")),
            ("(or #f #f)", Success("#f")),
            ("(or)", Success("#f")),
            ("(or #f 5)", Success("5")),
            ("(when (> 2 1) 'a 'b)", Success("b")),
            ("(unless (> 2 1) 'a)", Success("#<unspecified>")),
            (
                "(define-macro (swap! a b) `(let ((tmp ,a)) (set! ,a ,b) (set! ,b tmp)))",
                Success("#<unspecified>"),
            ),
            ("(define p 1)", Success("#<unspecified>")),
            ("(define q 2)", Success("#<unspecified>")),
            ("(begin (swap! p q) (list p q))", Success("(2 1)")),
            ("(define (f) (define-macro m (lambda () 1)))", Error),
        ],
    );
}

#[test]
fn test_unbound_variable() {
    let mut interp = Interpreter::new().unwrap();
    assert_eq!(
        interp.eval_str("never-defined-anywhere"),
        Err(Error::UnboundVariable("never-defined-anywhere".to_owned()))
    );
    assert_eq!(
        interp.eval_str("(+ 1 missing)"),
        Err(Error::UnboundVariable("missing".to_owned()))
    );
}

#[test]
fn test_escape_continuation() {
    let mut interp = Interpreter::new().unwrap();
    run_cases(
        &mut interp,
        vec![
            ("(call/cc (lambda (k) (+ 1 (k 42))))", Success("42")),
            ("(+ 1 (call/cc (lambda (k) 10)))", Success("11")),
            (
                "(define (find-first pred xs)
                   (call/cc (lambda (return)
                     (define (walk xs)
                       (cond ((null? xs) #f)
                             ((pred (car xs)) (return (car xs)))
                             (else (walk (cdr xs)))))
                     (walk xs))))",
                Success("#<unspecified>"),
            ),
            ("(find-first (lambda (x) (> x 2)) '(1 2 3 4))", Success("3")),
            ("(find-first (lambda (x) (> x 9)) '(1 2 3 4))", Success("#f")),
            (
                "(call-with-current-continuation (lambda (outer)
                   (+ 100 (call/cc (lambda (inner) (outer 7))))))",
                Success("7"),
            ),
            ("(define saved #f)", Success("#<unspecified>")),
            ("(call/cc (lambda (k) (set! saved k) 1))", Success("1")),
            ("(saved 2)", SpecificError("already returned")),
        ],
    );
    assert_eq!(interp.eval_str("(saved 3)"), Err(Error::StaleContinuation));
}

#[test]
fn test_top_level_forms_are_independent() {
    let mut interp = Interpreter::new().unwrap();
    interp.eval_str("(define kept 1)").unwrap();

    assert!(interp.eval_str("(car '())").is_err());
    assert!(interp.eval_str("(undefined-procedure 1)").is_err());
    assert!(interp.eval_str("(define broken").is_err());
    assert!(interp.eval_str(")").is_err());

    assert_eq!(eval_text(&mut interp, "(+ kept 1)").unwrap(), "2");
}

#[test]
fn test_output_capture() {
    let (mut interp, output) = interpreter_with_output();
    interp
        .eval_str(
            r#"(display "hello") (newline)
               (write "hello") (newline)
               (display '(1 "two" three)) (newline)
               (write '(1 "two" three))"#,
        )
        .unwrap();
    assert_eq!(
        output.contents(),
        "hello\n\"hello\"\n(1 two three)\n(1 \"two\" three)"
    );
}

#[test]
fn test_load_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("library.scm");
    std::fs::write(
        &script,
        "; helpers used by the test\n\
         (define (square x) (* x x))\n\
         (define-macro (twice e) `(begin ,e ,e))\n\
         (twice (display (square 3)))\n",
    )
    .unwrap();

    let (mut interp, output) = interpreter_with_output();
    interp.load(&script).unwrap();
    assert_eq!(output.contents(), "99");
    assert_eq!(eval_text(&mut interp, "(square 12)").unwrap(), "144");

    // The source extension is appended when missing
    let without_extension = dir.path().join("library");
    let source = format!("(load \"{}\")", without_extension.display());
    interp.eval_str(&source).unwrap();
    assert_eq!(output.contents(), "9999");
}

#[test]
fn test_load_reports_file_and_line() {
    let mut script = tempfile::Builder::new().suffix(".scm").tempfile().unwrap();
    writeln!(script, "(define a 1)").unwrap();
    writeln!(script, "(define b 2)").unwrap();
    writeln!(script, "(car 5)").unwrap();
    writeln!(script, "(define never-reached 3)").unwrap();
    script.flush().unwrap();

    let mut interp = Interpreter::new().unwrap();
    let error = interp.load(script.path()).unwrap_err();
    let message = error.to_string();
    assert!(
        message.contains(&format!("{}:3", script.path().display())),
        "unexpected error: {message}"
    );
    assert_eq!(eval_text(&mut interp, "(+ a b)").unwrap(), "3");
    assert!(matches!(
        interp.eval_str("never-reached"),
        Err(Error::UnboundVariable(_))
    ));

    let mut unbalanced = tempfile::Builder::new().suffix(".scm").tempfile().unwrap();
    writeln!(unbalanced, "(define c (list 1 2").unwrap();
    unbalanced.flush().unwrap();
    match interp.load(unbalanced.path()) {
        Err(Error::Syntax(e)) => assert_eq!(e.kind, SyntaxErrorKind::UnexpectedEof),
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_host_registered_procedures() {
    let mut interp = Interpreter::with_config(Config {
        load_prelude: false,
        ..Config::default()
    })
    .unwrap();

    // A host binding that reads a device register
    let register = Rc::new(RefCell::new(0x2a_i64));
    let device = Rc::clone(&register);
    interp.register_native("read-register", move |_, args| {
        if !args.is_empty() {
            return Err(Error::arity_error(0, args.len()));
        }
        Ok(Value::from(*device.borrow()))
    });
    interp.register_builtin_operation::<_, (i64, i64)>("clamp-add", |a: i64, b: i64| {
        a.saturating_add(b)
    });

    run_cases(
        &mut interp,
        vec![
            ("(read-register)", Success("42")),
            ("(clamp-add 9223372036854775807 1)", Success("9223372036854775807")),
            ("(clamp-add 1 \"x\")", SpecificError("expected integer")),
            ("(and 1 2)", Error),
        ],
    );

    *register.borrow_mut() = 7;
    assert_eq!(eval_text(&mut interp, "(read-register)").unwrap(), "7");
    assert!(!interp.is_macro("and"));
    assert!(interp.is_macro("let"));
}

#[test]
fn test_complete_programs() {
    let (mut interp, output) = interpreter_with_output();
    interp
        .eval_str(
            "(define (map f xs) (if (null? xs) '() (cons (f (car xs)) (map f (cdr xs)))))
             (define (filter keep? xs)
               (cond ((null? xs) '())
                     ((keep? (car xs)) (cons (car xs) (filter keep? (cdr xs))))
                     (else (filter keep? (cdr xs)))))
             (define (fold f acc xs) (if (null? xs) acc (fold f (f acc (car xs)) (cdr xs))))
             (define (range a b) (if (>= a b) '() (cons a (range (+ a 1) b))))
             (define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))",
        )
        .unwrap();

    run_cases(
        &mut interp,
        vec![
            ("(map fib (range 0 10))", Success("(0 1 1 2 3 5 8 13 21 34)")),
            (
                "(filter (lambda (n) (= 0 (remainder n 3))) (range 1 13))",
                Success("(3 6 9 12)"),
            ),
            ("(fold + 0 (range 1 101))", Success("5050")),
            ("(apply max (map (lambda (x) (* x x)) '(-5 3 4)))", Success("25")),
            ("(let ((x 2) (y 3)) (let ((x 7) (z (+ x y))) (* z x)))", Success("35")),
            ("(/ 10 4)", Success("2.5")),
            ("(exact-bogus 1)", SpecificError("exact-bogus")),
            ("(eval `(,(string->symbol \"+\") 1 2))", Success("3")),
            ("(symbol->string 'abc)", Success("\"abc\"")),
            ("(string-append \"a\" \"b\")", Success("\"ab\"")),
            ("(error \"custom failure:\" 42)", SpecificError("custom failure: 42")),
        ],
    );

    interp
        .eval_str("(for-each-display (range 0 3))")
        .unwrap_err();
    interp
        .eval_str(
            "(define (for-each-display xs)
               (when (pair? xs) (display (car xs)) (display \" \") (for-each-display (cdr xs))))
             (for-each-display (range 0 3))",
        )
        .unwrap();
    assert_eq!(output.contents(), "0 1 2 ");
}
