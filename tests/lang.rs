#[cfg(test)]
mod lang_tests {
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use rox::Lox;

    /// `print` sink the test can read back after the run.
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.borrow())
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    fn session() -> (Lox, SharedBuffer) {
        let out = SharedBuffer::default();
        (Lox::with_output(Box::new(out.clone())), out)
    }

    /// Runs a clean program and returns what it printed.
    fn run(source: &str) -> Vec<String> {
        let (mut lox, out) = session();
        if let Err(errors) = lox.run(source) {
            panic!("unexpected errors: {:?}", errors);
        }
        out.lines()
    }

    /// Runs a program that must fail; returns (printed output, error messages).
    fn run_err(source: &str) -> (Vec<String>, Vec<String>) {
        let (mut lox, out) = session();
        let errors = lox.run(source).expect_err("program should fail");
        (out.lines(), errors.iter().map(|e| e.to_string()).collect())
    }

    // ── values and operators ───────────────────────────────────────────

    #[test]
    fn test_arithmetic_and_concatenation() {
        assert_eq!(
            run("print 1 + 2; print \"a\" + \"b\"; print 7 / 2; print -(3 * 2); print 10 - 0.5;"),
            vec!["3", "ab", "3.5", "-6", "9.5"]
        );
    }

    #[test]
    fn test_mixed_plus_is_a_runtime_error() {
        let (out, errors) = run_err("print 0;\nprint 1 + \"a\";\nprint 2;");

        assert_eq!(out, vec!["0"]);
        assert_eq!(
            errors,
            vec!["Operands must be two numbers or two strings.\n[line 2]"]
        );
    }

    #[test]
    fn test_operand_type_errors() {
        let (_, errors) = run_err("print -\"x\";");
        assert_eq!(errors, vec!["Operand must be a number.\n[line 1]"]);

        let (_, errors) = run_err("print 1 < nil;");
        assert_eq!(errors, vec!["Operands must be numbers.\n[line 1]"]);
    }

    #[test]
    fn test_division_by_zero_follows_ieee() {
        assert_eq!(
            run("print 1 / 0; print -1 / 0; print 0 / 0 == 0 / 0;"),
            vec!["Infinity", "-Infinity", "false"]
        );
    }

    #[test]
    fn test_truthiness_and_equality() {
        assert_eq!(
            run(
                "print !nil; print !0; print !\"\"; \
                 print nil == false; print 1 == 1; print \"a\" != \"a\"; print nil == nil;"
            ),
            vec!["true", "false", "false", "false", "true", "false", "true"]
        );
    }

    #[test]
    fn test_logical_operators_return_deciding_operand() {
        assert_eq!(
            run("print nil or \"yes\"; print 0 and 2; print false and undefined; print 1 or undefined;"),
            vec!["yes", "2", "false", "1"]
        );
    }

    // ── variables and scope ─────────────────────────────────────────────

    #[test]
    fn test_shadowing() {
        assert_eq!(
            run("var a = \"outer\"; { var a = \"inner\"; print a; } print a;"),
            vec!["inner", "outer"]
        );
    }

    #[test]
    fn test_closure_binds_lexically_not_dynamically() {
        let source = r#"
            var a = "global";
            {
              fun show() { print a; }
              show();
              var a = "block";
              show();
            }
        "#;

        assert_eq!(run(source), vec!["global", "global"]);
    }

    #[test]
    fn test_self_initializer_is_a_resolution_error() {
        let (out, errors) = run_err("print \"never\";\n{ var a = a; }");

        assert!(out.is_empty());
        assert_eq!(
            errors,
            vec!["[line 2] Error at 'a': Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn test_undefined_variable() {
        let (_, errors) = run_err("print nope;");
        assert_eq!(errors, vec!["Undefined variable 'nope'.\n[line 1]"]);

        let (_, errors) = run_err("nope = 1;");
        assert_eq!(errors, vec!["Undefined variable 'nope'.\n[line 1]"]);
    }

    #[test]
    fn test_globals_may_reference_later_declarations() {
        assert_eq!(
            run("fun a() { return b(); } fun b() { return \"b\"; } print a();"),
            vec!["b"]
        );
    }

    // ── control flow ────────────────────────────────────────────────────

    #[test]
    fn test_if_while_for() {
        let source = r#"
            if (1 > 2) print "no"; else print "yes";
            var i = 0;
            while (i < 2) { print i; i = i + 1; }
            for (var j = 0; j < 3; j = j + 1) print j * 10;
        "#;

        assert_eq!(run(source), vec!["yes", "0", "1", "0", "10", "20"]);
    }

    #[test]
    fn test_for_loop_variable_is_scoped_to_loop() {
        let (_, errors) = run_err("for (var k = 0; k < 1; k = k + 1) {}\nprint k;");
        assert_eq!(errors, vec!["Undefined variable 'k'.\n[line 2]"]);
    }

    #[test]
    fn test_return_unwinds_loops_and_blocks() {
        let source = r#"
            fun find() {
              for (var i = 0; ; i = i + 1) {
                { if (i == 3) return i; }
              }
            }
            print find();
            fun nothing() { return; }
            print nothing();
            fun fallthrough() {}
            print fallthrough();
        "#;

        assert_eq!(run(source), vec!["3", "nil", "nil"]);
    }

    // ── functions and closures ──────────────────────────────────────────

    #[test]
    fn test_closure_counter() {
        let source = r#"
            fun make() {
              var i = 0;
              fun c() { i = i + 1; return i; }
              return c;
            }
            var c = make();
            c();
            print c();
            var d = make();
            print d();
        "#;

        assert_eq!(run(source), vec!["2", "1"]);
    }

    #[test]
    fn test_closures_share_captured_variable() {
        let source = r#"
            var get;
            var set;
            fun pair() {
              var v = "before";
              fun g() { return v; }
              fun s(x) { v = x; }
              get = g;
              set = s;
            }
            pair();
            set("after");
            print get();
        "#;

        assert_eq!(run(source), vec!["after"]);
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            run("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(15);"),
            vec!["610"]
        );
    }

    #[test]
    fn test_arity_mismatch_does_not_run_body() {
        let (out, errors) = run_err("fun f(a, b) { print \"ran\"; }\nf(1);");

        assert!(out.is_empty());
        assert_eq!(errors, vec!["Expected 2 arguments but got 1.\n[line 2]"]);
    }

    #[test]
    fn test_calling_non_callable() {
        let (_, errors) = run_err("\"str\"();");
        assert_eq!(errors, vec!["Can only call functions and classes.\n[line 1]"]);
    }

    #[test]
    fn test_arguments_evaluate_left_to_right_after_callee() {
        let source = r#"
            fun trace(label) { print label; return label; }
            fun f(a, b) { return a + b; }
            print f(trace("x"), trace("y"));
        "#;

        assert_eq!(run(source), vec!["x", "y", "xy"]);
    }

    #[test]
    fn test_callable_display() {
        assert_eq!(
            run("fun f() {} class K {} print f; print clock; print K; print K();"),
            vec!["<fn f>", "<native fn>", "K", "K instance"]
        );
    }

    #[test]
    fn test_clock_returns_seconds() {
        assert_eq!(run("var t = clock(); print t > 1000000000;"), vec!["true"]);
    }

    // ── classes ─────────────────────────────────────────────────────────

    #[test]
    fn test_fields_and_methods() {
        let source = r#"
            class Point {
              sum() { return this.x + this.y; }
            }
            var p = Point();
            p.x = 1;
            p.y = 2;
            print p.sum();
            var m = p.sum;
            p.x = 10;
            print m();
        "#;

        assert_eq!(run(source), vec!["3", "12"]);
    }

    #[test]
    fn test_fields_shadow_methods() {
        let source = r#"
            class A { m() { return "method"; } }
            var a = A();
            a.m = "field";
            print a.m;
        "#;

        assert_eq!(run(source), vec!["field"]);
    }

    #[test]
    fn test_initializer_returns_instance() {
        let source = r#"
            class C {
              init(x) { this.x = x; }
            }
            var c = C(5);
            print c.x;
            print c.init(9) == c;
            print c.x;
        "#;

        assert_eq!(run(source), vec!["5", "true", "9"]);
    }

    #[test]
    fn test_early_return_in_initializer_still_yields_instance() {
        let source = r#"
            class C {
              init() { this.a = 1; return; this.a = 2; }
            }
            print C().a;
        "#;

        assert_eq!(run(source), vec!["1"]);
    }

    #[test]
    fn test_class_arity_comes_from_init() {
        let (_, errors) = run_err("class C { init(a) {} }\nC();");
        assert_eq!(errors, vec!["Expected 1 arguments but got 0.\n[line 2]"]);

        let (_, errors) = run_err("class D {}\nD(1);");
        assert_eq!(errors, vec!["Expected 0 arguments but got 1.\n[line 2]"]);
    }

    #[test]
    fn test_super_calls_superclass_method() {
        let source = r#"
            class A { hi() { return "A"; } }
            class B < A { hi() { return super.hi() + "B"; } }
            print B().hi();
        "#;

        assert_eq!(run(source), vec!["AB"]);
    }

    #[test]
    fn test_super_uses_static_superclass() {
        let source = r#"
            class A { name() { return "A"; } }
            class B < A { name() { return "B"; } test() { return super.name(); } }
            class C < B {}
            print C().test();
        "#;

        assert_eq!(run(source), vec!["A"]);
    }

    #[test]
    fn test_inherited_methods_and_init() {
        let source = r#"
            class Base { init(v) { this.v = v; } get() { return this.v; } }
            class Derived < Base {}
            print Derived(7).get();
        "#;

        assert_eq!(run(source), vec!["7"]);
    }

    #[test]
    fn test_methods_can_name_their_class() {
        let source = r#"
            class Node {
              init(depth) { this.depth = depth; }
              child() { return Node(this.depth + 1); }
            }
            print Node(0).child().child().depth;
        "#;

        assert_eq!(run(source), vec!["2"]);
    }

    #[test]
    fn test_property_errors() {
        let (_, errors) = run_err("class A {}\nprint A().missing;");
        assert_eq!(errors, vec!["Undefined property 'missing'.\n[line 2]"]);

        let (_, errors) = run_err("var n = 1;\nprint n.x;");
        assert_eq!(errors, vec!["Only instances have properties.\n[line 2]"]);

        let (_, errors) = run_err("var n = 1;\nn.x = 2;");
        assert_eq!(errors, vec!["Only instances have fields.\n[line 2]"]);

        let (_, errors) = run_err("class A {}\nclass B < A { go() { return super.nope(); } }\nB().go();");
        assert_eq!(errors, vec!["Undefined property 'nope'.\n[line 2]"]);
    }

    #[test]
    fn test_superclass_must_be_a_class() {
        let (_, errors) = run_err("var NotAClass = \"nope\";\nclass Sub < NotAClass {}");
        assert_eq!(errors, vec!["Superclass must be a class.\n[line 2]"]);
    }

    #[test]
    fn test_instances_compare_by_identity() {
        assert_eq!(
            run("class A {} var a = A(); var b = a; print a == b; print a == A();"),
            vec!["true", "false"]
        );
    }

    // ── sessions ────────────────────────────────────────────────────────

    #[test]
    fn test_session_keeps_globals_and_closures_across_runs() {
        let (mut lox, out) = session();

        lox.run("fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }")
            .unwrap();
        lox.run("var counter = make(); counter();").unwrap();
        lox.run("print counter();").unwrap();

        assert_eq!(out.lines(), vec!["2"]);
    }

    #[test]
    fn test_session_recovers_after_runtime_error() {
        let (mut lox, out) = session();

        lox.run("var x = 1;").unwrap();
        assert!(lox.run("{ var y = 2; print y + nil; }").is_err());
        lox.run("print x;").unwrap();

        // A block scope left behind by the failed run would capture these.
        lox.run("var z = 3;").unwrap();
        lox.run("{ print z; }").unwrap();
        lox.run("fun setz() { z = 4; } setz(); print z;").unwrap();
        assert!(lox.run("print y;").is_err());

        assert_eq!(out.lines(), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_runaway_recursion_is_a_runtime_error() {
        let (mut lox, out) = session();

        let errors = lox
            .run("fun down(n) { return 1 + down(n + 1); }\ndown(0);")
            .expect_err("unbounded recursion should fail");
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["Stack overflow.\n[line 1]"]);

        lox.run("fun count(n) { if (n == 0) return 0; return 1 + count(n - 1); }")
            .unwrap();
        lox.run("print count(1000);").unwrap();
        lox.run("{ var after = \"ok\"; print after; }").unwrap();

        assert_eq!(out.lines(), vec!["1000", "ok"]);
    }

    #[test]
    fn test_session_evaluate_single_expression() {
        let (mut lox, _) = session();

        lox.run("var base = 40;").unwrap();
        let value = lox.evaluate("base + 2").unwrap();

        assert_eq!(value.to_string(), "42");
    }

    #[test]
    fn test_syntax_errors_prevent_execution() {
        let (out, errors) = run_err("print 1;\nprint (;\nprint 2");

        assert!(out.is_empty());
        assert_eq!(
            errors,
            vec![
                "[line 2] Error at ';': Expect expression.",
                "[line 3] Error at end: Expect ';' after value.",
            ]
        );
    }

    #[test]
    fn test_lex_and_syntax_errors_reported_together() {
        let (out, errors) = run_err("var a = 1 $\nprint a;");

        assert!(out.is_empty());
        assert_eq!(
            errors,
            vec![
                "[line 1] Error: Unexpected character: $",
                "[line 2] Error at 'print': Expect ';' after variable declaration.",
            ]
        );
    }

    #[test]
    fn test_lex_errors_alone_still_prevent_execution() {
        let (out, errors) = run_err("print 1; print 2 # ;");

        assert!(out.is_empty());
        assert_eq!(errors, vec!["[line 1] Error: Unexpected character: #"]);
    }
}
