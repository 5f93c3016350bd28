#[cfg(test)]
mod parser_tests {
    use pretty_assertions::assert_eq;

    use rox::ast_printer::AstPrinter;
    use rox::expr::{Expr, LiteralValue};
    use rox::parser::Parser;
    use rox::scanner::scan_tokens;
    use rox::stmt::Stmt;

    fn print_expr(source: &str) -> String {
        let tokens = scan_tokens(source).unwrap();
        let expr = Parser::new(tokens).parse_expression().unwrap();
        AstPrinter::print(&expr)
    }

    fn parse(source: &str) -> Vec<Stmt> {
        Parser::new(scan_tokens(source).unwrap()).parse().unwrap()
    }

    fn parse_errors(source: &str) -> Vec<String> {
        Parser::new(scan_tokens(source).unwrap())
            .parse()
            .unwrap_err()
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(print_expr("1 + 2 * 3"), "(+ 1.0 (* 2.0 3.0))");
        assert_eq!(print_expr("(1 + 2) * 3"), "(* (group (+ 1.0 2.0)) 3.0)");
        assert_eq!(print_expr("-123 * (45.67)"), "(* (- 123.0) (group 45.67))");
        assert_eq!(print_expr("!true == false"), "(== (! true) false)");
        assert_eq!(print_expr("1 < 2 == 3 >= 4"), "(== (< 1.0 2.0) (>= 3.0 4.0))");
    }

    #[test]
    fn test_logical_binds_looser_than_equality() {
        assert_eq!(
            print_expr("a or b and c == nil"),
            "(or a (and b (== c nil)))"
        );
    }

    #[test]
    fn test_calls_properties_and_assignment() {
        assert_eq!(print_expr("f(1)(2, \"x\")"), "(call (call f 1.0) 2.0 x)");
        assert_eq!(print_expr("a.b.c"), "(. (. a b) c)");
        assert_eq!(print_expr("a.b = c = 3"), "(= (. a b) (= c 3.0))");
        assert_eq!(print_expr("super.greet"), "(super greet)");
        assert_eq!(print_expr("this.x"), "(. this x)");
    }

    #[test]
    fn test_for_is_desugared_into_while() {
        let program = parse("for (var i = 0; i < 3; i = i + 1) print i;");

        assert_eq!(program.len(), 1);
        let Stmt::Block(outer) = &program[0] else {
            panic!("expected block, got {:?}", program[0]);
        };
        assert!(matches!(outer[0], Stmt::Var { .. }));

        let Stmt::While { body, .. } = &outer[1] else {
            panic!("expected while, got {:?}", outer[1]);
        };
        let Stmt::Block(inner) = body.as_ref() else {
            panic!("expected body block, got {:?}", body);
        };
        assert!(matches!(inner[0], Stmt::Print(_)));
        assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn test_empty_for_clauses_loop_on_true() {
        let program = parse("for (;;) print 1;");

        let Stmt::While { condition, .. } = &program[0] else {
            panic!("expected bare while, got {:?}", program[0]);
        };
        assert!(matches!(condition, Expr::Literal(LiteralValue::True)));
    }

    #[test]
    fn test_class_declaration_shape() {
        let program = parse("class B < A { init(x) { this.x = x; } go() {} }");

        let Stmt::Class {
            name,
            superclass,
            methods,
        } = &program[0]
        else {
            panic!("expected class, got {:?}", program[0]);
        };

        assert_eq!(name.lexeme, "B");
        assert!(matches!(superclass, Some(Expr::Variable { name, .. }) if name.lexeme == "A"));
        assert_eq!(
            methods.iter().map(|m| m.name.lexeme.as_str()).collect::<Vec<_>>(),
            vec!["init", "go"]
        );
        assert_eq!(methods[0].params.len(), 1);
    }

    #[test]
    fn test_errors_are_collected_after_recovery() {
        let errors = parse_errors("var = 1;\nprint (2;\nvar ok = 3;\nprint ok +;");

        assert_eq!(
            errors,
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 2] Error at ';': Expect ')' after expression.",
                "[line 4] Error at ';': Expect expression.",
            ]
        );
    }

    #[test]
    fn test_error_at_end() {
        assert_eq!(
            parse_errors("print 1"),
            vec!["[line 1] Error at end: Expect ';' after value."]
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_eq!(
            parse_errors("1 + 2 = 3;\nvar a;"),
            vec!["[line 1] Error at '=': Invalid assignment target."]
        );
    }

    #[test]
    fn test_too_many_arguments_is_reported_but_not_fatal() {
        let args: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        let source = format!("f({});\nprint (;", args.join(", "));

        let errors = parse_errors(&source);

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "[line 1] Error at '255': Can't have more than 255 arguments.");
        assert_eq!(errors[1], "[line 2] Error at ';': Expect expression.");
    }

    #[test]
    fn test_too_many_parameters() {
        let params: Vec<String> = (0..256).map(|i| format!("p{}", i)).collect();
        let source = format!("fun f({}) {{}}", params.join(", "));

        assert_eq!(
            parse_errors(&source),
            vec!["[line 1] Error at 'p255': Can't have more than 255 parameters."]
        );
    }
}
