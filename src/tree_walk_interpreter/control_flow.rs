use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{
    ast::{
        CatchClause, ForStatement, ForeachStatement, IfStatement, MatchExpression, Statement,
        SwitchStatement, TryStatement, WhileStatement,
    },
    span::Span,
};

use super::{
    access,
    class::{is_iterator, resolve_type_name, value_instance_of},
    operators::arm_matches,
    vm::panic_message,
    Context, Control, Eval, EvaluatedArgs, ExecutionErrorKind, Value,
};

/// Runs statements in order. Blocks share the slots of their activation.
pub(crate) fn run_block(statements: &[Statement], ctx: &Context) -> Result<(), Control> {
    for statement in statements {
        statement.evaluate(ctx)?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Next,
    Exit,
}

/// One pass through a loop body. A `break`/`continue` without a label, or
/// with this loop's label, belongs to this loop.
fn iterate(body: &[Statement], ctx: &Context, label: &Option<String>) -> Result<Flow, Control> {
    match run_block(body, ctx) {
        Ok(()) => Ok(Flow::Next),
        Err(Control::Break(target)) if target.is_none() || target == *label => Ok(Flow::Exit),
        Err(Control::Continue(target)) if target.is_none() || target == *label => Ok(Flow::Next),
        Err(control) => Err(control),
    }
}

impl IfStatement {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        if self.condition.evaluate(ctx)?.is_truthy() {
            run_block(&self.then, ctx)?;
            return Ok(Value::Null);
        }
        for (condition, body) in &self.else_ifs {
            if condition.evaluate(ctx)?.is_truthy() {
                run_block(body, ctx)?;
                return Ok(Value::Null);
            }
        }
        if let Some(otherwise) = &self.otherwise {
            run_block(otherwise, ctx)?;
        }
        Ok(Value::Null)
    }
}

impl WhileStatement {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        while self.condition.evaluate(ctx)?.is_truthy() {
            if iterate(&self.body, ctx, &self.label)? == Flow::Exit {
                break;
            }
        }
        Ok(Value::Null)
    }

    /// `do { } while (...)`: the body runs before the first test.
    pub fn evaluate_do(&self, ctx: &Context) -> Eval {
        loop {
            if iterate(&self.body, ctx, &self.label)? == Flow::Exit {
                break;
            }
            if !self.condition.evaluate(ctx)?.is_truthy() {
                break;
            }
        }
        Ok(Value::Null)
    }
}

impl ForStatement {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        for init in &self.init {
            init.evaluate(ctx)?;
        }
        loop {
            if let Some(condition) = &self.condition {
                if !condition.evaluate(ctx)?.is_truthy() {
                    break;
                }
            }
            if iterate(&self.body, ctx, &self.label)? == Flow::Exit {
                break;
            }
            for step in &self.step {
                step.evaluate(ctx)?;
            }
        }
        Ok(Value::Null)
    }
}

impl ForeachStatement {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        let iterable = self.iterable.evaluate(ctx)?;
        match &iterable {
            Value::Null => {}
            Value::Array(values) => {
                let snapshot = values.read().clone();
                for (i, value) in snapshot.into_iter().enumerate() {
                    if self.step(ctx, Value::Int(i as i64), value)? == Flow::Exit {
                        break;
                    }
                }
            }
            Value::Object(map) => {
                let entries: Vec<_> = map
                    .read()
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect();
                for (key, value) in entries {
                    if self.step(ctx, Value::String(key), value)? == Flow::Exit {
                        break;
                    }
                }
            }
            Value::Instance(instance) if is_iterator(ctx.vm(), &instance.class) => {
                self.drive(ctx, &iterable)?;
            }
            Value::Instance(instance) => {
                let entries: Vec<_> = instance
                    .properties
                    .read()
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect();
                for (key, value) in entries {
                    if self.step(ctx, Value::String(key), value)? == Flow::Exit {
                        break;
                    }
                }
            }
            other => return Err(ExecutionErrorKind::NotIterable(other.type_name()).into()),
        }
        Ok(Value::Null)
    }

    fn step(&self, ctx: &Context, key: Value, value: Value) -> Result<Flow, Control> {
        if let Some(slot) = self.key {
            ctx.set(slot, key);
        }
        ctx.set(self.value, value);
        iterate(&self.body, ctx, &self.label)
    }

    /// The iterator protocol: `rewind`, then `valid`/`current`/`key`/body/`next`
    /// until `valid` turns false.
    fn drive(&self, ctx: &Context, iterator: &Value) -> Result<(), Control> {
        let call = |name: &str| access::call_method(ctx, iterator, name, EvaluatedArgs::default());
        call("rewind")?;
        while call("valid")?.is_truthy() {
            let value = call("current")?;
            let key = match self.key {
                Some(_) => call("key")?,
                None => Value::Null,
            };
            if self.step(ctx, key, value)? == Flow::Exit {
                break;
            }
            call("next")?;
        }
        Ok(())
    }
}

impl SwitchStatement {
    /// The first matching case runs; there is no fall-through.
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        let subject = self.subject.evaluate(ctx)?;
        for (case, body) in &self.cases {
            let candidate = case.evaluate(ctx)?;
            if arm_matches(&subject, &candidate) {
                return finish_switch(run_block(body, ctx));
            }
        }
        if let Some(default) = &self.default {
            return finish_switch(run_block(default, ctx));
        }
        Ok(Value::Null)
    }
}

fn finish_switch(outcome: Result<(), Control>) -> Eval {
    match outcome {
        Ok(()) | Err(Control::Break(None)) => Ok(Value::Null),
        Err(control) => Err(control),
    }
}

impl MatchExpression {
    pub fn evaluate(&self, ctx: &Context) -> Eval {
        let subject = self.subject.evaluate(ctx)?;
        for (conditions, result) in &self.arms {
            for condition in conditions {
                if arm_matches(&subject, &condition.evaluate(ctx)?) {
                    return result.evaluate(ctx);
                }
            }
        }
        match &self.default {
            Some(default) => default.evaluate(ctx),
            None => Ok(Value::Null),
        }
    }
}

impl TryStatement {
    /// Host panics inside the body surface as catchable errors located at
    /// `span`. `finally` always runs, and its own failure replaces the
    /// pending outcome.
    pub fn evaluate(&self, ctx: &Context, span: &Span) -> Eval {
        let outcome = match catch_unwind(AssertUnwindSafe(|| run_block(&self.body, ctx))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(panic = %message, at = %span, "recovered host panic");
                Err(Control::from(ExecutionErrorKind::HostFault(message)).at(span))
            }
        };

        let outcome = match outcome {
            Err(Control::Throw(thrown, origin)) => match self.handler(ctx, &thrown) {
                Some(clause) => {
                    if let Some(slot) = clause.variable {
                        ctx.set(slot, thrown);
                    }
                    run_block(&clause.body, ctx)
                }
                None => Err(Control::Throw(thrown, origin)),
            },
            outcome => outcome,
        };

        if let Some(finally) = &self.finally {
            run_block(finally, ctx)?;
        }
        outcome.map(|()| Value::Null)
    }

    fn handler(&self, ctx: &Context, thrown: &Value) -> Option<&CatchClause> {
        self.catches.iter().find(|clause| {
            clause.types.is_empty()
                || clause
                    .types
                    .iter()
                    .any(|ty| value_instance_of(ctx.vm(), thrown, &resolve_type_name(ctx, ty)))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{Expression, StatementKind};
    use crate::tree_walk_interpreter::{OutputBuffer, Vm};

    fn run(statements: Vec<Statement>, slots: usize) -> String {
        let vm = Vm::new();
        let output = OutputBuffer::new();
        vm.set_output(output.clone());
        let ctx = Context::root(vm, slots);
        run_block(&statements, &ctx).unwrap();
        output.contents()
    }

    #[test]
    fn labeled_break_leaves_the_outer_loop() {
        // outer: foreach ([1, 2] as $i) { foreach ([1, 2] as $j) { if ($j == 2) break outer; echo $i, $j; } }
        let inner = StatementKind::foreach(
            Expression::Array(vec![Expression::int(1), Expression::int(2)]),
            None,
            1,
            vec![
                StatementKind::if_else(
                    Expression::binary(Expression::var("j", 1), crate::ast::BinaryOperator::Eq, Expression::int(2)),
                    vec![StatementKind::Break(Some("outer".into())).into()],
                    None,
                ),
                StatementKind::Echo(vec![Expression::var("i", 0), Expression::var("j", 1)]).into(),
            ],
        );
        let mut outer = StatementKind::foreach(
            Expression::Array(vec![Expression::int(1), Expression::int(2)]),
            None,
            0,
            vec![inner],
        );
        if let StatementKind::Foreach(foreach) = &mut outer.kind {
            foreach.label = Some("outer".into());
        }
        assert_eq!(run(vec![outer], 2), "11");
    }

    #[test]
    fn switch_does_not_fall_through() {
        let switch = StatementKind::Switch(Box::new(SwitchStatement {
            subject: Expression::string("2"),
            cases: vec![
                (Expression::int(1), vec![StatementKind::echo(Expression::string("one"))]),
                (Expression::int(2), vec![StatementKind::echo(Expression::string("two"))]),
                (Expression::int(3), vec![StatementKind::echo(Expression::string("three"))]),
            ],
            default: Some(vec![StatementKind::echo(Expression::string("other"))]),
        }));
        assert_eq!(run(vec![switch.into()], 0), "two");
    }

    #[test]
    fn finally_runs_after_a_catch() {
        let attempt = StatementKind::Try(Box::new(TryStatement {
            body: vec![StatementKind::Throw(Expression::string("boom")).into()],
            catches: vec![CatchClause {
                types: vec![],
                variable: Some(0),
                body: vec![StatementKind::echo(Expression::var("e", 0))],
            }],
            finally: Some(vec![StatementKind::echo(Expression::string("!"))]),
        }));
        assert_eq!(run(vec![attempt.into()], 1), "boom!");
    }

    #[test]
    fn foreach_rejects_scalars() {
        let ctx = Context::root(Vm::new(), 1);
        let looped = StatementKind::foreach(Expression::int(1), None, 0, vec![]);
        match looped.evaluate(&ctx) {
            Err(Control::Throw(Value::Error(error), _)) => assert_eq!(
                error.message(),
                "foreach can only iterate arrays, objects or iterators, got int"
            ),
            other => panic!("expected an error, got {other:?}"),
        }
    }
}
