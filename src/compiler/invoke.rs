//! Invocation compilation
//!
//! Builds the steps of one task body from its classification and arguments.

use crate::compiler::fragment::CodeFragment;
use crate::compiler::import::{Classified, InvocationKind};
use crate::compiler::ir::Step;
use crate::compiler::literal::{is_identifier, Literal};
use crate::compiler::CompilationContext;
use crate::config::Task;
use crate::error::{CompileError, CompileResult};
use serde_json::Value;

/// Compile the invocation of a task into a body fragment
pub fn compile_invocation(
    classified: &Classified,
    task: &Task,
    ctx: &CompilationContext,
) -> CompileResult<CodeFragment> {
    let steps = invocation_steps(classified, &task.args, ctx)?;
    Ok(CodeFragment::body(steps, ctx.naming, ctx.indent))
}

/// Steps of one invocation, with arguments folded against `ctx`
pub fn invocation_steps(
    classified: &Classified,
    args: &[Value],
    ctx: &CompilationContext,
) -> CompileResult<Vec<Step>> {
    match classified.kind {
        InvocationKind::SetVars => set_vars(args, ctx),
        InvocationKind::Command => Ok(vec![Step::Command {
            program: classified.target.clone(),
            args: reconstruct_args(args, ctx)?,
        }]),
        InvocationKind::Default => Ok(vec![Step::Call {
            target: classified.target.clone(),
            args: reconstruct_args(args, ctx)?,
        }]),
    }
}

fn set_vars(args: &[Value], ctx: &CompilationContext) -> CompileResult<Vec<Step>> {
    let [Value::Object(vars)] = args else {
        return Err(CompileError::InvalidSetVarsArgs);
    };

    let folder = ctx.folder();
    vars.iter()
        .map(|(name, value)| {
            if !is_identifier(name) {
                return Err(CompileError::InvalidBinding(name.clone()));
            }
            Ok(Step::Declare {
                name: name.clone(),
                value: folder.reconstruct(value)?,
            })
        })
        .collect()
}

fn reconstruct_args(args: &[Value], ctx: &CompilationContext) -> CompileResult<Vec<Literal>> {
    let folder = ctx.folder();
    args.iter().map(|arg| folder.reconstruct(arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::template::Segment;
    use crate::config::NamingConfig;
    use crate::context::PublicContext;
    use crate::eval::{Bindings, Evaluator};
    use crate::runner::builtins::Registry;
    use serde_json::json;

    fn compile(kind: InvocationKind, target: &str, args: Vec<Value>) -> CompileResult<CodeFragment> {
        let evaluator = Evaluator::new();
        let public: Bindings = PublicContext::new().with_env("NAME", "ys").to_bindings();
        let naming = NamingConfig::default();
        let registry = Registry::new();
        let ctx = CompilationContext {
            evaluator: &evaluator,
            public: &public,
            bindings: &public,
            naming: &naming,
            registry: &registry,
            indent: 2,
            task_index: 0,
            runtime_names: None,
        };
        let classified = Classified {
            kind,
            target: target.to_string(),
            from: None,
            fragment: CodeFragment::new(),
        };
        compile_invocation(&classified, &Task::new(target).with_args(args), &ctx)
    }

    #[test]
    fn test_default_call() {
        let fragment = compile(
            InvocationKind::Default,
            "f",
            vec![json!("hello"), json!("${env.name}")],
        )
        .unwrap();
        assert_eq!(fragment.body, "  result = f(\"hello\", tostring(env.name))\n");
        assert_eq!(
            fragment.steps,
            vec![Step::Call {
                target: "f".to_string(),
                args: vec![
                    Literal::Const(json!("hello")),
                    Literal::Deferred(vec![Segment::Expr("env.name".to_string())]),
                ],
            }]
        );
    }

    #[test]
    fn test_call_folds_public_context() {
        let fragment = compile(
            InvocationKind::Default,
            "print",
            vec![json!("${build.env.NAME}"), json!(3), json!([true, null])],
        )
        .unwrap();
        assert_eq!(fragment.body, "  result = print(\"ys\", 3, {true, nil})\n");
    }

    #[test]
    fn test_set_vars_declares_each_key() {
        let fragment = compile(
            InvocationKind::SetVars,
            "setVars",
            vec![json!({"name": "${build.env.NAME}", "count": 2})],
        )
        .unwrap();
        assert_eq!(
            fragment.body,
            "  local name = \"ys\"\n  local count = 2\n"
        );
    }

    #[test]
    fn test_set_vars_rejects_bad_args() {
        for args in [
            vec![],
            vec![json!("x")],
            vec![json!([1])],
            vec![json!({"a": 1}), json!({"b": 2})],
        ] {
            let err = compile(InvocationKind::SetVars, "setVars", args).unwrap_err();
            assert!(matches!(err, CompileError::InvalidSetVarsArgs));
            assert!(err.to_string().contains("invalid args"));
        }
    }

    #[test]
    fn test_set_vars_rejects_bad_names() {
        let err = compile(
            InvocationKind::SetVars,
            "setVars",
            vec![json!({"not-a-name": 1})],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidBinding(ref name) if name == "not-a-name"));
    }

    #[test]
    fn test_command_step() {
        let fragment = compile(InvocationKind::Command, "echo", vec![json!("hi")]).unwrap();
        assert_eq!(
            fragment.steps,
            vec![Step::Command {
                program: "echo".to_string(),
                args: vec![Literal::Const(json!("hi"))],
            }]
        );
        assert!(fragment.body.contains("local argv = {\"echo\", \"hi\"}"));
        assert!(fragment.imports.is_empty());
    }
}
