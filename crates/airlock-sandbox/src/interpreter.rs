//! Tree-walking evaluator plus the shim surface the script sees.
//!
//! The shim injects four names into the execution scope: `settings`, `llm`,
//! `set_result`, and `print`. `llm.complete` is the single suspension point;
//! the evaluator blocks inside the host callback until a response (or
//! abandonment) arrives.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::parser::{parse, BinOp, Expr, Stmt};
use crate::value::Value;
use crate::ScriptError;

/// Host half of the `llm.complete` contract. Blocks the script's thread of
/// control; returns the operator-provided response, or an error when the
/// wait was abandoned (timeout, shutdown).
pub(crate) type LlmCallback<'run> =
    Box<dyn FnMut(&str, &str) -> Result<String, ScriptError> + Send + 'run>;

/// Everything a finished (or failed) script leaves behind.
#[derive(Debug, Default)]
pub(crate) struct ScriptArtifacts {
    pub result: Option<serde_json::Value>,
}

pub(crate) struct Interpreter<'run> {
    settings: BTreeMap<String, String>,
    variables: BTreeMap<String, Value>,
    stdout: Arc<Mutex<String>>,
    cancelled: Arc<AtomicBool>,
    llm: LlmCallback<'run>,
    result: Option<serde_json::Value>,
}

impl<'run> Interpreter<'run> {
    pub(crate) fn new(
        settings: BTreeMap<String, String>,
        stdout: Arc<Mutex<String>>,
        cancelled: Arc<AtomicBool>,
        llm: LlmCallback<'run>,
    ) -> Self {
        Self {
            settings,
            variables: BTreeMap::new(),
            stdout,
            cancelled,
            llm,
            result: None,
        }
    }

    /// Parses and runs the whole script. The cancel flag is honored between
    /// statements, which keeps abandoned scripts from running unbounded.
    pub(crate) fn run(mut self, source: &str) -> Result<ScriptArtifacts, ScriptError> {
        let program = parse(source)?;
        for statement in program {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(ScriptError::Cancelled);
            }
            match statement {
                Stmt::Assign { name, expr } => {
                    let value = self.eval(&expr)?;
                    self.variables.insert(name, value);
                }
                Stmt::Expr(expr) => {
                    self.eval(&expr)?;
                }
            }
        }
        Ok(ScriptArtifacts {
            result: self.result,
        })
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::Runtime(format!("name '{name}' is not defined"))),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(value) => Ok(Value::Int(-value)),
                Value::Float(value) => Ok(Value::Float(-value)),
                other => Err(ScriptError::Runtime(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                apply_binary(*op, left, right)
            }
            Expr::Call {
                namespace,
                function,
                args,
                line,
            } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg)?);
                }
                self.call(namespace.as_deref(), function, evaluated, *line)
            }
        }
    }

    fn call(
        &mut self,
        namespace: Option<&str>,
        function: &str,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, ScriptError> {
        match (namespace, function) {
            (None, "print") => {
                let rendered = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut stdout = self
                    .stdout
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                stdout.push_str(&rendered);
                stdout.push('\n');
                Ok(Value::Null)
            }
            (None, "set_result") => {
                let [value] = take_args::<1>(args, "set_result", line)?;
                self.result = Some(value.into_json());
                Ok(Value::Null)
            }
            (Some("settings"), "get") => {
                let [key] = take_args::<1>(args, "settings.get", line)?;
                let Value::Str(key) = key else {
                    return Err(ScriptError::Runtime(format!(
                        "settings.get expects a string key, got {}",
                        key.type_name()
                    )));
                };
                Ok(self
                    .settings
                    .get(&key)
                    .map(|value| Value::Str(value.clone()))
                    .unwrap_or(Value::Null))
            }
            (Some("settings"), "keys") => {
                if !args.is_empty() {
                    return Err(ScriptError::Runtime(
                        "settings.keys takes no arguments".to_string(),
                    ));
                }
                Ok(Value::List(
                    self.settings
                        .keys()
                        .map(|key| Value::Str(key.clone()))
                        .collect(),
                ))
            }
            (Some("llm"), "complete") => {
                let (prompt, model) = match args.len() {
                    1 | 2 => {
                        let mut args = args.into_iter();
                        let prompt = args.next().unwrap_or(Value::Null);
                        let model = args.next();
                        let Value::Str(prompt) = prompt else {
                            return Err(ScriptError::Runtime(
                                "llm.complete expects a string prompt".to_string(),
                            ));
                        };
                        let model = match model {
                            None => "default".to_string(),
                            Some(Value::Str(model)) => model,
                            Some(other) => {
                                return Err(ScriptError::Runtime(format!(
                                    "llm.complete expects a string model, got {}",
                                    other.type_name()
                                )));
                            }
                        };
                        (prompt, model)
                    }
                    n => {
                        return Err(ScriptError::Runtime(format!(
                            "llm.complete takes 1 or 2 arguments, got {n}"
                        )));
                    }
                };
                let response = (self.llm)(&prompt, &model)?;
                Ok(Value::Str(response))
            }
            (Some(namespace), function) => Err(ScriptError::Runtime(format!(
                "unknown function '{namespace}.{function}' at line {line}"
            ))),
            (None, function) => Err(ScriptError::Runtime(format!(
                "unknown function '{function}' at line {line}"
            ))),
        }
    }
}

fn take_args<const N: usize>(
    args: Vec<Value>,
    function: &str,
    line: usize,
) -> Result<[Value; N], ScriptError> {
    <[Value; N]>::try_from(args).map_err(|args: Vec<Value>| {
        ScriptError::Runtime(format!(
            "{function} takes {N} argument(s), got {} at line {line}",
            args.len()
        ))
    })
}

fn apply_binary(op: BinOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    use Value::{Float, Int, Str};
    match (op, left, right) {
        (BinOp::Add, Str(left), right) => Ok(Str(format!("{left}{right}"))),
        (BinOp::Add, left, Str(right)) => Ok(Str(format!("{left}{right}"))),
        (BinOp::Add, Int(left), Int(right)) => Ok(Int(left.wrapping_add(right))),
        (BinOp::Sub, Int(left), Int(right)) => Ok(Int(left.wrapping_sub(right))),
        (BinOp::Mul, Int(left), Int(right)) => Ok(Int(left.wrapping_mul(right))),
        (BinOp::Div, Int(_), Int(0)) => {
            Err(ScriptError::Runtime("division by zero".to_string()))
        }
        (BinOp::Div, Int(left), Int(right)) => Ok(Int(left / right)),
        (op, left, right) => {
            let (left, right) = match (left, right) {
                (Int(l), Float(r)) => (l as f64, r),
                (Float(l), Int(r)) => (l, r as f64),
                (Float(l), Float(r)) => (l, r),
                (left, right) => {
                    return Err(ScriptError::Runtime(format!(
                        "unsupported operands {} and {}",
                        left.type_name(),
                        right.type_name()
                    )));
                }
            };
            let value = match op {
                BinOp::Add => left + right,
                BinOp::Sub => left - right,
                BinOp::Mul => left * right,
                BinOp::Div if right == 0.0 => {
                    return Err(ScriptError::Runtime("division by zero".to_string()));
                }
                BinOp::Div => left / right,
            };
            Ok(Float(value))
        }
    }
}
