//! Explicit-stack evaluator.
//!
//! Each top-level root runs on a fresh `Machine`: a control stack of pending
//! work, a value stack of finished results, and the current environment. The
//! dispatch loop pops one control item at a time:
//!
//! - a syntax node is expanded (containers) or turned into a value (leaves)
//! - `Eval` resolves the operator value and arranges for its arguments
//! - `Follow` applies a resolved operator, closure or list literal once its
//!   operands are on the value stack
//! - `Return` restores the caller's environment and keeps only the last body result
//!
//! A closure applied while a `Return` marker is on top of the control stack is
//! in tail position. It reuses that marker instead of pushing another, so
//! self-recursive tail calls run in constant control-stack space.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::analyzer::analyze;
use crate::ast::{NodeId, NodeKind, Value};
use crate::builtinops::{BuiltinOp, OpKind, SpecialForm};
use crate::lexer::lex_with_source;
use crate::parser::{SyntaxNode, SyntaxTree, parse};
use crate::{DEFAULT_SOURCE_NAME, Error, InterpreterErrorKind};

/// Name bound to the running closure inside its own body
pub const LAMBDA_BINDING: &str = "#lambda";
/// Name bound to the list of supplied arguments inside a closure body
pub const ARGS_BINDING: &str = "#args";

/// Lexical environment: a chain of immutable binding frames
#[derive(Clone, Default)]
pub struct Environment(Rc<Frame>);

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child frame holding `bindings`, with `self` as its parent
    pub fn extend(&self, bindings: HashMap<String, Value>) -> Self {
        Environment(Rc::new(Frame {
            bindings,
            parent: Some(self.clone()),
        }))
    }

    /// Walk the chain outwards; the innermost binding wins
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut frame: &Frame = &self.0;
        loop {
            if let Some(value) = frame.bindings.get(name) {
                return Some(value);
            }
            match &frame.parent {
                Some(parent) => frame = &parent.0,
                None => return None,
            }
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.0.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        write!(f, "Environment({names:?}")?;
        if self.0.parent.is_some() {
            write!(f, ", ..")?;
        }
        write!(f, ")")
    }
}

/// A `lambda` value: parameter list and body captured as syntax, plus the
/// environment the form was evaluated in.
pub struct Closure {
    /// Declared parameter count
    pub arity: usize,
    tree: Rc<SyntaxTree>,
    params: NodeId,
    body: Vec<NodeId>,
    env: Environment,
}

impl Closure {
    fn param_nodes(&self) -> impl Iterator<Item = &SyntaxNode> + '_ {
        self.tree
            .node(self.params)
            .children
            .iter()
            .map(|&id| self.tree.node(id))
    }

    /// Every parameter must be a plain symbol
    fn check_params(&self) -> Result<(), Error> {
        match self
            .param_nodes()
            .find(|node| !matches!(node.kind, NodeKind::Symbol(_)))
        {
            Some(bad) => Err(Error::interpreter(
                InterpreterErrorKind::InvalidParams,
                format!("lambda parameter `{}` is not a symbol", bad.token.text),
            )
            .at(&bad.token)),
            None => Ok(()),
        }
    }

    fn param_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.param_nodes().filter_map(|node| match &node.kind {
            NodeKind::Symbol(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.param_names().collect();
        write!(f, "Closure(params={params:?}, body={})", self.body.len())
    }
}

/// Work items on the control stack
#[derive(Debug)]
enum Control {
    /// A syntax node still to be evaluated
    Node(NodeId),
    /// A value produced without a syntax node (the missing `if` alternate)
    Value(Value),
    /// The operator of `call_site` is about to land on the value stack; its
    /// `argc` unevaluated argument subtrees sit directly below this marker
    Eval { argc: usize, call_site: NodeId },
    /// Operands are on the value stack; apply
    Follow(Apply),
    /// A closure body is running; `results` values belong to it
    Return { results: usize, caller: Environment },
}

#[derive(Debug)]
enum Apply {
    List(NodeId),
    Primitive {
        op: &'static BuiltinOp,
        argc: usize,
        call_site: NodeId,
    },
    If {
        consequent: NodeId,
        alternate: Option<NodeId>,
        call_site: NodeId,
    },
    Lambda {
        closure: Rc<Closure>,
        argc: usize,
    },
}

fn stack_imbalance(what: &str) -> Error {
    Error::interpreter(InterpreterErrorKind::StackImbalance, what.to_owned())
}

/// Evaluation state for one top-level root
struct Machine<'a> {
    tree: &'a Rc<SyntaxTree>,
    control: Vec<Control>,
    values: Vec<Value>,
    env: Environment,
    output: &'a mut dyn Write,
    peak: usize,
}

impl<'a> Machine<'a> {
    fn new(tree: &'a Rc<SyntaxTree>, root: NodeId, output: &'a mut dyn Write) -> Self {
        Machine {
            tree,
            control: vec![Control::Node(root)],
            values: Vec::new(),
            env: Environment::new(),
            output,
            peak: 1,
        }
    }

    fn run(&mut self) -> Result<Value, Error> {
        while let Some(item) = self.control.pop() {
            trace!(depth = self.control.len(), ?item, "dispatch");
            match item {
                Control::Node(id) => self.eval_node(id)?,
                Control::Value(value) => self.values.push(value),
                Control::Eval { argc, call_site } => self.eval_operator(argc, call_site)?,
                Control::Follow(apply) => self.follow(apply)?,
                Control::Return { results, caller } => self.unwind(results, caller)?,
            }
            self.peak = self.peak.max(self.control.len());
        }

        match (self.values.pop(), self.values.is_empty()) {
            (Some(result), true) => Ok(result),
            (Some(_), false) => Err(stack_imbalance("values left over after evaluation")),
            (None, _) => Err(stack_imbalance("evaluation produced no value")),
        }
    }

    fn eval_node(&mut self, id: NodeId) -> Result<(), Error> {
        let tree: &'a SyntaxTree = self.tree;
        let node = tree.node(id);
        match &node.kind {
            NodeKind::Expr { arity: Some(_) } => {
                let Some((&op, args)) = node.children.split_first() else {
                    return Err(Error::interpreter(
                        InterpreterErrorKind::NotCallable,
                        "cannot evaluate an empty expression ()",
                    )
                    .at(&node.token));
                };
                self.control
                    .extend(args.iter().rev().map(|&arg| Control::Node(arg)));
                self.control.push(Control::Eval {
                    argc: args.len(),
                    call_site: id,
                });
                self.control.push(Control::Node(op));
            }
            NodeKind::List { arity: Some(_) } => {
                self.control.push(Control::Follow(Apply::List(id)));
                self.control
                    .extend(node.children.iter().rev().map(|&item| Control::Node(item)));
            }
            NodeKind::Symbol(name) => {
                let Some(value) = self.env.get(name) else {
                    let context = tree
                        .enclosing_form(id)
                        .map(|form| format!(" in form at {}", form.token.location()))
                        .unwrap_or_default();
                    return Err(Error::interpreter(
                        InterpreterErrorKind::UnboundSymbol,
                        format!("unbound symbol `{name}`{context}"),
                    )
                    .at(&node.token));
                };
                self.values.push(value.clone());
            }
            kind => match kind.literal_value() {
                Some(value) => self.values.push(value),
                None => {
                    return Err(Error::interpreter(
                        InterpreterErrorKind::Unimplemented,
                        format!("cannot evaluate unanalyzed node `{}`", node.token.text),
                    )
                    .at(&node.token));
                }
            },
        }
        Ok(())
    }

    fn eval_operator(&mut self, argc: usize, call_site: NodeId) -> Result<(), Error> {
        let tree: &'a SyntaxTree = self.tree;
        let call = &tree.node(call_site).token;
        let operator = self
            .values
            .pop()
            .ok_or_else(|| stack_imbalance("operator position produced no value"))?;

        match &operator {
            Value::Lambda(closure) => {
                if argc != closure.arity {
                    return Err(Error::arity(closure.arity, argc).at(call));
                }
                closure.check_params()?;
                let closure = Rc::clone(closure);
                self.splice_follow(argc, Apply::Lambda { closure, argc })
            }
            &Value::Operator(op) => {
                op.validate_arity(argc).map_err(|e| e.at(call))?;
                match op.op_kind {
                    OpKind::Primitive(_) => self.splice_follow(
                        argc,
                        Apply::Primitive {
                            op,
                            argc,
                            call_site,
                        },
                    ),
                    OpKind::SpecialForm(SpecialForm::Lambda) => self.capture_lambda(argc),
                    OpKind::SpecialForm(SpecialForm::If) => {
                        let (predicate, consequent, alternate) =
                            match self.take_raw_args(argc)?.as_slice() {
                                &[predicate, consequent] => (predicate, consequent, None),
                                &[predicate, consequent, alternate] => {
                                    (predicate, consequent, Some(alternate))
                                }
                                _ => return Err(Error::arity(op.arity, argc).at(call)),
                            };
                        self.control.push(Control::Follow(Apply::If {
                            consequent,
                            alternate,
                            call_site,
                        }));
                        self.control.push(Control::Node(predicate));
                        Ok(())
                    }
                    OpKind::Reserved => Err(Error::interpreter(
                        InterpreterErrorKind::Unimplemented,
                        format!("operator `{}` is reserved but not implemented", op.id),
                    )
                    .at(call)),
                }
            }
            other => Err(Error::interpreter(
                InterpreterErrorKind::NotCallable,
                format!("{other} is not callable"),
            )
            .at(call)),
        }
    }

    /// Insert `apply` below the `argc` argument subtrees still on the control stack
    fn splice_follow(&mut self, argc: usize, apply: Apply) -> Result<(), Error> {
        let at = self
            .control
            .len()
            .checked_sub(argc)
            .ok_or_else(|| stack_imbalance("missing argument subtrees"))?;
        self.control.insert(at, Control::Follow(apply));
        Ok(())
    }

    /// Remove the `argc` unevaluated argument subtrees, in source order
    fn take_raw_args(&mut self, argc: usize) -> Result<Vec<NodeId>, Error> {
        let at = self
            .control
            .len()
            .checked_sub(argc)
            .ok_or_else(|| stack_imbalance("missing argument subtrees"))?;
        self.control
            .split_off(at)
            .into_iter()
            .rev()
            .map(|item| match item {
                Control::Node(id) => Ok(id),
                _ => Err(stack_imbalance("argument slot holds a marker")),
            })
            .collect()
    }

    fn capture_lambda(&mut self, argc: usize) -> Result<(), Error> {
        let raw = self.take_raw_args(argc)?;
        let Some((&params, body)) = raw.split_first() else {
            return Err(Error::arity("at least 2", argc));
        };
        let params_node = self.tree.node(params);
        if !matches!(params_node.kind, NodeKind::Expr { .. }) {
            return Err(Error::interpreter(
                InterpreterErrorKind::InvalidParams,
                format!(
                    "lambda parameters must be a (...) list, got `{}`",
                    params_node.token.text
                ),
            )
            .at(&params_node.token));
        }

        let closure = Closure {
            arity: params_node.children.len(),
            tree: Rc::clone(self.tree),
            params,
            body: body.to_vec(),
            env: self.env.clone(),
        };
        self.values.push(Value::Lambda(Rc::new(closure)));
        Ok(())
    }

    fn pop_values(&mut self, count: usize) -> Result<Vec<Value>, Error> {
        let at = self
            .values
            .len()
            .checked_sub(count)
            .ok_or_else(|| stack_imbalance("missing operand values"))?;
        Ok(self.values.split_off(at))
    }

    fn follow(&mut self, apply: Apply) -> Result<(), Error> {
        match apply {
            Apply::List(id) => {
                let len = self.tree.node(id).children.len();
                let items = self.pop_values(len)?;
                self.values.push(Value::List(Rc::new(items)));
            }
            Apply::Primitive {
                op,
                argc,
                call_site,
            } => {
                let OpKind::Primitive(func) = op.op_kind else {
                    return Err(Error::interpreter(
                        InterpreterErrorKind::Unimplemented,
                        format!("operator `{}` is not a primitive", op.id),
                    ));
                };
                let args = self.pop_values(argc)?;
                let result = func(&args, &mut *self.output)
                    .map_err(|e| e.at(&self.tree.node(call_site).token))?;
                trace!(op = op.id, %result, "applied primitive");
                self.values.push(result);
            }
            Apply::If {
                consequent,
                alternate,
                call_site,
            } => match self.values.pop() {
                Some(Value::Bool(true)) => self.control.push(Control::Node(consequent)),
                Some(Value::Bool(false)) => self
                    .control
                    .push(alternate.map_or(Control::Value(Value::Nil), Control::Node)),
                Some(other) => {
                    return Err(Error::type_error(format!(
                        "if expects a boolean predicate, got {}",
                        other.type_atom()
                    ))
                    .at(&self.tree.node(call_site).token));
                }
                None => return Err(stack_imbalance("if predicate produced no value")),
            },
            Apply::Lambda { closure, argc } => self.apply_lambda(closure, argc)?,
        }
        Ok(())
    }

    fn apply_lambda(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), Error> {
        let args = Rc::new(self.pop_values(argc)?);

        let mut bindings = HashMap::with_capacity(argc + 2);
        bindings.insert(LAMBDA_BINDING.to_owned(), Value::Lambda(Rc::clone(&closure)));
        bindings.insert(ARGS_BINDING.to_owned(), Value::List(Rc::clone(&args)));
        for (name, value) in closure.param_names().zip(args.iter()) {
            bindings.insert(name.to_owned(), value.clone());
        }
        let callee = closure.env.extend(bindings);
        let body_len = closure.body.len();

        if let Some(Control::Return { results, .. }) = self.control.last_mut() {
            // Tail call: the earlier body results of the current frame are dead
            let stale = results.saturating_sub(1);
            let keep = self
                .values
                .len()
                .checked_sub(stale)
                .ok_or_else(|| stack_imbalance("tail call found too few frame results"))?;
            self.values.truncate(keep);
            *results = body_len;
        } else {
            self.control.push(Control::Return {
                results: body_len,
                caller: self.env.clone(),
            });
        }

        self.env = callee;
        self.control
            .extend(closure.body.iter().rev().map(|&id| Control::Node(id)));
        Ok(())
    }

    fn unwind(&mut self, results: usize, caller: Environment) -> Result<(), Error> {
        self.env = caller;
        if results > 1 {
            let last = self
                .values
                .pop()
                .ok_or_else(|| stack_imbalance("call frame produced no value"))?;
            let keep = self
                .values
                .len()
                .checked_sub(results - 1)
                .ok_or_else(|| stack_imbalance("call frame produced too few values"))?;
            self.values.truncate(keep);
            self.values.push(last);
        }
        Ok(())
    }
}

/// The evaluator instance: configuration plus statistics of the last run.
///
/// ```
/// use stacklisp::{Interpreter, Value};
///
/// let mut interpreter = Interpreter::new().with_source_name("demo.sl");
/// let value = interpreter.evaluate("((lambda (n) (+ n 1)) 5)").unwrap();
/// assert_eq!(value, Value::Number(6.0));
/// ```
pub struct Interpreter {
    source_name: String,
    output: Box<dyn Write>,
    peak_control_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Default source name, `display` to standard output
    pub fn new() -> Self {
        Interpreter {
            source_name: DEFAULT_SOURCE_NAME.to_owned(),
            output: Box::new(io::stdout()),
            peak_control_depth: 0,
        }
    }

    /// Name stamped on every token, shown in diagnostics
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Sink for the `display` primitive
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Control-stack high-water mark of the most recently evaluated root
    pub fn peak_control_depth(&self) -> usize {
        self.peak_control_depth
    }

    /// Lex, parse and analyze `program`.
    pub fn load(&self, program: &str) -> Result<Rc<SyntaxTree>, Error> {
        let tokens = lex_with_source(program, &self.source_name)?;
        let mut tree = parse(tokens)?;
        analyze(&mut tree)?;
        Ok(Rc::new(tree))
    }

    /// Evaluate every root in order and return the last value (`#nil` for an
    /// empty program). Stops at the first failing root.
    pub fn evaluate(&mut self, program: &str) -> Result<Value, Error> {
        let tree = self.load(program)?;
        let mut result = Value::Nil;
        for &root in tree.roots() {
            result = self.eval_root(&tree, root)?;
        }
        Ok(result)
    }

    /// Evaluate every root independently, one result per root. Only lexer,
    /// parser and analyzer failures fail the whole call.
    pub fn evaluate_each(&mut self, program: &str) -> Result<Vec<Result<Value, Error>>, Error> {
        let tree = self.load(program)?;
        Ok(tree
            .roots()
            .iter()
            .map(|&root| self.eval_root(&tree, root))
            .collect())
    }

    fn eval_root(&mut self, tree: &Rc<SyntaxTree>, root: NodeId) -> Result<Value, Error> {
        debug!(source = %self.source_name, root = %tree.node(root).token, "evaluating root");
        let mut machine = Machine::new(tree, root, &mut *self.output);
        let result = machine.run();
        self.peak_control_depth = machine.peak;
        match &result {
            Ok(value) => debug!(%value, peak = self.peak_control_depth, "root finished"),
            Err(error) => debug!(%error, "root failed"),
        }
        result
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{TypeAtom, val};
    use std::cell::RefCell;

    /// `display` sink that stays readable after the interpreter takes ownership
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
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn quiet() -> Interpreter {
        Interpreter::new().with_output(io::sink())
    }

    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),
        SpecificError(InterpreterErrorKind),
    }
    use TestResult::*;

    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn execute_test_case(test_id: usize, program: &str, expected: &TestResult) {
        let result = quiet().evaluate(program);
        match (result, expected) {
            (Ok(actual), EvalResult(expected)) => {
                assert_eq!(&actual, expected, "#{test_id} {program}: wrong value");
            }
            (Err(error), SpecificError(kind)) => {
                assert_eq!(
                    error.interpreter_kind(),
                    Some(*kind),
                    "#{test_id} {program}: wrong error {error}"
                );
            }
            (actual, expected) => {
                panic!("#{test_id} {program}: expected {expected:?}, got {actual:?}")
            }
        }
    }

    #[test]
    fn test_evaluation() {
        use InterpreterErrorKind::*;

        let test_cases: Vec<(&str, TestResult)> = vec![
            // self-evaluating leaves
            ("42", success(42)),
            ("-1.5", success(-1.5)),
            ("\"hi\"", success("hi")),
            ("'c'", success('c')),
            ("#t", success(true)),
            ("#nil", EvalResult(Value::Nil)),
            (":list", success(TypeAtom::List)),
            ("", EvalResult(Value::Nil)),
            // primitives
            ("(+ 1 2)", success(3)),
            ("(+)", success(0)),
            ("(+ 1 (+ 2 (+ 3 4)))", success(10)),
            ("(- 10 (* 2 3))", success(4)),
            ("(% 10 4)", success(2)),
            ("(< 1 2)", success(true)),
            ("(> 1 2)", success(false)),
            ("(eq (+ 1 1) 2)", success(true)),
            ("(not (< 1 2))", success(false)),
            ("(and #t (< 1 2))", success(true)),
            ("(or #f #f)", success(false)),
            ("(type [1])", success(TypeAtom::List)),
            ("(type +)", success(TypeAtom::Lambda)),
            ("(type (lambda (x) x))", success(TypeAtom::Lambda)),
            ("(begin 1 2 3)", success(3)),
            ("(length [1 2 3])", success(3)),
            ("(car (cdr [1 2 3]))", success(2)),
            ("(cons 0 [1])", success([0, 1])),
            ("(display)", EvalResult(Value::Nil)),
            // list literals evaluate their elements
            ("[1 (+ 1 1) \"three\"]", success(vec![val(1), val(2), val("three")])),
            ("[]", success(Vec::<Value>::new())),
            ("[[1] [(+ 1 1)]]", success(vec![val([1]), val([2])])),
            // conditionals
            ("(if (< 1 2) 10 20)", success(10)),
            ("(if (< 2 1) 10 20)", success(20)),
            ("(if (< 2 1) 10)", EvalResult(Value::Nil)),
            ("(if #t 1 (car []))", success(1)),
            ("(if #f (car []) 2)", success(2)),
            ("(if 1 2 3)", SpecificError(Type)),
            ("(if #t)", SpecificError(Arity)),
            ("(if #t 1 2 3)", SpecificError(Arity)),
            // closures
            ("((lambda (n) (+ n 1)) 5)", success(6)),
            ("((lambda () 7))", success(7)),
            ("((lambda (a b) (- a b)) 10 3)", success(7)),
            ("((lambda (x) 1 2 x) 3)", success(3)),
            ("((lambda (x) #args) 1)", success([1])),
            ("((lambda (a b) #args) 1 2)", success([1, 2])),
            ("((lambda (x) (type #lambda)) 1)", success(TypeAtom::Lambda)),
            ("(((lambda (x) (lambda (y) (+ x y))) 10) 5)", success(15)),
            ("((lambda (f) (f 2 3)) +)", success(5)),
            ("((lambda (f) (f 2 3)) <)", success(true)),
            ("((lambda (f) (f #t 1 2)) if)", success(1)),
            ("((lambda (x) (+ x 1)) (+ 1 1))", success(3)),
            (
                "((lambda (n) (if (< n 1) 0 (+ n (#lambda (- n 1))))) 10)",
                success(55),
            ),
            ("((lambda (x x) x) 1 2)", success(2)),
            // errors
            ("((lambda (n) (+ n 1)) 5 6)", SpecificError(Arity)),
            ("((lambda (n) (+ n 1)))", SpecificError(Arity)),
            ("((lambda (1) 1) 2)", SpecificError(InvalidParams)),
            ("((lambda ([a]) a) 2)", SpecificError(InvalidParams)),
            ("(lambda x x)", SpecificError(InvalidParams)),
            ("(lambda (x))", SpecificError(Arity)),
            ("(1 2)", SpecificError(NotCallable)),
            ("(\"f\")", SpecificError(NotCallable)),
            ("()", SpecificError(NotCallable)),
            ("x", SpecificError(UnboundSymbol)),
            ("(+ 1 y)", SpecificError(UnboundSymbol)),
            ("#lambda", SpecificError(UnboundSymbol)),
            ("(((lambda (x) (lambda (y) x)) 1) z)", SpecificError(UnboundSymbol)),
            ("(+ 1 \"2\")", SpecificError(Type)),
            ("(< 1 #t)", SpecificError(Type)),
            ("(< 1)", SpecificError(Arity)),
            ("(eq 1 2 3)", SpecificError(Arity)),
            ("(/ 1 0)", SpecificError(DivisionByZero)),
            ("(def x 1)", SpecificError(Unimplemented)),
            ("(let)", SpecificError(Unimplemented)),
            // the last root wins, and any failing root fails the whole program
            ("1 2 3", success(3)),
            ("(+ 1 1) (car [])", SpecificError(Type)),
        ];

        for (test_id, (program, expected)) in test_cases.iter().enumerate() {
            execute_test_case(test_id, program, expected);
        }
    }

    #[test]
    fn test_lambda_scoping() {
        // a closure sees its definition environment, not the caller's
        let program = "((lambda (x) ((lambda (f) ((lambda (x) (f)) 100)) (lambda () x))) 1)";
        assert_eq!(quiet().evaluate(program).unwrap(), val(1));

        // the caller's environment is restored after a non-tail call returns
        let program = "((lambda (x) (+ ((lambda (x) x) 10) x)) 1)";
        assert_eq!(quiet().evaluate(program).unwrap(), val(11));

        // parameters shadow the synthetic bindings
        assert_eq!(quiet().evaluate("((lambda (#args) #args) 4)").unwrap(), val(4));
    }

    #[test]
    fn test_tail_calls_run_in_constant_control_space() {
        let looping = |n: u32| {
            format!("((lambda (n) (if (< n {n}) (#lambda (+ n 1)) n)) 0)")
        };

        let mut interpreter = quiet();
        assert_eq!(interpreter.evaluate(&looping(10)).unwrap(), val(10));
        let short_peak = interpreter.peak_control_depth();

        assert_eq!(interpreter.evaluate(&looping(100_000)).unwrap(), val(100_000));
        let long_peak = interpreter.peak_control_depth();
        assert_eq!(short_peak, long_peak);
        assert!(long_peak < 16, "peak control depth {long_peak}");

        // multi-expression bodies still discard their stale results
        let program = "((lambda (n) (display n) (if (< n 1000) (#lambda (+ n 1)) n)) 0)";
        assert_eq!(quiet().evaluate(program).unwrap(), val(1000));
    }

    #[test]
    fn test_non_tail_recursion_grows_the_control_stack() {
        let counting = |n: u32| {
            format!("((lambda (n) (if (< n {n}) (+ 1 (#lambda (+ n 1))) 0)) 0)")
        };

        let mut interpreter = quiet();
        assert_eq!(interpreter.evaluate(&counting(100)).unwrap(), val(100));
        let shallow = interpreter.peak_control_depth();
        assert_eq!(interpreter.evaluate(&counting(1000)).unwrap(), val(1000));
        let deep = interpreter.peak_control_depth();
        assert!(deep > shallow + 900, "{shallow} -> {deep}");
    }

    #[test]
    fn test_display_writes_to_configured_output() {
        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::new().with_output(buffer.clone());
        let result = interpreter
            .evaluate("(display \"a\" 1 'c' [1 \"s\"]) (display (+ 1 2))")
            .unwrap();
        assert_eq!(result, Value::Nil);
        assert_eq!(buffer.contents(), "a\n1\nc\n[1 \"s\"]\n3\n");

        // list elements are evaluated left to right
        let buffer = SharedBuffer::default();
        quiet()
            .with_output(buffer.clone())
            .evaluate("[(display 1) (display 2) (display 3)]")
            .unwrap();
        assert_eq!(buffer.contents(), "1\n2\n3\n");
    }

    #[test]
    fn test_evaluate_each_isolates_roots() {
        let results = quiet()
            .evaluate_each("(+ 1 2) (car []) x (if (< 2 1) 10)")
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok(val(3)));
        assert_eq!(results[1].as_ref().unwrap_err().interpreter_kind(), Some(InterpreterErrorKind::Type));
        assert_eq!(
            results[2].as_ref().unwrap_err().interpreter_kind(),
            Some(InterpreterErrorKind::UnboundSymbol)
        );
        assert_eq!(results[3], Ok(Value::Nil));

        assert!(matches!(quiet().evaluate_each("(+ 1"), Err(Error::ParserError(_))));
    }

    #[test]
    fn test_error_locations() {
        let mut interpreter = quiet().with_source_name("prog.sl");
        let error = interpreter.evaluate("(+ 1 2)\n  ((lambda (n) n) 1 2)").unwrap_err();
        assert_eq!(
            error.to_string(),
            "InterpreterError: expected 1 arguments, got 2 (at prog.sl#2:3 ()"
        );

        let error = interpreter.evaluate("(f (g x))").unwrap_err();
        assert_eq!(
            error.to_string(),
            "InterpreterError: unbound symbol `f` in form at prog.sl#1:1 (at prog.sl#1:2 f)"
        );

        let error = interpreter.evaluate("(+ 1 2)\n(if 1 2 3)").unwrap_err();
        assert_eq!(error.interpreter_kind(), Some(InterpreterErrorKind::Type));
        assert_eq!(
            error.to_string(),
            "InterpreterError: if expects a boolean predicate, got :number (at prog.sl#2:1 ()"
        );
    }

    #[test]
    fn test_deeply_nested_list_values() {
        const DEPTH: usize = 100_000;
        let program = format!("{}{}", "[".repeat(DEPTH), "]".repeat(DEPTH));

        let value = quiet().evaluate(&program).unwrap();
        assert_eq!(value.to_string(), program);
        assert_eq!(format!("{value:?}").len(), DEPTH * "List()".len());

        let same = quiet().evaluate(&program).unwrap();
        assert_eq!(value, same);
        let shallower = quiet().evaluate(&program[1..program.len() - 1]).unwrap();
        assert_ne!(value, shallower);

        // a shared copy outlives the original
        let shared = value.clone();
        drop(value);
        assert_eq!(shared, same);
        drop(shared);
        drop(same);
        drop(shallower);
    }

    #[test]
    fn test_environment_chain() {
        let global = Environment::new();
        assert!(global.get("x").is_none());

        let outer = global.extend(HashMap::from([
            ("x".to_owned(), val(1)),
            ("y".to_owned(), val(2)),
        ]));
        let inner = outer.extend(HashMap::from([("x".to_owned(), val(10))]));

        assert_eq!(inner.get("x"), Some(&val(10)));
        assert_eq!(inner.get("y"), Some(&val(2)));
        assert_eq!(outer.get("x"), Some(&val(1)));
        assert!(inner.get("z").is_none());
    }
}
