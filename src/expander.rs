//! Expansion of read expressions into core forms.
//!
//! The expander validates the shape of every special form, desugars
//! `(define (f args...) body...)` and multi-expression `lambda` bodies, replaces
//! `cond`'s `else` with `#t`, runs `define-macro` at expansion time and rewrites
//! macro uses by calling the macro procedure on the unevaluated operands. The result
//! contains only the core forms understood by the evaluator and procedure
//! applications.

use crate::ast::{Params, Value};
use crate::evaluator::Interpreter;
use crate::symbol::SpecialForm;
use crate::{Error, SyntaxError, SyntaxErrorKind};
use tracing::trace;

mod quasiquote;

impl Interpreter {
    /// Expand `x` into a core form. `define-macro` is only accepted when
    /// `top_level` is set.
    pub fn expand(&mut self, x: &Value, top_level: bool) -> Result<Value, Error> {
        self.nested_expansion(|interp| interp.expand_form(x, top_level))
    }

    /// Run one level of expansion under `Config::max_expand_depth`
    fn nested_expansion<T>(
        &mut self,
        expansion: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.expand_depth >= self.config.max_expand_depth {
            return Err(Error::syntax(
                SyntaxErrorKind::TooDeeplyNested,
                format!(
                    "macro expansion too deep (max depth: {})",
                    self.config.max_expand_depth
                ),
            ));
        }
        self.expand_depth += 1;
        let result = expansion(self);
        self.expand_depth -= 1;
        result
    }

    fn expand_form(&mut self, x: &Value, top_level: bool) -> Result<Value, Error> {
        let Value::List(items) = x else {
            return Ok(x.clone());
        };
        let Some((head, operands)) = items.split_first() else {
            return Err(self.illegal(x, "empty list can't be expanded"));
        };

        if let Value::Symbol(sym) = head {
            if let Some(form) = self.symbols.keywords().special_form(*sym) {
                return self.expand_special(form, x, items, top_level);
            }
            if let Some(transformer) = self.macros.get(sym).cloned() {
                trace!(name = self.symbols.resolve(*sym), "expanding macro use");
                let expansion = self.apply(&transformer, operands.to_vec())?;
                return self.expand(&expansion, top_level);
            }
        }

        self.expand_each(items)
    }

    fn expand_each(&mut self, items: &[Value]) -> Result<Value, Error> {
        items
            .iter()
            .map(|item| self.expand(item, false))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list)
    }

    fn expand_special(
        &mut self,
        form: SpecialForm,
        x: &Value,
        items: &[Value],
        top_level: bool,
    ) -> Result<Value, Error> {
        match form {
            SpecialForm::Quote => {
                self.require(x, items.len() == 2, "wrong length")?;
                Ok(x.clone())
            }

            SpecialForm::If => {
                self.require(x, matches!(items.len(), 3 | 4), "wrong length")?;
                let mut expanded = Vec::with_capacity(4);
                for item in items {
                    expanded.push(self.expand(item, false)?);
                }
                if expanded.len() == 3 {
                    expanded.push(Value::Unspecified);
                }
                Ok(Value::list(expanded))
            }

            SpecialForm::Cond => {
                self.require(x, items.len() > 1, "wrong length")?;
                let else_ = self.symbols.keywords().else_;
                let mut expanded = vec![items[0].clone()];
                for clause in &items[1..] {
                    let parts = match clause.as_list() {
                        Some(parts) if parts.len() >= 2 => parts,
                        _ => return Err(self.illegal(clause, "wrong length")),
                    };
                    let mut new_clause = Vec::with_capacity(parts.len());
                    for (i, part) in parts.iter().enumerate() {
                        if i == 0 && part.as_symbol() == Some(else_) {
                            new_clause.push(Value::Bool(true));
                        } else {
                            new_clause.push(self.expand(part, false)?);
                        }
                    }
                    expanded.push(Value::list(new_clause));
                }
                Ok(Value::list(expanded))
            }

            SpecialForm::Set => {
                self.require(x, items.len() == 3, "wrong length")?;
                self.require(x, items[1].as_symbol().is_some(), "can set! only a symbol")?;
                let value = self.expand(&items[2], false)?;
                Ok(Value::list(vec![items[0].clone(), items[1].clone(), value]))
            }

            SpecialForm::Define | SpecialForm::DefineMacro => {
                self.require(x, items.len() >= 3, "wrong length")?;
                let target = &items[1];

                // (define (f args...) body...) => (define f (lambda (args...) body...))
                if let Some([name, params @ ..]) = target.as_list() {
                    let lambda = self.symbols.keywords().lambda;
                    let mut function = vec![Value::Symbol(lambda), Value::list(params.to_vec())];
                    function.extend_from_slice(&items[2..]);
                    let desugared = Value::list(vec![
                        items[0].clone(),
                        name.clone(),
                        Value::list(function),
                    ]);
                    return self.expand(&desugared, top_level);
                }

                self.require(x, items.len() == 3, "wrong length")?;
                let Some(name) = target.as_symbol() else {
                    return Err(self.illegal(x, "can define only a symbol"));
                };
                let value = self.expand(&items[2], false)?;

                if form == SpecialForm::Define {
                    return Ok(Value::list(vec![items[0].clone(), target.clone(), value]));
                }

                self.require(x, top_level, "define-macro only allowed at top level")?;
                let transformer = self.eval(&value)?;
                self.require(x, transformer.is_procedure(), "macro must be a procedure")?;
                self.define_macro(name, transformer);
                Ok(Value::Unspecified)
            }

            SpecialForm::Begin => {
                if items.len() == 1 {
                    return Ok(Value::Unspecified);
                }
                let mut expanded = Vec::with_capacity(items.len());
                for item in items {
                    expanded.push(self.expand(item, top_level)?);
                }
                Ok(Value::list(expanded))
            }

            SpecialForm::Lambda => {
                self.require(x, items.len() >= 3, "wrong length")?;
                let params = &items[1];
                self.require(
                    x,
                    Params::from_value(params).is_some(),
                    "illegal lambda argument list",
                )?;
                let body = if items.len() == 3 {
                    items[2].clone()
                } else {
                    let begin = self.symbols.keywords().begin;
                    let mut body = vec![Value::Symbol(begin)];
                    body.extend_from_slice(&items[2..]);
                    Value::list(body)
                };
                let body = self.expand(&body, false)?;
                Ok(Value::list(vec![items[0].clone(), params.clone(), body]))
            }

            SpecialForm::Quasiquote => {
                self.require(x, items.len() == 2, "wrong length")?;
                self.expand_quasiquote(&items[1])
            }
        }
    }

    /// Signal an illegal form unless `predicate` holds
    pub(crate) fn require(&self, x: &Value, predicate: bool, message: &str) -> Result<(), Error> {
        if predicate {
            Ok(())
        } else {
            Err(self.illegal(x, message))
        }
    }

    pub(crate) fn illegal(&self, x: &Value, message: &str) -> Error {
        Error::Syntax(SyntaxError::new(
            SyntaxErrorKind::IllegalForm,
            message,
            Some(self.to_string(x)),
        ))
    }
}

/// `(let ((v e) ...) body...)` => `((lambda (v ...) body...) e ...)`
fn let_macro(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let keywords = *interp.symbols().keywords();
    let mut form = vec![Value::Symbol(keywords.let_)];
    form.extend(args.iter().cloned());
    let form = Value::list(form);

    interp.require(&form, args.len() > 1, "wrong length")?;
    let Some(bindings) = args[0].as_list() else {
        return Err(interp.illegal(&form, "illegal binding list"));
    };

    let mut vars = Vec::with_capacity(bindings.len());
    let mut inits = Vec::with_capacity(bindings.len());
    for binding in bindings {
        match binding.as_list() {
            Some([var @ Value::Symbol(_), init]) => {
                vars.push(var.clone());
                inits.push(init.clone());
            }
            _ => return Err(interp.illegal(&form, "illegal binding list")),
        }
    }

    let mut lambda = vec![Value::Symbol(keywords.lambda), Value::list(vars)];
    lambda.extend_from_slice(&args[1..]);
    let mut application = vec![Value::list(lambda)];
    application.extend(inits);
    Ok(Value::list(application))
}

/// Install the macros implemented in Rust
pub(crate) fn install_native_macros(interp: &mut Interpreter) {
    let name = interp.symbols().keywords().let_;
    interp.define_macro(name, Value::native("let", let_macro));
}
