//! Quasiquote templates.
//!
//! A template is rewritten into code that rebuilds it at run time:
//!
//! ```text
//! `x              => (quote x)
//! `,x             => x
//! `(,@xs rest...) => (append xs `(rest...))
//! `(head rest...) => (cons `head `(rest...))
//! ```
//!
//! Unquoted operands are expanded like any other expression; the generated
//! `cons`/`append`/`quote` scaffolding is not expanded again.

use crate::Error;
use crate::ast::Value;
use crate::evaluator::Interpreter;

/// One element of a list template
enum Piece {
    /// `,@x` operand, appended in place
    Splice(Value),
    /// Any other element, consed on
    Element(Value),
}

impl Interpreter {
    /// Rewrite a template; nested templates count toward the expansion depth
    pub(crate) fn expand_quasiquote(&mut self, x: &Value) -> Result<Value, Error> {
        self.nested_expansion(|interp| interp.expand_template(x))
    }

    fn expand_template(&mut self, x: &Value) -> Result<Value, Error> {
        let keywords = *self.symbols.keywords();
        let Some(items) = x.as_list() else {
            return Ok(Value::list(vec![Value::Symbol(keywords.quote), x.clone()]));
        };

        // Walk the spine left to right; `(a . ,b)` reads as `(a unquote b)`, so an
        // `unquote` symbol in element position ends the template with its operand.
        let mut pieces = Vec::with_capacity(items.len());
        let mut tail = None;
        for (i, element) in items.iter().enumerate() {
            let rest = &items[i..];
            match element.as_symbol() {
                Some(sym) if sym == keywords.unquote_splicing => {
                    return Err(self.illegal(&Value::list(rest.to_vec()), "can't splice here"));
                }
                Some(sym) if sym == keywords.unquote => {
                    if rest.len() != 2 {
                        return Err(self.illegal(&Value::list(rest.to_vec()), "wrong length"));
                    }
                    tail = Some(self.expand(&rest[1], false)?);
                    break;
                }
                _ => {}
            }

            if let Some([marker, operand @ ..]) = element.as_list()
                && marker.as_symbol() == Some(keywords.unquote_splicing)
            {
                self.require(element, operand.len() == 1, "wrong length")?;
                pieces.push(Piece::Splice(self.expand(&operand[0], false)?));
            } else {
                pieces.push(Piece::Element(self.expand_quasiquote(element)?));
            }
        }

        // Build from the right so each piece wraps the rest of the list
        let mut result = tail.unwrap_or_else(|| {
            Value::list(vec![Value::Symbol(keywords.quote), Value::nil()])
        });
        for piece in pieces.into_iter().rev() {
            let (operator, operand) = match piece {
                Piece::Splice(spliced) => (keywords.append, spliced),
                Piece::Element(element) => (keywords.cons, element),
            };
            result = Value::list(vec![Value::Symbol(operator), operand, result]);
        }
        Ok(result)
    }
}
