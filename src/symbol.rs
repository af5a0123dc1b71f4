//! Symbol interning.
//!
//! Every symbol the reader produces is interned in a [`SymbolTable`] owned by the
//! interpreter, so symbols compare by handle rather than by text. The table also
//! pre-interns the reserved names the expander and evaluator dispatch on.

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

/// Interned symbol handle; equal names yield equal handles within one table
pub type Symbol = DefaultSymbol;

/// Core special forms, classified once by head symbol instead of by repeated
/// comparisons in the expander and evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecialForm {
    Quote,
    If,
    Cond,
    Set,
    Define,
    DefineMacro,
    Lambda,
    Begin,
    Quasiquote,
}

/// Reserved symbols, interned when the table is created.
#[derive(Debug, Clone, Copy)]
pub struct Keywords {
    pub quote: Symbol,
    pub if_: Symbol,
    pub cond: Symbol,
    pub set: Symbol,
    pub define: Symbol,
    pub define_macro: Symbol,
    pub lambda: Symbol,
    pub begin: Symbol,
    pub quasiquote: Symbol,
    pub unquote: Symbol,
    pub unquote_splicing: Symbol,
    pub append: Symbol,
    pub cons: Symbol,
    pub let_: Symbol,
    pub else_: Symbol,
}

impl Keywords {
    fn intern(interner: &mut StringInterner<DefaultBackend>) -> Self {
        let mut sym = |name: &str| interner.get_or_intern(name);
        Keywords {
            quote: sym("quote"),
            if_: sym("if"),
            cond: sym("cond"),
            set: sym("set!"),
            define: sym("define"),
            define_macro: sym("define-macro"),
            lambda: sym("lambda"),
            begin: sym("begin"),
            quasiquote: sym("quasiquote"),
            unquote: sym("unquote"),
            unquote_splicing: sym("unquote-splicing"),
            append: sym("append"),
            cons: sym("cons"),
            let_: sym("let"),
            else_: sym("else"),
        }
    }

    pub(crate) fn special_form(&self, head: Symbol) -> Option<SpecialForm> {
        let form = if head == self.quote {
            SpecialForm::Quote
        } else if head == self.if_ {
            SpecialForm::If
        } else if head == self.cond {
            SpecialForm::Cond
        } else if head == self.set {
            SpecialForm::Set
        } else if head == self.define {
            SpecialForm::Define
        } else if head == self.define_macro {
            SpecialForm::DefineMacro
        } else if head == self.lambda {
            SpecialForm::Lambda
        } else if head == self.begin {
            SpecialForm::Begin
        } else if head == self.quasiquote {
            SpecialForm::Quasiquote
        } else {
            return None;
        };
        Some(form)
    }
}

/// Interning table for symbol names.
#[derive(Debug)]
pub struct SymbolTable {
    interner: StringInterner<DefaultBackend>,
    keywords: Keywords,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut interner = StringInterner::<DefaultBackend>::new();
        let keywords = Keywords::intern(&mut interner);
        SymbolTable { interner, keywords }
    }

    /// Find or create the unique symbol for `name`
    pub fn intern(&mut self, name: &str) -> Symbol {
        self.interner.get_or_intern(name)
    }

    /// Look up a name without interning it
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.interner.get(name)
    }

    /// The text of a symbol. Symbols from another table resolve to a placeholder.
    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.interner.resolve(symbol).unwrap_or("#<foreign-symbol>")
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
