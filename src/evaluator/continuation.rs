//! One-shot escape continuations.
//!
//! `call/cc` hands its argument an escape procedure. Invoking it raises
//! [`Error::ContinuationInvoked`] tagged with the id of the establishing call site;
//! the error unwinds through the evaluator like any other until the call site with
//! the matching id turns it back into a return value. Escapes tagged with another
//! id pass through untouched.

use super::Interpreter;
use crate::Error;
use crate::ast::Value;
use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

/// Identifies one dynamic `call/cc` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationId(u64);

/// Payload of an escape in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Escape {
    pub id: ContinuationId,
    pub value: Value,
}

impl Interpreter {
    fn next_continuation_id(&mut self) -> ContinuationId {
        self.next_continuation += 1;
        ContinuationId(self.next_continuation)
    }

    /// Call `procedure` with an escape procedure for the current continuation.
    ///
    /// The escape procedure takes exactly one argument, which becomes the return
    /// value of this call. Once this call has returned the escape procedure is
    /// dead and invoking it signals [`Error::StaleContinuation`].
    pub fn call_with_current_continuation(&mut self, procedure: &Value) -> Result<Value, Error> {
        let id = self.next_continuation_id();
        let live = Rc::new(Cell::new(true));

        let escape = {
            let live = Rc::clone(&live);
            Value::native("escape", move |_, args: Vec<Value>| {
                let [value] = <[Value; 1]>::try_from(args)
                    .map_err(|args| Error::arity_error(1, args.len()))?;
                if !live.get() {
                    return Err(Error::StaleContinuation);
                }
                trace!(?id, "escaping to call/cc site");
                Err(Error::ContinuationInvoked(Escape { id, value }))
            })
        };

        let result = self.apply(procedure, vec![escape]);
        live.set(false);

        match result {
            Err(Error::ContinuationInvoked(escape)) if escape.id == id => {
                trace!(?id, "call/cc site resumed by escape");
                Ok(escape.value)
            }
            other => other,
        }
    }
}
