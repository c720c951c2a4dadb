//! Native Functions
//!
//! Script-callable closures taking a receiver and positional arguments.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::{Completion, Value};

type Body = dyn Fn(&Value, &[Value]) -> Completion;

/// Shared callable
#[derive(Clone)]
pub struct Function(Rc<FunctionInner>);

struct FunctionInner {
    name: RefCell<Rc<str>>,
    body: Box<Body>,
}

impl Function {
    pub fn new(name: &str, body: impl Fn(&Value, &[Value]) -> Completion + 'static) -> Self {
        Self(Rc::new(FunctionInner {
            name: RefCell::new(name.into()),
            body: Box::new(body),
        }))
    }

    pub fn anonymous(body: impl Fn(&Value, &[Value]) -> Completion + 'static) -> Self {
        Self::new("", body)
    }

    /// Wraps a one-shot continuation receiving the first argument.
    /// Later calls return `undefined` without running it again.
    pub fn once(name: &str, body: impl FnOnce(Value) -> Completion + 'static) -> Self {
        let slot = RefCell::new(Some(body));
        Self::new(name, move |_, args| {
            let body = slot.borrow_mut().take();
            match body {
                Some(body) => body(arg(args, 0)),
                None => Ok(Value::Undefined),
            }
        })
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Completion {
        (self.0.body)(this, args)
    }

    pub fn name(&self) -> Rc<str> {
        self.0.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.0.name.borrow_mut() = name.into();
    }

    /// Names the function unless it already has a name.
    pub fn ensure_name(&self, name: &str) -> bool {
        if self.0.name.borrow().is_empty() {
            self.set_name(name);
            return true;
        }
        false
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

/// Positional argument, `undefined` when absent.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}
