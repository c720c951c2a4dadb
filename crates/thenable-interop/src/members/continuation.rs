//! Continuation Members
//!
//! The full catalog for foreign classes. Self-sufficient members are `then`
//! chains over the class's own statics; delegated members forward to the
//! rich conversion; inspection members read the state inspector.

use std::rc::Rc;

use thenable_rich::promise::{call_method, read_key};
use thenable_runtime::{Completion, Function, PromiseClass, PromiseRef, Value, arg, type_error};

use super::{Context, MemberBody, after, function, require_function, spread_args};
use crate::{inspect, suppress};

pub(crate) fn install(context: &Rc<Context>, class: &PromiseClass) -> usize {
    let members: &[(&'static str, MemberBody)] = &[
        ("all", |_, p, args| combine(p, "all", args, 0)),
        ("any", |_, p, args| combine(p, "any", args, 0)),
        ("race", |_, p, args| combine(p, "race", args, 0)),
        ("props", |_, p, args| combine(p, "props", args, 0)),
        ("some", |_, p, args| combine(p, "some", args, 1)),
        ("map", |_, p, args| combine(p, "map", args, 2)),
        ("filter", |_, p, args| combine(p, "filter", args, 2)),
        ("mapSeries", |_, p, args| combine(p, "mapSeries", args, 1)),
        ("each", |_, p, args| combine(p, "each", args, 1)),
        ("reduce", |_, p, args| combine(p, "reduce", args, 2)),
        ("catch", |_, p, args| p.then(None, function(&arg(args, 0)))),
        ("caught", |ctx, p, args| match args.len() {
            1 => p.invoke("catch", args),
            _ => delegate(ctx, p, "caught", args),
        }),
        ("error", |_, p, args| p.invoke("catch", args)),
        ("finally", |_, p, args| finally(p, arg(args, 0))),
        ("tap", |_, p, args| {
            let on_tap = arg(args, 0);
            if on_tap.is_nullish() {
                return Ok(p.clone().into());
            }
            let handler = Function::once("", move |result| {
                let returned = require_function(&on_tap)?.call(&Value::Undefined, &[result.clone()])?;
                after(returned, result)
            });
            p.then(Some(handler), None)
        }),
        ("spread", |_, p, args| {
            let on_fulfilled = arg(args, 0);
            let handler = Function::once("", move |values| {
                require_function(&on_fulfilled)?.call(&Value::Undefined, &spread_args(&values)?)
            });
            p.then(Some(handler), None)
        }),
        ("get", |_, p, args| {
            let key = arg(args, 0);
            p.then(Some(Function::once("", move |target| Ok(read_key(&target, &key)))), None)
        }),
        ("call", |_, p, args| {
            let name = arg(args, 0);
            let rest = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
            p.then(Some(Function::once("", move |target| call_method(&target, &name, &rest))), None)
        }),
        ("thenReturn", |_, p, args| {
            let value = arg(args, 0);
            p.then(Some(Function::once("", move |_| Ok(value))), None)
        }),
        ("thenThrow", |_, p, args| {
            let reason = arg(args, 0);
            p.then(Some(Function::once("", move |_| Err(reason))), None)
        }),
        ("cancel", |_, _, _| Err(type_error("Cannot cancel a non bluebird promise"))),
        ("settle", |ctx, p, args| delegate(ctx, p, "settle", args)),
        ("tapCatch", |ctx, p, args| delegate(ctx, p, "tapCatch", args)),
        ("bind", |ctx, p, args| delegate(ctx, p, "bind", args)),
        ("delay", |ctx, p, args| delegate(ctx, p, "delay", args)),
        ("timeout", |ctx, p, args| delegate(ctx, p, "timeout", args)),
        ("nodeify", |ctx, p, args| delegate(ctx, p, "nodeify", args)),
        ("asCallback", |ctx, p, args| delegate(ctx, p, "asCallback", args)),
        ("disposer", |ctx, p, args| delegate(ctx, p, "disposer", args)),
        ("catchReturn", |ctx, p, args| delegate(ctx, p, "catchReturn", args)),
        ("catchThrow", |ctx, p, args| delegate(ctx, p, "catchThrow", args)),
        ("reflect", |ctx, p, args| delegate(ctx, p, "reflect", args)),
        ("isFulfilled", |_, p, _| Ok(inspect::is_fulfilled(p).into())),
        ("isPending", |_, p, _| Ok(inspect::is_pending(p).into())),
        ("isRejected", |_, p, _| Ok(inspect::is_rejected(p).into())),
        ("isResolved", |_, p, _| Ok(inspect::is_resolved(p).into())),
        ("isCancelled", |_, p, _| Ok(inspect::is_cancelled(p).into())),
        ("isCancellable", |_, _, _| Ok(Value::Bool(false))),
        ("value", |_, p, _| Ok(inspect::value(p))),
        ("reason", |_, p, _| Ok(inspect::reason(p))),
        ("toJSON", |_, p, _| Ok(inspect::to_json(p))),
        ("toBluebird", |ctx, p, _| Ok(ctx.to_rich(p)?.into())),
        ("toNative", |_, p, _| Ok(p.clone().into())),
        ("suppressUnhandledRejections", |_, p, _| {
            suppress::suppress_instance(p);
            Ok(p.clone().into())
        }),
    ];
    super::install(context, class, members)
}

/// `this.then(result => this.constructor[name](result, ...args))`
fn combine(promise: &PromiseRef, name: &'static str, args: &[Value], arity: usize) -> Completion {
    let class = promise.constructor();
    let extra: Vec<Value> = (0..arity).map(|i| arg(args, i)).collect();
    let handler = Function::once("", move |result| {
        let mut call_args = Vec::with_capacity(extra.len() + 1);
        call_args.push(result);
        call_args.extend(extra);
        class.call_static(name, &call_args)
    });
    promise.then(Some(handler), None)
}

fn delegate(context: &Context, promise: &PromiseRef, name: &str, args: &[Value]) -> Completion {
    context.to_rich(promise)?.invoke(name, args)
}

fn finally(promise: &PromiseRef, on_finally: Value) -> Completion {
    let Some(on_finally) = function(&on_finally) else {
        return Ok(promise.clone().into());
    };
    let class = promise.constructor();
    let on_rejected = {
        let on_finally = on_finally.clone();
        Function::once("", move |reason| {
            let settled = class.resolve(on_finally.call(&Value::Undefined, &[])?)?;
            let rethrow = Function::once("", move |_| Err(reason));
            match settled {
                Value::Promise(settled) => settled.then(Some(rethrow), None),
                _ => rethrow.call(&Value::Undefined, &[]),
            }
        })
    };
    let on_fulfilled = Function::once("", move |result| {
        after(on_finally.call(&Value::Undefined, &[])?, result)
    });
    promise.then(Some(on_fulfilled), Some(on_rejected))
}
