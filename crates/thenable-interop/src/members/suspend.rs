//! Suspend Members
//!
//! Async versions of the self-sufficient members. Each call starts a
//! cooperative task that awaits the receiver; the member returns a native
//! promise settled with the task's outcome.

use std::future::Future;
use std::rc::Rc;

use thenable_rich::promise::{call_method, read_key};
use thenable_runtime::{Completion, PromiseClass, PromiseRef, Value, arg, settle_value};

use super::{Context, MemberBody, construct, function, require_function, spread_args};
use crate::error::InteropError;

pub(crate) fn install(context: &Rc<Context>, class: &PromiseClass) -> usize {
    let members: &[(&'static str, MemberBody)] = &[
        ("all", |ctx, p, args| combine(ctx, p, "all", args, 0)),
        ("any", |ctx, p, args| combine(ctx, p, "any", args, 0)),
        ("race", |ctx, p, args| combine(ctx, p, "race", args, 0)),
        ("props", |ctx, p, args| combine(ctx, p, "props", args, 0)),
        ("some", |ctx, p, args| combine(ctx, p, "some", args, 1)),
        ("map", |ctx, p, args| combine(ctx, p, "map", args, 2)),
        ("filter", |ctx, p, args| combine(ctx, p, "filter", args, 2)),
        ("mapSeries", |ctx, p, args| combine(ctx, p, "mapSeries", args, 1)),
        ("each", |ctx, p, args| combine(ctx, p, "each", args, 1)),
        ("reduce", |ctx, p, args| combine(ctx, p, "reduce", args, 2)),
        ("call", |ctx, p, args| {
            let (this, name) = (p.clone(), arg(args, 0));
            let rest = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
            spawn(ctx, async move {
                let target = this.await?;
                call_method(&target, &name, &rest)
            })
        }),
        ("get", |ctx, p, args| {
            let (this, key) = (p.clone(), arg(args, 0));
            spawn(ctx, async move { Ok(read_key(&this.await?, &key)) })
        }),
        ("spread", |ctx, p, args| {
            let (this, on_fulfilled) = (p.clone(), arg(args, 0));
            spawn(ctx, async move {
                let values = this.await?;
                require_function(&on_fulfilled)?.call(&Value::Undefined, &spread_args(&values)?)
            })
        }),
        ("tap", |ctx, p, args| {
            let (this, on_tap) = (p.clone(), arg(args, 0));
            spawn(ctx, async move {
                if on_tap.is_nullish() {
                    return this.await;
                }
                let result = this.await?;
                let returned = require_function(&on_tap)?.call(&Value::Undefined, &[result.clone()])?;
                settle_value(returned).await?;
                Ok(result)
            })
        }),
        ("finally", |ctx, p, args| {
            let (this, on_finally) = (p.clone(), function(&arg(args, 0)));
            spawn(ctx, async move {
                let Some(on_finally) = on_finally else {
                    return this.await;
                };
                let result = this.await;
                settle_value(on_finally.call(&Value::Undefined, &[])?).await?;
                result
            })
        }),
        ("thenReturn", |ctx, p, args| {
            let (this, value) = (p.clone(), arg(args, 0));
            spawn(ctx, async move {
                this.await?;
                Ok(value)
            })
        }),
        ("thenThrow", |ctx, p, args| {
            let (this, reason) = (p.clone(), arg(args, 0));
            spawn(ctx, async move {
                this.await?;
                Err(reason)
            })
        }),
    ];
    super::install(context, class, members)
}

/// `this.constructor[name](await this, ...args)`
fn combine(
    context: &Context,
    promise: &PromiseRef,
    name: &'static str,
    args: &[Value],
    arity: usize,
) -> Completion {
    let (this, class) = (promise.clone(), promise.constructor());
    let extra: Vec<Value> = (0..arity).map(|i| arg(args, i)).collect();
    spawn(context, async move {
        let mut call_args = vec![this.await?];
        call_args.extend(extra);
        class.call_static(name, &call_args)
    })
}

/// Runs `task` cooperatively; the returned native promise adopts its outcome.
fn spawn(context: &Context, task: impl Future<Output = Completion> + 'static) -> Completion {
    let native = context.native().map_err(InteropError::into_value)?;
    let (promise, resolve, reject) = construct(&native)?;

    let event_loop = context.event_loop.clone();
    context.event_loop.spawn_local(async move {
        let (settle, value) = match task.await {
            Ok(value) => (resolve, value),
            Err(reason) => (reject, reason),
        };
        if let Err(thrown) = settle.call(&Value::Undefined, &[value]) {
            event_loop.report_uncaught(thrown);
        }
    });
    Ok(promise)
}
