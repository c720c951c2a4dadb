//! Capability Augmenter
//!
//! Installs the missing part of the rich surface on a promise class. Every
//! write is additive: a member the class already has, whether its own or
//! installed by an earlier pass, is never replaced.

use std::rc::Rc;

use thenable_runtime::{PromiseClass, Value};

use crate::capability::{CapabilityDescriptor, Flavor};
use crate::error::{InteropError, Result};
use crate::identity;
use crate::members::{self, Context, MemberBody, Strategy, continuation, statics, suspend};

/// Instance aliases and the member they copy
const ALIASES: [(&str, &str); 6] = [
    ("done", "then"),
    ("error", "catch"),
    ("lastly", "finally"),
    ("break", "cancel"),
    ("return", "thenReturn"),
    ("throw", "thenThrow"),
];

/// Augments `target`, returning its class.
///
/// Fails without touching anything when `target` is not a promise class.
pub(crate) fn augment(context: &Rc<Context>, target: &Value) -> Result<PromiseClass> {
    let class = match target {
        Value::Class(class) => class.clone(),
        Value::Function(f) => return Err(InteropError::NotAPromiseClass(f.name().to_string())),
        other => return Err(InteropError::InvalidTarget(other.type_of())),
    };
    if !class.prototype().has_method("then") {
        return Err(InteropError::NotAPromiseClass(class.name().to_string()));
    }
    if identity::is_augmented(&class) {
        return Ok(class);
    }

    let descriptor = CapabilityDescriptor::probe(&class);
    let (native, rich) = (context.native()?, context.rich()?);
    let mut added = statics::install(context, &class, &native, &rich);
    added += match descriptor.flavor {
        Flavor::Rich => augment_rich(context, &class),
        Flavor::Foreign => augment_foreign(context, &class, &rich),
    };
    identity::tag(&class);

    tracing::debug!(
        class = %descriptor.class_name,
        flavor = ?descriptor.flavor,
        strategy = ?context.strategy,
        present = descriptor.present.len(),
        added,
        "augmented promise class"
    );
    Ok(class)
}

fn augment_rich(context: &Rc<Context>, class: &PromiseClass) -> usize {
    let conveniences: &[(&'static str, MemberBody)] = &[
        ("toBluebird", |_, p, _| Ok(p.clone().into())),
        ("toNative", |ctx, p, _| Ok(ctx.to_native(p)?.into())),
    ];
    let mut added = members::install(context, class, conveniences);
    let prototype = class.prototype().members();
    if let Some(to_json) = prototype.get("toJSON")
        && prototype.define_missing("inspect", to_json)
    {
        added += 1;
    }
    name_functions(class);
    added
}

fn augment_foreign(context: &Rc<Context>, class: &PromiseClass, rich: &PromiseClass) -> usize {
    let mut added = statics::install_aliases(class);
    for key in rich.static_keys() {
        if key.starts_with('_') {
            continue;
        }
        if let Some(value) = rich.get_static(&key)
            && class.define_static_missing(&key, value)
        {
            added += 1;
        }
    }

    if context.strategy == Strategy::Suspend {
        added += suspend::install(context, class);
    }
    added += continuation::install(context, class);

    let prototype = class.prototype().members();
    for (alias, source) in ALIASES {
        if let Some(value) = prototype.get(source)
            && prototype.define_missing(alias, value)
        {
            added += 1;
        }
    }
    added
}

/// Names anonymous functions after the key they are stored under.
fn name_functions(class: &PromiseClass) {
    let statics = class
        .static_keys()
        .into_iter()
        .filter_map(|key| class.get_static(&key).map(|value| (key, value)));
    let members = class.prototype().members().entries();
    for (key, value) in statics.chain(members) {
        if let Value::Function(f) = value {
            f.ensure_name(&key);
        }
    }
}
