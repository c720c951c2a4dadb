//! Collection Combinators
//!
//! Every combinator accepts an array or a promise for an array. Array
//! members may themselves be promises or thenables.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use thenable_runtime::{
    Array, Completion, ErrorValue, Function, Object, PromiseState, Value, range_error, type_error,
};

use crate::RichLibrary;
use crate::inspection::inspection;
use crate::promise::{RichPromise, RichResolver};

fn not_array(value: &Value) -> Value {
    type_error(format!(
        "expecting an array or an iterable object but got {}",
        value.object_tag()
    ))
}

/// Runs `body` on the array once `input` resolves to one.
fn with_array(
    library: &RichLibrary,
    input: Value,
    body: impl FnOnce(Vec<Value>) -> RichPromise + 'static,
) -> RichPromise {
    match input {
        Value::Array(items) => body(items.to_vec()),
        other if other.is_thenable() => {
            RichPromise::resolved(library, other).then_with(move |outcome| match outcome? {
                Value::Array(items) => Ok(body(items.to_vec()).into()),
                value => Err(not_array(&value)),
            })
        }
        other => RichPromise::rejected(library, not_array(&other)),
    }
}

/// Observes `item` after resolving it through the library.
fn await_item(library: &RichLibrary, item: Value, then: impl FnOnce(Completion) + 'static) {
    RichPromise::resolved(library, item).observe(then);
}

/// Calls `done` with every outcome once all items settle, in input order.
pub(crate) fn gather(
    library: &RichLibrary,
    items: Vec<Value>,
    done: impl FnOnce(Vec<Completion>) + 'static,
) {
    if items.is_empty() {
        done(Vec::new());
        return;
    }
    let outcomes: Rc<RefCell<Vec<Option<Completion>>>> = Rc::new(RefCell::new(vec![None; items.len()]));
    let remaining = Rc::new(Cell::new(items.len()));
    let done = Rc::new(RefCell::new(Some(done)));
    for (index, item) in items.into_iter().enumerate() {
        let (outcomes, remaining, done) = (outcomes.clone(), remaining.clone(), done.clone());
        await_item(library, item, move |outcome| {
            outcomes.borrow_mut()[index] = Some(outcome);
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let collected = outcomes.borrow_mut().drain(..).flatten().collect();
                let done = done.borrow_mut().take();
                if let Some(done) = done {
                    done(collected);
                }
            }
        });
    }
}

pub fn all(library: &RichLibrary, input: Value) -> RichPromise {
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        if items.is_empty() {
            resolver.resolve(Value::array([]));
            return result;
        }
        let values = Array::from_vec(vec![Value::Undefined; items.len()]);
        let remaining = Rc::new(Cell::new(items.len()));
        for (index, item) in items.into_iter().enumerate() {
            let (values, remaining, resolver) = (values.clone(), remaining.clone(), resolver.clone());
            await_item(&lib, item, move |outcome| match outcome {
                Ok(value) => {
                    values.set(index, value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resolver.resolve(values.into());
                    }
                }
                Err(reason) => resolver.reject(reason),
            });
        }
        result
    })
}

/// Fulfills with an inspection per input once every input settles.
pub fn settle(library: &RichLibrary, input: Value) -> RichPromise {
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        gather(&lib, items, move |outcomes| {
            let snapshots = outcomes
                .into_iter()
                .map(|o| inspection(&PromiseState::from(o)))
                .collect::<Vec<_>>();
            resolver.resolve(snapshots.into());
        });
        result
    })
}

pub fn all_settled(library: &RichLibrary, input: Value) -> RichPromise {
    settle(library, input)
}

pub fn race(library: &RichLibrary, input: Value) -> RichPromise {
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        for item in items {
            let resolver = resolver.clone();
            await_item(&lib, item, move |outcome| resolver.settle(outcome));
        }
        result
    })
}

/// Fulfills with the first `count` fulfillment values, in settlement order.
pub fn some(library: &RichLibrary, input: Value, count: Value) -> RichPromise {
    let count = match count.as_number() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
        _ => return RichPromise::rejected(library, type_error("expecting a positive integer")),
    };
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        let total = items.len();
        if count == 0 {
            resolver.resolve(Value::array([]));
            return result;
        }
        if count > total {
            resolver.reject(range_error(format!(
                "Input array must contain at least {count} items but contains only {total} items"
            )));
            return result;
        }
        let values = Rc::new(RefCell::new(Vec::new()));
        let reasons = Rc::new(RefCell::new(Vec::new()));
        for item in items {
            let (values, reasons, resolver) = (values.clone(), reasons.clone(), resolver.clone());
            await_item(&lib, item, move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut values = values.borrow_mut();
                        values.push(value);
                        (values.len() == count).then(|| std::mem::take(&mut *values))
                    };
                    if let Some(ready) = ready {
                        resolver.resolve(ready.into());
                    }
                }
                Err(reason) => {
                    let failed = {
                        let mut reasons = reasons.borrow_mut();
                        reasons.push(reason);
                        (reasons.len() == total - count + 1).then(|| std::mem::take(&mut *reasons))
                    };
                    if let Some(failed) = failed {
                        resolver.reject(ErrorValue::aggregate(failed, "aggregate error").into());
                    }
                }
            });
        }
        result
    })
}

/// First fulfillment value; an `AggregateError` when every input rejects.
pub fn any(library: &RichLibrary, input: Value) -> RichPromise {
    some(library, input, Value::from(1)).then_with(|outcome| Ok(outcome?.get_index(0)))
}

fn concurrency_of(options: &Value) -> Option<usize> {
    match options.get("concurrency").as_number() {
        Some(n) if n >= 1.0 => Some(n as usize),
        _ => None,
    }
}

enum MapOutput {
    Mapped,
    Filtered,
}

struct MapJob {
    library: RichLibrary,
    mapper: Function,
    limit: Option<usize>,
    output: MapOutput,
    resolver: RichResolver,
    inputs: Array,
    results: Array,
    queue: RefCell<VecDeque<(usize, Value)>>,
    in_flight: Cell<usize>,
    remaining: Cell<usize>,
}

impl MapJob {
    fn start(self: Rc<Self>, items: Vec<Value>) {
        let total = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let job = self.clone();
            await_item(&self.library, item, move |outcome| match outcome {
                Err(reason) => job.resolver.reject(reason),
                Ok(value) => {
                    job.inputs.set(index, value.clone());
                    job.queue.borrow_mut().push_back((index, value));
                    job.pump(total);
                }
            });
        }
    }

    /// Starts queued mapper calls while under the concurrency limit.
    fn pump(self: &Rc<Self>, total: usize) {
        loop {
            if self.limit.is_some_and(|limit| self.in_flight.get() >= limit) {
                return;
            }
            let next = self.queue.borrow_mut().pop_front();
            let Some((index, value)) = next else { return };
            self.in_flight.set(self.in_flight.get() + 1);
            let mapped = self
                .mapper
                .call(&Value::Undefined, &[value, Value::from(index), Value::from(total)]);
            let mapped = match mapped {
                Ok(mapped) => mapped,
                Err(reason) => {
                    self.resolver.reject(reason);
                    return;
                }
            };
            let job = self.clone();
            await_item(&self.library, mapped, move |outcome| {
                job.in_flight.set(job.in_flight.get() - 1);
                match outcome {
                    Err(reason) => job.resolver.reject(reason),
                    Ok(result) => {
                        job.results.set(index, result);
                        job.remaining.set(job.remaining.get() - 1);
                        if job.remaining.get() == 0 {
                            job.finish();
                        } else {
                            job.pump(total);
                        }
                    }
                }
            });
        }
    }

    fn finish(&self) {
        let output = match self.output {
            MapOutput::Mapped => self.results.to_vec(),
            MapOutput::Filtered => self
                .inputs
                .to_vec()
                .into_iter()
                .zip(self.results.to_vec())
                .filter(|(_, keep)| keep.is_truthy())
                .map(|(value, _)| value)
                .collect(),
        };
        self.resolver.resolve(output.into());
    }
}

fn map_with(
    library: &RichLibrary,
    input: Value,
    mapper: Value,
    options: Value,
    output: MapOutput,
) -> RichPromise {
    let Value::Function(mapper) = mapper else {
        return RichPromise::rejected(library, type_error(format!(
            "expecting a function but got {}",
            mapper.object_tag()
        )));
    };
    let lib = library.clone();
    let limit = concurrency_of(&options);
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        if items.is_empty() {
            resolver.resolve(Value::array([]));
            return result;
        }
        let total = items.len();
        let job = Rc::new(MapJob {
            library: lib.clone(),
            mapper,
            limit,
            output,
            resolver,
            inputs: Array::from_vec(vec![Value::Undefined; total]),
            results: Array::from_vec(vec![Value::Undefined; total]),
            queue: RefCell::new(VecDeque::new()),
            in_flight: Cell::new(0),
            remaining: Cell::new(total),
        });
        job.start(items);
        result
    })
}

/// `map(input, mapper, {concurrency})`: mapper gets `(value, index, length)`.
pub fn map(library: &RichLibrary, input: Value, mapper: Value, options: Value) -> RichPromise {
    map_with(library, input, mapper, options, MapOutput::Mapped)
}

/// Keeps the inputs for which the predicate is truthy, in input order.
pub fn filter(library: &RichLibrary, input: Value, predicate: Value, options: Value) -> RichPromise {
    map_with(library, input, predicate, options, MapOutput::Filtered)
}

enum SeriesOutput {
    Results,
    Inputs,
}

struct SeriesJob {
    library: RichLibrary,
    items: Vec<Value>,
    iterator: Function,
    output: SeriesOutput,
    resolver: RichResolver,
    inputs: Array,
    results: Array,
}

impl SeriesJob {
    fn advance(self: Rc<Self>, index: usize) {
        let total = self.items.len();
        let Some(item) = self.items.get(index).cloned() else {
            let output = match self.output {
                SeriesOutput::Results => self.results.clone(),
                SeriesOutput::Inputs => self.inputs.clone(),
            };
            self.resolver.resolve(output.into());
            return;
        };
        let library = self.library.clone();
        await_item(&library, item, move |outcome| {
            let value = match outcome {
                Ok(value) => value,
                Err(reason) => return self.resolver.reject(reason),
            };
            self.inputs.push(value.clone());
            let args = [value, Value::from(index), Value::from(total)];
            let returned = self.iterator.call(&Value::Undefined, &args);
            match returned {
                Err(reason) => self.resolver.reject(reason),
                Ok(returned) => {
                    let library = self.library.clone();
                    await_item(&library, returned, move |result| match result {
                        Err(reason) => self.resolver.reject(reason),
                        Ok(result) => {
                            self.results.push(result);
                            self.advance(index + 1);
                        }
                    });
                }
            }
        });
    }
}

fn series(library: &RichLibrary, input: Value, iterator: Value, output: SeriesOutput) -> RichPromise {
    let Value::Function(iterator) = iterator else {
        return RichPromise::rejected(library, type_error(format!(
            "expecting a function but got {}",
            iterator.object_tag()
        )));
    };
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        let job = Rc::new(SeriesJob {
            library: lib.clone(),
            items,
            iterator,
            output,
            resolver,
            inputs: Array::new(),
            results: Array::new(),
        });
        job.advance(0);
        result
    })
}

/// Sequential map.
pub fn map_series(library: &RichLibrary, input: Value, iterator: Value) -> RichPromise {
    series(library, input, iterator, SeriesOutput::Results)
}

/// Sequential iteration fulfilling with the resolved inputs.
pub fn each(library: &RichLibrary, input: Value, iterator: Value) -> RichPromise {
    series(library, input, iterator, SeriesOutput::Inputs)
}

struct ReduceJob {
    library: RichLibrary,
    items: Vec<Value>,
    reducer: Function,
    resolver: RichResolver,
}

impl ReduceJob {
    fn step(self: Rc<Self>, accumulator: Value, index: usize) {
        let total = self.items.len();
        let Some(item) = self.items.get(index).cloned() else {
            self.resolver.resolve(accumulator);
            return;
        };
        let library = self.library.clone();
        await_item(&library, item, move |outcome| {
            let value = match outcome {
                Ok(value) => value,
                Err(reason) => return self.resolver.reject(reason),
            };
            let args = [accumulator, value, Value::from(index), Value::from(total)];
            let reduced = self.reducer.call(&Value::Undefined, &args);
            match reduced {
                Err(reason) => self.resolver.reject(reason),
                Ok(next) => {
                    let library = self.library.clone();
                    await_item(&library, next, move |next| match next {
                        Err(reason) => self.resolver.reject(reason),
                        Ok(next) => self.step(next, index + 1),
                    });
                }
            }
        });
    }
}

/// Sequential fold. Without an initial value the first element seeds the
/// accumulator, and an empty input fulfills with `undefined`.
pub fn reduce(library: &RichLibrary, input: Value, reducer: Value, initial: Option<Value>) -> RichPromise {
    let Value::Function(reducer) = reducer else {
        return RichPromise::rejected(library, type_error(format!(
            "expecting a function but got {}",
            reducer.object_tag()
        )));
    };
    let lib = library.clone();
    with_array(library, input, move |items| {
        let (result, resolver) = RichPromise::pending(&lib);
        let (seed, start) = match initial {
            Some(initial) => (initial, 0),
            None => match items.first() {
                Some(first) => (first.clone(), 1),
                None => {
                    resolver.resolve(Value::Undefined);
                    return result;
                }
            },
        };
        let job = Rc::new(ReduceJob { library: lib.clone(), items, reducer, resolver });
        let library = lib.clone();
        await_item(&library, seed, move |seed| match seed {
            Err(reason) => job.resolver.reject(reason),
            Ok(seed) => job.step(seed, start),
        });
        result
    })
}

/// Awaits every property of an object.
pub fn props(library: &RichLibrary, input: Value) -> RichPromise {
    let lib = library.clone();
    let body = move |object: Value| -> RichPromise {
        match object {
            Value::Array(_) => all(&lib, object),
            Value::Object(source) => {
                let entries = source.entries();
                let (result, resolver) = RichPromise::pending(&lib);
                let (keys, items): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
                let values = all(&lib, Value::array(items));
                values.observe(move |outcome| match outcome {
                    Err(reason) => resolver.reject(reason),
                    Ok(values) => {
                        let resolved = Object::new();
                        for (index, key) in keys.iter().enumerate() {
                            resolved.set(key, values.get_index(index));
                        }
                        resolver.resolve(resolved.into());
                    }
                });
                result
            }
            other => RichPromise::rejected(&lib, type_error(format!(
                "cannot await properties of a non-object, got {}",
                other.object_tag()
            ))),
        }
    };
    if input.is_thenable() {
        return RichPromise::resolved(library, input).then_with(move |outcome| Ok(body(outcome?).into()));
    }
    body(input)
}

/// `join(a, b, ...)`: `all` over the arguments.
pub fn join(library: &RichLibrary, values: Vec<Value>) -> RichPromise {
    all(library, Value::array(values))
}

/// Instance forms: `promise.all()` is `promise.then(v => all(v))`.
impl RichPromise {
    fn then_collect(&self, body: impl FnOnce(&RichLibrary, Value) -> RichPromise + 'static) -> RichPromise {
        let library = self.library().clone();
        self.then_with(move |outcome| Ok(body(&library, outcome?).into()))
    }

    pub fn all(&self) -> RichPromise {
        self.then_collect(all)
    }

    pub fn any(&self) -> RichPromise {
        self.then_collect(any)
    }

    pub fn race(&self) -> RichPromise {
        self.then_collect(race)
    }

    pub fn settle_all(&self) -> RichPromise {
        self.then_collect(settle)
    }

    pub fn props(&self) -> RichPromise {
        self.then_collect(props)
    }

    pub fn some(&self, count: Value) -> RichPromise {
        self.then_collect(move |lib, v| some(lib, v, count))
    }

    pub fn map(&self, mapper: Value, options: Value) -> RichPromise {
        self.then_collect(move |lib, v| map(lib, v, mapper, options))
    }

    pub fn filter(&self, predicate: Value, options: Value) -> RichPromise {
        self.then_collect(move |lib, v| filter(lib, v, predicate, options))
    }

    pub fn map_series(&self, iterator: Value) -> RichPromise {
        self.then_collect(move |lib, v| map_series(lib, v, iterator))
    }

    pub fn each(&self, iterator: Value) -> RichPromise {
        self.then_collect(move |lib, v| each(lib, v, iterator))
    }

    pub fn reduce(&self, reducer: Value, initial: Option<Value>) -> RichPromise {
        self.then_collect(move |lib, v| reduce(lib, v, reducer, initial))
    }
}
