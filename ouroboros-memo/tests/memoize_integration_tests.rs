//! Integration tests for memoized wrappers
//!
//! These tests verify the complete memoization behavior including:
//! - Memoization and wrapper identity
//! - Per-context isolation for methods and accessors
//! - Strict and loose argument matching
//! - TTL expiration
//! - Explicit clearing
//! - Error conditions
//! - Sweeping of dropped receivers and callables

use ouroboros_memo::{
    Accessor, Callable, CachedFunction, Class, ClearTarget, Context, MemoError, MemoOptions,
    Memoizer, Object, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}

/// `add(a, b)` counting its invocations
fn add(calls: &Arc<AtomicUsize>) -> Callable {
    let calls = Arc::clone(calls);
    Callable::from_fn("add", move |_, args| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(args.iter().filter_map(Value::as_int).sum()))
    })
}

/// Returns its receiver's `id` field
fn read_id(calls: &Arc<AtomicUsize>) -> Callable {
    let calls = Arc::clone(calls);
    Callable::from_fn("id", move |ctx, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        let this = ctx.object().ok_or("id needs a receiver")?;
        Ok(this.field("id").unwrap_or_default())
    })
}

/// Getter returning its receiver's `field`
fn read_field(calls: &Arc<AtomicUsize>, name: &str, field: &'static str) -> Callable {
    let calls = Arc::clone(calls);
    Callable::from_fn(name, move |ctx, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        let this = ctx.object().ok_or("getter needs a receiver")?;
        Ok(this.field(field).unwrap_or_default())
    })
}

fn instance(class: &Class, id: i64) -> Object {
    let object = class.instantiate();
    object.set_field("id", Value::Int(id));
    object
}

#[test]
fn test_memoization() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let add = add(&calls);

    let first = memoizer.cached(&add, None).unwrap();
    assert_eq!(first.call_detached(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));

    // Fetching the wrapper again shares the same store
    let second = memoizer.cached(&add, None).unwrap();
    assert_eq!(second.call_detached(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));

    assert_eq!(count(&calls), 1);
}

#[test]
fn test_wrapper_identity() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let add = add(&calls);

    let ten = memoizer.cached(&add, Some(MemoOptions::with_ttl_ms(10))).unwrap();
    let ten_again = memoizer.cached(&add, Some(MemoOptions::with_ttl_ms(10))).unwrap();
    let hundred = memoizer.cached(&add, Some(MemoOptions::with_ttl_ms(100))).unwrap();

    assert!(ten.ptr_eq(&ten_again));
    assert!(ten.callable().ptr_eq(ten_again.callable()));
    assert!(!ten.ptr_eq(&hundred));

    // No options and explicit defaults are different configurations
    let bare = memoizer.cached(&add, None).unwrap();
    let explicit = memoizer.cached(&add, Some(MemoOptions::default())).unwrap();
    assert!(!bare.ptr_eq(&explicit));
    assert!(bare.ptr_eq(&memoizer.cached(&add, None).unwrap()));

    assert_eq!(memoizer.wrapper_count(), 4);
}

#[test]
fn test_wrapper_keeps_name_and_receiver_binding() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer.cached(&read_id(&calls), None).unwrap();

    assert_eq!(wrapper.name(), "id");
    assert!(wrapper.callable().is_cached());

    let class = Class::new("Item");
    let item = instance(&class, 7);
    assert_eq!(wrapper.call(&Context::from(&item), &[]).unwrap(), Value::Int(7));
}

#[test]
fn test_per_context_isolation() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let class = Class::new("Item");
    let m = memoizer.cached(&read_id(&calls), None).unwrap();
    class.define_method("m", m.callable().clone());

    let x = instance(&class, 1);
    let y = instance(&class, 2);

    assert_eq!(x.call("m", &[]).unwrap(), Value::Int(1));
    assert_eq!(y.call("m", &[]).unwrap(), Value::Int(2));
    assert_eq!(count(&calls), 2);

    assert_eq!(x.call("m", &[]).unwrap(), Value::Int(1));
    assert_eq!(y.call("m", &[]).unwrap(), Value::Int(2));
    assert_eq!(count(&calls), 2);

    // Clearing x leaves y's store alone
    let removed = memoizer
        .clear(ClearTarget::Member { context: &x, name: "m" }, None)
        .unwrap();
    assert_eq!(removed, 1);

    y.call("m", &[]).unwrap();
    assert_eq!(count(&calls), 2);
    x.call("m", &[]).unwrap();
    assert_eq!(count(&calls), 3);

    assert_eq!(m.stats().contexts, 2);
}

#[test]
fn test_detached_and_receiver_stores_are_separate() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer.cached(&add(&calls), None).unwrap();
    let receiver = Object::record(vec![("name", Value::str("r"))]);

    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    wrapper.call(&Context::from(&receiver), &[Value::Int(1)]).unwrap();
    assert_eq!(count(&calls), 2);

    memoizer
        .clear(ClearTarget::Wrapper(wrapper.callable()), None)
        .unwrap();
    wrapper.call(&Context::from(&receiver), &[Value::Int(1)]).unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_strict_matching_uses_identity() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let len = {
        let calls = Arc::clone(&calls);
        Callable::from_fn("len", move |_, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            let len = args.first().and_then(Value::as_list).map_or(0, |l| l.len());
            Ok(Value::Int(len as i64))
        })
    };
    let strict = memoizer.cached(&len, None).unwrap();

    let a = Value::list(vec![Value::str("test")]);
    let b = Value::list(vec![Value::str("test")]);

    strict.call_detached(&[a.clone()]).unwrap();
    strict.call_detached(&[b]).unwrap();
    assert_eq!(count(&calls), 2);

    strict.call_detached(&[a]).unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_loose_matching_uses_structure() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let len = {
        let calls = Arc::clone(&calls);
        Callable::from_fn("len", move |_, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            let len = args.first().and_then(Value::as_list).map_or(0, |l| l.len());
            Ok(Value::Int(len as i64))
        })
    };
    let loose = memoizer.cached(&len, Some(MemoOptions::loose())).unwrap();

    let a = Value::list(vec![Value::str("test")]);
    let b = Value::list(vec![Value::str("test")]);

    loose.call_detached(&[a]).unwrap();
    loose.call_detached(&[b]).unwrap();
    assert_eq!(count(&calls), 1);

    loose
        .call_detached(&[Value::list(vec![Value::str("other")])])
        .unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_loose_matching_collapses_unserializable_arguments() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let loose = memoizer
        .cached(&add(&calls), Some(MemoOptions::loose()))
        .unwrap();

    let f = Value::Function(Callable::anonymous(|_, _| Ok(Value::Null)));
    let g = Value::Function(Callable::anonymous(|_, _| Ok(Value::Null)));

    loose.call_detached(&[f]).unwrap();
    loose.call_detached(&[g]).unwrap();
    assert_eq!(count(&calls), 1);
}

#[test]
fn test_ttl_expiration() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer
        .cached(&add(&calls), Some(MemoOptions::with_ttl_ms(10)))
        .unwrap();

    wrapper.call_detached(&[Value::Int(1)]).unwrap();

    // Should be a hit immediately
    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    assert_eq!(count(&calls), 1);

    // Wait for expiration
    sleep(Duration::from_millis(15));

    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    assert_eq!(count(&calls), 2);

    let stats = wrapper.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.evictions_ttl, 1);
}

#[test]
fn test_explicit_clear_of_one_key() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer.cached(&add(&calls), None).unwrap();
    let target = ClearTarget::Wrapper(wrapper.callable());

    assert_eq!(wrapper.call_detached(&[Value::Int(2), Value::Int(2)]).unwrap(), Value::Int(4));
    assert_eq!(wrapper.call_detached(&[Value::Int(5), Value::Int(5)]).unwrap(), Value::Int(10));
    assert_eq!(count(&calls), 2);

    let args = Value::list(vec![Value::Int(2), Value::Int(2)]);
    assert_eq!(memoizer.clear(target, Some(&args)).unwrap(), 1);

    assert_eq!(wrapper.call_detached(&[Value::Int(2), Value::Int(2)]).unwrap(), Value::Int(4));
    assert_eq!(count(&calls), 3);

    assert_eq!(wrapper.call_detached(&[Value::Int(5), Value::Int(5)]).unwrap(), Value::Int(10));
    assert_eq!(count(&calls), 3);

    // Clearing an absent key is a no-op
    let absent = Value::list(vec![Value::Int(9)]);
    assert_eq!(memoizer.clear(target, Some(&absent)).unwrap(), 0);

    // No argument list clears the whole store
    assert_eq!(memoizer.clear(target, None).unwrap(), 2);
    assert_eq!(wrapper.stats().entries, 0);
}

#[test]
fn test_accessor_caching() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let class = Class::new("Order");
    class.define_getter("total", read_field(&calls, "total", "amount"));

    memoizer.cache_accessor(&class, "total", None).unwrap();

    let order = class.instantiate();
    order.set_field("amount", Value::Int(10));

    assert_eq!(order.get("total").unwrap(), Value::Int(10));
    assert_eq!(order.get("total").unwrap(), Value::Int(10));
    assert_eq!(count(&calls), 1);

    memoizer
        .clear(ClearTarget::Member { context: &order, name: "total" }, None)
        .unwrap();
    assert_eq!(order.get("total").unwrap(), Value::Int(10));
    assert_eq!(count(&calls), 2);

    // Another instance gets its own entry
    let other = class.instantiate();
    other.set_field("amount", Value::Int(3));
    assert_eq!(other.get("total").unwrap(), Value::Int(3));
    assert_eq!(count(&calls), 3);
}

#[test]
fn test_accessor_preserves_setter() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let class = Class::new("Temperature");
    let read = read_field(&calls, "celsius", "raw");
    let write = Callable::from_fn("celsius", |ctx, args| {
        let this = ctx.object().ok_or("celsius needs a receiver")?;
        this.set_field("raw", args.first().cloned().unwrap_or_default());
        Ok(Value::Undefined)
    });
    class.define_accessor("celsius", Accessor::getter(read).with_setter(write));

    memoizer.cache_accessor(&class, "celsius", None).unwrap();

    let t = class.instantiate();
    t.set("celsius", Value::Int(20)).unwrap();
    assert_eq!(t.field("raw"), Some(Value::Int(20)));
    assert_eq!(t.get("celsius").unwrap(), Value::Int(20));

    // Writes go through the setter; the cached read stays until cleared
    t.set("celsius", Value::Int(25)).unwrap();
    assert_eq!(t.get("celsius").unwrap(), Value::Int(20));
    assert_eq!(count(&calls), 1);

    memoizer.clear_member(&t, "celsius", None).unwrap();
    assert_eq!(t.get("celsius").unwrap(), Value::Int(25));
}

#[test]
fn test_inherited_accessor_and_repeat_registration() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let base = Class::new("Base");
    base.define_getter("label", read_field(&calls, "label", "raw"));
    let derived = Class::extend("Derived", &base);

    let first = memoizer.cache_accessor(&derived, "label", None).unwrap();
    let second = memoizer
        .cache_accessor(&derived, "label", Some(MemoOptions::loose()))
        .unwrap();
    assert!(first.ptr_eq(&second));

    let d = derived.instantiate();
    d.set_field("raw", Value::str("derived"));
    assert_eq!(d.get("label").unwrap(), Value::str("derived"));
    assert_eq!(d.get("label").unwrap(), Value::str("derived"));
    assert_eq!(count(&calls), 1);

    // The base class keeps its uncached accessor
    let b = base.instantiate();
    b.get("label").unwrap();
    b.get("label").unwrap();
    assert_eq!(count(&calls), 3);
}

#[test]
fn test_cache_accessor_not_found() {
    let memoizer = Memoizer::default();
    let class = Class::new("Empty");
    let write_only = Callable::from_fn("w", |_, _| Ok(Value::Undefined));
    class.define_accessor(
        "secret",
        Accessor {
            read: None,
            write: Some(write_only),
        },
    );

    let err = memoizer.cache_accessor(&class, "missing", None).unwrap_err();
    assert_eq!(
        err,
        MemoError::NotFound {
            type_name: "Empty".to_string(),
            property: "missing".to_string(),
        }
    );

    let err = memoizer.cache_accessor(&class, "secret", None).unwrap_err();
    assert!(matches!(err, MemoError::NotFound { .. }));
}

#[test]
fn test_non_callable_is_rejected() {
    let memoizer = Memoizer::default();

    let err = memoizer
        .cached_value(&Value::Int(1), &Value::Undefined)
        .unwrap_err();
    assert!(matches!(err, MemoError::InvalidArgument(_)));
}

#[test]
fn test_malformed_ttl_is_rejected() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let f = Value::Function(add(&calls));

    for ttl in [Value::Int(-1), Value::Int(0), Value::Float(1.5), Value::str("10")] {
        let options = Object::record(vec![("ttl", ttl)]);
        let err = memoizer
            .cached_value(&f, &Value::Object(options))
            .unwrap_err();
        assert!(matches!(err, MemoError::InvalidArgument(_)));
    }

    let options = Object::record(vec![("ttl", Value::Int(10)), ("strictArgMatch", Value::Bool(false))]);
    let wrapper = memoizer.cached_value(&f, &Value::Object(options)).unwrap();
    assert_eq!(wrapper.options(), &MemoOptions::builder().strict_arg_match(false).ttl_ms(10).build());
    assert_eq!(memoizer.wrapper_count(), 1);
}

#[test]
fn test_clear_unwrapped_target() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let plain = add(&calls);

    let err = memoizer
        .clear(ClearTarget::Wrapper(&plain), None)
        .unwrap_err();
    assert!(matches!(err, MemoError::NotCached(_)));

    let class = Class::new("Item");
    class.define_method("plain", plain.clone());
    let item = class.instantiate();

    let err = memoizer
        .clear(ClearTarget::Member { context: &item, name: "plain" }, None)
        .unwrap_err();
    assert!(matches!(err, MemoError::NotCached(_)));

    let err = memoizer
        .clear(ClearTarget::Member { context: &item, name: "nothing" }, None)
        .unwrap_err();
    assert!(matches!(err, MemoError::NotCached(_)));
}

#[test]
fn test_clear_member_prefers_own_function_field() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer.cached(&add(&calls), None).unwrap();

    let item = Object::record(vec![("sum", Value::Function(wrapper.callable().clone()))]);
    item.call("sum", &[Value::Int(4)]).unwrap();
    item.call("sum", &[Value::Int(4)]).unwrap();
    assert_eq!(count(&calls), 1);

    let args = Value::list(vec![Value::Int(4)]);
    let removed = memoizer
        .clear(ClearTarget::Member { context: &item, name: "sum" }, Some(&args))
        .unwrap();
    assert_eq!(removed, 1);

    item.call("sum", &[Value::Int(4)]).unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_factory_callable() {
    let memoizer = Arc::new(Memoizer::default());
    let factory = memoizer.factory();
    let calls = counter();
    let add = Value::Function(add(&calls));

    let a = factory.call_detached(&[add.clone()]).unwrap();
    let b = factory.call_detached(&[add.clone(), Value::Undefined]).unwrap();
    assert_eq!(a, b);

    let wrapper = a.as_function().unwrap();
    assert!(wrapper.is_cached());
    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    assert_eq!(count(&calls), 1);

    let err = factory.construct(&[add]).unwrap_err();
    assert!(matches!(err, MemoError::UsageError(_)));

    let err = factory.call_detached(&[Value::str("nope")]).unwrap_err();
    assert!(matches!(err, MemoError::InvalidArgument(_)));
}

#[test]
fn test_sweep_prunes_dropped_receivers() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let class = Class::new("Item");
    let m = memoizer.cached(&read_id(&calls), None).unwrap();
    class.define_method("m", m.callable().clone());

    let keep = instance(&class, 1);
    keep.call("m", &[]).unwrap();
    {
        let temp = instance(&class, 2);
        temp.call("m", &[]).unwrap();
    }
    assert_eq!(m.stats().contexts, 2);

    let report = memoizer.sweep();
    assert_eq!(report.dead_contexts, 1);
    assert_eq!(m.stats().contexts, 1);

    keep.call("m", &[]).unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_forget_releases_self_referencing_receiver() {
    let memoizer = Memoizer::default();
    let class = Class::new("Node");
    let me = Callable::from_fn("me", |ctx, _| {
        let this = ctx.object().ok_or("me needs a receiver")?;
        Ok(Value::Object(this.clone()))
    });
    let wrapper = memoizer.cached(&me, None).unwrap();
    class.define_method("me", wrapper.callable().clone());

    let node = class.instantiate();
    let weak = node.downgrade();
    assert!(node.call("me", &[]).unwrap().as_object().unwrap().ptr_eq(&node));

    // The cached result keeps the dropped receiver reachable
    drop(node);
    assert!(weak.is_alive());
    assert_eq!(memoizer.sweep().dead_contexts, 0);

    let node = weak.upgrade().unwrap();
    assert_eq!(memoizer.forget(&node), 1);
    drop(node);

    assert!(!weak.is_alive());
    assert_eq!(wrapper.stats().contexts, 0);
}

#[test]
fn test_forget_releases_receiver_used_as_argument() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer.cached(&add(&calls), None).unwrap();

    let node = Object::record(vec![("id", Value::Int(1))]);
    let weak = node.downgrade();
    wrapper.call_detached(&[Value::Object(node.clone())]).unwrap();
    wrapper.call_detached(&[Value::Int(2)]).unwrap();

    assert_eq!(memoizer.forget(&node), 1);
    drop(node);

    assert!(!weak.is_alive());
    // Unrelated entries stay
    wrapper.call_detached(&[Value::Int(2)]).unwrap();
    assert_eq!(count(&calls), 2);
}

#[test]
fn test_registration_releases_dropped_closures() {
    let memoizer = Memoizer::default();
    let payload = Arc::new(vec![7u8; 64]);
    let watch = Arc::downgrade(&payload);

    {
        let capturing = Callable::from_fn("capturing", move |_, _| {
            Ok(Value::Int(payload.len() as i64))
        });
        let wrapper = memoizer.cached(&capturing, None).unwrap();
        wrapper.call_detached(&[]).unwrap();
    }

    let calls = counter();
    let kept = add(&calls);
    memoizer.cached(&kept, None).unwrap();

    assert!(watch.upgrade().is_none());
    assert_eq!(memoizer.wrapper_count(), 1);
}

#[test]
fn test_sweep_drops_unreferenced_wrappers() {
    let memoizer = Memoizer::default();
    let calls = counter();

    let kept = add(&calls);
    let kept_wrapper = memoizer.cached(&kept, None).unwrap();
    {
        let temp = add(&calls);
        let wrapper = memoizer.cached(&temp, None).unwrap();
        wrapper.call_detached(&[Value::Int(1)]).unwrap();
    }
    assert_eq!(memoizer.wrapper_count(), 2);

    let report = memoizer.sweep();
    assert_eq!(report.dead_wrappers, 1);
    assert_eq!(memoizer.wrapper_count(), 1);

    // A swept pair can be wrapped again
    let again = memoizer.cached(&kept, None).unwrap();
    assert!(again.ptr_eq(&kept_wrapper));
}

#[test]
fn test_sweep_purges_expired_entries() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let wrapper = memoizer
        .cached(&add(&calls), Some(MemoOptions::with_ttl_ms(10)))
        .unwrap();

    wrapper.call_detached(&[Value::Int(1)]).unwrap();
    wrapper.call_detached(&[Value::Int(2)]).unwrap();
    sleep(Duration::from_millis(15));

    let report = memoizer.sweep();
    assert_eq!(report.expired_entries, 2);
    assert_eq!(wrapper.stats().entries, 0);
}

#[test]
fn test_global_memoizer() {
    let calls = counter();
    let add = add(&calls);

    let a = ouroboros_memo::cached(&add, None).unwrap();
    let b = Memoizer::global().cached(&add, None).unwrap();
    assert!(a.ptr_eq(&b));

    a.call_detached(&[Value::Int(3)]).unwrap();
    b.call_detached(&[Value::Int(3)]).unwrap();
    assert_eq!(count(&calls), 1);

    let removed = ouroboros_memo::clear(ClearTarget::Wrapper(a.callable()), None).unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn test_cached_function_from_callable() {
    let memoizer = Memoizer::default();
    let calls = counter();
    let plain = add(&calls);
    let wrapper = memoizer.cached(&plain, None).unwrap();

    assert!(CachedFunction::from_callable(&plain).is_none());
    let recovered = CachedFunction::from_callable(wrapper.callable()).unwrap();
    assert!(recovered.ptr_eq(&wrapper));
    assert!(recovered.underlying().ptr_eq(&plain));
}
