//! Native callables and their registries
//!
//! Natives are a closed set of function pointers. Methods receive their
//! receiver as argument 0; free natives receive only their own arguments.
//! All of them report errors through the common result type, using the
//! call-site line carried by the context (or 0 when none exists).

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

use super::error::{InterpResult, RuntimeError};
use super::heap::{Heap, ListObj, Obj};
use super::value::{TypeTag, Value};

/// Evaluation context handed to a native for the duration of one call
pub struct NativeCtx<'a> {
    pub heap: &'a mut Heap,
    /// Line of the call site, for error reporting
    pub line: usize,
}

/// Signature of a native callable
pub type NativeFn = fn(&mut NativeCtx<'_>, &[Value]) -> InterpResult<Value>;

static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Anchor the clock at interpreter startup
pub(crate) fn init_clock() {
    START.get_or_init(Instant::now);
}

fn number_arg(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

// --- Global natives ---

fn native_clock(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if !args.is_empty() {
        return Err(RuntimeError::type_error(
            "clock() takes no arguments.",
            ctx.line,
        ));
    }
    let start = START.get_or_init(Instant::now);
    Ok(Value::Float(start.elapsed().as_secs_f64()))
}

fn native_input(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    for arg in args {
        print!("{}", ctx.heap.display(arg));
    }
    let _ = std::io::stdout().flush();
    let mut buffer = String::new();
    let _ = std::io::stdin().read_line(&mut buffer);
    while buffer.ends_with('\n') || buffer.ends_with('\r') {
        buffer.pop();
    }
    Ok(Value::Str(Rc::new(buffer)))
}

// --- Shared string/list methods ---

fn native_len(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if args.len() != 1 {
        return Err(RuntimeError::type_error(
            "len() takes no arguments.",
            ctx.line,
        ));
    }
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.len() as i32)),
        Value::List(r) => Ok(Value::Int(ctx.heap.list(*r).items.len() as i32)),
        _ => Err(RuntimeError::type_error(
            "len() can only be called on a string or a list.",
            ctx.line,
        )),
    }
}

// --- String methods ---

fn native_string_trim(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if args.len() != 1 {
        return Err(RuntimeError::type_error(
            "trim() takes no arguments.",
            ctx.line,
        ));
    }
    match &args[0] {
        Value::Str(s) => Ok(Value::string(s.trim())),
        _ => Err(RuntimeError::type_error(
            "trim() must be called on a string.",
            ctx.line,
        )),
    }
}

fn native_string_split(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if args.len() != 2 {
        return Err(RuntimeError::type_error(
            "split() takes exactly one argument (the delimiter).",
            ctx.line,
        ));
    }
    let (subject, delim) = match (&args[0], &args[1]) {
        (Value::Str(s), Value::Str(d)) => (s, d),
        _ => {
            return Err(RuntimeError::type_error(
                "split() requires a string object and a string delimiter.",
                ctx.line,
            ));
        }
    };
    // split on any delimiter character; empty pieces are dropped
    let items: Vec<Value> = subject
        .split(|c| delim.contains(c))
        .filter(|piece| !piece.is_empty())
        .map(Value::string)
        .collect();
    let list = ctx.heap.alloc(Obj::List(ListObj {
        items,
        fixed: false,
        elem_type: TypeTag::Str,
    }));
    Ok(Value::List(list))
}

// --- List methods ---

fn native_list_append(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if args.len() != 2 {
        return Err(RuntimeError::type_error(
            "append() takes exactly one argument.",
            ctx.line,
        ));
    }
    let list = match &args[0] {
        Value::List(r) => *r,
        _ => {
            return Err(RuntimeError::type_error(
                "append() must be called on a list.",
                ctx.line,
            ));
        }
    };
    if ctx.heap.list(list).fixed {
        return Err(RuntimeError::type_error(
            "Cannot append to a fixed-size list.",
            ctx.line,
        ));
    }
    ctx.heap.list_mut(list).items.push(args[1].clone());
    Ok(Value::Void)
}

fn native_list_join(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    if args.len() != 2 {
        return Err(RuntimeError::type_error(
            "join() takes exactly one argument (the delimiter).",
            ctx.line,
        ));
    }
    let (list, delim) = match (&args[0], &args[1]) {
        (Value::List(r), Value::Str(d)) => (*r, d),
        _ => {
            return Err(RuntimeError::type_error(
                "join() requires a list object and a string delimiter.",
                ctx.line,
            ));
        }
    };
    let mut pieces = Vec::with_capacity(ctx.heap.list(list).items.len());
    for item in &ctx.heap.list(list).items {
        match item {
            Value::Str(s) => pieces.push(s.as_str().to_string()),
            _ => {
                return Err(RuntimeError::type_error(
                    "join() can only be called on a list of strings.",
                    ctx.line,
                ));
            }
        }
    }
    Ok(Value::string(pieces.join(delim.as_str())))
}

// --- math module ---

fn math_arg(name: &str, ctx: &NativeCtx<'_>, args: &[Value]) -> InterpResult<f64> {
    if args.len() != 1 {
        return Err(RuntimeError::type_error(
            format!("{name}() takes exactly one argument."),
            ctx.line,
        ));
    }
    number_arg(&args[0]).ok_or_else(|| {
        RuntimeError::type_error(format!("{name}() argument must be a number."), ctx.line)
    })
}

fn native_math_sqrt(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("sqrt", ctx, args)?.sqrt()))
}

fn native_math_sin(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("sin", ctx, args)?.sin()))
}

fn native_math_cos(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("cos", ctx, args)?.cos()))
}

fn native_math_tan(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("tan", ctx, args)?.tan()))
}

fn native_math_floor(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("floor", ctx, args)?.floor()))
}

fn native_math_ceil(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("ceil", ctx, args)?.ceil()))
}

fn native_math_log(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    Ok(Value::Float(math_arg("log", ctx, args)?.ln()))
}

// --- io module ---

fn native_io_read_file(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    let path = match args {
        [Value::Str(path)] => path,
        _ => {
            return Err(RuntimeError::type_error(
                "read_file() takes exactly one string argument (the path).",
                ctx.line,
            ));
        }
    };
    match std::fs::read_to_string(path.as_str()) {
        Ok(content) => Ok(Value::string(content)),
        Err(_) => Ok(Value::Void),
    }
}

fn native_io_write_file(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    let (path, content) = match args {
        [Value::Str(path), Value::Str(content)] => (path, content),
        _ => {
            return Err(RuntimeError::type_error(
                "write_file() takes two string arguments (path, content).",
                ctx.line,
            ));
        }
    };
    Ok(Value::Bool(
        std::fs::write(path.as_str(), content.as_str()).is_ok(),
    ))
}

// --- sys module ---

fn native_sys_exit(ctx: &mut NativeCtx<'_>, args: &[Value]) -> InterpResult<Value> {
    match args {
        [Value::Int(code)] => std::process::exit(*code),
        _ => Err(RuntimeError::type_error(
            "exit() takes exactly one integer argument (the exit code).",
            ctx.line,
        )),
    }
}

// --- Registries ---

pub(crate) fn string_methods() -> HashMap<String, NativeFn> {
    let mut methods: HashMap<String, NativeFn> = HashMap::new();
    methods.insert("len".to_string(), native_len);
    methods.insert("trim".to_string(), native_string_trim);
    methods.insert("split".to_string(), native_string_split);
    methods
}

pub(crate) fn list_methods() -> HashMap<String, NativeFn> {
    let mut methods: HashMap<String, NativeFn> = HashMap::new();
    methods.insert("len".to_string(), native_len);
    methods.insert("append".to_string(), native_list_append);
    methods.insert("join".to_string(), native_list_join);
    methods
}

pub(crate) fn module_natives() -> HashMap<String, HashMap<String, NativeFn>> {
    let mut modules = HashMap::new();

    let mut math: HashMap<String, NativeFn> = HashMap::new();
    math.insert("sqrt".to_string(), native_math_sqrt);
    math.insert("sin".to_string(), native_math_sin);
    math.insert("cos".to_string(), native_math_cos);
    math.insert("tan".to_string(), native_math_tan);
    math.insert("floor".to_string(), native_math_floor);
    math.insert("ceil".to_string(), native_math_ceil);
    math.insert("log".to_string(), native_math_log);
    modules.insert("math".to_string(), math);

    let mut io: HashMap<String, NativeFn> = HashMap::new();
    io.insert("read_file".to_string(), native_io_read_file);
    io.insert("write_file".to_string(), native_io_write_file);
    modules.insert("io".to_string(), io);

    let mut sys: HashMap<String, NativeFn> = HashMap::new();
    sys.insert("exit".to_string(), native_sys_exit);
    modules.insert("sys".to_string(), sys);

    modules
}

/// Free natives bound directly in the global scope
pub(crate) fn global_natives() -> Vec<(&'static str, NativeFn)> {
    vec![("clock", native_clock), ("input", native_input)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(heap: &mut Heap) -> NativeCtx<'_> {
        NativeCtx { heap, line: 0 }
    }

    #[test]
    fn test_len_string_and_list() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(ListObj {
            items: vec![Value::Int(1), Value::Int(2)],
            fixed: false,
            elem_type: TypeTag::Any,
        }));
        let mut c = ctx(&mut heap);
        assert_eq!(
            native_len(&mut c, &[Value::string("hello")]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(native_len(&mut c, &[Value::List(list)]).unwrap(), Value::Int(2));
        assert!(native_len(&mut c, &[Value::Int(3)]).is_err());
    }

    #[test]
    fn test_trim() {
        let mut heap = Heap::new();
        let mut c = ctx(&mut heap);
        assert_eq!(
            native_string_trim(&mut c, &[Value::string("  a b \t")]).unwrap(),
            Value::string("a b")
        );
    }

    #[test]
    fn test_split_drops_empty_pieces() {
        let mut heap = Heap::new();
        let result = {
            let mut c = ctx(&mut heap);
            native_string_split(&mut c, &[Value::string("a,,b,c"), Value::string(",")]).unwrap()
        };
        let list = match result {
            Value::List(r) => r,
            _ => unreachable!(),
        };
        let items = &heap.list(list).items;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Value::string("a"));
        assert_eq!(items[2], Value::string("c"));
    }

    #[test]
    fn test_append() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(ListObj {
            items: vec![],
            fixed: false,
            elem_type: TypeTag::Any,
        }));
        {
            let mut c = ctx(&mut heap);
            native_list_append(&mut c, &[Value::List(list), Value::Int(7)]).unwrap();
        }
        assert_eq!(heap.list(list).items, vec![Value::Int(7)]);
    }

    #[test]
    fn test_append_to_fixed_list_fails() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(ListObj {
            items: vec![Value::Void; 3],
            fixed: true,
            elem_type: TypeTag::Int,
        }));
        let mut c = ctx(&mut heap);
        let err = native_list_append(&mut c, &[Value::List(list), Value::Int(1)]).unwrap_err();
        assert!(err.message.contains("fixed-size"));
    }

    #[test]
    fn test_join() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(ListObj {
            items: vec![Value::string("a"), Value::string("b")],
            fixed: false,
            elem_type: TypeTag::Str,
        }));
        let mut c = ctx(&mut heap);
        assert_eq!(
            native_list_join(&mut c, &[Value::List(list), Value::string("-")]).unwrap(),
            Value::string("a-b")
        );
    }

    #[test]
    fn test_join_rejects_non_strings() {
        let mut heap = Heap::new();
        let list = heap.alloc(Obj::List(ListObj {
            items: vec![Value::Int(1)],
            fixed: false,
            elem_type: TypeTag::Any,
        }));
        let mut c = ctx(&mut heap);
        assert!(native_list_join(&mut c, &[Value::List(list), Value::string(",")]).is_err());
    }

    #[test]
    fn test_math_sqrt() {
        let mut heap = Heap::new();
        let mut c = ctx(&mut heap);
        assert_eq!(
            native_math_sqrt(&mut c, &[Value::Int(9)]).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            native_math_sqrt(&mut c, &[Value::Float(2.25)]).unwrap(),
            Value::Float(1.5)
        );
        assert!(native_math_sqrt(&mut c, &[Value::string("9")]).is_err());
        assert!(native_math_sqrt(&mut c, &[]).is_err());
    }

    #[test]
    fn test_math_floor_ceil() {
        let mut heap = Heap::new();
        let mut c = ctx(&mut heap);
        assert_eq!(
            native_math_floor(&mut c, &[Value::Float(2.9)]).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            native_math_ceil(&mut c, &[Value::Float(2.1)]).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut heap = Heap::new();
        init_clock();
        let mut c = ctx(&mut heap);
        let a = match native_clock(&mut c, &[]).unwrap() {
            Value::Float(x) => x,
            _ => unreachable!(),
        };
        let b = match native_clock(&mut c, &[]).unwrap() {
            Value::Float(x) => x,
            _ => unreachable!(),
        };
        assert!(b >= a);
    }

    #[test]
    fn test_registries_are_populated() {
        assert!(string_methods().contains_key("split"));
        assert!(list_methods().contains_key("append"));
        let modules = module_natives();
        assert!(modules["math"].contains_key("sqrt"));
        assert!(modules["io"].contains_key("read_file"));
        assert!(modules["sys"].contains_key("exit"));
        assert_eq!(global_natives().len(), 2);
    }
}
