//! Tree-walking evaluator
//!
//! Two mutually recursive operations: `eval` on expression nodes returns a
//! value, `exec` on statement nodes returns a control-flow result. Both
//! receive the handle of the current scope; statements extend it through
//! `define`. Any value that only lives on the Rust call stack is pushed on
//! the heap's temporary root stack before evaluation continues into code
//! that may allocate.

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{Node, NodeKind};
use crate::lexer::tokenize;
use crate::parser::parse;

use super::env::EnvHandle;
use super::error::{InterpResult, RuntimeError};
use super::heap::{
    BoundMethodObj, ClassObj, FuncObj, Heap, InstanceObj, ListObj, MapObj, ModuleObj, Obj, ObjRef,
};
use super::natives::{self, NativeCtx, NativeFn};
use super::value::{TypeTag, Value};

/// Maximum call depth before reporting stack overflow
const MAX_CALL_DEPTH: usize = 1000;

/// Stack growth parameters for deep evaluator recursion
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

/// Result of executing a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Resolves a module name to source text
pub trait SourceLoader {
    fn load(&self, name: &str) -> Option<String>;
}

/// Loads `stdlib/<name>.pith`, then `<name>.pith` in the current directory
pub struct FileLoader;

impl SourceLoader for FileLoader {
    fn load(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(format!("stdlib/{name}.pith"))
            .or_else(|_| std::fs::read_to_string(format!("{name}.pith")))
            .ok()
    }
}

/// The interpreter
pub struct Interpreter {
    heap: Heap,
    /// Native methods on string receivers
    string_methods: HashMap<String, NativeFn>,
    /// Native methods on list receivers
    list_methods: HashMap<String, NativeFn>,
    /// Native modules, merged into script modules on import
    module_natives: HashMap<String, HashMap<String, NativeFn>>,
    loader: Box<dyn SourceLoader>,
    out: Box<dyn Write>,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Build an interpreter whose `print` statement writes to `out`
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let mut interp = Interpreter {
            heap: Heap::new(),
            string_methods: natives::string_methods(),
            list_methods: natives::list_methods(),
            module_natives: natives::module_natives(),
            loader: Box::new(FileLoader),
            out,
            depth: 0,
        };
        natives::init_clock();
        let global = interp.heap.global_scope();
        for (name, func) in natives::global_natives() {
            interp.heap.define(global, name, Value::Native(func));
        }
        interp
    }

    /// Replace the module source loader
    pub fn set_loader(&mut self, loader: Box<dyn SourceLoader>) {
        self.loader = loader;
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Force a collection cycle
    pub fn collect_garbage(&mut self) {
        self.heap.collect();
    }

    /// Textual form of a value, as `print` would render it
    pub fn display_value(&self, value: &Value) -> String {
        self.heap.display(value)
    }

    /// Execute every top-level statement of a program
    pub fn interpret(&mut self, program: &Node) -> InterpResult<()> {
        let global = self.heap.global_scope();
        for stmt in &program.children {
            match self.exec(stmt, global)? {
                Flow::Normal | Flow::Return(_) => {}
                Flow::Break => return Err(RuntimeError::stray_control("break", stmt.line)),
                Flow::Continue => return Err(RuntimeError::stray_control("continue", stmt.line)),
            }
            debug_assert_eq!(self.heap.root_depth(), 0, "leaked temporary root");
        }
        Ok(())
    }

    /// Evaluate a sole expression against the globals (REPL echo)
    pub fn eval_expr(&mut self, node: &Node) -> InterpResult<Value> {
        let global = self.heap.global_scope();
        self.eval(node, global)
    }

    // --- Statements ---

    fn exec(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.exec_inner(node, scope)
        })
    }

    fn exec_inner(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        match node.kind {
            NodeKind::Block => self.exec_block(node, scope),
            NodeKind::ClassDef => {
                self.exec_class_def(node, scope)?;
                Ok(Flow::Normal)
            }
            NodeKind::FuncDef => {
                let env = self.heap.scope_head(scope);
                let func = self.heap.alloc(Obj::Func(FuncObj {
                    name: node.text().to_string(),
                    body: Rc::new(node.clone()),
                    env,
                    owner_class: None,
                }));
                self.heap.define(scope, node.text(), Value::Func(func));
                Ok(Flow::Normal)
            }
            NodeKind::Print => {
                for (i, child) in node.children.iter().enumerate() {
                    let value = self.eval(child, scope)?;
                    let text = self.heap.display(&value);
                    if i > 0 {
                        let _ = write!(self.out, " ");
                    }
                    let _ = write!(self.out, "{text}");
                }
                let _ = writeln!(self.out);
                let _ = self.out.flush();
                Ok(Flow::Normal)
            }
            NodeKind::VarDecl => {
                self.exec_var_decl(node, scope)?;
                Ok(Flow::Normal)
            }
            NodeKind::Assignment => {
                let value = self.eval(&node.children[1], scope)?;
                self.heap.push_root(value.clone());
                let result = self.assign_target(&node.children[0], value, scope);
                self.heap.pop_root();
                result?;
                Ok(Flow::Normal)
            }
            NodeKind::If => {
                let cond = self.eval(&node.children[0], scope)?;
                if cond.is_truthy() {
                    self.exec_block(&node.children[1], scope)
                } else if node.children.len() > 2 {
                    let else_node = &node.children[2];
                    if else_node.kind == NodeKind::If {
                        self.exec(else_node, scope)
                    } else {
                        self.exec_block(else_node, scope)
                    }
                } else {
                    Ok(Flow::Normal)
                }
            }
            NodeKind::While => {
                while self.eval(&node.children[0], scope)?.is_truthy() {
                    match self.exec_block(&node.children[1], scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            NodeKind::DoWhile => {
                loop {
                    match self.exec_block(&node.children[0], scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                    if !self.eval(&node.children[1], scope)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            NodeKind::For => {
                let for_scope = self.heap.push_scope(Some(scope));
                let result = self.exec_for(node, for_scope);
                self.heap.pop_scope(for_scope);
                result
            }
            NodeKind::Foreach => {
                let collection = self.eval(&node.children[0], scope)?;
                let list = match &collection {
                    Value::List(r) => *r,
                    other => {
                        return Err(RuntimeError::type_error(
                            format!(
                                "foreach loop can only iterate over a list, not '{}'.",
                                other.type_name()
                            ),
                            node.line,
                        ));
                    }
                };
                self.heap.push_root(collection);
                let result = self.exec_foreach(node, list, scope);
                self.heap.pop_root();
                result
            }
            NodeKind::Switch => self.exec_switch(node, scope),
            NodeKind::Break => Ok(Flow::Break),
            NodeKind::Continue => Ok(Flow::Continue),
            NodeKind::Return => {
                if node.children.is_empty() {
                    Ok(Flow::Return(Value::Void))
                } else {
                    let value = self.eval(&node.children[0], scope)?;
                    Ok(Flow::Return(value))
                }
            }
            NodeKind::Import => {
                let name = node.text().to_string();
                let mod_scope = self.heap.push_scope(None);
                let result = self.import_module(&name, mod_scope, node.line);
                match result {
                    Ok(module_val) => {
                        self.heap.define(scope, &name, module_val);
                        self.heap.pop_scope(mod_scope);
                        Ok(Flow::Normal)
                    }
                    Err(err) => {
                        self.heap.pop_scope(mod_scope);
                        Err(err)
                    }
                }
            }
            _ => {
                // expression statement: evaluate and discard
                self.eval(node, scope)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Run a block's statements in a fresh child scope
    fn exec_block(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        let inner = self.heap.push_scope(Some(scope));
        let result = self.exec_block_in(node, inner);
        self.heap.pop_scope(inner);
        result
    }

    /// Run a block's statements directly in the given scope
    fn exec_block_in(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        for stmt in &node.children {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_class_def(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<()> {
        let name = node.text().to_string();
        let parent = match &node.parent_name {
            Some(parent_name) => match self.heap.lookup(scope, parent_name) {
                Some(Value::Class(r)) => Some(r),
                Some(other) => {
                    return Err(RuntimeError::type_error(
                        format!(
                            "Superclass '{}' must be a class, not '{}'.",
                            parent_name,
                            other.type_name()
                        ),
                        node.line,
                    ));
                }
                None => {
                    return Err(RuntimeError::undefined_variable(parent_name, node.line));
                }
            },
            None => None,
        };

        // inherited members first, local definitions overlaid below
        let (methods, fields) = match parent {
            Some(r) => {
                let class = self.heap.class(r);
                (class.methods.clone(), class.fields.clone())
            }
            None => (HashMap::new(), Vec::new()),
        };
        let class_ref = self.heap.alloc(Obj::Class(ClassObj {
            name: name.clone(),
            methods,
            fields,
            parent,
        }));
        // binding the class first keeps it rooted while methods allocate
        self.heap.define(scope, &name, Value::Class(class_ref));

        for member in &node.children {
            match member.kind {
                NodeKind::FuncDef => {
                    let env = self.heap.scope_head(scope);
                    let method_name = member.text().to_string();
                    let func = self.heap.alloc(Obj::Func(FuncObj {
                        name: method_name.clone(),
                        body: Rc::new(member.clone()),
                        env,
                        owner_class: Some(class_ref),
                    }));
                    self.heap
                        .class_mut(class_ref)
                        .methods
                        .insert(method_name, Value::Func(func));
                }
                NodeKind::FieldDecl => {
                    let field_name = member.text().to_string();
                    let class = self.heap.class_mut(class_ref);
                    if !class.fields.contains(&field_name) {
                        class.fields.push(field_name);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn exec_var_decl(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<()> {
        let name = node.text().to_string();
        let type_name = node.type_name.clone().unwrap_or_default();

        if let Some(spec) = node
            .children
            .first()
            .filter(|child| child.kind == NodeKind::ArraySpecifier)
        {
            let elem_type = TypeTag::from_name(&type_name);
            if spec.children.is_empty() {
                // unsized spec: an empty growable list
                let list = self.heap.alloc(Obj::List(ListObj {
                    items: Vec::new(),
                    fixed: false,
                    elem_type,
                }));
                self.heap.define(scope, &name, Value::List(list));
                return Ok(());
            }
            let size = match self.eval(&spec.children[0], scope)? {
                Value::Int(n) if n >= 0 => n as usize,
                Value::Int(_) => {
                    return Err(RuntimeError::type_error(
                        "Array size must be non-negative.",
                        spec.line,
                    ));
                }
                other => {
                    return Err(RuntimeError::type_error(
                        format!("Array size must be an integer, not '{}'.", other.type_name()),
                        spec.line,
                    ));
                }
            };
            let list = self.heap.alloc(Obj::List(ListObj {
                items: vec![Value::Void; size],
                fixed: true,
                elem_type,
            }));
            self.heap.define(scope, &name, Value::List(list));
            return Ok(());
        }

        if let Some(inner) = type_name.strip_prefix("map<") {
            let inner = inner.strip_suffix('>').unwrap_or(inner);
            let (key_name, value_name) = inner.split_once(',').unwrap_or((inner, "void"));
            let key_type = TypeTag::from_name(key_name);
            let value_type = TypeTag::from_name(value_name);

            match node.children.first() {
                Some(init) if init.kind == NodeKind::MapLiteral => {
                    let map = self.heap.alloc(Obj::Map(MapObj {
                        entries: HashMap::new(),
                        key_type,
                        value_type,
                    }));
                    self.heap.push_root(Value::Map(map));
                    let result = self.fill_map(map, init, scope);
                    self.heap.pop_root();
                    result?;
                    self.heap.define(scope, &name, Value::Map(map));
                }
                Some(init) => {
                    let value = self.eval(init, scope)?;
                    match value {
                        Value::Map(_) => self.heap.define(scope, &name, value),
                        other => {
                            return Err(RuntimeError::type_error(
                                format!(
                                    "Cannot initialize map '{}' from '{}'.",
                                    name,
                                    other.type_name()
                                ),
                                node.line,
                            ));
                        }
                    }
                }
                None => {
                    let map = self.heap.alloc(Obj::Map(MapObj {
                        entries: HashMap::new(),
                        key_type,
                        value_type,
                    }));
                    self.heap.define(scope, &name, Value::Map(map));
                }
            }
            return Ok(());
        }

        let value = match node.children.first() {
            Some(init) => self.eval(init, scope)?,
            None => Value::Void,
        };
        // a declared element type is stamped onto the bound list
        if let (Some(inner), Value::List(r)) = (type_name.strip_prefix("list<"), &value) {
            let inner = inner.strip_suffix('>').unwrap_or(inner);
            self.heap.list_mut(*r).elem_type = TypeTag::from_name(inner);
        }
        self.heap.define(scope, &name, value);
        Ok(())
    }

    /// Evaluate a map literal's pairs into a typed map
    fn fill_map(&mut self, map: ObjRef, literal: &Node, scope: EnvHandle) -> InterpResult<()> {
        for pair in literal.children.chunks(2) {
            let key = match self.eval(&pair[0], scope)? {
                Value::Str(s) => s.as_str().to_string(),
                _ => {
                    return Err(RuntimeError::type_error(
                        "Map keys must be strings.",
                        pair[0].line,
                    ));
                }
            };
            let value = self.eval(&pair[1], scope)?;
            self.map_set(map, key, value, literal.line)?;
        }
        Ok(())
    }

    /// Insert into a map, enforcing its declared value type
    fn map_set(&mut self, map: ObjRef, key: String, value: Value, line: usize) -> InterpResult<()> {
        let value_type = self.heap.map(map).value_type;
        if value_type != TypeTag::Any && !value_type.matches(&value) {
            return Err(RuntimeError::type_error(
                format!(
                    "Type mismatch: Cannot set value of type '{}' in a map expecting type '{}'.",
                    value.type_name(),
                    value_type.name()
                ),
                line,
            ));
        }
        self.heap.map_mut(map).entries.insert(key, value);
        Ok(())
    }

    fn assign_target(&mut self, target: &Node, value: Value, scope: EnvHandle) -> InterpResult<()> {
        match target.kind {
            NodeKind::VarRef => {
                if self.heap.assign(scope, target.text(), value) {
                    Ok(())
                } else {
                    Err(RuntimeError::undefined_variable(target.text(), target.line))
                }
            }
            NodeKind::FieldAccess => {
                let object = self.eval(&target.children[0], scope)?;
                match object {
                    Value::Instance(r) => {
                        self.heap
                            .instance_mut(r)
                            .fields
                            .insert(target.text().to_string(), value);
                        Ok(())
                    }
                    other => Err(RuntimeError::type_error(
                        format!(
                            "Cannot assign to a field on a value of type '{}'.",
                            other.type_name()
                        ),
                        target.line,
                    )),
                }
            }
            NodeKind::IndexAccess => {
                let collection = self.eval(&target.children[0], scope)?;
                self.heap.push_root(collection.clone());
                let index = self.eval(&target.children[1], scope);
                self.heap.pop_root();
                let index = index?;
                match collection {
                    Value::List(r) => {
                        let i = match index {
                            Value::Int(i) => i,
                            _ => {
                                return Err(RuntimeError::type_error(
                                    "List index must be an integer.",
                                    target.line,
                                ));
                            }
                        };
                        let len = self.heap.list(r).items.len();
                        if i < 0 || i as usize >= len {
                            return Err(RuntimeError::index_out_of_bounds(target.line));
                        }
                        self.heap.list_mut(r).items[i as usize] = value;
                        Ok(())
                    }
                    Value::Map(r) => {
                        let key = match index {
                            Value::Str(s) => s.as_str().to_string(),
                            _ => {
                                return Err(RuntimeError::type_error(
                                    "Map index must be a string.",
                                    target.line,
                                ));
                            }
                        };
                        self.map_set(r, key, value, target.line)
                    }
                    other => Err(RuntimeError::type_error(
                        format!(
                            "Index assignment is only supported for lists and maps, not '{}'.",
                            other.type_name()
                        ),
                        target.line,
                    )),
                }
            }
            _ => Err(RuntimeError::type_error(
                "Invalid assignment target.",
                target.line,
            )),
        }
    }

    fn exec_for(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        self.exec(&node.children[0], scope)?;
        loop {
            if !self.eval(&node.children[1], scope)?.is_truthy() {
                return Ok(Flow::Normal);
            }
            match self.exec_block(&node.children[3], scope)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            self.exec(&node.children[2], scope)?;
        }
    }

    fn exec_foreach(&mut self, node: &Node, list: ObjRef, scope: EnvHandle) -> InterpResult<Flow> {
        let mut index = 0;
        loop {
            let item = {
                let items = &self.heap.list(list).items;
                if index >= items.len() {
                    break;
                }
                items[index].clone()
            };
            // the binding lands in the enclosing chain and outlives the loop
            self.heap.define(scope, node.text(), item);
            match self.exec_block(&node.children[1], scope)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            index += 1;
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Flow> {
        let subject = self.eval(&node.children[0], scope)?;
        let mut matched = false;

        for case_node in &node.children[1..] {
            match case_node.kind {
                NodeKind::Case => {
                    let case_value = self.eval(&case_node.children[0], scope)?;
                    if matched || subject == case_value {
                        matched = true;
                        match self.exec_block(&case_node.children[1], scope)? {
                            Flow::Break => return Ok(Flow::Normal),
                            Flow::Normal => {}
                            flow => return Ok(flow),
                        }
                    }
                }
                NodeKind::Default => {
                    // default participates in fall-through only after a match
                    if matched {
                        match self.exec_block(&case_node.children[0], scope)? {
                            Flow::Break => return Ok(Flow::Normal),
                            Flow::Normal => {}
                            flow => return Ok(flow),
                        }
                    }
                }
                _ => {}
            }
        }

        if !matched {
            for case_node in &node.children[1..] {
                if case_node.kind == NodeKind::Default {
                    match self.exec_block(&case_node.children[0], scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn import_module(
        &mut self,
        name: &str,
        mod_scope: EnvHandle,
        line: usize,
    ) -> InterpResult<Value> {
        // native functions first, so script code can shadow them
        if let Some(funcs) = self.module_natives.get(name) {
            let funcs: Vec<(String, NativeFn)> =
                funcs.iter().map(|(k, v)| (k.clone(), *v)).collect();
            for (fn_name, func) in funcs {
                self.heap.define(mod_scope, &fn_name, Value::Native(func));
            }
        }

        if let Some(source) = self.loader.load(name) {
            let tokens = tokenize(&source)
                .map_err(|e| RuntimeError::import_error(name, &e.to_string(), line))?;
            let program = parse(&tokens)
                .map_err(|e| RuntimeError::import_error(name, &e.to_string(), line))?;
            for stmt in &program.children {
                match self.exec(stmt, mod_scope)? {
                    Flow::Normal | Flow::Return(_) => {}
                    Flow::Break => return Err(RuntimeError::stray_control("break", stmt.line)),
                    Flow::Continue => {
                        return Err(RuntimeError::stray_control("continue", stmt.line));
                    }
                }
            }
        }

        // walk the chain newest-first; the first binding per name wins,
        // which is what lets module code shadow the merged natives
        let mut members = HashMap::new();
        let mut cursor = self.heap.scope_head(mod_scope);
        while let Some(r) = cursor {
            let binding = self.heap.binding(r);
            if !members.contains_key(&binding.name) {
                members.insert(binding.name.clone(), binding.value.clone());
            }
            cursor = binding.next;
        }

        let module = self.heap.alloc(Obj::Module(ModuleObj {
            name: name.to_string(),
            members,
        }));
        Ok(Value::Module(module))
    }

    // --- Expressions ---

    fn eval(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_inner(node, scope)
        })
    }

    fn eval_inner(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Value> {
        match node.kind {
            NodeKind::IntLiteral => node.text().parse::<i32>().map(Value::Int).map_err(|_| {
                RuntimeError::type_error(
                    format!("Invalid integer literal '{}'.", node.text()),
                    node.line,
                )
            }),
            NodeKind::FloatLiteral => node.text().parse::<f64>().map(Value::Float).map_err(|_| {
                RuntimeError::type_error(
                    format!("Invalid float literal '{}'.", node.text()),
                    node.line,
                )
            }),
            NodeKind::StringLiteral => Ok(Value::string(node.text())),
            NodeKind::BoolLiteral => Ok(Value::Bool(node.text() == "true")),
            NodeKind::ListLiteral => {
                let list = self.heap.alloc(Obj::List(ListObj {
                    items: Vec::with_capacity(node.children.len()),
                    fixed: false,
                    elem_type: TypeTag::Any,
                }));
                self.heap.push_root(Value::List(list));
                let mut failure = None;
                for child in &node.children {
                    match self.eval(child, scope) {
                        Ok(value) => self.heap.list_mut(list).items.push(value),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                self.heap.pop_root();
                match failure {
                    Some(err) => Err(err),
                    None => Ok(Value::List(list)),
                }
            }
            NodeKind::MapLiteral => {
                let map = self.heap.alloc(Obj::Map(MapObj {
                    entries: HashMap::new(),
                    key_type: TypeTag::Str,
                    value_type: TypeTag::Any,
                }));
                self.heap.push_root(Value::Map(map));
                let result = self.fill_map(map, node, scope);
                self.heap.pop_root();
                result.map(|_| Value::Map(map))
            }
            NodeKind::VarRef => self
                .heap
                .lookup(scope, node.text())
                .ok_or_else(|| RuntimeError::undefined_variable(node.text(), node.line)),
            NodeKind::UnaryOp => {
                let operand = self.eval(&node.children[0], scope)?;
                unary_op(node.text(), &operand, node.line)
            }
            NodeKind::BinaryOp => {
                let left = self.eval(&node.children[0], scope)?;
                let right = self.eval(&node.children[1], scope)?;
                binary_op(node.text(), &left, &right, node.line)
            }
            NodeKind::FuncCall => {
                let callee = self.eval(&node.children[0], scope)?;
                self.heap.push_root(callee.clone());
                let mut rooted = 1;
                let mut args = Vec::with_capacity(node.children.len() - 1);
                let mut failure = None;
                for child in &node.children[1..] {
                    match self.eval(child, scope) {
                        Ok(value) => {
                            self.heap.push_root(value.clone());
                            rooted += 1;
                            args.push(value);
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                let result = match failure {
                    Some(err) => Err(err),
                    None => self.call_value(callee, &args, node.line),
                };
                self.heap.pop_roots(rooted);
                result
            }
            NodeKind::NewExpr => self.eval_new(node, scope),
            NodeKind::FieldAccess => self.eval_field_access(node, scope),
            NodeKind::IndexAccess => {
                let collection = self.eval(&node.children[0], scope)?;
                self.heap.push_root(collection.clone());
                let index = self.eval(&node.children[1], scope);
                self.heap.pop_root();
                let index = index?;
                match collection {
                    Value::List(r) => {
                        let i = match index {
                            Value::Int(i) => i,
                            _ => {
                                return Err(RuntimeError::type_error(
                                    "List index must be an integer.",
                                    node.line,
                                ));
                            }
                        };
                        let items = &self.heap.list(r).items;
                        if i < 0 || i as usize >= items.len() {
                            return Err(RuntimeError::index_out_of_bounds(node.line));
                        }
                        Ok(items[i as usize].clone())
                    }
                    Value::Map(r) => {
                        let key = match index {
                            Value::Str(s) => s,
                            _ => {
                                return Err(RuntimeError::type_error(
                                    "Map index must be a string.",
                                    node.line,
                                ));
                            }
                        };
                        Ok(self
                            .heap
                            .map(r)
                            .entries
                            .get(key.as_str())
                            .cloned()
                            .unwrap_or(Value::Void))
                    }
                    other => Err(RuntimeError::type_error(
                        format!("Not an indexable type: '{}'.", other.type_name()),
                        node.line,
                    )),
                }
            }
            _ => Ok(Value::Void),
        }
    }

    fn call_value(&mut self, callee: Value, args: &[Value], line: usize) -> InterpResult<Value> {
        match callee {
            Value::Native(func) => {
                let mut ctx = NativeCtx {
                    heap: &mut self.heap,
                    line,
                };
                func(&mut ctx, args)
            }
            Value::Func(r) => self.call_function(r, args, None, line),
            Value::BoundMethod(r) => {
                let (receiver, method) = {
                    let bm = self.heap.bound_method(r);
                    (bm.receiver.clone(), bm.method.clone())
                };
                match method {
                    Value::Native(func) => {
                        let mut full = Vec::with_capacity(args.len() + 1);
                        full.push(receiver);
                        full.extend_from_slice(args);
                        let mut ctx = NativeCtx {
                            heap: &mut self.heap,
                            line,
                        };
                        func(&mut ctx, &full)
                    }
                    Value::Func(fr) => self.call_function(fr, args, Some(receiver), line),
                    other => Err(RuntimeError::type_error(
                        format!("Bound method wraps a non-callable '{}'.", other.type_name()),
                        line,
                    )),
                }
            }
            other => Err(RuntimeError::type_error(
                format!("Expression is not callable: '{}'.", other.type_name()),
                line,
            )),
        }
    }

    /// Call a user function: parameters bound in a fresh scope spliced onto
    /// the captured environment, `this` bound first for methods
    fn call_function(
        &mut self,
        func: ObjRef,
        args: &[Value],
        receiver: Option<Value>,
        line: usize,
    ) -> InterpResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::stack_overflow(line));
        }
        let (body, captured, name) = {
            let f = self.heap.func(func);
            (Rc::clone(&f.body), f.env, f.name.clone())
        };
        if body.params.len() != args.len() {
            return Err(RuntimeError::arity_mismatch(
                &name,
                body.params.len(),
                args.len(),
                line,
            ));
        }

        let call_scope = self.heap.push_scope_at(captured);
        if let Some(this) = receiver {
            self.heap.define(call_scope, "this", this);
        }
        for (param, arg) in body.params.iter().zip(args) {
            self.heap.define(call_scope, param, arg.clone());
        }

        self.depth += 1;
        let flow = self.exec_block_in(&body.children[0], call_scope);
        self.depth -= 1;
        self.heap.pop_scope(call_scope);

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Void),
            Flow::Break => Err(RuntimeError::stray_control("break", line)),
            Flow::Continue => Err(RuntimeError::stray_control("continue", line)),
        }
    }

    fn eval_new(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Value> {
        let call_node = &node.children[0];
        let (class_expr, arg_nodes): (&Node, &[Node]) = if call_node.kind == NodeKind::FuncCall {
            (&call_node.children[0], &call_node.children[1..])
        } else {
            (call_node, &[])
        };

        let class_ref = match self.eval(class_expr, scope)? {
            Value::Class(r) => r,
            other => {
                return Err(RuntimeError::type_error(
                    format!("Cannot instantiate non-class type '{}'.", other.type_name()),
                    node.line,
                ));
            }
        };

        self.heap.push_root(Value::Class(class_ref));
        let mut fields = HashMap::new();
        for field in &self.heap.class(class_ref).fields {
            fields.insert(field.clone(), Value::Void);
        }
        let instance = self.heap.alloc(Obj::Instance(InstanceObj {
            class: class_ref,
            fields,
        }));
        let instance_val = Value::Instance(instance);
        self.heap.push_root(instance_val.clone());
        let mut rooted = 2;

        let init = self.heap.class(class_ref).methods.get("init").cloned();
        let result = match init {
            Some(Value::Func(init_ref)) => {
                let mut args = Vec::with_capacity(arg_nodes.len());
                let mut failure = None;
                for arg_node in arg_nodes {
                    match self.eval(arg_node, scope) {
                        Ok(value) => {
                            self.heap.push_root(value.clone());
                            rooted += 1;
                            args.push(value);
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                match failure {
                    Some(err) => Err(err),
                    None => self
                        .call_function(init_ref, &args, Some(instance_val.clone()), node.line)
                        .map(|_| instance_val.clone()),
                }
            }
            _ => Ok(instance_val.clone()),
        };
        self.heap.pop_roots(rooted);
        result
    }

    fn eval_field_access(&mut self, node: &Node, scope: EnvHandle) -> InterpResult<Value> {
        let object = self.eval(&node.children[0], scope)?;
        let name = node.text();
        match &object {
            Value::Instance(r) => {
                let r = *r;
                // a field holding void is treated as absent
                let field = self.heap.instance(r).fields.get(name).cloned();
                if let Some(value) = field {
                    if value != Value::Void {
                        return Ok(value);
                    }
                }
                let class_ref = self.heap.instance(r).class;
                let method = self.heap.class(class_ref).methods.get(name).cloned();
                match method {
                    Some(method) => self.make_bound(object.clone(), method),
                    None => Err(RuntimeError::undefined_field(
                        object.type_name(),
                        name,
                        node.line,
                    )),
                }
            }
            Value::Module(r) => Ok(self
                .heap
                .module(*r)
                .members
                .get(name)
                .cloned()
                .unwrap_or(Value::Void)),
            Value::Str(_) => match self.string_methods.get(name).copied() {
                Some(func) => self.make_bound(object.clone(), Value::Native(func)),
                None => Err(RuntimeError::undefined_field(
                    object.type_name(),
                    name,
                    node.line,
                )),
            },
            Value::List(_) => match self.list_methods.get(name).copied() {
                Some(func) => self.make_bound(object.clone(), Value::Native(func)),
                None => Err(RuntimeError::undefined_field(
                    object.type_name(),
                    name,
                    node.line,
                )),
            },
            other => Err(RuntimeError::undefined_field(
                other.type_name(),
                name,
                node.line,
            )),
        }
    }

    fn make_bound(&mut self, receiver: Value, method: Value) -> InterpResult<Value> {
        self.heap.push_root(receiver.clone());
        let bound = self
            .heap
            .alloc(Obj::BoundMethod(BoundMethodObj { receiver, method }));
        self.heap.pop_root();
        Ok(Value::BoundMethod(bound))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a prefix operator
fn unary_op(op: &str, operand: &Value, line: usize) -> InterpResult<Value> {
    match (op, operand) {
        ("-", Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        ("-", Value::Float(x)) => Ok(Value::Float(-x)),
        ("-", _) => Err(RuntimeError::type_error(
            "Operand for unary '-' must be a number.",
            line,
        )),
        ("!", Value::Bool(b)) => Ok(Value::Bool(!b)),
        ("!", _) => Err(RuntimeError::type_error(
            "Operand for '!' must be a boolean.",
            line,
        )),
        _ => Err(RuntimeError::type_error(
            format!("Unknown unary operator '{op}'."),
            line,
        )),
    }
}

/// Apply a binary operator.
///
/// Two ints stay in int arithmetic; any int/float mix promotes to float;
/// `+`/`==`/`!=` work on string pairs; `and`/`or` on bool pairs. Every
/// other combination is a type error.
fn binary_op(op: &str, left: &Value, right: &Value, line: usize) -> InterpResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                "+" => Ok(Value::Int(a.wrapping_add(b))),
                "-" => Ok(Value::Int(a.wrapping_sub(b))),
                "*" => Ok(Value::Int(a.wrapping_mul(b))),
                "/" => {
                    if b == 0 {
                        Err(RuntimeError::division_by_zero(line))
                    } else {
                        Ok(Value::Int(a.wrapping_div(b)))
                    }
                }
                "%" => {
                    if b == 0 {
                        Err(RuntimeError::division_by_zero(line))
                    } else {
                        Ok(Value::Int(a.wrapping_rem(b)))
                    }
                }
                "^" => Ok(Value::Int((a as f64).powf(b as f64) as i32)),
                "<" => Ok(Value::Bool(a < b)),
                ">" => Ok(Value::Bool(a > b)),
                "<=" => Ok(Value::Bool(a <= b)),
                ">=" => Ok(Value::Bool(a >= b)),
                "==" => Ok(Value::Bool(a == b)),
                "!=" => Ok(Value::Bool(a != b)),
                _ => Err(unsupported(op, left, right, line)),
            }
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = match left {
                Value::Int(n) => *n as f64,
                Value::Float(x) => *x,
                _ => unreachable!(),
            };
            let b = match right {
                Value::Int(n) => *n as f64,
                Value::Float(x) => *x,
                _ => unreachable!(),
            };
            match op {
                "+" => Ok(Value::Float(a + b)),
                "-" => Ok(Value::Float(a - b)),
                "*" => Ok(Value::Float(a * b)),
                "/" => Ok(Value::Float(a / b)),
                "^" => Ok(Value::Float(a.powf(b))),
                "<" => Ok(Value::Bool(a < b)),
                ">" => Ok(Value::Bool(a > b)),
                "<=" => Ok(Value::Bool(a <= b)),
                ">=" => Ok(Value::Bool(a >= b)),
                "==" => Ok(Value::Bool(a == b)),
                "!=" => Ok(Value::Bool(a != b)),
                _ => Err(unsupported(op, left, right, line)),
            }
        }
        (Value::Str(a), Value::Str(b)) => match op {
            "+" => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Ok(Value::string(joined))
            }
            "==" => Ok(Value::Bool(a == b)),
            "!=" => Ok(Value::Bool(a != b)),
            _ => Err(unsupported(op, left, right, line)),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            "and" => Ok(Value::Bool(*a && *b)),
            "or" => Ok(Value::Bool(*a || *b)),
            _ => Err(unsupported(op, left, right, line)),
        },
        _ => Err(unsupported(op, left, right, line)),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value, line: usize) -> RuntimeError {
    RuntimeError::type_error(
        format!(
            "Unsupported operand types for '{}': '{}' and '{}'.",
            op,
            left.type_name(),
            right.type_name()
        ),
        line,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> String {
        let buf = SharedBuf::default();
        let mut interp = Interpreter::with_output(Box::new(buf.clone()));
        let tokens = tokenize(source).unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap();
        let bytes = buf.0.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn run_err(source: &str) -> RuntimeError {
        let mut interp = Interpreter::with_output(Box::new(Vec::new()));
        let tokens = tokenize(source).unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap_err()
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(binary_op("+", &Value::Int(2), &Value::Int(3), 0).unwrap(), Value::Int(5));
        assert_eq!(binary_op("%", &Value::Int(10), &Value::Int(3), 0).unwrap(), Value::Int(1));
        assert_eq!(binary_op("/", &Value::Int(7), &Value::Int(2), 0).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_division_by_zero_detected() {
        let err = binary_op("/", &Value::Int(1), &Value::Int(0), 4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let err = binary_op("%", &Value::Int(1), &Value::Int(0), 4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_float() {
        assert_eq!(
            binary_op("+", &Value::Int(1), &Value::Float(0.5), 0).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            binary_op("*", &Value::Float(2.0), &Value::Float(3.0), 0).unwrap(),
            Value::Float(6.0)
        );
    }

    #[test]
    fn test_int_power_is_int() {
        assert_eq!(binary_op("^", &Value::Int(2), &Value::Int(10), 0).unwrap(), Value::Int(1024));
    }

    #[test]
    fn test_string_concat_and_compare() {
        let a = Value::string("foo");
        let b = Value::string("bar");
        assert_eq!(binary_op("+", &a, &b, 0).unwrap(), Value::string("foobar"));
        assert_eq!(binary_op("==", &a, &a, 0).unwrap(), Value::Bool(true));
        assert_eq!(binary_op("!=", &a, &b, 0).unwrap(), Value::Bool(true));
        assert!(binary_op("<", &a, &b, 0).is_err());
    }

    #[test]
    fn test_bool_logic() {
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(binary_op("and", &t, &f, 0).unwrap(), Value::Bool(false));
        assert_eq!(binary_op("or", &t, &f, 0).unwrap(), Value::Bool(true));
        assert!(binary_op("+", &t, &f, 0).is_err());
    }

    #[test]
    fn test_mismatched_operands_error() {
        let err = binary_op("+", &Value::Int(1), &Value::string("a"), 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert!(err.message.contains("'int'"));
        assert!(err.message.contains("'string'"));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(unary_op("-", &Value::Int(3), 0).unwrap(), Value::Int(-3));
        assert_eq!(unary_op("-", &Value::Float(1.5), 0).unwrap(), Value::Float(-1.5));
        assert_eq!(unary_op("!", &Value::Bool(true), 0).unwrap(), Value::Bool(false));
        assert!(unary_op("-", &Value::Bool(true), 0).is_err());
        assert!(unary_op("!", &Value::Int(1), 0).is_err());
    }

    #[test]
    fn test_print_joins_with_spaces() {
        assert_eq!(run("print(1, 2, \"three\")\n"), "1 2 three\n");
    }

    #[test]
    fn test_declaration_and_assignment() {
        assert_eq!(run("int x = 1\nx = x + 4\nprint(x)\n"), "5\n");
    }

    #[test]
    fn test_undefined_variable_reference() {
        let err = run_err("print(missing)\n");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_assignment_to_undefined_variable() {
        let err = run_err("x = 1\n");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_block_scope_declarations_vanish() {
        let err = run_err("if true:\n    int y = 1\nprint(y)\n");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_assignment_reaches_outer_scope() {
        assert_eq!(run("int x = 1\nif true:\n    x = 2\nprint(x)\n"), "2\n");
    }

    #[test]
    fn test_foreach_binding_remains_after_loop() {
        assert_eq!(
            run("foreach (int v in [1, 2, 3]):\n    pass\nprint(v)\n"),
            "3\n"
        );
    }

    #[test]
    fn test_for_variable_is_loop_scoped() {
        let err = run_err("for (int i = 0; i < 2; i = i + 1):\n    pass\nprint(i)\n");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_while_break_and_continue() {
        let out = run(
            "int i = 0\nint total = 0\nwhile i < 10:\n    i = i + 1\n    if i % 2 == 0:\n        continue\n    if i > 6:\n        break\n    total = total + i\nprint(total)\n",
        );
        // odd numbers 1 + 3 + 5
        assert_eq!(out, "9\n");
    }

    #[test]
    fn test_do_while_runs_at_least_once() {
        assert_eq!(run("do:\n    print(\"once\")\nwhile (false)\n"), "once\n");
    }

    #[test]
    fn test_function_call_and_return() {
        assert_eq!(
            run("define int double(int n):\n    return n * 2\nprint(double(21))\n"),
            "42\n"
        );
    }

    #[test]
    fn test_function_falls_off_end_returns_void() {
        assert_eq!(run("define f():\n    pass\nprint(f())\n"), "void\n");
    }

    #[test]
    fn test_arity_mismatch() {
        let err = run_err("define f(a, b):\n    return a\nf(1)\n");
        assert_eq!(err.kind, ErrorKind::ArityMismatch);
    }

    #[test]
    fn test_calling_non_callable() {
        let err = run_err("int x = 3\nx(1)\n");
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert!(err.message.contains("not callable"));
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            run("define int fact(int n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nprint(fact(10))\n"),
            "3628800\n"
        );
    }

    #[test]
    fn test_recursion_limit() {
        let err = run_err("define f(n):\n    return f(n + 1)\nf(0)\n");
        assert_eq!(err.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn test_closure_captures_definition_scope() {
        let out = run(
            "define make_adder(int n):\n    define int add(int x):\n        return x + n\n    return add\nint f = make_adder(10)\nprint(f(5))\n",
        );
        assert_eq!(out, "15\n");
    }

    #[test]
    fn test_closure_ignores_caller_scope() {
        let out = run(
            "int n = 100\ndefine make():\n    int k = 7\n    define get():\n        return k\n    return get\nint g = make()\nint k = 1\nprint(g())\n",
        );
        assert_eq!(out, "7\n");
    }

    #[test]
    fn test_switch_fall_through_until_break() {
        let src = "int x = 1\nswitch(x):\n    case 1:\n        print(\"a\")\n    case 2:\n        print(\"b\")\n        break\n    default:\n        print(\"c\")\n";
        assert_eq!(run(src), "a\nb\n");
    }

    #[test]
    fn test_switch_default_only_without_match() {
        let src = "int x = 9\nswitch(x):\n    case 1:\n        print(\"a\")\n    default:\n        print(\"d\")\n";
        assert_eq!(run(src), "d\n");
    }

    #[test]
    fn test_switch_on_strings() {
        let src = "string s = \"b\"\nswitch(s):\n    case \"a\":\n        print(1)\n        break\n    case \"b\":\n        print(2)\n        break\n";
        assert_eq!(run(src), "2\n");
    }

    #[test]
    fn test_class_fields_and_methods() {
        let src = "class Point:\n    int x\n    int y\n    define init(a, b):\n        this.x = a\n        this.y = b\n    define int sum():\n        return this.x + this.y\nPoint p = new Point(3, 4)\nprint(p.sum())\n";
        assert_eq!(run(src), "7\n");
    }

    #[test]
    fn test_field_access_on_missing_member() {
        let err = run_err("class A:\n    pass\nA a = new A()\nprint(a.nope)\n");
        assert_eq!(err.kind, ErrorKind::UndefinedField);
    }

    #[test]
    fn test_new_on_non_class() {
        let err = run_err("int x = 1\nnew x()\n");
        assert!(err.message.contains("non-class"));
    }

    #[test]
    fn test_inheritance_overrides() {
        let src = "class A:\n    define string speak():\n        return \"A\"\nclass B extends A:\n    define string speak():\n        return \"B\"\nA a = new A()\nB b = new B()\nprint(a.speak(), b.speak())\n";
        assert_eq!(run(src), "A B\n");
    }

    #[test]
    fn test_inherited_method_dispatch() {
        let src = "class A:\n    define int base():\n        return 10\nclass B extends A:\n    pass\nB b = new B()\nprint(b.base())\n";
        assert_eq!(run(src), "10\n");
    }

    #[test]
    fn test_extends_undefined_parent() {
        let err = run_err("class B extends Missing:\n    pass\n");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_string_method_on_literal() {
        assert_eq!(run("print(\"  hi  \".trim())\n"), "hi\n");
    }

    #[test]
    fn test_list_index_and_assignment() {
        assert_eq!(run("list<int> xs = [1, 2, 3]\nxs[1] = 9\nprint(xs[1])\n"), "9\n");
    }

    #[test]
    fn test_index_errors() {
        assert_eq!(run_err("[1, 2][5]\n").kind, ErrorKind::IndexOutOfBounds);
        assert_eq!(run_err("[1, 2][-1]\n").kind, ErrorKind::IndexOutOfBounds);
        assert_eq!(run_err("[1, 2][1.0]\n").kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_map_literal_and_index() {
        assert_eq!(run("map<string,int> m = {\"a\": 1}\nprint(m[\"a\"])\n"), "1\n");
    }

    #[test]
    fn test_missing_map_key_reads_void() {
        assert_eq!(run("map<string,int> m = {}\nprint(m[\"zz\"])\n"), "void\n");
    }

    #[test]
    fn test_typed_map_rejects_bad_insert() {
        let err = run_err("map<string,int> m = {}\nm[\"a\"] = \"oops\"\n");
        assert!(err.message.contains("Type mismatch"));
    }

    #[test]
    fn test_fixed_array_keeps_length() {
        let src = "int[3] xs\nxs[0] = 1\nxs[2] = 3\nprint(xs.len())\n";
        assert_eq!(run(src), "3\n");
    }

    #[test]
    fn test_fixed_array_append_fails() {
        let err = run_err("int[2] xs\nxs.append(5)\n");
        assert!(err.message.contains("fixed-size"));
    }

    #[test]
    fn test_user_typed_declaration_without_initializer_is_void() {
        assert_eq!(run("class A:\n    pass\nA a\nprint(a)\n"), "void\n");
    }

    #[test]
    fn test_and_or_require_bools() {
        let err = run_err("print(1 and 2)\n");
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_both_operands_of_and_evaluate() {
        // no short-circuit: the second operand's side effect always runs
        let src = "int calls = 0\ndefine bool tick():\n    calls = calls + 1\n    return true\nbool r = false and tick()\nprint(calls)\n";
        assert_eq!(run(src), "1\n");
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        let err = run_err("break\n");
        assert_eq!(err.kind, ErrorKind::ControlFlow);
    }

    #[test]
    fn test_module_import_with_injected_loader() {
        struct FakeLoader;
        impl SourceLoader for FakeLoader {
            fn load(&self, name: &str) -> Option<String> {
                if name == "helpers" {
                    Some("define int triple(int n):\n    return n * 3\n".to_string())
                } else {
                    None
                }
            }
        }
        let buf = SharedBuf::default();
        let mut interp = Interpreter::with_output(Box::new(buf.clone()));
        interp.set_loader(Box::new(FakeLoader));
        let tokens = tokenize("import \"helpers\"\nprint(helpers.triple(7))\n").unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap();
        assert_eq!(String::from_utf8(buf.0.borrow().clone()).unwrap(), "21\n");
    }

    #[test]
    fn test_native_module_import() {
        assert_eq!(run("import \"math\"\nprint(math.sqrt(9))\n"), "3\n");
    }

    #[test]
    fn test_module_script_shadows_native() {
        struct ShadowLoader;
        impl SourceLoader for ShadowLoader {
            fn load(&self, name: &str) -> Option<String> {
                if name == "math" {
                    Some("define int sqrt(int n):\n    return 0 - n\n".to_string())
                } else {
                    None
                }
            }
        }
        let buf = SharedBuf::default();
        let mut interp = Interpreter::with_output(Box::new(buf.clone()));
        interp.set_loader(Box::new(ShadowLoader));
        let tokens = tokenize("import \"math\"\nprint(math.sqrt(4))\n").unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap();
        assert_eq!(String::from_utf8(buf.0.borrow().clone()).unwrap(), "-4\n");
    }

    #[test]
    fn test_module_members_read_as_void_when_missing() {
        assert_eq!(run("import \"math\"\nprint(math.nonsense)\n"), "void\n");
    }

    #[test]
    fn test_gc_survives_heavy_allocation() {
        let src = "list<int> keep = []\nfor (int i = 0; i < 2000; i = i + 1):\n    list<int> tmp = [i, i, i]\n    keep = tmp\nprint(keep[0])\n";
        assert_eq!(run(src), "1999\n");
    }

    #[test]
    fn test_collection_reclaims_loop_garbage() {
        let buf = SharedBuf::default();
        let mut interp = Interpreter::with_output(Box::new(buf.clone()));
        let src = "for (int i = 0; i < 5000; i = i + 1):\n    list<int> tmp = [i]\nprint(\"done\")\n";
        let tokens = tokenize(src).unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap();
        interp.collect_garbage();
        // only the globals and natives survive, far below one object per loop
        assert!(interp.heap().object_count() < 100);
        assert_eq!(String::from_utf8(buf.0.borrow().clone()).unwrap(), "done\n");
    }

    #[test]
    fn test_elif_chain() {
        let src = "int x = 2\nif x == 1:\n    print(\"one\")\nelif x == 2:\n    print(\"two\")\nelif x == 3:\n    print(\"three\")\nelse:\n    print(\"other\")\n";
        assert_eq!(run(src), "two\n");
    }

    #[test]
    fn test_instance_field_assignment_outside_init() {
        let src = "class Box:\n    int v\nBox b = new Box()\nb.v = 11\nprint(b.v)\n";
        assert_eq!(run(src), "11\n");
    }

    #[test]
    fn test_declared_list_carries_element_kind() {
        let mut interp = Interpreter::with_output(Box::new(Vec::new()));
        let tokens = tokenize("list<int> xs = [1, 2, 3]\n").unwrap();
        let program = parse(&tokens).unwrap();
        interp.interpret(&program).unwrap();

        let global = interp.heap.global_scope();
        let list = match interp.heap.lookup(global, "xs") {
            Some(Value::List(r)) => r,
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(interp.heap.list(list).items.len(), 3);
        assert_eq!(interp.heap.list(list).elem_type, TypeTag::Int);
        assert!(!interp.heap.list(list).fixed);
        assert_eq!(interp.heap.root_depth(), 0);
    }

    #[test]
    fn test_method_called_through_variable() {
        let src = "list<int> xs = []\nxs.append(1)\nxs.append(2)\nprint(xs.len(), xs)\n";
        assert_eq!(run(src), "2 [1, 2]\n");
    }
}
