//! The bytecode interpreter
//!
//! One `invoke` call executes one method in a fresh frame: an operand
//! stack and a local-variable table sized from the Code attribute. Nested
//! invocations recurse through `invoke`; there is no separate call stack.
//!
//! Exceptions raised by interpreted code travel as `Unwind::Throw` values
//! and are matched against the method's catch-block table at the faulting
//! instruction address. A throw no handler matches leaves the frame as
//! `Error::UncaughtException`; a calling frame turns that back into a
//! throw and dispatches it through its own table.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::classfile::class::JvmClass;
use crate::classfile::descriptor::{parse_method_descriptor, slot_width};
use crate::classfile::field::default_value_for;
use crate::classfile::method::JvmMethod;
use crate::error::{Error, Result};
use crate::runtime::object::JvmObject;
use crate::runtime::opcodes;
use crate::runtime::provider::{ClassHandle, Provider};
use crate::runtime::value::{
    fault_classes, fault_is_instance_of, JvmArray, Value, VmFault,
};

const OBJECT_CLASS_NAME: &str = "java/lang/Object";
const STRING_CLASS_NAME: &str = "java/lang/String";
const THROWABLE_CLASS_NAME: &str = "java/lang/Throwable";
const VOID_RETURN: &str = "V";

/// Non-local exit of a single instruction: either an exception thrown by
/// interpreted code, or a host-level failure that aborts interpretation.
enum Unwind {
    Throw(Value),
    Fail(Error),
}

impl From<Error> for Unwind {
    fn from(error: Error) -> Self {
        Unwind::Fail(error)
    }
}

type Flow<T> = std::result::Result<T, Unwind>;

/// Outcome of one executed instruction
enum Step {
    Next,
    Return(Option<Value>),
}

/// Raise a runtime fault as a thrown value
fn fault(class_name: &'static str, message: impl Into<String>) -> Unwind {
    Unwind::Throw(Value::Fault(VmFault::new(class_name, message)))
}

/// Execute a method. `receiver` fills local slot 0 for instance methods;
/// `stack` and `locals` may carry reusable scratch buffers (`None`
/// allocates fresh ones). Methods without bytecode are delegated to the
/// provider. Returns the method's result, `None` for void.
pub fn invoke(
    provider: &dyn Provider,
    class: &Arc<JvmClass>,
    receiver: Option<Value>,
    method: &JvmMethod,
    args: &[Value],
    stack: Option<&mut Vec<Value>>,
    locals: Option<&mut Vec<Value>>,
) -> Result<Option<Value>> {
    if !method.has_code() {
        return provider.invoke_native(
            class.class_name(),
            receiver.as_ref(),
            method.name(),
            method.signature(),
            args,
        );
    }

    let (arg_types, _) = parse_method_descriptor(method.signature())?;
    if arg_types.len() != args.len() {
        return Err(frame_error(
            class,
            method,
            0,
            format!("expected {} arguments, got {}", arg_types.len(), args.len()),
        ));
    }

    let mut owned_stack = Vec::new();
    let stack = match stack {
        Some(buffer) => {
            buffer.clear();
            buffer
        }
        None => {
            owned_stack.reserve(method.max_stack() as usize);
            &mut owned_stack
        }
    };
    let mut owned_locals = Vec::new();
    let locals = match locals {
        Some(buffer) => {
            buffer.clear();
            buffer
        }
        None => &mut owned_locals,
    };
    locals.resize(method.max_locals() as usize, Value::Null);

    let mut slot = 0usize;
    if !method.is_static() {
        let receiver = receiver.ok_or_else(|| {
            frame_error(class, method, 0, "instance method invoked without a receiver")
        })?;
        if locals.is_empty() {
            return Err(frame_error(class, method, 0, "max_locals too small for the receiver"));
        }
        locals[0] = receiver;
        slot = 1;
    }
    for (arg_type, value) in arg_types.iter().zip(args) {
        if slot >= locals.len() {
            return Err(frame_error(class, method, 0, "max_locals too small for the arguments"));
        }
        locals[slot] = value.clone();
        slot += slot_width(arg_type);
    }

    let mut frame = Frame {
        provider,
        class,
        method,
        stack,
        locals,
        pc: 0,
        insn_pc: 0,
    };

    loop {
        frame.insn_pc = frame.pc;
        match step(&mut frame) {
            Ok(Step::Next) => {}
            Ok(Step::Return(value)) => return Ok(value),
            Err(Unwind::Fail(error)) => return Err(error),
            Err(Unwind::Throw(value)) => {
                let mut handler = None;
                for block in method.catch_blocks() {
                    if !block.is_active_for_address(frame.insn_pc) {
                        continue;
                    }
                    if thrown_matches(provider, &value, block.catch_type())? {
                        handler = Some(block.handler_pc() as usize);
                        break;
                    }
                }
                match handler {
                    Some(handler_pc) => {
                        frame.stack.clear();
                        frame.stack.push(value);
                        frame.pc = handler_pc;
                    }
                    None => {
                        return Err(Error::UncaughtException {
                            class: value_class_name(&value),
                            method: format!(
                                "{}.{}{}",
                                class.class_name(),
                                method.name(),
                                method.signature()
                            ),
                            value,
                        });
                    }
                }
            }
        }
    }
}

fn frame_error(
    class: &JvmClass,
    method: &JvmMethod,
    pc: usize,
    message: impl Into<String>,
) -> Error {
    Error::Execution {
        class: class.class_name().to_string(),
        name: method.name().to_string(),
        signature: method.signature().to_string(),
        pc,
        message: message.into(),
    }
}

/// Class name a thrown or cast value presents to handler matching
fn value_class_name(value: &Value) -> String {
    match value {
        Value::Fault(raised) => raised.class_name.to_string(),
        Value::Object(object) => object.class().class_name().to_string(),
        Value::Str(_) => STRING_CLASS_NAME.to_string(),
        other => other.type_name().to_string(),
    }
}

/// True when a handler for `catch_type` may receive the thrown value;
/// `None` is the catch-all entry
fn thrown_matches(provider: &dyn Provider, value: &Value, catch_type: Option<&str>) -> Result<bool> {
    match catch_type {
        None => Ok(true),
        // everything thrown is a throwable, even when the value's
        // superclass chain leaves the loaded set before reaching it
        Some(THROWABLE_CLASS_NAME) => Ok(true),
        Some(target) => value_instance_of(provider, value, target),
    }
}

/// The `instanceof` relation over runtime values. Object classes are
/// walked through superclasses and interfaces; once the chain leaves the
/// set of loaded classes it continues through the fixed fault hierarchy
/// by name.
fn value_instance_of(provider: &dyn Provider, value: &Value, target: &str) -> Result<bool> {
    if target == OBJECT_CLASS_NAME {
        return Ok(!value.is_null());
    }
    match value {
        Value::Fault(raised) => Ok(fault_is_instance_of(raised.class_name, target)),
        Value::Str(_) => Ok(target == STRING_CLASS_NAME),
        Value::Object(object) => class_is_instance_of(provider, object.class(), target),
        Value::Array(array) => Ok(array_descriptor(array.component()) == target),
        _ => Ok(false),
    }
}

/// Descriptor form of an array over the given component: primitive and
/// nested-array components are prefixed as-is, reference components are
/// wrapped in `L`..`;` unless already in descriptor form
fn array_descriptor(component: &str) -> String {
    let primitive = component.len() == 1 && "ZBCSIFJD".contains(component);
    let descriptor_form =
        component.starts_with('[') || (component.starts_with('L') && component.ends_with(';'));
    if primitive || descriptor_form {
        format!("[{}", component)
    } else {
        format!("[L{};", component)
    }
}

fn class_is_instance_of(
    provider: &dyn Provider,
    class: &Arc<JvmClass>,
    target: &str,
) -> Result<bool> {
    let mut current = Arc::clone(class);
    loop {
        if current.class_name() == target {
            return Ok(true);
        }
        for interface_name in current.interfaces() {
            if interface_name == target {
                return Ok(true);
            }
            if let Some(ClassHandle::Vm(interface)) = provider.resolve_class(interface_name)? {
                if class_is_instance_of(provider, &interface, target)? {
                    return Ok(true);
                }
            }
        }
        let super_name = match current.superclass_name()? {
            Some(name) => name,
            None => return Ok(false),
        };
        match provider.resolve_class(&super_name)? {
            Some(ClassHandle::Vm(superclass)) => current = superclass,
            _ => return Ok(fault_is_instance_of(&super_name, target)),
        }
    }
}

/// One frame: the executing method, its operand stack and locals, and the
/// program counter. `insn_pc` stays at the current instruction's address
/// while `pc` advances over operands; branch offsets and catch ranges are
/// relative to `insn_pc`.
struct Frame<'a> {
    provider: &'a dyn Provider,
    class: &'a Arc<JvmClass>,
    method: &'a JvmMethod,
    stack: &'a mut Vec<Value>,
    locals: &'a mut Vec<Value>,
    pc: usize,
    insn_pc: usize,
}

impl Frame<'_> {
    fn fail(&self, message: impl Into<String>) -> Unwind {
        Unwind::Fail(frame_error(self.class, self.method, self.insn_pc, message))
    }

    fn fetch_u8(&mut self) -> Flow<u8> {
        match self.method.code().get(self.pc) {
            Some(&byte) => {
                self.pc += 1;
                Ok(byte)
            }
            None => Err(self.fail("truncated instruction stream")),
        }
    }

    fn fetch_i8(&mut self) -> Flow<i8> {
        Ok(self.fetch_u8()? as i8)
    }

    fn fetch_u16(&mut self) -> Flow<u16> {
        let high = self.fetch_u8()? as u16;
        let low = self.fetch_u8()? as u16;
        Ok(high << 8 | low)
    }

    fn fetch_i16(&mut self) -> Flow<i16> {
        Ok(self.fetch_u16()? as i16)
    }

    fn fetch_i32(&mut self) -> Flow<i32> {
        let high = self.fetch_u16()? as u32;
        let low = self.fetch_u16()? as u32;
        Ok((high << 16 | low) as i32)
    }

    /// Round the pc up to the next 4-byte boundary (switch payload padding)
    fn align_pc(&mut self) {
        self.pc = (self.pc + 3) & !3;
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Flow<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.fail("operand stack underflow")),
        }
    }

    fn pop_int(&mut self) -> Flow<i32> {
        let value = self.pop()?;
        Ok(value.as_int()?)
    }

    fn pop_long(&mut self) -> Flow<i64> {
        let value = self.pop()?;
        Ok(value.as_long()?)
    }

    fn pop_float(&mut self) -> Flow<f32> {
        let value = self.pop()?;
        Ok(value.as_float()?)
    }

    fn pop_double(&mut self) -> Flow<f64> {
        let value = self.pop()?;
        Ok(value.as_double()?)
    }

    fn pop_object(&mut self, context: &str) -> Flow<Arc<JvmObject>> {
        match self.pop()? {
            Value::Null => Err(fault(
                fault_classes::NULL_POINTER,
                format!("null dereference at {}", context),
            )),
            Value::Object(object) => Ok(object),
            other => Err(Unwind::Fail(Error::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            })),
        }
    }

    fn pop_array(&mut self) -> Flow<Arc<JvmArray>> {
        match self.pop()? {
            Value::Null => Err(fault(fault_classes::NULL_POINTER, "array access on null")),
            Value::Array(array) => Ok(array),
            other => Err(Unwind::Fail(Error::TypeMismatch {
                expected: "array",
                found: other.type_name(),
            })),
        }
    }

    fn local(&self, index: usize) -> Flow<Value> {
        match self.locals.get(index) {
            Some(value) => Ok(value.clone()),
            None => Err(self.fail(format!("local slot {} out of range", index))),
        }
    }

    fn set_local(&mut self, index: usize, value: Value) -> Flow<()> {
        if index >= self.locals.len() {
            return Err(self.fail(format!("local slot {} out of range", index)));
        }
        self.locals[index] = value;
        Ok(())
    }

    /// Transfer control to `insn_pc + offset`
    fn jump(&mut self, offset: i64) -> Flow<()> {
        let target = self.insn_pc as i64 + offset;
        if target < 0 || target as usize >= self.method.code().len() {
            return Err(self.fail(format!("branch target {} out of range", target)));
        }
        self.pc = target as usize;
        Ok(())
    }
}

/// Resolve a symbolically referenced class. A class may reference itself
/// while its own static initializer runs, before it is registered with
/// the provider.
fn resolve_named(frame: &Frame, name: &str) -> Flow<Option<ClassHandle>> {
    if name == frame.class.class_name() {
        return Ok(Some(ClassHandle::Vm(Arc::clone(frame.class))));
    }
    Ok(frame.provider.resolve_class(name)?)
}

/// Call a resolved method: interpreted when it has bytecode, delegated to
/// the provider otherwise. An uncaught exception from the callee becomes
/// a throw in the calling frame.
fn call_vm_or_native(
    provider: &dyn Provider,
    start: &Arc<JvmClass>,
    owner_name: &str,
    method_name: &str,
    signature: &str,
    receiver: Option<Value>,
    args: &[Value],
) -> Flow<Option<Value>> {
    match start.find_method_with_owner(method_name, signature, provider)? {
        Some((declaring, method)) if method.has_code() => {
            match invoke(provider, &declaring, receiver, &method, args, None, None) {
                Ok(value) => Ok(value),
                Err(Error::UncaughtException { value, .. }) => Err(Unwind::Throw(value)),
                Err(error) => Err(Unwind::Fail(error)),
            }
        }
        Some((declaring, _)) => Ok(provider.invoke_native(
            declaring.class_name(),
            receiver.as_ref(),
            method_name,
            signature,
            args,
        )?),
        None => Ok(provider.invoke_native(
            owner_name,
            receiver.as_ref(),
            method_name,
            signature,
            args,
        )?),
    }
}

/// invokevirtual / invokespecial / invokestatic / invokeinterface
fn invoke_symbolic(frame: &mut Frame, opcode: u8) -> Flow<()> {
    let index = frame.fetch_u16()?;
    if opcode == opcodes::INVOKEINTERFACE {
        // historical count and zero operand bytes
        frame.fetch_u16()?;
    }

    let pool = frame.class.constant_pool();
    let owner_name = pool.class_name_at(index)?;
    let method_name = pool.name_at(index)?;
    let signature = pool.signature_at(index)?;
    let (arg_types, return_type) = parse_method_descriptor(&signature)?;

    let mut args = Vec::with_capacity(arg_types.len());
    for _ in 0..arg_types.len() {
        args.push(frame.pop()?);
    }
    args.reverse();

    let receiver = if opcode == opcodes::INVOKESTATIC {
        None
    } else {
        let receiver = frame.pop()?;
        if receiver.is_null() {
            return Err(fault(
                fault_classes::NULL_POINTER,
                format!("invoke of {} on null", method_name),
            ));
        }
        Some(receiver)
    };

    let dynamic = matches!(opcode, opcodes::INVOKEVIRTUAL | opcodes::INVOKEINTERFACE);
    let result = match &receiver {
        // dynamic dispatch starts at the receiver's runtime class
        Some(Value::Object(object)) if dynamic => call_vm_or_native(
            frame.provider,
            object.class(),
            &owner_name,
            &method_name,
            &signature,
            receiver.clone(),
            &args,
        )?,
        None | Some(Value::Object(_)) => match resolve_named(frame, &owner_name)? {
            Some(ClassHandle::Vm(class)) => call_vm_or_native(
                frame.provider,
                &class,
                &owner_name,
                &method_name,
                &signature,
                receiver.clone(),
                &args,
            )?,
            _ => frame.provider.invoke_native(
                &owner_name,
                receiver.as_ref(),
                &method_name,
                &signature,
                &args,
            )?,
        },
        // strings, arrays and host values execute on the provider side
        Some(_) => frame.provider.invoke_native(
            &owner_name,
            receiver.as_ref(),
            &method_name,
            &signature,
            &args,
        )?,
    };

    if return_type != VOID_RETURN {
        frame.push(result.unwrap_or(Value::Null));
    }
    Ok(())
}

/// Push the loadable constant at a pool index (ldc family)
fn push_constant(frame: &mut Frame, index: u16) -> Flow<()> {
    use crate::classfile::constpool::Constant;

    let pool = frame.class.constant_pool();
    let value = match pool.get(index)? {
        Constant::Integer(v) => Value::Int(*v),
        Constant::Float(v) => Value::Float(*v),
        Constant::Long(v) => Value::Long(*v),
        Constant::Double(v) => Value::Double(*v),
        Constant::StringRef(_) | Constant::Utf8(_) | Constant::Unicode(_) => {
            Value::string(pool.as_string(index)?)
        }
        Constant::ClassRef(_) => {
            return Err(frame.fail("class literal constants are not supported"))
        }
        other => {
            return Err(frame.fail(format!("constant kind {} is not loadable", other.kind_name())))
        }
    };
    frame.push(value);
    Ok(())
}

fn compare_longs(a: i64, b: i64) -> i32 {
    match a.cmp(&b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// fcmpl/fcmpg result; `nan_result` distinguishes the two variants
fn compare_floats(a: f32, b: f32, nan_result: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan_result,
    }
}

fn compare_doubles(a: f64, b: f64, nan_result: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan_result,
    }
}

/// Build a (possibly nested) array for multianewarray. `descriptor` is the
/// array type at the current dimension; one leading `[` is stripped per
/// level.
fn build_multi_array(descriptor: &str, counts: &[i32]) -> Result<Value> {
    let element = descriptor.strip_prefix('[').unwrap_or(descriptor);
    let length = counts[0] as usize;
    if counts.len() == 1 {
        let fill = if element.len() == 1 {
            default_value_for(element)?
        } else {
            Value::Null
        };
        return Ok(Value::Array(JvmArray::new(element, length, fill)));
    }
    let array = JvmArray::new(element, length, Value::Null);
    for index in 0..length {
        array.set(index, build_multi_array(element, &counts[1..])?);
    }
    Ok(Value::Array(array))
}

/// Execute the instruction at the current pc
fn step(frame: &mut Frame) -> Flow<Step> {
    let opcode = frame.fetch_u8()?;
    match opcode {
        opcodes::NOP => {}
        opcodes::ACONST_NULL => frame.push(Value::Null),
        opcodes::ICONST_M1..=opcodes::ICONST_5 => {
            frame.push(Value::Int(opcode as i32 - opcodes::ICONST_0 as i32));
        }
        opcodes::LCONST_0..=opcodes::LCONST_1 => {
            frame.push(Value::Long((opcode - opcodes::LCONST_0) as i64));
        }
        opcodes::FCONST_0..=opcodes::FCONST_2 => {
            frame.push(Value::Float((opcode - opcodes::FCONST_0) as f32));
        }
        opcodes::DCONST_0..=opcodes::DCONST_1 => {
            frame.push(Value::Double((opcode - opcodes::DCONST_0) as f64));
        }
        opcodes::BIPUSH => {
            let value = frame.fetch_i8()? as i32;
            frame.push(Value::Int(value));
        }
        opcodes::SIPUSH => {
            let value = frame.fetch_i16()? as i32;
            frame.push(Value::Int(value));
        }
        opcodes::LDC => {
            let index = frame.fetch_u8()? as u16;
            push_constant(frame, index)?;
        }
        opcodes::LDC_W | opcodes::LDC2_W => {
            let index = frame.fetch_u16()?;
            push_constant(frame, index)?;
        }

        opcodes::ILOAD..=opcodes::ALOAD => {
            let index = frame.fetch_u8()? as usize;
            let value = frame.local(index)?;
            frame.push(value);
        }
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => {
            let value = frame.local(((opcode - opcodes::ILOAD_0) & 3) as usize)?;
            frame.push(value);
        }
        opcodes::IALOAD..=opcodes::SALOAD => {
            let index = frame.pop_int()?;
            let array = frame.pop_array()?;
            let length = array.len();
            let element = if index >= 0 { array.get(index as usize) } else { None };
            match element {
                Some(value) => frame.push(value),
                None => {
                    return Err(fault(
                        fault_classes::ARRAY_INDEX,
                        format!("index {} out of bounds for length {}", index, length),
                    ))
                }
            }
        }

        opcodes::ISTORE..=opcodes::ASTORE => {
            let index = frame.fetch_u8()? as usize;
            let value = frame.pop()?;
            frame.set_local(index, value)?;
        }
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => {
            let value = frame.pop()?;
            frame.set_local(((opcode - opcodes::ISTORE_0) & 3) as usize, value)?;
        }
        opcodes::IASTORE..=opcodes::SASTORE => {
            let value = frame.pop()?;
            let index = frame.pop_int()?;
            let array = frame.pop_array()?;
            let length = array.len();
            if index < 0 || !array.set(index as usize, value) {
                return Err(fault(
                    fault_classes::ARRAY_INDEX,
                    format!("index {} out of bounds for length {}", index, length),
                ));
            }
        }

        opcodes::POP => {
            frame.pop()?;
        }
        opcodes::POP2 => {
            let top = frame.pop()?;
            if top.category() == 1 {
                frame.pop()?;
            }
        }
        opcodes::DUP => {
            let top = frame.pop()?;
            frame.push(top.clone());
            frame.push(top);
        }
        opcodes::DUP_X1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.push(v1.clone());
            frame.push(v2);
            frame.push(v1);
        }
        opcodes::DUP_X2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            if v2.category() == 2 {
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            } else {
                let v3 = frame.pop()?;
                frame.push(v1.clone());
                frame.push(v3);
                frame.push(v2);
                frame.push(v1);
            }
        }
        opcodes::DUP2 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                frame.push(v1.clone());
                frame.push(v1);
            } else {
                let v2 = frame.pop()?;
                frame.push(v2.clone());
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            }
        }
        opcodes::DUP2_X1 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                let v2 = frame.pop()?;
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                frame.push(v2.clone());
                frame.push(v1.clone());
                frame.push(v3);
                frame.push(v2);
                frame.push(v1);
            }
        }
        opcodes::DUP2_X2 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                let v2 = frame.pop()?;
                if v2.category() == 2 {
                    frame.push(v1.clone());
                    frame.push(v2);
                    frame.push(v1);
                } else {
                    let v3 = frame.pop()?;
                    frame.push(v1.clone());
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                }
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                if v3.category() == 2 {
                    frame.push(v2.clone());
                    frame.push(v1.clone());
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                } else {
                    let v4 = frame.pop()?;
                    frame.push(v2.clone());
                    frame.push(v1.clone());
                    frame.push(v4);
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                }
            }
        }
        opcodes::SWAP => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.push(v1);
            frame.push(v2);
        }

        opcodes::IADD => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a.wrapping_add(b)));
        }
        opcodes::LADD => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a.wrapping_add(b)));
        }
        opcodes::FADD => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Float(a + b));
        }
        opcodes::DADD => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Double(a + b));
        }
        opcodes::ISUB => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a.wrapping_sub(b)));
        }
        opcodes::LSUB => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a.wrapping_sub(b)));
        }
        opcodes::FSUB => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Float(a - b));
        }
        opcodes::DSUB => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Double(a - b));
        }
        opcodes::IMUL => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a.wrapping_mul(b)));
        }
        opcodes::LMUL => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a.wrapping_mul(b)));
        }
        opcodes::FMUL => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Float(a * b));
        }
        opcodes::DMUL => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Double(a * b));
        }
        opcodes::IDIV => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            if b == 0 {
                return Err(fault(fault_classes::ARITHMETIC, "/ by zero"));
            }
            frame.push(Value::Int(a.wrapping_div(b)));
        }
        opcodes::LDIV => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            if b == 0 {
                return Err(fault(fault_classes::ARITHMETIC, "/ by zero"));
            }
            frame.push(Value::Long(a.wrapping_div(b)));
        }
        opcodes::FDIV => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Float(a / b));
        }
        opcodes::DDIV => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Double(a / b));
        }
        opcodes::IREM => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            if b == 0 {
                return Err(fault(fault_classes::ARITHMETIC, "/ by zero"));
            }
            frame.push(Value::Int(a.wrapping_rem(b)));
        }
        opcodes::LREM => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            if b == 0 {
                return Err(fault(fault_classes::ARITHMETIC, "/ by zero"));
            }
            frame.push(Value::Long(a.wrapping_rem(b)));
        }
        opcodes::FREM => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Float(a % b));
        }
        opcodes::DREM => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Double(a % b));
        }
        opcodes::INEG => {
            let a = frame.pop_int()?;
            frame.push(Value::Int(a.wrapping_neg()));
        }
        opcodes::LNEG => {
            let a = frame.pop_long()?;
            frame.push(Value::Long(a.wrapping_neg()));
        }
        opcodes::FNEG => {
            let a = frame.pop_float()?;
            frame.push(Value::Float(-a));
        }
        opcodes::DNEG => {
            let a = frame.pop_double()?;
            frame.push(Value::Double(-a));
        }
        opcodes::ISHL => {
            let shift = frame.pop_int()?;
            let value = frame.pop_int()?;
            frame.push(Value::Int(value.wrapping_shl((shift & 0x1f) as u32)));
        }
        opcodes::LSHL => {
            let shift = frame.pop_int()?;
            let value = frame.pop_long()?;
            frame.push(Value::Long(value.wrapping_shl((shift & 0x3f) as u32)));
        }
        opcodes::ISHR => {
            let shift = frame.pop_int()?;
            let value = frame.pop_int()?;
            frame.push(Value::Int(value.wrapping_shr((shift & 0x1f) as u32)));
        }
        opcodes::LSHR => {
            let shift = frame.pop_int()?;
            let value = frame.pop_long()?;
            frame.push(Value::Long(value.wrapping_shr((shift & 0x3f) as u32)));
        }
        opcodes::IUSHR => {
            let shift = frame.pop_int()?;
            let value = frame.pop_int()?;
            frame.push(Value::Int(((value as u32) >> ((shift & 0x1f) as u32)) as i32));
        }
        opcodes::LUSHR => {
            let shift = frame.pop_int()?;
            let value = frame.pop_long()?;
            frame.push(Value::Long(((value as u64) >> ((shift & 0x3f) as u32)) as i64));
        }
        opcodes::IAND => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a & b));
        }
        opcodes::LAND => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a & b));
        }
        opcodes::IOR => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a | b));
        }
        opcodes::LOR => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a | b));
        }
        opcodes::IXOR => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            frame.push(Value::Int(a ^ b));
        }
        opcodes::LXOR => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Long(a ^ b));
        }
        opcodes::IINC => {
            let index = frame.fetch_u8()? as usize;
            let delta = frame.fetch_i8()? as i32;
            let value = frame.local(index)?.as_int()?;
            frame.set_local(index, Value::Int(value.wrapping_add(delta)))?;
        }

        opcodes::I2L => {
            let a = frame.pop_int()?;
            frame.push(Value::Long(a as i64));
        }
        opcodes::I2F => {
            let a = frame.pop_int()?;
            frame.push(Value::Float(a as f32));
        }
        opcodes::I2D => {
            let a = frame.pop_int()?;
            frame.push(Value::Double(a as f64));
        }
        opcodes::L2I => {
            let a = frame.pop_long()?;
            frame.push(Value::Int(a as i32));
        }
        opcodes::L2F => {
            let a = frame.pop_long()?;
            frame.push(Value::Float(a as f32));
        }
        opcodes::L2D => {
            let a = frame.pop_long()?;
            frame.push(Value::Double(a as f64));
        }
        opcodes::F2I => {
            let a = frame.pop_float()?;
            frame.push(Value::Int(a as i32));
        }
        opcodes::F2L => {
            let a = frame.pop_float()?;
            frame.push(Value::Long(a as i64));
        }
        opcodes::F2D => {
            let a = frame.pop_float()?;
            frame.push(Value::Double(a as f64));
        }
        opcodes::D2I => {
            let a = frame.pop_double()?;
            frame.push(Value::Int(a as i32));
        }
        opcodes::D2L => {
            let a = frame.pop_double()?;
            frame.push(Value::Long(a as i64));
        }
        opcodes::D2F => {
            let a = frame.pop_double()?;
            frame.push(Value::Float(a as f32));
        }
        opcodes::I2B => {
            let a = frame.pop_int()?;
            frame.push(Value::Int((a as i8) as i32));
        }
        opcodes::I2C => {
            let a = frame.pop_int()?;
            frame.push(Value::Int((a as u16) as i32));
        }
        opcodes::I2S => {
            let a = frame.pop_int()?;
            frame.push(Value::Int((a as i16) as i32));
        }

        opcodes::LCMP => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Int(compare_longs(a, b)));
        }
        opcodes::FCMPL => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Int(compare_floats(a, b, -1)));
        }
        opcodes::FCMPG => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            frame.push(Value::Int(compare_floats(a, b, 1)));
        }
        opcodes::DCMPL => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Int(compare_doubles(a, b, -1)));
        }
        opcodes::DCMPG => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            frame.push(Value::Int(compare_doubles(a, b, 1)));
        }

        opcodes::IFEQ..=opcodes::IFLE => {
            let offset = frame.fetch_i16()? as i64;
            let value = frame.pop_int()?;
            let taken = match opcode {
                opcodes::IFEQ => value == 0,
                opcodes::IFNE => value != 0,
                opcodes::IFLT => value < 0,
                opcodes::IFGE => value >= 0,
                opcodes::IFGT => value > 0,
                _ => value <= 0,
            };
            if taken {
                frame.jump(offset)?;
            }
        }
        opcodes::IF_ICMPEQ..=opcodes::IF_ICMPLE => {
            let offset = frame.fetch_i16()? as i64;
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            let taken = match opcode {
                opcodes::IF_ICMPEQ => a == b,
                opcodes::IF_ICMPNE => a != b,
                opcodes::IF_ICMPLT => a < b,
                opcodes::IF_ICMPGE => a >= b,
                opcodes::IF_ICMPGT => a > b,
                _ => a <= b,
            };
            if taken {
                frame.jump(offset)?;
            }
        }
        opcodes::IF_ACMPEQ | opcodes::IF_ACMPNE => {
            let offset = frame.fetch_i16()? as i64;
            let b = frame.pop()?;
            let a = frame.pop()?;
            let equal = a.reference_eq(&b);
            if (opcode == opcodes::IF_ACMPEQ) == equal {
                frame.jump(offset)?;
            }
        }
        opcodes::GOTO => {
            let offset = frame.fetch_i16()? as i64;
            frame.jump(offset)?;
        }
        opcodes::JSR => {
            let offset = frame.fetch_i16()? as i64;
            frame.push(Value::Int(frame.pc as i32));
            frame.jump(offset)?;
        }
        opcodes::RET => {
            let index = frame.fetch_u8()? as usize;
            let address = frame.local(index)?.as_int()?;
            if address < 0 || address as usize >= frame.method.code().len() {
                return Err(frame.fail(format!("return address {} out of range", address)));
            }
            frame.pc = address as usize;
        }
        opcodes::IFNULL | opcodes::IFNONNULL => {
            let offset = frame.fetch_i16()? as i64;
            let value = frame.pop()?;
            if (opcode == opcodes::IFNULL) == value.is_null() {
                frame.jump(offset)?;
            }
        }
        opcodes::GOTO_W => {
            let offset = frame.fetch_i32()? as i64;
            frame.jump(offset)?;
        }
        opcodes::JSR_W => {
            let offset = frame.fetch_i32()? as i64;
            frame.push(Value::Int(frame.pc as i32));
            frame.jump(offset)?;
        }

        opcodes::TABLESWITCH => {
            frame.align_pc();
            let default = frame.fetch_i32()? as i64;
            let low = frame.fetch_i32()?;
            let high = frame.fetch_i32()?;
            let key = frame.pop_int()?;
            if key < low || key > high {
                frame.jump(default)?;
            } else {
                frame.pc += (key - low) as usize * 4;
                let offset = frame.fetch_i32()? as i64;
                frame.jump(offset)?;
            }
        }
        opcodes::LOOKUPSWITCH => {
            frame.align_pc();
            let default = frame.fetch_i32()? as i64;
            let npairs = frame.fetch_i32()?;
            let key = frame.pop_int()?;
            let mut target = None;
            for _ in 0..npairs {
                let match_value = frame.fetch_i32()?;
                let offset = frame.fetch_i32()? as i64;
                if match_value == key {
                    target = Some(offset);
                    break;
                }
            }
            frame.jump(target.unwrap_or(default))?;
        }

        opcodes::IRETURN..=opcodes::ARETURN => {
            let value = frame.pop()?;
            return Ok(Step::Return(Some(value)));
        }
        opcodes::RETURN => return Ok(Step::Return(None)),

        opcodes::GETSTATIC => {
            let index = frame.fetch_u16()?;
            let pool = frame.class.constant_pool();
            let owner_name = pool.class_name_at(index)?;
            let field_name = pool.name_at(index)?;
            match resolve_named(frame, &owner_name)? {
                Some(ClassHandle::Vm(class)) => {
                    let value = class.read_static_field(&field_name, frame.provider)?;
                    frame.push(value);
                }
                Some(ClassHandle::Host(_)) => {
                    return Err(frame.fail(format!(
                        "static field access on host class {}",
                        owner_name
                    )))
                }
                None => return Err(Unwind::Fail(Error::UnresolvableClass { name: owner_name })),
            }
        }
        opcodes::PUTSTATIC => {
            let index = frame.fetch_u16()?;
            let pool = frame.class.constant_pool();
            let owner_name = pool.class_name_at(index)?;
            let field_name = pool.name_at(index)?;
            let value = frame.pop()?;
            match resolve_named(frame, &owner_name)? {
                Some(ClassHandle::Vm(class)) => {
                    // the cell is written directly so that a static
                    // initializer can set final fields
                    let field = class
                        .find_field(&field_name, frame.provider)?
                        .ok_or_else(|| Error::NoSuchField {
                            class: owner_name.clone(),
                            field: field_name.clone(),
                        })?;
                    field.set_static_value(value);
                }
                Some(ClassHandle::Host(_)) => {
                    return Err(frame.fail(format!(
                        "static field access on host class {}",
                        owner_name
                    )))
                }
                None => return Err(Unwind::Fail(Error::UnresolvableClass { name: owner_name })),
            }
        }
        opcodes::GETFIELD => {
            let index = frame.fetch_u16()?;
            let field_name = frame.class.constant_pool().name_at(index)?;
            let object = frame.pop_object(&field_name)?;
            let value = object.get_field(&field_name)?;
            frame.push(value);
        }
        opcodes::PUTFIELD => {
            let index = frame.fetch_u16()?;
            let field_name = frame.class.constant_pool().name_at(index)?;
            let value = frame.pop()?;
            let object = frame.pop_object(&field_name)?;
            // finals are writable here so that constructors can set them
            object.set_field(&field_name, value, false)?;
        }

        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => invoke_symbolic(frame, opcode)?,
        opcodes::INVOKEDYNAMIC => return Err(frame.fail("invokedynamic is not supported")),

        opcodes::NEW => {
            let index = frame.fetch_u16()?;
            let name = frame.class.constant_pool().class_name_at(index)?;
            match resolve_named(frame, &name)? {
                Some(ClassHandle::Vm(class)) => {
                    let object = class.new_instance(false, frame.provider)?;
                    frame.push(Value::Object(object));
                }
                Some(ClassHandle::Host(_)) => {
                    return Err(frame.fail(format!("cannot instantiate host class {}", name)))
                }
                None => return Err(Unwind::Fail(Error::UnresolvableClass { name })),
            }
        }
        opcodes::NEWARRAY => {
            let atype = frame.fetch_u8()?;
            let component = match atype {
                4 => "Z",
                5 => "C",
                6 => "F",
                7 => "D",
                8 => "B",
                9 => "S",
                10 => "I",
                11 => "J",
                other => {
                    return Err(frame.fail(format!("unknown primitive array type {}", other)))
                }
            };
            let length = frame.pop_int()?;
            if length < 0 {
                return Err(fault(fault_classes::NEGATIVE_ARRAY_SIZE, length.to_string()));
            }
            let fill = default_value_for(component)?;
            frame.push(Value::Array(JvmArray::new(component, length as usize, fill)));
        }
        opcodes::ANEWARRAY => {
            let index = frame.fetch_u16()?;
            let component = frame.class.constant_pool().class_name_at(index)?;
            let length = frame.pop_int()?;
            if length < 0 {
                return Err(fault(fault_classes::NEGATIVE_ARRAY_SIZE, length.to_string()));
            }
            frame.push(Value::Array(JvmArray::new(component, length as usize, Value::Null)));
        }
        opcodes::ARRAYLENGTH => {
            let array = frame.pop_array()?;
            frame.push(Value::Int(array.len() as i32));
        }
        opcodes::ATHROW => {
            let value = frame.pop()?;
            if value.is_null() {
                return Err(fault(fault_classes::NULL_POINTER, "throw of null"));
            }
            return Err(Unwind::Throw(value));
        }
        opcodes::CHECKCAST => {
            let index = frame.fetch_u16()?;
            let target = frame.class.constant_pool().class_name_at(index)?;
            let value = frame.pop()?;
            if !value.is_null() && !value_instance_of(frame.provider, &value, &target)? {
                return Err(fault(
                    fault_classes::CLASS_CAST,
                    format!("{} cannot be cast to {}", value_class_name(&value), target),
                ));
            }
            frame.push(value);
        }
        opcodes::INSTANCEOF => {
            let index = frame.fetch_u16()?;
            let target = frame.class.constant_pool().class_name_at(index)?;
            let value = frame.pop()?;
            let result = if value.is_null() {
                false
            } else {
                value_instance_of(frame.provider, &value, &target)?
            };
            frame.push(Value::Int(result as i32));
        }
        opcodes::MONITORENTER | opcodes::MONITOREXIT => {
            // the core is single-threaded; monitors only keep the null check
            let value = frame.pop()?;
            if value.is_null() {
                return Err(fault(fault_classes::NULL_POINTER, "monitor on null"));
            }
        }
        opcodes::WIDE => {
            let wide_opcode = frame.fetch_u8()?;
            let index = frame.fetch_u16()? as usize;
            match wide_opcode {
                opcodes::ILOAD..=opcodes::ALOAD => {
                    let value = frame.local(index)?;
                    frame.push(value);
                }
                opcodes::ISTORE..=opcodes::ASTORE => {
                    let value = frame.pop()?;
                    frame.set_local(index, value)?;
                }
                opcodes::IINC => {
                    let delta = frame.fetch_i16()? as i32;
                    let value = frame.local(index)?.as_int()?;
                    frame.set_local(index, Value::Int(value.wrapping_add(delta)))?;
                }
                opcodes::RET => {
                    let address = frame.local(index)?.as_int()?;
                    if address < 0 || address as usize >= frame.method.code().len() {
                        return Err(frame.fail(format!("return address {} out of range", address)));
                    }
                    frame.pc = address as usize;
                }
                other => {
                    return Err(frame.fail(format!("unsupported wide opcode 0x{:02x}", other)))
                }
            }
        }
        opcodes::MULTIANEWARRAY => {
            let index = frame.fetch_u16()?;
            let descriptor = frame.class.constant_pool().class_name_at(index)?;
            let dimensions = frame.fetch_u8()? as usize;
            if dimensions == 0 {
                return Err(frame.fail("multianewarray with zero dimensions"));
            }
            let mut counts = Vec::with_capacity(dimensions);
            for _ in 0..dimensions {
                counts.push(frame.pop_int()?);
            }
            counts.reverse();
            for &count in &counts {
                if count < 0 {
                    return Err(fault(fault_classes::NEGATIVE_ARRAY_SIZE, count.to_string()));
                }
            }
            frame.push(build_multi_array(&descriptor, &counts)?);
        }

        other => {
            return Err(frame.fail(format!(
                "unsupported opcode 0x{:02x} ({})",
                other,
                opcodes::mnemonic(other)
            )))
        }
    }
    Ok(Step::Next)
}
