//! The fetch-decode-execute loop.
//!
//! One invocation runs one frame over one code object's instruction
//! stream until it hits `End`, a `Return`, or an error. Calls are
//! ordinary recursive re-entries; exceptions unwind by early return,
//! each call site appending its own trace entry on the way out. The
//! heap is swept once after every successfully executed instruction.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::core::gc::{Heap, ValueId};
use crate::core::value::{FunctionKind, HeapValue, Slot};
use crate::errors::{Exception, messages};
use crate::machine::Machine;
use crate::opcode::Op;
use crate::program::Image;

use super::ARGS_VAR;
use super::frame::Frame;

/// Runs one activation of `object`. `args` is the argument list of a
/// `Call` (bound to the frame-private `...` variable) or `None` for
/// the entry object. On success the returned slot carries one saved
/// reference so it outlives this frame's exit sweep.
pub(crate) fn run_object(m: &mut Machine, object: usize, args: Slot) -> Result<Slot, Exception> {
    let image = Rc::clone(&m.image);
    let mut frame = Frame::new(m.config.stack_capacity);
    if args.is_some() {
        frame.dyn_set(&mut m.heap, ARGS_VAR, args);
    }
    let result = exec(m, &mut frame, &image, object);
    frame.release_all(&mut m.heap);
    m.heap.collect();
    result
}

fn throw(message: impl Into<String>, at: usize, object: usize) -> Exception {
    Exception::new(message, at, object)
}

fn exec(m: &mut Machine, frame: &mut Frame, image: &Image, object: usize) -> Result<Slot, Exception> {
    let code: &[u8] = &image.object(object).code;
    // A callee's return value keeps its saved reference until after
    // the sweep of the instruction that received it.
    let mut deferred: Slot = None;

    loop {
        let at = frame.pc;
        let byte = match code.get(at) {
            Some(&b) => b,
            None => return Err(throw(messages::END_OF_STREAM, at, object)),
        };
        frame.pc += 1;
        let Some(op) = Op::from_u8(byte) else {
            return Err(throw(
                format!("Unknown instruction opcode `{byte}`"),
                at,
                object,
            ));
        };

        match op {
            Op::End => return Ok(None),

            Op::Return => {
                let value = frame
                    .pop(&mut m.heap)
                    .map_err(|e| throw(e, at, object))?;
                // Saved reference: the result must survive this
                // frame's exit sweep.
                m.heap.add_ref(value);
                return Ok(value);
            }

            Op::StoreSimple => {
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let index = read_u32(code, &mut frame.pc).map_err(|e| throw(e, at, object))? as usize;
                if value.is_none() {
                    return Err(throw("Got NULL for StoreSimple", at, object));
                }
                m.store_simple(object, index, value)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::LoadSimple => {
                let index = read_u32(code, &mut frame.pc).map_err(|e| throw(e, at, object))? as usize;
                let value = m
                    .load_simple(object, index)
                    .map_err(|e| throw(e, at, object))?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::StoreDynamic => {
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                if value.is_none() {
                    return Err(throw("Got NULL for StoreDynamic", at, object));
                }
                frame.dyn_set(&mut m.heap, name, value);
            }

            Op::LoadDynamic => {
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let value = frame
                    .dyn_get(name)
                    .ok_or_else(|| throw(format!("Undefined variable `{name}`"), at, object))?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::RemoveDynamic => {
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                frame.dyn_remove(&mut m.heap, name);
            }

            Op::StoreGlobal => {
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                if value.is_none() {
                    return Err(throw("Got NULL for StoreGlobal", at, object));
                }
                m.store_global(name, value);
            }

            Op::LoadGlobal => {
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let value = m.globals.get(name).copied().ok_or_else(|| {
                    throw(format!("Undefined global variable `{name}`"), at, object)
                })?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::LoadFunction => {
                let name = read_name(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let target = image
                    .resolve(name)
                    .ok_or_else(|| throw(format!("Undefined function `{name}`"), at, object))?;
                let id = m.heap.alloc(HeapValue::Function(FunctionKind::Code(target)));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushChar => {
                let data = read_u8(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let id = m.heap.alloc(HeapValue::Char(data));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushI16 => {
                let data = read_i16(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let id = m.heap.alloc(HeapValue::I16(data));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushI32 => {
                let data = read_i32(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let id = m.heap.alloc(HeapValue::I32(data));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushI64 => {
                let data = read_i64(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let id = m.heap.alloc(HeapValue::I64(data));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushString => {
                let index = read_u32(code, &mut frame.pc).map_err(|e| throw(e, at, object))? as usize;
                let data = image
                    .object(object)
                    .constants
                    .get(index)
                    .ok_or_else(|| throw(format!("Invalid constant index `{index}`"), at, object))?;
                let id = m.heap.alloc(HeapValue::Str(data.clone()));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::PushNull => {
                frame
                    .push(&mut m.heap, None)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::ListBegin => {
                frame.list_bases.push(frame.stack.len());
            }

            Op::ListEnd => {
                let base = frame
                    .list_bases
                    .pop()
                    .ok_or_else(|| throw(messages::LIST_NOT_OPEN, at, object))?;
                if base > frame.stack.len() {
                    return Err(throw(messages::STACK_UNDERFLOW, at, object));
                }
                let items: Vec<Slot> = frame.stack[base..].to_vec();
                // Each element gains a list-membership reference before
                // its stack hold is released.
                for item in &items {
                    m.heap.add_ref(*item);
                }
                for _ in 0..items.len() {
                    frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                }
                let id = m.heap.alloc(HeapValue::List(items));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::ListExpand => {
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let Some(id) = value else {
                    return Err(throw("Attempt to expand NULL", at, object));
                };
                let items = match m.heap.get(id) {
                    HeapValue::List(items) => items.clone(),
                    other => {
                        return Err(throw(
                            format!("Expand does not support type `{}`", other.type_name()),
                            at,
                            object,
                        ));
                    }
                };
                // Last element first: call-argument unpacking depends
                // on popping elements in list order.
                for item in items.iter().rev() {
                    frame
                        .push(&mut m.heap, *item)
                        .map_err(|e| throw(e, at, object))?;
                }
            }

            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let rhs = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let lhs = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let id = binary_arith(&mut m.heap, op, lhs, rhs)
                    .map_err(|e| throw(e, at, object))?;
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::Equals => {
                let rhs = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let lhs = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let equal = value_equals(&m.heap, lhs, rhs).map_err(|e| throw(e, at, object))?;
                let id = m.heap.alloc(HeapValue::Bool(equal));
                frame
                    .push(&mut m.heap, Some(id))
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::Pop => {
                frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
            }

            Op::Dup => {
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
            }

            Op::Jump => {
                let target = read_u64(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                frame.pc = jump_target(target, code.len()).map_err(|e| throw(e, at, object))?;
            }

            Op::JumpIf | Op::JumpIfNot => {
                let target = read_u64(code, &mut frame.pc).map_err(|e| throw(e, at, object))?;
                let value = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let truthy = m.truthy(value);
                let taken = if op == Op::JumpIf { truthy } else { !truthy };
                if taken {
                    frame.pc =
                        jump_target(target, code.len()).map_err(|e| throw(e, at, object))?;
                }
            }

            Op::Call => {
                // The argument list sits on top of the callable. The
                // arguments are popped first but the callable is
                // type-checked first; both orders are observable.
                let args = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                let callee = frame.pop(&mut m.heap).map_err(|e| throw(e, at, object))?;
                // Keep both alive across the callee's sweeps.
                m.heap.add_ref(args);
                m.heap.add_ref(callee);
                let outcome = call_value(m, object, at, callee, args);
                m.heap.remove_ref(args);
                m.heap.remove_ref(callee);
                let value = outcome?;
                frame
                    .push(&mut m.heap, value)
                    .map_err(|e| throw(e, at, object))?;
                deferred = value;
            }
        }

        m.heap.collect();
        if deferred.is_some() {
            // Release the callee result's saved reference now that
            // this frame's sweep has run.
            m.heap.remove_ref(deferred);
            deferred = None;
        }
    }
}

/// Dispatches a popped callable. The callable is checked before the
/// argument list; a propagated exception gains the caller's own
/// (offset, object) entry here.
fn call_value(
    m: &mut Machine,
    caller: usize,
    at: usize,
    callee: Slot,
    args: Slot,
) -> Result<Slot, Exception> {
    let kind = match callee {
        None => return Err(throw("Attempt to call NULL", at, caller)),
        Some(id) => match m.heap.get(id) {
            HeapValue::Function(kind) => kind.clone(),
            other => {
                return Err(throw(
                    format!("Attempt to call `{}`", other.type_name()),
                    at,
                    caller,
                ));
            }
        },
    };

    let Some(args_id) = args else {
        return Err(throw("Call arguments must be a List, got NULL", at, caller));
    };
    let items: SmallVec<[Slot; 8]> = match m.heap.get(args_id) {
        HeapValue::List(items) => items.iter().copied().collect(),
        other => {
            return Err(throw(
                format!("Call arguments must be a List, got `{}`", other.type_name()),
                at,
                caller,
            ));
        }
    };

    match kind {
        FunctionKind::Code(object) => match run_object(m, object, args) {
            Ok(value) => Ok(value),
            Err(mut e) => {
                e.push_trace(at, caller);
                Err(e)
            }
        },
        FunctionKind::Native(callback) => match callback(m, &items) {
            Ok(value) => {
                // Same saved-reference discipline as a bytecode return.
                m.heap.add_ref(value);
                Ok(value)
            }
            Err(message) => Err(throw(message, at, caller)),
        },
    }
}

fn binary_arith(heap: &mut Heap, op: Op, lhs: Slot, rhs: Slot) -> Result<ValueId, String> {
    let sym = match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        _ => "/",
    };
    let (Some(a), Some(b)) = (lhs, rhs) else {
        return Err(format!("Attempt to apply '{sym}' to NULL"));
    };

    macro_rules! apply {
        ($variant:ident, $x:expr, $y:expr) => {{
            let (x, y) = ($x, $y);
            HeapValue::$variant(match op {
                Op::Add => x.wrapping_add(y),
                Op::Sub => x.wrapping_sub(y),
                Op::Mul => x.wrapping_mul(y),
                _ => {
                    if y == 0 {
                        return Err(messages::DIVISION_BY_ZERO.to_string());
                    }
                    x.wrapping_div(y)
                }
            })
        }};
    }

    let value = match (heap.get(a), heap.get(b)) {
        (HeapValue::Char(x), HeapValue::Char(y)) => apply!(Char, *x, *y),
        (HeapValue::I16(x), HeapValue::I16(y)) => apply!(I16, *x, *y),
        (HeapValue::I32(x), HeapValue::I32(y)) => apply!(I32, *x, *y),
        (HeapValue::I64(x), HeapValue::I64(y)) => apply!(I64, *x, *y),
        (
            lv @ (HeapValue::Char(_) | HeapValue::I16(_) | HeapValue::I32(_) | HeapValue::I64(_)),
            rv,
        ) => {
            return Err(format!(
                "Unsupported '{sym}' between {} and {}",
                lv.type_name(),
                rv.type_name()
            ));
        }
        (lv, _) => return Err(format!("Unsupported '{sym}' for `{}`", lv.type_name())),
    };
    Ok(heap.alloc(value))
}

/// Same-tag values compare by content (numerics, strings, bools) or by
/// heap identity (lists, functions); differing tags are simply not
/// equal. A missing operand is an error, like arithmetic.
fn value_equals(heap: &Heap, lhs: Slot, rhs: Slot) -> Result<bool, String> {
    let (Some(a), Some(b)) = (lhs, rhs) else {
        return Err("Attempt to compare NULL".to_string());
    };
    Ok(match (heap.get(a), heap.get(b)) {
        (HeapValue::Char(x), HeapValue::Char(y)) => x == y,
        (HeapValue::I16(x), HeapValue::I16(y)) => x == y,
        (HeapValue::I32(x), HeapValue::I32(y)) => x == y,
        (HeapValue::I64(x), HeapValue::I64(y)) => x == y,
        (HeapValue::Str(x), HeapValue::Str(y)) => x == y,
        (HeapValue::Bool(x), HeapValue::Bool(y)) => x == y,
        (HeapValue::List(_), HeapValue::List(_)) => a == b,
        (HeapValue::Function(_), HeapValue::Function(_)) => a == b,
        _ => false,
    })
}

fn jump_target(target: u64, len: usize) -> Result<usize, String> {
    usize::try_from(target)
        .ok()
        .filter(|t| *t < len)
        .ok_or_else(|| format!("Jump target {target} out of range"))
}

fn read_u8(code: &[u8], pc: &mut usize) -> Result<u8, String> {
    let byte = *code
        .get(*pc)
        .ok_or_else(|| messages::END_OF_STREAM.to_string())?;
    *pc += 1;
    Ok(byte)
}

fn read_bytes<'a>(code: &'a [u8], pc: &mut usize, n: usize) -> Result<&'a [u8], String> {
    let slice = code
        .get(*pc..*pc + n)
        .ok_or_else(|| messages::END_OF_STREAM.to_string())?;
    *pc += n;
    Ok(slice)
}

fn read_i16(code: &[u8], pc: &mut usize) -> Result<i16, String> {
    Ok(i16::from_le_bytes(
        read_bytes(code, pc, 2)?.try_into().expect("2 bytes"),
    ))
}

fn read_i32(code: &[u8], pc: &mut usize) -> Result<i32, String> {
    Ok(i32::from_le_bytes(
        read_bytes(code, pc, 4)?.try_into().expect("4 bytes"),
    ))
}

fn read_i64(code: &[u8], pc: &mut usize) -> Result<i64, String> {
    Ok(i64::from_le_bytes(
        read_bytes(code, pc, 8)?.try_into().expect("8 bytes"),
    ))
}

fn read_u32(code: &[u8], pc: &mut usize) -> Result<u32, String> {
    Ok(u32::from_le_bytes(
        read_bytes(code, pc, 4)?.try_into().expect("4 bytes"),
    ))
}

fn read_u64(code: &[u8], pc: &mut usize) -> Result<u64, String> {
    Ok(u64::from_le_bytes(
        read_bytes(code, pc, 8)?.try_into().expect("8 bytes"),
    ))
}

fn read_name<'a>(code: &'a [u8], pc: &mut usize) -> Result<&'a str, String> {
    let start = *pc;
    let tail = code
        .get(start..)
        .ok_or_else(|| messages::END_OF_STREAM.to_string())?;
    let nul = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| messages::END_OF_STREAM.to_string())?;
    let name = std::str::from_utf8(&tail[..nul]).map_err(|_| "Invalid UTF-8 in name".to_string())?;
    *pc = start + nul + 1;
    Ok(name)
}
