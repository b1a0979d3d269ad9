//! The interpreter core: frame lifecycle, opcode dispatch, calls and the
//! exception-region unwinder.
//!
//! Execution is a recursive walk. [`Engine::call_method`] allocates a frame
//! (or dispatches to the internal-method registry for runtime-provided
//! bodies), and the frame loop executes one decoded instruction at a time
//! against that frame's evaluation stack. Call opcodes resolve their site
//! and recurse; `ret` hands the top of stack back to the caller.
//!
//! The cooperative cancellation flag is observed before every dispatch;
//! when cleared, the current frame (and every outer frame) unwinds cleanly
//! returning null.

use std::sync::{atomic::Ordering, Arc};

use log::trace;

use crate::{
    disassembler::{ClauseKind, ExceptionClause, Instruction, MethodBody, Operand},
    engine::{
        error::RuntimeError,
        frame::Frame,
        internals,
        resolver::{CallKind, Resolution},
        value::{BinaryOp, CompareOp, ConvKind, UnaryOp, Value},
        Engine,
    },
    metadata::typesystem::{CallSite, FieldSite, MethodDesc, TypeDesc, TypeSite},
};

/// Outcome of executing one instruction.
enum Flow {
    /// Fall through to the next instruction.
    Next,
    /// Jump to the instruction at the given index.
    Jump(usize),
    /// Return from the frame with an optional value.
    Return(Option<Value>),
    /// Exit a protected region toward the given byte offset.
    Leave(u32),
    /// Raise the popped exception object.
    Throw(Value),
    /// Terminate the enclosing finally/fault handler.
    EndFinally,
}

impl Engine {
    /// Calls a resolved method: internal registry dispatch for
    /// runtime-provided bodies, a fresh frame otherwise.
    ///
    /// `receiver` is bound as argument 0 when present; `params` follow in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Propagates any runtime error the callee (or its callees) raise and
    /// no region handles.
    pub(crate) fn call_method(
        &mut self,
        method: &Arc<MethodDesc>,
        receiver: Option<Value>,
        params: Vec<Value>,
    ) -> Result<Option<Value>, RuntimeError> {
        if method.is_internal_call() || method.is_runtime_impl() {
            let canonical = internals::canonical_name(method);
            if self.internals.contains(&canonical) {
                return self.invoke_internal(&canonical, receiver, params, method.to_string());
            }
            if method.is_runtime_impl() {
                if let Some(fallback) = internals::runtime_fallback(method) {
                    let args = join_args(receiver, params);
                    self.call_log.push(method.to_string());
                    let result = fallback(self, &args)?;
                    self.call_log.pop();
                    return Ok(result);
                }
            }
            return Err(RuntimeError::Internal(format!(
                "missing internal method '{canonical}'"
            )));
        }

        let body = method
            .body()
            .cloned()
            .ok_or_else(|| RuntimeError::Internal(format!("{method} has no body")))?;

        self.call_log.push(method.to_string());
        let mut frame = Frame::new(Arc::clone(method), join_args(receiver, params));
        let result = self.run_frame(&mut frame, &body)?;
        self.call_log.pop();
        Ok(result)
    }

    /// Invokes a registered internal method by canonical name.
    pub(crate) fn invoke_internal(
        &mut self,
        canonical: &str,
        receiver: Option<Value>,
        params: Vec<Value>,
        log_entry: String,
    ) -> Result<Option<Value>, RuntimeError> {
        let callback = self.internals.lookup(canonical).ok_or_else(|| {
            RuntimeError::Internal(format!("missing internal method '{canonical}'"))
        })?;

        let args = join_args(receiver, params);
        self.call_log.push(log_entry);
        let result = callback(self, &args)?;
        self.call_log.pop();
        Ok(result)
    }

    /// The frame loop: dispatch instructions until return or unwind.
    fn run_frame(
        &mut self,
        frame: &mut Frame,
        body: &MethodBody,
    ) -> Result<Option<Value>, RuntimeError> {
        let mut ip = 0usize;
        // Frames unwound by a caught exception leave their call-log
        // entries behind; a catch restores the log to this frame's depth
        let log_depth = self.call_log.len();

        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Ok(Some(Value::Null));
            }

            let instr = body.instructions.get(ip).ok_or_else(|| {
                RuntimeError::Internal("execution fell off the end of the method".to_string())
            })?;
            trace!("{:04}: {}", instr.offset, instr.mnemonic);

            let offset = instr.offset;
            match self.exec(frame, body, instr) {
                Ok(Flow::Next) => ip += 1,
                Ok(Flow::Jump(index)) => ip = index,
                Ok(Flow::Return(value)) => return Ok(value),
                Ok(Flow::Leave(target)) => {
                    // Finally blocks whose protected region we are exiting
                    // run before control moves to the target
                    for clause in &body.handlers {
                        if matches!(clause.kind, ClauseKind::Finally)
                            && clause.protects(offset)
                            && !clause.protects(target)
                        {
                            self.run_handler(frame, body, clause)?;
                        }
                    }
                    // leave discards the top stack entry, nothing more
                    if !frame.stack.is_empty() {
                        frame.stack.pop()?;
                    }
                    ip = target_index(body, target)?;
                }
                Ok(Flow::Throw(exception)) => {
                    let error = self.managed_error(exception);
                    ip = self.dispatch_error(frame, body, offset, error)?;
                    self.call_log.truncate(log_depth);
                }
                Ok(Flow::EndFinally) => {
                    return Err(RuntimeError::Internal(
                        "endfinally outside a handler".to_string(),
                    ))
                }
                Err(error) => {
                    ip = self.dispatch_error(frame, body, offset, error)?;
                    self.call_log.truncate(log_depth);
                }
            }
        }
    }

    /// Runs a finally/fault handler block to its `endfinally`.
    fn run_handler(
        &mut self,
        frame: &mut Frame,
        body: &MethodBody,
        clause: &ExceptionClause,
    ) -> Result<(), RuntimeError> {
        let mut ip = target_index(body, clause.handler_offset)?;

        loop {
            let instr = body.instructions.get(ip).ok_or_else(|| {
                RuntimeError::Internal("handler fell off the end of the method".to_string())
            })?;

            match self.exec(frame, body, instr)? {
                Flow::Next => ip += 1,
                Flow::Jump(index) => ip = index,
                Flow::EndFinally => return Ok(()),
                _ => {
                    return Err(RuntimeError::Internal(
                        "unsupported control flow inside a finally handler".to_string(),
                    ))
                }
            }
        }
    }

    /// Unwinds an error within the current frame: finally/fault handlers
    /// covering the faulting offset run, and the innermost matching catch
    /// receives the exception object as its only stack entry. Without a
    /// matching catch the error propagates to the caller's frame.
    fn dispatch_error(
        &mut self,
        frame: &mut Frame,
        body: &MethodBody,
        offset: u32,
        error: RuntimeError,
    ) -> Result<usize, RuntimeError> {
        for clause in &body.handlers {
            if !clause.protects(offset) {
                continue;
            }

            match &clause.kind {
                ClauseKind::Finally | ClauseKind::Fault => {
                    self.run_handler(frame, body, clause)?;
                }
                ClauseKind::Catch(expected) if catch_matches(expected.as_ref(), &error) => {
                    let exception = self.exception_value(error);
                    frame.stack.clear();
                    frame.stack.push(exception);
                    return target_index(body, clause.handler_offset);
                }
                ClauseKind::Catch(_) | ClauseKind::Filter => {}
            }
        }

        Err(error)
    }

    /// Converts a thrown object into the managed error carrying it.
    fn managed_error(&mut self, exception: Value) -> RuntimeError {
        let (message, type_name) = match &exception {
            Value::Object { handle, ty } => {
                let message = self
                    .heap
                    .load_field(*handle, "_message")
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                (message, ty.full_name())
            }
            Value::Str(s) => (s.to_string(), "System.Exception".to_string()),
            other => (other.to_string(), "System.Exception".to_string()),
        };

        RuntimeError::Managed {
            exception,
            message,
            type_name,
        }
    }

    /// Produces the exception object a catch handler receives.
    fn exception_value(&mut self, error: RuntimeError) -> Value {
        match error {
            RuntimeError::Managed { exception, .. } => exception,
            other => {
                let ty = TypeDesc::synthetic("System", other.kind());
                let handle = self.heap.alloc_object(Arc::clone(&ty));
                let _ = self
                    .heap
                    .store_field(handle, "_message", Value::Str(Arc::from(other.to_string())));
                Value::Object { handle, ty }
            }
        }
    }

    /// Executes one instruction against the frame.
    #[allow(clippy::too_many_lines)]
    fn exec(
        &mut self,
        frame: &mut Frame,
        body: &MethodBody,
        instr: &Instruction,
    ) -> Result<Flow, RuntimeError> {
        if instr.prefix == crate::disassembler::opcodes::FE_PREFIX {
            return self.exec_fe(frame, instr);
        }

        match instr.opcode {
            // ================================================================
            // Stack operations
            // ================================================================
            0x00 | 0x01 => Ok(Flow::Next), // nop, break
            0x25 => {
                frame.stack.dup()?;
                Ok(Flow::Next)
            }
            0x26 => {
                frame.stack.pop()?;
                Ok(Flow::Next)
            }

            // ================================================================
            // Arguments
            // ================================================================
            0x02..=0x05 => {
                let value = frame.arg(usize::from(instr.opcode - 0x02))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x0E => {
                let value = frame.arg(usize::from(op_var(instr)?))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x0F => self.load_arg_address(frame, usize::from(op_var(instr)?)),
            0x10 => {
                let value = frame.stack.pop()?;
                frame.set_arg(usize::from(op_var(instr)?), value)?;
                Ok(Flow::Next)
            }

            // ================================================================
            // Locals
            // ================================================================
            0x06..=0x09 => {
                let value = frame.local(usize::from(instr.opcode - 0x06))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x0A..=0x0D => {
                let value = frame.stack.pop()?;
                frame.set_local(usize::from(instr.opcode - 0x0A), value)?;
                Ok(Flow::Next)
            }
            0x11 => {
                let value = frame.local(usize::from(op_var(instr)?))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x12 => self.load_local_address(frame, usize::from(op_var(instr)?)),
            0x13 => {
                let value = frame.stack.pop()?;
                frame.set_local(usize::from(op_var(instr)?), value)?;
                Ok(Flow::Next)
            }

            // ================================================================
            // Constant loads
            // ================================================================
            0x14 => {
                frame.stack.push(Value::Null);
                Ok(Flow::Next)
            }
            0x15 => {
                frame.stack.push(Value::Int32(-1));
                Ok(Flow::Next)
            }
            0x16..=0x1E => {
                frame.stack.push(Value::Int32(i32::from(instr.opcode) - 0x16));
                Ok(Flow::Next)
            }
            0x1F | 0x20 => {
                frame.stack.push(Value::Int32(op_i32(instr)?));
                Ok(Flow::Next)
            }
            0x21 => {
                frame.stack.push(Value::Int64(op_i64(instr)?));
                Ok(Flow::Next)
            }
            0x22 => {
                frame.stack.push(Value::Float32(op_f32(instr)?));
                Ok(Flow::Next)
            }
            0x23 => {
                frame.stack.push(Value::Float64(op_f64(instr)?));
                Ok(Flow::Next)
            }
            0x72 => {
                frame.stack.push(Value::Str(op_string(instr)?));
                Ok(Flow::Next)
            }

            // ================================================================
            // Calls and return
            // ================================================================
            0x28 => {
                self.do_call(frame, op_call(instr)?, false)?;
                Ok(Flow::Next)
            }
            0x6F => {
                self.do_call(frame, op_call(instr)?, true)?;
                Ok(Flow::Next)
            }
            0x73 => {
                self.do_newobj(frame, op_call(instr)?)?;
                Ok(Flow::Next)
            }
            0x2A => {
                let value = if frame.method.sig.returns_value() {
                    Some(frame.stack.pop()?)
                } else {
                    None
                };
                Ok(Flow::Return(value))
            }

            // ================================================================
            // Branches
            // ================================================================
            0x2B | 0x38 => Ok(Flow::Jump(target_index(body, op_branch(instr)?)?)),
            0x2C | 0x39 => {
                let value = frame.stack.pop()?;
                if value.is_true() {
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Jump(target_index(body, op_branch(instr)?)?))
                }
            }
            0x2D | 0x3A => {
                let value = frame.stack.pop()?;
                if value.is_true() {
                    Ok(Flow::Jump(target_index(body, op_branch(instr)?)?))
                } else {
                    Ok(Flow::Next)
                }
            }
            0x2E | 0x3B => self.branch_compare(frame, body, instr, CompareOp::Eq),
            0x2F | 0x3C => self.branch_compare(frame, body, instr, CompareOp::Ge),
            0x30 | 0x3D => self.branch_compare(frame, body, instr, CompareOp::Gt),
            0x31 | 0x3E => self.branch_compare(frame, body, instr, CompareOp::Le),
            0x32 | 0x3F => self.branch_compare(frame, body, instr, CompareOp::Lt),
            0x33 | 0x40 => self.branch_compare(frame, body, instr, CompareOp::Ne),
            0x34 | 0x41 => self.branch_compare(frame, body, instr, CompareOp::GeUn),
            0x35 | 0x42 => self.branch_compare(frame, body, instr, CompareOp::GtUn),
            0x36 | 0x43 => self.branch_compare(frame, body, instr, CompareOp::LeUn),
            0x37 | 0x44 => self.branch_compare(frame, body, instr, CompareOp::LtUn),
            0x45 => {
                let index = frame.stack.pop()?.as_i32()?;
                let targets = op_switch(instr)?;
                match usize::try_from(index)
                    .ok()
                    .and_then(|i| targets.get(i).copied())
                {
                    Some(target) => Ok(Flow::Jump(target_index(body, target)?)),
                    None => Ok(Flow::Next),
                }
            }

            // ================================================================
            // Arithmetic and bitwise
            // ================================================================
            0x58 => self.binary(frame, BinaryOp::Add),
            0x59 => self.binary(frame, BinaryOp::Sub),
            0x5A => self.binary(frame, BinaryOp::Mul),
            0x5B | 0x5C => self.binary(frame, BinaryOp::Div),
            0x5D | 0x5E => self.binary(frame, BinaryOp::Rem),
            0x5F => self.binary(frame, BinaryOp::And),
            0x60 => self.binary(frame, BinaryOp::Or),
            0x61 => self.binary(frame, BinaryOp::Xor),
            0x62 => self.binary(frame, BinaryOp::Shl),
            0x63 => self.binary(frame, BinaryOp::Shr),
            0x64 => self.binary(frame, BinaryOp::ShrUn),
            0x65 => {
                let value = frame.stack.pop()?;
                frame.stack.push(value.unary_op(UnaryOp::Neg)?);
                Ok(Flow::Next)
            }
            0x66 => {
                let value = frame.stack.pop()?;
                frame.stack.push(value.unary_op(UnaryOp::Not)?);
                Ok(Flow::Next)
            }

            // ================================================================
            // Conversions
            // ================================================================
            0x67 => self.convert(frame, ConvKind::I1),
            0x68 => self.convert(frame, ConvKind::I2),
            0x69 => self.convert(frame, ConvKind::I4),
            0x6A => self.convert(frame, ConvKind::I8),
            0x6B => self.convert(frame, ConvKind::R4),
            0x6C => self.convert(frame, ConvKind::R8),
            0x6D => self.convert(frame, ConvKind::U4),
            0x6E => self.convert(frame, ConvKind::U8),
            0x76 => {
                // conv.r.un: reinterpret as unsigned before widening
                let value = frame.stack.pop()?;
                let result = match value {
                    Value::Int32(v) => Value::Float64(f64::from(v as u32)),
                    Value::Int64(v) | Value::IntPtr(v) => Value::Float64(v as u64 as f64),
                    other => other.convert(ConvKind::R8)?,
                };
                frame.stack.push(result);
                Ok(Flow::Next)
            }
            0xD1 => self.convert(frame, ConvKind::U2),
            0xD2 => self.convert(frame, ConvKind::U1),
            0xD3 => self.convert(frame, ConvKind::I),
            0xE0 => self.convert(frame, ConvKind::U),

            // ================================================================
            // Fields
            // ================================================================
            0x7B => {
                let site = op_field(instr)?;
                let target = frame.stack.pop()?;
                let value = self.load_instance_field(&target, site)?;
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x7D => {
                let site = op_field(instr)?;
                let value = frame.stack.pop()?;
                let target = frame.stack.pop()?;
                match target {
                    Value::Object { handle, .. } => {
                        self.heap.store_field(handle, &site.name, value)?;
                        Ok(Flow::Next)
                    }
                    Value::Null => Err(RuntimeError::NullReference),
                    other => Err(RuntimeError::Internal(format!(
                        "stfld target is not an object: {other}"
                    ))),
                }
            }
            0x7E => {
                let site = op_field(instr)?;
                frame
                    .stack
                    .push(self.statics.load(&site.type_full_name, &site.name));
                Ok(Flow::Next)
            }
            0x80 => {
                let site = op_field(instr)?;
                let value = frame.stack.pop()?;
                self.statics.store(&site.type_full_name, &site.name, value);
                Ok(Flow::Next)
            }

            // ================================================================
            // Arrays
            // ================================================================
            0x8D => {
                let length = i64::from(frame.stack.pop()?.as_i32()?);
                let length = usize::try_from(length)
                    .map_err(|_| RuntimeError::IndexOutOfRange { index: length, length: 0 })?;
                let handle = self.heap.alloc_array(length);
                frame.stack.push(Value::Array(handle));
                Ok(Flow::Next)
            }
            0x8E => {
                let handle = pop_array(frame)?;
                let length = self.heap.array_len(handle)?;
                frame.stack.push(Value::Int32(length as i32));
                Ok(Flow::Next)
            }
            0x90..=0x9A | 0xA3 => {
                // ldelem.* / ldelem: index then array
                let index = i64::from(frame.stack.pop()?.as_i32()?);
                let handle = pop_array(frame)?;
                frame.stack.push(self.heap.array_get(handle, index)?);
                Ok(Flow::Next)
            }
            0x9B..=0xA2 | 0xA4 => {
                // stelem.* / stelem: value, index, array
                let value = frame.stack.pop()?;
                let index = i64::from(frame.stack.pop()?.as_i32()?);
                let handle = pop_array(frame)?;
                self.heap.array_set(handle, index, value)?;
                Ok(Flow::Next)
            }

            // ================================================================
            // Objects, boxing, reflection
            // ================================================================
            0x8C | 0x79 | 0xA5 => Ok(Flow::Next), // box / unbox / unbox.any: value and reference kinds share the tagging
            0x74 => {
                // castclass
                let value = frame.stack.pop()?;
                match &value {
                    Value::Null
                    | Value::Object { .. }
                    | Value::Str(_)
                    | Value::Array(_)
                    | Value::Type(_) => {
                        frame.stack.push(value);
                        Ok(Flow::Next)
                    }
                    other => Err(RuntimeError::InvalidCast(format!(
                        "cannot cast {other} to {}",
                        op_type(instr)?.full_name()
                    ))),
                }
            }
            0x75 => {
                // isinst
                let site = op_type(instr)?;
                let value = frame.stack.pop()?;
                let result = match &value {
                    Value::Null => Value::Null,
                    Value::Object { ty, .. } => {
                        if ty.full_name() == site.full_name() || site.full_name() == "System.Object"
                        {
                            value
                        } else {
                            Value::Null
                        }
                    }
                    Value::Str(_) => {
                        if site.full_name() == "System.String" || site.full_name() == "System.Object"
                        {
                            value
                        } else {
                            Value::Null
                        }
                    }
                    _ => value,
                };
                frame.stack.push(result);
                Ok(Flow::Next)
            }
            0xD0 => {
                // ldtoken: build a runtime type handle
                let site = op_type(instr)?;
                let handle = self.heap.alloc_object(Arc::clone(&self.handle_ty));
                self.heap
                    .store_field(handle, "_name", Value::Str(Arc::from(site.name.as_str())))?;
                self.heap.store_field(
                    handle,
                    "_namespace",
                    Value::Str(Arc::from(site.namespace.as_str())),
                )?;
                frame.stack.push(Value::Object {
                    handle,
                    ty: Arc::clone(&self.handle_ty),
                });
                Ok(Flow::Next)
            }
            0x71 => {
                // ldobj: the supported inputs use it to re-read the value
                // below the working set
                let bottom = frame.stack.bottom()?.clone();
                frame.stack.push(bottom);
                Ok(Flow::Next)
            }
            0x54 => {
                // stind.i4: write through a slot address
                let value = frame.stack.pop()?;
                let address = frame.stack.pop()?;
                self.store_through(frame, &address, Value::Int32(value.as_i32()?))?;
                Ok(Flow::Next)
            }

            // ================================================================
            // Exceptions
            // ================================================================
            0x7A => {
                let exception = frame.stack.pop()?;
                if exception.is_null() {
                    return Err(RuntimeError::NullReference);
                }
                Ok(Flow::Throw(exception))
            }
            0xDC => Ok(Flow::EndFinally),
            0xDD | 0xDE => Ok(Flow::Leave(op_branch(instr)?)),

            _ => Err(RuntimeError::Internal(format!(
                "unsupported opcode '{}'",
                instr.mnemonic
            ))),
        }
    }

    /// Executes a `0xFE`-prefixed instruction.
    fn exec_fe(&mut self, frame: &mut Frame, instr: &Instruction) -> Result<Flow, RuntimeError> {
        match instr.opcode {
            0x01 => self.compare(frame, CompareOp::Eq),
            0x02 => self.compare(frame, CompareOp::Gt),
            0x03 => self.compare(frame, CompareOp::GtUn),
            0x04 => self.compare(frame, CompareOp::Lt),
            0x05 => self.compare(frame, CompareOp::LtUn),
            0x06 => {
                // ldftn: a method pointer boxed as System.IntPtr
                let site = op_call(instr)?;
                let resolution = self.resolver.resolve(site, CallKind::Direct, None)?;
                let method = match resolution {
                    Resolution::Method(m) => m,
                    Resolution::ObjectCtorNop => {
                        return Err(RuntimeError::Internal(
                            "ldftn cannot target System.Object..ctor".to_string(),
                        ))
                    }
                };
                let boxed = self.wrap_method_ptr(method);
                frame.stack.push(boxed);
                Ok(Flow::Next)
            }
            0x09 => {
                let value = frame.arg(usize::from(op_var(instr)?))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x0A => self.load_arg_address(frame, usize::from(op_var(instr)?)),
            0x0B => {
                let value = frame.stack.pop()?;
                frame.set_arg(usize::from(op_var(instr)?), value)?;
                Ok(Flow::Next)
            }
            0x0C => {
                let value = frame.local(usize::from(op_var(instr)?))?.clone();
                frame.stack.push(value);
                Ok(Flow::Next)
            }
            0x0D => self.load_local_address(frame, usize::from(op_var(instr)?)),
            0x0E => {
                let value = frame.stack.pop()?;
                frame.set_local(usize::from(op_var(instr)?), value)?;
                Ok(Flow::Next)
            }
            0x15 => {
                // initobj: the addressed slot and the stack entry both
                // become null
                let address = frame.stack.pop()?;
                let _ = self.store_through(frame, &address, Value::Null);
                frame.stack.push(Value::Null);
                Ok(Flow::Next)
            }
            0x16 | 0x1E => Ok(Flow::Next), // constrained. / readonly. prefixes

            _ => Err(RuntimeError::Internal(format!(
                "unsupported opcode '{}'",
                instr.mnemonic
            ))),
        }
    }

    // ── Handler helpers ─────────────────────────────────────────────────

    fn binary(&mut self, frame: &mut Frame, op: BinaryOp) -> Result<Flow, RuntimeError> {
        let rhs = frame.stack.pop()?;
        let lhs = frame.stack.pop()?;
        frame.stack.push(lhs.binary_op(&rhs, op)?);
        Ok(Flow::Next)
    }

    fn compare(&mut self, frame: &mut Frame, op: CompareOp) -> Result<Flow, RuntimeError> {
        let rhs = frame.stack.pop()?;
        let lhs = frame.stack.pop()?;
        let result = lhs.compare(&rhs, op)?;
        frame.stack.push(Value::Int32(i32::from(result)));
        Ok(Flow::Next)
    }

    fn convert(&mut self, frame: &mut Frame, kind: ConvKind) -> Result<Flow, RuntimeError> {
        let value = frame.stack.pop()?;
        frame.stack.push(value.convert(kind)?);
        Ok(Flow::Next)
    }

    fn branch_compare(
        &mut self,
        frame: &mut Frame,
        body: &MethodBody,
        instr: &Instruction,
        op: CompareOp,
    ) -> Result<Flow, RuntimeError> {
        let rhs = frame.stack.pop()?;
        let lhs = frame.stack.pop()?;
        if lhs.compare(&rhs, op)? {
            Ok(Flow::Jump(target_index(body, op_branch(instr)?)?))
        } else {
            Ok(Flow::Next)
        }
    }

    /// Addresses are pointer-sized integers encoding the slot: locals as
    /// the index, arguments as `-(index + 1)`.
    fn load_local_address(&mut self, frame: &mut Frame, index: usize) -> Result<Flow, RuntimeError> {
        // An address to an uninitialized slot materializes a null first
        if matches!(frame.local(index)?, Value::None) {
            frame.set_local(index, Value::Null)?;
        }
        frame.stack.push(Value::IntPtr(index as i64));
        Ok(Flow::Next)
    }

    fn load_arg_address(&mut self, frame: &mut Frame, index: usize) -> Result<Flow, RuntimeError> {
        frame.arg(index)?;
        frame.stack.push(Value::IntPtr(-(index as i64) - 1));
        Ok(Flow::Next)
    }

    fn store_through(
        &mut self,
        frame: &mut Frame,
        address: &Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match address {
            Value::IntPtr(slot) if *slot >= 0 => frame.set_local(*slot as usize, value),
            Value::IntPtr(slot) => frame.set_arg((-slot - 1) as usize, value),
            other => Err(RuntimeError::Internal(format!(
                "cannot store through {other}"
            ))),
        }
    }

    /// Receivers produced by `ldloca`/`ldarga` (value-type accessor calls)
    /// are slot addresses; dereference them before the callee sees them.
    fn deref_receiver(frame: &Frame, receiver: Value) -> Result<Value, RuntimeError> {
        match receiver {
            Value::IntPtr(slot) if slot >= 0 => frame.local(slot as usize).cloned(),
            Value::IntPtr(slot) => frame.arg((-slot - 1) as usize).cloned(),
            other => Ok(other),
        }
    }

    fn load_instance_field(
        &mut self,
        target: &Value,
        site: &FieldSite,
    ) -> Result<Value, RuntimeError> {
        match target {
            Value::Object { handle, .. } => self.heap.load_field(*handle, &site.name),
            Value::Null => Err(RuntimeError::NullReference),
            other => Err(RuntimeError::Internal(format!(
                "ldfld target is not an object: {other}"
            ))),
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    /// Executes a `call`/`callvirt`.
    fn do_call(
        &mut self,
        frame: &mut Frame,
        site: &CallSite,
        virtual_call: bool,
    ) -> Result<(), RuntimeError> {
        let kind = if virtual_call {
            CallKind::Virtual
        } else {
            CallKind::Direct
        };

        let receiver_peek = if site.sig.has_this {
            frame.stack.peek(site.sig.param_count()).ok().cloned()
        } else {
            None
        };

        let resolution = match self.resolver.resolve(site, kind, receiver_peek.as_ref()) {
            Ok(resolution) => resolution,
            Err(not_found @ RuntimeError::MethodNotFound { .. }) => {
                // Base-library surface: the registry stands in for
                // assemblies that only exist as internal methods
                let canonical = format!("{}.{}", site.type_full_name(), site.method_name);
                if self.internals.contains(&canonical) {
                    return self.call_internal_site(frame, site, &canonical);
                }
                return Err(not_found);
            }
            Err(error) => return Err(error),
        };

        match resolution {
            Resolution::ObjectCtorNop => {
                if site.sig.has_this {
                    frame.stack.pop()?;
                }
                Ok(())
            }
            Resolution::Method(method) => {
                let params = frame.stack.pop_slice(method.param_count())?;
                let receiver = if method.sig.has_this && !method.is_static() {
                    let popped = frame.stack.pop()?;
                    let receiver = Self::deref_receiver(frame, popped)?;
                    if receiver.is_null() {
                        return Err(RuntimeError::NullReference);
                    }
                    Some(receiver)
                } else {
                    None
                };

                let result = self.call_method(&method, receiver, params)?;
                if method.sig.returns_value() {
                    frame.stack.push(result.unwrap_or(Value::Null));
                }
                Ok(())
            }
        }
    }

    /// Dispatches a call site straight to the internal registry.
    fn call_internal_site(
        &mut self,
        frame: &mut Frame,
        site: &CallSite,
        canonical: &str,
    ) -> Result<(), RuntimeError> {
        let params = frame.stack.pop_slice(site.sig.param_count())?;
        let receiver = if site.sig.has_this {
            let popped = frame.stack.pop()?;
            let receiver = Self::deref_receiver(frame, popped)?;
            if receiver.is_null() {
                return Err(RuntimeError::NullReference);
            }
            Some(receiver)
        } else {
            None
        };

        let result = self.invoke_internal(canonical, receiver, params, site.to_string())?;
        if site.sig.returns_value() {
            frame.stack.push(result.unwrap_or(Value::Null));
        }
        Ok(())
    }

    /// Executes `newobj`: allocate, construct, push.
    fn do_newobj(&mut self, frame: &mut Frame, site: &CallSite) -> Result<(), RuntimeError> {
        let ty = match self.resolver.find_type(&site.type_full_name()) {
            Some(ty) => Arc::clone(ty),
            // Runtime-provided types (exceptions and friends) have no
            // loaded descriptor
            None => TypeDesc::synthetic(&site.namespace, &site.type_name),
        };

        let handle = self.heap.alloc_object(Arc::clone(&ty));
        let object = Value::Object { handle, ty };
        let params = frame.stack.pop_slice(site.sig.param_count())?;

        match self.resolver.resolve(site, CallKind::Constructor, None) {
            Ok(Resolution::ObjectCtorNop) => {}
            Ok(Resolution::Method(ctor)) => {
                self.call_method(&ctor, Some(object.clone()), params)?;
            }
            Err(not_found @ RuntimeError::MethodNotFound { .. }) => {
                let canonical = format!("{}.{}", site.type_full_name(), site.method_name);
                if self.internals.contains(&canonical) {
                    self.invoke_internal(&canonical, Some(object.clone()), params, site.to_string())?;
                } else {
                    return Err(not_found);
                }
            }
            Err(error) => return Err(error),
        }

        frame.stack.push(object);
        Ok(())
    }

    /// Boxes a method descriptor the way `ldftn` publishes it: a
    /// `System.IntPtr` object whose `PtrToMethod` field is the descriptor.
    pub(crate) fn wrap_method_ptr(&mut self, method: Arc<MethodDesc>) -> Value {
        let handle = self.heap.alloc_object(Arc::clone(&self.intptr_ty));
        let _ = self
            .heap
            .store_field(handle, "PtrToMethod", Value::MethodPtr(method));
        Value::Object {
            handle,
            ty: Arc::clone(&self.intptr_ty),
        }
    }

    /// Allocates a `System.Type` object for reflection results.
    pub(crate) fn boxed_type_object(&mut self, namespace: &str, name: &str) -> Value {
        let handle = self.heap.alloc_object(Arc::clone(&self.type_ty));
        let _ = self
            .heap
            .store_field(handle, "_name", Value::Str(Arc::from(name)));
        let _ = self
            .heap
            .store_field(handle, "_namespace", Value::Str(Arc::from(namespace)));
        Value::Object {
            handle,
            ty: Arc::clone(&self.type_ty),
        }
    }

    /// Builds a managed error for an exception the host raises on behalf
    /// of the program (parse failures and the like).
    pub(crate) fn raise(&mut self, namespace: &str, name: &str, message: &str) -> RuntimeError {
        let ty = TypeDesc::synthetic(namespace, name);
        let handle = self.heap.alloc_object(Arc::clone(&ty));
        let _ = self
            .heap
            .store_field(handle, "_message", Value::Str(Arc::from(message)));
        RuntimeError::Managed {
            exception: Value::Object { handle, ty: Arc::clone(&ty) },
            message: message.to_string(),
            type_name: ty.full_name(),
        }
    }
}

fn join_args(receiver: Option<Value>, mut params: Vec<Value>) -> Vec<Value> {
    match receiver {
        Some(receiver) => {
            let mut args = Vec::with_capacity(params.len() + 1);
            args.push(receiver);
            args.append(&mut params);
            args
        }
        None => params,
    }
}

fn target_index(body: &MethodBody, target: u32) -> Result<usize, RuntimeError> {
    body.index_of(target)
        .map_err(|e| RuntimeError::Internal(e.to_string()))
}

fn catch_matches(expected: Option<&TypeSite>, error: &RuntimeError) -> bool {
    let Some(site) = expected else {
        return true;
    };
    let full = site.full_name();
    if full == "System.Exception" || full == "System.Object" {
        return true;
    }

    match error {
        RuntimeError::Managed { type_name, .. } => *type_name == full || site.name == *type_name,
        other => site.name == other.kind() || full == format!("System.{}", other.kind()),
    }
}

fn operand_error(instr: &Instruction, expected: &str) -> RuntimeError {
    RuntimeError::Internal(format!(
        "instruction '{}' carries no {expected} operand",
        instr.mnemonic
    ))
}

fn op_var(instr: &Instruction) -> Result<u16, RuntimeError> {
    match &instr.operand {
        Operand::Var(index) => Ok(*index),
        _ => Err(operand_error(instr, "variable")),
    }
}

fn op_i32(instr: &Instruction) -> Result<i32, RuntimeError> {
    match &instr.operand {
        Operand::Int32(value) => Ok(*value),
        _ => Err(operand_error(instr, "int32")),
    }
}

fn op_i64(instr: &Instruction) -> Result<i64, RuntimeError> {
    match &instr.operand {
        Operand::Int64(value) => Ok(*value),
        _ => Err(operand_error(instr, "int64")),
    }
}

fn op_f32(instr: &Instruction) -> Result<f32, RuntimeError> {
    match &instr.operand {
        Operand::Float32(value) => Ok(*value),
        _ => Err(operand_error(instr, "float32")),
    }
}

fn op_f64(instr: &Instruction) -> Result<f64, RuntimeError> {
    match &instr.operand {
        Operand::Float64(value) => Ok(*value),
        _ => Err(operand_error(instr, "float64")),
    }
}

fn op_branch(instr: &Instruction) -> Result<u32, RuntimeError> {
    match &instr.operand {
        Operand::Branch(target) => Ok(*target),
        _ => Err(operand_error(instr, "branch target")),
    }
}

fn op_switch(instr: &Instruction) -> Result<&[u32], RuntimeError> {
    match &instr.operand {
        Operand::Switch(targets) => Ok(targets),
        _ => Err(operand_error(instr, "jump table")),
    }
}

fn op_string(instr: &Instruction) -> Result<Arc<str>, RuntimeError> {
    match &instr.operand {
        Operand::String(text) => Ok(Arc::clone(text)),
        _ => Err(operand_error(instr, "string")),
    }
}

fn op_call(instr: &Instruction) -> Result<&CallSite, RuntimeError> {
    match &instr.operand {
        Operand::Call(site) => Ok(site),
        _ => Err(operand_error(instr, "call site")),
    }
}

fn op_field(instr: &Instruction) -> Result<&FieldSite, RuntimeError> {
    match &instr.operand {
        Operand::Field(site) => Ok(site),
        _ => Err(operand_error(instr, "field reference")),
    }
}

fn op_type(instr: &Instruction) -> Result<&TypeSite, RuntimeError> {
    match &instr.operand {
        Operand::Type(site) => Ok(site),
        _ => Err(operand_error(instr, "type reference")),
    }
}

fn pop_array(frame: &mut Frame) -> Result<usize, RuntimeError> {
    match frame.stack.pop()? {
        Value::Array(handle) => Ok(handle),
        Value::Null => Err(RuntimeError::NullReference),
        other => Err(RuntimeError::Internal(format!(
            "expected an array reference, found {other}"
        ))),
    }
}
