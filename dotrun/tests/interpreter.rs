//! End-to-end interpreter scenarios over in-memory assemblies.
//!
//! The fixture builder synthesizes descriptor graphs and instruction
//! streams directly (no PE files involved), wires them into an engine with
//! captured stdio, and asserts on the exact program output.

use std::{
    io::Write,
    sync::{Arc, Mutex, OnceLock},
};

use dotrun::{
    disassembler::{opcodes, ClauseKind, ExceptionClause, Instruction, MethodBody, Operand},
    engine::Engine,
    metadata::{
        signatures::{ElemKind, MethodSig},
        token::Token,
        typesystem::{
            CallSite, FieldDesc, FieldSite, MethodAttributes, MethodDesc, MethodImplAttributes,
            TypeAttributes, TypeDesc, TypeSite,
        },
    },
    CilImage,
};

// ── Fixture: captured output ────────────────────────────────────────────

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Fixture: instruction and method builders ────────────────────────────

fn lookup(mnemonic: &str) -> (u8, u8) {
    for opcode in 0..=0xE0u8 {
        if let Some((name, _)) = opcodes::spec(opcode) {
            if name == mnemonic {
                return (0, opcode);
            }
        }
    }
    for opcode in 0..=0x30u8 {
        if let Some((name, _)) = opcodes::spec_fe(opcode) {
            if name == mnemonic {
                return (opcodes::FE_PREFIX, opcode);
            }
        }
    }
    panic!("unknown mnemonic '{mnemonic}'");
}

/// Builds an instruction with synthetic unit-sized encoding; offsets equal
/// indexes, so branch operands name the target instruction's index.
fn instr(mnemonic: &'static str, operand: Operand) -> Instruction {
    let (prefix, opcode) = lookup(mnemonic);
    Instruction {
        mnemonic,
        opcode,
        prefix,
        offset: 0,
        index: 0,
        size: 1,
        operand,
    }
}

fn i(mnemonic: &'static str) -> Instruction {
    instr(mnemonic, Operand::None)
}

fn body_of(mut instructions: Vec<Instruction>, handlers: Vec<ExceptionClause>) -> MethodBody {
    for (index, instruction) in instructions.iter_mut().enumerate() {
        instruction.offset = index as u32;
        instruction.index = index as u32;
    }
    MethodBody::from_parts(instructions, Vec::new(), handlers)
}

fn sig(has_this: bool, params: Vec<ElemKind>, ret: ElemKind) -> MethodSig {
    MethodSig {
        has_this,
        params,
        ret,
    }
}

fn method(
    declaring: (&str, &str),
    name: &str,
    signature: MethodSig,
    instructions: Vec<Instruction>,
    handlers: Vec<ExceptionClause>,
) -> Arc<MethodDesc> {
    let attributes = if signature.has_this {
        MethodAttributes::empty()
    } else {
        MethodAttributes::STATIC
    };
    let sig_string = signature.to_string();
    let desc = Arc::new(MethodDesc {
        token: Token::new(0x0600_0001),
        name: name.to_string(),
        declaring_namespace: declaring.0.to_string(),
        declaring_name: declaring.1.to_string(),
        sig: signature,
        sig_string,
        rva: 0,
        param_list: 0,
        attributes,
        impl_attributes: MethodImplAttributes::empty(),
        body: OnceLock::new(),
    });
    desc.body
        .set(Arc::new(body_of(instructions, handlers)))
        .unwrap();
    desc
}

fn runtime_method(declaring: (&str, &str), name: &str, signature: MethodSig) -> Arc<MethodDesc> {
    let sig_string = signature.to_string();
    Arc::new(MethodDesc {
        token: Token::new(0x0600_0002),
        name: name.to_string(),
        declaring_namespace: declaring.0.to_string(),
        declaring_name: declaring.1.to_string(),
        sig: signature,
        sig_string,
        rva: 0,
        param_list: 0,
        attributes: MethodAttributes::empty(),
        impl_attributes: MethodImplAttributes::RUNTIME,
        body: OnceLock::new(),
    })
}

fn build_type(
    namespace: &str,
    name: &str,
    fields: Vec<Arc<FieldDesc>>,
    methods: Vec<Arc<MethodDesc>>,
) -> Arc<TypeDesc> {
    Arc::new(TypeDesc {
        token: Token::new(0x0200_0002),
        namespace: namespace.to_string(),
        name: name.to_string(),
        attributes: TypeAttributes::empty(),
        assembly: "app".to_string(),
        fields,
        methods,
    })
}

fn call_site(
    declaring: (&str, &str),
    name: &str,
    signature: MethodSig,
) -> CallSite {
    let sig_string = signature.to_string();
    CallSite {
        namespace: declaring.0.to_string(),
        type_name: declaring.1.to_string(),
        method_name: name.to_string(),
        sig: signature,
        sig_string,
        rva: 0,
        param_list: None,
    }
}

fn write_line(param: ElemKind) -> Operand {
    Operand::Call(call_site(
        ("System", "Console"),
        "WriteLine",
        sig(false, vec![param], ElemKind::Void),
    ))
}

fn run_types(types: Vec<Arc<TypeDesc>>, entry: Arc<MethodDesc>, args: &[String]) -> (String, String) {
    let image = CilImage::from_parts("app", types, Some(entry), Vec::new());
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::new(image, dir.path()).unwrap();

    let out = Capture::default();
    let err = Capture::default();
    engine.set_stdout(Box::new(out.clone()));
    engine.set_stderr(Box::new(err.clone()));

    engine.start(args).unwrap();
    (out.text(), err.text())
}

fn run_main(instructions: Vec<Instruction>, handlers: Vec<ExceptionClause>) -> (String, String) {
    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        instructions,
        handlers,
    );
    let program = build_type("", "Program", Vec::new(), vec![Arc::clone(&main)]);
    run_types(vec![program], main, &[])
}

// ── End-to-end scenarios ────────────────────────────────────────────────

#[test]
fn hello_world() {
    let (out, err) = run_main(
        vec![
            instr("ldstr", Operand::String("Hello, World!".into())),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "Hello, World!\n");
    assert_eq!(err, "");
}

#[test]
fn arithmetic() {
    // (2 + 3) * 4 - 5 / 2
    let (out, _) = run_main(
        vec![
            i("ldc.i4.2"),
            i("ldc.i4.3"),
            i("add"),
            i("ldc.i4.4"),
            i("mul"),
            i("ldc.i4.5"),
            i("ldc.i4.2"),
            i("div"),
            i("sub"),
            instr("call", write_line(ElemKind::I4)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "18\n");
}

#[test]
fn loop_sum() {
    // for (i = 1; i < 11; i++) sum += i
    let (out, _) = run_main(
        vec![
            i("ldc.i4.0"),                          //  0: sum = 0
            i("stloc.0"),                           //  1
            i("ldc.i4.1"),                          //  2: i = 1
            i("stloc.1"),                           //  3
            instr("br.s", Operand::Branch(13)),     //  4: -> condition
            i("ldloc.0"),                           //  5: sum += i
            i("ldloc.1"),                           //  6
            i("add"),                               //  7
            i("stloc.0"),                           //  8
            i("ldloc.1"),                           //  9: i += 1
            i("ldc.i4.1"),                          // 10
            i("add"),                               // 11
            i("stloc.1"),                           // 12
            i("ldloc.1"),                           // 13: i < 11 ?
            instr("ldc.i4.s", Operand::Int32(11)),  // 14
            instr("blt", Operand::Branch(5)),       // 15
            i("ldloc.0"),                           // 16
            instr("call", write_line(ElemKind::I4)), // 17
            i("ret"),                               // 18
        ],
        Vec::new(),
    );
    assert_eq!(out, "55\n");
}

#[test]
fn string_methods() {
    // "Hello".ToUpper() + " " + "World".Substring(0, 3)
    let to_upper = call_site(
        ("System", "String"),
        "ToUpper",
        sig(true, Vec::new(), ElemKind::String),
    );
    let substring = call_site(
        ("System", "String"),
        "Substring",
        sig(true, vec![ElemKind::I4, ElemKind::I4], ElemKind::String),
    );
    let concat = call_site(
        ("System", "String"),
        "Concat",
        sig(
            false,
            vec![ElemKind::String, ElemKind::String, ElemKind::String],
            ElemKind::String,
        ),
    );

    let (out, _) = run_main(
        vec![
            instr("ldstr", Operand::String("Hello".into())),
            instr("callvirt", Operand::Call(to_upper)),
            instr("ldstr", Operand::String(" ".into())),
            instr("ldstr", Operand::String("World".into())),
            i("ldc.i4.0"),
            i("ldc.i4.3"),
            instr("call", Operand::Call(substring)),
            instr("call", Operand::Call(concat)),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "HELLO Wor\n");
}

#[test]
fn virtual_dispatch_selects_the_override() {
    let speak_sig = || sig(true, Vec::new(), ElemKind::Void);
    let ctor_sig = || sig(true, Vec::new(), ElemKind::Void);

    let animal_speak = method(
        ("", "Animal"),
        "Speak",
        speak_sig(),
        vec![
            instr("ldstr", Operand::String("...".into())),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    let dog_speak = method(
        ("", "Dog"),
        "Speak",
        speak_sig(),
        vec![
            instr("ldstr", Operand::String("Woof".into())),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    let object_ctor = call_site(
        ("System", "Object"),
        ".ctor",
        sig(true, Vec::new(), ElemKind::Void),
    );
    let dog_ctor = method(
        ("", "Dog"),
        ".ctor",
        ctor_sig(),
        vec![
            i("ldarg.0"),
            instr("call", Operand::Call(object_ctor)),
            i("ret"),
        ],
        Vec::new(),
    );

    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            instr("newobj", Operand::Call(call_site(("", "Dog"), ".ctor", ctor_sig()))),
            i("stloc.0"),
            i("ldloc.0"),
            // The static type at the call site is Animal
            instr("callvirt", Operand::Call(call_site(("", "Animal"), "Speak", speak_sig()))),
            i("ret"),
        ],
        Vec::new(),
    );

    let types = vec![
        build_type("", "Animal", Vec::new(), vec![animal_speak]),
        build_type("", "Dog", Vec::new(), vec![dog_speak, dog_ctor]),
        build_type("", "Program", Vec::new(), vec![Arc::clone(&main)]),
    ];
    let (out, err) = run_types(types, main, &[]);
    assert_eq!(out, "Woof\n");
    assert_eq!(err, "");
}

#[test]
fn array_sum() {
    let int32_site = || {
        Operand::Type(TypeSite {
            namespace: "System".to_string(),
            name: "Int32".to_string(),
        })
    };

    let (out, _) = run_main(
        vec![
            i("ldc.i4.3"),
            instr("newarr", int32_site()),
            i("stloc.0"),
            i("ldloc.0"),
            i("ldc.i4.0"),
            instr("ldc.i4.s", Operand::Int32(10)),
            i("stelem.i4"),
            i("ldloc.0"),
            i("ldc.i4.1"),
            instr("ldc.i4.s", Operand::Int32(20)),
            i("stelem.i4"),
            i("ldloc.0"),
            i("ldc.i4.2"),
            instr("ldc.i4.s", Operand::Int32(30)),
            i("stelem.i4"),
            i("ldloc.0"),
            i("ldc.i4.0"),
            i("ldelem.i4"),
            i("ldloc.0"),
            i("ldc.i4.1"),
            i("ldelem.i4"),
            i("add"),
            i("ldloc.0"),
            i("ldc.i4.2"),
            i("ldelem.i4"),
            i("add"),
            instr("call", write_line(ElemKind::I4)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "60\n");
}

// ── Call protocol and frames ────────────────────────────────────────────

#[test]
fn call_only_consumes_its_parameters() {
    // The stack below a call's arguments survives the call untouched
    let add_sig = sig(false, vec![ElemKind::I4, ElemKind::I4], ElemKind::I4);
    let helper = method(
        ("", "Program"),
        "Add",
        add_sig.clone(),
        vec![i("ldarg.0"), i("ldarg.1"), i("add"), i("ret")],
        Vec::new(),
    );

    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            i("ldc.i4.1"),
            i("ldc.i4.2"),
            i("ldc.i4.3"),
            instr("call", Operand::Call(call_site(("", "Program"), "Add", add_sig))),
            i("add"),
            instr("call", write_line(ElemKind::I4)),
            i("ret"),
        ],
        Vec::new(),
    );

    let program = build_type(
        "",
        "Program",
        Vec::new(),
        vec![helper, Arc::clone(&main)],
    );
    let (out, _) = run_types(vec![program], main, &[]);
    assert_eq!(out, "6\n");
}

#[test]
fn static_fields_round_trip() {
    let total = FieldSite {
        type_full_name: "Counters".to_string(),
        name: "total".to_string(),
    };
    let (out, _) = run_main(
        vec![
            instr("ldc.i4.s", Operand::Int32(42)),
            instr("stsfld", Operand::Field(total.clone())),
            instr("ldsfld", Operand::Field(total)),
            instr("call", write_line(ElemKind::I4)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "42\n");
}

#[test]
fn program_arguments_arrive_as_a_string_array() {
    let main = method(
        ("", "Program"),
        "Main",
        sig(
            false,
            vec![ElemKind::SzArray(Box::new(ElemKind::String))],
            ElemKind::Void,
        ),
        vec![
            i("ldarg.0"),
            i("ldc.i4.0"),
            i("ldelem.ref"),
            instr("call", write_line(ElemKind::String)),
            i("ldarg.0"),
            i("ldlen"),
            instr("call", write_line(ElemKind::I4)),
            i("ret"),
        ],
        Vec::new(),
    );
    let program = build_type("", "Program", Vec::new(), vec![Arc::clone(&main)]);
    let (out, _) = run_types(vec![program], main, &["first".to_string(), "second".to_string()]);
    assert_eq!(out, "first\n2\n");
}

// ── Exceptions ──────────────────────────────────────────────────────────

#[test]
fn thrown_exception_reaches_the_catch_handler() {
    let exception_ctor = call_site(
        ("System", "Exception"),
        ".ctor",
        sig(true, vec![ElemKind::String], ElemKind::Void),
    );
    let get_message = call_site(
        ("System", "Exception"),
        "get_Message",
        sig(true, Vec::new(), ElemKind::String),
    );

    let handlers = vec![ExceptionClause {
        kind: ClauseKind::Catch(None),
        try_offset: 0,
        try_length: 3,
        handler_offset: 3,
        handler_length: 3,
    }];

    let (out, err) = run_main(
        vec![
            instr("ldstr", Operand::String("boom".into())),  // 0
            instr("newobj", Operand::Call(exception_ctor)),  // 1
            i("throw"),                                      // 2
            instr("callvirt", Operand::Call(get_message)),   // 3: handler
            instr("call", write_line(ElemKind::String)),     // 4
            instr("leave.s", Operand::Branch(6)),            // 5
            i("ret"),                                        // 6
        ],
        handlers,
    );
    assert_eq!(out, "boom\n");
    assert_eq!(err, "");
}

#[test]
fn finally_runs_on_leave() {
    let handlers = vec![ExceptionClause {
        kind: ClauseKind::Finally,
        try_offset: 0,
        try_length: 3,
        handler_offset: 3,
        handler_length: 3,
    }];

    let (out, _) = run_main(
        vec![
            instr("ldstr", Operand::String("in".into())),    // 0
            instr("call", write_line(ElemKind::String)),     // 1
            instr("leave.s", Operand::Branch(6)),            // 2
            instr("ldstr", Operand::String("fin".into())),   // 3: finally
            instr("call", write_line(ElemKind::String)),     // 4
            i("endfinally"),                                 // 5
            instr("ldstr", Operand::String("done".into())),  // 6
            instr("call", write_line(ElemKind::String)),     // 7
            i("ret"),                                        // 8
        ],
        handlers,
    );
    assert_eq!(out, "in\nfin\ndone\n");
}

#[test]
fn unhandled_error_prints_the_banner_and_trace() {
    let (out, err) = run_main(
        vec![i("ldc.i4.1"), i("ldc.i4.0"), i("div"), i("ret")],
        Vec::new(),
    );
    assert_eq!(out, "");
    assert!(
        err.starts_with(
            "A ArithmeticError has occured in app.exe. The error is: attempted to divide by zero"
        ),
        "unexpected banner: {err}"
    );
    assert!(err.contains("at Program.Main"), "missing trace: {err}");
}

#[test]
fn entry_point_is_required() {
    let image = CilImage::from_parts("app", Vec::new(), None, Vec::new());
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::new(image, dir.path()).unwrap();

    let err = Capture::default();
    engine.set_stderr(Box::new(err.clone()));
    engine.start(&[]).unwrap();

    assert!(err
        .text()
        .starts_with("A EntryPointNotFoundException has occured in app.exe."));
}

// ── Delegates and reflection ────────────────────────────────────────────

#[test]
fn delegate_invocation_reenters_the_interpreter() {
    let hello = method(
        ("", "Program"),
        "Hello",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            instr("ldstr", Operand::String("hi".into())),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );

    let greeter_ctor = runtime_method(
        ("", "Greeter"),
        ".ctor",
        sig(true, vec![ElemKind::Object, ElemKind::I], ElemKind::Void),
    );
    let greeter_invoke = runtime_method(("", "Greeter"), "Invoke", sig(true, Vec::new(), ElemKind::Void));

    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            i("ldnull"),
            instr(
                "ldftn",
                Operand::Call(call_site(("", "Program"), "Hello", sig(false, Vec::new(), ElemKind::Void))),
            ),
            instr(
                "newobj",
                Operand::Call(call_site(
                    ("", "Greeter"),
                    ".ctor",
                    sig(true, vec![ElemKind::Object, ElemKind::I], ElemKind::Void),
                )),
            ),
            instr(
                "callvirt",
                Operand::Call(call_site(("", "Greeter"), "Invoke", sig(true, Vec::new(), ElemKind::Void))),
            ),
            i("ret"),
        ],
        Vec::new(),
    );

    let types = vec![
        build_type("", "Greeter", Vec::new(), vec![greeter_ctor, greeter_invoke]),
        build_type("", "Program", Vec::new(), vec![hello, Arc::clone(&main)]),
    ];
    let (out, err) = run_types(types, main, &[]);
    assert_eq!(out, "hi\n");
    assert_eq!(err, "");
}

#[test]
fn get_type_reports_the_declared_type() {
    let ctor_sig = || sig(true, Vec::new(), ElemKind::Void);
    let object_ctor = call_site(("System", "Object"), ".ctor", ctor_sig());
    let dog_ctor = method(
        ("", "Dog"),
        ".ctor",
        ctor_sig(),
        vec![i("ldarg.0"), instr("call", Operand::Call(object_ctor)), i("ret")],
        Vec::new(),
    );

    let get_type = call_site(
        ("System", "Object"),
        "GetType",
        sig(true, Vec::new(), ElemKind::Class(Token::new(0x0100_0001))),
    );
    let get_full_name = call_site(
        ("System", "Type"),
        "get_FullName",
        sig(true, Vec::new(), ElemKind::String),
    );

    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            instr("newobj", Operand::Call(call_site(("", "Dog"), ".ctor", ctor_sig()))),
            instr("callvirt", Operand::Call(get_type)),
            instr("callvirt", Operand::Call(get_full_name)),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );

    let types = vec![
        build_type("", "Dog", Vec::new(), vec![dog_ctor]),
        build_type("", "Program", Vec::new(), vec![Arc::clone(&main)]),
    ];
    let (out, _) = run_types(types, main, &[]);
    assert_eq!(out, "Dog\n");
}

#[test]
fn ldtoken_builds_a_runtime_type_handle() {
    let handle_field = |name: &str| FieldSite {
        type_full_name: "System.RuntimeTypeHandle".to_string(),
        name: name.to_string(),
    };

    let (out, _) = run_main(
        vec![
            instr(
                "ldtoken",
                Operand::Type(TypeSite {
                    namespace: "Zoo".to_string(),
                    name: "Animal".to_string(),
                }),
            ),
            i("dup"),
            instr("ldfld", Operand::Field(handle_field("_namespace"))),
            instr("call", write_line(ElemKind::String)),
            instr("ldfld", Operand::Field(handle_field("_name"))),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    assert_eq!(out, "Zoo\nAnimal\n");
}

// ── Cancellation ────────────────────────────────────────────────────────

#[test]
fn cleared_cancel_token_stops_before_the_first_instruction() {
    let main = method(
        ("", "Program"),
        "Main",
        sig(false, Vec::new(), ElemKind::Void),
        vec![
            instr("ldstr", Operand::String("never".into())),
            instr("call", write_line(ElemKind::String)),
            i("ret"),
        ],
        Vec::new(),
    );
    let program = build_type("", "Program", Vec::new(), vec![Arc::clone(&main)]);
    let image = CilImage::from_parts("app", vec![program], Some(main), Vec::new());

    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::new(image, dir.path()).unwrap();
    let out = Capture::default();
    engine.set_stdout(Box::new(out.clone()));

    engine
        .cancel_token()
        .store(false, std::sync::atomic::Ordering::Relaxed);
    engine.start(&[]).unwrap();

    assert_eq!(out.text(), "");
}
