use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use std::rc::Rc;

pub mod resolve;
pub mod types;
pub mod value;
#[macro_use]
pub mod vm;

use byteorder::{BigEndian, ByteOrder};

use crate::resolve::ClassRegistry;
use crate::types::constant_pool::ConstantPool;
use crate::types::{opcodes, ClassDef, MethodDef, MethodInfo};
use crate::value::object::ObjRef;
use crate::value::Value;
use crate::vm::{
    ExecutionContext, Op, Scheduler, ScriptedDispatcher, SharedState, ThreadId, VmError,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "An experimental execution core for a J2ME-style JVM"
)]
pub struct Args {
    /// Which demonstration to run
    #[arg(value_enum)]
    pub scenario: Scenario,
    /// Upper bound on scheduler steps before the run is aborted
    #[arg(long, default_value_t = 10_000)]
    pub max_steps: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Frame windows sharing one value buffer
    Frames,
    /// Contended monitors with fair wakeups
    Monitors,
    /// Recursive static initialization
    Clinit,
    /// Raising an exception through a synthesized helper
    Exception,
    /// Stack trace rendering
    Backtrace,
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();

    let result = match args.scenario {
        Scenario::Frames => frames_scenario(),
        Scenario::Monitors => monitors_scenario(args.max_steps),
        Scenario::Clinit => clinit_scenario(args.max_steps),
        Scenario::Exception => exception_scenario(),
        Scenario::Backtrace => backtrace_scenario(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scenario failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn frames_scenario() -> Result<(), VmError> {
    let shared = SharedState::new(ClassRegistry::bootstrap());
    shared.registry.define(ClassDef {
        name: "demo/App".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![
            MethodDef {
                name: "main".to_owned(),
                descriptor: "()V".to_owned(),
                is_static: true,
                max_locals: 1,
                code: vec![],
            },
            MethodDef {
                name: "sum".to_owned(),
                descriptor: "(IJ)J".to_owned(),
                is_static: true,
                max_locals: 3,
                code: vec![],
            },
        ],
        pool: ConstantPool::new(),
    })?;

    let mut context = ExecutionContext::new(ThreadId(1), Rc::clone(&shared));
    let main = shared.registry.lookup_method("demo/App", "main", "()V")?;
    context.push_frame(main, 0);
    context.push_value(Value::Int(7))?;
    context.push_wide(Value::Long(1_000_000_007))?;
    println!("caller depth with arguments staged: {}", context.depth());

    let sum = shared.registry.lookup_method("demo/App", "sum", "(IJ)J")?;
    let consumes = sum.argument_slots()?;
    context.push_frame(sum, consumes);
    println!("callee local 0: {:?}", context.local(0)?);
    println!("callee local 1: {:?}", context.local(1)?);
    println!("depth unchanged, the arguments were windowed: {}", context.depth());

    context.pop_frame()?;
    println!("caller depth after return: {}", context.depth());
    Ok(())
}

fn monitors_scenario(max_steps: u64) -> Result<(), VmError> {
    let shared = SharedState::new(ClassRegistry::bootstrap());
    shared.registry.define(ClassDef {
        name: "demo/Worker".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![MethodDef {
            name: "run".to_owned(),
            descriptor: "()V".to_owned(),
            is_static: true,
            max_locals: 0,
            code: vec![],
        }],
        pool: ConstantPool::new(),
    })?;
    let run_method = shared.registry.lookup_method("demo/Worker", "run", "()V")?;

    let object_class = shared.registry.by_name("java/lang/Object")?;
    let lock = ObjRef::new_instance(shared.alloc_object_id(), object_class);

    let mut scheduler = Scheduler::new(Rc::clone(&shared));
    let mut dispatcher = ScriptedDispatcher::new();
    dispatcher.register_object("lock", lock);

    let holder = scheduler.spawn(Rc::clone(&run_method), vec![])?;
    dispatcher.set_script(
        holder,
        vec![
            Op::MonitorEnter("lock".to_owned()),
            Op::MonitorEnter("lock".to_owned()),
            Op::MonitorExit("lock".to_owned()),
            Op::MonitorExit("lock".to_owned()),
            Op::Return { has_value: false },
        ],
    );
    for _ in 0..3 {
        let contender = scheduler.spawn(Rc::clone(&run_method), vec![])?;
        dispatcher.set_script(
            contender,
            vec![
                Op::MonitorEnter("lock".to_owned()),
                Op::MonitorExit("lock".to_owned()),
                Op::Return { has_value: false },
            ],
        );
    }

    let steps = scheduler.run_until_idle(&mut dispatcher, Some(max_steps))?;
    for event in dispatcher.take_events() {
        println!("{}", event);
    }
    println!("settled after {} steps", steps);
    Ok(())
}

fn clinit_scenario(max_steps: u64) -> Result<(), VmError> {
    let shared = SharedState::new(ClassRegistry::bootstrap());
    let clinit = || MethodDef {
        name: "<clinit>".to_owned(),
        descriptor: "()V".to_owned(),
        is_static: true,
        max_locals: 0,
        code: vec![],
    };
    shared.registry.define(ClassDef {
        name: "demo/Base".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![clinit()],
        pool: ConstantPool::new(),
    })?;
    shared.registry.define(ClassDef {
        name: "demo/Derived".to_owned(),
        super_name: Some("demo/Base".to_owned()),
        methods: vec![clinit()],
        pool: ConstantPool::new(),
    })?;
    shared.registry.define(ClassDef {
        name: "demo/App".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![MethodDef {
            name: "boot".to_owned(),
            descriptor: "()V".to_owned(),
            is_static: true,
            max_locals: 0,
            code: vec![],
        }],
        pool: ConstantPool::new(),
    })?;

    let mut scheduler = Scheduler::new(Rc::clone(&shared));
    let boot = shared.registry.lookup_method("demo/App", "boot", "()V")?;
    let thread = scheduler.spawn(boot, vec![])?;

    let mut dispatcher = ScriptedDispatcher::new();
    dispatcher.set_script(
        thread,
        vec![
            Op::InitClass("demo/Derived".to_owned()),
            // the base initializer runs first
            Op::PushInt(1),
            Op::PutStatic {
                class: "demo/Base".to_owned(),
                field: "ordinal".to_owned(),
            },
            Op::Return { has_value: false },
            // the derived initializer sees the base statics already in place
            Op::GetStatic {
                class: "demo/Base".to_owned(),
                field: "ordinal".to_owned(),
            },
            Op::PutStatic {
                class: "demo/Derived".to_owned(),
                field: "baseOrdinal".to_owned(),
            },
            Op::PushInt(2),
            Op::PutStatic {
                class: "demo/Derived".to_owned(),
                field: "ordinal".to_owned(),
            },
            Op::Return { has_value: false },
            // a second trigger schedules nothing
            Op::InitClass("demo/Derived".to_owned()),
            Op::InitClass("demo/Base".to_owned()),
            Op::Return { has_value: false },
        ],
    );

    let steps = scheduler.run_until_idle(&mut dispatcher, Some(max_steps))?;
    let base = shared.registry.by_name("demo/Base")?;
    let derived = shared.registry.by_name("demo/Derived")?;
    println!("demo/Base.ordinal = {:?}", base.static_value("ordinal")?);
    println!("demo/Derived.ordinal = {:?}", derived.static_value("ordinal")?);
    println!(
        "demo/Derived.baseOrdinal = {:?}",
        derived.static_value("baseOrdinal")?
    );
    println!("initialization settled after {} steps", steps);
    Ok(())
}

fn exception_scenario() -> Result<(), VmError> {
    let shared = SharedState::new(ClassRegistry::bootstrap());
    shared.registry.define(ClassDef {
        name: "demo/App".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![MethodDef {
            name: "main".to_owned(),
            descriptor: "()V".to_owned(),
            is_static: true,
            max_locals: 0,
            code: vec![],
        }],
        pool: ConstantPool::new(),
    })?;

    let mut context = ExecutionContext::new(ThreadId(1), Rc::clone(&shared));
    let main = shared.registry.lookup_method("demo/App", "main", "()V")?;
    context.push_frame(main, 0);
    context.raise_exception("java/lang/IllegalStateException", Some("subsystem offline"));

    let method = match context.current_frame() {
        Some(frame) => Rc::clone(&frame.method),
        None => return Err(VmError::NoFrame),
    };
    println!(
        "scheduled {} with {} bytes of code:",
        method.name,
        method.code.len()
    );
    print_listing(&method)?;
    println!("{}", context.back_trace()?);
    Ok(())
}

fn print_listing(method: &MethodInfo) -> Result<(), VmError> {
    let code = &method.code;
    let mut ip = 0;
    while ip < code.len() {
        let opcode = code[ip];
        let (operand_len, detail) = match opcode {
            opcodes::NEW => {
                let index = BigEndian::read_u16(&code[ip + 1..ip + 3]);
                (2, method.pool.class_name(index)?.to_owned())
            }
            opcodes::LDC => {
                let index = code[ip + 1] as u16;
                (1, format!("'{}'", method.pool.string_text(index)?))
            }
            opcodes::INVOKESPECIAL => {
                let index = BigEndian::read_u16(&code[ip + 1..ip + 3]);
                let target = method.pool.method_ref(index)?;
                (
                    2,
                    format!("{}.{}{}", target.class_name, target.name, target.descriptor),
                )
            }
            _ => (0, String::new()),
        };
        let bytes: Vec<String> = code[ip..=ip + operand_len]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        println!(
            "  {:04}: {:<9} {:<14} {}",
            ip,
            bytes.join(" "),
            opcodes::mnemonic(opcode),
            detail
        );
        ip += 1 + operand_len;
    }
    Ok(())
}

fn backtrace_scenario() -> Result<(), VmError> {
    let shared = SharedState::new(ClassRegistry::bootstrap());
    shared.registry.define(ClassDef {
        name: "demo/Service".to_owned(),
        super_name: Some("java/lang/Object".to_owned()),
        methods: vec![
            MethodDef {
                name: "start".to_owned(),
                descriptor: "()V".to_owned(),
                is_static: true,
                max_locals: 2,
                code: vec![],
            },
            MethodDef {
                name: "handle".to_owned(),
                descriptor: "(Ljava/lang/String;I)V".to_owned(),
                is_static: true,
                max_locals: 4,
                code: vec![],
            },
            MethodDef {
                name: "fail".to_owned(),
                descriptor: "(Ljava/lang/Object;Ljava/lang/Object;J)V".to_owned(),
                is_static: true,
                max_locals: 4,
                code: vec![],
            },
        ],
        pool: ConstantPool::new(),
    })?;

    let mut context = ExecutionContext::new(ThreadId(1), Rc::clone(&shared));
    let start = shared.registry.lookup_method("demo/Service", "start", "()V")?;
    context.push_frame(start, 0);

    let message = context.new_string("hi")?;
    context.push_value(Value::Object(message))?;
    context.push_value(Value::Int(5))?;
    let handle = shared
        .registry
        .lookup_method("demo/Service", "handle", "(Ljava/lang/String;I)V")?;
    let consumes = handle.argument_slots()?;
    context.push_frame(handle, consumes);

    context.push_value(Value::Null)?;
    let object_class = shared.registry.by_name("java/lang/Object")?;
    let witness = ObjRef::new_instance(shared.alloc_object_id(), object_class);
    context.push_value(Value::Object(witness))?;
    context.push_wide(Value::Long(99))?;
    let fail = shared.registry.lookup_method(
        "demo/Service",
        "fail",
        "(Ljava/lang/Object;Ljava/lang/Object;J)V",
    )?;
    let consumes = fail.argument_slots()?;
    context.push_frame(fail, consumes);

    println!("{}", context.back_trace()?);
    Ok(())
}
