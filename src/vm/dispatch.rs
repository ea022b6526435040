use std::collections::{HashMap, VecDeque};

use crate::value::object::ObjRef;
use crate::value::Value;
use crate::vm::context::ExecutionContext;
use crate::vm::sync::MonitorExit;
use crate::vm::threading::ThreadId;
use crate::vm::{StepResult, VmError};

/// Executes one operation of the current frame of a context.
///
/// The scheduler calls this once per scheduling turn. `Suspended` means the
/// operation could not make progress and must be retried after a wake;
/// `Reentered` means frames changed and the same frame position must not
/// advance.
pub trait Dispatcher {
    fn step(&mut self, context: &mut ExecutionContext) -> Result<StepResult, VmError>;
}

/// One scripted operation. Scripts stand in for interpreted bytecode: each
/// thread executes its own operation list, one per step, against the real
/// frame, monitor, and initialization machinery.
#[derive(Clone, Debug)]
pub enum Op {
    PushInt(i32),
    PushLong(i64),
    PushString(String),
    PushNull,
    /// Pushes a shared object registered under a label.
    PushObject(String),
    LoadLocal(usize),
    StoreLocal(usize),
    Call {
        class: String,
        name: String,
        descriptor: String,
    },
    Return {
        has_value: bool,
    },
    MonitorEnter(String),
    MonitorExit(String),
    InitClass(String),
    Raise {
        class: String,
        message: Option<String>,
    },
    PutStatic {
        class: String,
        field: String,
    },
    GetStatic {
        class: String,
        field: String,
    },
}

/// Drives contexts from per-thread operation lists.
///
/// Objects shared between threads are registered under labels before the run.
/// Every observable transition is appended to an event journal, which is what
/// scenario tests assert on: the journal captures acquisition order without
/// depending on trace output.
#[derive(Default)]
pub struct ScriptedDispatcher {
    scripts: HashMap<ThreadId, VecDeque<Op>>,
    objects: HashMap<String, ObjRef>,
    events: Vec<String>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_script(&mut self, thread: ThreadId, ops: Vec<Op>) {
        self.scripts.insert(thread, ops.into());
    }

    pub fn register_object(&mut self, label: &str, object: ObjRef) {
        self.objects.insert(label.to_owned(), object);
    }

    pub fn object(&self, label: &str) -> Result<ObjRef, VmError> {
        self.objects
            .get(label)
            .cloned()
            .ok_or_else(|| VmError::UnknownObject(label.to_owned()))
    }

    pub fn take_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    fn record(&mut self, event: String) {
        self.events.push(event);
    }

    fn exec(&mut self, context: &mut ExecutionContext, op: &Op) -> Result<StepResult, VmError> {
        let thread = context.thread().0;
        match op {
            Op::PushInt(n) => context.push_value(Value::Int(*n))?,
            Op::PushLong(n) => context.push_wide(Value::Long(*n))?,
            Op::PushString(text) => {
                let obj = context.new_string(text)?;
                context.push_value(Value::Object(obj))?;
            }
            Op::PushNull => context.push_value(Value::Null)?,
            Op::PushObject(label) => {
                let obj = self.object(label)?;
                context.push_value(Value::Object(obj))?;
            }
            Op::LoadLocal(index) => {
                let value = context.local(*index)?.clone();
                if value.is_wide() {
                    context.push_wide(value)?;
                } else {
                    context.push_value(value)?;
                }
            }
            Op::StoreLocal(index) => {
                let value = self.pop_operand(context)?;
                let wide = value.is_wide();
                context.set_local(*index, value)?;
                if wide {
                    context.set_local(*index + 1, Value::Uninit)?;
                }
            }
            Op::Call {
                class,
                name,
                descriptor,
            } => {
                let method = context
                    .shared()
                    .registry
                    .lookup_method(class, name, descriptor)?;
                let consumes = method.argument_slots()?;
                context.push_frame(method, consumes);
                return Ok(StepResult::Reentered);
            }
            Op::Return { has_value } => {
                let result = if *has_value {
                    Some(self.pop_operand(context)?)
                } else {
                    None
                };
                context.pop_frame()?;
                if let Some(value) = result {
                    if context.frame_count() > 0 {
                        if value.is_wide() {
                            context.push_wide(value)?;
                        } else {
                            context.push_value(value)?;
                        }
                    }
                }
            }
            Op::MonitorEnter(label) => {
                let obj = self.object(label)?;
                let result = context.monitor_enter(&obj);
                match result {
                    StepResult::Completed => {
                        self.record(format!("thread {} acquired {}", thread, label));
                    }
                    StepResult::Suspended => {
                        self.record(format!("thread {} blocked on {}", thread, label));
                    }
                    StepResult::Reentered => {}
                }
                return Ok(result);
            }
            Op::MonitorExit(label) => {
                let obj = self.object(label)?;
                match context.monitor_exit(&obj) {
                    MonitorExit::Released(_) => {
                        self.record(format!("thread {} released {}", thread, label));
                    }
                    MonitorExit::StillHeld => {
                        self.record(format!("thread {} unwound {} once", thread, label));
                    }
                    MonitorExit::NotOwner => {
                        self.record(format!("thread {} misreleased {}", thread, label));
                    }
                }
            }
            Op::InitClass(class) => {
                let class = context.shared().registry.by_name(class)?;
                return Ok(context.push_class_init_frame(&class));
            }
            Op::Raise { class, message } => {
                self.record(format!("thread {} raising {}", thread, class));
                return Ok(context.raise_exception(class, message.as_deref()));
            }
            Op::PutStatic { class, field } => {
                let value = self.pop_operand(context)?;
                let class = context.shared().registry.by_name(class)?;
                class.put_static(field, value);
            }
            Op::GetStatic { class, field } => {
                let class = context.shared().registry.by_name(class)?;
                let value = class.static_value(field)?;
                if value.is_wide() {
                    context.push_wide(value)?;
                } else {
                    context.push_value(value)?;
                }
            }
        }
        Ok(StepResult::Completed)
    }

    /// Pops one logical value. A padding slot on top means the slot below
    /// holds a two-slot value; bare padding is never pushed by any operation.
    fn pop_operand(&self, context: &mut ExecutionContext) -> Result<Value, VmError> {
        let top = context.pop_value()?;
        if top == Value::Uninit {
            context.pop_value()
        } else {
            Ok(top)
        }
    }
}

impl Dispatcher for ScriptedDispatcher {
    fn step(&mut self, context: &mut ExecutionContext) -> Result<StepResult, VmError> {
        if context.frame_count() == 0 {
            return Err(VmError::NoFrame);
        }
        let thread = context.thread();
        let op = match self.scripts.get(&thread).and_then(|s| s.front()) {
            Some(op) => op.clone(),
            None => {
                return Err(VmError::ScriptStuck {
                    thread: thread.0,
                    frames: context.frame_count(),
                })
            }
        };

        vm_trace_step!(context, &format!("{:?}", op));
        let result = self.exec(context, &op)?;
        // a suspended op is retried on wake
        if result != StepResult::Suspended {
            if let Some(script) = self.scripts.get_mut(&thread) {
                script.pop_front();
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ClassRegistry;
    use crate::types::constant_pool::ConstantPool;
    use crate::types::{ClassDef, MethodDef, MethodInfo};
    use crate::vm::state::SharedState;
    use std::rc::Rc;

    fn entry_method(max_locals: usize) -> Rc<MethodInfo> {
        Rc::new(MethodInfo {
            class_name: "demo/App".to_owned(),
            name: "main".to_owned(),
            descriptor: "()V".to_owned(),
            is_static: true,
            max_locals,
            code: vec![],
            pool: Rc::new(ConstantPool::new()),
        })
    }

    fn context_with_frame(max_locals: usize) -> ExecutionContext {
        let shared = SharedState::new(ClassRegistry::bootstrap());
        let mut context = ExecutionContext::new(ThreadId(1), shared);
        context.push_frame(entry_method(max_locals), 0);
        context
    }

    #[test]
    fn test_push_and_store_ops() {
        let mut context = context_with_frame(2);
        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(
            ThreadId(1),
            vec![
                Op::PushInt(41),
                Op::StoreLocal(0),
                Op::PushLong(1 << 33),
                Op::StoreLocal(0),
            ],
        );

        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();
        assert_eq!(context.local(0).unwrap(), &Value::Int(41));

        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();
        assert_eq!(context.local(0).unwrap(), &Value::Long(1 << 33));
        assert_eq!(context.local(1).unwrap(), &Value::Uninit);
    }

    #[test]
    fn test_call_consumes_arguments() {
        let shared = SharedState::new(ClassRegistry::bootstrap());
        shared
            .registry
            .define(ClassDef {
                name: "demo/Math".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![MethodDef {
                    name: "add".to_owned(),
                    descriptor: "(II)I".to_owned(),
                    is_static: true,
                    max_locals: 2,
                    code: vec![],
                }],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = ExecutionContext::new(ThreadId(1), shared);
        context.push_frame(entry_method(0), 0);

        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(
            ThreadId(1),
            vec![
                Op::PushInt(2),
                Op::PushInt(3),
                Op::Call {
                    class: "demo/Math".to_owned(),
                    name: "add".to_owned(),
                    descriptor: "(II)I".to_owned(),
                },
            ],
        );

        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();
        let result = dispatcher.step(&mut context).unwrap();
        assert_eq!(result, StepResult::Reentered);
        assert_eq!(context.frame_count(), 2);
        assert_eq!(context.local(0).unwrap(), &Value::Int(2));
        assert_eq!(context.local(1).unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_return_delivers_value_to_caller() {
        let mut context = context_with_frame(0);
        let callee = Rc::new(MethodInfo {
            class_name: "demo/App".to_owned(),
            name: "helper".to_owned(),
            descriptor: "()I".to_owned(),
            is_static: true,
            max_locals: 0,
            code: vec![],
            pool: Rc::new(ConstantPool::new()),
        });
        context.push_frame(callee, 0);

        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(
            ThreadId(1),
            vec![Op::PushInt(7), Op::Return { has_value: true }],
        );
        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();

        assert_eq!(context.frame_count(), 1);
        assert_eq!(context.pop_value().unwrap(), Value::Int(7));
    }

    #[test]
    fn test_statics_round_trip() {
        let shared = SharedState::new(ClassRegistry::bootstrap());
        shared
            .registry
            .define(ClassDef {
                name: "demo/Config".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = ExecutionContext::new(ThreadId(1), shared);
        context.push_frame(entry_method(0), 0);

        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(
            ThreadId(1),
            vec![
                Op::PushInt(9),
                Op::PutStatic {
                    class: "demo/Config".to_owned(),
                    field: "limit".to_owned(),
                },
                Op::GetStatic {
                    class: "demo/Config".to_owned(),
                    field: "limit".to_owned(),
                },
            ],
        );
        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();
        dispatcher.step(&mut context).unwrap();
        assert_eq!(context.pop_value().unwrap(), Value::Int(9));
    }

    #[test]
    fn test_empty_script_with_frames_is_stuck() {
        let mut context = context_with_frame(0);
        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(ThreadId(1), vec![]);

        let err = dispatcher.step(&mut context).unwrap_err();
        assert!(matches!(
            err,
            VmError::ScriptStuck { thread: 1, frames: 1 }
        ));
    }

    #[test]
    fn test_unregistered_object_label() {
        let mut context = context_with_frame(0);
        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(ThreadId(1), vec![Op::MonitorEnter("lock".to_owned())]);

        let err = dispatcher.step(&mut context).unwrap_err();
        assert!(matches!(err, VmError::UnknownObject(label) if label == "lock"));
    }
}
