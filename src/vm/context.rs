use std::fmt::Write as _;
use std::rc::Rc;

use crate::types::descriptor::MethodDescriptor;
use crate::types::{ClassInfo, MethodInfo};
use crate::value::object::{ArrayKind, ObjRef};
use crate::value::{string, Value};
use crate::vm::dispatch::Dispatcher;
use crate::vm::exceptions;
use crate::vm::stack::{CallStack, Frame, FrameId};
use crate::vm::state::SharedState;
use crate::vm::sync::MonitorExit;
use crate::vm::threading::{Task, ThreadId};
use crate::vm::tracer::Tracer;
use crate::vm::{StepResult, VmError};

/// How a [`ExecutionContext::run`] loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RunEnd {
    /// The stop frame is current again.
    ReachedStop,
    /// The thread blocked on a monitor; re-run after its wake arrives.
    Suspended,
}

/// The execution state of one guest thread: its call stack plus a handle to
/// the VM-wide shared state.
pub struct ExecutionContext {
    thread: ThreadId,
    stack: CallStack,
    shared: Rc<SharedState>,
}

impl ExecutionContext {
    pub fn new(thread: ThreadId, shared: Rc<SharedState>) -> Self {
        Self {
            thread,
            stack: CallStack::new(),
            shared,
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn shared(&self) -> &Rc<SharedState> {
        &self.shared
    }

    pub fn frame_count(&self) -> usize {
        self.stack.frame_count()
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.stack.current_frame()
    }

    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.stack.current_frame().map(|f| f.id)
    }

    pub fn push_frame(&mut self, method: Rc<MethodInfo>, consumes: usize) -> FrameId {
        vm_trace_method_entry!(
            self,
            &format!("{}.{}", method.class_name, method.name),
            &method.descriptor
        );
        self.stack.push_frame(method, consumes)
    }

    pub fn pop_frame(&mut self) -> Result<Option<FrameId>, VmError> {
        if let Some(frame) = self.stack.current_frame() {
            vm_trace_method_exit!(
                self,
                &format!("{}.{}", frame.method.class_name, frame.method.name)
            );
        }
        self.stack.pop_frame()
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), VmError> {
        self.stack.push_value(value)
    }

    pub fn push_wide(&mut self, value: Value) -> Result<(), VmError> {
        self.stack.push_wide(value)
    }

    pub fn pop_value(&mut self) -> Result<Value, VmError> {
        self.stack.pop_value()
    }

    pub fn local(&self, index: usize) -> Result<&Value, VmError> {
        self.stack.local(index)
    }

    pub fn set_local(&mut self, index: usize, value: Value) -> Result<(), VmError> {
        self.stack.set_local(index, value)
    }

    /// Acquires the object's monitor, or records this thread as a waiter.
    ///
    /// `Suspended` means the thread must leave the run queue; it will retry
    /// the same operation once the releasing thread's wake task runs.
    pub fn monitor_enter(&mut self, object: &ObjRef) -> StepResult {
        let acquired = self
            .shared
            .monitors
            .borrow_mut()
            .enter(object.id(), self.thread);
        if acquired {
            vm_trace_monitor!(
                self,
                "enter",
                &format!("thread {} object {:?}", self.thread.0, object)
            );
            StepResult::Completed
        } else {
            vm_trace_monitor!(
                self,
                "blocked",
                &format!("thread {} object {:?}", self.thread.0, object)
            );
            StepResult::Suspended
        }
    }

    /// Releases the object's monitor once and returns the outcome.
    ///
    /// Exiting a monitor the thread does not own is reported and counted but
    /// never raised; the guest continues untouched. A full release queues one
    /// wake per waiter, preserving their arrival order.
    pub fn monitor_exit(&mut self, object: &ObjRef) -> MonitorExit {
        let result = self
            .shared
            .monitors
            .borrow_mut()
            .exit(object.id(), self.thread);
        match &result {
            MonitorExit::NotOwner => {
                self.shared.tracer.warn(&format!(
                    "monitorexit on {:?} by thread {} which does not own it",
                    object, self.thread.0
                ));
                self.shared.tracer.record_violation();
            }
            MonitorExit::StillHeld => {
                vm_trace_monitor!(
                    self,
                    "exit",
                    &format!("thread {} object {:?} still held", self.thread.0, object)
                );
            }
            MonitorExit::Released(waiters) => {
                vm_trace_monitor!(
                    self,
                    "release",
                    &format!(
                        "thread {} object {:?} waking {}",
                        self.thread.0,
                        object,
                        waiters.len()
                    )
                );
                for &waiter in waiters {
                    self.shared.defer(Task::Resume(waiter));
                }
            }
        }
        result
    }

    /// Schedules the static initializers a class still needs.
    ///
    /// Every class on the superclass chain that is not yet initialized gets
    /// marked immediately and its `<clinit>` frame pushed, own class first and
    /// ancestors above it, so the eldest initializer executes first. Marking
    /// before any body runs is what makes initialization cycles terminate: a
    /// `<clinit>` that touches its own class finds it already marked.
    pub fn push_class_init_frame(&mut self, class: &Rc<ClassInfo>) -> StepResult {
        if class.initialized.get() {
            return StepResult::Completed;
        }

        let mut pushed = false;
        let mut current = Some(Rc::clone(class));
        while let Some(info) = current {
            if info.initialized.get() {
                break;
            }
            info.initialized.set(true);
            info.init_statics();
            if self.tracer_enabled() {
                self.tracer().trace_class_init(self.indent(), &info.name);
            }
            if let Some(clinit) = info.static_initializer() {
                self.push_frame(clinit, 0);
                pushed = true;
            }
            current = info.super_class.clone();
        }

        if pushed {
            StepResult::Reentered
        } else {
            StepResult::Completed
        }
    }

    /// Raises an exception by scheduling a synthesized throw helper on this
    /// thread. The interpreter picks the new frame up on its next step, so the
    /// construction and throw run through the ordinary execution path.
    pub fn raise_exception(&mut self, class_name: &str, message: Option<&str>) -> StepResult {
        let message = message.unwrap_or("");
        if self.tracer_enabled() {
            self.tracer()
                .trace_exception(self.indent(), class_name, message);
        }
        let method = exceptions::synthesize_athrow_method(class_name, message);
        self.push_frame(Rc::new(method), 0);
        StepResult::Reentered
    }

    /// Allocates a `java/lang/String` instance over a fresh char array.
    pub fn new_string(&self, text: &str) -> Result<ObjRef, VmError> {
        let class = self.shared.registry.by_name(string::STRING_CLASS)?;
        let chars = ObjRef::new_array(self.shared.alloc_object_id(), ArrayKind::Char, 0);
        chars.set_chars(text);
        let count = text.encode_utf16().count() as i32;

        let object = ObjRef::new_instance(self.shared.alloc_object_id(), class);
        object.set_field(string::VALUE_FIELD, Value::Object(chars));
        object.set_field(string::OFFSET_FIELD, Value::Int(0));
        object.set_field(string::COUNT_FIELD, Value::Int(count));
        Ok(object)
    }

    /// Renders the call stack oldest frame first, one line per frame:
    /// `ClassName.methodName(arg0,arg1,...)` with the declared parameters
    /// read back out of each frame's leading locals.
    pub fn back_trace(&self) -> Result<String, VmError> {
        let mut out = String::new();
        for frame in self.stack.frames() {
            if !out.is_empty() {
                out.push('\n');
            }
            let method = &frame.method;
            let _ = write!(out, "{}.{}(", method.class_name, method.name);

            let descriptor = MethodDescriptor::parse(&method.descriptor)?;
            let mut slot = 0;
            for (i, param) in descriptor.params.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let value = self.stack.value_at(frame.base + slot);
                self.render_value(&mut out, value);
                slot += param.slot_width();
            }
            out.push(')');
        }
        Ok(out)
    }

    fn render_value(&self, out: &mut String, value: Option<&Value>) {
        match value {
            Some(Value::Int(n)) => {
                let _ = write!(out, "{}", n);
            }
            Some(Value::Long(n)) => {
                let _ = write!(out, "{}", n);
            }
            Some(Value::Float(n)) => {
                let _ = write!(out, "{}", n);
            }
            Some(Value::Double(n)) => {
                let _ = write!(out, "{}", n);
            }
            Some(Value::Null) => out.push_str("null"),
            Some(Value::Object(obj)) => match string::from_java_string(obj) {
                Some(text) => {
                    let _ = write!(out, "'{}'", text);
                }
                None => {
                    let _ = write!(out, "<{}>", obj.class_name());
                }
            },
            Some(Value::Uninit) | None => out.push_str("<uninit>"),
        }
    }

    /// Steps this context until `stop` is the current frame again.
    ///
    /// Frame churn below the loop is invisible to the caller; only a monitor
    /// suspension or an error escapes early.
    pub fn run<D: Dispatcher>(
        &mut self,
        dispatcher: &mut D,
        stop: FrameId,
    ) -> Result<RunEnd, VmError> {
        loop {
            let current = self.current_frame_id().ok_or(VmError::NoFrame)?;
            if current == stop {
                return Ok(RunEnd::ReachedStop);
            }
            match dispatcher.step(self)? {
                StepResult::Suspended => return Ok(RunEnd::Suspended),
                StepResult::Completed | StepResult::Reentered => {}
            }
        }
    }

    pub fn tracer_enabled(&self) -> bool {
        self.shared.tracer.is_enabled()
    }

    pub fn tracer(&self) -> &Tracer {
        &self.shared.tracer
    }

    pub fn indent(&self) -> usize {
        self.stack.frame_count().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ClassRegistry;
    use crate::types::constant_pool::ConstantPool;
    use crate::types::{ClassDef, MethodDef};
    use crate::vm::dispatch::{Op, ScriptedDispatcher};

    fn shared() -> Rc<SharedState> {
        SharedState::new(ClassRegistry::bootstrap())
    }

    fn method(class_name: &str, name: &str, descriptor: &str, max_locals: usize) -> Rc<MethodInfo> {
        Rc::new(MethodInfo {
            class_name: class_name.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            is_static: true,
            max_locals,
            code: vec![],
            pool: Rc::new(ConstantPool::new()),
        })
    }

    fn context_on(shared: &Rc<SharedState>, thread: u64) -> ExecutionContext {
        ExecutionContext::new(ThreadId(thread), Rc::clone(shared))
    }

    fn new_object(shared: &Rc<SharedState>) -> ObjRef {
        let class = shared.registry.by_name("java/lang/Object").unwrap();
        ObjRef::new_instance(shared.alloc_object_id(), class)
    }

    fn clinit_def(code: Vec<u8>) -> MethodDef {
        MethodDef {
            name: "<clinit>".to_owned(),
            descriptor: "()V".to_owned(),
            is_static: true,
            max_locals: 0,
            code,
        }
    }

    #[test]
    fn test_reentrant_monitor_is_silent() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        let obj = new_object(&shared);

        for _ in 0..3 {
            assert_eq!(context.monitor_enter(&obj), StepResult::Completed);
        }
        for _ in 0..3 {
            context.monitor_exit(&obj);
        }
        assert_eq!(shared.tracer.violation_count(), 0);
        assert!(shared.monitors.borrow().monitor(obj.id()).is_none());
    }

    #[test]
    fn test_contended_monitor_suspends() {
        let shared = shared();
        let mut holder = context_on(&shared, 1);
        let mut contender = context_on(&shared, 2);
        let obj = new_object(&shared);

        assert_eq!(holder.monitor_enter(&obj), StepResult::Completed);
        assert_eq!(contender.monitor_enter(&obj), StepResult::Suspended);

        let monitors = shared.monitors.borrow();
        let monitor = monitors.monitor(obj.id()).unwrap();
        assert_eq!(monitor.owner(), Some(ThreadId(1)));
        assert_eq!(monitor.waiters().collect::<Vec<_>>(), vec![ThreadId(2)]);
    }

    #[test]
    fn test_release_queues_wakes_in_arrival_order() {
        let shared = shared();
        let mut holder = context_on(&shared, 1);
        let obj = new_object(&shared);

        holder.monitor_enter(&obj);
        for tid in [2, 3, 4] {
            let mut contender = context_on(&shared, tid);
            assert_eq!(contender.monitor_enter(&obj), StepResult::Suspended);
        }
        holder.monitor_exit(&obj);

        let tasks: Vec<_> = shared.tasks.borrow_mut().drain(..).collect();
        assert_eq!(
            tasks,
            vec![
                Task::Resume(ThreadId(2)),
                Task::Resume(ThreadId(3)),
                Task::Resume(ThreadId(4)),
            ]
        );
    }

    #[test]
    fn test_unowned_exit_is_reported_not_raised() {
        let shared = shared();
        let mut holder = context_on(&shared, 1);
        let mut intruder = context_on(&shared, 2);
        let obj = new_object(&shared);

        holder.monitor_enter(&obj);
        intruder.monitor_exit(&obj);

        assert_eq!(shared.tracer.violation_count(), 1);
        // no frames appeared on the offending thread, no throw happened
        assert_eq!(intruder.frame_count(), 0);
        let monitors = shared.monitors.borrow();
        assert_eq!(monitors.monitor(obj.id()).unwrap().owner(), Some(ThreadId(1)));
    }

    #[test]
    fn test_class_init_runs_ancestors_first() {
        let shared = shared();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Base".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![clinit_def(vec![])],
                pool: ConstantPool::new(),
            })
            .unwrap();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Derived".to_owned(),
                super_name: Some("demo/Base".to_owned()),
                methods: vec![clinit_def(vec![])],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        let derived = shared.registry.by_name("demo/Derived").unwrap();
        assert_eq!(context.push_class_init_frame(&derived), StepResult::Reentered);

        // both were marked up front and the eldest initializer is on top
        assert!(shared.registry.by_name("demo/Base").unwrap().initialized.get());
        assert!(derived.initialized.get());
        assert_eq!(context.frame_count(), 3);
        let top = context.current_frame().unwrap();
        assert_eq!(top.method.class_name, "demo/Base");
        assert!(top.method.is_clinit());
    }

    #[test]
    fn test_class_init_is_idempotent() {
        let shared = shared();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Once".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![clinit_def(vec![])],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);
        let class = shared.registry.by_name("demo/Once").unwrap();

        assert_eq!(context.push_class_init_frame(&class), StepResult::Reentered);
        let frames = context.frame_count();
        // a second trigger schedules nothing, even while the first is pending
        assert_eq!(context.push_class_init_frame(&class), StepResult::Completed);
        assert_eq!(context.frame_count(), frames);
    }

    #[test]
    fn test_class_init_skips_initialized_ancestors() {
        let shared = shared();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Base".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![clinit_def(vec![])],
                pool: ConstantPool::new(),
            })
            .unwrap();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Derived".to_owned(),
                super_name: Some("demo/Base".to_owned()),
                methods: vec![clinit_def(vec![])],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let base = shared.registry.by_name("demo/Base").unwrap();
        base.initialized.set(true);

        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);
        let derived = shared.registry.by_name("demo/Derived").unwrap();
        context.push_class_init_frame(&derived);

        assert_eq!(context.frame_count(), 2);
        assert_eq!(
            context.current_frame().unwrap().method.class_name,
            "demo/Derived"
        );
    }

    #[test]
    fn test_class_init_without_initializer_completes() {
        let shared = shared();
        shared
            .registry
            .define(ClassDef {
                name: "demo/Plain".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);
        let class = shared.registry.by_name("demo/Plain").unwrap();

        assert_eq!(context.push_class_init_frame(&class), StepResult::Completed);
        assert_eq!(context.frame_count(), 1);
        assert!(class.initialized.get());
        assert!(class.statics_ready());
    }

    #[test]
    fn test_raise_pushes_throw_helper() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        let result = context.raise_exception("java/lang/IllegalStateException", Some("stopped"));
        assert_eq!(result, StepResult::Reentered);
        assert_eq!(context.frame_count(), 2);

        let top = context.current_frame().unwrap();
        assert_eq!(top.method.name, "<athrow>");
        assert_eq!(top.method.code.len(), 10);
        assert_eq!(
            top.method.pool.class_name(1).unwrap(),
            "java/lang/IllegalStateException"
        );
        assert_eq!(top.method.pool.string_text(3).unwrap(), "stopped");
    }

    #[test]
    fn test_raise_without_message() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        context.raise_exception("java/lang/Error", None);
        let top = context.current_frame().unwrap();
        assert_eq!(top.method.pool.string_text(3).unwrap(), "");
    }

    #[test]
    fn test_new_string_reads_back() {
        let shared = shared();
        let context = context_on(&shared, 1);
        let obj = context.new_string("héllo").unwrap();
        assert_eq!(string::from_java_string(&obj).as_deref(), Some("héllo"));
        assert_eq!(obj.class_name(), "java/lang/String");
    }

    #[test]
    fn test_back_trace_renders_arguments() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        let hi = context.new_string("hi").unwrap();
        context.push_value(Value::Object(hi)).unwrap();
        context.push_value(Value::Int(5)).unwrap();
        context.push_frame(
            method("demo/App", "greet", "(Ljava/lang/String;I)V", 2),
            2,
        );

        let trace = context.back_trace().unwrap();
        assert_eq!(trace, "demo/App.main()\ndemo/App.greet('hi',5)");
    }

    #[test]
    fn test_back_trace_null_and_object() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        context.push_value(Value::Null).unwrap();
        context
            .push_value(Value::Object(new_object(&shared)))
            .unwrap();
        context.push_frame(
            method(
                "demo/App",
                "accept",
                "(Ljava/lang/Object;Ljava/lang/Object;)V",
                2,
            ),
            2,
        );

        let trace = context.back_trace().unwrap();
        assert!(trace.ends_with("demo/App.accept(null,<java/lang/Object>)"));
    }

    #[test]
    fn test_back_trace_wide_arguments() {
        let shared = shared();
        let mut context = context_on(&shared, 1);
        context.push_frame(method("demo/App", "main", "()V", 0), 0);

        context.push_wide(Value::Long(1 << 35)).unwrap();
        context.push_value(Value::Int(2)).unwrap();
        context.push_frame(method("demo/App", "mix", "(JI)V", 3), 3);

        let trace = context.back_trace().unwrap();
        assert!(trace.ends_with(&format!("demo/App.mix({},2)", 1u64 << 35)));
    }

    #[test]
    fn test_run_returns_at_stop_frame() {
        let shared = shared();
        shared
            .registry
            .define(ClassDef {
                name: "demo/App".to_owned(),
                super_name: Some("java/lang/Object".to_owned()),
                methods: vec![MethodDef {
                    name: "helper".to_owned(),
                    descriptor: "()I".to_owned(),
                    is_static: true,
                    max_locals: 0,
                    code: vec![],
                }],
                pool: ConstantPool::new(),
            })
            .unwrap();

        let mut context = context_on(&shared, 1);
        let stop = context.push_frame(method("demo/App", "main", "()V", 0), 0);

        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.set_script(
            ThreadId(1),
            vec![
                Op::Call {
                    class: "demo/App".to_owned(),
                    name: "helper".to_owned(),
                    descriptor: "()I".to_owned(),
                },
                Op::PushInt(11),
                Op::Return { has_value: true },
            ],
        );

        // step past the call so the helper frame is current, then drive home
        dispatcher.step(&mut context).unwrap();
        assert_ne!(context.current_frame_id(), Some(stop));
        let end = context.run(&mut dispatcher, stop).unwrap();
        assert_eq!(end, RunEnd::ReachedStop);
        assert_eq!(context.pop_value().unwrap(), Value::Int(11));
    }

    #[test]
    fn test_run_surfaces_suspension() {
        let shared = shared();
        let mut holder = context_on(&shared, 2);
        let obj = new_object(&shared);
        holder.monitor_enter(&obj);

        let mut context = context_on(&shared, 1);
        let stop = context.push_frame(method("demo/App", "main", "()V", 0), 0);
        context.push_frame(method("demo/App", "locked", "()V", 0), 0);

        let mut dispatcher = ScriptedDispatcher::new();
        dispatcher.register_object("shared", obj);
        dispatcher.set_script(
            ThreadId(1),
            vec![
                Op::MonitorEnter("shared".to_owned()),
                Op::Return { has_value: false },
            ],
        );

        let end = context.run(&mut dispatcher, stop).unwrap();
        assert_eq!(end, RunEnd::Suspended);
        // the blocking operation was not consumed and retries on wake
        assert_eq!(context.frame_count(), 2);
    }
}
