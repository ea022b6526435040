#[macro_export]
macro_rules! vm_msg {
    ($src:expr, $($format:tt)*) => {
        if $src.tracer_enabled() {
            $src.tracer().msg($src.indent(), format_args!($($format)*))
        }
    }
}

// Guarded so trace arguments are never formatted while tracing is off.
#[macro_export]
macro_rules! vm_trace_method_entry {
    ($src:expr, $name:expr, $sig:expr) => {
        if $src.tracer_enabled() {
            $src.tracer().trace_method_entry($src.indent(), $name, $sig);
        }
    };
}

#[macro_export]
macro_rules! vm_trace_method_exit {
    ($src:expr, $name:expr) => {
        if $src.tracer_enabled() {
            $src.tracer().trace_method_exit($src.indent(), $name);
        }
    };
}

#[macro_export]
macro_rules! vm_trace_monitor {
    ($src:expr, $event:expr, $details:expr) => {
        if $src.tracer_enabled() {
            $src.tracer().trace_monitor($src.indent(), $event, $details);
        }
    };
}

#[macro_export]
macro_rules! vm_trace_step {
    ($src:expr, $op:expr) => {
        if $src.tracer_enabled() {
            $src.tracer().trace_step($src.indent(), $op);
        }
    };
}
