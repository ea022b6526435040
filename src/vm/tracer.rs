//! IO-optimized execution tracer for the VM.
//!
//! Captures frame, monitor, and scheduler activity with minimal overhead
//! through aggressive buffering and early-exit checks when disabled.
//!
//! ## Environment Variables
//!
//! - `J2ME_RS_TRACE`: Enable tracing
//!   - `"1"`, `"true"`, or `"stdout"`: Write to stdout
//!   - `"stderr"`: Write to stderr
//!   - `<path>`: Write to file at path
//!
//! - `J2ME_RS_TRACE_FLUSH_INTERVAL`: Number of messages before auto-flush (default: 10000)
//!
//! - `J2ME_RS_TRACE_STATS`: Enable detailed statistics collection (`"1"` or `"true"`)
//!
//! ## Usage Examples
//!
//! ```bash
//! # Trace to stdout
//! J2ME_RS_TRACE=stdout cargo run
//!
//! # Trace to file with statistics
//! J2ME_RS_TRACE=/tmp/trace.log J2ME_RS_TRACE_STATS=1 cargo run
//! ```
use std::{
    cell::{Cell, RefCell},
    env,
    fs::File,
    io::{stderr, stdout, BufWriter, Write},
};

const BUFFER_SIZE: usize = 256 * 1024; // 256KB buffer for better IO performance
const AUTO_FLUSH_INTERVAL: usize = 10_000; // Auto-flush every N messages

/// Statistics for runtime execution tracing
#[derive(Debug, Clone, Default)]
pub struct TraceStats {
    pub total_messages: usize,
    pub steps: usize,
    pub frames_pushed: usize,
    pub frames_popped: usize,
    pub monitor_events: usize,
    pub wakes: usize,
    pub class_inits: usize,
    pub exceptions_raised: usize,
}

pub struct Tracer {
    enabled: bool,
    writer: RefCell<Option<BufWriter<Box<dyn Write + Send>>>>,
    message_count: Cell<usize>,
    auto_flush_interval: usize,
    stats: RefCell<TraceStats>,
    detailed_stats: bool,
    // counted even when tracing is off; tests assert on it
    violations: Cell<u64>,
}

impl Tracer {
    pub fn new() -> Self {
        let trace_env = env::var("J2ME_RS_TRACE");
        let (enabled, writer): (bool, Option<Box<dyn Write + Send>>) = match trace_env {
            Ok(val) if val == "1" || val == "true" || val == "stdout" => {
                (true, Some(Box::new(stdout())))
            }
            Ok(val) if val == "stderr" => (true, Some(Box::new(stderr()))),
            Ok(val) if !val.is_empty() => {
                // assume it's a file path
                match File::create(&val) {
                    Ok(f) => (true, Some(Box::new(f))),
                    Err(e) => {
                        eprintln!("Failed to create trace file {}: {}", val, e);
                        (false, None)
                    }
                }
            }
            _ => (false, None),
        };

        // Check for custom auto-flush interval
        let auto_flush_interval = env::var("J2ME_RS_TRACE_FLUSH_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(AUTO_FLUSH_INTERVAL);

        // Check if detailed statistics should be collected
        let detailed_stats = env::var("J2ME_RS_TRACE_STATS")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        Self {
            enabled,
            writer: RefCell::new(writer.map(|w| BufWriter::with_capacity(BUFFER_SIZE, w))),
            message_count: Cell::new(0),
            auto_flush_interval,
            stats: RefCell::new(TraceStats::default()),
            detailed_stats,
            violations: Cell::new(0),
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline(always)]
    fn write_msg(&self, indent: usize, args: std::fmt::Arguments) {
        if let Some(ref mut writer) = *self.writer.borrow_mut() {
            // Write indentation
            for _ in 0..indent {
                let _ = writer.write_all(b"  ");
            }
            // Write message
            let _ = writer.write_fmt(args);
            let _ = writer.write_all(b"\n");

            // Periodic auto-flush to prevent buffer overflow and ensure visibility
            let count = self.message_count.get() + 1;
            self.message_count.set(count);
            if count >= self.auto_flush_interval {
                let _ = writer.flush();
                self.message_count.set(0);
            }
        }
    }

    pub fn msg(&self, indent: usize, args: std::fmt::Arguments) {
        if !self.enabled {
            return;
        }

        if self.detailed_stats {
            self.stats.borrow_mut().total_messages += 1;
        }

        self.write_msg(indent, args);
    }

    pub fn flush(&self) {
        if self.enabled {
            if let Some(ref mut writer) = *self.writer.borrow_mut() {
                let _ = writer.flush();
            }
            self.message_count.set(0);
        }
    }

    /// Unconditional warning, independent of the trace sink.
    pub fn warn(&self, message: &str) {
        eprintln!("[VM WARNING] {}", message);
    }

    /// Records a locking-rule violation. Always counted, never raised.
    pub fn record_violation(&self) {
        self.violations.set(self.violations.get() + 1);
    }

    pub fn violation_count(&self) -> u64 {
        self.violations.get()
    }

    pub fn trace_step(&self, indent: usize, op: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().steps += 1;
        }
        self.write_msg(indent, format_args!("[STEP] {}", op));
    }

    pub fn trace_method_entry(&self, indent: usize, name: &str, signature: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().frames_pushed += 1;
        }
        if signature.is_empty() {
            self.write_msg(indent, format_args!("-> CALL {}", name));
        } else {
            self.write_msg(indent, format_args!("-> CALL {} {}", name, signature));
        }
    }

    pub fn trace_method_exit(&self, indent: usize, name: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().frames_popped += 1;
        }
        self.write_msg(indent, format_args!("<- RET  {}", name));
    }

    pub fn trace_monitor(&self, indent: usize, event: &str, details: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().monitor_events += 1;
        }
        self.write_msg(indent, format_args!("* LOCK {} ({})", event, details));
    }

    pub fn trace_wake(&self, indent: usize, details: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().wakes += 1;
        }
        self.write_msg(indent, format_args!("* WAKE {}", details));
    }

    pub fn trace_class_init(&self, indent: usize, class_name: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().class_inits += 1;
        }
        self.write_msg(indent, format_args!("* INIT {}", class_name));
    }

    pub fn trace_exception(&self, indent: usize, class_name: &str, message: &str) {
        if !self.enabled {
            return;
        }
        if self.detailed_stats {
            self.stats.borrow_mut().exceptions_raised += 1;
        }
        self.write_msg(indent, format_args!("! EXC  {} ({})", class_name, message));
    }

    pub fn get_stats(&self) -> TraceStats {
        self.stats.borrow().clone()
    }

    pub fn print_stats(&self) {
        if !self.detailed_stats {
            return;
        }
        let stats = self.stats.borrow();
        eprintln!("\n=== Tracer Statistics ===");
        eprintln!("Total messages:    {:>12}", stats.total_messages);
        eprintln!("Steps:             {:>12}", stats.steps);
        eprintln!("Frames pushed:     {:>12}", stats.frames_pushed);
        eprintln!("Frames popped:     {:>12}", stats.frames_popped);
        eprintln!("Monitor events:    {:>12}", stats.monitor_events);
        eprintln!("Wakes:             {:>12}", stats.wakes);
        eprintln!("Class inits:       {:>12}", stats.class_inits);
        eprintln!("Exceptions raised: {:>12}", stats.exceptions_raised);
        eprintln!("========================\n");
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        // Print stats on drop if enabled
        if self.detailed_stats && self.enabled {
            self.print_stats();
        }
        // Final flush on drop
        self.flush();
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_counted_without_tracing() {
        let tracer = Tracer {
            enabled: false,
            writer: RefCell::new(None),
            message_count: Cell::new(0),
            auto_flush_interval: AUTO_FLUSH_INTERVAL,
            stats: RefCell::new(TraceStats::default()),
            detailed_stats: false,
            violations: Cell::new(0),
        };
        assert_eq!(tracer.violation_count(), 0);
        tracer.record_violation();
        tracer.record_violation();
        assert_eq!(tracer.violation_count(), 2);
    }
}
