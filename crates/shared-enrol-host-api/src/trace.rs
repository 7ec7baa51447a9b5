//! Progress traces for long-running jobs
//!
//! The sweep reports human-readable progress lines. They are informational
//! only and never drive control flow.

use tracing::info;

/// Sink for progress lines
pub trait ProgressTrace {
    /// Write one line, indented by `depth`
    fn output(&mut self, message: &str, depth: usize);

    /// The job is done; no more output follows
    fn finished(&mut self) {}
}

/// Forwards progress lines to the `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingTrace;

impl ProgressTrace for TracingTrace {
    fn output(&mut self, message: &str, depth: usize) {
        info!(target: "shared_enrol::trace", depth, "{}", message);
    }
}

/// Keeps lines in memory
#[derive(Debug, Default)]
pub struct BufferTrace {
    lines: Vec<String>,
    finished: bool,
}

impl BufferTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines with their indentation applied
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl ProgressTrace for BufferTrace {
    fn output(&mut self, message: &str, depth: usize) {
        self.lines.push(format!("{}{}", "  ".repeat(depth), message));
    }

    fn finished(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_trace_indents_by_depth() {
        let mut trace = BufferTrace::new();
        trace.output("top", 0);
        trace.output("nested", 1);
        trace.finished();

        assert_eq!(trace.lines(), ["top", "  nested"]);
        assert!(trace.is_finished());
        assert!(trace.contains("nested"));
    }
}
