use std::cell::RefCell;
use std::io::{self, Write as _};
use std::rc::Rc;

/// Trait for handling output from the `print` builtin.
///
/// Implement this to capture or redirect output from interpreted SPy code.
/// The default implementation [`StdPrint`] writes to stdout.
pub trait PrintWriter {
    /// Called once with the formatted text of a single `print` argument,
    /// without a trailing newline.
    fn stdout_write(&mut self, output: &str);

    /// Adds a single character to stdout, used for separators and newlines.
    fn stdout_push(&mut self, end: char);
}

/// Default `PrintWriter` that writes straight to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: &str) {
        let _ = io::stdout().write_all(output.as_bytes());
    }

    fn stdout_push(&mut self, end: char) {
        let mut buf = [0u8; 4];
        let _ = io::stdout().write_all(end.encode_utf8(&mut buf).as_bytes());
        if end == '\n' {
            let _ = io::stdout().flush();
        }
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing program output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: &str) {
        self.0.push_str(output);
    }

    fn stdout_push(&mut self, end: char) {
        self.0.push(end);
    }
}

/// A `PrintWriter` writing into a shared buffer.
///
/// Cloning shares the buffer, so a caller can hand one clone to the VM and
/// keep the other to inspect the output afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedStringPrint(Rc<RefCell<String>>);

impl SharedStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The output collected so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.borrow().clone()
    }
}

impl PrintWriter for SharedStringPrint {
    fn stdout_write(&mut self, output: &str) {
        self.0.borrow_mut().push_str(output);
    }

    fn stdout_push(&mut self, end: char) {
        self.0.borrow_mut().push(end);
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: &str) {}

    fn stdout_push(&mut self, _end: char) {}
}
