use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

const RULE_WIDTH: usize = 50;

/// Shared terminal sink. Every call writes whole lines under one lock, so
/// output from the watcher, the command loop and the renderer never splices.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Print one line.
    pub fn line(&self, text: impl Display) {
        self.write_str(&format!("{text}\n"));
    }

    /// Print without a trailing newline (prompts).
    pub fn prompt(&self, text: impl Display) {
        self.write_str(&text.to_string());
    }

    /// Print the status banner: locked topic plus command help.
    pub fn banner(&self, topic: &str) {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        self.write_str(&format!(
            "\n{heavy}\n\
             STATUS: LOCKED TOPIC -> {topic}\n\
             {light}\n\
             -> [Auto-Capture] Copy any text to save it.\n\
             -> [/topic <name>] or [/ <name>] Change research topic.\n\
             -> [/list]         See all existing topics in your vault.\n\
             -> [I am done]     Publish current topic to Confluence.\n\
             {heavy}\n\n"
        ));
    }

    fn write_str(&self, s: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed terminal leaves nothing useful to report to.
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
    }
}

/// In-memory console for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Captured {
    pub fn console() -> (Console, Captured) {
        let captured = Captured::default();
        (Console::from_writer(captured.clone()), captured)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

#[cfg(test)]
impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
