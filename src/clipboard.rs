use anyhow::Result;
use tracing::debug;

/// A source of clipboard text.
pub trait Clipboard {
    /// Current clipboard text. Non-text or empty content reads as `""`.
    fn read_text(&mut self) -> Result<String>;
}

/// The OS clipboard. The handle is opened lazily and reopened after errors.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SystemClipboard {
    fn read_text(&mut self) -> Result<String> {
        let mut clipboard = match self.inner.take() {
            Some(c) => c,
            None => arboard::Clipboard::new()
                .map_err(|e| anyhow::anyhow!("Failed to open clipboard: {e}"))?,
        };
        match clipboard.get_text() {
            Ok(text) => {
                self.inner = Some(clipboard);
                Ok(text)
            }
            Err(arboard::Error::ContentNotAvailable) => {
                self.inner = Some(clipboard);
                Ok(String::new())
            }
            Err(e) => {
                debug!("Dropping clipboard handle after error: {e}");
                Err(e.into())
            }
        }
    }
}
