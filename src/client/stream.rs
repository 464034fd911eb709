//! Event-stream frame decoding.

/// Reassembles `data:` lines into frames.
///
/// A frame ends at the first blank line. Comment lines (`:`) and other
/// fields are skipped; several `data:` lines in one frame are joined with
/// `\n`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). Returns a frame when `line`
    /// completed one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_string());
        }
        None
    }
}
