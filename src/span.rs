use std::{fmt, rc::Rc};

/// A byte range into a shared source buffer. Cloning shares the buffer, so
/// tokens can be copied around freely while the source text is alive.
#[derive(Clone, Debug)]
pub struct SourceSpan {
    source: Rc<str>,
    start: usize,
    end: usize,
}

impl SourceSpan {
    pub fn new(source: Rc<str>, start: usize, end: usize) -> SourceSpan {
        SourceSpan { source, start, end }
    }

    /// A span that owns its own text, used for scanner error messages that
    /// do not correspond to a region of the source.
    pub fn detached(text: &str) -> SourceSpan {
        SourceSpan {
            source: Rc::from(text),
            start: 0,
            end: text.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl PartialEq for SourceSpan {
    fn eq(&self, other: &SourceSpan) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for SourceSpan {}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
