//! Source code registry entries and source references.
//!
//! A [`SourceRef`] tags compiled instructions with the span of guest source
//! they came from. The debugger uses the same references for breakpoint
//! placement and error messages use them for location prefixes.

use crate::ScriptId;

/// Weight applied to every line of distance when choosing the nearest
/// breakable location.
const PER_LINE_FACTOR: u64 = 1600;

/// A span of guest source attached to an instruction.
///
/// Lines and columns are 1-based and inclusive.
///
/// # Examples
///
/// ```
/// use core_types::SourceRef;
///
/// let sref = SourceRef::new(0, 3, 1, 3, 12);
/// assert!(sref.includes_location(0, 3, 5));
/// assert_eq!(sref.get_location_distance(0, 5, 1), 3200);
/// assert_eq!(sref.get_location_distance(1, 3, 5), u64::MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Index of the owning [`SourceCode`] within its script
    pub source_idx: usize,
    /// First line of the span
    pub from_line: usize,
    /// First column on `from_line`
    pub from_char: usize,
    /// Last line of the span
    pub to_line: usize,
    /// Last column on `to_line`
    pub to_char: usize,
    /// Whether stepping should stop on this reference
    pub is_step_stop: bool,
    /// Synthetic code that must never receive a breakpoint
    pub cannot_breakpoint: bool,
}

impl SourceRef {
    /// Create a step-stop reference for a statement span.
    pub fn new(
        source_idx: usize,
        from_line: usize,
        from_char: usize,
        to_line: usize,
        to_char: usize,
    ) -> Self {
        Self {
            source_idx,
            from_line,
            from_char,
            to_line,
            to_char,
            is_step_stop: true,
            cannot_breakpoint: false,
        }
    }

    /// Location used for frames that belong to host callbacks.
    pub fn host_location() -> Self {
        Self {
            source_idx: usize::MAX,
            from_line: 0,
            from_char: 0,
            to_line: 0,
            to_char: 0,
            is_step_stop: false,
            cannot_breakpoint: true,
        }
    }

    /// True for the synthetic host location.
    pub fn is_host_location(&self) -> bool {
        self.source_idx == usize::MAX
    }

    /// Mark this reference as synthetic code that cannot be broken on.
    pub fn non_breakable(mut self) -> Self {
        self.cannot_breakpoint = true;
        self.is_step_stop = false;
        self
    }

    /// True if the location `(line, col)` of source `source_idx` is inside
    /// this span.
    pub fn includes_location(&self, source_idx: usize, line: usize, col: usize) -> bool {
        if source_idx != self.source_idx || line < self.from_line || line > self.to_line {
            return false;
        }

        if self.from_line == self.to_line {
            return col >= self.from_char && col <= self.to_char;
        }
        if line == self.from_line {
            return col >= self.from_char;
        }
        if line == self.to_line {
            return col <= self.to_char;
        }

        true
    }

    /// Distance between this span and a location. Lines weigh far more than
    /// columns; a location in another source is infinitely far away.
    pub fn get_location_distance(&self, source_idx: usize, line: usize, col: usize) -> u64 {
        if source_idx != self.source_idx {
            return u64::MAX;
        }

        let line_distance = |a: usize, b: usize| (a.abs_diff(b) as u64) * PER_LINE_FACTOR;

        if self.from_line == self.to_line {
            if line == self.from_line {
                if col < self.from_char {
                    (self.from_char - col) as u64
                } else if col > self.to_char {
                    (col - self.to_char) as u64
                } else {
                    0
                }
            } else {
                line_distance(line, self.from_line)
            }
        } else if line == self.from_line {
            self.from_char.saturating_sub(col) as u64
        } else if line == self.to_line {
            col.saturating_sub(self.to_char) as u64
        } else if line > self.from_line && line < self.to_line {
            0
        } else if line < self.from_line {
            line_distance(self.from_line, line)
        } else {
            line_distance(line, self.to_line)
        }
    }

    /// Render this reference as a location prefix.
    ///
    /// The classic form is `name:line`; the detailed form adds the column
    /// range, e.g. `name:(Line 3, Position 5-9)`.
    pub fn format_location(&self, source_name: &str, classic: bool) -> String {
        if self.is_host_location() {
            return "[host]".to_string();
        }
        if classic {
            return format!("{}:{}", source_name, self.from_line);
        }

        if self.from_line == self.to_line {
            if self.from_char == self.to_char {
                format!(
                    "{}:(Line {}, Position {})",
                    source_name, self.from_line, self.from_char
                )
            } else {
                format!(
                    "{}:(Line {}, Position {}-{})",
                    source_name, self.from_line, self.from_char, self.to_char
                )
            }
        } else {
            format!(
                "{}:(Line {}, Position {}-{},{})",
                source_name, self.from_line, self.from_char, self.to_line, self.to_char
            )
        }
    }
}

/// A chunk of guest source registered with a script after it compiled.
///
/// Immutable once registered; `refs` lists every source reference the
/// compiler produced for it, in emission order.
#[derive(Debug, Clone)]
pub struct SourceCode {
    /// Index of this source within its script
    pub id: usize,
    /// Friendly name, e.g. `chunk_3` or a file path
    pub name: String,
    /// Raw text
    pub code: String,
    /// Script that owns this source
    pub owner: ScriptId,
    /// Source references produced by compilation
    pub refs: Vec<SourceRef>,
}

impl SourceCode {
    /// Lines of the source, 1-based access through [`SourceCode::line`].
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.code.lines()
    }

    /// Text of a 1-based line.
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1).and_then(|idx| self.code.lines().nth(idx))
    }

    /// Breakable references covering `line`.
    pub fn breakable_refs_on_line(&self, line: usize) -> impl Iterator<Item = &SourceRef> {
        self.refs
            .iter()
            .filter(move |r| !r.cannot_breakpoint && r.from_line <= line && line <= r.to_line)
    }
}
