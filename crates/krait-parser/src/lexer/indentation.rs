//! The indentation stack.
//!
//! Indentation is measured two ways at once: in columns (a tab advances to
//! the next multiple of 8) and in raw characters. Two measurements that
//! disagree about ordering mean the source mixes tabs and spaces ambiguously,
//! which is a tokenizer error rather than a guess.

use std::cmp::Ordering;

/// The leading whitespace of one logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Indentation {
    column: u32,
    character: u32,
}

/// Marker error: tab/space mix makes two indentations incomparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AmbiguousIndentation;

impl Indentation {
    const TAB_SIZE: u32 = 8;

    pub(crate) const fn root() -> Self {
        Indentation {
            column: 0,
            character: 0,
        }
    }

    #[must_use]
    pub(crate) fn add_space(self) -> Self {
        Indentation {
            column: self.column + 1,
            character: self.character + 1,
        }
    }

    #[must_use]
    pub(crate) fn add_tab(self) -> Self {
        Indentation {
            column: (self.column / Self::TAB_SIZE + 1) * Self::TAB_SIZE,
            character: self.character + 1,
        }
    }

    /// Compare two indentation levels, failing when the column and character
    /// counts order differently.
    pub(crate) fn try_compare(self, other: Indentation) -> Result<Ordering, AmbiguousIndentation> {
        let column_ordering = self.column.cmp(&other.column);
        let character_ordering = self.character.cmp(&other.character);
        if column_ordering == character_ordering {
            Ok(column_ordering)
        } else {
            Err(AmbiguousIndentation)
        }
    }
}

/// The stack of open indentation levels. The implicit bottom entry is the
/// zero-column root, which is never popped.
#[derive(Debug, Clone, Default)]
pub(crate) struct Indentations {
    stack: Vec<Indentation>,
}

impl Indentations {
    pub(crate) fn current(&self) -> Indentation {
        self.stack.last().copied().unwrap_or(Indentation::root())
    }

    pub(crate) fn indent(&mut self, indentation: Indentation) {
        debug_assert_eq!(
            self.current().try_compare(indentation),
            Ok(Ordering::Less)
        );
        self.stack.push(indentation);
    }

    /// Pop one level. Returns the popped level, or `None` at the root.
    pub(crate) fn dedent(&mut self) -> Option<Indentation> {
        self.stack.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }
}
