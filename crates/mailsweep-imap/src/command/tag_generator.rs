//! Command tag generator.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Tag;

/// Generates sequential tags of the form `A0000`, `A0001`, ...
///
/// Tags only need to be unique among outstanding commands, so the counter
/// wraps instead of failing after `u32::MAX` commands.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Returns the next tag.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Tag::new(format!("{}{:04}", self.prefix, n))
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_tags() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next().as_str(), "A0000");
        assert_eq!(generator.next().as_str(), "A0001");
    }

    #[test]
    fn custom_prefix_and_padding() {
        let generator = TagGenerator::new('S');
        for _ in 0..100 {
            let _ = generator.next();
        }
        assert_eq!(generator.next().as_str(), "S0100");
    }

    #[test]
    fn wraps_instead_of_panicking() {
        let generator = TagGenerator::default();
        generator.counter.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(generator.next().as_str(), format!("A{}", u32::MAX));
        assert_eq!(generator.next().as_str(), "A0000");
    }
}
