//! Write-once fields for entity properties.

use serde::Serialize;

use super::error::{CompileError, Result};
use super::lexer::SourceLoc;

/// A property that may be given at most once, remembering where.
#[derive(Debug, Clone, Serialize)]
pub struct SetOnce<T> {
    value: Option<T>,
    #[serde(skip)]
    loc: Option<SourceLoc>,
}

impl<T> Default for SetOnce<T> {
    fn default() -> Self {
        Self {
            value: None,
            loc: None,
        }
    }
}

impl<T> SetOnce<T> {
    /// Store `value`, failing if a value was already set.
    ///
    /// `what` names the property and `owner` the entity, for the message.
    pub fn set(&mut self, value: T, loc: &SourceLoc, what: &str, owner: &str) -> Result<()> {
        if let Some(prev) = &self.loc {
            return Err(CompileError::redefinition(format!(
                "{what} for {owner} was already set on {}",
                prev.cite(loc)
            )));
        }
        self.value = Some(value);
        self.loc = Some(loc.clone());
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Copy> SetOnce<T> {
    pub fn copied(&self) -> Option<T> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_set_cites_first() {
        let mut f = SetOnce::default();
        f.set(3u8, &SourceLoc::new("a.pently", 2), "decay", "lead").unwrap();
        let err = f
            .set(4u8, &SourceLoc::new("a.pently", 5), "decay", "lead")
            .unwrap_err();
        assert_eq!(err.message, "decay for lead was already set on line 2");
        assert_eq!(f.copied(), Some(3));
    }

    #[test]
    fn empty_by_default() {
        let f: SetOnce<String> = SetOnce::default();
        assert!(!f.is_set());
        assert!(f.get().is_none());
    }
}
