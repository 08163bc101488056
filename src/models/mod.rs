mod category;
mod task;

pub use category::{
    normalize_name, Category, CategoryPatch, CategorySummary, NewCategory, DEFAULT_COLOR,
};
pub use task::{
    parse_due_date, Attachment, NewFile, NewTask, Task, TaskChanges, TaskFilter, TaskPatch, TaskPriority,
    TaskStatus, TaskView,
};

use serde::{Deserialize, Deserializer};

/// Update instruction for a field that can be cleared.
///
/// `Keep` is what a missing request field deserializes to (with
/// `#[serde(default)]`), `Clear` is an explicit `null`, `Set` carries a value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            FieldUpdate::Keep => current,
            FieldUpdate::Clear => None,
            FieldUpdate::Set(value) => Some(value),
        }
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            FieldUpdate::Set(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldUpdate<U> {
        match self {
            FieldUpdate::Keep => FieldUpdate::Keep,
            FieldUpdate::Clear => FieldUpdate::Clear,
            FieldUpdate::Set(value) => FieldUpdate::Set(f(value)),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<FieldUpdate<U>, E> {
        Ok(match self {
            FieldUpdate::Keep => FieldUpdate::Keep,
            FieldUpdate::Clear => FieldUpdate::Clear,
            FieldUpdate::Set(value) => FieldUpdate::Set(f(value)?),
        })
    }
}

impl FieldUpdate<String> {
    /// Blank strings clear the field, other values are trimmed.
    pub fn non_blank(self) -> Self {
        match self {
            FieldUpdate::Set(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    FieldUpdate::Clear
                } else {
                    FieldUpdate::Set(trimmed.to_string())
                }
            }
            other => other,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldUpdate<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => FieldUpdate::Set(value),
            None => FieldUpdate::Clear,
        })
    }
}
