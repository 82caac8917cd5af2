use serde::Deserialize;

/// Three-valued patch for nullable fields in partial updates.
///
/// Distinguishes "leave the stored value alone" from "clear it" so a single
/// nullable input cannot conflate the two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ValuePatch<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> ValuePatch<T> {
    /// Applies the patch to `current`, returning the resulting value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            ValuePatch::Unchanged => current,
            ValuePatch::Clear => None,
            ValuePatch::Set(value) => Some(value),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, ValuePatch::Unchanged)
    }
}

/// Decodes a JSON field where absence means `Unchanged`, an explicit `null`
/// means `Clear`, and any other value means `Set`.
///
/// Use with `#[serde(default, deserialize_with = "...")]` on an
/// `Option`-free `ValuePatch` field; serde only invokes the deserializer when
/// the key is present, so the `default` covers `Unchanged`.
pub fn deserialize_patch<'de, D, T>(deserializer: D) -> Result<ValuePatch<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<T>::deserialize(deserializer)?;
    Ok(match value {
        Some(inner) => ValuePatch::Set(inner),
        None => ValuePatch::Clear,
    })
}
