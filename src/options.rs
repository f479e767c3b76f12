use crate::{
    error::{error_validation, Error},
    MAX_KEY_LEN, MAX_VALUE_LEN,
};

/// Options for a Tree
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub struct TreeOptions {
    /// Whether full basic leafs should be converted to dense leafs when possible.
    ///
    /// Leafs holding fixed length keys that form a (nearly) contiguous numeric range, like
    /// big-endian integer ids, only need a presence bit and the value for each key when dense.
    /// Disabling this keeps every node in the basic representation.
    ///
    /// Default: `true`
    pub dense_leaves: bool,
    /// Maximum key length accepted by [crate::Tree::insert]. Can't exceed [MAX_KEY_LEN].
    ///
    /// Default: `256`
    pub max_key_len: usize,
    /// Maximum value length accepted by [crate::Tree::insert]. Can't exceed [MAX_VALUE_LEN].
    ///
    /// Default: `1024`
    pub max_value_len: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            dense_leaves: true,
            max_key_len: MAX_KEY_LEN,
            max_value_len: MAX_VALUE_LEN,
        }
    }
}

impl TreeOptions {
    /// Creates a new TreeOptions with the default values
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.max_key_len == 0 || self.max_key_len > MAX_KEY_LEN {
            return Err(error_validation!(
                "max_key_len ({}) must be between 1 and {MAX_KEY_LEN}",
                self.max_key_len
            ));
        }
        if self.max_value_len > MAX_VALUE_LEN {
            return Err(error_validation!(
                "max_value_len ({}) exceeds {MAX_VALUE_LEN}",
                self.max_value_len
            ));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let options: Self = serde_json::from_slice(bytes)?;
        options.validate()?;
        Ok(options)
    }
}
