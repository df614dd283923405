use serde::{Deserialize, Serialize};

/// Well-known tag keys.
pub mod keys {
    pub const ACTION: &str = "action";
    pub const SENDER: &str = "sender";
    pub const RECIPIENT: &str = "recipient";
    pub const VALIDATOR: &str = "validator";
    pub const DELEGATOR: &str = "delegator";
    pub const PROPOSAL_ID: &str = "proposal-id";
    pub const PROPOSAL_RESULT: &str = "proposal-result";
    pub const REQUEST_ID: &str = "request-id";
    pub const MODULE: &str = "module";
}

/// A key/value event record surfaced to the consensus engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Ordered sequence of tags. Concatenation preserves order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style append.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.push(Tag {
            key: key.into(),
            value: value.to_string(),
        });
    }

    /// Append every tag of `other` after the existing ones.
    pub fn append(&mut self, other: Tags) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// First value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn into_vec(self) -> Vec<Tag> {
        self.0
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut a = Tags::new().with(keys::ACTION, "slash");
        let b = Tags::new().with(keys::ACTION, "mint").with(keys::MODULE, "mint");
        a.append(b);
        let values: Vec<&str> = a.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["slash", "mint", "mint"]);
        assert_eq!(a.get(keys::ACTION), Some("slash"));
    }
}
