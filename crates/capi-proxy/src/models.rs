//! Static model catalogue served by `/v1/models`.

use crate::types::{ModelCard, ModelList};

const MODELS: &[(&str, i64, &str)] = &[
    ("claude-3-5-sonnet-20241022", 1713744000, "anthropic"),
    ("claude-3-opus", 1709251200, "anthropic"),
    ("claude-3.5-haiku", 1711929600, "anthropic"),
    ("claude-3.5-sonnet", 1711929600, "anthropic"),
    ("cursor-small", 1712534400, "cursor"),
    ("gpt-3.5-turbo", 1677649200, "openai"),
    ("gpt-4", 1687392000, "openai"),
    ("gpt-4-turbo-2024-04-09", 1712620800, "openai"),
    ("gpt-4o", 1712620800, "openai"),
    ("gpt-4o-mini", 1712620800, "openai"),
    ("o1-mini", 1712620800, "openai"),
    ("o1-preview", 1712620800, "openai"),
];

pub fn available_models() -> ModelList {
    ModelList {
        object: "list".to_string(),
        data: MODELS
            .iter()
            .map(|(id, created, owned_by)| ModelCard {
                id: id.to_string(),
                object: "model".to_string(),
                created: *created,
                owned_by: owned_by.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue() {
        let list = available_models();
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), 12);
        assert!(list.data.iter().all(|m| m.object == "model"));
        assert!(list
            .data
            .iter()
            .any(|m| m.id == "gpt-4o" && m.owned_by == "openai"));
    }
}
