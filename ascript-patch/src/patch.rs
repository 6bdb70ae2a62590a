use crate::error::PatchError;

/// One `find` → `replace` substitution, applied exactly once against the
/// text as it stands after every prior patch in the list has already run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOp {
    pub find: String,
    pub replace: String,
}

/// Applies `patches` to `original` in order, replacing the first occurrence
/// of each `find`. Failing closed on a missing `find` (rather than silently
/// leaving the file untouched) means a script that assumed a patch applied
/// can never proceed believing something happened that didn't.
pub fn apply(original: &str, patches: &[PatchOp]) -> Result<String, PatchError> {
    let mut text = original.to_string();
    for patch in patches {
        let Some(pos) = text.find(patch.find.as_str()) else {
            return Err(PatchError::FindNotFound(patch.find.clone()));
        };
        text.replace_range(pos..pos + patch.find.len(), &patch.replace);
    }
    Ok(text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn applies_patches_in_order() {
        let result = apply(
            "version = 1\nname = demo\n",
            &[
                PatchOp { find: "version = 1".to_string(), replace: "version = 2".to_string() },
                PatchOp { find: "name = demo".to_string(), replace: "name = renamed".to_string() },
            ],
        )
        .unwrap();
        assert_eq!(result, "version = 2\nname = renamed\n");
    }

    #[test]
    fn fails_closed_when_find_text_is_missing() {
        let err = apply("hello world", &[PatchOp { find: "goodbye".to_string(), replace: "x".to_string() }]).unwrap_err();
        assert_eq!(err, PatchError::FindNotFound("goodbye".to_string()));
    }

    #[test]
    fn later_patches_see_earlier_edits() {
        let result = apply(
            "a",
            &[PatchOp { find: "a".to_string(), replace: "ab".to_string() }, PatchOp { find: "ab".to_string(), replace: "abc".to_string() }],
        )
        .unwrap();
        assert_eq!(result, "abc");
    }

    #[test]
    fn replaces_only_the_first_occurrence() {
        let result = apply("aa", &[PatchOp { find: "a".to_string(), replace: "b".to_string() }]).unwrap();
        assert_eq!(result, "ba");
    }
}
