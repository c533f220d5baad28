use std::collections::BTreeMap;

use crate::error::{PicturaError, PicturaResult};

/// Alias name to canonical filter-spec string, loaded once at startup and
/// read-only per request.
pub type NamedFilters = BTreeMap<String, String>;

/// Characters a raw filter token may contain. Pipes never appear in user
/// tokens; they are introduced by the join below (named-filter values may
/// carry them, those come from trusted configuration).
fn is_allowed_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '{' | '}' | ','))
}

/// Expands raw filter tokens into canonical pipe-joined spec strings.
///
/// Each token is first substituted through `named_filters`. At most one
/// token per call may use the brace-expansion syntax
/// `prefix{a,b,c}suffix`, which produces one sibling spec per brace-list
/// entry. Every expanded variant is joined with all non-expanded tokens in
/// their written order, variant first:
///
/// `["width-{320,640}", "format-webp"]` becomes
/// `["width-320|format-webp", "width-640|format-webp"]`.
pub fn expand_filter_specs<S: AsRef<str>>(
    tokens: &[S],
    named_filters: &NamedFilters,
) -> PicturaResult<Vec<String>> {
    if tokens.is_empty() {
        return Err(PicturaError::malformed_spec("no resize rule provided"));
    }

    // Plain tokens keep their written order; at most one token expands.
    let mut plain: Vec<String> = Vec::new();
    let mut expanded: Vec<String> = Vec::new();

    for token in tokens {
        let token = token.as_ref();
        if !is_allowed_token(token) {
            return Err(PicturaError::malformed_spec(format!(
                "filter specs may only contain A-Z, a-z, 0-9, dots, hyphens, \
                 underscores, curly braces and commas (given filter: '{token}')"
            )));
        }
        let token = named_filters
            .get(token)
            .map(String::as_str)
            .unwrap_or(token);

        if !token.contains('{') {
            if token.contains('}') {
                return Err(PicturaError::malformed_spec(format!(
                    "unmatched '}}' in filter '{token}'"
                )));
            }
            plain.push(token.to_string());
            continue;
        }

        if !expanded.is_empty() {
            return Err(PicturaError::multiple_expansion(format!(
                "at most one filter may use brace-expansion, got '{}' and '{token}'",
                expanded_source(&expanded)
            )));
        }

        let mut parts = token.splitn(3, '{');
        let prefix = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(PicturaError::malformed_spec(format!(
                "expected at most one brace-expansion pattern per filter, \
                 got more in '{token}'"
            )));
        }

        let (repeats, suffix) = match rest.split_once('}') {
            Some((repeats, suffix)) if !suffix.contains('}') => (repeats, suffix),
            _ => {
                return Err(PicturaError::malformed_spec(format!(
                    "malformed brace-expansion pattern in '{token}'"
                )));
            }
        };

        expanded = repeats
            .split(',')
            .map(|repeat| format!("{prefix}{repeat}{suffix}"))
            .collect();
    }

    if expanded.is_empty() {
        return Ok(vec![plain.join("|")]);
    }

    Ok(expanded
        .into_iter()
        .map(|variant| {
            let mut ops = vec![variant];
            ops.extend(plain.iter().cloned());
            ops.join("|")
        })
        .collect())
}

// Recovers a display form of the already-seen expansion for the error
// message; lossy for suffix/prefix but enough to point at the culprit.
fn expanded_source(expanded: &[String]) -> String {
    expanded.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(tokens: &[&str]) -> PicturaResult<Vec<String>> {
        expand_filter_specs(tokens, &NamedFilters::new())
    }

    #[test]
    fn plain_tokens_pipe_join() {
        assert_eq!(
            expand(&["width-400", "format-webp"]).unwrap(),
            vec!["width-400|format-webp".to_string()]
        );
    }

    #[test]
    fn brace_expansion_preserves_entry_order() {
        assert_eq!(
            expand(&["fill-{100x100,200x200}-c80"]).unwrap(),
            vec!["fill-100x100-c80".to_string(), "fill-200x200-c80".to_string()]
        );
    }

    #[test]
    fn expansion_variant_precedes_plain_tokens() {
        assert_eq!(
            expand(&["format-webp", "width-{320,640}"]).unwrap(),
            vec![
                "width-320|format-webp".to_string(),
                "width-640|format-webp".to_string()
            ]
        );
    }

    #[test]
    fn two_expansion_tokens_rejected() {
        let err = expand(&["width-{320,640}", "fill-{1x1,2x2}"]).unwrap_err();
        assert!(matches!(err, PicturaError::MultipleExpansion(_)));
    }

    #[test]
    fn two_brace_blocks_in_one_token_rejected() {
        let err = expand(&["width-{320,640}-{a,b}"]).unwrap_err();
        assert!(matches!(err, PicturaError::MalformedSpec(_)));
    }

    #[test]
    fn unterminated_brace_rejected() {
        let err = expand(&["width-{320,640"]).unwrap_err();
        assert!(matches!(err, PicturaError::MalformedSpec(_)));

        let err = expand(&["width-320}"]).unwrap_err();
        assert!(matches!(err, PicturaError::MalformedSpec(_)));
    }

    #[test]
    fn disallowed_characters_rejected() {
        let err = expand(&["width-400;drop"]).unwrap_err();
        assert!(matches!(err, PicturaError::MalformedSpec(_)));
    }

    #[test]
    fn empty_token_list_rejected() {
        let err = expand(&[]).unwrap_err();
        assert!(matches!(err, PicturaError::MalformedSpec(_)));
    }

    #[test]
    fn named_filter_substitution_runs_before_expansion() {
        let mut named = NamedFilters::new();
        named.insert("hero".to_string(), "fill-{1600x900,800x450}-c80".to_string());
        assert_eq!(
            expand_filter_specs(&["hero", "format-webp"], &named).unwrap(),
            vec![
                "fill-1600x900-c80|format-webp".to_string(),
                "fill-800x450-c80|format-webp".to_string()
            ]
        );
    }

    #[test]
    fn named_filter_value_may_carry_pipes() {
        let mut named = NamedFilters::new();
        named.insert("thumb".to_string(), "fill-400x300|jpegquality-60".to_string());
        assert_eq!(
            expand_filter_specs(&["thumb"], &named).unwrap(),
            vec!["fill-400x300|jpegquality-60".to_string()]
        );
    }
}
