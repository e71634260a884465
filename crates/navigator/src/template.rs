//! URI-template subset: positional `{x}` and query `{?x}` / `{?x,y,z}`
//! expansion. Unresolved variables are elided.

use std::collections::BTreeMap;

/// Expand a template against a variable map.
pub fn expand_template(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            // Unbalanced brace: emit verbatim.
            out.push_str(&rest[open..]);
            return out;
        };
        let expr = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];
        if let Some(names) = expr.strip_prefix('?') {
            let pairs: Vec<String> = names
                .split(',')
                .filter_map(|name| {
                    let name = name.trim();
                    vars.get(name).map(|value| {
                        format!("{name}={}", urlencoding::encode(value))
                    })
                })
                .collect();
            if !pairs.is_empty() {
                out.push('?');
                out.push_str(&pairs.join("&"));
            }
        } else if let Some(value) = vars.get(expr.trim()) {
            out.push_str(value);
        }
        // Positional variables without a binding are elided.
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_positional_expansion() {
        assert_eq!(
            expand_template("https://h/nodes/{kind}/{slug}", &vars(&[("kind", "store"), ("slug", "hyprmart")])),
            "https://h/nodes/store/hyprmart"
        );
    }

    #[test]
    fn test_query_group_expansion() {
        assert_eq!(
            expand_template("https://h/catalog{?q,type}", &vars(&[("q", "widget"), ("type", "schema:Store")])),
            "https://h/catalog?q=widget&type=schema%3AStore"
        );
    }

    #[test]
    fn test_unresolved_variables_elided() {
        assert_eq!(
            expand_template("https://h/catalog{?q,type}", &vars(&[("q", "x")])),
            "https://h/catalog?q=x"
        );
        assert_eq!(expand_template("https://h/catalog{?q}", &vars(&[])), "https://h/catalog");
        assert_eq!(expand_template("https://h/{missing}/end", &vars(&[])), "https://h//end");
    }

    #[test]
    fn test_unbalanced_brace_left_verbatim() {
        assert_eq!(expand_template("https://h/{oops", &vars(&[])), "https://h/{oops");
    }
}
