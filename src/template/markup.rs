//! Markup-mode templating
//!
//! Widget markup is rendered with Mustache: `{{x}}` is HTML-escaped, `{{{x}}}`
//! inserts raw markup (used for already-rendered children), sections drive
//! conditionals and loops. Templates are compiled once by the widget registry.

use serde::Serialize;

use crate::errors::FormError;

/// Compile a widget template
pub fn compile_markup(source: &str) -> Result<mustache::Template, FormError> {
    Ok(mustache::compile_str(source)?)
}

/// Render a compiled template against any serializable context
pub fn render_markup<T: Serialize>(template: &mustache::Template, context: &T) -> Result<String, FormError> {
    Ok(template.render_to_string(context)?)
}

/// Turn an arbitrary key into something usable as a CSS class or id fragment
///
/// `friends[2].name` becomes `friends-2---name`.
pub fn slugify(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' => "--".to_string(),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => c.to_string(),
            _ => "-".to_string(),
        })
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Escape an element id for use in a `#id` CSS selector
pub fn escape_selector(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if "!\"#$%&'()*+,./:;<=>?@[\\]^`{|}~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_escapes_by_default() {
        let template = compile_markup("<b>{{title}}</b>{{{children}}}").unwrap();
        let html = render_markup(&template, &json!({"title": "a<b", "children": "<i>x</i>"})).unwrap();
        assert_eq!(html, "<b>a&lt;b</b><i>x</i>");
    }

    #[test]
    fn test_sections_drive_conditionals() {
        let template = compile_markup("{{#required}}*{{/required}}{{^required}}-{{/required}}").unwrap();
        assert_eq!(render_markup(&template, &json!({"required": true})).unwrap(), "*");
        assert_eq!(render_markup(&template, &json!({"required": false})).unwrap(), "-");
    }

    #[test]
    fn test_slugify_and_selector() {
        assert_eq!(slugify("friends[2].name"), "friends-2---name");
        assert_eq!(slugify("a b"), "a-b");
        assert_eq!(escape_selector("jsonform-1-elt-a[0]"), "jsonform-1-elt-a\\[0\\]");
    }
}
