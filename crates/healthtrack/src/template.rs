//! Placeholder substitution for the embedded HTML templates.
//!
//! Templates contain `{{name}}` markers. Values are inserted as given, so
//! anything user-supplied must pass through [`escape`] first.

use std::fmt::Write;

/// Escape text for use in HTML content and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace every `{{key}}` in `template` with its value.
///
/// The template is scanned once, so markers inside inserted values are left
/// alone. Unknown markers are kept as written.
#[must_use]
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            rest = &rest[start..];
            break;
        };
        let key = &after[..end];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => output.push_str(value),
            None => output.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    output
}

/// `<tr>` with one escaped `<td>` per cell.
#[must_use]
pub fn table_row<S: AsRef<str>>(cells: &[S]) -> String {
    let mut row = String::from("<tr>");
    for cell in cells {
        let _ = write!(row, "<td>{}</td>", escape(cell.as_ref()));
    }
    row.push_str("</tr>\n");
    row
}

/// Format an optional number with one decimal, or an empty string.
#[must_use]
pub fn opt1(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#x27;y&#x27;&lt;/script&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render(
            "<h1>{{title}}</h1><p>{{title}} by {{user}}</p>{{missing}}",
            &[("title", "Hi".to_string()), ("user", "bob".to_string())],
        );
        assert_eq!(out, "<h1>Hi</h1><p>Hi by bob</p>{{missing}}");
    }

    #[test]
    fn test_render_does_not_expand_inserted_values() {
        let out = render(
            "<input value=\"{{first_name}}\">{{options}}",
            &[
                ("first_name", escape("{{options}}")),
                ("options", "<option>M</option>".to_string()),
            ],
        );
        assert_eq!(out, "<input value=\"{{options}}\"><option>M</option>");
        assert_eq!(render("unclosed {{tail", &[]), "unclosed {{tail");
    }

    #[test]
    fn test_table_row_escapes_cells() {
        assert_eq!(
            table_row(&["a<b", "7.5"]),
            "<tr><td>a&lt;b</td><td>7.5</td></tr>\n"
        );
    }

    #[test]
    fn test_opt1() {
        assert_eq!(opt1(Some(70.04)), "70.0");
        assert_eq!(opt1(None), "");
    }
}
