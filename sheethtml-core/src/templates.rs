//! Document templates and `{placeholder}` substitution

use crate::error::TemplateError;

pub const SHEET_SLOTS: &[&str] = &["enc_sheet_name", "sheet_name", "table_generated_html"];
pub const SHEETNAME_SLOTS: &[&str] = &["enc_sheet_name", "sheet_name"];
pub const INDEX_SLOTS: &[&str] = &[
    "sheets_generated_html",
    "sheets_names_generated_html",
    "source_filename",
    "fonts_html",
    "core_css_html",
    "user_css_html",
    "generated_css_html",
    "generated_incell_css_html",
    "safari_js",
    "conditional_css_html",
];

const DEFAULT_SHEET_HTML: &str = r#"<section class="xlsx_sheet" id="{enc_sheet_name}" data-sheet-name="{sheet_name}">
<h2 class="xlsx_sheet-title">{sheet_name}</h2>
<div class="xlsx_sheet-table">
{table_generated_html}
</div>
</section>"#;

const DEFAULT_SHEETNAME_HTML: &str =
    r##"<li><a class="xlsx_sheet-nav" href="#{enc_sheet_name}">{sheet_name}</a></li>"##;

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{source_filename}</title>
{fonts_html}
{core_css_html}
{user_css_html}
{generated_css_html}
{generated_incell_css_html}
{conditional_css_html}
</head>
<body>
<nav class="xlsx_sheet-names"><ul>
{sheets_names_generated_html}
</ul></nav>
<main class="xlsx_sheets">
{sheets_generated_html}
</main>
{safari_js}
</body>
</html>
"#;

const DEFAULT_CORE_CSS: &str = "
body { margin: 0; font-family: Calibri, Carlito, Arial, sans-serif; }
.xlsx_sheet-names ul { display: flex; gap: 1em; list-style: none; margin: 0; padding: 0.5em; }
.xlsx_sheet { padding: 0.5em; overflow-x: auto; }
.xlsx_sheet table td { white-space: nowrap; overflow: hidden; font-size: 11px; vertical-align: bottom; }
.incell-image img { margin: auto; }
.js_visible { display: none; }
.js .js_visible { display: inline; }
.js .sharepoint_visible { display: none; }
";

const DEFAULT_SAFARI_JS: &str = r#"document.documentElement.classList.add("js");"#;

/// Caller supplied fragments making up the document
#[derive(Debug, Clone, PartialEq)]
pub struct Templates {
    pub sheet_html: String,
    pub sheetname_html: String,
    pub index_html: String,
    pub fonts_html: String,
    pub core_css: String,
    pub user_css: String,
    pub safari_js: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            sheet_html: DEFAULT_SHEET_HTML.to_string(),
            sheetname_html: DEFAULT_SHEETNAME_HTML.to_string(),
            index_html: DEFAULT_INDEX_HTML.to_string(),
            fonts_html: String::new(),
            core_css: DEFAULT_CORE_CSS.to_string(),
            user_css: String::new(),
            safari_js: DEFAULT_SAFARI_JS.to_string(),
        }
    }
}

impl Templates {
    /// Check placeholders of the three templates
    pub fn validate(&self) -> Result<(), TemplateError> {
        check("sheet_html", &self.sheet_html, SHEET_SLOTS, Some("table_generated_html"))?;
        check("sheetname_html", &self.sheetname_html, SHEETNAME_SLOTS, None)?;
        check("index_html", &self.index_html, INDEX_SLOTS, Some("sheets_generated_html"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Brace(char),
    Slot(&'a str),
}

fn tokenize<'a>(name: &'static str, template: &'a str) -> Result<Vec<Token<'a>>, TemplateError> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                tokens.push(Token::Text(&template[start..i]));
                tokens.push(Token::Brace(bytes[i] as char));
                i += 2;
                start = i;
            }
            b'{' => {
                let end = template[i + 1..]
                    .find(['{', '}'])
                    .map(|offset| i + 1 + offset)
                    .filter(|&end| bytes[end] == b'}')
                    .ok_or(TemplateError::UnbalancedBrace {
                        template: name,
                        position: i,
                    })?;
                tokens.push(Token::Text(&template[start..i]));
                tokens.push(Token::Slot(&template[i + 1..end]));
                i = end + 1;
                start = i;
            }
            b'}' => {
                return Err(TemplateError::UnbalancedBrace {
                    template: name,
                    position: i,
                });
            }
            _ => i += 1,
        }
    }
    tokens.push(Token::Text(&template[start..]));
    Ok(tokens)
}

fn check(
    name: &'static str,
    template: &str,
    slots: &[&str],
    required: Option<&'static str>,
) -> Result<(), TemplateError> {
    let tokens = tokenize(name, template)?;
    let mut used = Vec::new();
    for token in tokens {
        if let Token::Slot(slot) = token {
            if !slots.contains(&slot) {
                return Err(TemplateError::UnknownPlaceholder {
                    template: name,
                    placeholder: slot.to_string(),
                });
            }
            used.push(slot);
        }
    }
    if let Some(placeholder) = required
        && !used.contains(&placeholder)
    {
        return Err(TemplateError::MissingPlaceholder {
            template: name,
            placeholder,
        });
    }
    Ok(())
}

/// Substitute `{name}` slots; `{{` and `}}` become literal braces
pub fn fill(
    name: &'static str,
    template: &str,
    values: &[(&str, &str)],
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    for token in tokenize(name, template)? {
        match token {
            Token::Text(text) => output.push_str(text),
            Token::Brace(brace) => output.push(brace),
            Token::Slot(slot) => {
                let value = values
                    .iter()
                    .find(|(key, _)| *key == slot)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder {
                        template: name,
                        placeholder: slot.to_string(),
                    })?;
                output.push_str(value);
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(Templates::default().validate(), Ok(()));
    }

    #[test]
    fn test_fill_with_escaped_braces() {
        let out = fill(
            "sheet_html",
            "<style>.a {{ color: red; }}</style><p id=\"{enc_sheet_name}\">{sheet_name}</p>",
            &[("enc_sheet_name", "sheet_000"), ("sheet_name", "Data")],
        )
        .unwrap();
        assert_eq!(
            out,
            "<style>.a { color: red; }</style><p id=\"sheet_000\">Data</p>"
        );
    }

    #[test]
    fn test_missing_required_placeholder() {
        let templates = Templates {
            sheet_html: "<section>{sheet_name}</section>".into(),
            ..Default::default()
        };
        let err = templates.validate().unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingPlaceholder {
                template: "sheet_html",
                placeholder: "table_generated_html",
            }
        );
        assert!(err.to_string().contains("sheet_html"));
        assert!(err.to_string().contains("table_generated_html"));

        let templates = Templates {
            index_html: "<html>{sheets_names_generated_html}</html>".into(),
            ..Default::default()
        };
        assert!(matches!(
            templates.validate(),
            Err(TemplateError::MissingPlaceholder {
                template: "index_html",
                placeholder: "sheets_generated_html"
            })
        ));
    }

    #[test]
    fn test_unknown_placeholder_and_braces() {
        let templates = Templates {
            sheetname_html: "<a href=\"#{enc_sheet_name}\">{title}</a>".into(),
            ..Default::default()
        };
        assert_eq!(
            templates.validate(),
            Err(TemplateError::UnknownPlaceholder {
                template: "sheetname_html",
                placeholder: "title".into(),
            })
        );

        assert_eq!(
            tokenize("index_html", "a { b").unwrap_err(),
            TemplateError::UnbalancedBrace {
                template: "index_html",
                position: 2,
            }
        );
        assert_eq!(
            tokenize("index_html", "a } b").unwrap_err(),
            TemplateError::UnbalancedBrace {
                template: "index_html",
                position: 2,
            }
        );
    }
}
