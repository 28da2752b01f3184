//! WhatsApp template payload rendering.
//!
//! Templates are stored as a list of components (HEADER/BODY/BUTTONS). The
//! body text references positional parameters as `{{1}}..{{n}}`; a text
//! header consumes the first variable and URL buttons consume variables after
//! the body's highest index.

use serde_json::{Value, json};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    #[error("missing_vars: {0}")]
    MissingVars(String),
}

/// Highest `{{n}}` placeholder index in a body text.
fn max_placeholder_index(text: &str) -> usize {
    let mut max = 0usize;
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        rest = &rest[start + 2..];
        if let Some(end) = rest.find("}}") {
            if let Ok(idx) = rest[..end].trim().parse::<usize>() {
                max = max.max(idx);
            }
            rest = &rest[end + 2..];
        } else {
            break;
        }
    }
    max
}

fn escape_param(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn component<'a>(components: &'a [Value], kind: &str) -> Option<&'a Value> {
    components
        .iter()
        .find(|c| c["type"].as_str().is_some_and(|t| t.eq_ignore_ascii_case(kind)))
}

/// Render the provider template payload for a send.
///
/// `components` is the registry row's component list; `vars` the canonical
/// positional variable list produced by the dispatcher.
pub fn render_payload(
    meta_name: &str,
    language: &str,
    components: &Value,
    vars: &[String],
) -> Result<Value, TemplateError> {
    let components = components.as_array().cloned().unwrap_or_default();

    let body = component(&components, "body");
    let header = component(&components, "header");
    let buttons = component(&components, "buttons");

    let max_index = body
        .and_then(|b| b["text"].as_str())
        .map(max_placeholder_index)
        .unwrap_or(0);

    if max_index > vars.len() {
        return Err(TemplateError::MissingVars(format!(
            "body requires {} vars, got {}",
            max_index,
            vars.len()
        )));
    }

    let mut rendered: Vec<Value> = Vec::new();

    if let Some(header) = header
        && header["format"]
            .as_str()
            .is_some_and(|f| f.eq_ignore_ascii_case("text"))
    {
        let text = vars.first().map(|v| escape_param(v)).unwrap_or_default();
        rendered.push(json!({
            "type": "header",
            "parameters": [{ "type": "text", "text": text }],
        }));
    }

    if body.is_some() {
        let parameters: Vec<Value> = (1..=max_index)
            .map(|i| json!({ "type": "text", "text": escape_param(&vars[i - 1]) }))
            .collect();
        rendered.push(json!({ "type": "body", "parameters": parameters }));
    }

    if let Some(buttons) = buttons
        && let Some(list) = buttons["buttons"].as_array()
    {
        let mut cursor = max_index;
        for (idx, button) in list.iter().enumerate() {
            let kind = button["type"].as_str().unwrap_or("unknown").to_uppercase();
            match kind.as_str() {
                "URL" => {
                    let param = vars.get(cursor).cloned().unwrap_or_default();
                    if param.is_empty() {
                        return Err(TemplateError::MissingVars(format!(
                            "url_button[{}] requires 1 var after body vars",
                            idx
                        )));
                    }
                    cursor += 1;
                    rendered.push(json!({
                        "type": "button",
                        "sub_type": "url",
                        "index": idx.to_string(),
                        "parameters": [{ "type": "text", "text": escape_param(&param) }],
                    }));
                }
                other => {
                    rendered.push(json!({
                        "type": "button",
                        "sub_type": other.to_lowercase(),
                        "index": idx.to_string(),
                    }));
                }
            }
        }
    }

    Ok(json!({
        "name": meta_name,
        "language": { "code": language },
        "components": rendered,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_components(text: &str) -> Value {
        json!([{ "type": "BODY", "text": text }])
    }

    #[test]
    fn renders_body_parameters_in_order() {
        let components = body_components("Hi {{1}}, your class is at {{2}}.");
        let payload = render_payload(
            "demo_tpl",
            "en",
            &components,
            &["Alice".to_string(), "9am".to_string()],
        )
        .unwrap();

        assert_eq!(payload["name"], "demo_tpl");
        assert_eq!(payload["language"]["code"], "en");
        let params = payload["components"][0]["parameters"].as_array().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["text"], "Alice");
        assert_eq!(params[1]["text"], "9am");
    }

    #[test]
    fn rejects_missing_body_vars() {
        let components = body_components("Hi {{1}}, amount {{2}} due {{3}}.");
        let err = render_payload("t", "en", &components, &["only-one".to_string()]).unwrap_err();
        assert!(err.to_string().contains("missing_vars"));
    }

    #[test]
    fn text_header_takes_first_var() {
        let components = json!([
            { "type": "HEADER", "format": "TEXT" },
            { "type": "BODY", "text": "Hello {{1}}" },
        ]);
        let payload =
            render_payload("t", "en", &components, &["Alice".to_string()]).unwrap();
        assert_eq!(payload["components"][0]["type"], "header");
        assert_eq!(
            payload["components"][0]["parameters"][0]["text"],
            "Alice"
        );
    }

    #[test]
    fn url_button_consumes_var_after_body() {
        let components = json!([
            { "type": "BODY", "text": "Invoice {{1}}" },
            { "type": "BUTTONS", "buttons": [{ "type": "URL" }] },
        ]);
        let payload = render_payload(
            "t",
            "en",
            &components,
            &["INV-42".to_string(), "pay/abc123".to_string()],
        )
        .unwrap();
        let button = &payload["components"][1];
        assert_eq!(button["sub_type"], "url");
        assert_eq!(button["parameters"][0]["text"], "pay/abc123");
    }

    #[test]
    fn url_button_without_var_fails() {
        let components = json!([
            { "type": "BODY", "text": "Invoice {{1}}" },
            { "type": "BUTTONS", "buttons": [{ "type": "URL" }] },
        ]);
        let err =
            render_payload("t", "en", &components, &["INV-42".to_string()]).unwrap_err();
        assert!(err.to_string().contains("url_button"));
    }

    #[test]
    fn newlines_normalized_in_params() {
        let components = body_components("{{1}}");
        let payload =
            render_payload("t", "en", &components, &["a\r\nb\rc".to_string()]).unwrap();
        assert_eq!(payload["components"][0]["parameters"][0]["text"], "a\nb\nc");
    }

    #[test]
    fn placeholder_scan_ignores_garbage() {
        assert_eq!(max_placeholder_index("no placeholders"), 0);
        assert_eq!(max_placeholder_index("{{1}} {{abc}} {{3}}"), 3);
        assert_eq!(max_placeholder_index("dangling {{2"), 0);
    }
}
