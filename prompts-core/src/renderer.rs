//! # Renderer
//!
//! Variable interpolation for prompt templates.
//!
//! Supported syntax, applied in this order:
//!
//! 1. `{{#each items}}...{{/each}}` repeats the body once per array element. Object
//!    elements expose their own keys inside the body, array elements their indices;
//!    other elements replace `{{this}}`.
//! 2. `{{#if flag}}...{{/if}}` keeps the body when `flag` is truthy.
//! 3. `{{name}}` is replaced by the value of `name`. Unknown names are left untouched.
//! 4. `\{{` is unescaped to `{{`.
//!
//! Blocks are single-level: a block inside an `#each` body is not expanded again.
//!
//! # Examples
//!
//! ```rust
//! use prompts_core::renderer::{RenderOptions, Renderer, Variables};
//! use serde_json::json;
//!
//! let renderer = Renderer::new();
//! let mut variables = Variables::new();
//! variables.insert("name".to_string(), json!("Alice"));
//!
//! let rendered = renderer
//!     .render("Hello, {{name}}!", &variables, &RenderOptions::default())
//!     .unwrap();
//! assert_eq!("Hello, Alice!", rendered);
//! ```

use crate::parser::{Reference, parse_each_block, parse_if_block, parse_placeholder, rewrite, scan_references};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

/// Values available to a template, keyed by variable name.
pub type Variables = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("Missing required variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Reserved; unknown placeholders are left untouched either way.
    pub strict: bool,
    /// Names that must be present and non-null before anything is rendered.
    pub required_variables: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            strict: true,
            required_variables: Vec::new(),
        }
    }
}

impl RenderOptions {
    pub fn lenient() -> RenderOptions {
        RenderOptions {
            strict: false,
            ..RenderOptions::default()
        }
    }

    pub fn require<I, S>(mut self, names: I) -> RenderOptions
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_variables.extend(names.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Renderer {
        Renderer
    }

    /// Renders `template` against `variables`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The rendered text.
    /// * `RenderError::MissingVariables` - If any of `options.required_variables` is
    ///   absent or null. Every missing name is reported and nothing is rendered.
    pub fn render(
        &self,
        template: &str,
        variables: &Variables,
        options: &RenderOptions,
    ) -> Result<String, RenderError> {
        let missing: Vec<String> = options
            .required_variables
            .iter()
            .filter(|name| variables.get(name.as_str()).is_none_or(Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RenderError::MissingVariables(missing));
        }

        let result = expand_each_blocks(template, variables);
        let result = expand_if_blocks(&result, variables);
        let result = substitute(&result, variables);
        trace!(template_len = template.len(), rendered_len = result.len(), "rendered template");

        Ok(result.replace("\\{{", "{{"))
    }

    /// Lists the names a template refers to through placeholders, `#if` conditions and
    /// `#each` collections, deduplicated in order of first appearance.
    ///
    /// This is a lexical scan: blocks are not evaluated and `{{this}}` is not a name.
    pub fn extract_variables(&self, template: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for reference in scan_references(template) {
            let name = reference.name().trim();
            if name.is_empty() || matches!(reference, Reference::Placeholder(_) if name == "this") {
                continue;
            }
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }

        names
    }
}

/// The renderer's notion of truthiness: null, absent, `false`, `""` and `[]` are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Text substituted for a placeholder: null is empty, objects and arrays are compact JSON.
fn substitution_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text substituted for `{{this}}` inside an `#each` body.
fn element_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Array elements expose their positions as names: `{{0}}`, `{{1}}`, ...
fn indexed_scope(elements: &[Value]) -> Variables {
    elements
        .iter()
        .enumerate()
        .map(|(index, value)| (index.to_string(), value.clone()))
        .collect()
}

fn expand_each_blocks(template: &str, variables: &Variables) -> String {
    rewrite(template, false, parse_each_block, |block, _| {
        let Some(Value::Array(items)) = variables.get(block.name) else {
            return String::new();
        };

        items
            .iter()
            .map(|item| match item {
                Value::Object(scope) => substitute(block.body, scope),
                Value::Array(elements) => substitute(block.body, &indexed_scope(elements)),
                other => block.body.replace("{{this}}", &element_text(other)),
            })
            .collect()
    })
}

fn expand_if_blocks(template: &str, variables: &Variables) -> String {
    rewrite(template, false, parse_if_block, |block, _| {
        if is_truthy(variables.get(block.name)) {
            block.body.to_string()
        } else {
            String::new()
        }
    })
}

fn substitute(template: &str, variables: &Variables) -> String {
    rewrite(template, true, parse_placeholder, |name, matched| {
        match variables.get(name.trim()) {
            Some(value) => substitution_text(value),
            None => matched.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn render(template: &str, variables: Value) -> String {
        Renderer::new()
            .render(template, &vars(variables), &RenderOptions::default())
            .expect("Failed to render template")
    }

    #[test]
    fn test_render_simple_substitution() {
        assert_eq!("Hello, Alice!", render("Hello, {{name}}!", json!({"name": "Alice"})));
    }

    #[test]
    fn test_render_multiple_variables() {
        let rendered = render("{{greeting}}, {{name}}!", json!({"greeting": "Hi", "name": "Bob"}));
        assert_eq!("Hi, Bob!", rendered);
    }

    #[test]
    fn test_render_trims_placeholder_names() {
        assert_eq!("x=1", render("x={{ x }}", json!({"x": 1})));
    }

    #[test]
    fn test_render_value_forms() {
        let rendered = render(
            "{{n}}|{{b}}|{{z}}|{{arr}}|{{obj}}",
            json!({"n": 0, "b": false, "z": null, "arr": [1, "a"], "obj": {"k": "v"}}),
        );
        assert_eq!(r#"0|false||[1,"a"]|{"k":"v"}"#, rendered);
    }

    #[test]
    fn test_render_unknown_placeholder_left_verbatim() {
        assert_eq!("Hi {{ who }}!", render("Hi {{ who }}!", json!({})));

        let lenient = Renderer::new()
            .render("{{missing}}", &Variables::new(), &RenderOptions::lenient())
            .unwrap();
        assert_eq!("{{missing}}", lenient);
    }

    #[test]
    fn test_render_if_truthy_and_falsy() {
        let template = "Start {{#if show}}middle {{/if}}end";
        assert_eq!("Start middle end", render(template, json!({"show": true})));
        assert_eq!("Start end", render(template, json!({"show": false})));
        assert_eq!("Start end", render(template, json!({})));
    }

    #[test]
    fn test_render_if_truthiness_rules() {
        let template = "{{#if items}}Has items{{/if}}";
        assert_eq!("", render(template, json!({"items": []})));
        assert_eq!("Has items", render(template, json!({"items": [1]})));
        assert_eq!("", render(template, json!({"items": ""})));
        assert_eq!("", render(template, json!({"items": null})));
        assert_eq!("Has items", render(template, json!({"items": 0})));
        assert_eq!("Has items", render(template, json!({"items": {}})));
        assert_eq!("Has items", render(template, json!({"items": "x"})));
    }

    #[test]
    fn test_render_if_body_placeholders_resolved() {
        let rendered = render("{{#if user}}Hi {{user}}{{/if}}", json!({"user": "Ann"}));
        assert_eq!("Hi Ann", rendered);
    }

    #[test]
    fn test_render_each_primitives() {
        let rendered = render("{{#each items}}{{this}} {{/each}}", json!({"items": ["a", "b", "c"]}));
        assert_eq!("a b c ", rendered);

        let numbers = render("{{#each n}}[{{this}}]{{/each}}", json!({"n": [1, true, null]}));
        assert_eq!("[1][true][null]", numbers);
    }

    #[test]
    fn test_render_each_nested_arrays_expose_indices() {
        let rendered = render(
            "{{#each pairs}}{{0}}={{1}} {{this}};{{/each}}",
            json!({"pairs": [["a", 1], ["b"]]}),
        );
        assert_eq!("a=1 {{this}};b={{1}} {{this}};", rendered);
    }

    #[test]
    fn test_render_each_objects_shadow_outer_scope() {
        let rendered = render(
            "{{#each people}}{{name}} ({{role}}); {{/each}}",
            json!({
                "role": "guest",
                "name": "outer",
                "people": [{"name": "Ann", "role": "admin"}, {"name": "Bo"}],
            }),
        );
        assert_eq!("Ann (admin); Bo (guest); ", rendered);
    }

    #[test]
    fn test_render_each_non_array_removed() {
        let template = "a{{#each items}}x{{/each}}b";
        assert_eq!("ab", render(template, json!({})));
        assert_eq!("ab", render(template, json!({"items": "abc"})));
        assert_eq!("ab", render(template, json!({"items": {"k": 1}})));
    }

    #[test]
    fn test_render_nested_blocks_not_expanded_inside_each() {
        let rendered = render(
            "{{#each xs}}{{#if flag}}y{{/if}}{{/each}}",
            json!({"xs": [1], "flag": true}),
        );
        // the #if left in the body is still handled by the following pass
        assert_eq!("y", rendered);

        let nested = render(
            "{{#each xs}}{{#each ys}}{{this}}{{/each}}{{/each}}",
            json!({"xs": [1], "ys": [2]}),
        );
        assert_eq!("{{#each ys}}1{{/each}}", nested);
    }

    #[test]
    fn test_render_unterminated_blocks_left_in_place() {
        assert_eq!("{{#if show}}x", render("{{#if show}}x", json!({"show": true})));
        assert_eq!("{{#each xs}}x", render("{{#each xs}}x", json!({"xs": [1]})));
    }

    #[test]
    fn test_render_escaped_braces() {
        let rendered = render(r"Use \{{name}} for {{name}}", json!({"name": "Alice"}));
        assert_eq!("Use {{name}} for Alice", rendered);
    }

    #[test]
    fn test_render_required_variables() {
        let renderer = Renderer::new();
        let options = RenderOptions::default().require(["name", "role", "age"]);
        let result = renderer.render("Hello {{name}}", &vars(json!({"role": null, "age": 3})), &options);

        assert_eq!(
            Err(RenderError::MissingVariables(vec!["name".to_string(), "role".to_string()])),
            result
        );
        assert_eq!(
            "Missing required variables: name, role",
            result.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_render_required_variables_present() {
        let options = RenderOptions::lenient().require(["name"]);
        let rendered = Renderer::new()
            .render("Hello {{name}}", &vars(json!({"name": "Zed"})), &options)
            .unwrap();
        assert_eq!("Hello Zed", rendered);
    }

    #[test]
    fn test_render_idempotent_when_fully_resolved() {
        let variables = json!({"a": "x", "items": ["1", "2"]});
        let once = render("{{a}}{{#each items}}-{{this}}{{/each}}", variables.clone());
        assert_eq!(once, render(&once, variables));
    }

    #[test]
    fn test_extract_variables() {
        let renderer = Renderer::new();
        assert_eq!(vec!["a", "b"], renderer.extract_variables("{{a}}{{a}}{{b}}"));
        assert!(renderer.extract_variables("just text").is_empty());
    }

    #[test]
    fn test_extract_variables_blocks() {
        let names = Renderer::new().extract_variables(
            "{{#if intro}}{{greeting}}{{/if}}{{#each items}}{{this}} {{label}}{{/each}} {{ greeting }}",
        );
        assert_eq!(vec!["intro", "greeting", "items", "label"], names);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(is_truthy(Some(&json!(0))));
        assert!(is_truthy(Some(&json!(true))));
    }
}
