/*!
 * `$(name)` substitution for route URLs and headers
 */

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::error::TemplateError;

static DYNAMIC_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(([a-zA-Z_$][a-zA-Z_$0-9]*)\)").unwrap_or_else(|e| unreachable!("{}", e))
});

/// Source of substitution values
pub trait Values {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Values for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Values for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Names of every variable referenced in a template, in order of appearance
pub fn variables(template: &str) -> Vec<&str> {
    DYNAMIC_VARIABLE
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace every `$(name)` with its value
///
/// Templates without variables are returned borrowed. A variable with no value
/// is an error; nothing is substituted partially.
pub fn render<'a, V: Values + ?Sized>(template: &'a str, values: &V) -> Result<Cow<'a, str>, TemplateError> {
    if let Some(missing) = variables(template)
        .into_iter()
        .find(|name| values.lookup(name).is_none())
    {
        return Err(TemplateError::MissingValue(missing.to_string()));
    }

    Ok(DYNAMIC_VARIABLE.replace_all(template, |caps: &Captures<'_>| {
        values.lookup(&caps[1]).unwrap_or_default().to_string()
    }))
}

/// Render every value of a header map
pub fn render_map<V: Values + ?Sized>(
    templates: &BTreeMap<String, String>,
    values: &V,
) -> Result<BTreeMap<String, String>, TemplateError> {
    templates
        .iter()
        .map(|(key, template)| Ok((key.clone(), render(template, values)?.into_owned())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_all() {
        let vals = values(&[("store", "0042"), ("day", "2024-03-01")]);
        let rendered = render("api/stores/$(store)/z-report/$(day)", &vals).unwrap();
        assert_eq!(rendered, "api/stores/0042/z-report/2024-03-01");
    }

    #[test]
    fn test_render_without_variables_is_borrowed() {
        let rendered = render("api/ping", &values(&[])).unwrap();
        assert!(matches!(rendered, Cow::Borrowed("api/ping")));
    }

    #[test]
    fn test_missing_value_is_error() {
        let err = render("api/$(store)/$(till)", &values(&[("store", "1")])).unwrap_err();
        assert_eq!(err, TemplateError::MissingValue("till".into()));
    }

    #[test]
    fn test_repeated_variable() {
        let rendered = render("$(a)-$(a)", &values(&[("a", "x")])).unwrap();
        assert_eq!(rendered, "x-x");
    }

    #[test]
    fn test_dollar_in_name() {
        assert_eq!(variables("$($ref) $(_id9) $(9bad)"), vec!["$ref", "_id9"]);
    }

    #[test]
    fn test_render_map() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Store".to_string(), "$(store)".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());

        let rendered = render_map(&headers, &values(&[("store", "0042")])).unwrap();
        assert_eq!(rendered["X-Store"], "0042");
        assert_eq!(rendered["Accept"], "application/json");
    }
}
