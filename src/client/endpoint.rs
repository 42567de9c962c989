//! Endpoint specification parsing and language → address resolution.
//!
//! Accepted forms:
//! - `localhost:9432`: one backend for every language
//! - `python=localhost:9432,go=localhost:9433`: explicit per-language map
//! - `%s-driver.bblfsh.svc.example.com:9432`: DNS template on the language

use std::collections::HashMap;

use crate::error::{Result, UastError};

const PLACEHOLDER: &str = "%s";

/// How a language name turns into a backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSpec {
    Single(String),
    PerLanguage(HashMap<String, String>),
    Template(String),
}

impl EndpointSpec {
    /// Parse an endpoint specification string.
    ///
    /// A comma makes the string a `language=address` list, checked first; then
    /// a `%s` placeholder makes it a template; anything else is one address.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.contains(',') {
            return parse_pairs(spec).map(Self::PerLanguage);
        }
        if spec.contains(PLACEHOLDER) {
            return Ok(Self::Template(spec.to_string()));
        }
        Ok(Self::Single(spec.to_string()))
    }

    /// Resolve the backend address for `language`.
    pub fn resolve(&self, language: &str) -> Result<String> {
        match self {
            Self::Single(address) => Ok(address.clone()),
            Self::PerLanguage(map) => {
                map.get(language)
                    .cloned()
                    .ok_or_else(|| UastError::MissingBackend {
                        language: language.to_string(),
                    })
            }
            Self::Template(template) => Ok(template.replacen(PLACEHOLDER, language, 1)),
        }
    }

    /// The fixed address, when every language shares one backend.
    pub fn single_address(&self) -> Option<&str> {
        match self {
            Self::Single(address) => Some(address),
            _ => None,
        }
    }
}

impl std::str::FromStr for EndpointSpec {
    type Err = UastError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_pairs(spec: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for section in spec.split(',') {
        let parts: Vec<&str> = section.split('=').collect();
        match parts.as_slice() {
            [language, address] if !language.trim().is_empty() && !address.trim().is_empty() => {
                map.insert(language.trim().to_string(), address.trim().to_string());
            }
            _ => {
                return Err(UastError::Config(format!(
                    "formatting is broken in section: {section:?}"
                )))
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pa_eq;
    use test_case::test_case;

    #[test]
    fn single_address_serves_every_language() {
        let spec = EndpointSpec::parse("localhost:9432").unwrap();
        pa_eq!(spec.resolve("python").unwrap(), "localhost:9432");
        pa_eq!(spec.resolve("go").unwrap(), "localhost:9432");
        pa_eq!(spec.resolve("").unwrap(), "localhost:9432");
        pa_eq!(spec.single_address(), Some("localhost:9432"));
    }

    #[test]
    fn per_language_map() {
        let spec = EndpointSpec::parse("python=A,go=B").unwrap();
        pa_eq!(spec.resolve("python").unwrap(), "A");
        pa_eq!(spec.resolve("go").unwrap(), "B");
        let err = spec.resolve("rust").unwrap_err();
        assert!(matches!(err, UastError::MissingBackend { ref language } if language == "rust"));
        pa_eq!(spec.single_address(), None);
    }

    #[test]
    fn duplicate_languages_overwrite() {
        let spec = EndpointSpec::parse("python=A,python=C").unwrap();
        pa_eq!(spec.resolve("python").unwrap(), "C");
    }

    #[test]
    fn template_substitutes_language() {
        let spec = EndpointSpec::parse("%s-driver.svc:9432").unwrap();
        pa_eq!(spec.resolve("python").unwrap(), "python-driver.svc:9432");
        pa_eq!(spec.resolve("go").unwrap(), "go-driver.svc:9432");
    }

    #[test]
    fn comma_takes_precedence_over_template() {
        let spec = EndpointSpec::parse("python=%s:1,go=b").unwrap();
        pa_eq!(spec.resolve("python").unwrap(), "%s:1");
    }

    #[test_case("python=A," ; "trailing comma")]
    #[test_case("python,go=B" ; "missing equals")]
    #[test_case("python=A=B,go=C" ; "too many equals")]
    #[test_case("=A,go=B" ; "empty language")]
    #[test_case("python=,go=B" ; "empty address")]
    fn malformed_maps_are_config_errors(input: &str) {
        let err = EndpointSpec::parse(input).unwrap_err();
        assert!(matches!(err, UastError::Config(_)), "{input}: {err}");
    }
}
