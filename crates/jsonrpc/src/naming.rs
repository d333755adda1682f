//! Maps declared method/parameter identifiers to their wire names.

/// Strategy used by a `ServiceBuilder` to derive wire names from the literal
/// identifiers passed at registration time. An explicit name passed to
/// `.method()`/`.param()` always overrides the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// Wire name equals the declared identifier verbatim.
    #[default]
    Identity,
    /// Wire name is the declared identifier's `snake_case` converted to `camelCase`.
    CamelCase,
}

impl NamingStrategy {
    pub fn apply(&self, name: &str) -> String {
        match self {
            NamingStrategy::Identity => name.to_owned(),
            NamingStrategy::CamelCase => to_camel_case(name),
        }
    }
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = false;
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' {
            capitalize_next = true;
            continue;
        }
        if i == 0 {
            out.push(ch.to_ascii_lowercase());
        } else if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
