//! Port and printer naming.
//!
//! Printer names come from an operator-supplied template with two slots:
//! `{0}` (or `{number}`) for the map key and `{1}` (or `{address}`) for the
//! IPv4 address. Port names are fixed as `IP_<address>`.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Prefix of every port name this tool creates.
pub const PORT_PREFIX: &str = "IP_";

/// Errors raised while parsing a naming template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingTemplateError {
    /// A `{...}` slot names an unknown placeholder.
    #[error("unknown placeholder {{{name}}} in name template")]
    UnknownPlaceholder {
        /// The placeholder text between the braces.
        name: String,
    },

    /// A `{` is never closed.
    #[error("unterminated placeholder in name template")]
    Unterminated,

    /// The template never references the printer number, so every printer
    /// would share one name.
    #[error("name template must contain {{0}} or {{number}}")]
    MissingNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Number,
    Address,
}

/// A parsed printer naming template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NamingTemplate {
    /// Parses `template`. `{{` and `}}` produce literal braces.
    ///
    /// # Errors
    ///
    /// Returns [`NamingTemplateError`] for unknown or unterminated
    /// placeholders, or when no number slot is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use printdeploy_installer::naming::NamingTemplate;
    /// use std::net::Ipv4Addr;
    ///
    /// let template = NamingTemplate::parse("Office Printer {0}")?;
    /// assert_eq!(template.printer_name(3, Ipv4Addr::new(10, 0, 0, 3)), "Office Printer 3");
    /// # Ok::<(), printdeploy_installer::naming::NamingTemplateError>(())
    /// ```
    pub fn parse(template: &str) -> Result<Self, NamingTemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(other) => name.push(other),
                            None => return Err(NamingTemplateError::Unterminated),
                        }
                    }
                    let slot = match name.trim() {
                        "0" | "number" => Segment::Number,
                        "1" | "address" => Segment::Address,
                        _ => return Err(NamingTemplateError::UnknownPlaceholder { name }),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(slot);
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if !segments.contains(&Segment::Number) {
            return Err(NamingTemplateError::MissingNumber);
        }

        Ok(Self {
            source: template.to_owned(),
            segments,
        })
    }

    /// The template text as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Renders the printer name for a map entry.
    #[must_use]
    pub fn printer_name(&self, number: u32, address: Ipv4Addr) -> String {
        self.segments
            .iter()
            .fold(String::new(), |mut name, segment| {
                match segment {
                    Segment::Literal(text) => name.push_str(text),
                    Segment::Number => {
                        let _ = write!(name, "{number}");
                    }
                    Segment::Address => {
                        let _ = write!(name, "{address}");
                    }
                }
                name
            })
    }
}

/// Derives the port name for `address`.
#[must_use]
pub fn port_name(address: Ipv4Addr) -> String {
    format!("{PORT_PREFIX}{address}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 20, 30, 41);

    #[rstest]
    #[case::positional("Printer {0}", "Printer 1")]
    #[case::named("Printer {number}", "Printer 1")]
    #[case::both_slots("Floor {0} ({1})", "Floor 1 (10.20.30.41)")]
    #[case::named_address("{address} #{number}", "10.20.30.41 #1")]
    #[case::escaped_braces("{{Lab}} {0}", "{Lab} 1")]
    fn renders_printer_names(#[case] template: &str, #[case] expected: &str) {
        let template = NamingTemplate::parse(template).expect("valid template");
        assert_eq!(template.printer_name(1, ADDRESS), expected);
    }

    #[rstest]
    #[case::unknown("Printer {2}", NamingTemplateError::UnknownPlaceholder { name: "2".to_owned() })]
    #[case::unterminated("Printer {0", NamingTemplateError::Unterminated)]
    #[case::no_number("Printer {1}", NamingTemplateError::MissingNumber)]
    #[case::no_slots("Printer", NamingTemplateError::MissingNumber)]
    fn rejects_invalid_templates(#[case] template: &str, #[case] expected: NamingTemplateError) {
        assert_eq!(NamingTemplate::parse(template), Err(expected));
    }

    #[test]
    fn port_names_use_address() {
        assert_eq!(port_name(ADDRESS), "IP_10.20.30.41");
    }

    #[test]
    fn names_are_deterministic() {
        let template = NamingTemplate::parse("Printer {0}").expect("valid template");
        assert_eq!(
            template.printer_name(7, ADDRESS),
            template.printer_name(7, ADDRESS)
        );
        assert_eq!(template.as_str(), "Printer {0}");
    }
}
