use crate::errors::{AuthError, Result};

fn make_dn_pair<I>(mut iter: I) -> Result<(String, String)>
where
    I: Iterator<Item = String>,
{
    (|| {
        let pair = (
            iter.next().ok_or_else(|| "Empty DN element".to_string())?,
            iter.next().ok_or_else(|| "Missing DN value".to_string())?,
        );
        if let Some(e) = iter.next() {
            Err(format!(
                r#"Too many elements in distinguished name: "{:?}", "{:?}", "{:?}""#,
                pair.0, pair.1, e
            ))
        } else {
            Ok(pair)
        }
    })()
    .map_err(AuthError::Configuration)
}

/// Splits a DN into `(attribute, value)` pairs, preserving case.
pub fn parse_distinguished_name(dn: &str) -> Result<Vec<(String, String)>> {
    dn.split(',')
        .map(|s| make_dn_pair(s.split('=').map(str::trim).map(String::from)))
        .collect()
}

/// Value of the left-most RDN, i.e. the text after the first `=` of the first
/// comma-separated segment. A segment without `=` is returned as-is, so group
/// names that are not DNs pass through unchanged.
pub fn first_rdn_value(dn: &str) -> String {
    let first_segment = dn.split(',').next().unwrap_or(dn);
    match first_segment.split_once('=') {
        Some((_, value)) => value.trim().to_owned(),
        None => first_segment.trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_distinguished_name() {
        assert_eq!(
            parse_distinguished_name("ou=people, dc=example,dc=org").expect("parsing failed"),
            vec![
                ("ou".to_string(), "people".to_string()),
                ("dc".to_string(), "example".to_string()),
                ("dc".to_string(), "org".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_distinguished_name_errors() {
        assert!(parse_distinguished_name("ou=people,dc").is_err());
        assert!(parse_distinguished_name("ou=people,dc=a=b").is_err());
    }

    #[test]
    fn test_first_rdn_value() {
        assert_eq!(
            first_rdn_value("cn=Developers,ou=groups,dc=example,dc=org"),
            "Developers"
        );
        assert_eq!(first_rdn_value("cn = Developers "), "Developers");
        assert_eq!(first_rdn_value("Developers"), "Developers");
    }
}
