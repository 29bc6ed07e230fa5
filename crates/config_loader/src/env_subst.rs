//! `${VAR}` environment substitution for config content.
//!
//! Runs before parsing, so secrets never need to live in the file itself.
//! Unknown variables are left verbatim, which keeps validation errors
//! pointing at the real problem.

/// Replace every `${NAME}` occurrence with the environment value of `NAME`.
pub fn substitute(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference, keep as-is
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_known_variable() {
        std::env::set_var("ENV_SUBST_TEST_HOST", "broker.local");
        assert_eq!(
            substitute("host = \"${ENV_SUBST_TEST_HOST}\""),
            "host = \"broker.local\""
        );
    }

    #[test]
    fn test_keeps_unknown_variable() {
        std::env::remove_var("ENV_SUBST_TEST_MISSING");
        assert_eq!(
            substitute("x = \"${ENV_SUBST_TEST_MISSING}\""),
            "x = \"${ENV_SUBST_TEST_MISSING}\""
        );
    }

    #[test]
    fn test_no_references() {
        assert_eq!(substitute("plain text"), "plain text");
    }

    #[test]
    fn test_unterminated_reference() {
        assert_eq!(substitute("x = ${OOPS"), "x = ${OOPS");
    }

    #[test]
    fn test_multiple_references() {
        std::env::set_var("ENV_SUBST_A", "1");
        std::env::set_var("ENV_SUBST_B", "2");
        assert_eq!(substitute("${ENV_SUBST_A}-${ENV_SUBST_B}"), "1-2");
    }
}
