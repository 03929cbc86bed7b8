//! Cleanup of model-written code before it is submitted.

use regex::Regex;
use std::sync::OnceLock;

fn leading() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(\s|`)*(?i:python\b)?\s*").unwrap_or_else(|_| unreachable!("static pattern")))
}

fn trailing() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(\s|`)*$").unwrap_or_else(|_| unreachable!("static pattern")))
}

/// Remove markdown fences, a leading `python` tag and surrounding whitespace.
pub fn sanitize_code_input(code: &str) -> String {
    let code = leading().replace(code, "");
    trailing().replace(&code, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_removed() {
        assert_eq!(sanitize_code_input("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(sanitize_code_input("  ```Python\nx = 1\n```  \n"), "x = 1");
    }

    #[test]
    fn plain_code_is_untouched() {
        assert_eq!(sanitize_code_input("x = 1\nprint(x)"), "x = 1\nprint(x)");
        assert_eq!(sanitize_code_input("pythonic = True"), "pythonic = True");
    }

    #[test]
    fn inner_indentation_survives() {
        let code = "for i in range(2):\n    print(i)\n";
        assert_eq!(sanitize_code_input(code), "for i in range(2):\n    print(i)");
    }
}
