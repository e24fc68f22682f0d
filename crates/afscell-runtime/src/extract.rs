use crate::ExecError;
use regex::Regex;
use std::sync::LazyLock;

/// Key version as printed by `kvno -k <keytab> <principal>`.
pub static KVNO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"kvno = (?P<no>[0-9]+)").expect("key version pattern must compile")
});

/// Return the first named capture group of the first match of `pattern`.
pub fn extract(text: &str, pattern: &Regex) -> Result<String, ExecError> {
    let no_match = || ExecError::Extraction {
        text: text.trim().to_owned(),
        pattern: pattern.as_str().to_owned(),
    };
    let group = pattern.capture_names().flatten().next().ok_or_else(no_match)?;
    pattern
        .captures(text)
        .and_then(|caps| caps.name(group))
        .map(|m| m.as_str().to_owned())
        .ok_or_else(no_match)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_key_version() {
        assert_eq!(extract("kvno = 7", &KVNO_PATTERN).unwrap(), "7");
        let out = "afs/example.org@EXAMPLE.ORG: kvno = 12\n";
        assert_eq!(extract(out, &KVNO_PATTERN).unwrap(), "12");
    }

    #[test]
    fn first_match_wins() {
        let out = "kvno = 2\nkvno = 3\n";
        assert_eq!(extract(out, &KVNO_PATTERN).unwrap(), "2");
    }

    #[test]
    fn no_match_is_an_error() {
        let err = extract("no match here", &KVNO_PATTERN).unwrap_err();
        match err {
            ExecError::Extraction { text, pattern } => {
                assert_eq!(text, "no match here");
                assert!(pattern.contains("kvno"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pattern_without_named_group_never_matches() {
        let pattern = Regex::new(r"kvno = ([0-9]+)").unwrap();
        assert!(extract("kvno = 7", &pattern).is_err());
    }
}
