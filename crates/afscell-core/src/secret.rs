use crate::CoreError;
use std::fmt;
use tracing::warn;

/// A password or master key. Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for writing to an interactive session only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// Non-echoing secret acquisition.
pub trait SecretPrompt {
    fn prompt(&self, label: &str) -> Result<Secret, CoreError>;
}

/// Use the secret given on the command line, or ask for it. Empty values are
/// rejected either way.
pub fn resolve_secret(
    given: Option<Secret>,
    flag: &str,
    label: &str,
    prompt: &dyn SecretPrompt,
) -> Result<Secret, CoreError> {
    let secret = match given {
        Some(secret) => {
            warn!("specifying {flag} on the command line is a security risk");
            secret
        }
        None => prompt.prompt(label)?,
    };
    if secret.expose().is_empty() {
        return Err(CoreError::Validation(format!("{label} must not be empty")));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Canned {
        answer: &'static str,
        asked: RefCell<Vec<String>>,
    }

    impl SecretPrompt for Canned {
        fn prompt(&self, label: &str) -> Result<Secret, CoreError> {
            self.asked.borrow_mut().push(label.to_owned());
            Ok(Secret::new(self.answer))
        }
    }

    #[test]
    fn formatting_hides_value() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(!format!("{secret}").contains("hunter2"));
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn given_secret_skips_prompt() {
        let prompt = Canned {
            answer: "prompted",
            asked: RefCell::new(Vec::new()),
        };
        let secret =
            resolve_secret(Some(Secret::new("given")), "--krb-pw", "Kerberos master key", &prompt)
                .unwrap();
        assert_eq!(secret.expose(), "given");
        assert!(prompt.asked.borrow().is_empty());
    }

    #[test]
    fn missing_secret_is_prompted() {
        let prompt = Canned {
            answer: "prompted",
            asked: RefCell::new(Vec::new()),
        };
        let secret = resolve_secret(None, "--admin-pw", "AFS admin password", &prompt).unwrap();
        assert_eq!(secret.expose(), "prompted");
        assert_eq!(prompt.asked.borrow().as_slice(), ["AFS admin password"]);
    }

    #[test]
    fn empty_prompted_secret_rejected() {
        let prompt = Canned {
            answer: "",
            asked: RefCell::new(Vec::new()),
        };
        assert!(matches!(
            resolve_secret(None, "--admin-pw", "AFS admin password", &prompt),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn empty_given_secret_rejected() {
        let prompt = Canned {
            answer: "prompted",
            asked: RefCell::new(Vec::new()),
        };
        let err = resolve_secret(Some(Secret::new("")), "--krb-pw", "Kerberos master key", &prompt)
            .unwrap_err();
        assert!(matches!(&err, CoreError::Validation(msg) if msg.contains("Kerberos master key")));
        assert!(prompt.asked.borrow().is_empty());
    }
}
