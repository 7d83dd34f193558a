use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/* ===== errors ===== */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationError {
    /// The requester lacks the access rights for the operation. This carries no
    /// detail about which ACI caused the denial.
    NoPermission,
    /// The target does not exist, or is not visible to the requester. `matched`
    /// is the nearest superior the requester may learn about.
    NoSuchObject {
        matched: String,
    },
    MalformedAci(String),
    InvalidAciState(String),
    SchemaResolution(String),
    InvalidDn(String),
    InvalidFilter(String),
    InvalidSubtreeSpecification(String),
    InvalidValue(String),
    InvalidConfig(String),
    InvalidRequestState,
    FsError,
    SerdeJsonError,
}

impl Display for OperationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mut output = format!("{:?}", self)
            .split(['(', ' ', '{'])
            .next()
            .unwrap_or("")
            .to_string();

        if let Some(msg) = self.message() {
            output += &format!(" - {}", msg);
        };
        f.write_str(&output)
    }
}

impl OperationError {
    /// Return the message associated with the error if there is one.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoPermission => Some("Insufficient access rights.".into()),
            Self::NoSuchObject { matched } => {
                if matched.is_empty() {
                    Some("No such object.".into())
                } else {
                    Some(format!("No such object, matched: {}", matched))
                }
            }
            Self::MalformedAci(val) => Some(format!("Malformed ACI item: {}", val)),
            Self::InvalidAciState(val) => Some(format!("Invalid ACI state: {}", val)),
            Self::SchemaResolution(val) => Some(format!("Unable to resolve in schema: {}", val)),
            Self::InvalidDn(val) => Some(format!("Invalid DN: {}", val)),
            Self::InvalidFilter(val) => Some(format!("Invalid filter: {}", val)),
            Self::InvalidSubtreeSpecification(val) => {
                Some(format!("Invalid subtree specification: {}", val))
            }
            Self::InvalidValue(val) => Some(format!("Invalid value: {}", val)),
            Self::InvalidConfig(val) => Some(format!("Invalid configuration: {}", val)),
            Self::InvalidRequestState => None,
            Self::FsError => None,
            Self::SerdeJsonError => None,
        }
    }

    /// True when this error must be reported to the client as an
    /// insufficient access rights result.
    pub fn is_access_denial(&self) -> bool {
        matches!(self, Self::NoPermission)
    }
}

#[cfg(test)]
mod tests {
    use super::OperationError;

    #[test]
    fn test_operation_error_display() {
        assert_eq!(
            OperationError::NoPermission.to_string(),
            "NoPermission - Insufficient access rights."
        );
        assert_eq!(
            OperationError::MalformedAci("missing precedence".to_string()).to_string(),
            "MalformedAci - Malformed ACI item: missing precedence"
        );
        assert_eq!(
            OperationError::NoSuchObject {
                matched: "ou=system".to_string()
            }
            .to_string(),
            "NoSuchObject - No such object, matched: ou=system"
        );
        assert_eq!(
            OperationError::InvalidRequestState.to_string(),
            "InvalidRequestState"
        );
    }

    #[test]
    fn test_operation_error_serde() {
        let e = OperationError::InvalidDn("cn=".to_string());
        let s = serde_json::to_string(&e).expect("serialise");
        assert_eq!(s, r#"{"invaliddn":"cn="}"#);
        let back: OperationError = serde_json::from_str(&s).expect("deserialise");
        assert_eq!(back, e);
        assert!(!back.is_access_denial());
        assert!(OperationError::NoPermission.is_access_denial());
    }
}
