use thiserror::Error;

use crate::endpoints::EndpointFamily;

/// Error taxonomy for the fetch-and-normalize pipeline.
///
/// `Configuration` and `Authentication` are fatal for a tool call. Everything
/// else is an upstream failure scoped to one sub-call or entity: it is
/// collected into the envelope's `errors` and the tool degrades to `partial`
/// when siblings succeeded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AzureError {
    #[error("missing required configuration: {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    #[error("Azure AD rejected the client-credentials exchange{}: {message}", status_suffix(.status))]
    Authentication { status: Option<u16>, message: String },

    #[error("{family} returned HTTP {status}: {body}")]
    Upstream {
        family: EndpointFamily,
        status: u16,
        body: String,
    },

    #[error(
        "{family} returned HTTP 403; the service principal appears to be missing the '{required_role}' role: {body}"
    )]
    Permission {
        family: EndpointFamily,
        required_role: &'static str,
        body: String,
    },

    #[error("{family} returned a malformed body ({reason}): {body}")]
    MalformedBody {
        family: EndpointFamily,
        reason: String,
        body: String,
    },

    #[error("request to {family} failed: {message}")]
    Transport {
        family: EndpointFamily,
        message: String,
    },

    #[error("{context} does not match the expected {family} shape: {reason}")]
    ShapeMismatch {
        family: EndpointFamily,
        context: String,
        reason: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (HTTP {status})"))
        .unwrap_or_default()
}

impl AzureError {
    /// Classify a non-2xx response. 403 names the role from the endpoint table.
    pub fn from_status(family: EndpointFamily, status: u16, body: impl Into<String>) -> Self {
        if status == 403 {
            AzureError::Permission {
                family,
                required_role: family.required_role(),
                body: body.into(),
            }
        } else {
            AzureError::Upstream {
                family,
                status,
                body: body.into(),
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AzureError::Configuration { .. } => codes::CONFIGURATION_ERROR,
            AzureError::Authentication { .. } => codes::AUTHENTICATION_ERROR,
            AzureError::Upstream { .. } => codes::UPSTREAM_ERROR,
            AzureError::Permission { .. } => codes::PERMISSION_DENIED,
            AzureError::MalformedBody { .. } => codes::MALFORMED_RESPONSE,
            AzureError::Transport { .. } => codes::TRANSPORT_ERROR,
            AzureError::ShapeMismatch { .. } => codes::SHAPE_MISMATCH,
        }
    }

    /// Fatal errors abort the whole tool call instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AzureError::Configuration { .. } | AzureError::Authentication { .. }
        )
    }

    pub fn family(&self) -> Option<EndpointFamily> {
        match self {
            AzureError::Upstream { family, .. }
            | AzureError::Permission { family, .. }
            | AzureError::MalformedBody { family, .. }
            | AzureError::Transport { family, .. }
            | AzureError::ShapeMismatch { family, .. } => Some(*family),
            AzureError::Configuration { .. } | AzureError::Authentication { .. } => None,
        }
    }
}

/// Error codes used across the runtime
pub mod codes {
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const MALFORMED_RESPONSE: &str = "malformed_response";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const SHAPE_MISMATCH: &str = "shape_mismatch";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_status_names_missing_role() {
        let err = AzureError::from_status(EndpointFamily::Metrics, 403, "AuthorizationFailed");
        assert_eq!(err.code(), codes::PERMISSION_DENIED);
        let message = err.to_string();
        assert!(message.contains("Monitoring Reader"));
        assert!(message.contains("AuthorizationFailed"));
    }

    #[test]
    fn other_statuses_stay_generic_upstream() {
        let err = AzureError::from_status(EndpointFamily::SecurityAlerts, 500, "boom");
        assert_eq!(err.code(), codes::UPSTREAM_ERROR);
        assert!(!err.is_fatal());
        assert_eq!(err.family(), Some(EndpointFamily::SecurityAlerts));
    }

    #[test]
    fn configuration_message_lists_every_missing_variable() {
        let err = AzureError::Configuration {
            missing: vec!["AZURE_TENANT_ID", "AZURE_CLIENT_SECRET"],
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "missing required configuration: AZURE_TENANT_ID, AZURE_CLIENT_SECRET"
        );
    }

    #[test]
    fn authentication_message_includes_status_when_known() {
        let err = AzureError::Authentication {
            status: Some(401),
            message: "AADSTS7000215: Invalid client secret provided.".to_string(),
        };
        assert!(err.to_string().contains("(HTTP 401)"));
        assert!(err.to_string().contains("AADSTS7000215"));
    }
}
