use serde::{Deserialize, Serialize};

/// Verification flags supplied by the caller. How they were verified is not
/// this crate's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub sanctions_verified: bool,
    #[serde(default)]
    pub source_of_funds_verified: bool,
    /// Opaque reference to the uploaded source-of-funds proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
}

/// Field-level update of [`Credentials`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanctions_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_of_funds_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
}

impl CredentialsPatch {
    pub fn is_empty(&self) -> bool {
        self.sanctions_verified.is_none()
            && self.source_of_funds_verified.is_none()
            && self.proof_reference.is_none()
    }

    pub fn apply_to(&self, credentials: &mut Credentials) {
        if let Some(flag) = self.sanctions_verified {
            credentials.sanctions_verified = flag;
        }
        if let Some(flag) = self.source_of_funds_verified {
            credentials.source_of_funds_verified = flag;
        }
        if let Some(reference) = &self.proof_reference {
            credentials.proof_reference = Some(reference.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_present_fields() {
        let mut creds = Credentials {
            sanctions_verified: true,
            ..Default::default()
        };
        let patch = CredentialsPatch {
            source_of_funds_verified: Some(true),
            proof_reference: Some("bank-statement.pdf".into()),
            ..Default::default()
        };

        patch.apply_to(&mut creds);

        assert!(creds.sanctions_verified);
        assert!(creds.source_of_funds_verified);
        assert_eq!(creds.proof_reference.as_deref(), Some("bank-statement.pdf"));
        assert!(CredentialsPatch::default().is_empty());
    }
}
