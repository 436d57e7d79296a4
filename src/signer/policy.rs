use serde::Serialize;

/// Access policy carried in the `Policy` query parameter.
///
/// Field order is the serialization order. The signature is computed over
/// exactly the bytes produced by [`SigningPolicy::to_json`], so the layout
/// must stay stable: reordering a field invalidates every signature a
/// verifier would check against it.
#[derive(Debug, Serialize)]
pub struct SigningPolicy {
    #[serde(rename = "Statement")]
    statement: [PolicyStatement; 1],
}

#[derive(Debug, Serialize)]
struct PolicyStatement {
    #[serde(rename = "Resource")]
    resource: String,
    #[serde(rename = "Condition")]
    condition: Condition,
}

#[derive(Debug, Serialize)]
struct Condition {
    #[serde(rename = "DateLessThan")]
    date_less_than: DateLessThan,
}

#[derive(Debug, Serialize)]
struct DateLessThan {
    #[serde(rename = "AWS:EpochTime")]
    epoch_time: u64,
}

impl SigningPolicy {
    /// One statement scoping `resource` until `expires_epoch` (exclusive).
    pub fn new(resource: impl Into<String>, expires_epoch: u64) -> Self {
        SigningPolicy {
            statement: [PolicyStatement {
                resource: resource.into(),
                condition: Condition {
                    date_less_than: DateLessThan {
                        epoch_time: expires_epoch,
                    },
                },
            }],
        }
    }

    /// Canonical single-line serialization; both the policy token and the
    /// signature are derived from this exact string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("policy struct always serializes")
    }
}
