use sha2::{Digest, Sha256};

// The sequence number disambiguates identical drafts added within the
// same millisecond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentity {
    pub member_id: String,
    pub service_id: String,
    pub location: String,
    pub timestamp_ms: i64,
    pub seq: u64,
}

impl RecordIdentity {
    pub fn canonical(self) -> CanonicalRecordIdentity {
        CanonicalRecordIdentity {
            member_id: normalize_text(&self.member_id),
            service_id: normalize_text(&self.service_id),
            location: normalize_text(&self.location),
            timestamp_ms: self.timestamp_ms,
            seq: self.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecordIdentity {
    pub member_id: String,
    pub service_id: String,
    pub location: String,
    pub timestamp_ms: i64,
    pub seq: u64,
}

impl CanonicalRecordIdentity {
    pub fn canonical_json(&self) -> String {
        format!(
            "{{\"member_id\":\"{}\",\"service_id\":\"{}\",\"location\":\"{}\",\"timestamp_ms\":{},\"seq\":{}}}",
            escape_json(&self.member_id),
            escape_json(&self.service_id),
            escape_json(&self.location),
            self.timestamp_ms,
            self.seq
        )
    }

    pub fn record_id(&self) -> String {
        let canonical = self.canonical_json();
        let mut digest = Sha256::new();
        digest.update(canonical.as_bytes());
        let bytes = digest.finalize();
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

pub fn compute_record_id(identity: RecordIdentity) -> String {
    identity.canonical().record_id()
}

pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_json(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
