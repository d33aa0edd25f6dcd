use crate::asn1::{next_tlv, parse_tlv, TAG_OID};
use crate::error::Ja4PlusError;
use crate::hasher::FingerprintHasher;
use nom::bytes::complete::take;
use nom::error::Error;
use nom::number::complete::be_u24;
use nom::Parser;
use std::fmt::Write;
use tracing::debug;

/// Nesting depth below which constructed elements are no longer descended.
pub const MAX_RDN_DEPTH: usize = 32;

/// Minimum length of an object identifier value that is collected.
const MIN_OID_LEN: usize = 3;

/// JA4X fingerprint of one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja4xPayload {
    /// Comma-joined hex OIDs found in the issuer
    pub issuer: String,
    /// Comma-joined hex OIDs found in the subject
    pub subject: String,
    /// Comma-joined hex OIDs found in the extensions
    pub extensions: String,
    /// Three 12 character hashes joined with `_`, always 38 characters
    pub full: String,
    /// The three unhashed lists joined with `_`
    pub raw: String,
}

/// Depth-first walk that appends the hex of the first object identifier found in
/// each constructed element, followed by a comma.
///
/// Once an identifier is appended, the remaining siblings at that level are skipped.
fn collect_oids(mut data: &[u8], out: &mut String, depth: usize) {
    while data.len() > 3 {
        let Ok((rest, tlv)) = parse_tlv(data) else {
            return;
        };
        data = rest;

        if tlv.constructed {
            if depth < MAX_RDN_DEPTH {
                collect_oids(tlv.value, out, depth + 1);
            } else {
                debug!("ASN.1 nesting deeper than {MAX_RDN_DEPTH}, not descending");
            }
        } else if tlv.tag == TAG_OID && tlv.value.len() >= MIN_OID_LEN {
            for byte in tlv.value {
                let _ = write!(out, "{byte:02x}");
            }
            out.push(',');
            return;
        }
    }
}

fn oid_list(data: &[u8]) -> String {
    let mut out = String::new();
    collect_oids(data, &mut out, 0);
    if out.ends_with(',') {
        out.pop();
    }
    out
}

/// Compute JA4X over one DER encoded certificate.
///
/// The walk follows the TBSCertificate field order; a malformed element at any
/// step yields an error and no fingerprint.
pub fn fingerprint_certificate(
    der: &[u8],
    hasher: &mut FingerprintHasher,
) -> Result<Ja4xPayload, Ja4PlusError> {
    let mut cursor = der;
    let certificate = next_tlv(&mut cursor, "certificate")?;

    let mut cursor = certificate.value;
    let tbs = next_tlv(&mut cursor, "tbsCertificate")?;

    let mut tbs = tbs.value;
    // Explicitly tagged version comes before the serial number when present
    let first = next_tlv(&mut tbs, "serial number")?;
    if first.constructed {
        next_tlv(&mut tbs, "serial number")?;
    }
    next_tlv(&mut tbs, "signature algorithm")?;
    let issuer = next_tlv(&mut tbs, "issuer")?;

    let validity = next_tlv(&mut tbs, "validity")?;
    let mut times = validity.value;
    next_tlv(&mut times, "notBefore")?;
    next_tlv(&mut times, "notAfter")?;

    let subject = next_tlv(&mut tbs, "subject")?;
    next_tlv(&mut tbs, "subjectPublicKeyInfo")?;

    let issuer = oid_list(issuer.value);
    let subject = oid_list(subject.value);
    // Whatever follows the key: unique ids and the extensions block
    let extensions = oid_list(tbs);

    let full = format!(
        "{}_{}_{}",
        hasher.hash12(issuer.as_bytes()),
        hasher.hash12(subject.as_bytes()),
        hasher.hash12(extensions.as_bytes()),
    );
    let raw = format!("{issuer}_{subject}_{extensions}");

    Ok(Ja4xPayload { issuer, subject, extensions, full, raw })
}

/// Split the body of a TLS 1.2 Certificate handshake message into DER certificates.
///
/// Entries that run past the declared list are dropped.
pub fn split_certificate_chain(body: &[u8]) -> Vec<&[u8]> {
    let mut certificates = Vec::new();
    let Ok((rest, total)) = be_u24::<_, Error<&[u8]>>(body) else {
        return certificates;
    };
    let mut list = &rest[..(total as usize).min(rest.len())];

    while !list.is_empty() {
        let entry = be_u24::<_, Error<&[u8]>>(list)
            .and_then(|(rest, len)| take::<_, _, Error<&[u8]>>(len as usize).parse(rest));
        match entry {
            Ok((rest, der)) => {
                certificates.push(der);
                list = rest;
            }
            Err(_) => {
                debug!("Certificate entry overruns the chain, {} bytes left", list.len());
                break;
            }
        }
    }

    certificates
}
