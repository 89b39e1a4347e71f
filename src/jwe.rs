//! Hybrid message-level encryption: an RSA-OAEP-256 wrapped content key
//! with A256GCM authenticated content encryption, serialized as a compact
//! five-segment token. The protected header carries the selected `kid`.

use crate::{Result, VisaDirectError};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;

/// Key-wrapping algorithm identifier
pub const ALG_RSA_OAEP_256: &str = "RSA-OAEP-256";
/// Content-encryption algorithm identifier
pub const ENC_A256GCM: &str = "A256GCM";

const CEK_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// An RSA key in JWK form. Public material is always present; private
/// components appear only in key sets that allow decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl Jwk {
    /// The key id, or `"unknown"` when the document carries none
    pub fn kid(&self) -> &str {
        self.kid.as_deref().unwrap_or("unknown")
    }

    /// Build the public half of the key
    pub fn to_public_key(&self) -> Result<RsaPublicKey> {
        let n = decode_component(&self.n, "n")?;
        let e = decode_component(&self.e, "e")?;
        RsaPublicKey::new(n, e)
            .map_err(|e| VisaDirectError::crypto(format!("invalid public key {}: {e}", self.kid())))
    }

    /// Build the private key; fails when private components are absent
    pub fn to_private_key(&self) -> Result<RsaPrivateKey> {
        let (d, p, q) = match (&self.d, &self.p, &self.q) {
            (Some(d), Some(p), Some(q)) => (d, p, q),
            _ => {
                return Err(VisaDirectError::crypto(format!(
                    "key {} has no private material",
                    self.kid()
                )))
            }
        };
        let n = decode_component(&self.n, "n")?;
        let e = decode_component(&self.e, "e")?;
        let d = decode_component(d, "d")?;
        let p = decode_component(p, "p")?;
        let q = decode_component(q, "q")?;
        RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| VisaDirectError::crypto(format!("invalid private key {}: {e}", self.kid())))
    }

    /// Export a full private JWK from key material; used by tests and by
    /// simulator-style collaborators that hold both halves
    pub fn from_private_key(kid: impl Into<String>, key: &RsaPrivateKey) -> Self {
        let primes = key.primes();
        Self {
            kid: Some(kid.into()),
            kty: "RSA".to_string(),
            alg: Some(ALG_RSA_OAEP_256.to_string()),
            n: encode_component(&key.n().to_bytes_be()),
            e: encode_component(&key.e().to_bytes_be()),
            d: Some(encode_component(&key.d().to_bytes_be())),
            p: Some(encode_component(&primes[0].to_bytes_be())),
            q: Some(encode_component(&primes[1].to_bytes_be())),
        }
    }
}

/// A set of keys as served by a JWKS document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// True when the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The first key in the set, used for outbound encryption
    pub fn first(&self) -> Option<&Jwk> {
        self.keys.first()
    }

    /// Look up a key by id
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid() == kid)
    }
}

/// Result of envelope encryption
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Compact serialized token
    pub token: String,
    /// Key id recorded in the protected header
    pub kid: String,
}

/// Encrypt a JSON payload under the given public key
pub fn encrypt(payload: &Value, key: &Jwk) -> Result<Envelope> {
    let public_key = key.to_public_key()?;
    let kid = key.kid().to_string();

    let protected = json!({ "alg": ALG_RSA_OAEP_256, "enc": ENC_A256GCM, "kid": kid });
    let protected_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);

    let mut rng = rand::thread_rng();
    let mut cek = [0u8; CEK_LEN];
    rng.fill_bytes(&mut cek);
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|_| VisaDirectError::crypto("invalid content key length"))?;
    let plaintext = serde_json::to_vec(payload)?;
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &plaintext,
                aad: protected_b64.as_bytes(),
            },
        )
        .map_err(|_| VisaDirectError::crypto("content encryption failed"))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    let wrapped_cek = public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), &cek)
        .map_err(|e| VisaDirectError::crypto(format!("content key wrap failed: {e}")))?;

    let token = format!(
        "{}.{}.{}.{}.{}",
        protected_b64,
        URL_SAFE_NO_PAD.encode(wrapped_cek),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(&sealed),
        URL_SAFE_NO_PAD.encode(tag),
    );
    Ok(Envelope { token, kid })
}

/// Decrypt a compact token against the key set.
///
/// A `kid` absent from the set surfaces as [`VisaDirectError::KeyIdUnknown`]
/// so the transport can refresh and retry once; every other failure is an
/// envelope-decrypt error that names no key or payload bytes.
pub fn decrypt(token: &str, keys: &KeySet) -> Result<Value> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 5 {
        return Err(VisaDirectError::envelope_decrypt(
            "malformed compact token",
        ));
    }

    let header_bytes = decode_segment(segments[0])?;
    let header: Value = serde_json::from_slice(&header_bytes)
        .map_err(|_| VisaDirectError::envelope_decrypt("unreadable protected header"))?;
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let key = keys
        .find(&kid)
        .ok_or_else(|| VisaDirectError::key_id_unknown(kid.clone()))?;
    let private_key = key
        .to_private_key()
        .map_err(|_| VisaDirectError::envelope_decrypt("key set holds no usable private key"))?;

    let wrapped_cek = decode_segment(segments[1])?;
    let iv = decode_segment(segments[2])?;
    let ciphertext = decode_segment(segments[3])?;
    let tag = decode_segment(segments[4])?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VisaDirectError::envelope_decrypt("malformed compact token"));
    }

    let cek = private_key
        .decrypt(Oaep::new::<Sha256>(), &wrapped_cek)
        .map_err(|_| VisaDirectError::envelope_decrypt("content key unwrap failed"))?;
    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|_| VisaDirectError::envelope_decrypt("content key unwrap failed"))?;

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: segments[0].as_bytes(),
            },
        )
        .map_err(|_| VisaDirectError::envelope_decrypt("content decryption failed"))?;

    serde_json::from_slice(&plaintext)
        .map_err(|_| VisaDirectError::envelope_decrypt("decrypted payload is not JSON"))
}

fn decode_component(value: &str, name: &str) -> Result<BigUint> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| VisaDirectError::crypto(format!("invalid base64url in key component {name}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_component(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VisaDirectError::envelope_decrypt("invalid base64url segment"))
}
