//! The `aesgcm` HTTP Encrypted-Content-Encoding used by Web Push.
//!
//! Key schedule, for receiver key `ua`, sender key `as`, auth secret and salt:
//! - `ikm   = HKDF(auth, ECDH(ua, as), "Content-Encoding: auth\0", 32)`
//! - `ctx   = "P-256\0" || len(ua) || ua || len(as) || as`
//! - `cek   = HKDF(salt, ikm, "Content-Encoding: aesgcm\0" || ctx, 16)`
//! - `nonce = HKDF(salt, ikm, "Content-Encoding: nonce\0" || ctx, 12)`
//!
//! The body is a sequence of AES-128-GCM records of `rs + 16` bytes; the last
//! one must be shorter. Record `i` uses `nonce XOR i`. Each plaintext record
//! starts with a two-byte big-endian padding length followed by that many
//! zero bytes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hkdf::Hkdf;
use p256::SecretKey;
use push_types::{KeyMaterial, AUTH_SECRET_SIZE};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::EceError;
use crate::keys::{self, PUBLIC_KEY_SIZE};

/// Value of the `Content-Encoding` header for this scheme.
pub const CONTENT_ENCODING: &str = "aesgcm";

/// Record size used when the `Encryption` header carries no `rs`.
pub const DEFAULT_RECORD_SIZE: usize = 4096;

/// Size of the salt in bytes.
pub const SALT_SIZE: usize = 16;

const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const PAD_SIZE: usize = 2;

/// Largest `rs` accepted from a header.
const MAX_RECORD_SIZE: usize = u32::MAX as usize - TAG_SIZE;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Parameters carried in the `Crypto-Key` and `Encryption` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    /// Sender's ephemeral public key (`dh`).
    pub dh: Vec<u8>,
    /// Per-message salt.
    pub salt: [u8; SALT_SIZE],
    /// Record size (`rs`).
    pub record_size: usize,
}

impl EncryptionParams {
    /// Extract `dh`, `salt` and `rs` from raw header values.
    ///
    /// Both headers may hold several `;` or `,` separated parameters, e.g.
    /// `dh=BN...;p256ecdsa=BD...`. Base64 may be standard or URL-safe, padded
    /// or not.
    pub fn from_headers(
        crypto_key: Option<&str>,
        encryption: Option<&str>,
    ) -> Result<Self, EceError> {
        let crypto_key = crypto_key.ok_or_else(|| EceError::header("crypto-key", "missing"))?;
        let encryption = encryption.ok_or_else(|| EceError::header("encryption", "missing"))?;

        let dh = header_param(crypto_key, "dh")
            .ok_or_else(|| EceError::header("crypto-key", "no dh parameter"))?;
        let dh = decode_b64(dh).map_err(|e| EceError::header("crypto-key", e.to_string()))?;

        let salt = header_param(encryption, "salt")
            .ok_or_else(|| EceError::header("encryption", "no salt parameter"))?;
        let salt = decode_b64(salt).map_err(|e| EceError::header("encryption", e.to_string()))?;
        let salt: [u8; SALT_SIZE] = salt.as_slice().try_into().map_err(|_| {
            EceError::header(
                "encryption",
                format!("salt must be {SALT_SIZE} bytes, got {}", salt.len()),
            )
        })?;

        let record_size = match header_param(encryption, "rs") {
            Some(rs) => rs
                .parse::<usize>()
                .ok()
                .filter(|rs| (PAD_SIZE + 1..=MAX_RECORD_SIZE).contains(rs))
                .ok_or_else(|| EceError::header("encryption", format!("invalid rs {rs:?}")))?,
            None => DEFAULT_RECORD_SIZE,
        };

        Ok(Self {
            dh,
            salt,
            record_size,
        })
    }
}

/// Output of [`encrypt`]: the body plus the values for the two headers.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    /// Encrypted body.
    pub body: Vec<u8>,
    /// Sender public key.
    pub dh: [u8; PUBLIC_KEY_SIZE],
    /// Salt.
    pub salt: [u8; SALT_SIZE],
    /// Record size used.
    pub record_size: usize,
}

impl EncryptedPayload {
    /// Value for the `Crypto-Key` header.
    pub fn crypto_key_header(&self) -> String {
        format!("dh={}", URL_SAFE_NO_PAD.encode(self.dh))
    }

    /// Value for the `Encryption` header.
    pub fn encryption_header(&self) -> String {
        let salt = URL_SAFE_NO_PAD.encode(self.salt);
        if self.record_size == DEFAULT_RECORD_SIZE {
            format!("salt={salt}")
        } else {
            format!("salt={salt};rs={}", self.record_size)
        }
    }
}

/// Decrypt an `aesgcm` body with a subscription's stored keys.
pub fn decrypt(
    keys: &KeyMaterial,
    params: &EncryptionParams,
    body: &[u8],
) -> Result<Vec<u8>, EceError> {
    check_auth_secret(keys.auth_secret())?;
    if body.is_empty() {
        return Err(EceError::InvalidRecord("empty payload".into()));
    }

    let receiver_public = keys::public_key_of(keys.private_key())?;
    let sender_public = keys::encode_public(&keys::parse_public_key(&params.dh)?);
    let shared = keys::derive_shared_secret(keys.private_key(), &params.dh)?;

    let (cek, base_nonce) = derive_key_and_nonce(
        shared.as_ref(),
        keys.auth_secret(),
        &receiver_public,
        &sender_public,
        &params.salt,
    )?;
    let cipher = Aes128Gcm::new_from_slice(cek.as_ref()).map_err(|_| EceError::KeyDerivation)?;

    let chunk = params
        .record_size
        .checked_add(TAG_SIZE)
        .filter(|_| params.record_size > PAD_SIZE)
        .ok_or_else(|| EceError::InvalidRecord(format!("invalid rs {}", params.record_size)))?;
    let mut plaintext = Vec::with_capacity(body.len());
    let mut start = 0;
    let mut seq = 0u64;

    while start < body.len() {
        let end = start.saturating_add(chunk);
        if end == body.len() {
            return Err(EceError::InvalidRecord("truncated payload".into()));
        }
        let end = end.min(body.len());
        if end - start <= TAG_SIZE {
            return Err(EceError::InvalidRecord(format!("record {seq} too small")));
        }

        let nonce = record_nonce(&base_nonce, seq);
        let record = cipher
            .decrypt(Nonce::from_slice(&nonce), &body[start..end])
            .map_err(|_| EceError::DecryptionFailed)?;
        plaintext.extend_from_slice(unpad(&record, seq)?);

        start = end;
        seq += 1;
    }

    Ok(plaintext)
}

/// Encrypt `plaintext` for a subscriber with a fresh sender key and salt.
///
/// This is the sending side of the scheme; the bridge itself only decrypts.
pub fn encrypt(
    plaintext: &[u8],
    receiver_public: &[u8],
    auth_secret: &[u8],
) -> Result<EncryptedPayload, EceError> {
    let sender = SecretKey::random(&mut aes_gcm::aead::OsRng);
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt).map_err(|e| EceError::EncryptionFailed(e.to_string()))?;

    encrypt_with(
        &sender.to_bytes(),
        salt,
        plaintext,
        receiver_public,
        auth_secret,
        0,
        DEFAULT_RECORD_SIZE,
    )
}

/// Deterministic encryption with explicit sender key, salt, padding and record size.
pub fn encrypt_with(
    sender_private: &[u8],
    salt: [u8; SALT_SIZE],
    plaintext: &[u8],
    receiver_public: &[u8],
    auth_secret: &[u8],
    pad_len: usize,
    record_size: usize,
) -> Result<EncryptedPayload, EceError> {
    check_auth_secret(auth_secret)?;
    if record_size <= PAD_SIZE {
        return Err(EceError::EncryptionFailed(format!(
            "record size {record_size} too small"
        )));
    }
    let data_per_record = record_size - PAD_SIZE;
    if pad_len > usize::from(u16::MAX) {
        return Err(EceError::EncryptionFailed("padding too large".into()));
    }

    let sender_public = keys::public_key_of(sender_private)?;
    let receiver = keys::encode_public(&keys::parse_public_key(receiver_public)?);
    let shared = keys::derive_shared_secret(sender_private, &receiver)?;

    let (cek, base_nonce) =
        derive_key_and_nonce(shared.as_ref(), auth_secret, &receiver, &sender_public, &salt)?;
    let cipher = Aes128Gcm::new_from_slice(cek.as_ref()).map_err(|_| EceError::KeyDerivation)?;

    let mut body = Vec::with_capacity(plaintext.len() + pad_len + TAG_SIZE + PAD_SIZE);
    let mut remaining_pad = pad_len;
    let mut pos = 0;
    let mut seq = 0u64;

    loop {
        let pad = remaining_pad.min(data_per_record);
        remaining_pad -= pad;
        let take = (data_per_record - pad).min(plaintext.len() - pos);

        let mut record = Vec::with_capacity(PAD_SIZE + pad + take);
        record.extend_from_slice(&(pad as u16).to_be_bytes());
        record.resize(PAD_SIZE + pad, 0);
        record.extend_from_slice(&plaintext[pos..pos + take]);
        let full = record.len() == record_size;

        let nonce = record_nonce(&base_nonce, seq);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), record.as_slice())
            .map_err(|e| EceError::EncryptionFailed(e.to_string()))?;
        body.extend_from_slice(&sealed);

        pos += take;
        seq += 1;
        // A full final record would read as truncated, so close with a short one.
        if pos >= plaintext.len() && remaining_pad == 0 && !full {
            break;
        }
    }

    Ok(EncryptedPayload {
        body,
        dh: sender_public,
        salt,
        record_size,
    })
}

fn derive_key_and_nonce(
    shared_secret: &[u8],
    auth_secret: &[u8],
    receiver_public: &[u8; PUBLIC_KEY_SIZE],
    sender_public: &[u8; PUBLIC_KEY_SIZE],
    salt: &[u8; SALT_SIZE],
) -> Result<(Zeroizing<[u8; KEY_SIZE]>, [u8; NONCE_SIZE]), EceError> {
    let mut ikm = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(Some(auth_secret), shared_secret)
        .expand(b"Content-Encoding: auth\0", ikm.as_mut())
        .map_err(|_| EceError::KeyDerivation)?;

    let mut context = Vec::with_capacity(6 + 2 * (2 + PUBLIC_KEY_SIZE));
    context.extend_from_slice(b"P-256\0");
    for key in [receiver_public, sender_public] {
        context.extend_from_slice(&(PUBLIC_KEY_SIZE as u16).to_be_bytes());
        context.extend_from_slice(key);
    }

    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm.as_ref());

    let mut cek = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(&[b"Content-Encoding: aesgcm\0", context.as_slice()].concat(), cek.as_mut())
        .map_err(|_| EceError::KeyDerivation)?;

    let mut nonce = [0u8; NONCE_SIZE];
    hkdf.expand(&[b"Content-Encoding: nonce\0", context.as_slice()].concat(), &mut nonce)
        .map_err(|_| EceError::KeyDerivation)?;

    Ok((cek, nonce))
}

fn record_nonce(base: &[u8; NONCE_SIZE], seq: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    let counter = seq.to_be_bytes();
    for (n, c) in nonce[NONCE_SIZE - 6..].iter_mut().zip(&counter[2..]) {
        *n ^= c;
    }
    nonce
}

fn unpad(record: &[u8], seq: u64) -> Result<&[u8], EceError> {
    if record.len() < PAD_SIZE {
        return Err(EceError::InvalidRecord(format!("record {seq} has no padding header")));
    }
    let pad = usize::from(u16::from_be_bytes([record[0], record[1]]));
    if PAD_SIZE + pad > record.len() {
        return Err(EceError::InvalidRecord(format!("record {seq} padding exceeds record")));
    }
    if record[PAD_SIZE..PAD_SIZE + pad].iter().any(|b| *b != 0) {
        return Err(EceError::InvalidRecord(format!("record {seq} has non-zero padding")));
    }
    Ok(&record[PAD_SIZE + pad..])
}

fn check_auth_secret(auth_secret: &[u8]) -> Result<(), EceError> {
    if auth_secret.len() != AUTH_SECRET_SIZE {
        return Err(EceError::InvalidKey(format!(
            "auth secret must be {AUTH_SECRET_SIZE} bytes, got {}",
            auth_secret.len()
        )));
    }
    Ok(())
}

fn header_param<'a>(value: &'a str, name: &str) -> Option<&'a str> {
    value
        .split([',', ';'])
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().trim_matches('"'))
}

fn decode_b64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT
        .decode(value)
        .or_else(|_| STANDARD_LENIENT.decode(value))
}
