//! Wallet sign-challenge derivation.
//!
//! A wallet never signs caller bytes verbatim. The broker appends
//! [`SIGN_SALT`] before forwarding a `WalletSign` request, so the wallet can
//! check that it is answering a gateway-issued challenge and reject anything
//! else. Whoever verifies the returned signature must verify it against
//! [`derive_sign_payload`] of the original bytes.

/// Fixed salt appended to every wallet sign challenge.
pub const SIGN_SALT: &[u8] = b"rgate-wallet-sign-v1";

/// Bytes the remote wallet actually signs for `to_sign`.
pub fn derive_sign_payload(to_sign: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(to_sign.len() + SIGN_SALT.len());
    payload.extend_from_slice(to_sign);
    payload.extend_from_slice(SIGN_SALT);
    payload
}

/// Wallet-side check: returns the caller bytes if `payload` carries the salt.
pub fn strip_sign_salt(payload: &[u8]) -> Option<&[u8]> {
    payload.strip_suffix(SIGN_SALT)
}
