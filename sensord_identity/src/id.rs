//! Anonymized dynamic-sensor ID derivation (§4.9).

use hmac::{Hmac, Mac};
use sensord_common::consts::{HMAC_KEY_LEN, UUID_ONES, UUID_ZERO};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derives stable, per-app anonymized dynamic-sensor IDs from a shared key.
pub struct IdentityModule {
    key: [u8; HMAC_KEY_LEN],
}

impl IdentityModule {
    pub fn new(key: [u8; HMAC_KEY_LEN]) -> Self {
        Self { key }
    }

    /// `id_from_uuid(uuid, caller_uid) → i32` (§4.9).
    pub fn id_from_uuid(&self, uuid: [u8; 16], caller_uid: i32) -> i32 {
        if uuid == UUID_ZERO {
            return 0;
        }
        if uuid == UUID_ONES {
            return -1;
        }

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(&uuid);
        mac.update(&caller_uid.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let id = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        match id {
            0 => 1,
            -1 => -2,
            other => other,
        }
    }

    /// Uuid exposed to a non-privileged caller is anonymized to zeros (§4.9).
    pub fn exposed_uuid(uuid: [u8; 16], privileged: bool) -> [u8; 16] {
        if privileged {
            uuid
        } else {
            UUID_ZERO
        }
    }
}
