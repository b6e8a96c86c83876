use rand::RngCore;

/// 32 random bytes, hex-encoded.
pub fn generate_confirmation_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
