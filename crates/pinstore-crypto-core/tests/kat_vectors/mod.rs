mod hmac_sha256;
mod pbkdf2_sha256;
mod rfc7539_aead;
