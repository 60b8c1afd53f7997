use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::errors::{AutograderError, Result};

const DIGEST_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// 生成随机盐（十六进制小写）
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 对明文和十六进制盐计算 Argon2id 摘要，返回十六进制小写串
pub fn hash_token(cleartext: &str, salt_hex: &str) -> Result<String> {
    if cleartext.is_empty() {
        return Err(AutograderError::validation("令牌明文不能为空"));
    }

    let salt = hex::decode(salt_hex)
        .map_err(|e| AutograderError::validation(format!("盐不是合法的十六进制: {e}")))?;

    let config = AppConfig::get();
    let params = Params::new(
        config.argon2.memory_cost,
        config.argon2.time_cost,
        config.argon2.parallelism,
        Some(DIGEST_LEN),
    )
    .map_err(|e| AutograderError::validation(format!("Argon2 参数错误: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut digest = [0u8; DIGEST_LEN];
    argon2
        .hash_password_into(cleartext.as_bytes(), &salt, &mut digest)
        .map_err(|e| AutograderError::validation(format!("令牌哈希失败: {e}")))?;

    Ok(hex::encode(digest))
}

/// 在阻塞线程池中计算摘要，避免 Argon2 占住异步工作线程
pub async fn hash_token_blocking(cleartext: &str, salt_hex: &str) -> Result<String> {
    let cleartext = cleartext.to_string();
    let salt_hex = salt_hex.to_string();
    tokio::task::spawn_blocking(move || hash_token(&cleartext, &salt_hex))
        .await
        .map_err(|e| AutograderError::storage(format!("令牌哈希任务失败: {e}")))?
}

/// 以常数时间比较两个十六进制摘要的原始字节
pub fn digests_match(expected_hex: &str, actual_hex: &str) -> bool {
    match (hex::decode(expected_hex), hex::decode(actual_hex)) {
        (Ok(expected), Ok(actual)) => expected.ct_eq(&actual).into(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_per_salt() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LEN * 2);

        let a = hash_token("secret", &salt).unwrap();
        let b = hash_token("secret", &salt).unwrap();
        assert_eq!(a, b);
        assert!(digests_match(&a, &b));

        let other_salt = generate_salt();
        let c = hash_token("secret", &other_salt).unwrap();
        assert!(!digests_match(&a, &c));
    }

    #[test]
    fn test_rejects_empty_and_bad_salt() {
        assert!(hash_token("", &generate_salt()).is_err());
        assert!(hash_token("secret", "not-hex").is_err());
    }

    #[tokio::test]
    async fn test_blocking_hash_matches_sync() {
        let salt = generate_salt();
        let digest = hash_token_blocking("secret", &salt).await.unwrap();
        assert_eq!(digest, hash_token("secret", &salt).unwrap());
        assert!(hash_token_blocking("", &salt).await.is_err());
    }

    #[test]
    fn test_digests_match_rejects_garbage() {
        assert!(!digests_match("zz", "zz"));
        assert!(!digests_match("00", "0000"));
    }
}
